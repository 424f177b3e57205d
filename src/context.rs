use serde::{Deserialize, Serialize};

use crate::tools::ChatMessage;
use crate::value::{Map, Value};

/// Variables a template renders against.
///
/// Cloning is shallow in the sense that matters here: a clone is an
/// independent map, so a loop body can bind names without touching its parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    vars: Map,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn set_flag(&mut self, name: impl Into<String>, flag: bool) {
        self.vars.insert(name.into(), Value::Bool(flag));
    }

    /// Binds `messages` to the chat history as a list of `{role, content}` maps.
    pub fn set_messages(&mut self, messages: &[ChatMessage]) {
        let list = messages.iter().map(ChatMessage::to_value).collect();
        self.vars.insert("messages".to_string(), Value::List(list));
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.vars.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }
}

impl From<Map> for Context {
    fn from(vars: Map) -> Self {
        Self { vars }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
