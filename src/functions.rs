//! Built-in filters and functions.
//!
//! Filters are applied with pipe syntax (`value | trim`, `value | tojson(indent=4)`).
//! Functions are called inline (`strftime_now("%d %b %Y")`). Both live in a
//! [`FunctionRegistry`] that is built once and handed to the renderer.

use std::fmt::{self, Write as _};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone};
use indexmap::IndexMap;
use serde::Serialize;

use crate::context::Context;
use crate::value::{Map, Value};

/// Format used when a `strftime_now` format cannot be rendered.
pub const FALLBACK_DATE_FORMAT: &str = "%d %b %Y";

/// Value bound in the context for each callable built-in, so that
/// `{% if strftime_now is defined %}` holds without a real call.
pub const FUNCTION_SENTINEL: &str = "function";

/// Evaluated arguments of a filter or function call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub keyword: Map,
}

impl Arguments {
    /// A keyword argument, falling back to the positional slot.
    pub fn get(&self, keyword: &str, position: usize) -> Option<&Value> {
        self.keyword
            .get(keyword)
            .or_else(|| self.positional.get(position))
    }
}

pub type FilterFn = Box<dyn Fn(Value, &Arguments) -> Value + Send + Sync>;
pub type FunctionFn = Box<dyn Fn(&Arguments) -> Value + Send + Sync>;

struct Filter {
    description: String,
    handler: FilterFn,
}

struct Function {
    description: String,
    handler: FunctionFn,
}

/// Name-keyed table of filters and functions.
pub struct FunctionRegistry {
    filters: IndexMap<String, Filter>,
    functions: IndexMap<String, Function>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionRegistry {
    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self {
            filters: IndexMap::new(),
            functions: IndexMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_function("strftime_now", "Date formatting function", |args| {
            let format = args
                .get("format", 0)
                .and_then(Value::as_str)
                .unwrap_or(FALLBACK_DATE_FORMAT);
            Value::String(strftime_now(format))
        });
        registry.register_filter("tojson", "JSON formatting function", |value, args| {
            let indent = args
                .get("indent", 0)
                .and_then(Value::as_i64)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(0);
            Value::String(to_json(&value, indent))
        });
        registry.register_filter("trim", "String trimming function", |value, _| trim(value));
        registry.register_filter("length", "Get length of collection or string", |value, _| {
            Value::from(length(&value))
        });
        registry
    }

    pub fn register_filter<F>(&mut self, name: &str, description: &str, handler: F)
    where
        F: Fn(Value, &Arguments) -> Value + Send + Sync + 'static,
    {
        self.filters.insert(
            name.to_string(),
            Filter {
                description: description.to_string(),
                handler: Box::new(handler),
            },
        );
    }

    pub fn register_function<F>(&mut self, name: &str, description: &str, handler: F)
    where
        F: Fn(&Arguments) -> Value + Send + Sync + 'static,
    {
        self.functions.insert(
            name.to_string(),
            Function {
                description: description.to_string(),
                handler: Box::new(handler),
            },
        );
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Applies a filter by name. Unknown filters pass the value through.
    pub fn apply_filter(&self, name: &str, value: Value, args: &Arguments) -> Value {
        match self.filters.get(name) {
            Some(filter) => {
                tracing::trace!(filter = name, "applying filter");
                (filter.handler)(value, args)
            }
            None => {
                tracing::trace!(filter = name, "unknown filter, passing value through");
                value
            }
        }
    }

    pub fn call_function(&self, name: &str, args: &Arguments) -> Option<Value> {
        self.functions.get(name).map(|function| (function.handler)(args))
    }

    /// Name and description of every built-in, functions first.
    pub fn descriptions(&self) -> IndexMap<String, String> {
        let functions = self
            .functions
            .iter()
            .map(|(name, f)| (name.clone(), f.description.clone()));
        let filters = self
            .filters
            .iter()
            .map(|(name, f)| (name.clone(), f.description.clone()));
        functions.chain(filters).collect()
    }

    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    /// Binds a sentinel for each function the caller has not already bound.
    pub fn inject_sentinels(&self, context: &mut Context) {
        for name in self.functions.keys() {
            if !context.contains(name) {
                context.insert(name.clone(), Value::from(FUNCTION_SENTINEL));
            }
        }
    }
}

/// Current local time rendered with a POSIX `strftime` format.
pub fn strftime_now(format: &str) -> String {
    format_timestamp(&Local::now(), format)
}

/// Renders `time` with `format`, falling back to [`FALLBACK_DATE_FORMAT`]
/// when the format has an unknown specifier or cannot be written.
pub fn format_timestamp<Tz>(time: &DateTime<Tz>, format: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if !items.iter().any(|item| matches!(item, Item::Error)) {
        let mut out = String::new();
        if write!(out, "{}", time.format_with_items(items.iter())).is_ok() {
            return out;
        }
    }
    tracing::warn!(format, "invalid strftime format, using fallback");
    time.format(FALLBACK_DATE_FORMAT).to_string()
}

/// JSON text for a value. Each nesting level is indented by `indent`
/// spaces; an indent of 0 still puts every entry on its own line.
pub fn to_json(value: &Value, indent: usize) -> String {
    if value.is_null() {
        return "{}".to_string();
    }
    let indent = " ".repeat(indent);
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8(buf).unwrap_or_else(|_| value.to_json().to_string()),
        Err(_) => value.to_json().to_string(),
    }
}

/// Null stays null; anything else is stringified and trimmed.
pub fn trim(value: Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(s.trim().to_string()),
        other => Value::String(other.to_string().trim().to_string()),
    }
}

pub fn length(value: &Value) -> usize {
    match value {
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::String(s) => s.chars().count(),
        _ => 0,
    }
}
