use serde::{Deserialize, Serialize};

use crate::ast::*;
use crate::context::Context;
use crate::error::RuntimeError;
use crate::eval::{self, Evaluator};
use crate::functions::FunctionRegistry;
use crate::value::{Map, Value};

/// Renderer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Inserted between the outputs of consecutive loop iterations.
    pub loop_separator: String,
    /// Bind a sentinel for every built-in function before rendering.
    pub inject_builtins: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            loop_separator: "\n\n".to_string(),
            inject_builtins: true,
        }
    }
}

/// Walks a node tree against a mutable variable scope.
pub struct Renderer<'a> {
    context: Context,
    registry: &'a FunctionRegistry,
    options: &'a RenderOptions,
}

impl<'a> Renderer<'a> {
    pub fn new(
        context: Context,
        registry: &'a FunctionRegistry,
        options: &'a RenderOptions,
    ) -> Self {
        Self {
            context,
            registry,
            options,
        }
    }

    pub fn into_context(self) -> Context {
        self.context
    }

    pub fn render(&mut self, nodes: &[Node]) -> Result<String, RuntimeError> {
        let mut output = String::new();
        for node in nodes {
            self.render_node(node, &mut output)?;
        }
        Ok(output)
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(&self.context, self.registry)
    }

    fn render_node(&mut self, node: &Node, output: &mut String) -> Result<(), RuntimeError> {
        match node {
            Node::Text {
                value,
                trim_left,
                trim_right,
            } => {
                output.push_str(apply_trim(value, *trim_left, *trim_right));
            }
            Node::Variable {
                expression,
                trim_left,
                trim_right,
            } => {
                let value = self.evaluator().evaluate_concat(expression).to_string();
                output.push_str(apply_trim(&value, *trim_left, *trim_right));
            }
            Node::If {
                condition,
                children,
                else_children,
            } => {
                let branch = if self.evaluate_condition(condition) {
                    children
                } else {
                    else_children
                };
                output.push_str(&self.render(branch)?);
            }
            Node::For {
                item,
                list,
                children,
            } => {
                let items = self.evaluate_list(list);
                tracing::debug!(item = %item, iterations = items.len(), "entering for loop");
                let length = items.len();
                let mut iterations = Vec::with_capacity(length);
                for (index, value) in items.into_iter().enumerate() {
                    let mut scope = self.context.clone();
                    scope.insert(item.clone(), value);
                    scope.insert("loop", loop_info(index, length));
                    let mut child = Renderer::new(scope, self.registry, self.options);
                    iterations.push(child.render(children)?);
                }
                output.push_str(&iterations.join(&self.options.loop_separator));
            }
            Node::Set { name, value } => {
                let value = self.evaluator().evaluate_concat(value);
                tracing::debug!(name = %name, value = %value, "set variable");
                self.context.insert(name.clone(), value);
            }
            Node::RaiseException(message) => {
                tracing::debug!(message = %message, "template raised exception");
                return Err(RuntimeError {
                    message: message.clone(),
                });
            }
        }
        Ok(())
    }

    fn evaluate_condition(&self, node: &ConditionNode) -> bool {
        let result = match node {
            ConditionNode::Literal(expr) => self.evaluator().evaluate(expr).is_truthy(),
            ConditionNode::UnaryOp(UnaryOperator::Not, child) => !self.evaluate_condition(child),
            ConditionNode::BinaryOp(left, BinaryOperator::And, right) => {
                self.evaluate_condition(left) && self.evaluate_condition(right)
            }
            ConditionNode::BinaryOp(left, BinaryOperator::Or, right) => {
                self.evaluate_condition(left) || self.evaluate_condition(right)
            }
            ConditionNode::BinaryOp(left, BinaryOperator::Eq, right) => {
                self.operand(left) == self.operand(right)
            }
            ConditionNode::BinaryOp(left, BinaryOperator::NotEq, right) => {
                self.operand(left) != self.operand(right)
            }
            ConditionNode::BinaryOp(left, BinaryOperator::In, right) => {
                eval::contains(&self.operand(right), &self.operand(left))
            }
            ConditionNode::IsDefined(name) => self.evaluator().is_defined(name),
            ConditionNode::IsNotNone(name) => !self.evaluator().evaluate(name).is_null(),
        };
        tracing::trace!(?node, result, "evaluated condition");
        result
    }

    fn operand(&self, node: &ConditionNode) -> Value {
        match node {
            ConditionNode::Literal(expr) => self.evaluator().evaluate_concat(expr),
            other => Value::Bool(self.evaluate_condition(other)),
        }
    }

    /// Materializes a loop source. Maps iterate over their keys; anything
    /// else that is not a list iterates zero times.
    fn evaluate_list(&self, node: &ListNode) -> Vec<Value> {
        match node {
            ListNode::Variable(expr) => match self.evaluator().evaluate(expr) {
                Value::List(items) => items,
                Value::Map(map) => map.into_keys().map(Value::String).collect(),
                _ => Vec::new(),
            },
            ListNode::Slice { inner, start, end } => {
                let mut items = self.evaluate_list(inner);
                let range = eval::slice_range(items.len(), *start, *end);
                items.drain(range).collect()
            }
        }
    }
}

/// Strips spaces and tabs (never newlines) from the flagged sides.
fn apply_trim(value: &str, trim_left: bool, trim_right: bool) -> &str {
    let is_trimmable = |c: char| c.is_whitespace() && c != '\n';
    let value = if trim_left {
        value.trim_start_matches(is_trimmable)
    } else {
        value
    };
    if trim_right {
        value.trim_end_matches(is_trimmable)
    } else {
        value
    }
}

/// The `loop` helper bound inside each iteration.
fn loop_info(index: usize, length: usize) -> Value {
    let mut info = Map::new();
    info.insert("index".to_string(), Value::from(index + 1));
    info.insert("index0".to_string(), Value::from(index));
    info.insert("first".to_string(), Value::Bool(index == 0));
    info.insert("last".to_string(), Value::Bool(index + 1 == length));
    info.insert("length".to_string(), Value::from(length));
    Value::Map(info)
}
