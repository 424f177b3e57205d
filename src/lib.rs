//! promptjinja: a small Jinja-like interpreter for LLM chat prompt templates.
//!
//! Renders decoded Hugging Face style `chat_template` strings (and similar
//! prompt templates) against a variable [`Context`]. The pipeline is
//! lexer → parser → tree-walking renderer, with expressions evaluated
//! leniently: a missing variable or bad index renders as empty instead of
//! failing.
//!
//! Supported subset:
//! - Text, comments `{# ... #}` and interpolation `{{ expr }}`.
//! - `{% if %}` / `{% elif %}` / `{% else %}` / `{% endif %}` with `and`,
//!   `or`, `not`, `==`, `!=`, `in`, `is defined`, `is not none`.
//! - `{% for x in list %}` / `{% endfor %}`, including `list[start:end]`
//!   slices and a `loop` helper.
//! - `{% set name = expr %}` and `raise_exception("message")`.
//! - Filters `tojson`, `trim`, `length` and the `strftime_now` function.
//!
//! Newline semantics:
//! - A `-` on a marker trims spaces and tabs next to it but never newlines.
//! - Consecutive loop iterations are joined with
//!   [`RenderOptions::loop_separator`], `"\n\n"` unless configured.
//!
//! Not supported: macros, template inheritance, arithmetic, autoescaping.

mod ast;
mod context;
mod error;
mod eval;
mod functions;
mod lexer;
mod parser;
mod render;
mod scan;
mod tools;
mod value;

use indexmap::IndexMap;

pub use ast::{BinaryOperator, ConditionNode, ListNode, Node, Template, UnaryOperator};
pub use context::Context;
pub use error::{Result, RuntimeError, SyntaxError, TemplateError};
pub use eval::Evaluator;
pub use functions::{
    Arguments, FilterFn, FunctionFn, FunctionRegistry, FALLBACK_DATE_FORMAT, FUNCTION_SENTINEL,
};
pub use lexer::{tokenize, Token};
pub use parser::{parse, parse_condition, parse_list_expression};
pub use render::{RenderOptions, Renderer};
pub use tools::{
    tools_to_json, tools_to_value, ChatMessage, ParameterSchema, PropertySchema, SchemaType,
    ToolDescriptor,
};
pub use value::{Map, Value};

/// A configured interpreter: function registry plus render options.
///
/// An engine holds no per-render state, so one instance can serve any
/// number of renders, including concurrent ones.
#[derive(Debug, Default)]
pub struct Engine {
    registry: FunctionRegistry,
    options: RenderOptions,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RenderOptions) -> Self {
        Self {
            registry: FunctionRegistry::default(),
            options,
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Mutable access for registering extra filters and functions.
    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// Lexes and parses `source` without rendering it.
    pub fn compile(&self, source: &str) -> Result<Template> {
        let tokens = tokenize(source)?;
        let template = parse(tokens)?;
        tracing::debug!(nodes = template.len(), "parsed template");
        Ok(template)
    }

    /// Renders `source` against `context`. The caller's context is never
    /// modified; `set` directives only affect this render.
    pub fn render(&self, source: &str, context: &Context) -> Result<String> {
        let template = self.compile(source)?;
        self.render_template(&template, context)
    }

    /// Renders an already compiled template.
    pub fn render_template(&self, template: &[Node], context: &Context) -> Result<String> {
        let mut scope = context.clone();
        if self.options.inject_builtins {
            self.registry.inject_sentinels(&mut scope);
        }
        let mut renderer = Renderer::new(scope, &self.registry, &self.options);
        let output = renderer.render(template)?;
        tracing::debug!(bytes = output.len(), "rendered template");
        Ok(output)
    }
}

/// Renders `source` against `context` with a default [`Engine`].
pub fn render(source: &str, context: &Context) -> Result<String> {
    Engine::new().render(source, context)
}

/// Render an HF-style chat_template with a list of messages.
///
/// `messages` is bound on top of `context`, replacing any `messages` entry
/// already there.
pub fn render_chat_template(
    template: &str,
    messages: &[ChatMessage],
    context: &Context,
) -> Result<String> {
    let mut context = context.clone();
    context.set_messages(messages);
    render(template, &context)
}

/// Name and description of every built-in filter and function.
pub fn list_builtin_functions() -> IndexMap<String, String> {
    FunctionRegistry::with_builtins().descriptions()
}
