use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::functions::{Arguments, FunctionRegistry};
use crate::scan;
use crate::value::Value;

/// Resolves expression strings against a context.
///
/// Evaluation never fails: missing names, bad indices and type mismatches
/// all come back as [`Value::Null`].
pub struct Evaluator<'a> {
    context: &'a Context,
    registry: &'a FunctionRegistry,
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a Context, registry: &'a FunctionRegistry) -> Self {
        Self { context, registry }
    }

    /// Evaluates `a + b + ...`, concatenating the rendered operands. An
    /// expression without a top-level `+` keeps its own type.
    pub fn evaluate_concat(&self, expr: &str) -> Value {
        let operands = scan::split_top_level(expr, "+");
        if operands.len() == 1 {
            return self.evaluate(expr);
        }
        let joined: String = operands
            .iter()
            .map(|operand| self.evaluate(operand).to_string())
            .collect();
        Value::String(joined)
    }

    pub fn evaluate(&self, expr: &str) -> Value {
        let expr = expr.trim();
        tracing::trace!(expr, "evaluating expression");

        if let Some((_, literal)) = scan::quoted_literal(expr) {
            return Value::String(literal);
        }
        if let Some(value) = keyword_literal(expr) {
            return value;
        }
        if expr.contains('[') {
            if let Some(path) = Path::parse(expr) {
                return self.resolve(&path);
            }
        }

        let stages = scan::split_top_level(expr, "|");
        if stages.len() > 1 {
            let mut value = self.evaluate(stages[0]);
            for filter in &stages[1..] {
                value = self.apply_filter(value, filter.trim());
            }
            return value;
        }

        if let Some(&i) = scan::keyword_offsets(expr, "in").first() {
            let needle = self.evaluate(&expr[..i]);
            let haystack = self.evaluate(&expr[i + 2..]);
            return Value::Bool(contains(&haystack, &needle));
        }

        if let Some((name, args)) = parse_call(expr) {
            if self.registry.has_function(name) {
                let args = self.arguments(args);
                if let Some(value) = self.registry.call_function(name, &args) {
                    return value;
                }
            }
        }

        match Path::parse(expr) {
            Some(path) => self.resolve(&path),
            None => {
                tracing::trace!(expr, "unrecognized expression");
                Value::Null
            }
        }
    }

    /// Whether a name or path resolves to something present, even if null.
    pub fn is_defined(&self, expr: &str) -> bool {
        let Some(path) = Path::parse(expr.trim()) else {
            return false;
        };
        let Some(mut current) = self.context.get(path.root).cloned() else {
            return false;
        };
        for segment in &path.segments {
            let present = match (segment, &current) {
                (Segment::Key(key), Value::Map(map)) => map.contains_key(key),
                (Segment::Index(i), Value::List(items)) => normalize_index(*i, items.len()).is_some(),
                _ => !self.index(current.clone(), segment).is_null(),
            };
            if !present {
                return false;
            }
            current = self.index(current, segment);
        }
        true
    }

    fn apply_filter(&self, value: Value, filter: &str) -> Value {
        match parse_call(filter) {
            Some((name, args)) => {
                let args = self.arguments(args);
                self.registry.apply_filter(name, value, &args)
            }
            None => self.registry.apply_filter(filter, value, &Arguments::default()),
        }
    }

    /// Evaluates `a, key=b` call arguments.
    fn arguments(&self, raw: &str) -> Arguments {
        let mut args = Arguments::default();
        if raw.trim().is_empty() {
            return args;
        }
        for part in scan::split_top_level(raw, ",") {
            let part = part.trim();
            match keyword_argument(part) {
                Some((key, value)) => {
                    args.keyword.insert(key.to_string(), self.evaluate(value));
                }
                None => args.positional.push(self.evaluate(part)),
            }
        }
        args
    }

    fn resolve(&self, path: &Path<'_>) -> Value {
        let Some(root) = self.context.get(path.root) else {
            tracing::trace!(name = path.root, "name not found in context");
            return Value::Null;
        };
        path.segments
            .iter()
            .fold(root.clone(), |value, segment| self.index(value, segment))
    }

    fn index(&self, value: Value, segment: &Segment) -> Value {
        match segment {
            Segment::Key(key) => lookup_key(value, key),
            Segment::Index(i) => lookup_index(value, *i),
            Segment::Slice(start, end) => match value {
                Value::List(items) => {
                    let range = slice_range(items.len(), *start, *end);
                    Value::List(items[range].to_vec())
                }
                Value::String(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    let range = slice_range(chars.len(), *start, *end);
                    Value::String(chars[range].iter().collect())
                }
                _ => Value::Null,
            },
            Segment::Dynamic(expr) => match self.evaluate(expr) {
                key @ Value::Number(_) => match key.as_i64() {
                    Some(i) => lookup_index(value, i),
                    None => Value::Null,
                },
                Value::String(key) => lookup_key(value, &key),
                _ => Value::Null,
            },
        }
    }
}

/// A string key into a map; on a list, the key is read from every element
/// that is a map.
fn lookup_key(value: Value, key: &str) -> Value {
    match value {
        Value::Map(mut map) => map.swap_remove(key).unwrap_or(Value::Null),
        Value::List(items) => Value::List(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Map(mut map) => map.swap_remove(key),
                    _ => None,
                })
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn lookup_index(value: Value, index: i64) -> Value {
    match value {
        Value::List(mut items) => match normalize_index(index, items.len()) {
            Some(i) => items.swap_remove(i),
            None => Value::Null,
        },
        map @ Value::Map(_) => lookup_key(map, &index.to_string()),
        _ => Value::Null,
    }
}

/// Negative indices count from the end.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

/// Python-style slice bounds clamped to `0..len`. A missing end means `len`.
pub(crate) fn slice_range(len: usize, start: Option<i64>, end: Option<i64>) -> Range<usize> {
    let clamp = |bound: i64| -> usize {
        let len = len as i64;
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(0, len) as usize
    };
    let start = start.map_or(0, clamp);
    let end = end.map_or(len, clamp);
    start..end.max(start)
}

/// Membership: key of a map, element of a list, substring of a string.
pub(crate) fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Map(map) => map.contains_key(&needle.to_string()),
        Value::List(items) => items.contains(needle),
        Value::String(s) => s.contains(&needle.to_string()),
        _ => false,
    }
}

fn keyword_literal(expr: &str) -> Option<Value> {
    match expr {
        "none" | "None" => return Some(Value::Null),
        "true" | "True" => return Some(Value::Bool(true)),
        "false" | "False" => return Some(Value::Bool(false)),
        _ => {}
    }
    if !NUMBER_RE.is_match(expr) {
        return None;
    }
    expr.parse::<f64>().ok().map(Value::Number)
}

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").unwrap());

static CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_]*)\s*(\(.*\))$").unwrap());

/// `name(args)` -> (`name`, `args`).
fn parse_call(expr: &str) -> Option<(&str, &str)> {
    let captures = CALL_RE.captures(expr)?;
    let name = captures.get(1)?.as_str();
    let call = captures.get(2)?.as_str();
    scan::strip_enclosing_parens(call).map(|args| (name, args))
}

/// `key=value`, but not `a == b`.
fn keyword_argument(part: &str) -> Option<(&str, &str)> {
    let eq = scan::find_top_level(part, "=")?;
    let key = part[..eq].trim();
    let value = &part[eq + 1..];
    (is_identifier(key) && !value.starts_with('=')).then_some((key, value))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(i64),
    Slice(Option<i64>, Option<i64>),
    Dynamic(String),
}

/// `root.attr['key'][0][1:]`
#[derive(Debug, Clone, PartialEq)]
struct Path<'e> {
    root: &'e str,
    segments: Vec<Segment>,
}

impl<'e> Path<'e> {
    fn parse(expr: &'e str) -> Option<Self> {
        let root_len = expr
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(expr.len());
        let root = &expr[..root_len];
        if !is_identifier(root) {
            return None;
        }

        let mut segments = Vec::new();
        let mut rest = &expr[root_len..];
        while !rest.is_empty() {
            if let Some(after_dot) = rest.strip_prefix('.') {
                let len = after_dot
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after_dot.len());
                let attr = &after_dot[..len];
                if attr.is_empty() {
                    return None;
                }
                segments.push(match attr.parse::<i64>() {
                    Ok(i) => Segment::Index(i),
                    Err(_) => Segment::Key(attr.to_string()),
                });
                rest = &after_dot[len..];
            } else if rest.starts_with('[') {
                let close = group_end(rest)?;
                segments.push(Segment::parse_bracket(rest[1..close].trim())?);
                rest = &rest[close + 1..];
            } else {
                return None;
            }
        }
        Some(Path { root, segments })
    }
}

/// Offset of the `]` closing the group that opens `expr`.
fn group_end(expr: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in expr.char_indices().skip(1) {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ']' if depth == 0 => return Some(i),
            ')' | ']' | '}' => depth = depth.checked_sub(1)?,
            _ => {}
        }
    }
    None
}

impl Segment {
    fn parse_bracket(inner: &str) -> Option<Self> {
        if inner.is_empty() {
            return None;
        }
        if let Some((_, key)) = scan::quoted_literal(inner) {
            return Some(Segment::Key(key));
        }
        if let Ok(i) = inner.parse::<i64>() {
            return Some(Segment::Index(i));
        }
        if let Some((start, end)) = inner.split_once(':') {
            let bound = |s: &str| -> Option<Option<i64>> {
                let s = s.trim();
                if s.is_empty() {
                    Some(None)
                } else {
                    s.parse().ok().map(Some)
                }
            };
            return Some(Segment::Slice(bound(start)?, bound(end)?));
        }
        Some(Segment::Dynamic(inner.to_string()))
    }
}
