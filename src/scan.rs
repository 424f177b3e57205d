//! Quote- and bracket-aware helpers for slicing small expression strings.
//!
//! Both the condition parser and the evaluator split expressions on
//! operators (`and`, `|`, `+`, `==` ...). Those operators only count when
//! they sit outside string literals and outside any `()`, `[]` or `{}`
//! group; everything here enforces that one rule.

/// Yields the byte offset of every character that sits at nesting depth
/// zero and outside a quoted string. Opening and closing delimiters of a
/// top-level group are included.
struct TopLevel<'a> {
    chars: std::str::CharIndices<'a>,
    depth: usize,
    quote: Option<char>,
    escaped: bool,
}

fn top_level(expr: &str) -> TopLevel<'_> {
    TopLevel {
        chars: expr.char_indices(),
        depth: 0,
        quote: None,
        escaped: false,
    }
}

impl Iterator for TopLevel<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        for (i, c) in self.chars.by_ref() {
            if let Some(q) = self.quote {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == q {
                    self.quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' => {
                    self.quote = Some(c);
                    if self.depth == 0 {
                        return Some(i);
                    }
                }
                '(' | '[' | '{' => {
                    self.depth += 1;
                    if self.depth == 1 {
                        return Some(i);
                    }
                }
                ')' | ']' | '}' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some(i);
                    }
                }
                _ if self.depth == 0 => return Some(i),
                _ => {}
            }
        }
        None
    }
}

/// Whether quotes are closed and brackets never go negative or stay open.
pub(crate) fn is_balanced(expr: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in expr.chars() {
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
            ')' | ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    quote.is_none() && depth == 0
}

/// Splits on every top-level occurrence of `sep`. Parts are not trimmed.
pub(crate) fn split_top_level<'a>(expr: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for i in top_level(expr) {
        if i >= start && expr[i..].starts_with(sep) {
            parts.push(&expr[start..i]);
            start = i + sep.len();
        }
    }
    parts.push(&expr[start..]);
    parts
}

/// First top-level occurrence of `sep`.
pub(crate) fn find_top_level(expr: &str, sep: &str) -> Option<usize> {
    top_level(expr).find(|&i| expr[i..].starts_with(sep))
}

fn is_keyword_at(expr: &str, i: usize, keyword: &str) -> bool {
    expr[i..].starts_with(keyword)
        && expr[..i].chars().next_back().is_some_and(char::is_whitespace)
        && expr[i + keyword.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_whitespace() || c == '(')
}

/// Top-level offsets where `keyword` appears as a whitespace-delimited word.
/// A keyword at the very start of `expr` is not a match.
pub(crate) fn keyword_offsets(expr: &str, keyword: &str) -> Vec<usize> {
    let mut found = Vec::new();
    let mut next = 0;
    for i in top_level(expr) {
        if i >= next && is_keyword_at(expr, i, keyword) {
            found.push(i);
            next = i + keyword.len();
        }
    }
    found
}

/// Splits on a whitespace-delimited keyword such as `and`, trimming parts.
pub(crate) fn split_keyword<'a>(expr: &'a str, keyword: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for i in keyword_offsets(expr, keyword) {
        parts.push(expr[start..i].trim());
        start = i + keyword.len();
    }
    parts.push(expr[start..].trim());
    parts
}

/// Strips a leading keyword (`not x`, `not(x)`), returning the remainder.
pub(crate) fn strip_keyword_prefix<'a>(expr: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = expr.strip_prefix(keyword)?;
    rest.starts_with(|c: char| c.is_whitespace() || c == '(')
        .then(|| rest.trim_start())
}

/// `(inner)` -> `inner`, but only when the opening paren closes at the very end.
pub(crate) fn strip_enclosing_parens(expr: &str) -> Option<&str> {
    if !expr.starts_with('(') || !expr.ends_with(')') {
        return None;
    }
    let offsets: Vec<usize> = top_level(expr).collect();
    (offsets == [0, expr.len() - 1]).then(|| &expr[1..expr.len() - 1])
}

/// Offset of the `[` that opens a trailing top-level `[...]` group.
pub(crate) fn trailing_index_group(expr: &str) -> Option<usize> {
    if !expr.ends_with(']') {
        return None;
    }
    top_level(expr).filter(|&i| expr[i..].starts_with('[')).last()
}

/// If `expr` is exactly one quoted string, returns its quote and unescaped body.
pub(crate) fn quoted_literal(expr: &str) -> Option<(char, String)> {
    let quote = expr.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let mut escaped = false;
    for (i, c) in expr.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return (i + c.len_utf8() == expr.len()).then(|| (quote, unescape(&expr[1..i])));
        }
    }
    None
}

/// Resolves backslash escapes inside a string literal. Unknown escapes are kept.
pub(crate) fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(esc @ ('\\' | '\'' | '"')) => out.push(esc),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
