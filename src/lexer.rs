use crate::error::SyntaxError;
use crate::scan;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal output. Raw text runs and pure `{{ "..." }}` literals both land here.
    Text {
        value: String,
        trim_left: bool,
        trim_right: bool,
    },
    Variable {
        expression: String,
        trim_left: bool,
        trim_right: bool,
    },
    IfStart(String),
    ElseIf(String),
    Else,
    IfEnd,
    ForStart {
        item: String,
        list: String,
    },
    ForEnd,
    Set {
        name: String,
        value: String,
    },
    RaiseException(String),
}

/// Scans template source into tokens. Comments are dropped.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokenizer = Tokenizer::new(source);
    tokenizer.run()?;
    tracing::debug!(tokens = tokenizer.tokens.len(), "tokenized template");
    Ok(tokenizer.tokens)
}

struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    tokens: Vec<Token>,
    // The last pushed token is a raw text run that a `{{-`/`{%-` may trim.
    raw_text_tail: bool,
    // The previous marker closed with `-}}`/`-%}`/`-#}`.
    trim_next_text: bool,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            tokens: Vec::new(),
            raw_text_tail: false,
            trim_next_text: false,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        while !self.remaining().is_empty() {
            let rest = self.remaining();
            if rest.starts_with("{#") {
                self.lex_comment();
            } else if rest.starts_with("{{") {
                self.lex_variable();
            } else if rest.starts_with("{%") {
                self.lex_block()?;
            } else {
                self.lex_text();
            }
        }
        Ok(())
    }

    fn push(&mut self, token: Token) {
        self.tokens.push(token);
        self.raw_text_tail = false;
    }

    /// Consumes an opening marker, returning whether it carried a `-`.
    fn open_marker(&mut self, open: &str) -> bool {
        self.trim_next_text = false;
        self.advance(open.len());
        if !self.remaining().starts_with('-') {
            return false;
        }
        self.advance(1);
        if self.raw_text_tail {
            if let Some(Token::Text { trim_right, .. }) = self.tokens.last_mut() {
                *trim_right = true;
            }
        }
        true
    }

    /// Consumes through `close` (quote-aware) and returns the trimmed
    /// content and whether it ended in `-`. Nothing is consumed when
    /// `close` is missing.
    fn close_marker(&mut self, close: &str) -> Option<(&'a str, bool)> {
        let rest = self.remaining();
        let end = scan::find_top_level(rest, close)?;
        self.advance(end + close.len());
        Some(self.marker_content(&rest[..end]))
    }

    fn marker_content(&mut self, content: &'a str) -> (&'a str, bool) {
        let content = content.trim_end();
        match content.strip_suffix('-') {
            Some(stripped) => {
                self.trim_next_text = true;
                (stripped.trim(), true)
            }
            None => (content.trim(), false),
        }
    }

    fn lex_comment(&mut self) {
        self.open_marker("{#");
        let rest = self.remaining();
        match rest.find("#}") {
            Some(end) => {
                let trim_right = rest[..end].ends_with('-');
                tracing::trace!(comment = &rest[..end], "skipped comment");
                self.advance(end + 2);
                self.trim_next_text = trim_right;
            }
            // An unterminated comment swallows the rest of the template.
            None => self.advance(rest.len()),
        }
    }

    fn lex_variable(&mut self) {
        let trim_left = self.open_marker("{{");
        let (content, trim_right) = match self.close_marker("}}") {
            Some(closed) => closed,
            None => {
                // A stray quote can hide the real `}}`; otherwise an unclosed
                // interpolation runs to the end of the template.
                let rest = self.remaining();
                let end = rest.find("}}");
                tracing::trace!(offset = self.cursor, "unbalanced interpolation");
                self.advance(end.map_or(rest.len(), |end| end + 2));
                self.marker_content(&rest[..end.unwrap_or(rest.len())])
            }
        };

        let token = if let Some(message) = raise_exception_message(content) {
            Token::RaiseException(message)
        } else if let Some(('"', value)) = scan::quoted_literal(content) {
            Token::Text {
                value,
                trim_left,
                trim_right,
            }
        } else {
            Token::Variable {
                expression: content.to_string(),
                trim_left,
                trim_right,
            }
        };
        self.push(token);
    }

    fn lex_block(&mut self) -> Result<(), SyntaxError> {
        let offset = self.cursor;
        self.open_marker("{%");
        let (content, _) = self
            .close_marker("%}")
            .ok_or(SyntaxError::UnclosedTag { tag: "{%", offset })?;
        let token = block_token(content)?;
        self.push(token);
        Ok(())
    }

    fn lex_text(&mut self) {
        let rest = self.remaining();
        let end = rest
            .match_indices('{')
            .map(|(i, _)| i)
            .find(|&i| matches!(rest.as_bytes().get(i + 1), Some(b'{' | b'%' | b'#')))
            .unwrap_or(rest.len());

        let trim_left = std::mem::take(&mut self.trim_next_text);
        self.push(Token::Text {
            value: rest[..end].replace("\\n", "\n"),
            trim_left,
            trim_right: false,
        });
        self.raw_text_tail = true;
        self.advance(end);
    }
}

fn block_token(content: &str) -> Result<Token, SyntaxError> {
    if let Some(condition) = content.strip_prefix("if ") {
        return Ok(Token::IfStart(condition.trim().to_string()));
    }
    if let Some(condition) = content.strip_prefix("elif ") {
        return Ok(Token::ElseIf(condition.trim().to_string()));
    }
    match content {
        "else" => return Ok(Token::Else),
        "endif" => return Ok(Token::IfEnd),
        "endfor" => return Ok(Token::ForEnd),
        _ => {}
    }
    if let Some(rest) = content.strip_prefix("for ") {
        let parts: Vec<&str> = rest.trim().split(" in ").map(str::trim).collect();
        return match parts.as_slice() {
            [item, list] if !item.is_empty() && !list.is_empty() => Ok(Token::ForStart {
                item: item.to_string(),
                list: list.to_string(),
            }),
            _ => Err(SyntaxError::InvalidFor(content.to_string())),
        };
    }
    if let Some(rest) = content.strip_prefix("set ") {
        return match rest.trim().split_once(" = ") {
            Some((name, value)) if !name.trim().is_empty() => Ok(Token::Set {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => Err(SyntaxError::InvalidSet(content.to_string())),
        };
    }
    if let Some(message) = raise_exception_message(content) {
        return Ok(Token::RaiseException(message));
    }
    Err(SyntaxError::UnknownBlock(content.to_string()))
}

/// `raise_exception("msg")` -> `msg`.
fn raise_exception_message(content: &str) -> Option<String> {
    let inner = content
        .strip_prefix("raise_exception(")?
        .strip_suffix(')')?
        .trim();
    Some(match scan::quoted_literal(inner) {
        Some((_, message)) => message,
        None => inner.trim_matches(|c| c == '"' || c == '\'').to_string(),
    })
}
