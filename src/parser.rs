use std::collections::VecDeque;

use crate::ast::*;
use crate::error::SyntaxError;
use crate::lexer::Token;
use crate::scan;

/// Builds the node tree from a token stream, consuming all of it.
pub fn parse(tokens: Vec<Token>) -> Result<Template, SyntaxError> {
    let mut parser = Parser::new(tokens);
    let nodes = parser.parse_nodes()?;
    if let Some(token) = parser.consume() {
        return Err(SyntaxError::UnexpectedToken(describe(&token)));
    }
    tracing::debug!(nodes = nodes.len(), "parsed template");
    Ok(nodes)
}

pub struct Parser {
    tokens: VecDeque<Token>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.front()
    }

    fn consume(&mut self) -> Option<Token> {
        self.tokens.pop_front()
    }

    /// Parses sibling nodes until EOF or a block terminator, which is left unconsumed.
    pub fn parse_nodes(&mut self) -> Result<Vec<Node>, SyntaxError> {
        let mut nodes = Vec::new();
        loop {
            if let None | Some(Token::ElseIf(_) | Token::Else | Token::IfEnd | Token::ForEnd) =
                self.peek()
            {
                break;
            }
            let Some(token) = self.consume() else { break };
            let node = match token {
                Token::Text {
                    value,
                    trim_left,
                    trim_right,
                } => Node::Text {
                    value,
                    trim_left,
                    trim_right,
                },
                Token::Variable {
                    expression,
                    trim_left,
                    trim_right,
                } => Node::Variable {
                    expression,
                    trim_left,
                    trim_right,
                },
                Token::IfStart(condition) => self.parse_if(&condition)?,
                Token::ForStart { item, list } => self.parse_for(item, &list)?,
                Token::Set { name, value } => Node::Set { name, value },
                Token::RaiseException(message) => Node::RaiseException(message),
                other => return Err(SyntaxError::UnexpectedToken(describe(&other))),
            };
            nodes.push(node);
        }
        Ok(nodes)
    }

    /// Called after `{% if %}` or `{% elif %}`. An elif becomes a nested `If`
    /// in the else branch, and that nested `If` consumes the shared `endif`.
    fn parse_if(&mut self, condition: &str) -> Result<Node, SyntaxError> {
        let condition = parse_condition(condition)?;
        let children = self.parse_nodes()?;

        let else_children = match self.consume() {
            Some(Token::IfEnd) => Vec::new(),
            Some(Token::ElseIf(next)) => vec![self.parse_if(&next)?],
            Some(Token::Else) => {
                let else_children = self.parse_nodes()?;
                match self.consume() {
                    Some(Token::IfEnd) => else_children,
                    Some(other) => return Err(SyntaxError::UnexpectedToken(describe(&other))),
                    None => return Err(SyntaxError::UnclosedBlock("if")),
                }
            }
            Some(other) => return Err(SyntaxError::UnexpectedToken(describe(&other))),
            None => return Err(SyntaxError::UnclosedBlock("if")),
        };

        Ok(Node::If {
            condition,
            children,
            else_children,
        })
    }

    fn parse_for(&mut self, item: String, list: &str) -> Result<Node, SyntaxError> {
        let list = parse_list_expression(list)?;
        let children = self.parse_nodes()?;
        match self.consume() {
            Some(Token::ForEnd) => Ok(Node::For {
                item,
                list,
                children,
            }),
            Some(other) => Err(SyntaxError::UnexpectedToken(describe(&other))),
            None => Err(SyntaxError::UnclosedBlock("for")),
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Text { value, .. } => format!("text {value:?}"),
        Token::Variable { expression, .. } => format!("{{{{ {expression} }}}}"),
        Token::IfStart(condition) => format!("{{% if {condition} %}}"),
        Token::ElseIf(condition) => format!("{{% elif {condition} %}}"),
        Token::Else => "{% else %}".to_string(),
        Token::IfEnd => "{% endif %}".to_string(),
        Token::ForStart { item, list } => format!("{{% for {item} in {list} %}}"),
        Token::ForEnd => "{% endfor %}".to_string(),
        Token::Set { name, value } => format!("{{% set {name} = {value} %}}"),
        Token::RaiseException(message) => format!("raise_exception({message:?})"),
    }
}

/// Parses an `if` condition.
///
/// Binding from loosest to tightest: `or`, `and`, prefix `not`, the
/// comparisons `==`/`!=`/`in`/`not in`, then the postfix tests
/// `is [not] defined` and `is [not] none`. Anything left is a literal
/// expression resolved by the evaluator.
pub fn parse_condition(expr: &str) -> Result<ConditionNode, SyntaxError> {
    let trimmed = expr.trim();
    if trimmed.is_empty() || !scan::is_balanced(trimmed) {
        return Err(SyntaxError::InvalidCondition(expr.to_string()));
    }
    if let Some(inner) = scan::strip_enclosing_parens(trimmed) {
        return parse_condition(inner);
    }

    for (keyword, op) in [("or", BinaryOperator::Or), ("and", BinaryOperator::And)] {
        let mut parts = scan::split_keyword(trimmed, keyword).into_iter();
        if parts.len() < 2 {
            continue;
        }
        let first = parse_condition(parts.next().unwrap_or_default())?;
        return parts.try_fold(first, |acc, part| {
            Ok(ConditionNode::binary(acc, op, parse_condition(part)?))
        });
    }

    if let Some(rest) = scan::strip_keyword_prefix(trimmed, "not") {
        return Ok(ConditionNode::not(parse_condition(rest)?));
    }
    if let Some(node) = parse_comparison(trimmed)? {
        return Ok(node);
    }
    if let Some(node) = parse_test(trimmed) {
        return Ok(node);
    }
    Ok(ConditionNode::Literal(trimmed.to_string()))
}

fn parse_comparison(expr: &str) -> Result<Option<ConditionNode>, SyntaxError> {
    // (start, end, operator, negated)
    let mut candidates: Vec<(usize, usize, BinaryOperator, bool)> = Vec::new();

    for (symbol, op) in [("==", BinaryOperator::Eq), ("!=", BinaryOperator::NotEq)] {
        if let Some(i) = scan::find_top_level(expr, symbol) {
            candidates.push((i, i + symbol.len(), op, false));
        }
    }
    if let Some(&i) = scan::keyword_offsets(expr, "in").first() {
        let head = expr[..i].trim_end();
        match head.strip_suffix("not") {
            Some(before) if before.ends_with(char::is_whitespace) => {
                candidates.push((before.len(), i + 2, BinaryOperator::In, true));
            }
            _ => candidates.push((i, i + 2, BinaryOperator::In, false)),
        }
    }

    let Some(&(start, end, op, negated)) = candidates.iter().min_by_key(|c| c.0) else {
        return Ok(None);
    };
    let left = expr[..start].trim();
    let right = expr[end..].trim();
    if left.is_empty() || right.is_empty() {
        return Err(SyntaxError::InvalidCondition(expr.to_string()));
    }

    let node = ConditionNode::binary(
        ConditionNode::Literal(left.to_string()),
        op,
        ConditionNode::Literal(right.to_string()),
    );
    Ok(Some(if negated { ConditionNode::not(node) } else { node }))
}

fn parse_test(expr: &str) -> Option<ConditionNode> {
    if let Some(name) = expr.strip_suffix(" is not defined") {
        return Some(ConditionNode::not(ConditionNode::IsDefined(name.trim().to_string())));
    }
    if let Some(name) = expr.strip_suffix(" is defined") {
        return Some(ConditionNode::IsDefined(name.trim().to_string()));
    }
    if let Some(name) = expr.strip_suffix(" is not none") {
        return Some(ConditionNode::IsNotNone(name.trim().to_string()));
    }
    if let Some(name) = expr.strip_suffix(" is none") {
        return Some(ConditionNode::not(ConditionNode::IsNotNone(name.trim().to_string())));
    }
    None
}

/// Parses a loop source such as `messages` or `messages[1:]`.
pub fn parse_list_expression(expr: &str) -> Result<ListNode, SyntaxError> {
    let trimmed = expr.trim();
    if let Some(open) = scan::trailing_index_group(trimmed) {
        let inner = &trimmed[open + 1..trimmed.len() - 1];
        if let Some((start, end)) = inner.split_once(':') {
            return Ok(ListNode::Slice {
                inner: Box::new(parse_list_expression(&trimmed[..open])?),
                start: parse_bound(start, trimmed)?,
                end: parse_bound(end, trimmed)?,
            });
        }
    }
    Ok(ListNode::Variable(trimmed.to_string()))
}

fn parse_bound(bound: &str, expr: &str) -> Result<Option<i64>, SyntaxError> {
    let bound = bound.trim();
    if bound.is_empty() {
        return Ok(None);
    }
    bound
        .parse()
        .map(Some)
        .map_err(|_| SyntaxError::InvalidSlice(expr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn lit(s: &str) -> ConditionNode {
        ConditionNode::Literal(s.to_string())
    }

    fn text(s: &str) -> Node {
        Node::Text {
            value: s.to_string(),
            trim_left: false,
            trim_right: false,
        }
    }

    #[test]
    fn or_binds_looser_than_and() {
        let node = parse_condition("a or b and c").unwrap();
        assert_eq!(
            node,
            ConditionNode::binary(
                lit("a"),
                BinaryOperator::Or,
                ConditionNode::binary(lit("b"), BinaryOperator::And, lit("c"))
            )
        );
    }

    #[test]
    fn not_binds_looser_than_tests_and_comparisons() {
        assert_eq!(
            parse_condition("not tools is defined").unwrap(),
            ConditionNode::not(ConditionNode::IsDefined("tools".into()))
        );
        assert_eq!(
            parse_condition("not x == 'a'").unwrap(),
            ConditionNode::not(ConditionNode::binary(lit("x"), BinaryOperator::Eq, lit("'a'")))
        );
        assert_eq!(
            parse_condition("not a and b").unwrap(),
            ConditionNode::binary(ConditionNode::not(lit("a")), BinaryOperator::And, lit("b"))
        );
    }

    #[test]
    fn parenthesized_groups_are_not_split() {
        let node =
            parse_condition("not (message.role == 'ipython' or 'tool_calls' in message)").unwrap();
        assert_eq!(
            node,
            ConditionNode::not(ConditionNode::binary(
                ConditionNode::binary(lit("message.role"), BinaryOperator::Eq, lit("'ipython'")),
                BinaryOperator::Or,
                ConditionNode::binary(lit("'tool_calls'"), BinaryOperator::In, lit("message")),
            ))
        );
    }

    #[test]
    fn postfix_tests() {
        assert_eq!(
            parse_condition("tools is not none").unwrap(),
            ConditionNode::IsNotNone("tools".into())
        );
        assert_eq!(
            parse_condition("tools is none").unwrap(),
            ConditionNode::not(ConditionNode::IsNotNone("tools".into()))
        );
        assert_eq!(
            parse_condition("x is not defined").unwrap(),
            ConditionNode::not(ConditionNode::IsDefined("x".into()))
        );
    }

    #[test]
    fn not_in_is_negated_membership() {
        assert_eq!(
            parse_condition("'a' not in items").unwrap(),
            ConditionNode::not(ConditionNode::binary(lit("'a'"), BinaryOperator::In, lit("items")))
        );
    }

    #[test]
    fn unbalanced_or_empty_conditions_fail() {
        assert!(matches!(parse_condition("(a and b"), Err(SyntaxError::InvalidCondition(_))));
        assert!(matches!(parse_condition("a and  and b"), Err(SyntaxError::InvalidCondition(_))));
        assert!(matches!(parse_condition("== b"), Err(SyntaxError::InvalidCondition(_))));
    }

    #[test]
    fn list_expression_slices() {
        assert_eq!(parse_list_expression("messages").unwrap(), ListNode::Variable("messages".into()));
        assert_eq!(
            parse_list_expression("messages[1:]").unwrap(),
            ListNode::Slice {
                inner: Box::new(ListNode::Variable("messages".into())),
                start: Some(1),
                end: None
            }
        );
        assert_eq!(
            parse_list_expression("items[:-1]").unwrap(),
            ListNode::Slice {
                inner: Box::new(ListNode::Variable("items".into())),
                start: None,
                end: Some(-1)
            }
        );
        assert_eq!(
            parse_list_expression("messages[0]").unwrap(),
            ListNode::Variable("messages[0]".into())
        );
        assert!(matches!(parse_list_expression("m[a:b]"), Err(SyntaxError::InvalidSlice(_))));
    }

    #[test]
    fn elif_desugars_into_a_chain() {
        let nodes = parse(tokenize("{% if a %}A{% elif b %}B{% elif c %}C{% else %}D{% endif %}").unwrap())
            .unwrap();
        let expected = Node::If {
            condition: lit("a"),
            children: vec![text("A")],
            else_children: vec![Node::If {
                condition: lit("b"),
                children: vec![text("B")],
                else_children: vec![Node::If {
                    condition: lit("c"),
                    children: vec![text("C")],
                    else_children: vec![text("D")],
                }],
            }],
        };
        assert_eq!(nodes, vec![expected]);
    }

    #[test]
    fn nested_blocks() {
        let nodes = parse(tokenize("{% for m in ms %}{% if m %}x{% endif %}{% endfor %}").unwrap())
            .unwrap();
        assert_eq!(
            nodes,
            vec![Node::For {
                item: "m".into(),
                list: ListNode::Variable("ms".into()),
                children: vec![Node::If {
                    condition: lit("m"),
                    children: vec![text("x")],
                    else_children: vec![],
                }],
            }]
        );
    }

    #[test]
    fn unclosed_and_stray_blocks_fail() {
        assert_eq!(
            parse(tokenize("{% if a %}x").unwrap()),
            Err(SyntaxError::UnclosedBlock("if"))
        );
        assert_eq!(
            parse(tokenize("{% for a in b %}x").unwrap()),
            Err(SyntaxError::UnclosedBlock("for"))
        );
        assert!(matches!(
            parse(tokenize("x{% endif %}").unwrap()),
            Err(SyntaxError::UnexpectedToken(_))
        ));
        assert!(matches!(
            parse(tokenize("{% if a %}{% endfor %}").unwrap()),
            Err(SyntaxError::UnexpectedToken(_))
        ));
    }
}
