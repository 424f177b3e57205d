use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    And,
    Or,
    Eq,
    NotEq,
    In,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Eq => "==",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::In => "in",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
}

/// Parsed `{% if %}` condition. Leaves keep their raw expression text,
/// which the evaluator resolves at render time.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    Literal(String),
    UnaryOp(UnaryOperator, Box<ConditionNode>),
    BinaryOp(Box<ConditionNode>, BinaryOperator, Box<ConditionNode>),
    IsDefined(String),
    IsNotNone(String),
}

impl ConditionNode {
    pub fn not(child: ConditionNode) -> Self {
        ConditionNode::UnaryOp(UnaryOperator::Not, Box::new(child))
    }

    pub fn binary(left: ConditionNode, op: BinaryOperator, right: ConditionNode) -> Self {
        ConditionNode::BinaryOp(Box::new(left), op, Box::new(right))
    }
}

/// Iterable source of a `{% for %}` loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ListNode {
    Variable(String),
    /// `inner[start:end]`; missing bounds resolve when the loop runs.
    Slice {
        inner: Box<ListNode>,
        start: Option<i64>,
        end: Option<i64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
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
    If {
        condition: ConditionNode,
        children: Vec<Node>,
        else_children: Vec<Node>,
    },
    For {
        item: String,
        list: ListNode,
        children: Vec<Node>,
    },
    Set {
        name: String,
        value: String,
    },
    RaiseException(String),
}

pub type Template = Vec<Node>;
