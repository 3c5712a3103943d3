//! Structural tree types for compiled PTL templates

use crate::expr::Expr;
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One node of the validated template tree. The tree is exclusively owned by
/// its compiled template; children are owned by their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Allow-listed inert markup (`div`, `p`, ...). Attributes here already
    /// passed schema validation.
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        children: Vec<Node>,
        line: usize,
    },
    /// A registered component instance with schema-resolved props.
    Component {
        tag: String,
        props: BTreeMap<String, Value>,
        children: Vec<Node>,
        line: usize,
    },
    /// Literal text interleaved with `{expression}` spans.
    Text { segments: Vec<TextSegment> },
    Conditional(ConditionalBlock),
    /// ForEach over a collection expression.
    Loop {
        source: Expr,
        item: String,
        index: Option<String>,
        children: Vec<Node>,
        line: usize,
    },
    /// An event trigger owning an ordered action list. Handler ids are
    /// assigned after parsing and are stable within one compiled template.
    Handler {
        id: usize,
        event: String,
        actions: Vec<ActionNode>,
        line: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TextSegment {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionalBlock {
    Show {
        when: Expr,
        children: Vec<Node>,
        line: usize,
    },
    Choose {
        whens: Vec<WhenBranch>,
        otherwise: Option<Vec<Node>>,
        line: usize,
    },
    IfOwner { children: Vec<Node>, line: usize },
    IfVisitor { children: Vec<Node>, line: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenBranch {
    pub condition: Expr,
    pub children: Vec<Node>,
}

/// One imperative instruction inside a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionNode {
    pub kind: ActionKind,
    pub line: usize,
}

/// The closed action vocabulary. Collection operators read their source
/// expression, evaluate a per-`item` expression where the contract calls for
/// one, and write their result to a target variable through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    Set {
        var: String,
        expr: Expr,
    },
    Toggle {
        var: String,
    },
    Increment {
        var: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    Decrement {
        var: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    Filter {
        source: Expr,
        target: String,
        predicate: Expr,
    },
    Sort {
        source: Expr,
        target: String,
        by: Expr,
        descending: bool,
    },
    Transform {
        source: Expr,
        target: String,
        expr: Expr,
    },
    Find {
        source: Expr,
        target: String,
        predicate: Expr,
    },
    Count {
        source: Expr,
        target: String,
        predicate: Option<Expr>,
    },
    Sum {
        source: Expr,
        target: String,
        property: Option<Expr>,
    },
    Get {
        source: Expr,
        target: String,
        at: Expr,
    },
}

impl ActionKind {
    /// The variable this action writes.
    pub fn target(&self) -> &str {
        match self {
            ActionKind::Set { var, .. }
            | ActionKind::Toggle { var }
            | ActionKind::Increment { var, .. }
            | ActionKind::Decrement { var, .. } => var,
            ActionKind::Filter { target, .. }
            | ActionKind::Sort { target, .. }
            | ActionKind::Transform { target, .. }
            | ActionKind::Find { target, .. }
            | ActionKind::Count { target, .. }
            | ActionKind::Sum { target, .. }
            | ActionKind::Get { target, .. } => target,
        }
    }

    /// Every `$vars` name this action reads (targets are writes, not reads).
    pub fn collect_var_reads(&self, out: &mut BTreeSet<String>) {
        match self {
            ActionKind::Set { expr, .. } => expr.collect_vars(out),
            ActionKind::Toggle { var } | ActionKind::Increment { var, .. } | ActionKind::Decrement { var, .. } => {
                // Read-modify-write.
                out.insert(var.clone());
            }
            ActionKind::Filter { source, predicate, .. }
            | ActionKind::Find { source, predicate, .. } => {
                source.collect_vars(out);
                predicate.collect_vars(out);
            }
            ActionKind::Sort { source, by, .. } => {
                source.collect_vars(out);
                by.collect_vars(out);
            }
            ActionKind::Transform { source, expr, .. } => {
                source.collect_vars(out);
                expr.collect_vars(out);
            }
            ActionKind::Count { source, predicate, .. } => {
                source.collect_vars(out);
                if let Some(p) = predicate {
                    p.collect_vars(out);
                }
            }
            ActionKind::Sum { source, property, .. } => {
                source.collect_vars(out);
                if let Some(p) = property {
                    p.collect_vars(out);
                }
            }
            ActionKind::Get { source, at, .. } => {
                source.collect_vars(out);
                at.collect_vars(out);
            }
        }
    }
}

impl Node {
    pub fn line(&self) -> usize {
        match self {
            Node::Element { line, .. }
            | Node::Component { line, .. }
            | Node::Loop { line, .. }
            | Node::Handler { line, .. } => *line,
            Node::Text { .. } => 0,
            Node::Conditional(block) => block.line(),
        }
    }

    /// Direct children where the node has a single child list. Conditional
    /// branches are traversed through `ConditionalBlock` instead.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element { children, .. }
            | Node::Component { children, .. }
            | Node::Loop { children, .. } => children,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Element { children, .. }
            | Node::Component { children, .. }
            | Node::Loop { children, .. } => Some(children),
            _ => None,
        }
    }
}

impl ConditionalBlock {
    pub fn line(&self) -> usize {
        match self {
            ConditionalBlock::Show { line, .. }
            | ConditionalBlock::Choose { line, .. }
            | ConditionalBlock::IfOwner { line, .. }
            | ConditionalBlock::IfVisitor { line, .. } => *line,
        }
    }

    /// Every branch body, taken or not. Analysis passes must see all of them.
    pub fn branches(&self) -> Vec<&[Node]> {
        match self {
            ConditionalBlock::Show { children, .. }
            | ConditionalBlock::IfOwner { children, .. }
            | ConditionalBlock::IfVisitor { children, .. } => vec![children.as_slice()],
            ConditionalBlock::Choose { whens, otherwise, .. } => {
                let mut out: Vec<&[Node]> =
                    whens.iter().map(|w| w.children.as_slice()).collect();
                if let Some(other) = otherwise {
                    out.push(other.as_slice());
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;

    #[test]
    fn test_action_target_and_reads() {
        let action = ActionKind::Filter {
            source: parse_expression("$vars.products").unwrap(),
            target: "matches".to_string(),
            predicate: parse_expression("item.price < $vars.cap").unwrap(),
        };
        assert_eq!(action.target(), "matches");
        let mut reads = BTreeSet::new();
        action.collect_var_reads(&mut reads);
        let reads: Vec<_> = reads.into_iter().collect();
        assert_eq!(reads, vec!["cap", "products"]);
    }

    #[test]
    fn test_increment_counts_as_read() {
        let action = ActionKind::Increment {
            var: "count".to_string(),
            min: None,
            max: Some(10.0),
        };
        let mut reads = BTreeSet::new();
        action.collect_var_reads(&mut reads);
        assert!(reads.contains("count"));
    }

    #[test]
    fn test_choose_branches_exposed_for_analysis() {
        let block = ConditionalBlock::Choose {
            whens: vec![WhenBranch {
                condition: parse_expression("true").unwrap(),
                children: vec![Node::Text {
                    segments: vec![TextSegment::Literal("a".into())],
                }],
            }],
            otherwise: Some(vec![Node::Text {
                segments: vec![TextSegment::Literal("b".into())],
            }]),
            line: 1,
        };
        assert_eq!(block.branches().len(), 2);
    }

    #[test]
    fn test_node_serde_round_trip() {
        let node = Node::Loop {
            source: parse_expression("posts").unwrap(),
            item: "post".to_string(),
            index: Some("i".to_string()),
            children: vec![Node::Text {
                segments: vec![
                    TextSegment::Literal("#".into()),
                    TextSegment::Expr(parse_expression("i").unwrap()),
                ],
            }],
            line: 7,
        };
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }
}
