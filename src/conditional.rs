//! Branch resolution for conditional blocks
//!
//! At most one branch of any conditional is ever instantiated: untaken
//! branches are not rendered at all, so they contribute no output, no islands
//! and no re-render cost.

use crate::ast::{ConditionalBlock, Node};
use crate::context::DataContext;
use crate::expr::{evaluate, Scope};

/// Resolve which branch (if any) a conditional renders. Returns the child
/// list of the taken branch, or `None` when nothing renders.
pub fn resolve<'a>(
    block: &'a ConditionalBlock,
    scope: &Scope,
    ctx: &DataContext,
) -> Option<&'a [Node]> {
    match block {
        ConditionalBlock::Show { when, children, .. } => {
            if evaluate(when, scope).is_truthy() {
                Some(children)
            } else {
                None
            }
        }
        ConditionalBlock::Choose { whens, otherwise, .. } => {
            for branch in whens {
                if evaluate(&branch.condition, scope).is_truthy() {
                    return Some(&branch.children);
                }
            }
            otherwise.as_deref()
        }
        ConditionalBlock::IfOwner { children, .. } => {
            if ctx.viewer_is_owner() {
                Some(children)
            } else {
                None
            }
        }
        ConditionalBlock::IfVisitor { children, .. } => {
            if ctx.viewer_is_owner() {
                None
            } else {
                Some(children)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{TextSegment, WhenBranch};
    use crate::context::{OwnerProfile, Viewer};
    use crate::expr::parse_expression;

    fn text(s: &str) -> Node {
        Node::Text {
            segments: vec![TextSegment::Literal(s.to_string())],
        }
    }

    fn ctx() -> DataContext {
        DataContext::new(OwnerProfile {
            id: "u1".into(),
            handle: "maple".into(),
            display_name: "Maple".into(),
            bio: String::new(),
            avatar_url: None,
        })
    }

    #[test]
    fn test_show() {
        let ctx = ctx();
        let scope = Scope::new(ctx.root());
        let block = ConditionalBlock::Show {
            when: parse_expression("1 < 2").unwrap(),
            children: vec![text("yes")],
            line: 1,
        };
        assert!(resolve(&block, &scope, &ctx).is_some());

        let block = ConditionalBlock::Show {
            when: parse_expression("owner.missing").unwrap(),
            children: vec![text("yes")],
            line: 1,
        };
        assert!(resolve(&block, &scope, &ctx).is_none());
    }

    #[test]
    fn test_choose_first_true_wins() {
        let ctx = ctx();
        let scope = Scope::new(ctx.root());
        let block = ConditionalBlock::Choose {
            whens: vec![
                WhenBranch {
                    condition: parse_expression("false").unwrap(),
                    children: vec![text("a")],
                },
                WhenBranch {
                    condition: parse_expression("true").unwrap(),
                    children: vec![text("b")],
                },
                WhenBranch {
                    condition: parse_expression("true").unwrap(),
                    children: vec![text("c")],
                },
            ],
            otherwise: Some(vec![text("d")]),
            line: 1,
        };
        let taken = resolve(&block, &scope, &ctx).unwrap();
        assert_eq!(taken, &[text("b")][..]);
    }

    #[test]
    fn test_choose_otherwise_and_nothing() {
        let ctx = ctx();
        let scope = Scope::new(ctx.root());
        let whens = vec![WhenBranch {
            condition: parse_expression("false").unwrap(),
            children: vec![text("a")],
        }];
        let block = ConditionalBlock::Choose {
            whens: whens.clone(),
            otherwise: Some(vec![text("fallback")]),
            line: 1,
        };
        assert_eq!(resolve(&block, &scope, &ctx).unwrap(), &[text("fallback")][..]);

        let block = ConditionalBlock::Choose {
            whens,
            otherwise: None,
            line: 1,
        };
        assert!(resolve(&block, &scope, &ctx).is_none());
    }

    #[test]
    fn test_owner_visitor_split() {
        let owner_block = ConditionalBlock::IfOwner {
            children: vec![text("mine")],
            line: 1,
        };
        let visitor_block = ConditionalBlock::IfVisitor {
            children: vec![text("theirs")],
            line: 1,
        };

        let anonymous = ctx();
        let scope = Scope::new(anonymous.root());
        assert!(resolve(&owner_block, &scope, &anonymous).is_none());
        assert!(resolve(&visitor_block, &scope, &anonymous).is_some());

        let as_owner = ctx().with_viewer(Viewer {
            id: "u1".into(),
            handle: "maple".into(),
        });
        let scope = Scope::new(as_owner.root());
        assert!(resolve(&owner_block, &scope, &as_owner).is_some());
        assert!(resolve(&visitor_block, &scope, &as_owner).is_none());
    }
}
