//! Islands analysis: partitioning a tree into static and interactive regions
//!
//! A node is stateful if it is (or owns) a handler, reads a page variable in
//! its rendering, or loops over a variable-backed collection. Each maximal
//! stateful subtree becomes an island; stateful siblings coupled through a
//! trigger (one writes what the other reads) are merged by rooting the
//! island at their shared parent. Everything outside every island is static
//! and never re-renders after first paint.

use crate::ast::{ConditionalBlock, Node, TextSegment};
use crate::error::{Result, TemplateError};
use crate::types::{Island, NodePath};
use std::collections::BTreeSet;

/// Compute the island set for a validated tree. The tree itself is not
/// modified.
pub fn analyze(tree: &[Node]) -> Vec<Island> {
    let mut islands = Vec::new();
    let mut path = Vec::new();
    visit_list(tree, &mut path, &mut islands);
    islands
}

fn visit_list(nodes: &[Node], path: &mut NodePath, islands: &mut Vec<Island>) {
    for (i, node) in nodes.iter().enumerate() {
        path.push(i);
        visit(node, path, islands);
        path.pop();
    }
}

fn visit(node: &Node, path: &mut NodePath, islands: &mut Vec<Island>) {
    if !subtree_stateful(node) {
        return;
    }
    if intrinsic_stateful(node) {
        islands.push(island_at(node, path, islands.len()));
        return;
    }
    // A container whose statefulness comes only from descendants: merge
    // coupled siblings here, otherwise push the boundary further down.
    let children = node.children();
    if siblings_coupled(children) {
        islands.push(island_at(node, path, islands.len()));
        return;
    }
    visit_list(children, path, islands);
}

/// Stateful in its own right: the island boundary freezes at this node and
/// the whole subtree hydrates as one unit.
fn intrinsic_stateful(node: &Node) -> bool {
    match node {
        Node::Handler { .. } => true,
        Node::Text { segments } => segments.iter().any(|s| match s {
            TextSegment::Expr(e) => e.reads_vars(),
            TextSegment::Literal(_) => false,
        }),
        Node::Conditional(block) => {
            condition_reads_vars(block)
                || block
                    .branches()
                    .iter()
                    .any(|branch| branch.iter().any(subtree_stateful))
        }
        Node::Loop { source, children, .. } => {
            source.reads_vars() || children.iter().any(subtree_stateful)
        }
        // A trigger, or variable-reading text, roots the island at the
        // element that owns it so re-render replaces a whole element.
        Node::Element { children, .. } | Node::Component { children, .. } => {
            children.iter().any(|c| match c {
                Node::Handler { .. } => true,
                Node::Text { segments } => segments.iter().any(|s| match s {
                    TextSegment::Expr(e) => e.reads_vars(),
                    TextSegment::Literal(_) => false,
                }),
                _ => false,
            })
        }
    }
}

fn subtree_stateful(node: &Node) -> bool {
    intrinsic_stateful(node) || node.children().iter().any(subtree_stateful)
}

fn condition_reads_vars(block: &ConditionalBlock) -> bool {
    match block {
        ConditionalBlock::Show { when, .. } => when.reads_vars(),
        ConditionalBlock::Choose { whens, .. } => {
            whens.iter().any(|w| w.condition.reads_vars())
        }
        ConditionalBlock::IfOwner { .. } | ConditionalBlock::IfVisitor { .. } => false,
    }
}

/// Sibling lists where one child's trigger writes what another child reads
/// must hydrate together.
fn siblings_coupled(children: &[Node]) -> bool {
    let stateful: Vec<&Node> = children.iter().filter(|c| subtree_stateful(c)).collect();
    for (i, a) in stateful.iter().enumerate() {
        let mut writes = BTreeSet::new();
        collect_handler_writes(a, &mut writes);
        if writes.is_empty() {
            continue;
        }
        for (j, b) in stateful.iter().enumerate() {
            if i == j {
                continue;
            }
            let mut reads = BTreeSet::new();
            collect_render_reads(b, &mut reads);
            if !writes.is_disjoint(&reads) {
                return true;
            }
        }
    }
    false
}

fn island_at(node: &Node, path: &NodePath, id: usize) -> Island {
    let mut variables = BTreeSet::new();
    collect_render_reads(node, &mut variables);
    let mut handlers = Vec::new();
    collect_handler_ids(node, &mut handlers);
    Island {
        id,
        path: path.clone(),
        variables,
        handlers,
    }
}

/// Every `$vars` name the subtree's rendering reads, across all conditional
/// branches (a variable write may flip which branch renders).
pub fn collect_render_reads(node: &Node, out: &mut BTreeSet<String>) {
    match node {
        Node::Text { segments } => {
            for segment in segments {
                if let TextSegment::Expr(e) = segment {
                    e.collect_vars(out);
                }
            }
        }
        Node::Conditional(block) => {
            match block {
                ConditionalBlock::Show { when, .. } => when.collect_vars(out),
                ConditionalBlock::Choose { whens, .. } => {
                    for w in whens {
                        w.condition.collect_vars(out);
                    }
                }
                _ => {}
            }
            for branch in block.branches() {
                for child in branch {
                    collect_render_reads(child, out);
                }
            }
        }
        Node::Loop { source, children, .. } => {
            source.collect_vars(out);
            for child in children {
                collect_render_reads(child, out);
            }
        }
        Node::Handler { .. } => {}
        Node::Element { children, .. } | Node::Component { children, .. } => {
            for child in children {
                collect_render_reads(child, out);
            }
        }
    }
}

fn collect_handler_ids(node: &Node, out: &mut Vec<usize>) {
    match node {
        Node::Handler { id, .. } => out.push(*id),
        Node::Conditional(block) => {
            for branch in block.branches() {
                for child in branch {
                    collect_handler_ids(child, out);
                }
            }
        }
        _ => {
            for child in node.children() {
                collect_handler_ids(child, out);
            }
        }
    }
}

fn collect_handler_writes(node: &Node, out: &mut BTreeSet<String>) {
    match node {
        Node::Handler { actions, .. } => {
            for action in actions {
                out.insert(action.kind.target().to_string());
            }
        }
        Node::Conditional(block) => {
            for branch in block.branches() {
                for child in branch {
                    collect_handler_writes(child, out);
                }
            }
        }
        _ => {
            for child in node.children() {
                collect_handler_writes(child, out);
            }
        }
    }
}

/// Resolve an island path back to its node. Island roots are only ever
/// reachable through plain child lists, never inside conditional branches.
pub fn resolve_path<'a>(tree: &'a [Node], path: &NodePath) -> Option<&'a Node> {
    let (&first, rest) = path.split_first()?;
    let mut node = tree.get(first)?;
    for &idx in rest {
        node = node.children().get(idx)?;
    }
    Some(node)
}

/// Check the analyzer's own invariants: islands never overlap, every island
/// path resolves, and every stateful node sits inside some island. A failure
/// here is a compiler bug, not bad template input.
pub fn verify(tree: &[Node], islands: &[Island]) -> Result<()> {
    for (i, a) in islands.iter().enumerate() {
        if resolve_path(tree, &a.path).is_none() {
            return Err(TemplateError::render(format!(
                "island {} references a node outside the tree",
                a.id
            )));
        }
        for b in islands.iter().skip(i + 1) {
            if is_prefix(&a.path, &b.path) || is_prefix(&b.path, &a.path) {
                return Err(TemplateError::render(format!(
                    "islands {} and {} overlap",
                    a.id, b.id
                )));
            }
        }
    }

    let mut path = Vec::new();
    verify_coverage(tree, &mut path, islands)
}

fn verify_coverage(nodes: &[Node], path: &mut NodePath, islands: &[Island]) -> Result<()> {
    for (i, node) in nodes.iter().enumerate() {
        path.push(i);
        let covered = islands.iter().any(|isl| is_prefix(&isl.path, path));
        if intrinsic_stateful(node) && !covered {
            path.pop();
            return Err(TemplateError::render(
                "stateful node outside every island".to_string(),
            ));
        }
        if !covered {
            verify_coverage(node.children(), path, islands)?;
        }
        path.pop();
    }
    Ok(())
}

fn is_prefix(prefix: &NodePath, path: &NodePath) -> bool {
    path.len() >= prefix.len() && path[..prefix.len()] == prefix[..]
}
