//! Node Discovery
//!
//! Walks the address space below a root node and collects every variable
//! node into a [`NodeMap`]. Branches that cannot be browsed are recorded in
//! the report instead of aborting the walk.

use std::collections::HashSet;
use std::fmt;

use super::transport::{NodeClass, Session, TransportError};
use super::{InvalidTagName, NodeHandle, NodeMap, TagName};

/// Result of a discovery walk
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Every readable tag found
    pub nodes: NodeMap,
    /// Nodes that contributed nothing, and why
    pub skipped: Vec<SkippedBranch>,
    /// Number of distinct nodes visited
    pub visited: usize,
}

/// A node the walk could not use
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedBranch {
    pub node: NodeHandle,
    pub reason: SkipReason,
}

/// Why a node was skipped
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Browse name or node class could not be read
    Unclassifiable(TransportError),
    /// Children could not be listed; the subtree below is lost
    ChildrenUnavailable(TransportError),
    /// Browse name is not a usable tag name
    InvalidName(InvalidTagName),
    /// Another variable already owns this tag name
    DuplicateTag(TagName),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unclassifiable(e) => write!(f, "unclassifiable: {e}"),
            SkipReason::ChildrenUnavailable(e) => write!(f, "children unavailable: {e}"),
            SkipReason::InvalidName(e) => write!(f, "invalid name: {e}"),
            SkipReason::DuplicateTag(name) => write!(f, "duplicate tag {name}"),
        }
    }
}

impl DiscoveryReport {
    fn skip(&mut self, node: NodeHandle, reason: SkipReason) {
        self.skipped.push(SkippedBranch { node, reason });
    }

    fn record_variable(&mut self, node: &NodeHandle, browse_name: String) {
        let name = match TagName::new(browse_name) {
            Ok(name) => name,
            Err(e) => return self.skip(node.clone(), SkipReason::InvalidName(e)),
        };
        if let Err(duplicate) = self.nodes.insert(name, node.clone()) {
            self.skip(node.clone(), SkipReason::DuplicateTag(duplicate.name));
        }
    }
}

/// Depth-first walk from `root`, pre-order, children in browse order
///
/// A node is visited at most once, so reference cycles terminate.
pub async fn discover(session: &dyn Session, root: NodeHandle) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();
    let mut visited: HashSet<NodeHandle> = HashSet::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }

        match session.describe(&node).await {
            Ok(info) if info.class == NodeClass::Variable => {
                report.record_variable(&node, info.browse_name);
            }
            Ok(_) => {}
            Err(e) => report.skip(node.clone(), SkipReason::Unclassifiable(e)),
        }

        match session.children(&node).await {
            Ok(children) => {
                // Reverse so the first child is popped first
                stack.extend(
                    children
                        .into_iter()
                        .rev()
                        .filter(|child| !visited.contains(child)),
                );
            }
            Err(e) => report.skip(node, SkipReason::ChildrenUnavailable(e)),
        }
    }

    report.visited = visited.len();

    for branch in &report.skipped {
        tracing::debug!(node = %branch.node, reason = %branch.reason, "Discovery skipped node");
    }

    report
}
