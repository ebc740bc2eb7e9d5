//! Load-order computation
//!
//! Depth-first topological sort with three-coloring. Back edges (cycles)
//! are recorded and skipped instead of aborting, so every node always ends
//! up in the order exactly once.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::module::registry::dependencies::DependencyGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Output of [`topological_sort`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortOutcome {
    /// Every node, dependencies before dependents
    pub load_order: Vec<String>,
    /// Each detected cycle, listing all members in traversal order
    pub cycles: Vec<Vec<String>>,
}

/// Compute a dependency-first load order.
///
/// Roots are visited in lexicographic order and each node's dependencies in
/// declared order, so the result only depends on the graph contents. A node
/// is appended once all of its dependencies are done. When a dependency is
/// still in progress the edge closes a cycle: the cycle is recorded and the
/// edge is ignored for ordering.
pub fn topological_sort(graph: &DependencyGraph) -> SortOutcome {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(graph.len());
    let mut outcome = SortOutcome {
        load_order: Vec::with_capacity(graph.len()),
        cycles: Vec::new(),
    };
    let mut seen_cycles: HashSet<Vec<String>> = HashSet::new();

    for root in graph.nodes() {
        if marks.contains_key(root) {
            continue;
        }

        // Explicit stack: (node, index of next dependency to visit).
        // The stack is exactly the current in-progress path.
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::InProgress);

        while let Some((node, dep_idx)) = stack.last_mut() {
            let node: &str = *node;
            let deps = graph.dependencies_of(node);

            if *dep_idx < deps.len() {
                let dep = deps[*dep_idx].as_str();
                *dep_idx += 1;

                match marks.get(dep) {
                    None => {
                        marks.insert(dep, Mark::InProgress);
                        stack.push((dep, 0));
                    }
                    Some(Mark::InProgress) => {
                        let start = stack
                            .iter()
                            .position(|(n, _)| *n == dep)
                            .unwrap_or(stack.len() - 1);
                        let members: Vec<String> =
                            stack[start..].iter().map(|(n, _)| n.to_string()).collect();
                        if seen_cycles.insert(canonical_cycle(&members)) {
                            warn!(
                                "Dependency cycle detected: {} -> {}",
                                members.join(" -> "),
                                dep
                            );
                            outcome.cycles.push(members);
                        }
                    }
                    Some(Mark::Done) => {}
                }
            } else {
                marks.insert(node, Mark::Done);
                outcome.load_order.push(node.to_string());
                stack.pop();
            }
        }
    }

    debug!("Load order: {:?}", outcome.load_order);
    outcome
}

/// Rotate a cycle so it starts at its smallest member, making the same loop
/// found from different entry points compare equal.
fn canonical_cycle(members: &[String]) -> Vec<String> {
    let start = members
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    members[start..]
        .iter()
        .chain(members[..start].iter())
        .cloned()
        .collect()
}
