//! Cycle detection and dependency ordering over mapper declarations.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Find a dependency cycle reachable from any of `roots`.
///
/// Returns the offending path, starting and ending at the node that closes the
/// loop (`[A, B, A]`). Each child gets its own copy of the visited set, so a
/// node reached twice through different branches is not a cycle.
pub fn detect_cycles<T, F, I>(roots: &[T], dependencies: F) -> Result<(), Vec<T>>
where
    T: Clone + Eq + Hash,
    F: Fn(&T) -> I,
    I: IntoIterator<Item = T>,
{
    for root in roots {
        let mut path = Vec::new();
        visit(root, &dependencies, &mut path, HashSet::new())?;
    }
    Ok(())
}

fn visit<T, F, I>(
    node: &T,
    dependencies: &F,
    path: &mut Vec<T>,
    mut visited: HashSet<T>,
) -> Result<(), Vec<T>>
where
    T: Clone + Eq + Hash,
    F: Fn(&T) -> I,
    I: IntoIterator<Item = T>,
{
    if visited.contains(node) {
        let start = path.iter().position(|seen| seen == node).unwrap_or(0);
        let mut cycle = path[start..].to_vec();
        cycle.push(node.clone());
        return Err(cycle);
    }
    visited.insert(node.clone());
    path.push(node.clone());
    for child in dependencies(node) {
        visit(&child, dependencies, path, visited.clone())?;
    }
    path.pop();
    Ok(())
}

/// Order `nodes` so that every node comes after all of its dependencies.
///
/// Repeated sweeps: any dependency found after a node that needs it is moved to
/// the front, and sweeping continues until a pass moves nothing. Dependencies
/// outside `nodes` are ignored. The input must be acyclic.
pub fn sweep_sort<T, F, I>(nodes: Vec<T>, dependencies: F) -> Vec<T>
where
    T: Clone + Eq + Hash,
    F: Fn(&T) -> I,
    I: IntoIterator<Item = T>,
{
    let mut order = nodes;
    // sweeping converges well within this for acyclic input
    let max_passes = order.len() * order.len() + 1;

    for _ in 0..max_passes {
        let index: HashMap<&T, usize> = order.iter().enumerate().map(|(i, n)| (n, i)).collect();
        let mut hoisted: Vec<T> = Vec::new();

        for (position, node) in order.iter().enumerate() {
            for dependency in dependencies(node) {
                if let Some(&found) = index.get(&dependency) {
                    if found > position && !hoisted.contains(&dependency) {
                        hoisted.push(dependency);
                    }
                }
            }
        }

        if hoisted.is_empty() {
            return order;
        }

        let rest = order.into_iter().filter(|node| !hoisted.contains(node));
        order = hoisted.iter().cloned().chain(rest).collect();
    }

    log::warn!("sweep_sort did not settle after {} passes", max_passes);
    order
}
