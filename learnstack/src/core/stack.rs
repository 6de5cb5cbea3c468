//! Queries and transitions over the flat, level-encoded stack.

use crate::core::types::{NodeStatus, StackNode};

/// Identifier given to the node seeded from the session goal.
pub const ROOT_ID: &str = "root";

/// Initial stack for a new session: the goal as the single active root.
pub fn seed_stack(goal: &str) -> Vec<StackNode> {
    vec![StackNode {
        id: ROOT_ID.to_string(),
        topic: goal.trim().to_string(),
        level: 0,
        status: NodeStatus::Active,
    }]
}

/// First node marked `Active`, if any.
pub fn active_node(stack: &[StackNode]) -> Option<&StackNode> {
    stack.iter().find(|node| node.status == NodeStatus::Active)
}

pub fn find_node<'a>(stack: &'a [StackNode], id: &str) -> Option<&'a StackNode> {
    stack.iter().find(|node| node.id == id)
}

/// Resolve the `(child, parent)` pair a pop from `selected_id` would act on.
///
/// The selected node qualifies as a parent when its level is exactly one
/// above the active node. Any node at that level qualifies, including
/// siblings of the true parent: the wire format carries no parent
/// reference, so this is the only place that inference lives.
pub fn eligible_parent<'a>(
    stack: &'a [StackNode],
    selected_id: &str,
) -> Option<(&'a StackNode, &'a StackNode)> {
    let child = active_node(stack)?;
    let parent = find_node(stack, selected_id)?;
    if parent.id == child.id || child.level == 0 || parent.level != child.level - 1 {
        return None;
    }
    Some((child, parent))
}

/// Build the stack that results from popping `child_id` back to `parent_id`.
///
/// The child is filtered out and the parent marked `Active` in a fresh
/// vector, so callers replace their stack in one assignment and never
/// observe an intermediate state with zero active nodes.
pub fn pop_to_parent(
    stack: &[StackNode],
    child_id: &str,
    parent_id: &str,
) -> Result<Vec<StackNode>, String> {
    if find_node(stack, child_id).is_none() {
        return Err(format!("child node '{child_id}' not found"));
    }

    let mut next: Vec<StackNode> = stack
        .iter()
        .filter(|node| node.id != child_id)
        .cloned()
        .collect();

    let parent = next
        .iter_mut()
        .find(|node| node.id == parent_id)
        .ok_or_else(|| format!("parent node '{parent_id}' not found"))?;
    parent.status = NodeStatus::Active;

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{active, done, waiting};

    fn three_deep() -> Vec<StackNode> {
        vec![
            waiting("root", "Recursion", 0),
            waiting("n1", "Base Case", 1),
            active("n2", "Termination", 2),
        ]
    }

    #[test]
    fn seed_stack_has_single_active_root() {
        let stack = seed_stack("  Recursion ");
        assert_eq!(stack, vec![active("root", "Recursion", 0)]);
    }

    #[test]
    fn eligible_parent_requires_level_directly_above_active() {
        let stack = three_deep();
        let (child, parent) = eligible_parent(&stack, "n1").expect("eligible");
        assert_eq!(child.id, "n2");
        assert_eq!(parent.id, "n1");

        assert!(eligible_parent(&stack, "root").is_none());
        assert!(eligible_parent(&stack, "n2").is_none());
        assert!(eligible_parent(&stack, "missing").is_none());
    }

    #[test]
    fn eligible_parent_accepts_any_node_at_parent_level() {
        let stack = vec![
            waiting("root", "Recursion", 0),
            done("a", "Call Stack", 1),
            waiting("b", "Base Case", 1),
            active("c", "Termination", 2),
        ];
        assert!(eligible_parent(&stack, "a").is_some());
        assert!(eligible_parent(&stack, "b").is_some());
    }

    #[test]
    fn root_active_has_no_parent() {
        let stack = seed_stack("Recursion");
        assert!(eligible_parent(&stack, "root").is_none());
    }

    #[test]
    fn eligible_parent_requires_an_active_node() {
        let stack = vec![waiting("root", "Recursion", 0), waiting("n1", "Base", 1)];
        assert!(eligible_parent(&stack, "root").is_none());
    }

    #[test]
    fn pop_removes_child_and_activates_parent() {
        let next = pop_to_parent(&three_deep(), "n2", "n1").expect("pop");
        assert_eq!(
            next,
            vec![
                waiting("root", "Recursion", 0),
                active("n1", "Base Case", 1),
            ]
        );
        assert_eq!(
            next.iter()
                .filter(|node| node.status == NodeStatus::Active)
                .count(),
            1
        );
    }

    #[test]
    fn pop_errors_when_nodes_are_missing() {
        let err = pop_to_parent(&three_deep(), "gone", "n1").expect_err("missing child");
        assert!(err.contains("gone"));
        let err = pop_to_parent(&three_deep(), "n2", "gone").expect_err("missing parent");
        assert!(err.contains("gone"));
    }
}
