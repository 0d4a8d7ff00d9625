//! Arena view over a chat's flat message collection.
//!
//! Messages are indexed by id and grouped under their parent id. Every walk
//! is iterative and carries a visited set, so a corrupted parent chain ends
//! the walk instead of looping.

use std::collections::{HashMap, HashSet};

use crate::models::ChatMessage;

pub struct MessageTree<'a> {
    by_id: HashMap<&'a str, &'a ChatMessage>,
    /// Children per parent id (`None` = roots), oldest first
    children: HashMap<Option<&'a str>, Vec<&'a ChatMessage>>,
}

impl<'a> MessageTree<'a> {
    pub fn new(messages: &'a [ChatMessage]) -> Self {
        let mut by_id = HashMap::with_capacity(messages.len());
        let mut children: HashMap<Option<&'a str>, Vec<&'a ChatMessage>> = HashMap::new();

        for message in messages {
            by_id.insert(message.id.as_str(), message);
            children
                .entry(message.parent_message_id.as_deref())
                .or_default()
                .push(message);
        }

        // stable: equal timestamps keep insertion order
        for list in children.values_mut() {
            list.sort_by_key(|m| m.created_at);
        }

        Self { by_id, children }
    }

    pub fn get(&self, id: &str) -> Option<&'a ChatMessage> {
        self.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Children of `parent` (or the roots for `None`), oldest first
    pub fn children(&self, parent: Option<&'a str>) -> &[&'a ChatMessage] {
        self.children
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Root-first path ending at `leaf_id`.
    ///
    /// Empty when the leaf is unknown. A parent id that is missing from the
    /// arena, or one already visited, ends the walk early.
    pub fn path_to(&self, leaf_id: &str) -> Vec<&'a ChatMessage> {
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(leaf_id);

        while let Some(id) = current {
            let Some(message) = self.get(id) else {
                if !path.is_empty() {
                    tracing::warn!(parent_id = id, "Broken parent chain, stopping branch walk");
                }
                break;
            };
            if !visited.insert(message.id.as_str()) {
                tracing::warn!(message_id = id, "Parent cycle detected, stopping branch walk");
                break;
            }
            path.push(message);
            current = message.parent_message_id.as_deref();
        }

        path.reverse();
        path
    }

    /// Messages sharing `(parent, role)` with `message_id`, oldest first,
    /// and the position of `message_id` among them
    pub fn siblings(&self, message_id: &str) -> Option<(Vec<&'a ChatMessage>, usize)> {
        let message = self.get(message_id)?;
        let siblings: Vec<&'a ChatMessage> = self
            .children(message.parent_message_id.as_deref())
            .iter()
            .copied()
            .filter(|m| m.role == message.role)
            .collect();
        let index = siblings.iter().position(|m| m.id == message_id)?;
        Some((siblings, index))
    }

    /// Follow the earliest-created child down from `from_id` until a
    /// message without children is reached; returns that leaf's id
    pub fn deepest_leaf(&self, from_id: &'a str) -> &'a str {
        let mut current = from_id;
        let mut visited = HashSet::new();
        visited.insert(current);

        while let Some(first) = self.children(Some(current)).first() {
            if !visited.insert(first.id.as_str()) {
                tracing::warn!(message_id = %first.id, "Parent cycle detected, stopping leaf descent");
                break;
            }
            current = first.id.as_str();
        }

        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;
    use chrono::{Duration, TimeZone, Utc};

    fn msg(id: &str, role: MessageRole, parent: Option<&str>, minute: i64) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            role,
            content: id.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
            parent_message_id: parent.map(str::to_string),
        }
    }

    fn ids(messages: &[&ChatMessage]) -> Vec<String> {
        messages.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn test_path_to_is_root_first() {
        let messages = vec![
            msg("a2", MessageRole::Assistant, Some("u1"), 1),
            msg("u1", MessageRole::User, None, 0),
            msg("u2", MessageRole::User, Some("a2"), 2),
        ];
        let tree = MessageTree::new(&messages);

        assert_eq!(ids(&tree.path_to("u2")), vec!["u1", "a2", "u2"]);
        assert!(tree.path_to("missing").is_empty());
    }

    #[test]
    fn test_path_stops_at_dangling_parent() {
        let messages = vec![
            msg("a1", MessageRole::Assistant, Some("gone"), 1),
            msg("u2", MessageRole::User, Some("a1"), 2),
        ];
        let tree = MessageTree::new(&messages);

        assert_eq!(ids(&tree.path_to("u2")), vec!["a1", "u2"]);
    }

    #[test]
    fn test_path_terminates_on_cycle() {
        let messages = vec![
            msg("x", MessageRole::User, Some("y"), 0),
            msg("y", MessageRole::Assistant, Some("x"), 1),
        ];
        let tree = MessageTree::new(&messages);

        assert_eq!(tree.path_to("x").len(), 2);
    }

    #[test]
    fn test_siblings_filter_by_role_and_sort_by_time() {
        let messages = vec![
            msg("u1", MessageRole::User, None, 0),
            msg("a-late", MessageRole::Assistant, Some("u1"), 5),
            msg("a-early", MessageRole::Assistant, Some("u1"), 1),
            msg("u-child", MessageRole::User, Some("u1"), 3),
        ];
        let tree = MessageTree::new(&messages);

        let (siblings, index) = tree.siblings("a-late").unwrap();
        assert_eq!(ids(&siblings), vec!["a-early", "a-late"]);
        assert_eq!(index, 1);
        assert!(tree.siblings("nope").is_none());
    }

    #[test]
    fn test_deepest_leaf_prefers_oldest_child() {
        let messages = vec![
            msg("u1", MessageRole::User, None, 0),
            msg("a1", MessageRole::Assistant, Some("u1"), 1),
            msg("u2-new", MessageRole::User, Some("a1"), 9),
            msg("u2-old", MessageRole::User, Some("a1"), 2),
            msg("a2", MessageRole::Assistant, Some("u2-old"), 3),
        ];
        let tree = MessageTree::new(&messages);

        assert_eq!(tree.deepest_leaf("u1"), "a2");
        assert_eq!(tree.deepest_leaf("u2-new"), "u2-new");
    }

    #[test]
    fn test_children_of_roots_and_parents() {
        let messages = vec![
            msg("u1", MessageRole::User, None, 0),
            msg("a-late", MessageRole::Assistant, Some("u1"), 4),
            msg("a-early", MessageRole::Assistant, Some("u1"), 1),
        ];
        let tree = MessageTree::new(&messages);

        assert_eq!(ids(tree.children(None)), vec!["u1"]);
        assert_eq!(ids(tree.children(Some("u1"))), vec!["a-early", "a-late"]);
        assert!(tree.children(Some("a-late")).is_empty());
    }

    #[test]
    fn test_deepest_leaf_terminates_on_cycle() {
        let messages = vec![
            msg("x", MessageRole::User, Some("y"), 0),
            msg("y", MessageRole::Assistant, Some("x"), 1),
        ];
        let tree = MessageTree::new(&messages);

        let leaf = tree.deepest_leaf("x");
        assert!(leaf == "x" || leaf == "y");
    }
}
