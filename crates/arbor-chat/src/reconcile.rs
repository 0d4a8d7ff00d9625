use arbor_persist::ChatMessage;

/// Merge the in-memory draft branch with the branch recomputed by the store.
///
/// The store always wins: whatever the draft held (placeholders, partial
/// content, nodes never committed) is dropped in favour of `store`.
pub fn reconcile(draft: Vec<ChatMessage>, store: Vec<ChatMessage>) -> Vec<ChatMessage> {
    if draft.len() != store.len() {
        tracing::trace!(
            draft = draft.len(),
            store = store.len(),
            "Discarding uncommitted draft nodes"
        );
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_wins_over_partial_draft() {
        let user = ChatMessage::user("hi", None);
        let mut draft_reply = ChatMessage::assistant("Hel", Some(user.id.clone()));
        let stored_reply = ChatMessage {
            content: "Hello".to_string(),
            ..draft_reply.clone()
        };
        draft_reply.content = "Hel".to_string();

        let merged = reconcile(
            vec![user.clone(), draft_reply],
            vec![user.clone(), stored_reply.clone()],
        );

        assert_eq!(merged, vec![user, stored_reply]);
    }

    #[test]
    fn test_uncommitted_nodes_are_dropped() {
        let user = ChatMessage::user("hi", None);
        let placeholder = ChatMessage::assistant("", Some(user.id.clone()));

        assert!(reconcile(vec![user, placeholder], Vec::new()).is_empty());
    }
}
