use arbor_persist::{
    ChatMessage, ChatStore, Direction, JsonFileBackend, MemoryBackend, MessageRole, PersistError,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
}

fn message(id: &str, role: MessageRole, parent: Option<&str>, minute: i64) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        role,
        content: format!("content of {}", id),
        created_at: at(minute),
        parent_message_id: parent.map(str::to_string),
    }
}

fn branch_ids(store: &ChatStore, chat_id: &str) -> Vec<String> {
    store
        .active_branch(chat_id)
        .into_iter()
        .map(|m| m.id)
        .collect()
}

/// u1 ─ a1 ─ u2 ─ a2
///    └ a1b ─ u3 ─ a3
///              └ u3b
fn branched_store() -> (ChatStore, String) {
    let mut store = ChatStore::in_memory();
    let chat_id = store.create_chat("Branches").unwrap().id;

    for m in [
        message("u1", MessageRole::User, None, 0),
        message("a1", MessageRole::Assistant, Some("u1"), 1),
        message("u2", MessageRole::User, Some("a1"), 2),
        message("a2", MessageRole::Assistant, Some("u2"), 3),
        message("a1b", MessageRole::Assistant, Some("u1"), 4),
        message("u3", MessageRole::User, Some("a1b"), 5),
        message("a3", MessageRole::Assistant, Some("u3"), 6),
        message("u3b", MessageRole::User, Some("a1b"), 7),
    ] {
        store.add_message(&chat_id, m).unwrap();
    }

    (store, chat_id)
}

#[test]
fn test_add_message_advances_leaf() {
    let mut store = ChatStore::in_memory();
    let chat_id = store.create_chat("t").unwrap().id;
    let user = ChatMessage::user("Hello", None);
    let user_id = user.id.clone();

    store.add_message(&chat_id, user).unwrap();

    let chat = store.get_chat(&chat_id).unwrap();
    assert_eq!(chat.current_leaf_message_id.as_deref(), Some(user_id.as_str()));
    assert_eq!(chat.messages.len(), 1);
}

#[test]
fn test_add_message_to_unknown_chat_is_noop() {
    let mut store = ChatStore::in_memory();
    store
        .add_message("missing", ChatMessage::user("x", None))
        .unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_add_message_rejects_dangling_parent_and_duplicates() {
    let mut store = ChatStore::in_memory();
    let chat_id = store.create_chat("t").unwrap().id;

    let orphan = ChatMessage::assistant("x", Some("nowhere".to_string()));
    assert!(matches!(
        store.add_message(&chat_id, orphan),
        Err(PersistError::DanglingParent { .. })
    ));

    let root = ChatMessage::user("root", None);
    store.add_message(&chat_id, root.clone()).unwrap();
    assert!(matches!(
        store.add_message(&chat_id, root),
        Err(PersistError::DuplicateMessage { .. })
    ));
}

#[test]
fn test_active_branch_follows_leaf_root_first() {
    let (store, chat_id) = branched_store();

    // last added message is the leaf
    assert_eq!(branch_ids(&store, &chat_id), vec!["u1", "a1b", "u3b"]);
}

#[test]
fn test_active_branch_empty_for_unknown_chat_or_unset_leaf() {
    let mut store = ChatStore::in_memory();
    let chat_id = store.create_chat("empty").unwrap().id;

    assert!(store.active_branch(&chat_id).is_empty());
    assert!(store.active_branch("missing").is_empty());
}

#[test]
fn test_siblings_sorted_with_current_index() {
    let (store, chat_id) = branched_store();

    let siblings = store.siblings(&chat_id, "a1b");
    let ids: Vec<&str> = siblings.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a1b"]);
    assert_eq!(siblings.current_index, 1);
    assert_eq!(siblings.messages[siblings.current_index].id, "a1b");

    // role is part of the sibling key: u3 and u3b share parent and role
    let siblings = store.siblings(&chat_id, "u3");
    assert_eq!(siblings.len(), 2);
    assert_eq!(siblings.current_index, 0);
}

#[test]
fn test_siblings_of_unknown_message_are_empty() {
    let (store, chat_id) = branched_store();

    let siblings = store.siblings(&chat_id, "nope");
    assert!(siblings.is_empty());
    assert_eq!(siblings.current_index, 0);
    assert!(store.siblings("missing", "u1").is_empty());
}

#[test]
fn test_switch_to_prev_sibling_descends_to_oldest_leaf() {
    let (mut store, chat_id) = branched_store();

    store
        .switch_to_sibling(&chat_id, "a1b", Direction::Prev)
        .unwrap();

    assert_eq!(branch_ids(&store, &chat_id), vec!["u1", "a1", "u2", "a2"]);
}

#[test]
fn test_switch_to_next_sibling_restores_built_chain() {
    let (mut store, chat_id) = branched_store();
    store
        .switch_to_sibling(&chat_id, "a1b", Direction::Prev)
        .unwrap();

    store
        .switch_to_sibling(&chat_id, "a1", Direction::Next)
        .unwrap();

    // under a1b the earliest child is u3, whose chain continues to a3
    assert_eq!(branch_ids(&store, &chat_id), vec!["u1", "a1b", "u3", "a3"]);
}

#[test]
fn test_switch_out_of_range_leaves_leaf_unchanged() {
    let (mut store, chat_id) = branched_store();
    let before = store.get_chat(&chat_id).unwrap().current_leaf_message_id.clone();

    store
        .switch_to_sibling(&chat_id, "a1", Direction::Prev)
        .unwrap();
    store
        .switch_to_sibling(&chat_id, "a1b", Direction::Next)
        .unwrap();
    store
        .switch_to_sibling(&chat_id, "u1", Direction::Next)
        .unwrap();

    let after = store.get_chat(&chat_id).unwrap().current_leaf_message_id.clone();
    assert_eq!(before, after);
}

#[test]
fn test_update_message_content() {
    let (mut store, chat_id) = branched_store();

    assert!(store
        .update_message_content(&chat_id, "a3", "longer answer")
        .unwrap());
    assert!(!store.update_message_content(&chat_id, "nope", "x").unwrap());

    let chat = store.get_chat(&chat_id).unwrap();
    assert_eq!(chat.message("a3").unwrap().content, "longer answer");
}

#[test]
fn test_title_update_delete_and_listing_order() {
    let document = serde_json::json!([
        {
            "id": "first",
            "title": "first",
            "messages": [],
            "currentLeafMessageId": null,
            "createdAt": at(0),
            "updatedAt": at(0)
        },
        {
            "id": "second",
            "title": "second",
            "messages": [],
            "currentLeafMessageId": null,
            "createdAt": at(5),
            "updatedAt": at(5)
        }
    ]);
    let mut store = ChatStore::open(MemoryBackend::with_document(document.to_string())).unwrap();

    let listing: Vec<&str> = store.all_chats().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(listing, vec!["second", "first"]);

    // renaming touches the chat, moving it to the front
    store.update_chat_title("first", "renamed").unwrap();

    let listing: Vec<&str> = store.all_chats().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(listing, vec!["first", "second"]);
    assert_eq!(store.get_chat("first").unwrap().title, "renamed");
    assert!(store.get_chat("first").unwrap().updated_at > at(5));

    store.delete_chat("first").unwrap();
    assert!(store.get_chat("first").is_none());
    assert_eq!(store.len(), 1);

    // unknown ids are no-ops
    store.delete_chat("missing").unwrap();
    store.update_chat_title("missing", "x").unwrap();
    assert_eq!(store.len(), 1);
}

#[test]
fn test_every_mutation_is_written_through() {
    let backend = MemoryBackend::new();
    let mut store = ChatStore::open(backend.clone()).unwrap();
    let chat_id = store.create_chat("persisted").unwrap().id;
    store
        .add_message(&chat_id, ChatMessage::user("Hello", None))
        .unwrap();

    let reopened = ChatStore::open(backend.clone()).unwrap();
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.active_branch(&chat_id).len(), 1);

    let document: serde_json::Value = serde_json::from_str(&backend.document().unwrap()).unwrap();
    assert_eq!(document[0]["title"], "persisted");
    assert!(document[0]["currentLeafMessageId"].is_string());
    assert_eq!(document[0]["messages"][0]["role"], "user");
}

#[test]
fn test_json_file_backend_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chats.json");

    let chat_id = {
        let mut store = ChatStore::open(JsonFileBackend::new(&path)).unwrap();
        let chat_id = store.create_chat("on disk").unwrap().id;
        let user = ChatMessage::user("ping", None);
        let user_id = user.id.clone();
        store.add_message(&chat_id, user).unwrap();
        store
            .add_message(&chat_id, ChatMessage::assistant("pong", Some(user_id)))
            .unwrap();
        chat_id
    };

    let store = ChatStore::open(JsonFileBackend::new(&path)).unwrap();
    let branch = store.active_branch(&chat_id);
    assert_eq!(branch.len(), 2);
    assert_eq!(branch[1].content, "pong");
    assert_eq!(branch[1].parent_message_id.as_deref(), Some(branch[0].id.as_str()));
}

#[test]
fn test_stored_document_with_broken_chain_still_loads() {
    let document = r#"[{
        "id": "c1",
        "title": "damaged",
        "messages": [
            {"id": "a1", "role": "assistant", "content": "x", "createdAt": "2024-01-01T00:00:01Z", "parentMessageId": "lost"},
            {"id": "u2", "role": "user", "content": "y", "createdAt": "2024-01-01T00:00:02Z", "parentMessageId": "a1"}
        ],
        "currentLeafMessageId": "u2",
        "createdAt": "2024-01-01T00:00:00Z",
        "updatedAt": "2024-01-01T00:00:02Z"
    }]"#;

    let store = ChatStore::open(MemoryBackend::with_document(document)).unwrap();

    assert_eq!(branch_ids(&store, "c1"), vec!["a1", "u2"]);
}
