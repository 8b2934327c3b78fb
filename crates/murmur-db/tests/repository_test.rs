//! Integration tests for the credential store and message repository.

use murmur_db::Database;
use murmur_db::models::{NewMessage, ResponseContent, ResponseWrite};
use uuid::Uuid;

fn setup() -> (Database, String, String) {
    let db = Database::open_in_memory().unwrap();
    let alice = Uuid::new_v4().to_string();
    let bob = Uuid::new_v4().to_string();
    assert!(db.create_user(&alice, "alice", Some("Alice"), "hash", "user").unwrap());
    assert!(db.create_user(&bob, "bob", None, "hash", "user").unwrap());
    (db, alice, bob)
}

fn submit(db: &Database, user_id: &str, username: &str, key: &str) -> String {
    let id = Uuid::new_v4().to_string();
    db.insert_message(&NewMessage {
        id: &id,
        user_id,
        username,
        audio_key: key,
    })
    .unwrap();
    id
}

#[test]
fn duplicate_handle_is_not_inserted() {
    let (db, _, _) = setup();
    let inserted = db
        .create_user(&Uuid::new_v4().to_string(), "alice", None, "other", "user")
        .unwrap();
    assert!(!inserted);

    let row = db.get_user_by_username("alice").unwrap().unwrap();
    assert_eq!(row.password, "hash");
}

#[test]
fn handle_lookup_is_case_sensitive() {
    let (db, _, _) = setup();
    assert!(db.get_user_by_username("Alice").unwrap().is_none());
    assert!(db.get_user_by_username("alice").unwrap().is_some());
}

#[test]
fn user_row_converts_to_typed_user() {
    let (db, alice, _) = setup();
    let user = db.get_user_by_id(&alice).unwrap().unwrap().into_user().unwrap();
    assert_eq!(user.id.to_string(), alice);
    assert_eq!(user.display_name.as_deref(), Some("Alice"));
    assert!(!user.role.is_moderator());
}

#[test]
fn lists_are_newest_first_and_scoped() {
    let (db, alice, bob) = setup();
    let first = submit(&db, &alice, "alice", "audio/1.m4a");
    let other = submit(&db, &bob, "bob", "audio/2.m4a");
    let second = submit(&db, &alice, "alice", "audio/3.m4a");

    let mine: Vec<String> = db
        .list_messages_for_user(&alice)
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(mine, vec![second.clone(), first.clone()]);

    let all: Vec<String> = db.list_all_messages().unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(all, vec![second, other, first]);
}

#[test]
fn response_write_clears_audio_and_is_conditional() {
    let (db, alice, _) = setup();
    let id = submit(&db, &alice, "alice", "audio/1.m4a");

    let write = db
        .update_for_response(&id, &ResponseContent::Text("Praying for you".into()), "admin")
        .unwrap();
    let (message, released_audio_key) = match write {
        ResponseWrite::Applied {
            message,
            released_audio_key,
        } => (message, released_audio_key),
        other => panic!("expected applied write, got {:?}", other),
    };
    assert_eq!(released_audio_key.as_deref(), Some("audio/1.m4a"));
    assert!(message.responded);
    assert!(message.audio_key.is_none());
    assert_eq!(message.response_text.as_deref(), Some("Praying for you"));
    assert_eq!(message.responded_by.as_deref(), Some("admin"));
    assert!(message.responded_at.is_some());

    let again = db
        .update_for_response(&id, &ResponseContent::Audio("audio/r.m4a".into()), "admin2")
        .unwrap();
    assert!(matches!(again, ResponseWrite::AlreadyResponded));

    let stored = db.get_message(&id).unwrap().unwrap();
    assert_eq!(stored.responded_by.as_deref(), Some("admin"));
    assert!(stored.response_audio_key.is_none());
}

#[test]
fn response_to_missing_message_is_not_found() {
    let (db, _, _) = setup();
    let write = db
        .update_for_response("missing", &ResponseContent::Text("hi".into()), "admin")
        .unwrap();
    assert!(matches!(write, ResponseWrite::NotFound));
}

#[test]
fn delete_returns_row_and_removes_it() {
    let (db, alice, _) = setup();
    let id = submit(&db, &alice, "alice", "audio/1.m4a");
    db.update_for_response(&id, &ResponseContent::Audio("audio/r.m4a".into()), "admin")
        .unwrap();

    let deleted = db.delete_message(&id).unwrap().unwrap();
    assert_eq!(deleted.blob_keys(), vec!["audio/r.m4a"]);
    assert!(db.get_message(&id).unwrap().is_none());
    assert!(db.delete_message(&id).unwrap().is_none());
}

#[test]
fn referenced_keys_cover_both_columns() {
    let (db, alice, bob) = setup();
    submit(&db, &alice, "alice", "audio/1.m4a");
    let answered = submit(&db, &bob, "bob", "audio/2.m4a");
    db.update_for_response(&answered, &ResponseContent::Audio("audio/r.m4a".into()), "admin")
        .unwrap();

    let keys = db.referenced_blob_keys().unwrap();
    assert!(keys.contains("audio/1.m4a"));
    assert!(keys.contains("audio/r.m4a"));
    assert!(!keys.contains("audio/2.m4a"));
}

#[test]
fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("murmur.db");
    {
        let db = Database::open(&path).unwrap();
        db.create_user("u1", "carol", None, "hash", "moderator").unwrap();
    }
    let db = Database::open(&path).unwrap();
    let row = db.get_user_by_username("carol").unwrap().unwrap();
    assert_eq!(row.role, "moderator");
}
