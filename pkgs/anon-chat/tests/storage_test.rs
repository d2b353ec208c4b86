// Copyright 2024 Anon Chat Team.
//
// Tests for per-user storage backends

use anon_chat::storage::{self, clear_user};
use anon_chat::{ContactRegistry, FileStorage, Namespace, Storage, StorageError, UnreadTracker};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn file_storage() -> (TempDir, Arc<FileStorage>) {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(FileStorage::new(dir.path().join("anon")));
    (dir, storage)
}

#[test]
fn test_missing_files_read_as_empty() {
    let (_dir, storage) = file_storage();

    assert_eq!(storage.load(Namespace::Contacts, "alice").unwrap(), None);
    storage.remove(Namespace::Unread, "alice").unwrap();

    let contacts = ContactRegistry::load(storage.clone(), "alice");
    assert!(contacts.list().is_empty());
}

#[test]
fn test_contacts_persist_per_user() {
    let (_dir, storage) = file_storage();

    let mut alice = ContactRegistry::load(storage.clone(), "alice");
    assert!(alice.add("bob"));
    assert!(alice.add("carol"));

    let mut bob = ContactRegistry::load(storage.clone(), "bob");
    assert!(bob.add("alice"));

    let alice = ContactRegistry::load(storage.clone(), "alice");
    assert_eq!(alice.list(), ["bob", "carol"]);
    let bob = ContactRegistry::load(storage.clone(), "bob");
    assert_eq!(bob.list(), ["alice"]);

    assert!(storage
        .root()
        .join("contacts")
        .join("alice.json")
        .is_file());
}

#[test]
fn test_unread_counts_persist() {
    let (_dir, storage) = file_storage();

    let mut unread = UnreadTracker::load(storage.clone(), "alice");
    unread.set_active(Some("bob"));
    assert_eq!(unread.increment("bob"), None);
    assert_eq!(unread.increment("carol"), Some(1));
    assert_eq!(unread.increment("carol"), Some(2));
    assert_eq!(unread.increment("dave"), Some(1));
    assert!(unread.clear("dave"));

    let reloaded = UnreadTracker::load(storage.clone(), "alice");
    assert_eq!(reloaded.count("carol"), 2);
    assert_eq!(reloaded.count("dave"), 0);
    assert_eq!(reloaded.total(), 2);
}

#[test]
fn test_corrupt_blob_falls_back_to_default() {
    let (_dir, storage) = file_storage();
    storage
        .store(Namespace::Unread, "alice", b"{not json")
        .unwrap();
    storage
        .store(Namespace::Contacts, "alice", br#"{"bob": 1}"#)
        .unwrap();

    let unread = UnreadTracker::load(storage.clone(), "alice");
    assert_eq!(unread.total(), 0);
    let contacts = ContactRegistry::load(storage.clone(), "alice");
    assert!(contacts.list().is_empty());
}

#[test]
fn test_stored_self_entries_are_dropped_on_load() {
    let (_dir, storage) = file_storage();
    storage::save(
        &*storage,
        Namespace::Unread,
        "alice",
        &HashMap::from([("alice".to_string(), 4u32), ("bob".to_string(), 0)]),
    );

    let unread = UnreadTracker::load(storage.clone(), "alice");
    assert!(unread.counts().is_empty());
}

#[test]
fn test_clear_user_leaves_other_users() {
    let (_dir, storage) = file_storage();
    ContactRegistry::load(storage.clone(), "alice").add("bob");
    UnreadTracker::load(storage.clone(), "alice").increment("bob");
    ContactRegistry::load(storage.clone(), "bob").add("alice");

    clear_user(&*storage, "alice");

    assert_eq!(storage.load(Namespace::Contacts, "alice").unwrap(), None);
    assert_eq!(storage.load(Namespace::Unread, "alice").unwrap(), None);
    assert!(storage.load(Namespace::Contacts, "bob").unwrap().is_some());
}

#[test]
fn test_user_ids_are_encoded_in_file_names() {
    let (_dir, storage) = file_storage();

    let mut registry = ContactRegistry::load(storage.clone(), "../evil");
    registry.add("bob");

    assert!(storage
        .root()
        .join("contacts")
        .join("..%2Fevil.json")
        .is_file());
    assert_eq!(
        ContactRegistry::load(storage.clone(), "../evil").list(),
        ["bob"]
    );
}

#[test]
fn test_write_failures_report_the_path() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("anon");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let storage = Arc::new(FileStorage::new(&blocker));

    match storage.store(Namespace::Contacts, "alice", b"[]") {
        Err(StorageError::Io { path, .. }) => assert_eq!(path, blocker.join("contacts")),
        other => panic!("expected an IO error, got {:?}", other),
    }

    // Registries keep working in memory when persistence fails
    let mut contacts = ContactRegistry::load(storage.clone(), "alice");
    assert!(contacts.add("bob"));
    assert_eq!(contacts.list(), ["bob"]);
}
