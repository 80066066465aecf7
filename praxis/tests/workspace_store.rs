//! Registry properties of the workspace store and session.

use std::fs;
use std::thread;

use praxis::io::workspace_store::{Session, WorkspaceError, WorkspaceStore};

fn registry_bytes(store: &WorkspaceStore) -> Vec<u8> {
    fs::read(store.registry_path()).unwrap_or_default()
}

#[test]
fn created_workspace_is_listed_exactly_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = Session::new(WorkspaceStore::open(temp.path()).expect("open"));
    for (title, description) in [("alpha", "first"), ("beta", ""), ("gamma", "with spaces and ünïcode")] {
        session.create(title, description).expect("create");
        let listed = session.store().list();
        let matches = listed
            .iter()
            .filter(|summary| summary.title == title && summary.description == description)
            .count();
        assert_eq!(matches, 1, "{title}");
    }
}

#[test]
fn duplicate_create_leaves_registry_unchanged() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = Session::new(WorkspaceStore::open(temp.path()).expect("open"));
    session.create("alpha", "first").expect("create");
    let before = registry_bytes(session.store());

    let err = session.create("alpha", "second").unwrap_err();
    assert!(matches!(err, WorkspaceError::Duplicate(ref title) if title == "alpha"));
    assert_eq!(registry_bytes(session.store()), before);
}

#[test]
fn unknown_delete_leaves_registry_unchanged() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = Session::new(WorkspaceStore::open(temp.path()).expect("open"));
    session.create("alpha", "first").expect("create");
    let before = registry_bytes(session.store());

    let err = session.delete("ghost").unwrap_err();
    assert!(matches!(err, WorkspaceError::Unknown(_)));
    assert_eq!(registry_bytes(session.store()), before);
    assert_eq!(session.current(), Some("alpha"));
}

#[test]
fn delete_clears_pointer_only_for_current() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = Session::new(WorkspaceStore::open(temp.path()).expect("open"));
    session.create("alpha", "").expect("create");
    session.create("beta", "").expect("create");
    assert_eq!(session.current(), Some("beta"));

    session.delete("alpha").expect("delete non-current");
    assert_eq!(session.current(), Some("beta"));

    session.delete("beta").expect("delete current");
    assert_eq!(session.current(), None);
    assert!(session.store().is_empty());
}

#[test]
fn persistent_pointer_survives_reopen() {
    let temp = tempfile::tempdir().expect("tempdir");
    {
        let mut session = Session::persistent(WorkspaceStore::open(temp.path()).expect("open")).expect("session");
        session.create("alpha", "").expect("create");
    }
    let session = Session::persistent(WorkspaceStore::open(temp.path()).expect("reopen")).expect("session");
    assert_eq!(session.current(), Some("alpha"));
    assert_eq!(
        session.get_path(None),
        Some(session.store().base_path().join("alpha"))
    );
}

/// Verifies titles naming the store's own files are refused before anything
/// is written, so later sessions still open.
#[test]
fn metadata_file_names_are_not_workspace_titles() {
    let temp = tempfile::tempdir().expect("tempdir");
    {
        let mut session = Session::persistent(WorkspaceStore::open(temp.path()).expect("open")).expect("session");
        for title in ["current_workspace", "workspaces.json", "workspaces.lock", "praxis.toml", "Current_Workspace"] {
            let err = session.create(title, "").unwrap_err();
            assert!(
                matches!(err, WorkspaceError::InvalidTitle { .. }),
                "{title}: {err}"
            );
            assert!(!session.store().contains(title));
        }
        assert!(session.store().is_empty());
        assert!(!temp.path().join("current_workspace").exists());
    }

    let mut session = Session::persistent(WorkspaceStore::open(temp.path()).expect("reopen")).expect("session");
    assert_eq!(session.current(), None);
    session.create("alpha", "").expect("create after refusal");
    assert_eq!(session.current(), Some("alpha"));
}

/// Verifies the registry lock prevents lost updates between independent stores.
#[test]
fn concurrent_creates_from_separate_stores_are_all_kept() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = temp.path().to_path_buf();
    WorkspaceStore::open(&base).expect("open");

    let handles = (0..8)
        .map(|i| {
            let base = base.clone();
            thread::spawn(move || {
                let mut store = WorkspaceStore::open(&base).expect("open");
                store.create(&format!("ws{i}"), "parallel").expect("create");
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().expect("join");
    }

    let store = WorkspaceStore::open(&base).expect("reopen");
    assert_eq!(store.len(), 8);
}
