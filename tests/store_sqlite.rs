use std::path::Path;
use std::thread;

use utask::kv::{Bucket, SqliteBucket, SqliteSubstrate, Substrate};
use utask::{StatusFilter, Store, StoreError, TaskInput, UpdateSet};

fn open(path: &Path, profile: &str) -> (SqliteSubstrate, Store<SqliteBucket>) {
    let kv = SqliteSubstrate::open(path.to_str().unwrap()).unwrap();
    let store = Store::open(&kv, profile).unwrap().with_max_attempts(1000);
    (kv, store)
}

#[test]
fn connections_share_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let (_kv_a, a) = open(&path, "default");
    let (_kv_b, b) = open(&path, "default");

    let (task, existed) = a
        .create(&TaskInput::new("Write report").tags(["Work"]))
        .unwrap();
    assert!(!existed);

    let (seen, _) = b.get(&task.id).unwrap();
    assert_eq!(seen.tags, vec!["work"]);

    // Same content from the other client is the same task.
    let (again, existed) = b
        .create(&TaskInput::new("  Write report ").tags(["work", "WORK"]))
        .unwrap();
    assert!(existed);
    assert_eq!(again.id, task.id);

    b.close_task(&task.id).unwrap();
    assert!(a.get(&task.id).unwrap().0.done);
}

#[test]
fn concurrent_writers_keep_index_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    // Create the schema before the writers start.
    let (kv, store) = open(&path, "default");

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let path = path.clone();
            thread::spawn(move || {
                let (_kv, store) = open(&path, "default");
                for i in 0..5 {
                    let input = TaskInput::new(format!("task {n}-{i}"))
                        .tags(["shared".to_string(), format!("worker-{n}")]);
                    let (task, _) = store.create(&input).unwrap();
                    if i % 2 == 0 {
                        store.close_task(&task.id).unwrap();
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let shared = store.query(&["shared"], &[], 0).unwrap();
    assert_eq!(shared.len(), 20);
    let closed = store.list(Some("shared"), Some(StatusFilter::Closed)).unwrap();
    assert_eq!(closed.len(), 12);

    let counts = store.list_tags().unwrap();
    assert_eq!(counts["shared"], 20);
    for n in 0..4 {
        assert_eq!(counts[&format!("worker-{n}")], 5);
    }

    // Incremental maintenance left nothing for a rebuild to fix.
    let summary = store.rebuild_index().unwrap();
    assert_eq!(summary.tasks, 20);
    assert_eq!(summary.tags, 5);
    assert_eq!(summary.removed, 0);
    assert_eq!(store.list_tags().unwrap(), counts);

    store.close();
    kv.close().unwrap();
}

#[test]
fn concurrent_updates_to_one_task_all_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let (_kv, store) = open(&path, "default");
    let (task, _) = store
        .create(&TaskInput::new("Contended").tags(["base"]))
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let path = path.clone();
            let id = task.id.clone();
            thread::spawn(move || {
                let (_kv, store) = open(&path, "default");
                for i in 1..=5 {
                    let set = UpdateSet {
                        priority: Some(n * 10 + i),
                        ..UpdateSet::default()
                    };
                    store.update(&id, &set).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let (after, _) = store.get(&task.id).unwrap();
    assert_eq!(after.id, task.id);
    assert_eq!(after.priority % 10, 5);
    assert_eq!(after.tags, vec!["base"]);
}

#[test]
fn profiles_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let (_kv_a, home) = open(&path, "home");
    let (_kv_b, work) = open(&path, "work");

    let (task, _) = home.create(&TaskInput::new("Groceries").tags(["errand"])).unwrap();

    assert!(matches!(work.get(&task.id), Err(StoreError::NotFound(_))));
    assert!(work.list(None, None).unwrap().is_empty());
    assert!(work.list_tags().unwrap().is_empty());

    // Identical content in another profile is a separate entity.
    let (copy, existed) = work.create(&TaskInput::new("Groceries").tags(["errand"])).unwrap();
    assert!(!existed);
    assert_eq!(copy.id, task.id);
    work.delete(&copy.id).unwrap();
    assert!(home.get(&task.id).is_ok());
}

#[test]
fn rebuild_repairs_a_damaged_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let (kv, store) = open(&path, "default");

    let (a, _) = store.create(&TaskInput::new("A").tags(["x", "y"])).unwrap();
    let (b, _) = store.create(&TaskInput::new("B").tags(["y"])).unwrap();

    // Another client scribbles over the index.
    let tags = kv.bucket("utask_tags_default").unwrap();
    tags.put("y", b"deadbeef\n\n").unwrap();
    tags.put("ghost", a.id.as_bytes()).unwrap();
    tags.delete("x", None).unwrap();

    assert!(store.list(Some("y"), None).unwrap().is_empty());
    assert!(store.list(Some("x"), None).unwrap().is_empty());

    let summary = store.rebuild_index().unwrap();
    assert_eq!(summary.tasks, 2);
    assert_eq!(summary.tags, 2);
    assert_eq!(summary.removed, 1);

    let mut ids: Vec<String> = store
        .list(Some("y"), None)
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    ids.sort();
    let mut expected = vec![a.id.clone(), b.id.clone()];
    expected.sort();
    assert_eq!(ids, expected);
    assert_eq!(store.list(Some("x"), None).unwrap()[0].id, a.id);
    assert!(tags.get("ghost").unwrap().is_none());
}
