#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod common;

use common::{OpKind, TreeIo, registry_over, settle};
use dirmodel::directory::DeepCountStatus;
use dirmodel::{AttributeSet, CallbackTarget};

#[tokio::test]
async fn deep_count_walks_every_subdirectory() {
    let tree = TreeIo::new()
        .dir("/a")
        .file("/a/x", "0123456789")
        .dir("/a/b")
        .file("/a/b/y", "01234");
    let registry = registry_over(tree.clone());
    let d = registry.open("/a");

    let ready = d
        .wait_until_ready(CallbackTarget::Directory, AttributeSet::DEEP_COUNT)
        .await
        .unwrap();
    let record = ready.into_files().remove(0);

    assert!(record.is_directory_itself());
    assert_eq!(record.deep_count_status(), DeepCountStatus::Done);
    let counts = record.deep_counts();
    assert_eq!(counts.directories, 1);
    assert_eq!(counts.files, 2);
    assert_eq!(counts.total_size, 15);
    assert_eq!(counts.unreadable, 0);
    assert_eq!(tree.issued(OpKind::List), 2);
}

#[tokio::test]
async fn unreadable_subdirectories_are_counted_and_skipped() {
    let tree = TreeIo::new()
        .dir("/a")
        .file("/a/x", "abc")
        .locked_dir("/a/private")
        .dir("/a/open")
        .file("/a/open/y", "de");
    let registry = registry_over(tree);
    let d = registry.open("/a");

    let record = d
        .wait_until_ready(CallbackTarget::Directory, AttributeSet::DEEP_COUNT)
        .await
        .unwrap()
        .into_files()
        .remove(0);

    let counts = record.deep_counts();
    assert_eq!(counts.directories, 2);
    assert_eq!(counts.files, 2);
    assert_eq!(counts.total_size, 5);
    assert_eq!(counts.unreadable, 1);
}

#[tokio::test]
async fn deep_count_of_a_listed_subdirectory() {
    let tree = TreeIo::new()
        .dir("/a")
        .dir("/a/b")
        .dir("/a/b/c")
        .file("/a/b/c/z", "zz");
    let registry = registry_over(tree);
    let d = registry.open("/a");

    let record = d
        .wait_until_ready(
            CallbackTarget::File("b".to_owned()),
            AttributeSet::DEEP_COUNT,
        )
        .await
        .unwrap()
        .into_files()
        .remove(0);

    assert_eq!(record.name(), "b");
    let counts = record.deep_counts();
    assert_eq!(counts.directories, 1);
    assert_eq!(counts.files, 1);
    assert_eq!(counts.total_size, 2);
}

#[tokio::test]
async fn item_counts_for_every_listed_directory() {
    let tree = TreeIo::new()
        .dir("/p")
        .dir("/p/empty")
        .dir("/p/full")
        .file("/p/full/1", "")
        .file("/p/full/2", "")
        .file("/p/notes.txt", "hi");
    let registry = registry_over(tree);
    let d = registry.open("/p");

    let files = d
        .wait_until_ready(CallbackTarget::AllFiles, AttributeSet::ITEM_COUNT)
        .await
        .unwrap()
        .into_files();

    let count_of = |name: &str| {
        files
            .iter()
            .find(|f| f.name() == name)
            .and_then(|f| f.item_count())
    };
    assert_eq!(files.len(), 3);
    assert_eq!(count_of("empty"), Some(0));
    assert_eq!(count_of("full"), Some(2));
    assert_eq!(count_of("notes.txt"), None);
}

#[tokio::test]
async fn reloading_a_child_invalidates_its_count_in_the_parent() {
    let tree = TreeIo::new().dir("/p").dir("/p/c").file("/p/c/one", "1");
    let registry = registry_over(tree.clone());
    let parent = registry.open("/p");
    let child = registry.open("/p/c");
    let c = CallbackTarget::File("c".to_owned());

    let before = parent
        .wait_until_ready(c.clone(), AttributeSet::ITEM_COUNT)
        .await
        .unwrap()
        .into_files()
        .remove(0);
    assert_eq!(before.item_count(), Some(1));
    let lists_before = tree.issued(OpKind::List);

    let tree = tree.file("/p/c/two", "2");
    child.force_reload().unwrap();
    settle(&child).await;

    let after = parent
        .wait_until_ready(c, AttributeSet::ITEM_COUNT)
        .await
        .unwrap()
        .into_files()
        .remove(0);
    assert_eq!(after.item_count(), Some(2));
    assert_eq!(tree.issued(OpKind::List), lists_before + 1);
}

#[tokio::test]
async fn reloading_resets_the_directory_deep_count() {
    let tree = TreeIo::new().dir("/a").file("/a/x", "abcd");
    let registry = registry_over(tree.clone());
    let d = registry.open("/a");

    let first = d
        .wait_until_ready(CallbackTarget::Directory, AttributeSet::DEEP_COUNT)
        .await
        .unwrap()
        .into_files()
        .remove(0);
    assert_eq!(first.deep_counts().files, 1);

    let _tree = tree.file("/a/y", "ef");
    d.force_reload().unwrap();
    let record = d.record(CallbackTarget::Directory).await.unwrap().unwrap();
    assert_eq!(record.deep_count_status(), DeepCountStatus::NotStarted);

    let second = d
        .wait_until_ready(CallbackTarget::Directory, AttributeSet::DEEP_COUNT)
        .await
        .unwrap()
        .into_files()
        .remove(0);
    assert_eq!(second.deep_counts().files, 2);
    assert_eq!(second.deep_counts().total_size, 6);
}
