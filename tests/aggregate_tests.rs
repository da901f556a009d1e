#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{OpKind, TreeIo, fired, mock_registry, ready_channel, registry_over};
use dirmodel::directory::DirectoryEvent;
use dirmodel::{
    AggregateDirectory, AttributeSet, CallbackTarget, ClientId, DirectoryError, DirectoryLike,
    DirectoryRegistry,
};

fn tree() -> TreeIo {
    TreeIo::new()
        .dir("/a")
        .file("/a/x.txt", "from a")
        .dir("/b")
        .dir("/b/sub")
        .file("/b/y.txt", "from b")
}

fn aggregate_of(registry: &DirectoryRegistry, paths: &[&str]) -> AggregateDirectory {
    let children = paths
        .iter()
        .map(|p| Arc::new(registry.open(p).handle()) as Arc<dyn DirectoryLike>)
        .collect();
    AggregateDirectory::new(children)
}

#[tokio::test]
async fn all_files_callback_merges_every_child() {
    let registry = registry_over(tree());
    let leases = [registry.open("/a"), registry.open("/b")];
    let merged = aggregate_of(&registry, &["/a", "/b"]);

    let (callback, rx) = ready_channel();
    merged
        .call_when_ready(
            CallbackTarget::AllFiles,
            AttributeSet::ITEM_COUNT,
            ClientId::new(1),
            callback,
        )
        .await
        .unwrap();

    let mut names: Vec<_> = fired(rx)
        .await
        .into_files()
        .iter()
        .map(|f| f.name().to_owned())
        .collect();
    names.sort();
    assert_eq!(names, ["sub", "x.txt", "y.txt"]);
    assert_eq!(merged.files().await.unwrap().len(), 3);
    drop(leases);
}

#[tokio::test]
async fn single_file_requests_go_to_the_owning_child() {
    let registry = registry_over(tree());
    let a = registry.open("/a");
    let b = registry.open("/b");
    let merged = aggregate_of(&registry, &["/a", "/b"]);
    for d in [&a, &b] {
        d.wait_until_ready(CallbackTarget::AllFiles, AttributeSet::FILE_LIST)
            .await
            .unwrap();
    }

    let (callback, rx) = ready_channel();
    merged
        .call_when_ready(
            CallbackTarget::File("y.txt".to_owned()),
            AttributeSet::PREVIEW_TEXT,
            ClientId::new(1),
            callback,
        )
        .await
        .unwrap();
    let record = fired(rx).await.into_files().remove(0);
    assert_eq!(record.path(), std::path::Path::new("/b/y.txt"));
    assert_eq!(record.preview_text(), Some("from b"));
    assert!(a.file("y.txt").await.unwrap().is_none());

    let (callback, _rx) = ready_channel();
    let err = merged
        .call_when_ready(
            CallbackTarget::File("nowhere".to_owned()),
            AttributeSet::FILE_INFO,
            ClientId::new(1),
            callback,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::UnknownFile(name) if name == "nowhere"));
    assert!(
        !merged
            .is_ready(CallbackTarget::File("nowhere".to_owned()), AttributeSet::FILE_INFO)
            .await
            .unwrap()
    );
    assert!(
        merged
            .is_ready(CallbackTarget::AllFiles, AttributeSet::FILE_LIST)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn duplicate_aggregate_callbacks_are_rejected() {
    let (mock, registry) = mock_registry();
    let leases = [registry.open("/a"), registry.open("/b")];
    let merged = aggregate_of(&registry, &["/a", "/b"]);

    let (first, first_rx) = ready_channel();
    merged
        .call_when_ready(
            CallbackTarget::AllFiles,
            AttributeSet::FILE_LIST,
            ClientId::new(7),
            first,
        )
        .await
        .unwrap();
    let (second, _second_rx) = ready_channel();
    let err = merged
        .call_when_ready(
            CallbackTarget::AllFiles,
            AttributeSet::FILE_LIST,
            ClientId::new(7),
            second,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::DuplicateCallback { .. }));

    mock.next_op_at(OpKind::List, "/a").await.list(vec![]);
    let mut first_rx = first_rx;
    assert!(
        tokio::time::timeout(Duration::from_millis(50), &mut first_rx)
            .await
            .is_err(),
        "fired before every child was ready"
    );
    mock.next_op_at(OpKind::List, "/b").await.list(vec![]);
    assert!(fired(first_rx).await.into_files().is_empty());
    drop(leases);
}

#[tokio::test]
async fn empty_aggregate_is_immediately_ready() {
    let merged = AggregateDirectory::new(Vec::new());
    let (callback, rx) = ready_channel();
    merged
        .call_when_ready(
            CallbackTarget::AllFiles,
            AttributeSet::FILE_LIST,
            ClientId::new(1),
            callback,
        )
        .await
        .unwrap();
    assert!(fired(rx).await.into_files().is_empty());
}

#[tokio::test]
async fn notifications_from_every_child_arrive_on_one_stream() {
    let registry = registry_over(tree());
    let leases = [registry.open("/a"), registry.open("/b")];
    let merged = aggregate_of(&registry, &["/a", "/b"]);
    let mut events = merged.subscribe();

    merged
        .monitor_add(CallbackTarget::AllFiles, AttributeSet::empty(), ClientId::new(1))
        .await
        .unwrap();

    let mut complete = 0;
    while complete < 2 {
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("both listings complete")
            .expect("stream open");
        if matches!(event, DirectoryEvent::ListingComplete) {
            complete += 1;
        }
    }
    drop(leases);
}

#[tokio::test]
async fn metadata_reads_prefer_the_first_child_with_a_value() {
    let registry = registry_over(tree());
    let a = registry.open("/a");
    let b = registry.open("/b");
    b.set_metadata("shared", "custom-icon", None, Some("b.png"));
    let merged = aggregate_of(&registry, &["/a", "/b"]);

    assert_eq!(
        merged.metadata_value("shared", "custom-icon", Some("none")).as_deref(),
        Some("b.png")
    );
    a.set_metadata("shared", "custom-icon", None, Some("a.png"));
    assert_eq!(
        merged.metadata_value("shared", "custom-icon", None).as_deref(),
        Some("a.png")
    );
    assert_eq!(
        merged.metadata_value("other", "custom-icon", Some("none")).as_deref(),
        Some("none")
    );
}
