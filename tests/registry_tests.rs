#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod common;

use common::{OpKind, file, mock_registry, settle};
use dirmodel::{AttributeSet, CallbackTarget, ClientId, DirectoryError};

#[tokio::test]
async fn opening_twice_shares_one_directory() {
    let (mock, registry) = mock_registry();
    let first = registry.open("/data");
    let second = registry.open("/data");
    assert_eq!(registry.open_count(), 1);

    first
        .monitor_add(CallbackTarget::AllFiles, AttributeSet::empty(), ClientId::new(1))
        .unwrap();
    mock.next_op(OpKind::List).await.list(vec![file("shared")]);
    settle(&first).await;

    assert!(second.file("shared").await.unwrap().is_some());
    assert_eq!(mock.issued(OpKind::List), 1);
}

#[tokio::test]
async fn last_lease_closes_the_directory() {
    let (mock, registry) = mock_registry();
    let lease = registry.open("/data");
    let handle = lease.handle();
    let clone = lease.clone();
    lease
        .monitor_add(CallbackTarget::AllFiles, AttributeSet::empty(), ClientId::new(1))
        .unwrap();
    let listing = mock.next_op(OpKind::List).await;

    drop(lease);
    assert_eq!(registry.open_count(), 1);
    assert!(handle.stats().await.is_ok());

    drop(clone);
    assert_eq!(registry.open_count(), 0);
    assert!(registry.lookup("/data").is_none());
    assert!(matches!(handle.stats().await, Err(DirectoryError::Closed)));
    assert!(listing.handle.is_cancelled());
    assert!(matches!(
        handle.monitor_add(CallbackTarget::AllFiles, AttributeSet::empty(), ClientId::new(2)),
        Err(DirectoryError::Closed)
    ));
}

#[tokio::test]
async fn pending_callbacks_are_dropped_on_close() {
    let (_mock, registry) = mock_registry();
    let lease = registry.open("/data");
    let handle = lease.handle();
    let waiting = tokio::spawn(async move {
        handle
            .wait_until_ready(CallbackTarget::AllFiles, AttributeSet::FILE_LIST)
            .await
    });
    settle(&lease).await;

    drop(lease);
    assert!(matches!(waiting.await.unwrap(), Err(DirectoryError::Closed)));
}

#[tokio::test]
async fn reopening_after_close_starts_fresh() {
    let (mock, registry) = mock_registry();
    {
        let lease = registry.open("/data");
        lease
            .monitor_add(CallbackTarget::AllFiles, AttributeSet::empty(), ClientId::new(1))
            .unwrap();
        mock.next_op(OpKind::List).await.list(vec![file("old")]);
        settle(&lease).await;
    }

    let lease = registry.open("/data");
    assert!(lease.files().await.unwrap().is_empty());
    assert_eq!(registry.open_count(), 1);
}
