//! Scoped syncs and block hook precedence.

mod common;

use claims::{assert_matches, assert_none};
use common::{recording_hook, TestEnv, QUIET_PERIOD};
use dagsync::{SyncError, SyncRequest};
use dagsync_store::Selector;
use eyre::Result as EyreResult;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_scoped_sync_does_not_record_or_notify() -> EyreResult<()> {
    let env = TestEnv::new().await?;
    env.ignore_gossip();

    let (mut events, _watch) = env.subscriber.on_sync_finished();

    let blocks = env.extend(3)?;
    env.publisher.update_root(blocks[0]).await?;

    let synced = env
        .subscriber
        .sync(
            env.publisher_id,
            SyncRequest::scoped(blocks[1]),
            Vec::new(),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(synced, blocks[1]);
    assert_eq!(env.subscriber_store.len(), 2);
    assert_none!(env.subscriber.get_latest_sync(&env.publisher_id));
    assert!(
        timeout(QUIET_PERIOD, events.recv()).await.is_err(),
        "scoped sync must not notify"
    );

    env.close().await
}

#[tokio::test]
async fn test_request_hook_replaces_general_hook() -> EyreResult<()> {
    let env = TestEnv::new().await?;
    env.ignore_gossip();

    let (general, general_calls) = recording_hook();
    let (scoped, scoped_calls) = recording_hook();
    env.subscriber.set_block_hook(Some(general));

    let blocks = env.extend(3)?;
    env.publisher.update_root(blocks[0]).await?;

    let cancel = CancellationToken::new();

    let _ = env
        .subscriber
        .sync(
            env.publisher_id,
            SyncRequest::scoped(blocks[1]).with_hook(scoped),
            Vec::new(),
            &cancel,
        )
        .await?;

    assert_eq!(
        *scoped_calls.lock(),
        vec![(env.publisher_id, blocks[1]), (env.publisher_id, blocks[2])]
    );
    assert!(general_calls.lock().is_empty(), "general hook must not run");

    let _ = env
        .subscriber
        .sync(env.publisher_id, SyncRequest::head(), Vec::new(), &cancel)
        .await?;

    assert_eq!(scoped_calls.lock().len(), 2);
    assert_eq!(
        general_calls
            .lock()
            .iter()
            .map(|(_, cid)| *cid)
            .collect::<Vec<_>>(),
        blocks
    );

    env.close().await
}

#[tokio::test]
async fn test_scoped_sync_honours_selector() -> EyreResult<()> {
    let env = TestEnv::new().await?;
    env.ignore_gossip();

    let blocks = env.extend(4)?;
    env.publisher.update_root(blocks[0]).await?;

    let selector = Selector::explore_all().with_recursion_limit(Some(1));

    let _ = env
        .subscriber
        .sync(
            env.publisher_id,
            SyncRequest::scoped(blocks[0]).with_selector(selector),
            Vec::new(),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(env.subscriber_store.len(), 2);

    env.close().await
}

#[tokio::test]
async fn test_scoped_sync_stops_at_latest_sync() -> EyreResult<()> {
    let env = TestEnv::new().await?;
    env.ignore_gossip();

    let (hook, calls) = recording_hook();

    let blocks = env.extend(4)?;
    env.publisher.update_root(blocks[0]).await?;

    env.subscriber.set_latest_sync(env.publisher_id, blocks[2]);

    let _ = env
        .subscriber
        .sync(
            env.publisher_id,
            SyncRequest::scoped(blocks[0]).with_hook(hook),
            Vec::new(),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(
        calls.lock().iter().map(|(_, cid)| *cid).collect::<Vec<_>>(),
        blocks[..2]
    );
    assert_eq!(env.subscriber.get_latest_sync(&env.publisher_id), Some(blocks[2]));

    env.close().await
}

#[tokio::test]
async fn test_head_sync_stopping_at_its_own_head_fails() -> EyreResult<()> {
    let env = TestEnv::new().await?;
    env.ignore_gossip();

    let blocks = env.extend(2)?;
    env.publisher.update_root(blocks[0]).await?;

    env.subscriber.set_latest_sync(env.publisher_id, blocks[1]);

    let selector = Selector::explore_all().with_stop_at(blocks[0]);

    let result = env
        .subscriber
        .sync(
            env.publisher_id,
            SyncRequest::head().with_selector(selector),
            Vec::new(),
            &CancellationToken::new(),
        )
        .await;

    assert_matches!(result, Err(SyncError::NothingSynced(cid)) if cid == blocks[0]);
    assert_eq!(env.subscriber.get_latest_sync(&env.publisher_id), Some(blocks[1]));

    env.close().await
}
