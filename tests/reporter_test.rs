//! Reporter decorator tests: retries, worker pool bounds, vector caching.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use common::{unavailable, wait_until, FakeConnector, FakeReporter, Script};
use dfsr_monitor::error::Error;
use dfsr_monitor::reporter::{Cacher, DurableReporter, Limiter, Reporter};

#[tokio::test(start_paused = true)]
async fn test_durable_retry_budget() {
    let connector = FakeConnector::new();
    connector.script("a", Script::failing(Error::Remote("boom".into())));
    let durable = DurableReporter::connect("a", connector.clone(), Duration::from_secs(3600), 2)
        .await
        .unwrap();
    assert_eq!(durable.attempts(), 3);

    let ctx = CancellationToken::new();
    let err = durable.vector(&ctx, Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err, Error::Remote("boom".into()));

    let reporter = connector.latest("a").unwrap();
    assert_eq!(reporter.vector_calls(), 3);
    // Reconnects are rate limited
    assert_eq!(connector.connects("a"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_durable_reconnects_between_attempts() {
    let connector = FakeConnector::new();
    connector.script("a", Script::failing(unavailable()));
    let durable = DurableReporter::connect("a", connector.clone(), Duration::ZERO, 1)
        .await
        .unwrap();
    connector.script("a", Script::default());

    let ctx = CancellationToken::new();
    let vector = durable.vector(&ctx, Uuid::new_v4()).await.unwrap();
    assert_eq!(vector.data(), b"a");
    assert_eq!(connector.connects("a"), 2);
    assert_eq!(durable.generation(), 1);

    let first = connector.reporters("a")[0].clone();
    wait_until(|| first.is_closed()).await;
}

#[tokio::test(start_paused = true)]
async fn test_durable_terminal_errors_not_retried() {
    let connector = FakeConnector::new();
    connector.script("a", Script::failing(Error::Closed));
    let durable = DurableReporter::connect("a", connector.clone(), Duration::ZERO, 5)
        .await
        .unwrap();

    let ctx = CancellationToken::new();
    assert_eq!(durable.vector(&ctx, Uuid::new_v4()).await.unwrap_err(), Error::Closed);
    assert_eq!(connector.latest("a").unwrap().vector_calls(), 1);
    assert_eq!(connector.connects("a"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_durable_exhaustion_recovers_in_background() {
    let connector = FakeConnector::new();
    connector.script("a", Script::failing(unavailable()));
    let durable = DurableReporter::connect("a", connector.clone(), Duration::from_secs(10), 0)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;

    let ctx = CancellationToken::new();
    assert_eq!(durable.vector(&ctx, Uuid::new_v4()).await.unwrap_err(), unavailable());

    wait_until(|| durable.generation() == 1).await;
    assert_eq!(connector.connects("a"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_durable_stops_retrying_when_cancelled() {
    let connector = FakeConnector::new();
    connector.script("a", Script::failing(Error::Remote("boom".into())));
    let durable = DurableReporter::connect("a", connector.clone(), Duration::ZERO, 5)
        .await
        .unwrap();

    let ctx = CancellationToken::new();
    ctx.cancel();
    assert_eq!(durable.vector(&ctx, Uuid::new_v4()).await.unwrap_err(), Error::Canceled);
    assert_eq!(connector.latest("a").unwrap().vector_calls(), 0);
    assert_eq!(connector.connects("a"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_durable_close() {
    let connector = FakeConnector::new();
    let durable = DurableReporter::connect("a", connector.clone(), Duration::ZERO, 3)
        .await
        .unwrap();
    durable.close().await;
    assert!(connector.latest("a").unwrap().is_closed());

    let ctx = CancellationToken::new();
    assert_eq!(durable.vector(&ctx, Uuid::new_v4()).await.unwrap_err(), Error::Closed);
    assert_eq!(connector.connects("a"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_limiter_bounds_concurrency() {
    let reporter = FakeReporter::new(
        "a",
        Script {
            vector_delay: Duration::from_millis(100),
            ..Script::default()
        },
    );
    let limiter = Arc::new(Limiter::new(reporter.clone(), 2).unwrap());

    let calls: Vec<_> = (0..10)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let ctx = CancellationToken::new();
                limiter.vector(&ctx, Uuid::new_v4()).await
            })
        })
        .collect();
    for call in calls {
        assert!(call.await.unwrap().is_ok());
    }

    assert_eq!(reporter.vector_calls(), 10);
    assert_eq!(reporter.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_limiter_requires_workers() {
    let reporter = FakeReporter::new("a", Script::default());
    assert!(matches!(Limiter::new(reporter, 0), Err(Error::ZeroWorkers)));
}

#[tokio::test]
async fn test_limiter_passthrough_and_close() {
    let reporter = FakeReporter::new("a", Script::backlog(vec![1, 2]));
    let limiter = Limiter::new(reporter.clone(), 1).unwrap();
    assert_eq!(limiter.workers(), 1);
    let ctx = CancellationToken::new();

    let vector = limiter.vector(&ctx, Uuid::new_v4()).await.unwrap();
    assert_eq!(limiter.backlog(&ctx, &vector).await.unwrap(), vec![1, 2]);
    assert_eq!(reporter.backlog_calls(), 1);

    limiter.close().await;
    assert!(reporter.is_closed());
    assert_eq!(limiter.vector(&ctx, Uuid::new_v4()).await.unwrap_err(), Error::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_cacher_shares_vector_lookups() {
    let reporter = FakeReporter::new(
        "a",
        Script {
            vector_delay: Duration::from_millis(50),
            ..Script::default()
        },
    );
    let cacher = Arc::new(Cacher::new(reporter.clone(), Duration::from_secs(30)));
    let group = Uuid::new_v4();

    let lookups: Vec<_> = (0..5)
        .map(|_| {
            let cacher = cacher.clone();
            tokio::spawn(async move {
                let ctx = CancellationToken::new();
                cacher.vector(&ctx, group).await
            })
        })
        .collect();
    for lookup in lookups {
        assert_eq!(lookup.await.unwrap().unwrap().data(), b"a");
    }
    assert_eq!(reporter.vector_calls(), 1);
    assert!(cacher.vectors().value(group).is_some());

    tokio::time::sleep(Duration::from_secs(31)).await;
    let ctx = CancellationToken::new();
    cacher.vector(&ctx, group).await.unwrap();
    assert_eq!(reporter.vector_calls(), 2);

    cacher.close().await;
    assert!(reporter.is_closed());
}
