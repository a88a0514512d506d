use dagsync_network::Transport;

use super::*;

#[tokio::test(start_paused = true)]
async fn test_starts_full_then_waits_one_interval_per_token() {
    let limiter = RateLimiter::new(Duration::from_millis(100), 1);
    let start = Instant::now();

    for _ in 0..5 {
        limiter.acquire().await;
    }

    assert!(
        start.elapsed() >= Duration::from_millis(400),
        "5 tokens at 1 per 100ms need at least 400ms, took {:?}",
        start.elapsed()
    );
}

#[tokio::test(start_paused = true)]
async fn test_burst_is_available_immediately() {
    let limiter = RateLimiter::new(Duration::from_secs(1), 3);

    assert!(limiter.try_acquire(), "first burst token");
    assert!(limiter.try_acquire(), "second burst token");
    assert!(limiter.try_acquire(), "third burst token");
    assert!(!limiter.try_acquire(), "burst exhausted");

    tokio::time::advance(Duration::from_secs(1)).await;

    assert!(limiter.try_acquire(), "refilled after one interval");
    assert!(!limiter.try_acquire(), "only one token refilled");
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_never_limits() {
    let limiter = RateLimiter::new(Duration::ZERO, 1);

    for _ in 0..100 {
        assert!(limiter.try_acquire(), "unlimited");
    }
}

#[test]
fn test_per_peer_factory_builds_independent_limiters() {
    let factory = RateLimiter::per_peer(RateLimitConfig {
        interval: Duration::from_secs(60),
        burst: 1,
    });

    let peer = dagsync_network::memory::MemoryNetwork::new()
        .transport()
        .local_peer_id();
    let a = factory(peer).unwrap();
    let b = factory(peer).unwrap();

    assert!(a.try_acquire(), "a starts full");
    assert!(!a.try_acquire(), "a exhausted");
    assert!(b.try_acquire(), "b has its own bucket");
}
