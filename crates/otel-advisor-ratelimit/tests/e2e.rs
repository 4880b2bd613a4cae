use std::time::Duration;

use otel_advisor_ratelimit::{spawn_refill_task, RateLimiter};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn e2e4_third_call_blocks_until_refill_at_low_rpm() {
    // rpm = 2 -> capacity 2, refill period 30s. Two calls succeed
    // immediately; a third has to wait for the background task to top
    // the bucket back up rather than erroring out.
    let limiter = RateLimiter::new(2);
    let cancel = CancellationToken::new();
    limiter.wait(&cancel).await.unwrap();
    limiter.wait(&cancel).await.unwrap();
    assert_eq!(limiter.available().await, 0);

    let handle = spawn_refill_task(limiter.clone(), cancel.clone());
    let waiter_limiter = limiter.clone();
    let waiter_cancel = cancel.clone();
    let waiter = tokio::spawn(async move { waiter_limiter.wait(&waiter_cancel).await });

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!waiter.is_finished(), "third call must not succeed before a refill period has elapsed");

    tokio::time::advance(Duration::from_secs(30)).await;
    waiter.await.unwrap().unwrap();

    cancel.cancel();
    handle.await.unwrap();
}
