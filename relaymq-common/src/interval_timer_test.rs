use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::sleep;

fn counting_callback(counter: &Arc<AtomicUsize>) -> TimerCallback {
    let counter = counter.clone();
    Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[tokio::test]
async fn one_shot_fires_exactly_once_per_start() {
    let scope = CancellationToken::new();
    let timer = IntervalTimer::new("one-shot", scope.clone());
    let counter = Arc::new(AtomicUsize::new(0));

    timer
        .start(Duration::from_millis(10), counting_callback(&counter), true)
        .await
        .expect("start");
    sleep(Duration::from_millis(40)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    sleep(Duration::from_millis(30)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1, "one-shot must not refire");

    timer
        .start(Duration::from_millis(5), counting_callback(&counter), true)
        .await
        .expect("restart");
    sleep(Duration::from_millis(40)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn periodic_schedule_keeps_firing_with_at_least_period_gaps() {
    let scope = CancellationToken::new();
    let timer = IntervalTimer::new("periodic", scope.clone());
    let counter = Arc::new(AtomicUsize::new(0));

    timer
        .start(Duration::from_millis(20), counting_callback(&counter), false)
        .await
        .expect("start");
    sleep(Duration::from_millis(130)).await;
    scope.cancel();

    let fired = counter.load(Ordering::SeqCst);
    assert!(fired >= 2, "expected repeated fires, got {fired}");
    // 130ms of runtime with a 20ms period bounds the count from above.
    assert!(fired <= 6, "gap below period, got {fired} fires");
}

#[tokio::test]
async fn restart_supersedes_the_previous_schedule() {
    let scope = CancellationToken::new();
    let timer = IntervalTimer::new("supersede", scope.clone());
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    timer
        .start(Duration::from_millis(10), counting_callback(&first), false)
        .await
        .expect("first schedule");
    sleep(Duration::from_millis(35)).await;
    timer
        .start(Duration::from_millis(10), counting_callback(&second), false)
        .await
        .expect("second schedule");

    // Let any tick already in flight land before snapshotting.
    sleep(Duration::from_millis(15)).await;
    let first_after_restart = first.load(Ordering::SeqCst);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(
        first.load(Ordering::SeqCst),
        first_after_restart,
        "superseded schedule must stop firing"
    );
    assert!(second.load(Ordering::SeqCst) >= 2);
    scope.cancel();
}

#[tokio::test]
async fn callback_errors_do_not_stop_a_periodic_schedule() {
    let scope = CancellationToken::new();
    let timer = IntervalTimer::new("faulty", scope.clone());
    let counter = Arc::new(AtomicUsize::new(0));

    let tally = counter.clone();
    let callback: TimerCallback = Box::new(move || {
        tally.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("tick failed"))
    });
    timer
        .start(Duration::from_millis(10), callback, false)
        .await
        .expect("start");
    sleep(Duration::from_millis(60)).await;
    scope.cancel();

    assert!(counter.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn cancelled_scope_refuses_new_schedules() {
    let scope = CancellationToken::new();
    let timer = IntervalTimer::new("dead", scope.clone());
    scope.cancel();

    let counter = Arc::new(AtomicUsize::new(0));
    let err = timer
        .start(Duration::from_millis(5), counting_callback(&counter), true)
        .await
        .expect_err("cancelled scope must refuse");
    assert!(matches!(err, TimerError::Cancelled));
}
