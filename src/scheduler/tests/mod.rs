use super::*;
use chrono::TimeZone;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn at(h: u32, m: u32, s: u32, ms: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap() + chrono::Duration::milliseconds(ms)
}

#[test]
fn test_zero_period_is_rejected() {
    let err = Scheduler::new(Duration::ZERO, ScheduleAnchor::Immediate).unwrap_err();
    assert!(
        matches!(&err, Error::Config { key, .. } if key.as_deref() == Some("frequency")),
        "got {err:?}"
    );

    let err =
        Scheduler::new(Duration::from_secs(1), ScheduleAnchor::AlignedSecs(0)).unwrap_err();
    assert!(matches!(err, Error::Config { .. }), "got {err:?}");
}

#[test]
fn test_immediate_anchor_fires_at_once() {
    let scheduler = Scheduler::new(Duration::from_secs(60), ScheduleAnchor::Immediate).unwrap();
    assert_eq!(scheduler.first_delay(at(12, 0, 7, 300)), Duration::ZERO);
}

#[test]
fn test_aligned_anchor_waits_for_next_boundary() {
    let scheduler = Scheduler::new(Duration::from_secs(60), ScheduleAnchor::AlignedSecs(30))
        .unwrap();

    assert_eq!(
        scheduler.first_delay(at(12, 0, 10, 250)),
        Duration::from_millis(19_750)
    );
    assert_eq!(
        scheduler.first_delay(at(12, 0, 45, 0)),
        Duration::from_secs(15)
    );
}

#[test]
fn test_aligned_anchor_on_boundary_fires_at_once() {
    let scheduler = Scheduler::new(Duration::from_secs(60), ScheduleAnchor::AlignedSecs(30))
        .unwrap();
    assert_eq!(scheduler.first_delay(at(12, 1, 30, 0)), Duration::ZERO);
}

#[tokio::test]
async fn test_fires_repeatedly_until_cancelled() {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();

    let scheduler = Scheduler::new(Duration::from_millis(40), ScheduleAnchor::Immediate).unwrap();
    let handle = scheduler.arm(
        move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        },
    );

    tokio::time::sleep(Duration::from_millis(190)).await;
    handle.shutdown().await;

    let after_cancel = fired.load(Ordering::SeqCst);
    assert!(after_cancel >= 3, "expected at least 3 fires, got {after_cancel}");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        fired.load(Ordering::SeqCst),
        after_cancel,
        "no fires after cancellation"
    );
}

#[tokio::test]
async fn test_long_tick_does_not_delay_next_fire() {
    let started = Arc::new(AtomicUsize::new(0));
    let counter = started.clone();

    let scheduler = Scheduler::new(Duration::from_millis(30), ScheduleAnchor::Immediate).unwrap();
    let handle = scheduler.arm(
        move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
        },
    );

    tokio::time::sleep(Duration::from_millis(140)).await;
    handle.cancel();

    let count = started.load(Ordering::SeqCst);
    assert!(
        count >= 3,
        "ticks should keep firing while an earlier tick runs, got {count}"
    );
}

#[tokio::test]
async fn test_cancel_does_not_interrupt_in_flight_tick() {
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();

    let scheduler = Scheduler::new(Duration::from_secs(60), ScheduleAnchor::Immediate).unwrap();
    let handle = scheduler.arm(
        move || {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                flag.store(true, Ordering::SeqCst);
            }
        },
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.shutdown().await;
    assert!(!finished.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        finished.load(Ordering::SeqCst),
        "in-flight tick must run to completion"
    );
}

#[tokio::test]
async fn test_dropping_handle_cancels_schedule() {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();

    let scheduler = Scheduler::new(Duration::from_millis(20), ScheduleAnchor::Immediate).unwrap();
    let handle = scheduler.arm(
        move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        },
    );
    assert!(!handle.is_cancelled());

    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(handle);
    // Let the loop observe cancellation
    tokio::time::sleep(Duration::from_millis(30)).await;
    let count = fired.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fired.load(Ordering::SeqCst), count);
}
