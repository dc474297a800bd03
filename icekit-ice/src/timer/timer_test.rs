use super::*;
use std::time::Duration;

#[test]
fn test_timer_queue_fires_in_deadline_order() {
    let now = Instant::now();
    let mut timers = TimerQueue::new();
    timers.schedule(now + Duration::from_millis(30), "c");
    timers.schedule(now + Duration::from_millis(10), "a");
    timers.schedule(now + Duration::from_millis(10), "b");

    assert_eq!(timers.poll_timeout(), Some(now + Duration::from_millis(10)));
    assert_eq!(timers.pop_expired(now), None, "nothing is due yet");

    let later = now + Duration::from_millis(20);
    assert_eq!(timers.pop_expired(later), Some("a"));
    assert_eq!(timers.pop_expired(later), Some("b"), "ties fire in scheduling order");
    assert_eq!(timers.pop_expired(later), None);
    assert_eq!(timers.len(), 1);
}

#[test]
fn test_timer_queue_cancel() {
    let now = Instant::now();
    let mut timers = TimerQueue::new();
    let first = timers.schedule(now, 1);
    let second = timers.schedule(now + Duration::from_secs(1), 2);

    assert!(timers.cancel(first));
    assert!(!timers.cancel(first), "cancel twice");
    assert!(!timers.contains(first));
    assert_eq!(timers.deadline(second), Some(now + Duration::from_secs(1)));
    assert_eq!(timers.poll_timeout(), Some(now + Duration::from_secs(1)));

    timers.clear();
    assert!(timers.is_empty());
    assert_eq!(timers.poll_timeout(), None);
    assert!(!timers.cancel(second));
}
