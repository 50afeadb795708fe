//! Keyed coalescing throttle.
//!
//! Each key has a slot holding the latest submitted value, the time of its
//! last flush and a pending-flush flag. A submission outside the interval
//! is flushed immediately (leading edge). A submission inside the interval
//! only replaces the stored value and, if no flush is pending yet, arms a
//! timer that flushes whatever value is latest when it fires (trailing
//! edge). A key is therefore flushed at most once per interval and never
//! with a value older than the last one submitted.
//!
//! Slots carry a generation so a timer armed before [`Coalescer::forget`]
//! cannot flush a slot created after it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

struct Slot<T> {
    generation: u64,
    latest: Option<T>,
    last_flush: Option<Instant>,
    flush_pending: bool,
}

impl<T> Slot<T> {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            latest: None,
            last_flush: None,
            flush_pending: false,
        }
    }
}

type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Coalesces values per key so each key is flushed at most once per interval.
pub struct Coalescer<T> {
    interval: Duration,
    next_generation: AtomicU64,
    slots: Arc<Mutex<HashMap<String, Slot<T>>>>,
    sink: Sink<T>,
}

impl<T: Send + 'static> Coalescer<T> {
    /// Create a coalescer delivering flushed values to `sink`.
    pub fn new(interval: Duration, sink: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            interval,
            next_generation: AtomicU64::new(0),
            slots: Arc::new(Mutex::new(HashMap::new())),
            sink: Arc::new(sink),
        }
    }

    /// Submit a value for `key`. Must be called from within a Tokio runtime.
    pub fn submit(&self, key: &str, value: T) {
        let now = Instant::now();
        let (delay, generation) = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.to_string()).or_insert_with(|| {
                Slot::new(self.next_generation.fetch_add(1, Ordering::Relaxed))
            });

            if slot.flush_pending {
                slot.latest = Some(value);
                return;
            }

            let last_flush = slot.last_flush;
            match last_flush {
                Some(last) if now.duration_since(last) < self.interval => {
                    slot.latest = Some(value);
                    slot.flush_pending = true;
                    (self.interval - now.duration_since(last), slot.generation)
                }
                _ => {
                    slot.last_flush = Some(now);
                    drop(slots);
                    (self.sink)(value);
                    return;
                }
            }
        };

        let slots = Arc::clone(&self.slots);
        let sink = Arc::clone(&self.sink);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let value = {
                let mut slots = slots.lock();
                let Some(slot) = slots
                    .get_mut(&key)
                    .filter(|slot| slot.generation == generation)
                else {
                    return;
                };
                slot.flush_pending = false;
                slot.last_flush = Some(Instant::now());
                slot.latest.take()
            };
            if let Some(value) = value {
                sink(value);
            }
        });
    }

    /// Drop any pending value for `key` and forget its history.
    pub fn forget(&self, key: &str) {
        self.slots.lock().remove(key);
    }

    /// Whether a trailing flush is armed for `key`.
    pub fn is_pending(&self, key: &str) -> bool {
        self.slots
            .lock()
            .get(key)
            .map(|s| s.flush_pending)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(interval: Duration) -> (Coalescer<u32>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let coalescer = Coalescer::new(interval, move |v| sink.lock().push(v));
        (coalescer, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_submission_flushes_immediately() {
        let (c, seen) = recorder(Duration::from_millis(750));
        c.submit("g1", 1);
        assert_eq!(*seen.lock(), vec![1]);
        assert!(!c.is_pending("g1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_latest() {
        let (c, seen) = recorder(Duration::from_millis(750));
        c.submit("g1", 1);
        c.submit("g1", 2);
        c.submit("g1", 3);
        c.submit("g1", 4);
        assert_eq!(*seen.lock(), vec![1]);
        assert!(c.is_pending("g1"));

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(*seen.lock(), vec![1, 4]);
        assert!(!c.is_pending("g1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_after_interval_is_leading_edge() {
        let (c, seen) = recorder(Duration::from_millis(750));
        c.submit("g1", 1);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        c.submit("g1", 2);
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let (c, seen) = recorder(Duration::from_millis(750));
        c.submit("g1", 1);
        c.submit("g2", 2);
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_drops_pending_value() {
        let (c, seen) = recorder(Duration::from_millis(750));
        c.submit("g1", 1);
        c.submit("g1", 2);
        c.forget("g1");

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_armed_before_forget_leaves_new_slot_alone() {
        let (c, seen) = recorder(Duration::from_millis(750));
        c.submit("g1", 1);
        c.submit("g1", 2);
        c.forget("g1");

        tokio::time::sleep(Duration::from_millis(500)).await;
        c.submit("g1", 3);
        c.submit("g1", 4);
        assert_eq!(*seen.lock(), vec![1, 3]);

        // The old timer fires at 750ms; the new slot's flush is due at 1250ms
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(*seen.lock(), vec![1, 3]);
        assert!(c.is_pending("g1"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*seen.lock(), vec![1, 3, 4]);
        assert!(!c.is_pending("g1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_flush_per_interval() {
        let (c, seen) = recorder(Duration::from_millis(100));
        for i in 0..50u32 {
            c.submit("g1", i);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let seen = seen.lock();
        // 500ms of submissions at 100ms spacing, plus the trailing flush
        assert!(seen.len() <= 8, "flushed {} times", seen.len());
        assert_eq!(*seen.last().unwrap(), 49);
    }
}
