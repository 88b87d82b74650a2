//! Latest-value store, one slot per metric.

use serde::Serialize;
use tokio::sync::watch;

use crate::metric::{MetricKind, MetricSample};

/// Snapshot of every metric slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Readings {
    slots: [Option<MetricSample>; MetricKind::COUNT],
}

impl Readings {
    /// Returns the sample held for `kind`, if any.
    pub fn get(&self, kind: MetricKind) -> Option<MetricSample> {
        self.slots[kind.index()]
    }

    /// Iterates over all slots in metric order.
    pub fn iter(&self) -> impl Iterator<Item = (MetricKind, Option<MetricSample>)> + '_ {
        MetricKind::ALL.iter().map(|&kind| (kind, self.get(kind)))
    }

    /// True once every metric has at least one sample.
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }
}

/// Observable store of the most recent sample per metric.
///
/// Writes overwrite unconditionally; a late sample with an older
/// `captured_at` replaces a newer one.
pub struct MetricStore {
    tx: watch::Sender<Readings>,
}

impl MetricStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Readings::default());
        Self { tx }
    }

    /// Overwrites the slot for `kind`.
    pub fn set(&self, kind: MetricKind, sample: MetricSample) {
        self.tx.send_modify(|readings| {
            readings.slots[kind.index()] = Some(sample);
        });
    }

    /// Returns the current sample for `kind`.
    pub fn get(&self, kind: MetricKind) -> Option<MetricSample> {
        self.tx.borrow().get(kind)
    }

    /// Returns a copy of every slot.
    pub fn snapshot(&self) -> Readings {
        self.tx.borrow().clone()
    }

    /// Subscribes to slot changes.
    pub fn subscribe(&self) -> watch::Receiver<Readings> {
        self.tx.subscribe()
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample(value: f64, secs: i64) -> MetricSample {
        MetricSample::new(value, Utc.timestamp_opt(1_728_000_000 + secs, 0).unwrap())
    }

    #[test]
    fn test_starts_empty() {
        let store = MetricStore::new();
        for kind in MetricKind::ALL {
            assert!(store.get(kind).is_none());
        }
        assert!(!store.snapshot().is_complete());
    }

    #[test]
    fn test_last_write_wins_even_when_older() {
        let store = MetricStore::new();
        store.set(MetricKind::HeartRate, sample(80.0, 120));
        store.set(MetricKind::HeartRate, sample(70.0, 60));
        assert_eq!(store.get(MetricKind::HeartRate), Some(sample(70.0, 60)));
        assert!(store.get(MetricKind::Altitude).is_none());
    }

    #[test]
    fn test_subscribers_see_changes() {
        let store = MetricStore::new();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        store.set(MetricKind::Altitude, sample(12.0, 0));
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().get(MetricKind::Altitude),
            Some(sample(12.0, 0))
        );
    }

    #[test]
    fn test_complete_after_every_slot_set() {
        let store = MetricStore::new();
        for (i, kind) in MetricKind::ALL.iter().enumerate() {
            store.set(*kind, sample(i as f64, 0));
        }
        let readings = store.snapshot();
        assert!(readings.is_complete());
        assert_eq!(readings.iter().count(), MetricKind::COUNT);
    }
}
