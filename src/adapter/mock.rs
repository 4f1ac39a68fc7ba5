//! In-memory adapter using `DashMap`.
//!
//! Data is lost when the adapter is dropped. Useful for tests and for
//! development environments without a datastore.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;

use super::Adapter;
use crate::connection::ConnectionOptions;
use crate::{Error, Result};

/// In-memory datastore adapter.
///
/// Thread-safe; every operation fails with [`Error::Adapter`] once the
/// adapter has been disconnected.
///
/// # Example
///
/// ```rust
/// use trueno_ab::adapter::{Adapter, MockAdapter};
///
/// # fn example() -> trueno_ab::Result<()> {
/// let adapter = MockAdapter::default();
/// adapter.ab_add_participant("price_test", 1, "visitor-1")?;
/// assert_eq!(adapter.ab_assigned("price_test", "visitor-1")?, Some(1));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockAdapter {
    name: String,
    options: ConnectionOptions,
    active: AtomicBool,
    experiments: DashMap<String, DateTime<Utc>>,
    assignments: DashMap<(String, String), usize>,
    metrics: DashMap<(String, NaiveDate), Vec<i64>>,
}

impl MockAdapter {
    /// Create a connected adapter remembering the options it was built from.
    #[must_use]
    pub fn new(options: ConnectionOptions) -> Self {
        let name = options.adapter().unwrap_or("mock").to_string();
        Self {
            name,
            options,
            active: AtomicBool::new(true),
            experiments: DashMap::new(),
            assignments: DashMap::new(),
            metrics: DashMap::new(),
        }
    }

    /// Options the adapter was constructed from.
    #[must_use]
    pub const fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Number of recorded participant assignments.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.assignments.len()
    }

    /// Drop all stored data.
    pub fn flush(&self) {
        self.experiments.clear();
        self.assignments.clear();
        self.metrics.clear();
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::Adapter(format!("{} adapter is disconnected", self.name)))
        }
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new(ConnectionOptions::for_adapter("mock"))
    }
}

impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn disconnect(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn experiment_persisted(&self, experiment: &str) -> Result<bool> {
        self.ensure_active()?;
        Ok(self.experiments.contains_key(experiment))
    }

    fn set_experiment_created_at(&self, experiment: &str, at: DateTime<Utc>) -> Result<()> {
        self.ensure_active()?;
        self.experiments.entry(experiment.to_string()).or_insert(at);
        Ok(())
    }

    fn ab_add_participant(
        &self,
        experiment: &str,
        alternative: usize,
        identity: &str,
    ) -> Result<()> {
        self.ensure_active()?;
        self.assignments
            .insert((experiment.to_string(), identity.to_string()), alternative);
        Ok(())
    }

    fn ab_assigned(&self, experiment: &str, identity: &str) -> Result<Option<usize>> {
        self.ensure_active()?;
        Ok(self
            .assignments
            .get(&(experiment.to_string(), identity.to_string()))
            .map(|entry| *entry.value()))
    }

    fn metric_track(
        &self,
        metric: &str,
        timestamp: DateTime<Utc>,
        _identity: Option<&str>,
        values: &[i64],
    ) -> Result<()> {
        self.ensure_active()?;
        let mut bucket = self
            .metrics
            .entry((metric.to_string(), timestamp.date_naive()))
            .or_default();
        if bucket.len() < values.len() {
            bucket.resize(values.len(), 0);
        }
        for (total, value) in bucket.iter_mut().zip(values) {
            *total += value;
        }
        Ok(())
    }

    fn metric_values(&self, metric: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<i64>> {
        self.ensure_active()?;
        Ok(from
            .iter_days()
            .take_while(|day| *day <= to)
            .map(|day| {
                self.metrics
                    .get(&(metric.to_string(), day))
                    .and_then(|bucket| bucket.first().copied())
                    .unwrap_or(0)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mock_assignments() {
        let adapter = MockAdapter::default();

        assert_eq!(adapter.ab_assigned("exp", "alice").unwrap(), None);
        adapter.ab_add_participant("exp", 2, "alice").unwrap();

        assert_eq!(adapter.ab_assigned("exp", "alice").unwrap(), Some(2));
        assert_eq!(adapter.ab_assigned("exp", "bob").unwrap(), None);
        assert_eq!(adapter.participant_count(), 1);
    }

    #[test]
    fn test_mock_metric_daily_totals() {
        let adapter = MockAdapter::default();
        let day1 = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let day3 = Utc.with_ymd_and_hms(2024, 3, 3, 23, 0, 0).unwrap();

        adapter.metric_track("signups", day1, None, &[1]).unwrap();
        adapter.metric_track("signups", day1, Some("bob"), &[2]).unwrap();
        adapter.metric_track("signups", day3, None, &[5]).unwrap();

        let values = adapter
            .metric_values("signups", day1.date_naive(), day3.date_naive())
            .unwrap();
        assert_eq!(values, vec![3, 0, 5]);
    }

    #[test]
    fn test_mock_experiment_persistence() {
        let adapter = MockAdapter::default();
        assert!(!adapter.experiment_persisted("exp").unwrap());
        adapter.set_experiment_created_at("exp", Utc::now()).unwrap();
        assert!(adapter.experiment_persisted("exp").unwrap());
    }

    #[test]
    fn test_mock_disconnect_fails_operations() {
        let adapter = MockAdapter::default();
        adapter.disconnect();
        adapter.disconnect();

        assert!(!adapter.is_active());
        let err = adapter.ab_assigned("exp", "alice").unwrap_err();
        assert!(err.to_string().contains("disconnected"));
    }

    #[test]
    fn test_mock_flush() {
        let adapter = MockAdapter::default();
        adapter.ab_add_participant("exp", 0, "alice").unwrap();
        adapter.flush();
        assert_eq!(adapter.participant_count(), 0);
    }

    #[test]
    fn test_mock_remembers_options() {
        let options = ConnectionOptions::for_adapter("mock").with("port", 6379);
        let adapter = MockAdapter::new(options.clone());
        assert_eq!(adapter.options(), &options);
        assert_eq!(adapter.name(), "mock");
    }
}
