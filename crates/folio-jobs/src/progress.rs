//! Work-unit progress for a running job.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use folio_archive::ProgressSink;
use folio_core::defaults::{PROGRESS_CEILING_BEFORE_DONE, PROGRESS_HEADROOM_PERCENT};
use folio_core::GlobalIdentifier;

/// Callback invoked whenever the reported percentage rises.
pub type ProgressObserver = Box<dyn Fn(u8) + Send + Sync>;

/// Monotonic work counter seeded with an estimate of the work ahead.
///
/// The estimate is the record count plus headroom for packaging, which
/// happens after the last record. The percentage stays below 100 until
/// [`finish`](Self::finish) is called, and never goes down.
pub struct ProgressMonitor {
    total: AtomicU64,
    done: AtomicU64,
    finished: AtomicBool,
    reported: AtomicU8,
    observer: Option<ProgressObserver>,
}

impl ProgressMonitor {
    pub fn new(expected_records: usize) -> Self {
        Self {
            total: AtomicU64::new(estimate(expected_records)),
            done: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            reported: AtomicU8::new(0),
            observer: None,
        }
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Estimated work units, including packaging headroom.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Work units completed so far.
    pub fn work_done(&self) -> u64 {
        self.done.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Percentage complete, 100 only once the job has finished.
    pub fn percent(&self) -> u8 {
        self.computed().max(self.reported.load(Ordering::SeqCst))
    }

    /// Mark the work as complete.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
        self.notify();
    }

    fn computed(&self) -> u8 {
        if self.is_finished() {
            return 100;
        }
        let total = self.total();
        if total == 0 {
            return 0;
        }
        let percent = self.work_done().saturating_mul(100) / total;
        percent.min(PROGRESS_CEILING_BEFORE_DONE as u64) as u8
    }

    fn notify(&self) {
        let percent = self.computed();
        let previous = self.reported.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            if let Some(observer) = &self.observer {
                observer(percent);
            }
        }
    }
}

/// Rounds up so that any non-empty export reserves packaging work.
fn estimate(records: usize) -> u64 {
    (records as u64)
        .saturating_mul(PROGRESS_HEADROOM_PERCENT)
        .div_ceil(100)
}

impl ProgressSink for ProgressMonitor {
    fn record_written(&self, _record: &GlobalIdentifier) {
        self.done.fetch_add(1, Ordering::SeqCst);
        self.notify();
    }

    fn records_expected(&self, count: usize) {
        self.total.fetch_max(estimate(count), Ordering::SeqCst);
    }

    fn packaging_finished(&self) {
        self.finish();
    }
}

impl fmt::Debug for ProgressMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressMonitor")
            .field("total", &self.total())
            .field("done", &self.work_done())
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn record() -> GlobalIdentifier {
        GlobalIdentifier::document(1)
    }

    #[test]
    fn test_seeded_with_headroom() {
        let monitor = ProgressMonitor::new(8);
        assert_eq!(monitor.total(), 10);
        assert_eq!(monitor.percent(), 0);
    }

    #[test]
    fn test_small_exports_keep_packaging_headroom() {
        for records in 1..4 {
            let monitor = ProgressMonitor::new(records);
            assert!(monitor.total() > records as u64, "no headroom for {}", records);
        }
        assert_eq!(ProgressMonitor::new(3).total(), 4);

        let monitor = ProgressMonitor::new(3);
        for _ in 0..3 {
            monitor.record_written(&record());
        }
        assert_eq!(monitor.percent(), 75);
    }

    #[test]
    fn test_capped_until_finished() {
        let monitor = ProgressMonitor::new(4);
        for _ in 0..10 {
            monitor.record_written(&record());
        }
        assert_eq!(monitor.work_done(), 10);
        assert_eq!(monitor.percent(), PROGRESS_CEILING_BEFORE_DONE);

        monitor.packaging_finished();
        assert!(monitor.is_finished());
        assert_eq!(monitor.percent(), 100);
    }

    #[test]
    fn test_raising_estimate_never_lowers_percent() {
        let monitor = ProgressMonitor::new(4);
        monitor.record_written(&record());
        monitor.record_written(&record());
        assert_eq!(monitor.percent(), 40);

        monitor.records_expected(40);
        assert_eq!(monitor.total(), 50);
        assert_eq!(monitor.percent(), 40);

        monitor.records_expected(1);
        assert_eq!(monitor.total(), 50);
    }

    #[test]
    fn test_unknown_estimate_reports_zero() {
        let monitor = ProgressMonitor::new(0);
        monitor.record_written(&record());
        assert_eq!(monitor.percent(), 0);
        monitor.finish();
        assert_eq!(monitor.percent(), 100);
    }

    #[test]
    fn test_observer_sees_rising_percentages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let monitor = ProgressMonitor::new(8).with_observer(move |p| sink.lock().unwrap().push(p));

        for _ in 0..8 {
            monitor.record_written(&record());
        }
        monitor.finish();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![10, 20, 30, 40, 50, 60, 70, 80, 100]);
    }
}
