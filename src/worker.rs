//! Process sampling off the UI thread.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

use crate::sampler::{ProcessSample, SampleError, Sampler};

/// Upper bound for one sample cycle.
pub const SAMPLE_TIMEOUT: Duration = Duration::from_secs(5);
/// Blocking workers allowed to run at once, abandoned ones included.
pub const MAX_LIVE_WORKERS: usize = 2;

/// Run `sampler` on the blocking pool. A cycle that exceeds `timeout` or
/// whose worker dies counts as a sampler failure and yields no samples.
///
/// `permit` travels with the blocking closure, so a worker abandoned after
/// a timeout keeps its slot until the snapshot actually returns.
pub async fn sample_bounded(
    sampler: Sampler,
    permit: OwnedSemaphorePermit,
    timeout: Duration,
) -> Arc<[ProcessSample]> {
    let job = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        sampler.sample()
    });
    match tokio::time::timeout(timeout, job).await {
        Ok(Ok(samples)) => samples.into(),
        Ok(Err(e)) => {
            warn!("process sampling worker failed: {e}");
            Arc::from(Vec::new())
        }
        Err(_) => {
            warn!("{}", SampleError::Timeout(timeout));
            Arc::from(Vec::new())
        }
    }
}

/// Tickets for in-flight samples. Only a result newer than the last applied
/// one is accepted, so a slow sample can never replace a fresher one.
#[derive(Debug, Default)]
pub struct SampleSequencer {
    issued: u64,
    applied: u64,
}

impl SampleSequencer {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Returns false for a stale ticket, which the caller drops.
    pub fn accept(&mut self, ticket: u64) -> bool {
        if ticket <= self.applied || ticket > self.issued {
            debug!("dropping stale sample #{ticket} (applied #{})", self.applied);
            return false;
        }
        self.applied = ticket;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::tests::StaticTable;
    use crate::sampler::ProcessTable;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Sleeps through every snapshot and counts how many were started.
    struct SlowTable {
        delay: Duration,
        started: Arc<AtomicUsize>,
    }

    impl SlowTable {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                started: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ProcessTable for SlowTable {
        fn snapshot(&self) -> Result<Vec<ProcessSample>, SampleError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(vec![ProcessSample::new(1, "late", 1.0, 1.0, "")])
        }
    }

    fn slots() -> Arc<Semaphore> {
        Arc::new(Semaphore::new(MAX_LIVE_WORKERS))
    }

    #[test]
    fn test_sequencer_in_order() {
        let mut seq = SampleSequencer::default();
        let a = seq.issue();
        assert!(seq.accept(a));
        let b = seq.issue();
        assert!(seq.accept(b));
    }

    #[test]
    fn test_sequencer_drops_stale_results() {
        let mut seq = SampleSequencer::default();
        let first = seq.issue();
        let second = seq.issue();
        assert!(seq.accept(second));
        assert!(!seq.accept(first));
        assert!(!seq.accept(second));
    }

    #[test]
    fn test_sequencer_rejects_unissued() {
        let mut seq = SampleSequencer::default();
        assert!(!seq.accept(0));
        assert!(!seq.accept(7));
    }

    #[tokio::test]
    async fn test_sample_bounded_returns_sorted_samples() {
        let sampler = Sampler::new(Arc::new(StaticTable(Ok(vec![
            ProcessSample::new(1, "low", 0.5, 0.0, ""),
            ProcessSample::new(2, "high", 9.0, 0.0, ""),
        ]))));
        let slots = slots();
        let permit = slots.clone().try_acquire_owned().unwrap();
        let samples = sample_bounded(sampler, permit, SAMPLE_TIMEOUT).await;
        let pids: Vec<u32> = samples.iter().map(|s| s.pid).collect();
        assert_eq!(pids, vec![2, 1]);
        assert_eq!(slots.available_permits(), MAX_LIVE_WORKERS);
    }

    #[tokio::test]
    async fn test_sample_bounded_failure_is_empty() {
        let sampler = Sampler::new(Arc::new(StaticTable(Err("permission denied".into()))));
        let permit = slots().try_acquire_owned().unwrap();
        assert!(sample_bounded(sampler, permit, SAMPLE_TIMEOUT).await.is_empty());
    }

    #[tokio::test]
    async fn test_sample_bounded_timeout_is_empty() {
        let sampler = Sampler::new(Arc::new(SlowTable::new(Duration::from_millis(300))));
        let permit = slots().try_acquire_owned().unwrap();
        let samples = sample_bounded(sampler, permit, Duration::from_millis(20)).await;
        assert!(samples.is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_workers_keep_their_slot() {
        let table = SlowTable::new(Duration::from_millis(400));
        let started = table.started.clone();
        let sampler = Sampler::new(Arc::new(table));
        let slots = slots();

        let mut launched = 0;
        for _ in 0..6 {
            if let Ok(permit) = slots.clone().try_acquire_owned() {
                launched += 1;
                let samples = sample_bounded(sampler.clone(), permit, Duration::from_millis(20)).await;
                assert!(samples.is_empty());
            }
        }
        assert_eq!(launched, MAX_LIVE_WORKERS);
        assert_eq!(slots.available_permits(), 0);

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(started.load(Ordering::SeqCst), MAX_LIVE_WORKERS);
        assert_eq!(slots.available_permits(), MAX_LIVE_WORKERS);
    }
}
