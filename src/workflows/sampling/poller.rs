use super::gateway::{CaseStatusGateway, FetchError};
use crate::workflows::cases::domain::{ReceiptNumber, SAMPLE_STRIDE};
use crate::workflows::cases::{SnapshotError, SnapshotStore};
use chrono::Utc;
use rand::Rng;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// One sampling sweep: sequences `start`, `start + stride`, ... below `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    pub start: u32,
    pub end: u32,
    pub stride: u32,
    /// Lower bound of the random pause before each fetch; the actual pause
    /// is drawn from `[base_delay, 2 * base_delay]`.
    pub base_delay: Duration,
}

impl SamplingPlan {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            stride: SAMPLE_STRIDE,
            base_delay: Duration::from_secs(5),
        }
    }
}

/// Walks a sequence range through the gateway and appends every record to a
/// fresh capture file.
#[derive(Debug)]
pub struct SamplingPoller {
    gateway: Box<dyn CaseStatusGateway>,
    store: SnapshotStore,
}

impl SamplingPoller {
    pub fn new(gateway: Box<dyn CaseStatusGateway>, store: SnapshotStore) -> Self {
        Self { gateway, store }
    }

    /// Runs the sweep to completion and returns the capture file path. An
    /// error aborts the sweep; records appended so far stay on disk.
    pub fn run(&mut self, plan: SamplingPlan) -> Result<PathBuf, PollError> {
        // A zero stride would resample the same sequence forever.
        let stride = plan.stride.max(1);

        let mut writer = self.store.create_writer(plan.start, Utc::now())?;
        info!(
            start = plan.start,
            end = plan.end,
            stride,
            path = %writer.path().display(),
            "sampling sweep started"
        );

        let mut rng = rand::thread_rng();
        let mut count: u32 = 0;
        while plan.start + count * stride < plan.end {
            let sequence = plan.start + count * stride;
            let receipt = ReceiptNumber::from_sequence(sequence);

            pause(&mut rng, plan.base_delay);
            let record = self.gateway.fetch_status(&receipt)?;
            info!(receipt = %receipt, text = %record.text, "sampled");
            writer.append(&record)?;
            count += 1;
        }

        Ok(writer.path().to_path_buf())
    }
}

fn pause(rng: &mut impl Rng, base: Duration) {
    if base.is_zero() {
        return;
    }

    let base_ms = base.as_millis() as u64;
    let wait_ms = rng.gen_range(base_ms..=base_ms * 2);
    debug!(wait_ms, "pausing before fetch");
    thread::sleep(Duration::from_millis(wait_ms));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::cases::domain::StatusRecord;

    #[derive(Debug)]
    struct ScriptedGateway;

    impl CaseStatusGateway for ScriptedGateway {
        fn fetch_status(&mut self, receipt: &ReceiptNumber) -> Result<StatusRecord, FetchError> {
            Ok(StatusRecord {
                receipt: receipt.to_string(),
                timestamp: Utc::now(),
                text: "NA.".to_string(),
            })
        }
    }

    #[derive(Debug)]
    struct FailsAfter {
        remaining: u32,
    }

    impl CaseStatusGateway for FailsAfter {
        fn fetch_status(&mut self, receipt: &ReceiptNumber) -> Result<StatusRecord, FetchError> {
            if self.remaining == 0 {
                return Err(FetchError::Runtime("socket closed".to_string()));
            }
            self.remaining -= 1;
            Ok(StatusRecord {
                receipt: receipt.to_string(),
                timestamp: Utc::now(),
                text: "NA.".to_string(),
            })
        }
    }

    fn instant_plan(start: u32, end: u32) -> SamplingPlan {
        let mut plan = SamplingPlan::new(start, end);
        plan.base_delay = Duration::ZERO;
        plan
    }

    #[test]
    fn sweep_covers_the_half_open_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let mut poller = SamplingPoller::new(Box::new(ScriptedGateway), store.clone());

        let path = poller.run(instant_plan(95_000, 95_050)).expect("sweep finishes");
        let name = path.file_name().and_then(|n| n.to_str()).expect("file name");
        assert!(name.starts_with("095000-"));

        let loaded = store.load(0).expect("capture loads");
        let receipts: Vec<&str> = loaded.records.iter().map(|r| r.receipt.as_str()).collect();
        assert_eq!(
            receipts,
            [
                "YSC1790095000",
                "YSC1790095010",
                "YSC1790095020",
                "YSC1790095030",
                "YSC1790095040",
            ]
        );
    }

    #[test]
    fn errors_abort_but_keep_whole_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let mut poller = SamplingPoller::new(Box::new(FailsAfter { remaining: 2 }), store.clone());

        let err = poller.run(instant_plan(0, 50)).expect_err("gateway fails");
        assert!(matches!(err, PollError::Fetch(_)));

        let loaded = store.load(0).expect("partial capture loads");
        assert_eq!(loaded.records.len(), 2);
    }

    #[test]
    fn empty_ranges_produce_empty_captures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let mut poller = SamplingPoller::new(Box::new(ScriptedGateway), store.clone());

        poller.run(instant_plan(100, 100)).expect("sweep finishes");
        assert!(store.load(0).expect("capture loads").records.is_empty());
    }
}
