use super::calendar::BusinessCalendar;
use super::views::{Forecast, ForecastCode};
use crate::workflows::cases::domain::{
    CaseStatus, ReceiptNumber, StatusMeta, BUCKET_WIDTH, SAMPLE_STRIDE,
};
use crate::workflows::cases::{
    load_aggregate, parse_status_text, AggregateError, SnapshotAggregate, SnapshotStore,
    StatusParseError,
};
use crate::workflows::sampling::{CaseStatusGateway, FetchError};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// Captures taken before this hour do not yet carry the day's updates.
const DAILY_CUTOVER_HOUR: u32 = 17;

/// Business days probed before the scan judges staleness or sparsity.
const HISTORY_PROBE_DAYS: u32 = 3;

const UNEXPECTED_FORMAT_INFO: &str =
    "The receipt number you entered has an invalid format. Please double check. Note that we \
     only accept receipt numbers starting with YSC because all newly filed I-765 from F1 \
     applicants are processed in the Potomac Service Center.";

const NOT_APPLICABLE_INFO: &str =
    "The receipt number you entered does not correspond to an I-765 application.";

const PAPER_RECEIPT_INFO: &str =
    "USCIS may have sent you a paper receipt, but has not input your case into the system yet.";

#[derive(Debug, thiserror::Error)]
pub enum EstimateError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("live status lookup failed")]
    Fetch(#[from] FetchError),
    #[error("live status for {receipt} is unreadable")]
    LiveStatus {
        receipt: String,
        #[source]
        source: StatusParseError,
    },
}

/// Per-bucket sample counters accumulated by the queue scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BucketTally {
    tracked: u64,
    finished: u64,
    other: u64,
    unsampled: u64,
}

#[derive(Debug)]
struct QueueScan {
    tallies: BTreeMap<u32, BucketTally>,
    ratio: f64,
    pending: u64,
}

#[derive(Debug, PartialEq)]
enum ThroughputOutcome {
    /// The capture is too old relative to the reference day to produce a
    /// history window.
    Expired,
    Window {
        /// Issuance counts, most recent day first.
        issued: Vec<u64>,
        insufficient: bool,
    },
}

/// Runs the whole estimation pipeline for one receipt: validation, live
/// check, queue scan, throughput scan.
#[derive(Debug)]
pub struct CaseEstimator {
    store: SnapshotStore,
    gateway: Box<dyn CaseStatusGateway>,
    calendar: BusinessCalendar,
}

impl CaseEstimator {
    pub fn new(store: SnapshotStore, gateway: Box<dyn CaseStatusGateway>) -> Self {
        Self {
            store,
            gateway,
            calendar: BusinessCalendar,
        }
    }

    pub fn estimate(
        &mut self,
        raw_receipt: &str,
        version: usize,
        history_length: u32,
    ) -> Result<Forecast, EstimateError> {
        // Validation happens before any file or network access.
        let Ok(receipt) = ReceiptNumber::parse(raw_receipt) else {
            return Ok(Forecast::terminal(
                ForecastCode::UnexpectedFormat,
                UNEXPECTED_FORMAT_INFO,
            ));
        };

        let aggregate = load_aggregate(&self.store, version)?;

        let live = self.gateway.fetch_status(&receipt)?;
        let live_meta =
            parse_status_text(&live.text).map_err(|source| EstimateError::LiveStatus {
                receipt: live.receipt.clone(),
                source,
            })?;

        if matches!(live_meta, StatusMeta::OtherForm { .. }) {
            return Ok(Forecast::terminal(
                ForecastCode::NotApplicableCaseType,
                NOT_APPLICABLE_INFO,
            ));
        }

        let info = if live_meta == StatusMeta::Unknown {
            PAPER_RECEIPT_INFO.to_string()
        } else {
            live.text.clone()
        };

        match live_meta.status() {
            Some(CaseStatus::Issued) | Some(CaseStatus::Delivered) => {
                return Ok(Forecast::terminal(ForecastCode::AlreadyIssued, info));
            }
            Some(CaseStatus::Rejected) => {
                return Ok(Forecast::terminal(ForecastCode::AlreadyRejected, info));
            }
            _ => {}
        }

        let scan = scan_queue(&aggregate, receipt.sequence());

        let today = reference_today(aggregate.captured_at);
        let outcome = scan_throughput(
            &aggregate,
            today,
            aggregate.captured_at.date_naive(),
            history_length,
            &self.calendar,
        );

        let ThroughputOutcome::Window {
            issued,
            insufficient,
        } = outcome
        else {
            return Ok(Forecast::terminal(ForecastCode::ExpiredDataset, info));
        };

        let code = if insufficient {
            ForecastCode::InsufficientInformation
        } else {
            ForecastCode::Ok
        };

        let change = speed_change_percent(&issued);
        let counted = issued.len() as u64;
        let total_issued: u64 = issued.iter().sum();
        let speed = if counted == 0 { 0 } else { total_issued / counted };

        let estimated_completion = if speed == 0 {
            None
        } else {
            let business_days = scan.pending / speed;
            Some(self.calendar.plus_business_days(today, business_days + 1))
        };

        debug!(
            pending = scan.pending,
            speed, change, "queue and throughput scans complete"
        );

        // Reported counts undo the stride-10 sampling.
        Ok(Forecast {
            code,
            code_label: code.label(),
            info,
            estimated_completion,
            pending_cases: Some(scan.pending * u64::from(SAMPLE_STRIDE)),
            daily_speed: Some(speed * u64::from(SAMPLE_STRIDE)),
            speed_change_percent: Some(change),
            bucket_progress: bucket_progress(&scan.tallies, scan.ratio),
        })
    }
}

/// Day whose activity the capture fully reflects. Before the cutover hour
/// the feed has not yet posted the capture day's updates.
fn reference_today(captured_at: DateTime<Utc>) -> NaiveDate {
    let date = captured_at.date_naive();
    if captured_at.hour() < DAILY_CUTOVER_HOUR {
        date.pred_opt().unwrap_or(date)
    } else {
        date
    }
}

fn tally_sequence(
    tallies: &mut BTreeMap<u32, BucketTally>,
    aggregate: &SnapshotAggregate,
    sequence: u32,
) {
    let receipt = ReceiptNumber::from_sequence(sequence);
    let tally = tallies.entry(receipt.bucket()).or_default();

    match aggregate.status_of(&receipt.to_string()) {
        Some(StatusMeta::I765 { status, .. }) => {
            tally.tracked += 1;
            if status.is_finished() {
                tally.finished += 1;
            }
        }
        Some(StatusMeta::OtherForm { .. }) => tally.other += 1,
        // Sampled-but-unknown and never-sampled land in the same counter.
        Some(StatusMeta::Unknown) | None => tally.unsampled += 1,
    }
}

/// Walks sampled sequences from 0 through the end of the target's bucket.
/// The apportioning ratio and the pending count are fixed after the leading
/// scan reaches the target; the bucket tail is tallied afterwards so the
/// target bucket's progress is complete, reusing the global ratio.
fn scan_queue(aggregate: &SnapshotAggregate, target_sequence: u32) -> QueueScan {
    let mut tallies = BTreeMap::new();

    let mut last_sequence = 0;
    for sequence in (0..=target_sequence).step_by(SAMPLE_STRIDE as usize) {
        last_sequence = sequence;
        tally_sequence(&mut tallies, aggregate, sequence);
    }

    let tracked: u64 = tallies.values().map(|tally| tally.tracked).sum();
    let finished: u64 = tallies.values().map(|tally| tally.finished).sum();
    let other: u64 = tallies.values().map(|tally| tally.other).sum();
    let unsampled: u64 = tallies.values().map(|tally| tally.unsampled).sum();

    let ratio = tracked_ratio(tracked, other);
    let pending = pending_ahead(tracked, finished, unsampled, ratio);

    let bucket_end = (target_sequence / BUCKET_WIDTH + 1) * BUCKET_WIDTH;
    for sequence in ((last_sequence + SAMPLE_STRIDE)..bucket_end).step_by(SAMPLE_STRIDE as usize) {
        tally_sequence(&mut tallies, aggregate, sequence);
    }

    QueueScan {
        tallies,
        ratio,
        pending,
    }
}

/// Fraction of classified samples that are tracked-form cases. Zero when
/// nothing has been classified yet.
fn tracked_ratio(tracked: u64, other: u64) -> f64 {
    let denominator = tracked + other;
    if denominator == 0 {
        return 0.0;
    }
    tracked as f64 / denominator as f64
}

fn pending_ahead(tracked: u64, finished: u64, unsampled: u64, ratio: f64) -> u64 {
    tracked - finished + (ratio * unsampled as f64) as u64
}

fn bucket_progress(tallies: &BTreeMap<u32, BucketTally>, ratio: f64) -> BTreeMap<u32, u32> {
    tallies
        .iter()
        .map(|(bucket, tally)| {
            let denominator = tally.tracked as f64 + tally.unsampled as f64 * ratio;
            let percent = if denominator > 0.0 {
                (tally.finished as f64 * 100.0 / denominator) as u32
            } else {
                0
            };
            (*bucket, percent)
        })
        .collect()
}

/// Walks business days backward from the reference day collecting issuance
/// counts. Days the capture cannot see yet are skipped; a day known to the
/// histogram, or any day before the capture day, counts toward the window.
fn scan_throughput(
    aggregate: &SnapshotAggregate,
    today: NaiveDate,
    capture_day: NaiveDate,
    history_length: u32,
    calendar: &BusinessCalendar,
) -> ThroughputOutcome {
    let mut issued: Vec<u64> = Vec::new();
    let mut skipped: u32 = 0;
    let mut insufficient = false;

    let mut day = calendar.rollback_to_business_day(today);
    for _ in 0..history_length {
        let counted = issued.len() as u32;
        if skipped >= HISTORY_PROBE_DAYS && counted == HISTORY_PROBE_DAYS {
            return ThroughputOutcome::Expired;
        }
        if counted >= HISTORY_PROBE_DAYS && issued.iter().sum::<u64>() == 0 {
            insufficient = true;
        }

        match aggregate.issued_on(day) {
            Some(count) => {
                debug!(%day, count, "history day");
                issued.push(count);
            }
            None if day < capture_day => {
                debug!(%day, count = 0u64, "history day");
                issued.push(0);
            }
            None => {
                debug!(%day, "skipping day not covered by the capture");
                skipped += 1;
            }
        }

        day = calendar.previous_business_day(day);
    }

    ThroughputOutcome::Window {
        issued,
        insufficient,
    }
}

/// Percent change of the newest half of the window against the older half.
fn speed_change_percent(issued: &[u64]) -> i64 {
    let half = issued.len() / 2;
    let current = mean(&issued[..half]);
    let past = mean(&issued[half..]);
    (100.0 * (current - past) / past.max(1.0)) as i64
}

fn mean(series: &[u64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<u64>() as f64 / series.len() as f64
}
