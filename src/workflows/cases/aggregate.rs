use super::domain::{CaseStatus, StatusMeta};
use super::parser::{parse_status_text, StatusParseError};
use super::snapshot::{SnapshotError, SnapshotStore};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

/// Per-day counts of I-765 outcomes, keyed by the event date carried in the
/// status sentence.
pub type DailyStatusCounts = HashMap<NaiveDate, HashMap<CaseStatus, u64>>;

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("receipt {receipt} carries an unreadable status sentence")]
    Status {
        receipt: String,
        #[source]
        source: StatusParseError,
    },
}

/// One capture reduced to per-receipt classifications and a per-day
/// histogram of I-765 outcomes.
#[derive(Debug, Clone)]
pub struct SnapshotAggregate {
    pub captured_at: DateTime<Utc>,
    pub by_receipt: HashMap<String, StatusMeta>,
    pub daily_counts: DailyStatusCounts,
}

impl SnapshotAggregate {
    /// Issued-card count for one calendar day, or `None` when the capture
    /// recorded no activity for that day at all.
    pub fn issued_on(&self, day: NaiveDate) -> Option<u64> {
        self.daily_counts
            .get(&day)
            .map(|statuses| statuses.get(&CaseStatus::Issued).copied().unwrap_or(0))
    }

    pub fn status_of(&self, receipt: &str) -> Option<&StatusMeta> {
        self.by_receipt.get(receipt)
    }
}

/// Loads one capture and classifies every record in it. When a receipt
/// appears in several blocks the last block wins.
pub fn load_aggregate(
    store: &SnapshotStore,
    version: usize,
) -> Result<SnapshotAggregate, AggregateError> {
    let snapshot = store.load(version)?;

    let mut by_receipt: HashMap<String, StatusMeta> = HashMap::new();
    for record in &snapshot.records {
        let meta = parse_status_text(&record.text).map_err(|source| AggregateError::Status {
            receipt: record.receipt.clone(),
            source,
        })?;
        by_receipt.insert(record.receipt.clone(), meta);
    }

    let mut daily_counts: DailyStatusCounts = HashMap::new();
    for meta in by_receipt.values() {
        if let StatusMeta::I765 { status, event_date } = meta {
            *daily_counts
                .entry(*event_date)
                .or_default()
                .entry(*status)
                .or_default() += 1;
        }
    }

    Ok(SnapshotAggregate {
        captured_at: snapshot.captured_at,
        by_receipt,
        daily_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::cases::domain::StatusRecord;
    use chrono::TimeZone;
    use chrono::Utc;

    fn record(receipt: &str, seconds: i64, text: &str) -> StatusRecord {
        StatusRecord {
            receipt: receipt.to_string(),
            timestamp: Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp"),
            text: text.to_string(),
        }
    }

    fn write_snapshot(store: &SnapshotStore, records: &[StatusRecord]) {
        let started = Utc
            .timestamp_opt(1_600_000_000, 0)
            .single()
            .expect("valid timestamp");
        let mut writer = store.create_writer(95_000, started).expect("writer opens");
        for item in records {
            writer.append(item).expect("record appends");
        }
    }

    #[test]
    fn later_blocks_replace_earlier_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        write_snapshot(
            &store,
            &[
                record(
                    "YSC1790095000",
                    1_600_000_001,
                    "On January 2, 2018, we received your Form I-765, and mailed a notice.",
                ),
                record(
                    "YSC1790095000",
                    1_600_000_002,
                    "On January 5, 2018, we approved your Form I-765, and mailed a notice.",
                ),
            ],
        );

        let aggregate = load_aggregate(&store, 0).expect("aggregate loads");
        assert_eq!(aggregate.by_receipt.len(), 1);
        assert_eq!(
            aggregate.status_of("YSC1790095000").and_then(StatusMeta::status),
            Some(CaseStatus::Issued)
        );

        let received_day = NaiveDate::from_ymd_opt(2018, 1, 2).expect("valid date");
        assert_eq!(aggregate.issued_on(received_day), None);
    }

    #[test]
    fn histogram_counts_only_tracked_form_outcomes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        write_snapshot(
            &store,
            &[
                record(
                    "YSC1790095000",
                    1_600_000_001,
                    "On January 5, 2018, we approved your Form I-765, and mailed a notice.",
                ),
                record(
                    "YSC1790095010",
                    1_600_000_002,
                    "On January 5, 2018, we received your Form I-129 petition, and mailed a notice.",
                ),
                record("YSC1790095020", 1_600_000_003, "NA."),
            ],
        );

        let aggregate = load_aggregate(&store, 0).expect("aggregate loads");
        assert_eq!(aggregate.by_receipt.len(), 3);

        let day = NaiveDate::from_ymd_opt(2018, 1, 5).expect("valid date");
        assert_eq!(aggregate.issued_on(day), Some(1));
        assert_eq!(aggregate.daily_counts.len(), 1);
    }

    #[test]
    fn unreadable_sentences_name_the_receipt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        write_snapshot(
            &store,
            &[record(
                "YSC1790095000",
                1_600_000_001,
                "On Januray 5, 2018, we approved your Form I-765, and mailed a notice.",
            )],
        );

        let err = load_aggregate(&store, 0).expect_err("bad month cannot aggregate");
        assert!(matches!(
            err,
            AggregateError::Status { ref receipt, .. } if receipt == "YSC1790095000"
        ));
    }
}
