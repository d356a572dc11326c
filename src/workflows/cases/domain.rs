use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix shared by the tracked receipts: I-765 filings routed to the
/// Potomac Service Center in the 2017 intake block.
pub const RECEIPT_PREFIX: &str = "YSC1790";

/// Number of decimal digits in the intake-sequence part of a receipt.
pub const SEQUENCE_DIGITS: usize = 6;

/// Width of one reporting bucket in sequence-number space.
pub const BUCKET_WIDTH: u32 = 5000;

/// Interval at which the sampler walks the sequence space; only multiples
/// of this stride ever appear in a snapshot.
pub const SAMPLE_STRIDE: u32 = 10;

/// Text recorded when the status page has no paragraph for a receipt.
pub const NO_DATA_TEXT: &str = "NA.";

/// A validated receipt number: the fixed prefix followed by a six-digit
/// intake sequence. The sequence is the system's only ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiptNumber {
    sequence: u32,
}

impl ReceiptNumber {
    /// Validates a raw identifier. Rejection happens here, before any
    /// network or file access is attempted on the identifier.
    pub fn parse(raw: &str) -> Result<Self, ReceiptFormatError> {
        let reject = || ReceiptFormatError {
            raw: raw.to_string(),
        };

        let digits = raw.strip_prefix(RECEIPT_PREFIX).ok_or_else(reject)?;
        if digits.len() != SEQUENCE_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(reject());
        }

        let sequence = digits.parse::<u32>().map_err(|_| reject())?;
        Ok(Self { sequence })
    }

    /// The receipt sitting at `sequence` in the intake order.
    pub const fn from_sequence(sequence: u32) -> Self {
        Self { sequence }
    }

    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Reporting bucket this receipt falls into.
    pub const fn bucket(&self) -> u32 {
        self.sequence / BUCKET_WIDTH
    }
}

impl fmt::Display for ReceiptNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{RECEIPT_PREFIX}{:06}", self.sequence)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("receipt number {raw:?} is not {RECEIPT_PREFIX} followed by six digits")]
pub struct ReceiptFormatError {
    pub raw: String,
}

/// Status codes recognized from the USCIS status sentences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseStatus {
    Received,
    Issued,
    ReadyForMail,
    Ordered,
    Delivered,
    DeliveryFailure,
    EvidenceRequested,
    EvidenceReceived,
    PaymentFailure,
    NoticeFailure,
    CorrespondenceReceived,
    Transferred,
    InfoUpdated,
    Withdrawn,
    Rejected,
    AppealFailed,
}

impl CaseStatus {
    /// Report wording carried over from the historical tracker output.
    pub const fn label(self) -> &'static str {
        match self {
            CaseStatus::Received => "RECEIVED",
            CaseStatus::Issued => "ISSUED & MAILED",
            CaseStatus::ReadyForMail => "ISSUED & READY FOR MAIL",
            CaseStatus::Ordered => "ORDERED",
            CaseStatus::Delivered => "DELIVERED",
            CaseStatus::DeliveryFailure => "DELIVERY FAILURE",
            CaseStatus::EvidenceRequested => "REQUEST EVIDENCE",
            CaseStatus::EvidenceReceived => "EVIDENCE RECEIVED",
            CaseStatus::PaymentFailure => "PAYMENT FAILURE",
            CaseStatus::NoticeFailure => "NOTICE FAILURE",
            CaseStatus::CorrespondenceReceived => "CORRESPONDENCE RECEIVED",
            CaseStatus::Transferred => "CASE TRANSFERRED",
            CaseStatus::InfoUpdated => "INFORMATION UPDATED",
            CaseStatus::Withdrawn => "WITHDRAWED",
            CaseStatus::Rejected => "REJECTED",
            CaseStatus::AppealFailed => "APPEAL FAILED",
        }
    }

    /// Whether the case has left the processing pipeline.
    pub const fn is_finished(self) -> bool {
        matches!(
            self,
            CaseStatus::Issued | CaseStatus::Delivered | CaseStatus::Withdrawn
        )
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classification of one status sentence. Derived on demand and never
/// persisted, so the classifier can change without invalidating old
/// snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMeta {
    /// An I-765 case with a recognized status code.
    I765 {
        status: CaseStatus,
        event_date: NaiveDate,
    },
    /// A sentence in the expected shape whose clause matched no known
    /// template; the clause is kept verbatim to surface new templates.
    OtherForm {
        clause: String,
        event_date: NaiveDate,
    },
    /// Sentinel text or a sentence outside the expected shape.
    Unknown,
}

impl StatusMeta {
    pub fn status(&self) -> Option<CaseStatus> {
        match self {
            StatusMeta::I765 { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn event_date(&self) -> Option<NaiveDate> {
        match self {
            StatusMeta::I765 { event_date, .. } | StatusMeta::OtherForm { event_date, .. } => {
                Some(*event_date)
            }
            StatusMeta::Unknown => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_some_and(CaseStatus::is_finished)
    }
}

/// One sampled status lookup, exactly as stored in a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub receipt: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub text: String,
}
