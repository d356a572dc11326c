use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastCode {
    Ok,
    UnexpectedFormat,
    NotApplicableCaseType,
    AlreadyIssued,
    AlreadyRejected,
    ExpiredDataset,
    InsufficientInformation,
}

impl ForecastCode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::UnexpectedFormat => "UNEXPECTED RECEIPT FORMAT",
            Self::NotApplicableCaseType => "RECEIPT NOT FOR I-765",
            Self::AlreadyIssued => "ALREADY ISSUED",
            Self::AlreadyRejected => "ALREADY REJECTED",
            Self::ExpiredDataset => "EXPIRED DATASET",
            Self::InsufficientInformation => "INSUFFICIENT INFORMATION",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub code: ForecastCode,
    pub code_label: &'static str,
    pub info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_cases: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_speed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_change_percent: Option<i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub bucket_progress: BTreeMap<u32, u32>,
}

impl Forecast {
    /// A forecast that carries only an explanation, for receipts where no
    /// estimate applies.
    pub fn terminal(code: ForecastCode, info: impl Into<String>) -> Self {
        Self {
            code,
            code_label: code.label(),
            info: info.into(),
            estimated_completion: None,
            pending_cases: None,
            daily_speed: None,
            speed_change_percent: None,
            bucket_progress: BTreeMap::new(),
        }
    }
}
