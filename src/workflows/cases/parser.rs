use super::domain::{CaseStatus, StatusMeta, NO_DATA_TEXT};
use chrono::NaiveDate;

/// Date layout used inside the status sentences ("January 5, 2018").
const EVENT_DATE_FORMAT: &str = "%B %d, %Y";

/// Opening words of the general sentence template.
const GENERAL_OPENING: &str = "On";

/// Opening words of the appeal sentence, which carries its date at a
/// different comma position than the general template.
const APPEAL_OPENING: &str = "Your appeal was dismissed";

/// Clause prefixes in priority order; the first match wins. Keep the order
/// such that no later entry is a prefix-superset of an earlier one.
const CLAUSE_TABLE: &[(&str, CaseStatus)] = &[
    (APPEAL_OPENING, CaseStatus::AppealFailed),
    ("we received your Form I-765", CaseStatus::Received),
    ("we approved your Form I-765", CaseStatus::Issued),
    (
        "the Post Office delivered your new card for",
        CaseStatus::Delivered,
    ),
    (
        "we mailed your new card for Receipt Number",
        CaseStatus::Issued,
    ),
    (
        "we ordered your new card for Receipt Number",
        CaseStatus::Ordered,
    ),
    (
        "we mailed a request for initial evidence for your Form I-765",
        CaseStatus::EvidenceRequested,
    ),
    (
        "we received your response to our Request for Evidence for your Form I-765",
        CaseStatus::EvidenceReceived,
    ),
    (
        "the check you used for payment for your Form I-765",
        CaseStatus::PaymentFailure,
    ),
    (
        "the Post Office returned a notice we sent you for your Form I-765",
        CaseStatus::NoticeFailure,
    ),
    (
        "we received your request to withdraw your Form I-765",
        CaseStatus::Withdrawn,
    ),
    (
        "the Post Office picked up mail containing your new card for Receipt Number",
        CaseStatus::ReadyForMail,
    ),
    (
        "we received your correspondence for Form I-765",
        CaseStatus::CorrespondenceReceived,
    ),
    ("we transferred your Form I-765", CaseStatus::Transferred),
    (
        "the Post Office returned your new card for Receipt Number",
        CaseStatus::DeliveryFailure,
    ),
    ("we rejected your Form I-765", CaseStatus::Rejected),
    ("we updated your", CaseStatus::InfoUpdated),
];

#[derive(Debug, thiserror::Error)]
pub enum StatusParseError {
    #[error("status sentence has too few comma fields: {text:?}")]
    TruncatedSentence { text: String },
    #[error("status sentence has an unparsable event date {date:?}")]
    MalformedDate {
        date: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Classifies one raw status sentence.
///
/// Sentinel text and sentences outside the two known templates come back as
/// `StatusMeta::Unknown`. A sentence that matches a template but carries a
/// truncated field list or an unparsable date is a hard error rather than a
/// guessed date.
pub fn parse_status_text(raw: &str) -> Result<StatusMeta, StatusParseError> {
    let content = raw.trim();

    if content == NO_DATA_TEXT {
        return Ok(StatusMeta::Unknown);
    }

    let (date_text, clause) = if content.starts_with(APPEAL_OPENING) {
        split_appeal_sentence(content)?
    } else if content.starts_with(GENERAL_OPENING) {
        split_general_sentence(content)?
    } else {
        return Ok(StatusMeta::Unknown);
    };

    let date_text = date_text.trim().to_string();
    let event_date =
        NaiveDate::parse_from_str(&date_text, EVENT_DATE_FORMAT).map_err(|source| {
            StatusParseError::MalformedDate {
                date: date_text.clone(),
                source,
            }
        })?;

    for (prefix, status) in CLAUSE_TABLE {
        if clause.starts_with(prefix) {
            return Ok(StatusMeta::I765 {
                status: *status,
                event_date,
            });
        }
    }

    Ok(StatusMeta::OtherForm { clause, event_date })
}

/// General template: "On <month day>, <year>, <clause>, ...". The date is
/// reassembled from the first two comma fields, the clause is the third.
fn split_general_sentence(content: &str) -> Result<(String, String), StatusParseError> {
    let fields: Vec<&str> = content.split(',').collect();
    if fields.len() < 3 {
        return Err(truncated(content));
    }

    let month_day = strip_lead_in(fields[0]).ok_or_else(|| truncated(content))?;
    let date_text = format!("{month_day},{}", fields[1]);
    Ok((date_text, fields[2].trim().to_string()))
}

/// Appeal template: the clause opens the sentence and the date sits in
/// comma fields 3 and 4, field 3 carrying an "on" lead-in.
fn split_appeal_sentence(content: &str) -> Result<(String, String), StatusParseError> {
    let fields: Vec<&str> = content.split(',').collect();
    if fields.len() < 5 {
        return Err(truncated(content));
    }

    let month_day = strip_lead_in(fields[3]).ok_or_else(|| truncated(content))?;
    let date_text = format!("{month_day},{}", fields[4]);
    Ok((date_text, fields[0].to_string()))
}

/// Drops the three-character lead-in ("On " or " on") before the month name.
fn strip_lead_in(field: &str) -> Option<&str> {
    field.get(3..)
}

fn truncated(content: &str) -> StatusParseError {
    StatusParseError::TruncatedSentence {
        text: content.to_string(),
    }
}
