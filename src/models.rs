use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::Serialize;
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    Fellow,
    Faculty,
}

impl RecipientKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecipientKind::Fellow => "fellow",
            RecipientKind::Faculty => "faculty",
        }
    }

    /// Directory table holding recipients of this kind.
    pub fn table(self) -> &'static str {
        match self {
            RecipientKind::Fellow => "fellowship_notify.fellows",
            RecipientKind::Faculty => "fellowship_notify.faculty",
        }
    }

    pub fn refer(self, id: Uuid) -> RecipientRef {
        match self {
            RecipientKind::Fellow => RecipientRef::Fellow(id),
            RecipientKind::Faculty => RecipientRef::Faculty(id),
        }
    }
}

impl FromStr for RecipientKind {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "fellow" => Ok(RecipientKind::Fellow),
            "faculty" => Ok(RecipientKind::Faculty),
            other => Err(LedgerError::Validation(format!(
                "unknown recipient type '{other}'"
            ))),
        }
    }
}

/// Identity of an assignment or log recipient. Exactly one variant, so a row can
/// never carry both a fellow and a faculty id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipientRef {
    Fellow(Uuid),
    Faculty(Uuid),
}

impl RecipientRef {
    pub fn from_parts(recipient_type: &str, id: Uuid) -> Result<Self, LedgerError> {
        Ok(recipient_type.parse::<RecipientKind>()?.refer(id))
    }

    pub fn kind(&self) -> RecipientKind {
        match self {
            RecipientRef::Fellow(_) => RecipientKind::Fellow,
            RecipientRef::Faculty(_) => RecipientKind::Faculty,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            RecipientRef::Fellow(id) | RecipientRef::Faculty(id) => *id,
        }
    }
}

impl fmt::Display for RecipientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.id())
    }
}

/// A fellow or faculty member from the directory.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub id: Uuid,
    pub kind: RecipientKind,
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Recipient {
    pub fn reference(&self) -> RecipientRef {
        self.kind.refer(self.id)
    }
}

#[derive(Debug, Clone)]
pub struct NewRecipient {
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
}

impl NewRecipient {
    /// Rejects entries whose phone number has no digits to dial.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::Validation("name must not be empty".to_string()));
        }
        if !self.phone_number.chars().any(|c| c.is_ascii_digit()) {
            return Err(LedgerError::Validation(format!(
                "phone number '{}' contains no digits",
                self.phone_number
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyType {
    SelfEvaluation,
    Peer,
    Faculty,
    Rotation,
}

impl SurveyType {
    pub fn as_str(self) -> &'static str {
        match self {
            SurveyType::SelfEvaluation => "self",
            SurveyType::Peer => "peer",
            SurveyType::Faculty => "faculty",
            SurveyType::Rotation => "rotation",
        }
    }
}

impl FromStr for SurveyType {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "self" => Ok(SurveyType::SelfEvaluation),
            "peer" => Ok(SurveyType::Peer),
            "faculty" => Ok(SurveyType::Faculty),
            "rotation" => Ok(SurveyType::Rotation),
            other => Err(LedgerError::Validation(format!(
                "unknown survey type '{other}' (expected self, peer, faculty or rotation)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Survey {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub link: String,
    pub survey_type: SurveyType,
    pub sms_template: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSurvey {
    pub name: String,
    pub description: Option<String>,
    pub link: String,
    pub survey_type: SurveyType,
    pub sms_template: Option<String>,
}

impl NewSurvey {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.link.trim().is_empty() {
            return Err(LedgerError::Validation("survey link must not be empty".to_string()));
        }
        Ok(())
    }
}

/// A named week of the rotation calendar. Dates are inclusive.
#[derive(Debug, Clone)]
pub struct RotationBlock {
    pub id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RotationBlock {
    pub fn is_active(&self, as_of: NaiveDate) -> bool {
        self.start_date <= as_of && as_of <= self.end_date
    }

    pub fn is_upcoming(&self, as_of: NaiveDate) -> bool {
        self.start_date > as_of
    }

    /// First Friday inside the block, if any.
    pub fn friday_in_block(&self) -> Option<NaiveDate> {
        self.fridays_in_block().into_iter().next()
    }

    pub fn fridays_in_block(&self) -> Vec<NaiveDate> {
        let mut fridays = Vec::new();
        let mut day = self.start_date;
        while day <= self.end_date {
            if day.weekday() == Weekday::Fri {
                fridays.push(day);
                day += Duration::days(7);
            } else {
                day += Duration::days(1);
            }
        }
        fridays
    }

    pub fn span_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

#[derive(Debug, Clone)]
pub struct NewRotationBlock {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub notes: Option<String>,
}

/// Binds one recipient to one survey within one rotation block.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: Uuid,
    pub rotation_block_id: Uuid,
    pub survey_id: Uuid,
    pub recipient: RecipientRef,
    pub send_on_fridays: bool,
    pub send_date: Option<NaiveDate>,
    pub last_sent: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    pub fn recipient_type(&self) -> RecipientKind {
        self.recipient.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignment {
    pub rotation_block_id: Uuid,
    pub survey_id: Uuid,
    pub recipient: RecipientRef,
    pub send_on_fridays: bool,
    pub send_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl NewAssignment {
    pub fn recurring(rotation_block_id: Uuid, survey_id: Uuid, recipient: RecipientRef) -> Self {
        Self {
            rotation_block_id,
            survey_id,
            recipient,
            send_on_fridays: true,
            send_date: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    Sent,
    Failed,
    Completed,
}

impl EvaluationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationStatus::Sent => "sent",
            EvaluationStatus::Failed => "failed",
            EvaluationStatus::Completed => "completed",
        }
    }
}

impl FromStr for EvaluationStatus {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sent" => Ok(EvaluationStatus::Sent),
            "failed" => Ok(EvaluationStatus::Failed),
            "completed" => Ok(EvaluationStatus::Completed),
            other => Err(LedgerError::Validation(format!("unknown status '{other}'"))),
        }
    }
}

/// One dispatch attempt, as appended to the evaluation log.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub id: Uuid,
    pub recipient: RecipientRef,
    pub survey_id: Option<Uuid>,
    pub assignment_id: Option<Uuid>,
    pub sent_at: DateTime<Utc>,
    pub status: EvaluationStatus,
    pub external_message_id: Option<String>,
    pub notes: Option<String>,
}

/// Evaluation log row joined with display names for tracking views.
#[derive(Debug, Clone, Serialize)]
pub struct TrackingRow {
    pub id: Uuid,
    pub sent_at: DateTime<Utc>,
    pub recipient_type: RecipientKind,
    pub recipient_name: String,
    pub survey_name: Option<String>,
    pub status: EvaluationStatus,
    pub external_message_id: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardStats {
    pub active_fellows: i64,
    pub active_faculty: i64,
    pub active_surveys: i64,
    pub sent: i64,
    pub failed: i64,
    pub completed: i64,
}
