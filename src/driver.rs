//! The "send today's notifications" pass and ad-hoc sends.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::dispatch::{render_body, DispatchLog, DispatchOutcome, Dispatcher, SendRequest};
use crate::error::{LedgerError, Result};
use crate::models::{Assignment, Recipient, RecipientRef, RotationBlock, Survey};
use crate::schedule;
use crate::sms::MessageTransport;

pub const UNKNOWN_RECIPIENT: &str = "Unknown";

/// Read access to the stores the send pass walks.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn active_blocks(&self, as_of: NaiveDate) -> Result<Vec<RotationBlock>>;

    async fn block_assignments(&self, block_id: Uuid) -> Result<Vec<Assignment>>;

    /// Looks up the fellow or faculty row behind `recipient`.
    async fn find_recipient(&self, recipient: RecipientRef) -> Result<Option<Recipient>>;

    async fn find_survey(&self, survey_id: Uuid) -> Result<Option<Survey>>;
}

pub async fn resolve_recipient<L>(ledger: &L, assignment: &Assignment) -> Result<Option<Recipient>>
where
    L: Ledger + ?Sized,
{
    ledger.find_recipient(assignment.recipient).await
}

/// Recipient name, or `"Unknown"` when it cannot be resolved for any reason.
pub async fn recipient_display_name<L>(ledger: &L, assignment: &Assignment) -> String
where
    L: Ledger + ?Sized,
{
    match resolve_recipient(ledger, assignment).await {
        Ok(Some(recipient)) => recipient.name,
        Ok(None) => UNKNOWN_RECIPIENT.to_string(),
        Err(e) => {
            tracing::warn!(assignment_id = %assignment.id, error = %e, "Recipient lookup failed");
            UNKNOWN_RECIPIENT.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    RecipientUnresolved,
    RecipientInactive,
    SurveyUnresolved,
    SurveyInactive,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::RecipientUnresolved => "recipient not found",
            SkipReason::RecipientInactive => "recipient inactive",
            SkipReason::SurveyUnresolved => "survey not found",
            SkipReason::SurveyInactive => "survey inactive",
        }
    }
}

/// Pairs a resolved recipient and survey, or says why they cannot be sent.
pub fn sendable(
    recipient: Option<Recipient>,
    survey: Option<Survey>,
) -> std::result::Result<(Recipient, Survey), SkipReason> {
    match (recipient, survey) {
        (None, _) => Err(SkipReason::RecipientUnresolved),
        (_, None) => Err(SkipReason::SurveyUnresolved),
        (Some(r), _) if !r.active => Err(SkipReason::RecipientInactive),
        (_, Some(s)) if !s.active => Err(SkipReason::SurveyInactive),
        (Some(r), Some(s)) => Ok((r, s)),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendSummary {
    pub sent: usize,
    pub failed: usize,
    pub already_sent: usize,
    pub skipped: usize,
    /// Sends whose outcome could not be written to the evaluation log.
    pub unrecorded: usize,
}

impl SendSummary {
    pub fn message(&self) -> String {
        let mut message = format!("Sent {} evaluations", self.sent);
        if self.failed > 0 {
            message.push_str(&format!(", {} failed", self.failed));
        }
        if self.already_sent > 0 {
            message.push_str(&format!(", {} already sent today", self.already_sent));
        }
        if self.skipped > 0 {
            message.push_str(&format!(", {} skipped", self.skipped));
        }
        if self.unrecorded > 0 {
            message.push_str(&format!(", {} not recorded", self.unrecorded));
        }
        message
    }

    fn count(&mut self, outcome: &DispatchOutcome) {
        if outcome.success {
            self.sent += 1;
        } else {
            self.failed += 1;
        }
        if !outcome.recorded {
            self.unrecorded += 1;
        }
    }
}

/// Dispatches every eligible assignment in the blocks active on `today`.
///
/// Sends are sequential and independent: a failed send is counted and the
/// pass moves on, as does a send whose log write failed. Only a failed read
/// of blocks, assignments, recipients or surveys ends the pass early.
pub async fn run_due_sends<L, D, T>(
    ledger: &L,
    log: &D,
    dispatcher: &Dispatcher<T>,
    today: NaiveDate,
) -> Result<SendSummary>
where
    L: Ledger + ?Sized,
    D: DispatchLog + ?Sized,
    T: MessageTransport,
{
    let mut summary = SendSummary::default();

    for block in ledger.active_blocks(today).await? {
        for assignment in ledger.block_assignments(block.id).await? {
            if !schedule::trigger_matches(&assignment, today) {
                continue;
            }
            if schedule::already_sent(&assignment, today) {
                summary.already_sent += 1;
                continue;
            }
            if !schedule::is_eligible(&assignment, &block, today) {
                continue;
            }

            let recipient = resolve_recipient(ledger, &assignment).await?;
            let survey = ledger.find_survey(assignment.survey_id).await?;
            let (recipient, survey) = match sendable(recipient, survey) {
                Ok(pair) => pair,
                Err(reason) => {
                    tracing::info!(
                        assignment_id = %assignment.id,
                        block = %block.name,
                        reason = reason.as_str(),
                        "Skipping assignment"
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            let request = SendRequest {
                recipient: &recipient,
                survey: &survey,
                assignment: Some(&assignment),
                custom_message: None,
            };
            summary.count(&dispatcher.send(log, &request, today).await);
        }
    }

    tracing::info!(
        sent = summary.sent,
        failed = summary.failed,
        already_sent = summary.already_sent,
        skipped = summary.skipped,
        unrecorded = summary.unrecorded,
        "Send pass complete"
    );
    Ok(summary)
}

/// Sends one survey to hand-picked recipients, outside any assignment.
pub async fn send_ad_hoc<L, D, T>(
    ledger: &L,
    log: &D,
    dispatcher: &Dispatcher<T>,
    recipients: &[RecipientRef],
    survey_id: Uuid,
    custom_message: Option<&str>,
    today: NaiveDate,
) -> Result<SendSummary>
where
    L: Ledger + ?Sized,
    D: DispatchLog + ?Sized,
    T: MessageTransport,
{
    let survey = ledger
        .find_survey(survey_id)
        .await?
        .ok_or(LedgerError::NotFound {
            entity: "survey",
            id: survey_id,
        })?;
    let mut summary = SendSummary::default();

    for reference in recipients {
        let recipient = match ledger.find_recipient(*reference).await? {
            Some(r) if r.active => r,
            other => {
                let reason = if other.is_some() {
                    SkipReason::RecipientInactive
                } else {
                    SkipReason::RecipientUnresolved
                };
                tracing::info!(recipient = %reference, reason = reason.as_str(), "Skipping recipient");
                summary.skipped += 1;
                continue;
            }
        };

        let request = SendRequest {
            recipient: &recipient,
            survey: &survey,
            assignment: None,
            custom_message,
        };
        summary.count(&dispatcher.send(log, &request, today).await);
    }

    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct PreviewItem {
    pub block_name: String,
    pub assignment_id: Uuid,
    pub recipient_name: String,
    pub survey_name: String,
    pub body: Option<String>,
}

/// What a send pass on `today` would dispatch, without sending.
pub async fn preview_due<L>(ledger: &L, today: NaiveDate) -> Result<Vec<PreviewItem>>
where
    L: Ledger + ?Sized,
{
    let mut items = Vec::new();

    for block in ledger.active_blocks(today).await? {
        let assignments = ledger.block_assignments(block.id).await?;
        let blocks = [block];
        for assignment in schedule::eligible_assignments(&blocks, &assignments, today) {
            let recipient = resolve_recipient(ledger, assignment).await?;
            let survey = ledger.find_survey(assignment.survey_id).await?;
            let body = match (&recipient, &survey) {
                (Some(r), Some(s)) => Some(render_body(
                    &SendRequest {
                        recipient: r,
                        survey: s,
                        assignment: Some(assignment),
                        custom_message: None,
                    },
                    today,
                )),
                _ => None,
            };
            items.push(PreviewItem {
                block_name: blocks[0].name.clone(),
                assignment_id: assignment.id,
                recipient_name: recipient
                    .map(|r| r.name)
                    .unwrap_or_else(|| UNKNOWN_RECIPIENT.to_string()),
                survey_name: survey.map(|s| s.name).unwrap_or_default(),
                body,
            });
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::*;
    use crate::models::{EvaluationStatus, RecipientKind};
    use chrono::Utc;
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryLedger {
        blocks: Vec<RotationBlock>,
        assignments: Vec<Assignment>,
        recipients: Vec<Recipient>,
        surveys: Vec<Survey>,
    }

    #[async_trait]
    impl Ledger for MemoryLedger {
        async fn active_blocks(&self, as_of: NaiveDate) -> Result<Vec<RotationBlock>> {
            Ok(self.blocks.iter().filter(|b| b.is_active(as_of)).cloned().collect())
        }

        async fn block_assignments(&self, block_id: Uuid) -> Result<Vec<Assignment>> {
            Ok(self
                .assignments
                .iter()
                .filter(|a| a.rotation_block_id == block_id)
                .cloned()
                .collect())
        }

        async fn find_recipient(&self, recipient: RecipientRef) -> Result<Option<Recipient>> {
            Ok(self
                .recipients
                .iter()
                .find(|r| r.reference() == recipient)
                .cloned())
        }

        async fn find_survey(&self, survey_id: Uuid) -> Result<Option<Survey>> {
            Ok(self.surveys.iter().find(|s| s.id == survey_id).cloned())
        }
    }

    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
    }

    fn active_block() -> RotationBlock {
        RotationBlock {
            id: Uuid::new_v4(),
            name: "ICU Week 1".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 12).unwrap(),
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn ledger_with_fellow() -> (MemoryLedger, Assignment) {
        let block = active_block();
        let fellow = recipient(RecipientKind::Fellow, "Sam");
        let survey = survey("Peer Review", None);
        let assignment = assignment_for(&fellow, &survey, block.id);
        let ledger = MemoryLedger {
            blocks: vec![block],
            assignments: vec![assignment.clone()],
            recipients: vec![fellow],
            surveys: vec![survey],
        };
        (ledger, assignment)
    }

    #[tokio::test]
    async fn pass_sends_eligible_assignments() {
        let (ledger, assignment) = ledger_with_fellow();
        let log = MemoryLog::default();
        let dispatcher = Dispatcher::new(FakeTransport::ok(), Duration::from_secs(1));

        let summary = run_due_sends(&ledger, &log, &dispatcher, friday()).await.unwrap();

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 0);
        let records = log.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mark_sent, Some((assignment.id, friday())));
    }

    #[tokio::test]
    async fn already_sent_today_is_counted_not_sent() {
        let (mut ledger, _) = ledger_with_fellow();
        ledger.assignments[0].last_sent = Some(friday());
        let log = MemoryLog::default();
        let dispatcher = Dispatcher::new(FakeTransport::ok(), Duration::from_secs(1));

        let summary = run_due_sends(&ledger, &log, &dispatcher, friday()).await.unwrap();

        assert_eq!(summary.already_sent, 1);
        assert_eq!(summary.sent, 0);
        assert_eq!(dispatcher.transport().call_count(), 0);
        assert!(log.snapshot().is_empty());
    }

    #[tokio::test]
    async fn deleted_faculty_is_skipped_not_failed() {
        let (mut ledger, _) = ledger_with_fellow();
        let block_id = ledger.blocks[0].id;
        let gone = recipient(RecipientKind::Faculty, "Dr. Gone");
        let orphan = assignment_for(&gone, &ledger.surveys[0], block_id);
        ledger.assignments.push(orphan.clone());

        assert!(resolve_recipient(&ledger, &orphan).await.unwrap().is_none());
        assert_eq!(recipient_display_name(&ledger, &orphan).await, "Unknown");

        let log = MemoryLog::default();
        let dispatcher = Dispatcher::new(FakeTransport::ok(), Duration::from_secs(1));
        let summary = run_due_sends(&ledger, &log, &dispatcher, friday()).await.unwrap();

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(log.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn inactive_survey_is_skipped() {
        let (mut ledger, _) = ledger_with_fellow();
        ledger.surveys[0].active = false;
        let log = MemoryLog::default();
        let dispatcher = Dispatcher::new(FakeTransport::ok(), Duration::from_secs(1));

        let summary = run_due_sends(&ledger, &log, &dispatcher, friday()).await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(dispatcher.transport().call_count(), 0);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_pass() {
        let (mut ledger, _) = ledger_with_fellow();
        let block_id = ledger.blocks[0].id;
        let second = recipient(RecipientKind::Faculty, "Dr. Lee");
        ledger
            .assignments
            .push(assignment_for(&second, &ledger.surveys[0], block_id));
        ledger.recipients.push(second);
        let log = MemoryLog::default();
        let dispatcher = Dispatcher::new(FakeTransport::failing(503), Duration::from_secs(1));

        let summary = run_due_sends(&ledger, &log, &dispatcher, friday()).await.unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.sent, 0);
        let records = log.snapshot();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.entry.status == EvaluationStatus::Failed && r.mark_sent.is_none()));
    }

    #[tokio::test]
    async fn unwritable_log_does_not_stop_the_pass() {
        let (mut ledger, _) = ledger_with_fellow();
        let block_id = ledger.blocks[0].id;
        let second = recipient(RecipientKind::Faculty, "Dr. Lee");
        ledger
            .assignments
            .push(assignment_for(&second, &ledger.surveys[0], block_id));
        ledger.recipients.push(second);
        let dispatcher = Dispatcher::new(FakeTransport::ok(), Duration::from_secs(1));

        let summary = run_due_sends(&ledger, &UnavailableLog, &dispatcher, friday())
            .await
            .unwrap();

        assert_eq!(summary.sent, 2);
        assert_eq!(summary.unrecorded, 2);
        assert_eq!(dispatcher.transport().call_count(), 2);
        assert_eq!(summary.message(), "Sent 2 evaluations, 2 not recorded");
    }

    #[tokio::test]
    async fn ad_hoc_send_skips_unknown_recipients() {
        let (ledger, _) = ledger_with_fellow();
        let known = ledger.recipients[0].reference();
        let unknown = RecipientRef::Fellow(Uuid::new_v4());
        let log = MemoryLog::default();
        let dispatcher = Dispatcher::new(FakeTransport::ok(), Duration::from_secs(1));

        let summary = send_ad_hoc(
            &ledger,
            &log,
            &dispatcher,
            &[known, unknown],
            ledger.surveys[0].id,
            Some("Hi {name}: {link}"),
            friday(),
        )
        .await
        .unwrap();

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.skipped, 1);
        let records = log.snapshot();
        assert!(records[0].entry.assignment_id.is_none());
    }

    #[tokio::test]
    async fn ad_hoc_send_requires_known_survey() {
        let (ledger, _) = ledger_with_fellow();
        let log = MemoryLog::default();
        let dispatcher = Dispatcher::new(FakeTransport::ok(), Duration::from_secs(1));

        let result = send_ad_hoc(&ledger, &log, &dispatcher, &[], Uuid::new_v4(), None, friday()).await;
        assert!(matches!(result, Err(LedgerError::NotFound { entity: "survey", .. })));
    }

    #[tokio::test]
    async fn preview_lists_eligible_with_rendered_body() {
        let (ledger, assignment) = ledger_with_fellow();
        let items = preview_due(&ledger, friday()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].assignment_id, assignment.id);
        assert_eq!(items[0].recipient_name, "Sam");
        assert_eq!(
            items[0].body.as_deref(),
            Some("Hi Sam, please complete your Peer Review: http://x")
        );
    }

    #[test]
    fn sendable_reports_first_missing_piece() {
        let fellow = recipient(RecipientKind::Fellow, "Sam");
        let survey = survey("Peer Review", None);
        assert_eq!(
            sendable(None, Some(survey.clone())).unwrap_err(),
            SkipReason::RecipientUnresolved
        );
        assert_eq!(
            sendable(Some(fellow.clone()), None).unwrap_err(),
            SkipReason::SurveyUnresolved
        );
        let mut inactive = fellow.clone();
        inactive.active = false;
        assert_eq!(
            sendable(Some(inactive), Some(survey.clone())).unwrap_err(),
            SkipReason::RecipientInactive
        );
        assert!(sendable(Some(fellow), Some(survey)).is_ok());
    }

    #[test]
    fn summary_message_lists_nonzero_counts() {
        let summary = SendSummary {
            sent: 4,
            failed: 1,
            already_sent: 2,
            skipped: 0,
            unrecorded: 0,
        };
        assert_eq!(
            summary.message(),
            "Sent 4 evaluations, 1 failed, 2 already sent today"
        );
    }
}
