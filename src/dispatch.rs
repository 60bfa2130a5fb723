//! One send attempt per call: render, deliver, and record the outcome.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::models::{Assignment, EvaluationStatus, NewLogEntry, Recipient, Survey};
use crate::sms::MessageTransport;
use crate::template::{self, MessageContext};

/// Durable sink for dispatch outcomes.
///
/// Each record is written as its own unit of work: the log entry and, on
/// success, the assignment's `last_sent`.
#[async_trait]
pub trait DispatchLog: Send + Sync {
    async fn record(&self, record: &DispatchRecord) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct SendRequest<'a> {
    pub recipient: &'a Recipient,
    pub survey: &'a Survey,
    pub assignment: Option<&'a Assignment>,
    pub custom_message: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub entry: NewLogEntry,
    /// Assignment to stamp with `last_sent`, present only after a successful send.
    pub mark_sent: Option<(Uuid, NaiveDate)>,
}

impl DispatchRecord {
    pub fn succeeded(&self) -> bool {
        self.entry.status == EvaluationStatus::Sent
    }

    /// External message id on success, failure detail otherwise.
    pub fn detail(&self) -> &str {
        if self.succeeded() {
            self.entry.external_message_id.as_deref().unwrap_or_default()
        } else {
            self.entry.notes.as_deref().unwrap_or_default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub success: bool,
    pub detail: String,
    /// False when the log write failed after the transport call.
    pub recorded: bool,
}

/// Calls the transport, giving up after `timeout`.
pub async fn send_with_timeout(
    transport: &dyn MessageTransport,
    body: &str,
    to: &str,
    timeout: Duration,
) -> Result<String, TransportError> {
    match tokio::time::timeout(timeout, transport.send_message(body, to)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}

/// Custom message first, then the survey's template, then the default body.
pub fn render_body(request: &SendRequest<'_>, today: NaiveDate) -> String {
    let ctx = MessageContext {
        name: &request.recipient.name,
        survey: &request.survey.name,
        link: &request.survey.link,
        date: today,
    };
    match request.custom_message.filter(|m| !m.trim().is_empty()) {
        Some(message) => template::render_custom(message, &ctx),
        None => template::render_message(request.survey.sms_template.as_deref(), &ctx),
    }
}

pub struct Dispatcher<T> {
    transport: T,
    timeout: Duration,
}

impl<T: MessageTransport> Dispatcher<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Performs exactly one transport call and describes its outcome. Never fails.
    pub async fn attempt(&self, request: &SendRequest<'_>, today: NaiveDate) -> DispatchRecord {
        let body = render_body(request, today);
        let to = template::format_phone(&request.recipient.phone_number);
        let assignment_id = request.assignment.map(|a| a.id);

        let result = send_with_timeout(&self.transport, &body, &to, self.timeout).await;

        let mut entry = NewLogEntry {
            id: Uuid::new_v4(),
            recipient: request.recipient.reference(),
            survey_id: Some(request.survey.id),
            assignment_id,
            sent_at: Utc::now(),
            status: EvaluationStatus::Sent,
            external_message_id: None,
            notes: None,
        };

        match result {
            Ok(message_id) => {
                tracing::info!(
                    transport = self.transport.transport_name(),
                    recipient = %entry.recipient,
                    survey = %request.survey.name,
                    message_id = %message_id,
                    "Evaluation SMS sent"
                );
                entry.external_message_id = Some(message_id);
                DispatchRecord {
                    entry,
                    mark_sent: assignment_id.map(|id| (id, today)),
                }
            }
            Err(e) => {
                tracing::warn!(
                    transport = self.transport.transport_name(),
                    recipient = %entry.recipient,
                    survey = %request.survey.name,
                    error = %e,
                    "Evaluation SMS failed"
                );
                entry.status = EvaluationStatus::Failed;
                entry.notes = Some(e.to_string());
                DispatchRecord {
                    entry,
                    mark_sent: None,
                }
            }
        }
    }

    /// Sends and records. Transport failures come back as `success == false`.
    ///
    /// A log write that fails after the message went out is reported through
    /// `recorded` rather than as an error, so callers keep going.
    pub async fn send<L>(&self, log: &L, request: &SendRequest<'_>, today: NaiveDate) -> DispatchOutcome
    where
        L: DispatchLog + ?Sized,
    {
        let record = self.attempt(request, today).await;
        let recorded = match log.record(&record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    log_id = %record.entry.id,
                    recipient = %record.entry.recipient,
                    status = record.entry.status.as_str(),
                    error = %e,
                    "Failed to record dispatch outcome"
                );
                false
            }
        };
        DispatchOutcome {
            success: record.succeeded(),
            detail: record.detail().to_string(),
            recorded,
        }
    }
}
