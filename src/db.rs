use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgExecutor, PgPool, Row};
use uuid::Uuid;

use crate::dispatch::{DispatchLog, DispatchRecord};
use crate::driver::{Ledger, UNKNOWN_RECIPIENT};
use crate::error::{LedgerError, Result};
use crate::models::{
    Assignment, DashboardStats, NewAssignment, NewRecipient, NewRotationBlock, NewSurvey,
    Recipient, RecipientKind, RecipientRef, RotationBlock, Survey, SurveyType, TrackingRow,
};
use crate::schedule;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// Recipients

fn recipient_from_row(kind: RecipientKind, row: &PgRow) -> Recipient {
    Recipient {
        id: row.get("id"),
        kind,
        name: row.get("full_name"),
        phone_number: row.get("phone_number"),
        email: row.get("email"),
        active: row.get("active"),
        created_at: row.get("created_at"),
    }
}

pub async fn add_recipient(
    pool: &PgPool,
    kind: RecipientKind,
    entry: &NewRecipient,
) -> Result<Recipient> {
    entry.validate()?;
    let query = format!(
        "INSERT INTO {} (id, full_name, phone_number, email) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, full_name, phone_number, email, active, created_at",
        kind.table()
    );
    let row = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(entry.name.trim())
        .bind(entry.phone_number.trim())
        .bind(&entry.email)
        .fetch_one(pool)
        .await?;
    Ok(recipient_from_row(kind, &row))
}

pub async fn list_recipients(
    pool: &PgPool,
    kind: RecipientKind,
    include_inactive: bool,
) -> Result<Vec<Recipient>> {
    let query = format!(
        "SELECT id, full_name, phone_number, email, active, created_at FROM {} \
         WHERE active OR $1 ORDER BY full_name",
        kind.table()
    );
    let rows = sqlx::query(&query)
        .bind(include_inactive)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|row| recipient_from_row(kind, row)).collect())
}

pub async fn find_recipient<'e, E>(executor: E, reference: RecipientRef) -> Result<Option<Recipient>>
where
    E: PgExecutor<'e>,
{
    let kind = reference.kind();
    let query = format!(
        "SELECT id, full_name, phone_number, email, active, created_at FROM {} WHERE id = $1",
        kind.table()
    );
    let row = sqlx::query(&query)
        .bind(reference.id())
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|row| recipient_from_row(kind, &row)))
}

#[derive(Debug, Clone, Default)]
pub struct RecipientChanges {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub active: Option<bool>,
}

pub async fn update_recipient(
    pool: &PgPool,
    reference: RecipientRef,
    changes: RecipientChanges,
) -> Result<Recipient> {
    let mut tx = pool.begin().await?;
    let current = find_recipient(&mut *tx, reference)
        .await?
        .ok_or(LedgerError::NotFound {
            entity: reference.kind().as_str(),
            id: reference.id(),
        })?;

    let entry = NewRecipient {
        name: changes.name.unwrap_or(current.name),
        phone_number: changes.phone_number.unwrap_or(current.phone_number),
        email: changes.email.or(current.email),
    };
    entry.validate()?;
    let active = changes.active.unwrap_or(current.active);

    let query = format!(
        "UPDATE {} SET full_name = $2, phone_number = $3, email = $4, active = $5 \
         WHERE id = $1 \
         RETURNING id, full_name, phone_number, email, active, created_at",
        reference.kind().table()
    );
    let row = sqlx::query(&query)
        .bind(reference.id())
        .bind(entry.name.trim())
        .bind(entry.phone_number.trim())
        .bind(&entry.email)
        .bind(active)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(recipient_from_row(reference.kind(), &row))
}

/// Soft delete. Recipients stay resolvable for the evaluation log.
pub async fn deactivate_recipient(pool: &PgPool, reference: RecipientRef) -> Result<Recipient> {
    update_recipient(
        pool,
        reference,
        RecipientChanges {
            active: Some(false),
            ..RecipientChanges::default()
        },
    )
    .await
}

// Surveys

fn survey_from_row(row: &PgRow) -> Result<Survey> {
    let survey_type: String = row.try_get("survey_type")?;
    Ok(Survey {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        link: row.try_get("survey_link")?,
        survey_type: survey_type.parse()?,
        sms_template: row.try_get("sms_template")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

const SURVEY_COLUMNS: &str =
    "id, name, description, survey_link, survey_type, sms_template, active, created_at";

pub async fn add_survey(pool: &PgPool, survey: &NewSurvey) -> Result<Survey> {
    survey.validate()?;
    let query = format!(
        "INSERT INTO fellowship_notify.surveys \
         (id, name, description, survey_link, survey_type, sms_template) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {SURVEY_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(survey.name.trim())
        .bind(&survey.description)
        .bind(survey.link.trim())
        .bind(survey.survey_type.as_str())
        .bind(&survey.sms_template)
        .fetch_one(pool)
        .await?;
    survey_from_row(&row)
}

pub async fn list_surveys(pool: &PgPool, include_inactive: bool) -> Result<Vec<Survey>> {
    let query = format!(
        "SELECT {SURVEY_COLUMNS} FROM fellowship_notify.surveys \
         WHERE active OR $1 ORDER BY name"
    );
    let rows = sqlx::query(&query)
        .bind(include_inactive)
        .fetch_all(pool)
        .await?;
    rows.iter().map(survey_from_row).collect()
}

pub async fn find_survey<'e, E>(executor: E, survey_id: Uuid) -> Result<Option<Survey>>
where
    E: PgExecutor<'e>,
{
    let query = format!("SELECT {SURVEY_COLUMNS} FROM fellowship_notify.surveys WHERE id = $1");
    let row = sqlx::query(&query)
        .bind(survey_id)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(survey_from_row).transpose()
}

#[derive(Debug, Clone, Default)]
pub struct SurveyChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub survey_type: Option<SurveyType>,
    pub sms_template: Option<String>,
    /// Drops the custom template so the default body is used.
    pub clear_template: bool,
    pub active: Option<bool>,
}

pub async fn update_survey(pool: &PgPool, survey_id: Uuid, changes: SurveyChanges) -> Result<Survey> {
    let mut tx = pool.begin().await?;
    let current = find_survey(&mut *tx, survey_id)
        .await?
        .ok_or(LedgerError::NotFound {
            entity: "survey",
            id: survey_id,
        })?;

    let sms_template = if changes.clear_template {
        None
    } else {
        changes.sms_template.or(current.sms_template)
    };
    let merged = NewSurvey {
        name: changes.name.unwrap_or(current.name),
        description: changes.description.or(current.description),
        link: changes.link.unwrap_or(current.link),
        survey_type: changes.survey_type.unwrap_or(current.survey_type),
        sms_template,
    };
    merged.validate()?;

    let query = format!(
        "UPDATE fellowship_notify.surveys \
         SET name = $2, description = $3, survey_link = $4, survey_type = $5, \
             sms_template = $6, active = $7 \
         WHERE id = $1 RETURNING {SURVEY_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(survey_id)
        .bind(merged.name.trim())
        .bind(&merged.description)
        .bind(merged.link.trim())
        .bind(merged.survey_type.as_str())
        .bind(&merged.sms_template)
        .bind(changes.active.unwrap_or(current.active))
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    survey_from_row(&row)
}

// Rotation blocks

fn block_from_row(row: &PgRow) -> RotationBlock {
    RotationBlock {
        id: row.get("id"),
        name: row.get("name"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    }
}

async fn insert_block<'e, E>(executor: E, block: &NewRotationBlock) -> Result<RotationBlock>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO fellowship_notify.rotation_blocks (id, name, start_date, end_date, notes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, start_date, end_date, notes, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(block.name.trim())
    .bind(block.start_date)
    .bind(block.end_date)
    .bind(&block.notes)
    .fetch_one(executor)
    .await?;
    Ok(block_from_row(&row))
}

/// Inserts one block. Returns the span warning, if any, alongside it.
pub async fn add_block(
    pool: &PgPool,
    block: &NewRotationBlock,
) -> Result<(RotationBlock, Option<String>)> {
    let warning = schedule::check_block_span(block.start_date, block.end_date)?;
    let created = insert_block(pool, block).await?;
    Ok((created, warning))
}

/// Inserts a run of blocks in a single transaction.
pub async fn add_blocks(pool: &PgPool, blocks: &[NewRotationBlock]) -> Result<Vec<RotationBlock>> {
    let mut tx = pool.begin().await?;
    let mut created = Vec::with_capacity(blocks.len());
    for block in blocks {
        schedule::check_block_span(block.start_date, block.end_date)?;
        created.push(insert_block(&mut *tx, block).await?);
    }
    tx.commit().await?;
    Ok(created)
}

#[derive(Debug, Clone, Default)]
pub struct BlockChanges {
    pub name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

pub async fn update_block(
    pool: &PgPool,
    block_id: Uuid,
    changes: BlockChanges,
) -> Result<(RotationBlock, Option<String>)> {
    let mut tx = pool.begin().await?;
    let current = find_block(&mut *tx, block_id)
        .await?
        .ok_or(LedgerError::NotFound {
            entity: "rotation block",
            id: block_id,
        })?;

    let start_date = changes.start_date.unwrap_or(current.start_date);
    let end_date = changes.end_date.unwrap_or(current.end_date);
    let warning = schedule::check_block_span(start_date, end_date)?;

    let row = sqlx::query(
        r#"
        UPDATE fellowship_notify.rotation_blocks
        SET name = $2, start_date = $3, end_date = $4, notes = $5
        WHERE id = $1
        RETURNING id, name, start_date, end_date, notes, created_at
        "#,
    )
    .bind(block_id)
    .bind(changes.name.unwrap_or(current.name))
    .bind(start_date)
    .bind(end_date)
    .bind(changes.notes.or(current.notes))
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok((block_from_row(&row), warning))
}

pub async fn find_block<'e, E>(executor: E, block_id: Uuid) -> Result<Option<RotationBlock>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id, name, start_date, end_date, notes, created_at \
         FROM fellowship_notify.rotation_blocks WHERE id = $1",
    )
    .bind(block_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.as_ref().map(block_from_row))
}

/// Blocks ending on or after `from`, or every block when `from` is `None`.
pub async fn list_blocks(pool: &PgPool, from: Option<NaiveDate>) -> Result<Vec<RotationBlock>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, start_date, end_date, notes, created_at
        FROM fellowship_notify.rotation_blocks
        WHERE $1::date IS NULL OR end_date >= $1
        ORDER BY start_date
        "#,
    )
    .bind(from)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(block_from_row).collect())
}

pub async fn active_blocks(pool: &PgPool, as_of: NaiveDate) -> Result<Vec<RotationBlock>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, start_date, end_date, notes, created_at
        FROM fellowship_notify.rotation_blocks
        WHERE start_date <= $1 AND end_date >= $1
        ORDER BY start_date
        "#,
    )
    .bind(as_of)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(block_from_row).collect())
}

// Assignments

const ASSIGNMENT_COLUMNS: &str = "id, rotation_block_id, survey_id, recipient_type, recipient_id, \
     send_on_fridays, send_date, last_sent, notes, created_at";

fn assignment_from_row(row: &PgRow) -> Result<Assignment> {
    let recipient_type: String = row.try_get("recipient_type")?;
    Ok(Assignment {
        id: row.try_get("id")?,
        rotation_block_id: row.try_get("rotation_block_id")?,
        survey_id: row.try_get("survey_id")?,
        recipient: RecipientRef::from_parts(&recipient_type, row.try_get("recipient_id")?)?,
        send_on_fridays: row.try_get("send_on_fridays")?,
        send_date: row.try_get("send_date")?,
        last_sent: row.try_get("last_sent")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Inserts unless the (recipient, survey, block) triple exists. `None` means it did.
async fn insert_assignment<'e, E>(executor: E, assignment: &NewAssignment) -> Result<Option<Assignment>>
where
    E: PgExecutor<'e>,
{
    let query = format!(
        "INSERT INTO fellowship_notify.assignments \
         (id, rotation_block_id, survey_id, recipient_type, recipient_id, \
          send_on_fridays, send_date, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (recipient_type, recipient_id, survey_id, rotation_block_id) DO NOTHING \
         RETURNING {ASSIGNMENT_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(assignment.rotation_block_id)
        .bind(assignment.survey_id)
        .bind(assignment.recipient.kind().as_str())
        .bind(assignment.recipient.id())
        .bind(assignment.send_on_fridays)
        .bind(assignment.send_date)
        .bind(&assignment.notes)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(assignment_from_row).transpose()
}

/// Fails with `NotFound` for the first block, recipient or survey that does not exist.
async fn require_references(
    conn: &mut PgConnection,
    block_id: Uuid,
    recipients: &[RecipientRef],
    survey_ids: &[Uuid],
) -> Result<()> {
    if find_block(&mut *conn, block_id).await?.is_none() {
        return Err(LedgerError::NotFound {
            entity: "rotation block",
            id: block_id,
        });
    }
    for recipient in recipients {
        if find_recipient(&mut *conn, *recipient).await?.is_none() {
            return Err(LedgerError::NotFound {
                entity: recipient.kind().as_str(),
                id: recipient.id(),
            });
        }
    }
    for survey_id in survey_ids {
        if find_survey(&mut *conn, *survey_id).await?.is_none() {
            return Err(LedgerError::NotFound {
                entity: "survey",
                id: *survey_id,
            });
        }
    }
    Ok(())
}

/// A single add that hit the unique triple is an error, unlike bulk mode.
fn created_or_duplicate(assignment: &NewAssignment, inserted: Option<Assignment>) -> Result<Assignment> {
    inserted.ok_or(LedgerError::DuplicateAssignment {
        recipient: assignment.recipient,
        survey_id: assignment.survey_id,
        block_id: assignment.rotation_block_id,
    })
}

pub async fn add_assignment(pool: &PgPool, assignment: &NewAssignment) -> Result<Assignment> {
    let mut tx = pool.begin().await?;
    require_references(
        &mut *tx,
        assignment.rotation_block_id,
        &[assignment.recipient],
        &[assignment.survey_id],
    )
    .await?;

    let inserted = insert_assignment(&mut *tx, assignment).await?;
    let created = created_or_duplicate(assignment, inserted)?;
    tx.commit().await?;

    Ok(created)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub added: usize,
    pub skipped: usize,
}

/// Assigns every recipient to every survey in the block, skipping pairs that
/// already exist. Never fails on duplicates. An unknown block, recipient or
/// survey rejects the whole batch before anything is inserted.
pub async fn bulk_add_assignments(
    pool: &PgPool,
    block_id: Uuid,
    recipients: &[RecipientRef],
    survey_ids: &[Uuid],
) -> Result<BulkOutcome> {
    let mut tx = pool.begin().await?;
    require_references(&mut *tx, block_id, recipients, survey_ids).await?;

    let existing = block_assignments(&mut *tx, block_id).await?;
    let plan = schedule::plan_bulk_assignments(block_id, &existing, recipients, survey_ids);
    let mut outcome = BulkOutcome {
        added: 0,
        skipped: plan.skipped,
    };

    for assignment in &plan.to_add {
        match insert_assignment(&mut *tx, assignment).await? {
            Some(_) => outcome.added += 1,
            None => outcome.skipped += 1,
        }
    }
    tx.commit().await?;

    Ok(outcome)
}

pub async fn block_assignments<'e, E>(executor: E, block_id: Uuid) -> Result<Vec<Assignment>>
where
    E: PgExecutor<'e>,
{
    let query = format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM fellowship_notify.assignments \
         WHERE rotation_block_id = $1 ORDER BY created_at"
    );
    let rows = sqlx::query(&query)
        .bind(block_id)
        .fetch_all(executor)
        .await?;
    rows.iter().map(assignment_from_row).collect()
}

/// Removes the assignment. Its log entries stay, with `assignment_id` cleared.
pub async fn delete_assignment(pool: &PgPool, assignment_id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM fellowship_notify.assignments WHERE id = $1")
        .bind(assignment_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::NotFound {
            entity: "assignment",
            id: assignment_id,
        });
    }
    Ok(())
}

// Evaluation log

/// Appends the log entry and, after a successful send, stamps `last_sent`,
/// in one transaction.
pub async fn record_dispatch(pool: &PgPool, record: &DispatchRecord) -> Result<()> {
    let entry = &record.entry;
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO fellowship_notify.evaluation_log
        (id, recipient_type, recipient_id, survey_id, assignment_id, sent_at, status,
         external_message_id, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(entry.id)
    .bind(entry.recipient.kind().as_str())
    .bind(entry.recipient.id())
    .bind(entry.survey_id)
    .bind(entry.assignment_id)
    .bind(entry.sent_at)
    .bind(entry.status.as_str())
    .bind(&entry.external_message_id)
    .bind(&entry.notes)
    .execute(&mut *tx)
    .await?;

    if let Some((assignment_id, sent_on)) = record.mark_sent {
        sqlx::query("UPDATE fellowship_notify.assignments SET last_sent = $2 WHERE id = $1")
            .bind(assignment_id)
            .bind(sent_on)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Newest entries first.
pub async fn fetch_tracking(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<TrackingRow>> {
    let rows = sqlx::query(
        r#"
        SELECT l.id, l.sent_at, l.recipient_type, l.status, l.external_message_id,
               l.completed_at, l.notes,
               COALESCE(f.full_name, fa.full_name) AS recipient_name,
               s.name AS survey_name
        FROM fellowship_notify.evaluation_log l
        LEFT JOIN fellowship_notify.fellows f
            ON l.recipient_type = 'fellow' AND f.id = l.recipient_id
        LEFT JOIN fellowship_notify.faculty fa
            ON l.recipient_type = 'faculty' AND fa.id = l.recipient_id
        LEFT JOIN fellowship_notify.surveys s ON s.id = l.survey_id
        ORDER BY l.sent_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let mut tracking = Vec::with_capacity(rows.len());
    for row in rows {
        let recipient_type: String = row.try_get("recipient_type")?;
        let status: String = row.try_get("status")?;
        let recipient_name: Option<String> = row.try_get("recipient_name")?;
        tracking.push(TrackingRow {
            id: row.try_get("id")?,
            sent_at: row.try_get("sent_at")?,
            recipient_type: recipient_type.parse()?,
            recipient_name: recipient_name.unwrap_or_else(|| UNKNOWN_RECIPIENT.to_string()),
            survey_name: row.try_get("survey_name")?,
            status: status.parse()?,
            external_message_id: row.try_get("external_message_id")?,
            completed_at: row.try_get("completed_at")?,
            notes: row.try_get("notes")?,
        });
    }

    Ok(tracking)
}

/// The only mutation the log allows: a sent entry becomes completed.
pub async fn mark_completed(pool: &PgPool, log_id: Uuid) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE fellowship_notify.evaluation_log
        SET status = 'completed', completed_at = NOW()
        WHERE id = $1 AND status = 'sent'
        "#,
    )
    .bind(log_id)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM fellowship_notify.evaluation_log WHERE id = $1")
            .bind(log_id)
            .fetch_optional(pool)
            .await?;
    match status {
        Some(status) => Err(LedgerError::Validation(format!(
            "only sent evaluations can be completed (entry is {status})"
        ))),
        None => Err(LedgerError::NotFound {
            entity: "evaluation log entry",
            id: log_id,
        }),
    }
}

pub async fn dashboard_stats(pool: &PgPool) -> Result<DashboardStats> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM fellowship_notify.fellows WHERE active) AS active_fellows,
            (SELECT COUNT(*) FROM fellowship_notify.faculty WHERE active) AS active_faculty,
            (SELECT COUNT(*) FROM fellowship_notify.surveys WHERE active) AS active_surveys,
            (SELECT COUNT(*) FROM fellowship_notify.evaluation_log WHERE status = 'sent') AS sent,
            (SELECT COUNT(*) FROM fellowship_notify.evaluation_log WHERE status = 'failed') AS failed,
            (SELECT COUNT(*) FROM fellowship_notify.evaluation_log WHERE status = 'completed') AS completed
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(DashboardStats {
        active_fellows: row.try_get("active_fellows")?,
        active_faculty: row.try_get("active_faculty")?,
        active_surveys: row.try_get("active_surveys")?,
        sent: row.try_get("sent")?,
        failed: row.try_get("failed")?,
        completed: row.try_get("completed")?,
    })
}

/// Postgres-backed [`Ledger`] and [`DispatchLog`] for the send pass.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Ledger for PgStore {
    async fn active_blocks(&self, as_of: NaiveDate) -> Result<Vec<RotationBlock>> {
        active_blocks(&self.pool, as_of).await
    }

    async fn block_assignments(&self, block_id: Uuid) -> Result<Vec<Assignment>> {
        block_assignments(&self.pool, block_id).await
    }

    async fn find_recipient(&self, recipient: RecipientRef) -> Result<Option<Recipient>> {
        find_recipient(&self.pool, recipient).await
    }

    async fn find_survey(&self, survey_id: Uuid) -> Result<Option<Survey>> {
        find_survey(&self.pool, survey_id).await
    }
}

#[async_trait]
impl DispatchLog for PgStore {
    async fn record(&self, record: &DispatchRecord) -> Result<()> {
        record_dispatch(&self.pool, record).await
    }
}
