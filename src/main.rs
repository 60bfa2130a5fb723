use std::path::PathBuf;

use anyhow::Context;
use chrono::{Datelike, Local, NaiveDate, Weekday};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod db;
mod dispatch;
mod driver;
mod error;
mod models;
mod report;
mod schedule;
mod sms;
mod template;

use config::Config;
use dispatch::Dispatcher;
use error::LedgerError;
use models::{NewAssignment, NewRecipient, NewRotationBlock, NewSurvey, RecipientKind, RecipientRef, SurveyType};
use sms::TwilioTransport;

const TRACKING_PAGE_SIZE: i64 = 50;

#[derive(Parser)]
#[command(name = "fellowship-notify")]
#[command(about = "Evaluation survey scheduling and SMS reminders for fellowship rotations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Manage fellows
    Fellow {
        #[command(subcommand)]
        action: RecipientAction,
    },
    /// Manage faculty
    Faculty {
        #[command(subcommand)]
        action: RecipientAction,
    },
    /// Manage evaluation surveys
    Survey {
        #[command(subcommand)]
        action: SurveyAction,
    },
    /// Manage weekly rotation blocks
    Block {
        #[command(subcommand)]
        action: BlockAction,
    },
    /// Manage survey assignments within rotation blocks
    Assignment {
        #[command(subcommand)]
        action: AssignmentAction,
    },
    /// Show what a send pass would dispatch
    Preview {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Send every eligible assignment for today (the Friday pass)
    SendDue {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Send a survey to selected recipients outside of any assignment
    Send {
        #[arg(long)]
        survey: Uuid,
        #[arg(long = "fellow", num_args = 1..)]
        fellows: Vec<Uuid>,
        #[arg(long = "faculty", num_args = 1..)]
        faculty: Vec<Uuid>,
        /// Custom body; only {name} and {link} are substituted
        #[arg(long)]
        message: Option<String>,
    },
    /// Send a test message without logging it
    TestSms {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        survey: Option<Uuid>,
    },
    /// List the evaluation log, newest first
    Tracking {
        #[arg(long, default_value_t = 1)]
        page: i64,
        /// Export the page as CSV instead of printing it
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Mark a sent evaluation as completed
    MarkCompleted { id: Uuid },
    /// Generate a markdown status report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum RecipientAction {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: Option<String>,
    },
    List {
        /// Include deactivated entries
        #[arg(long)]
        all: bool,
    },
    Edit {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
    Deactivate { id: Uuid },
}

#[derive(Args)]
struct SurveyFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    link: Option<String>,
    /// One of self, peer, faculty, rotation
    #[arg(long = "type")]
    survey_type: Option<SurveyType>,
    #[arg(long)]
    description: Option<String>,
    /// Placeholders: {name}, {survey}, {link}, {date}
    #[arg(long)]
    sms_template: Option<String>,
}

#[derive(Subcommand)]
enum SurveyAction {
    Add {
        #[command(flatten)]
        fields: SurveyFields,
    },
    List {
        #[arg(long)]
        all: bool,
    },
    Edit {
        id: Uuid,
        #[command(flatten)]
        fields: SurveyFields,
        #[arg(long, conflicts_with = "sms_template")]
        clear_template: bool,
        #[arg(long)]
        active: Option<bool>,
    },
    Deactivate { id: Uuid },
}

#[derive(Subcommand)]
enum BlockAction {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Create consecutive seven-day blocks
    BulkCreate {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        weeks: u32,
        /// Placeholders: {week}, {start}, {end}, {year}
        #[arg(long, default_value = "Week {week} - {start} to {end}, {year}")]
        name_template: String,
    },
    Edit {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    List {
        /// Include blocks that have already ended
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum AssignmentAction {
    Add {
        #[arg(long)]
        block: Uuid,
        #[arg(long)]
        survey: Uuid,
        #[arg(long, conflicts_with = "faculty", required_unless_present = "faculty")]
        fellow: Option<Uuid>,
        #[arg(long)]
        faculty: Option<Uuid>,
        /// Send only on this date instead of every Friday pass
        #[arg(long)]
        send_date: Option<NaiveDate>,
        /// Also send on the Friday pass when --send-date is given
        #[arg(long)]
        fridays: bool,
        #[arg(long)]
        notes: Option<String>,
    },
    BulkAdd {
        #[arg(long)]
        block: Uuid,
        #[arg(long = "fellow", num_args = 1..)]
        fellows: Vec<Uuid>,
        #[arg(long = "faculty", num_args = 1..)]
        faculty: Vec<Uuid>,
        #[arg(long = "survey", num_args = 1.., required = true)]
        surveys: Vec<Uuid>,
    },
    List {
        #[arg(long)]
        block: Uuid,
    },
    Delete { id: Uuid },
}

fn recipient_refs(fellows: &[Uuid], faculty: &[Uuid]) -> Vec<RecipientRef> {
    fellows
        .iter()
        .map(|id| RecipientRef::Fellow(*id))
        .chain(faculty.iter().map(|id| RecipientRef::Faculty(*id)))
        .collect()
}

/// Row offset of a 1-based tracking page. Out-of-range pages land past the end.
fn page_offset(page: i64) -> i64 {
    page.max(1).saturating_sub(1).saturating_mul(TRACKING_PAGE_SIZE)
}

fn dispatcher(config: &Config) -> anyhow::Result<Dispatcher<TwilioTransport>> {
    let transport = TwilioTransport::new(config.twilio()?);
    Ok(Dispatcher::new(transport, config.send_timeout))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let today = Local::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Fellow { action } => run_recipient(&pool, RecipientKind::Fellow, action).await?,
        Commands::Faculty { action } => run_recipient(&pool, RecipientKind::Faculty, action).await?,
        Commands::Survey { action } => run_survey(&pool, action).await?,
        Commands::Block { action } => run_block(&pool, action, today).await?,
        Commands::Assignment { action } => run_assignment(&pool, action).await?,
        Commands::Preview { date } => {
            let as_of = date.unwrap_or(today);
            let store = db::PgStore::new(pool.clone());
            let items = driver::preview_due(&store, as_of).await?;
            if as_of.weekday() != Weekday::Fri {
                println!("Note: {as_of} is not a Friday.");
            }
            if items.is_empty() {
                println!("Nothing due on {as_of}.");
                return Ok(());
            }
            println!("{} evaluations due on {as_of}:", items.len());
            for item in items {
                println!(
                    "- {} [{}] {} / {}: \"{}\"",
                    item.assignment_id,
                    item.block_name,
                    item.recipient_name,
                    item.survey_name,
                    item.body.as_deref().unwrap_or("(will be skipped)")
                );
            }
        }
        Commands::SendDue { date } => {
            let as_of = date.unwrap_or(today);
            if as_of.weekday() != Weekday::Fri {
                tracing::warn!(date = %as_of, "Running the send pass on a day other than Friday");
            }
            let dispatcher = dispatcher(&config)?;
            let store = db::PgStore::new(pool.clone());
            let summary = driver::run_due_sends(&store, &store, &dispatcher, as_of).await?;
            println!("{}.", summary.message());
            if summary.failed > 0 {
                println!("Check `tracking` for failure details.");
            }
            if summary.unrecorded > 0 {
                println!("Some sends were not written to the evaluation log; see the error output.");
            }
        }
        Commands::Send {
            survey,
            fellows,
            faculty,
            message,
        } => {
            let recipients = recipient_refs(&fellows, &faculty);
            anyhow::ensure!(!recipients.is_empty(), "select at least one --fellow or --faculty");
            let dispatcher = dispatcher(&config)?;
            let store = db::PgStore::new(pool.clone());
            let summary = driver::send_ad_hoc(
                &store,
                &store,
                &dispatcher,
                &recipients,
                survey,
                message.as_deref(),
                today,
            )
            .await?;
            println!("{}.", summary.message());
        }
        Commands::TestSms { phone, survey } => {
            let body = match survey {
                Some(id) => match db::find_survey(&pool, id).await? {
                    Some(survey) => format!("Test message: {} - {}", survey.name, survey.link),
                    None => "Test message from Fellowship Evaluation System".to_string(),
                },
                None => "Test message from Fellowship Evaluation System".to_string(),
            };
            let transport = TwilioTransport::new(config.twilio()?);
            let to = template::format_phone(&phone);
            let message_id =
                dispatch::send_with_timeout(&transport, &body, &to, config.send_timeout)
                    .await
                    .with_context(|| format!("test message to {to} failed"))?;
            println!("Test message sent to {to} ({message_id}).");
        }
        Commands::Tracking { page, csv } => {
            let page = page.max(1);
            let rows = db::fetch_tracking(&pool, TRACKING_PAGE_SIZE, page_offset(page)).await?;
            if let Some(path) = csv {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                report::write_tracking_csv(file, &rows)?;
                println!("Wrote {} entries to {}.", rows.len(), path.display());
                return Ok(());
            }
            if rows.is_empty() {
                println!("No evaluations on page {page}.");
                return Ok(());
            }
            for row in rows {
                println!(
                    "{} {} {} ({}) {} {}",
                    row.id,
                    row.sent_at.format("%Y-%m-%d %H:%M"),
                    row.recipient_name,
                    row.survey_name.as_deref().unwrap_or("-"),
                    row.status.as_str(),
                    row.external_message_id
                        .as_deref()
                        .or(row.notes.as_deref())
                        .unwrap_or("")
                );
            }
        }
        Commands::MarkCompleted { id } => {
            db::mark_completed(&pool, id).await?;
            println!("Evaluation {id} marked completed.");
        }
        Commands::Report { out } => {
            let stats = db::dashboard_stats(&pool).await?;
            let active = db::active_blocks(&pool, today).await?;
            let recent = db::fetch_tracking(&pool, 10, 0).await?;
            let report = report::build_report(today, &stats, &active, &recent);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn run_recipient(pool: &PgPool, kind: RecipientKind, action: RecipientAction) -> anyhow::Result<()> {
    let label = kind.as_str();
    match action {
        RecipientAction::Add { name, phone, email } => {
            let created = db::add_recipient(
                pool,
                kind,
                &NewRecipient {
                    name,
                    phone_number: phone,
                    email,
                },
            )
            .await?;
            println!("Added {label} {} ({}).", created.name, created.id);
        }
        RecipientAction::List { all } => {
            let recipients = db::list_recipients(pool, kind, all).await?;
            if recipients.is_empty() {
                println!("No {label} entries.");
            }
            for r in recipients {
                println!(
                    "{} {} {} {}{}",
                    r.id,
                    r.name,
                    template::format_phone(&r.phone_number),
                    r.email.as_deref().unwrap_or("-"),
                    if r.active { "" } else { " (inactive)" }
                );
            }
        }
        RecipientAction::Edit {
            id,
            name,
            phone,
            email,
            active,
        } => {
            let updated = db::update_recipient(
                pool,
                kind.refer(id),
                db::RecipientChanges {
                    name,
                    phone_number: phone,
                    email,
                    active,
                },
            )
            .await?;
            println!("Updated {label} {}.", updated.name);
        }
        RecipientAction::Deactivate { id } => {
            let updated = db::deactivate_recipient(pool, kind.refer(id)).await?;
            println!("Deactivated {label} {}.", updated.name);
        }
    }
    Ok(())
}

async fn run_survey(pool: &PgPool, action: SurveyAction) -> anyhow::Result<()> {
    match action {
        SurveyAction::Add { fields } => {
            let survey = NewSurvey {
                name: fields.name.context("--name is required")?,
                description: fields.description,
                link: fields.link.context("--link is required")?,
                survey_type: fields.survey_type.context("--type is required")?,
                sms_template: fields.sms_template,
            };
            let created = db::add_survey(pool, &survey).await?;
            println!("Added survey \"{}\" ({}).", created.name, created.id);
        }
        SurveyAction::List { all } => {
            for s in db::list_surveys(pool, all).await? {
                println!(
                    "{} {} [{}] {}{}",
                    s.id,
                    s.name,
                    s.survey_type.as_str(),
                    s.link,
                    if s.active { "" } else { " (inactive)" }
                );
            }
        }
        SurveyAction::Edit {
            id,
            fields,
            clear_template,
            active,
        } => {
            let updated = db::update_survey(
                pool,
                id,
                db::SurveyChanges {
                    name: fields.name,
                    description: fields.description,
                    link: fields.link,
                    survey_type: fields.survey_type,
                    sms_template: fields.sms_template,
                    clear_template,
                    active,
                },
            )
            .await?;
            println!("Updated survey \"{}\".", updated.name);
        }
        SurveyAction::Deactivate { id } => {
            let updated = db::update_survey(
                pool,
                id,
                db::SurveyChanges {
                    active: Some(false),
                    ..db::SurveyChanges::default()
                },
            )
            .await?;
            println!("Deactivated survey \"{}\".", updated.name);
        }
    }
    Ok(())
}

async fn run_block(pool: &PgPool, action: BlockAction, today: NaiveDate) -> anyhow::Result<()> {
    match action {
        BlockAction::Add {
            name,
            start,
            end,
            notes,
        } => {
            let (block, warning) = db::add_block(
                pool,
                &NewRotationBlock {
                    name,
                    start_date: start,
                    end_date: end,
                    notes,
                },
            )
            .await?;
            if let Some(warning) = warning {
                tracing::warn!(block = %block.name, "{warning}");
            }
            println!("Added rotation block \"{}\" ({}).", block.name, block.id);
        }
        BlockAction::BulkCreate {
            start,
            weeks,
            name_template,
        } => {
            anyhow::ensure!(weeks > 0, "--weeks must be at least 1");
            let blocks = schedule::weekly_blocks(start, weeks, &name_template);
            let created = db::add_blocks(pool, &blocks).await?;
            println!("Created {} rotation blocks.", created.len());
        }
        BlockAction::Edit {
            id,
            name,
            start,
            end,
            notes,
        } => {
            let (block, warning) = db::update_block(
                pool,
                id,
                db::BlockChanges {
                    name,
                    start_date: start,
                    end_date: end,
                    notes,
                },
            )
            .await?;
            if let Some(warning) = warning {
                tracing::warn!(block = %block.name, "{warning}");
            }
            println!("Updated rotation block \"{}\".", block.name);
        }
        BlockAction::List { all } => {
            let blocks = db::list_blocks(pool, if all { None } else { Some(today) }).await?;
            for block in blocks {
                let state = if block.is_active(today) {
                    " (active)"
                } else if block.is_upcoming(today) {
                    " (upcoming)"
                } else {
                    ""
                };
                println!(
                    "{} {} {} to {} ({} days){}",
                    block.id,
                    block.name,
                    block.start_date,
                    block.end_date,
                    block.span_days(),
                    state
                );
            }
        }
    }
    Ok(())
}

async fn run_assignment(pool: &PgPool, action: AssignmentAction) -> anyhow::Result<()> {
    match action {
        AssignmentAction::Add {
            block,
            survey,
            fellow,
            faculty,
            send_date,
            fridays,
            notes,
        } => {
            let recipient = match (fellow, faculty) {
                (Some(id), _) => RecipientRef::Fellow(id),
                (None, Some(id)) => RecipientRef::Faculty(id),
                (None, None) => anyhow::bail!("select a --fellow or --faculty"),
            };
            let assignment = NewAssignment {
                rotation_block_id: block,
                survey_id: survey,
                recipient,
                send_on_fridays: send_date.is_none() || fridays,
                send_date,
                notes,
            };
            match db::add_assignment(pool, &assignment).await {
                Ok(created) => println!("Assignment added ({}).", created.id),
                Err(LedgerError::DuplicateAssignment { .. }) => {
                    tracing::warn!(recipient = %recipient, "Assignment already exists");
                    println!("This assignment already exists.");
                }
                Err(e) => return Err(e.into()),
            }
        }
        AssignmentAction::BulkAdd {
            block,
            fellows,
            faculty,
            surveys,
        } => {
            let recipients = recipient_refs(&fellows, &faculty);
            anyhow::ensure!(!recipients.is_empty(), "select at least one --fellow or --faculty");
            let outcome = db::bulk_add_assignments(pool, block, &recipients, &surveys).await?;
            if outcome.skipped > 0 {
                println!(
                    "Added {} assignments, skipped {} duplicates.",
                    outcome.added, outcome.skipped
                );
            } else {
                println!("Added {} assignments.", outcome.added);
            }
        }
        AssignmentAction::List { block } => {
            let store = db::PgStore::new(pool.clone());
            let assignments = db::block_assignments(pool, block).await?;
            if assignments.is_empty() {
                println!("No assignments in this block.");
            }
            for a in assignments {
                let name = driver::recipient_display_name(&store, &a).await;
                let schedule = match (a.send_on_fridays, a.send_date) {
                    (true, Some(date)) => format!("Fridays + {date}"),
                    (true, None) => "Fridays".to_string(),
                    (false, Some(date)) => date.to_string(),
                    (false, None) => "manual".to_string(),
                };
                println!(
                    "{} {} ({}) survey {} [{}] last sent {}",
                    a.id,
                    name,
                    a.recipient_type().as_str(),
                    a.survey_id,
                    schedule,
                    a.last_sent
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "never".to_string())
                );
            }
        }
        AssignmentAction::Delete { id } => {
            db::delete_assignment(pool, id).await?;
            println!("Assignment deleted.");
        }
    }
    Ok(())
}
