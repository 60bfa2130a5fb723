use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{DashboardStats, EvaluationStatus, RotationBlock, TrackingRow};
use crate::schedule;

pub fn build_report(
    today: NaiveDate,
    stats: &DashboardStats,
    active_blocks: &[RotationBlock],
    recent: &[TrackingRow],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Fellowship Evaluation Report");
    let _ = writeln!(
        output,
        "Generated {} ({})",
        today.format("%B %d, %Y"),
        schedule::next_friday_message(today)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Directory");
    let _ = writeln!(output, "- Active fellows: {}", stats.active_fellows);
    let _ = writeln!(output, "- Active faculty: {}", stats.active_faculty);
    let _ = writeln!(output, "- Active surveys: {}", stats.active_surveys);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Evaluations");
    let _ = writeln!(output, "- Sent: {}", stats.sent);
    let _ = writeln!(output, "- Failed: {}", stats.failed);
    let _ = writeln!(output, "- Completed: {}", stats.completed);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Active Rotation Blocks");

    if active_blocks.is_empty() {
        let _ = writeln!(output, "No rotation blocks are active today.");
    } else {
        for block in active_blocks {
            let friday = block
                .friday_in_block()
                .map(|d| format!("Friday {}", d.format("%b %d")))
                .unwrap_or_else(|| "no Friday".to_string());
            let _ = writeln!(
                output,
                "- {} ({} to {}, {})",
                block.name, block.start_date, block.end_date, friday
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Evaluations");

    if recent.is_empty() {
        let _ = writeln!(output, "No evaluations have been sent yet.");
    } else {
        for row in recent.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} {} ({}): {}{}",
                row.sent_at.format("%Y-%m-%d %H:%M"),
                row.recipient_name,
                row.survey_name.as_deref().unwrap_or("no survey"),
                row.status.as_str(),
                failure_suffix(row)
            );
        }
    }

    output
}

fn failure_suffix(row: &TrackingRow) -> String {
    match (&row.status, &row.notes) {
        (EvaluationStatus::Failed, Some(notes)) => format!(" - {notes}"),
        _ => String::new(),
    }
}

/// Writes tracking rows as CSV with a header line.
pub fn write_tracking_csv<W: std::io::Write>(writer: W, rows: &[TrackingRow]) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecipientKind;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn row(status: EvaluationStatus, notes: Option<&str>) -> TrackingRow {
        TrackingRow {
            id: Uuid::nil(),
            sent_at: Utc.with_ymd_and_hms(2025, 1, 10, 14, 30, 0).unwrap(),
            recipient_type: RecipientKind::Fellow,
            recipient_name: "Avery Lee".to_string(),
            survey_name: Some("Peer Review".to_string()),
            status,
            external_message_id: Some("SM0001".to_string()),
            completed_at: None,
            notes: notes.map(str::to_string),
        }
    }

    #[test]
    fn report_lists_counts_and_failures() {
        let stats = DashboardStats {
            active_fellows: 17,
            active_faculty: 4,
            active_surveys: 3,
            sent: 40,
            failed: 2,
            completed: 12,
        };
        let block = RotationBlock {
            id: Uuid::new_v4(),
            name: "ICU Week 1".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 12).unwrap(),
            notes: None,
            created_at: Utc::now(),
        };
        let recent = vec![
            row(EvaluationStatus::Sent, None),
            row(EvaluationStatus::Failed, Some("API error: status=401")),
        ];
        let today = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();

        let report = build_report(today, &stats, &[block], &recent);

        assert!(report.contains("Next Friday: January 10, 2025"));
        assert!(report.contains("- Active fellows: 17"));
        assert!(report.contains("- Failed: 2"));
        assert!(report.contains("ICU Week 1 (2025-01-06 to 2025-01-12, Friday Jan 10)"));
        assert!(report.contains("Avery Lee (Peer Review): failed - API error: status=401"));
    }

    #[test]
    fn empty_report_has_placeholders() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let report = build_report(today, &DashboardStats::default(), &[], &[]);
        assert!(report.contains("Today is Friday!"));
        assert!(report.contains("No rotation blocks are active today."));
        assert!(report.contains("No evaluations have been sent yet."));
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let mut buffer = Vec::new();
        write_tracking_csv(&mut buffer, &[row(EvaluationStatus::Sent, None)]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("id,sent_at,recipient_type,recipient_name,survey_name,status,external_message_id,completed_at,notes")
        );
        let line = lines.next().unwrap();
        assert!(line.contains(",fellow,Avery Lee,Peer Review,sent,SM0001,,"));
    }
}
