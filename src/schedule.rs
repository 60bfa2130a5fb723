use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{Assignment, NewAssignment, NewRotationBlock, RecipientRef, RotationBlock};

pub const NOMINAL_BLOCK_DAYS: i64 = 7;

/// Whether one of the assignment's send triggers fires on `as_of`.
///
/// The recurring flag and an explicit date are a union: either one is enough.
pub fn trigger_matches(assignment: &Assignment, as_of: NaiveDate) -> bool {
    assignment.send_on_fridays || assignment.send_date == Some(as_of)
}

pub fn already_sent(assignment: &Assignment, as_of: NaiveDate) -> bool {
    assignment.last_sent == Some(as_of)
}

pub fn is_eligible(assignment: &Assignment, block: &RotationBlock, as_of: NaiveDate) -> bool {
    assignment.rotation_block_id == block.id
        && block.is_active(as_of)
        && trigger_matches(assignment, as_of)
        && !already_sent(assignment, as_of)
}

/// Assignments that should send on `as_of`. Assignments whose block is not in
/// `blocks` are never eligible.
pub fn eligible_assignments<'a>(
    blocks: &[RotationBlock],
    assignments: &'a [Assignment],
    as_of: NaiveDate,
) -> Vec<&'a Assignment> {
    let by_id: HashMap<Uuid, &RotationBlock> = blocks.iter().map(|b| (b.id, b)).collect();
    assignments
        .iter()
        .filter(|a| {
            by_id
                .get(&a.rotation_block_id)
                .is_some_and(|block| is_eligible(a, block, as_of))
        })
        .collect()
}

/// Validates a block's range. Returns a warning when the span is not a week.
pub fn check_block_span(
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Option<String>, LedgerError> {
    if start_date > end_date {
        return Err(LedgerError::Validation(format!(
            "block starts {start_date} after it ends {end_date}"
        )));
    }
    let days = (end_date - start_date).num_days() + 1;
    if days != NOMINAL_BLOCK_DAYS {
        return Ok(Some(format!(
            "block is {days} days; blocks are normally {NOMINAL_BLOCK_DAYS} days (Mon-Sun)"
        )));
    }
    Ok(None)
}

/// Consecutive seven-day blocks starting at `start_date`.
///
/// `name_template` accepts `{week}`, `{start}`, `{end}` and `{year}`.
pub fn weekly_blocks(start_date: NaiveDate, weeks: u32, name_template: &str) -> Vec<NewRotationBlock> {
    let mut blocks = Vec::with_capacity(weeks as usize);
    let mut current_start = start_date;

    for week in 1..=weeks {
        let current_end = current_start + Duration::days(NOMINAL_BLOCK_DAYS - 1);
        let name = name_template
            .replace("{week}", &week.to_string())
            .replace("{start}", &current_start.format("%b %d").to_string())
            .replace("{end}", &current_end.format("%b %d").to_string())
            .replace("{year}", &current_start.format("%Y").to_string());

        blocks.push(NewRotationBlock {
            name,
            start_date: current_start,
            end_date: current_end,
            notes: None,
        });
        current_start = current_end + Duration::days(1);
    }

    blocks
}

pub fn next_friday_message(today: NaiveDate) -> String {
    let days_until = (Weekday::Fri.num_days_from_monday() + 7
        - today.weekday().num_days_from_monday())
        % 7;
    if days_until == 0 {
        "Today is Friday!".to_string()
    } else {
        let next = today + Duration::days(i64::from(days_until));
        format!("Next Friday: {}", next.format("%B %d, %Y"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct BulkPlan {
    pub to_add: Vec<NewAssignment>,
    pub skipped: usize,
}

/// Plans recipients x surveys into `block_id`, skipping pairs already present
/// in `existing` or repeated in the request.
pub fn plan_bulk_assignments(
    block_id: Uuid,
    existing: &[Assignment],
    recipients: &[RecipientRef],
    survey_ids: &[Uuid],
) -> BulkPlan {
    let mut taken: HashSet<(RecipientRef, Uuid)> = existing
        .iter()
        .filter(|a| a.rotation_block_id == block_id)
        .map(|a| (a.recipient, a.survey_id))
        .collect();
    let mut plan = BulkPlan::default();

    for recipient in recipients {
        for survey_id in survey_ids {
            if taken.insert((*recipient, *survey_id)) {
                plan.to_add
                    .push(NewAssignment::recurring(block_id, *survey_id, *recipient));
            } else {
                plan.skipped += 1;
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn week_block() -> RotationBlock {
        RotationBlock {
            id: Uuid::new_v4(),
            name: "ICU Week 1".to_string(),
            start_date: date(2025, 1, 6),
            end_date: date(2025, 1, 12),
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn assignment(block: &RotationBlock) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            rotation_block_id: block.id,
            survey_id: Uuid::new_v4(),
            recipient: RecipientRef::Fellow(Uuid::new_v4()),
            send_on_fridays: true,
            send_date: None,
            last_sent: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn materialize(plan: &BulkPlan) -> Vec<Assignment> {
        plan.to_add
            .iter()
            .map(|new| Assignment {
                id: Uuid::new_v4(),
                rotation_block_id: new.rotation_block_id,
                survey_id: new.survey_id,
                recipient: new.recipient,
                send_on_fridays: new.send_on_fridays,
                send_date: new.send_date,
                last_sent: None,
                notes: None,
                created_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn sent_today_is_not_eligible() {
        let block = week_block();
        let friday = date(2025, 1, 10);
        let mut sent = assignment(&block);
        sent.last_sent = Some(friday);
        let fresh = assignment(&block);
        let assignments = vec![sent, fresh.clone()];

        let eligible = eligible_assignments(&[block], &assignments, friday);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, fresh.id);
    }

    #[test]
    fn sent_on_an_earlier_day_is_eligible_again() {
        let block = week_block();
        let mut a = assignment(&block);
        a.last_sent = Some(date(2025, 1, 9));
        assert!(is_eligible(&a, &block, date(2025, 1, 10)));
    }

    #[test]
    fn inactive_block_is_never_eligible() {
        let block = week_block();
        let a = assignment(&block);
        assert!(!is_eligible(&a, &block, date(2025, 1, 13)));
        assert!(eligible_assignments(&[], &[a], date(2025, 1, 10)).is_empty());
    }

    #[test]
    fn explicit_send_date_fires_only_on_that_day() {
        let block = week_block();
        let mut a = assignment(&block);
        a.send_on_fridays = false;
        a.send_date = Some(date(2025, 1, 8));
        assert!(is_eligible(&a, &block, date(2025, 1, 8)));
        assert!(!is_eligible(&a, &block, date(2025, 1, 10)));
    }

    #[test]
    fn both_triggers_form_a_union() {
        let block = week_block();
        let mut a = assignment(&block);
        a.send_date = Some(date(2025, 1, 8));
        assert!(is_eligible(&a, &block, date(2025, 1, 8)));
        assert!(is_eligible(&a, &block, date(2025, 1, 10)));
    }

    #[test]
    fn order_does_not_change_eligibility() {
        let block = week_block();
        let mut items: Vec<Assignment> = (0..4).map(|_| assignment(&block)).collect();
        items[1].last_sent = Some(date(2025, 1, 10));
        items[3].send_on_fridays = false;
        let forward: HashSet<Uuid> = eligible_assignments(&[block.clone()], &items, date(2025, 1, 10))
            .iter()
            .map(|a| a.id)
            .collect();
        items.reverse();
        let backward: HashSet<Uuid> = eligible_assignments(&[block], &items, date(2025, 1, 10))
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 2);
    }

    #[test]
    fn inverted_block_is_rejected() {
        let err = check_block_span(date(2025, 1, 12), date(2025, 1, 6));
        assert!(matches!(err, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn non_weekly_block_warns() {
        assert!(check_block_span(date(2025, 1, 6), date(2025, 1, 12))
            .unwrap()
            .is_none());
        let warning = check_block_span(date(2025, 1, 6), date(2025, 1, 19))
            .unwrap()
            .expect("two-week block should warn");
        assert!(warning.contains("14 days"));
    }

    #[test]
    fn weekly_blocks_are_consecutive_and_named() {
        let blocks = weekly_blocks(date(2025, 1, 6), 3, "ICU Week {week} - {start} to {end}, {year}");
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].name, "ICU Week 1 - Jan 06 to Jan 12, 2025");
        assert_eq!(blocks[1].start_date, date(2025, 1, 13));
        assert_eq!(blocks[2].end_date, date(2025, 1, 26));
    }

    #[test]
    fn next_friday_message_counts_forward() {
        assert_eq!(next_friday_message(date(2025, 1, 10)), "Today is Friday!");
        assert_eq!(
            next_friday_message(date(2025, 1, 11)),
            "Next Friday: January 17, 2025"
        );
        assert_eq!(
            next_friday_message(date(2025, 1, 6)),
            "Next Friday: January 10, 2025"
        );
    }

    #[test]
    fn bulk_add_is_idempotent() {
        let block_id = Uuid::new_v4();
        let fellows: Vec<RecipientRef> =
            (0..3).map(|_| RecipientRef::Fellow(Uuid::new_v4())).collect();
        let surveys = vec![Uuid::new_v4(), Uuid::new_v4()];

        let first = plan_bulk_assignments(block_id, &[], &fellows, &surveys);
        assert_eq!(first.to_add.len(), 6);
        assert_eq!(first.skipped, 0);

        let existing = materialize(&first);
        let second = plan_bulk_assignments(block_id, &existing, &fellows, &surveys);
        assert_eq!(second.to_add.len(), 0);
        assert_eq!(second.skipped, 6);
    }

    #[test]
    fn bulk_add_skips_repeats_within_request() {
        let block_id = Uuid::new_v4();
        let fellow = RecipientRef::Fellow(Uuid::new_v4());
        let survey = Uuid::new_v4();
        let plan = plan_bulk_assignments(block_id, &[], &[fellow, fellow], &[survey]);
        assert_eq!(plan.to_add.len(), 1);
        assert_eq!(plan.skipped, 1);
    }

    #[test]
    fn fellow_and_faculty_with_same_id_are_distinct() {
        let block_id = Uuid::new_v4();
        let id = Uuid::new_v4();
        let survey = Uuid::new_v4();
        let plan = plan_bulk_assignments(
            block_id,
            &[],
            &[RecipientRef::Fellow(id), RecipientRef::Faculty(id)],
            &[survey],
        );
        assert_eq!(plan.to_add.len(), 2);
    }

    #[test]
    fn assignments_in_other_blocks_do_not_block_bulk_add() {
        let block = week_block();
        let other = assignment(&block);
        let plan = plan_bulk_assignments(
            Uuid::new_v4(),
            &[other.clone()],
            &[other.recipient],
            &[other.survey_id],
        );
        assert_eq!(plan.to_add.len(), 1);
    }
}
