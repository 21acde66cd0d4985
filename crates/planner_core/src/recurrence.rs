//! Next-occurrence arithmetic for recurring tasks and the successor drafts
//! produced when one of them is completed.
//!
//! Everything here is pure: callers read the task, apply the status change,
//! and persist whatever draft comes back.

use crate::error::AppError;
use crate::model::{RecurrenceRule, Task, TaskDraft, TaskStatus};
use time::{Date, Duration, Month, OffsetDateTime};
use tracing::debug;

/// Upper bound on how many occurrences a single preview may compute.
pub const MAX_OCCURRENCES: usize = 1000;

/// Date of the occurrence following `from` under `rule`.
///
/// The result is always strictly later than `from` and keeps its
/// time-of-day and offset.
pub fn next_occurrence(
    rule: &RecurrenceRule,
    from: OffsetDateTime,
) -> Result<OffsetDateTime, AppError> {
    match rule {
        RecurrenceRule::Weekly { days_of_week } => {
            let current = from.weekday().number_days_from_sunday();
            let offset = match days_of_week.first_after(current) {
                Some(day) => day - current,
                None => match days_of_week.first() {
                    Some(first) => 7 - current + first,
                    None => 7,
                },
            };
            add_days(from, i64::from(offset))
        }
        RecurrenceRule::Biweekly => add_days(from, 14),
        RecurrenceRule::Monthly => add_months(from, 1),
        RecurrenceRule::Quarterly => add_months(from, 3),
        RecurrenceRule::Yearly => add_months(from, 12),
    }
}

/// Successor for `previous` when its status is about to become `next_status`.
///
/// `previous` must be the snapshot taken before the status change. Returns
/// `None` unless the change enters `DONE` from another status and the task
/// carries both a rule and a due date.
pub fn spawn_successor(
    previous: &Task,
    next_status: TaskStatus,
) -> Result<Option<TaskDraft>, AppError> {
    if !next_status.is_done() || previous.status.is_done() {
        return Ok(None);
    }

    let Some(rule) = previous.recurrence_rule.as_ref() else {
        return Ok(None);
    };

    let Some(due_date) = previous.due_date else {
        debug!(task_id = %previous.id, "recurring task has no due date, not spawning");
        return Ok(None);
    };

    let next_due = next_occurrence(rule, due_date)?;
    debug!(
        task_id = %previous.id,
        frequency = rule.frequency_label(),
        %next_due,
        "spawning successor"
    );

    Ok(Some(TaskDraft {
        title: previous.title.clone(),
        description: previous.description.clone(),
        priority: previous.priority,
        category_id: previous.category_id.clone(),
        context_id: previous.context_id.clone(),
        goal_id: previous.goal_id.clone(),
        status: TaskStatus::Todo,
        due_date: next_due,
        recurrence_rule: rule.clone(),
        parent_task_id: previous.id.clone(),
    }))
}

/// The next `count` occurrences after `from`, in order.
///
/// `count` may not exceed [`MAX_OCCURRENCES`].
pub fn upcoming_occurrences(
    rule: &RecurrenceRule,
    from: OffsetDateTime,
    count: usize,
) -> Result<Vec<OffsetDateTime>, AppError> {
    if count > MAX_OCCURRENCES {
        return Err(AppError::invalid_input(format!(
            "count must be at most {MAX_OCCURRENCES}"
        )));
    }

    let mut occurrences = Vec::with_capacity(count);
    let mut cursor = from;
    for _ in 0..count {
        cursor = next_occurrence(rule, cursor)?;
        occurrences.push(cursor);
    }
    Ok(occurrences)
}

fn add_days(from: OffsetDateTime, days: i64) -> Result<OffsetDateTime, AppError> {
    from.checked_add(Duration::days(days))
        .ok_or_else(|| AppError::invalid_data("next occurrence is out of range"))
}

fn add_months(from: OffsetDateTime, months: i64) -> Result<OffsetDateTime, AppError> {
    let date = from.date();
    let total = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1 + months;
    let year = i32::try_from(total.div_euclid(12))
        .map_err(|_| AppError::invalid_data("next occurrence is out of range"))?;
    // rem_euclid(12) is 0..=11
    let month = Month::try_from(total.rem_euclid(12) as u8 + 1)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;

    Ok(from.replace_date(clamped_date(year, month, date.day())?))
}

/// `day` in `month`, pulled back to the last day of the month when it
/// does not exist there.
fn clamped_date(year: i32, month: Month, day: u8) -> Result<Date, AppError> {
    let mut candidate = day;
    loop {
        match Date::from_calendar_date(year, month, candidate) {
            Ok(date) => return Ok(date),
            Err(_) if candidate > 28 => candidate -= 1,
            Err(err) => return Err(AppError::invalid_data(err.to_string())),
        }
    }
}
