use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_DESCRIPTION: &str = "No description provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    New,
    InProgress,
    Completed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::New
    }
}

impl TaskStatus {
    /// Wire/storage label, identical for JSON bodies and the JSONB column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

/// A top-level task for one calendar date, owned by one user. Sub-tasks are
/// embedded in the row (JSONB) and never exist outside their parent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyTask {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Decorated name: `"<title> - <dd-MM-yy>"`, unique per (user, name, date).
    pub name: String,
    pub date: NaiveDate,
    pub status: TaskStatus,
    pub description: String,
    pub sub_tasks: Json<Vec<SubTask>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubTask {
    pub id: Uuid,
    pub task_name: String,
    pub status: TaskStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub description: String,
}

/// A sub-task flattened out of its parent for the cross-task list views,
/// carrying the parent's identity alongside the sub-task's own fields.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FlatSubTask {
    pub id: Uuid,
    pub task_name: String,
    pub status: TaskStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub description: String,
    pub parent_id: Uuid,
    pub parent_name: String,
}

/// Aggregate status of a parent from its sub-tasks. Total over all inputs:
/// - empty sequence -> New
/// - every sub-task completed -> Completed
/// - any sub-task started (in progress or completed) -> InProgress
/// - otherwise -> New
pub fn derive_status(sub_tasks: &[SubTask]) -> TaskStatus {
    if sub_tasks.is_empty() {
        return TaskStatus::New;
    }
    if sub_tasks.iter().all(|t| t.status == TaskStatus::Completed) {
        return TaskStatus::Completed;
    }
    if sub_tasks
        .iter()
        .any(|t| matches!(t.status, TaskStatus::InProgress | TaskStatus::Completed))
    {
        return TaskStatus::InProgress;
    }
    TaskStatus::New
}

/// Stored name for a daily task: the user-supplied title plus the formatted
/// date, e.g. `"Groceries - 15-03-24"`.
pub fn decorated_name(title: &str, date: NaiveDate) -> String {
    format!("{} - {}", title.trim(), date.format("%d-%m-%y"))
}

/// Duplicate rule for sub-tasks within one parent: the (task_name, start_date)
/// pair must be unique.
pub fn has_duplicate_sub_task(
    sub_tasks: &[SubTask],
    task_name: &str,
    start_date: DateTime<Utc>,
) -> bool {
    sub_tasks
        .iter()
        .any(|t| t.task_name == task_name && t.start_date == start_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sub(status: TaskStatus) -> SubTask {
        SubTask {
            id: Uuid::new_v4(),
            task_name: "t".into(),
            status,
            start_date: Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap(),
            description: String::new(),
        }
    }

    #[test]
    fn empty_sequence_derives_new() {
        assert_eq!(derive_status(&[]), TaskStatus::New);
    }

    #[test]
    fn all_completed_derives_completed() {
        let s = vec![sub(TaskStatus::Completed), sub(TaskStatus::Completed)];
        assert_eq!(derive_status(&s), TaskStatus::Completed);
    }

    #[test]
    fn single_completed_derives_completed() {
        assert_eq!(derive_status(&[sub(TaskStatus::Completed)]), TaskStatus::Completed);
    }

    #[test]
    fn any_started_but_not_all_completed_derives_in_progress() {
        let s = vec![sub(TaskStatus::New), sub(TaskStatus::InProgress)];
        assert_eq!(derive_status(&s), TaskStatus::InProgress);

        // A completed sub-task alongside an untouched one also means "started".
        let s = vec![sub(TaskStatus::New), sub(TaskStatus::Completed)];
        assert_eq!(derive_status(&s), TaskStatus::InProgress);
    }

    #[test]
    fn all_new_derives_new() {
        let s = vec![sub(TaskStatus::New), sub(TaskStatus::New), sub(TaskStatus::New)];
        assert_eq!(derive_status(&s), TaskStatus::New);
    }

    #[test]
    fn derivation_is_pure() {
        let s = vec![sub(TaskStatus::InProgress)];
        assert_eq!(derive_status(&s), derive_status(&s));
    }

    #[test]
    fn decorated_name_formats_day_month_two_digit_year() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(decorated_name("Groceries", date), "Groceries - 15-03-24");
    }

    #[test]
    fn decorated_name_trims_title() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        assert_eq!(decorated_name("  Errands ", date), "Errands - 01-12-25");
    }

    #[test]
    fn duplicate_sub_task_requires_both_name_and_start_date() {
        let existing = sub(TaskStatus::New);
        let name = existing.task_name.clone();
        let start = existing.start_date;
        let list = vec![existing];

        assert!(has_duplicate_sub_task(&list, &name, start));
        assert!(!has_duplicate_sub_task(&list, "other", start));
        assert!(!has_duplicate_sub_task(
            &list,
            &name,
            start + chrono::Duration::hours(1)
        ));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"in_progress\"");
        assert_eq!(TaskStatus::InProgress.as_str(), "in_progress");
    }
}
