use crate::calendar::days_in_month;
use crate::db::models::{NewTask, Task};
use crate::error::{CalendarError, Result};
use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};

const TASK_COLUMNS: &str = "id, calendar_id, year, month, day, title, details, color, is_all_day, \
     due_time, repetition_type, repetition_subtype, repetition_value, created_at";

/// Tasks of one month, keyed by day of month.
pub type MonthTasks = BTreeMap<u32, Vec<Task>>;

pub struct TaskManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TaskManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Add a new task to a calendar
    pub async fn add_task(&self, calendar_id: &str, new_task: &NewTask) -> Result<Task> {
        self.check_calendar_exists(calendar_id).await?;
        let new_task = normalize(new_task)?;
        let (rep_type, rep_subtype, rep_value) = recurrence_columns(&new_task);

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (calendar_id, year, month, day, title, details, color, is_all_day,
                               due_time, repetition_type, repetition_subtype, repetition_value, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(calendar_id)
        .bind(new_task.date.year())
        .bind(new_task.date.month())
        .bind(new_task.date.day())
        .bind(&new_task.title)
        .bind(&new_task.details)
        .bind(&new_task.color)
        .bind(new_task.is_all_day)
        .bind(&new_task.due_time)
        .bind(rep_type)
        .bind(rep_subtype)
        .bind(rep_value)
        .bind(Utc::now())
        .execute(self.pool)
        .await?;

        let id = result.last_insert_rowid();
        crate::log_task_operation!("add", id, new_task.title.as_str());
        self.get_task(calendar_id, id).await
    }

    /// Get a task by ID, scoped to its calendar
    pub async fn get_task(&self, calendar_id: &str, id: i64) -> Result<Task> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = ? AND calendar_id = ?",
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(calendar_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(CalendarError::TaskNotFound(id))?;

        Ok(task)
    }

    /// Replace every editable field of a task, including date and recurrence
    pub async fn update_task(&self, calendar_id: &str, id: i64, new_task: &NewTask) -> Result<Task> {
        let existing = self.get_task(calendar_id, id).await?;
        let new_task = normalize(new_task)?;
        let (rep_type, rep_subtype, rep_value) = recurrence_columns(&new_task);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE tasks
            SET year = ?, month = ?, day = ?, title = ?, details = ?, color = ?, is_all_day = ?,
                due_time = ?, repetition_type = ?, repetition_subtype = ?, repetition_value = ?
            WHERE id = ?
            "#,
        )
        .bind(new_task.date.year())
        .bind(new_task.date.month())
        .bind(new_task.date.day())
        .bind(&new_task.title)
        .bind(&new_task.details)
        .bind(&new_task.color)
        .bind(new_task.is_all_day)
        .bind(&new_task.due_time)
        .bind(rep_type)
        .bind(rep_subtype)
        .bind(rep_value)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        // Hidden instances belong to the old rule
        if existing.recurrence() != new_task.recurrence {
            sqlx::query("DELETE FROM hidden_repetitions WHERE task_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        crate::log_task_operation!("update", id);
        self.get_task(calendar_id, id).await
    }

    /// Delete a task together with its hidden recurrence instances
    pub async fn delete_task(&self, calendar_id: &str, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND calendar_id = ?")
            .bind(id)
            .bind(calendar_id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CalendarError::TaskNotFound(id));
        }

        crate::log_task_operation!("delete", id);
        Ok(())
    }

    /// Move a one-off task to another day of the same month
    pub async fn move_task_day(&self, calendar_id: &str, id: i64, new_day: u32) -> Result<Task> {
        let task = self.get_task(calendar_id, id).await?;

        if task.is_recurring() {
            return Err(CalendarError::ActionNotAllowed(
                "recurring tasks cannot be moved to another day".to_string(),
            ));
        }
        if NaiveDate::from_ymd_opt(task.year, task.month, new_day).is_none() {
            return Err(CalendarError::InvalidInput(format!(
                "day {} does not exist in {}-{:02}",
                new_day, task.year, task.month
            )));
        }

        sqlx::query("UPDATE tasks SET day = ? WHERE id = ?")
            .bind(new_day)
            .bind(id)
            .execute(self.pool)
            .await?;

        crate::log_task_operation!("move", id, new_day);
        self.get_task(calendar_id, id).await
    }

    /// Hide one occurrence of a recurring task, keeping the rule
    pub async fn hide_repetition_instance(
        &self,
        calendar_id: &str,
        id: i64,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<()> {
        let task = self.get_task(calendar_id, id).await?;

        if !task.is_recurring() {
            return Err(CalendarError::ActionNotAllowed(
                "only recurring tasks have instances to hide".to_string(),
            ));
        }
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(CalendarError::InvalidInput(format!(
                "invalid date {}-{:02}-{:02}",
                year, month, day
            )));
        }

        sqlx::query(
            "INSERT OR IGNORE INTO hidden_repetitions (task_id, year, month, day) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(year)
        .bind(month)
        .bind(day)
        .execute(self.pool)
        .await?;

        let hidden_date = format!("{}-{:02}-{:02}", year, month, day);
        crate::log_task_operation!("hide_instance", id, hidden_date.as_str());
        Ok(())
    }

    /// Everything shown in a month: one-off tasks placed in it plus recurring
    /// tasks expanded over it, minus hidden instances.
    pub async fn tasks_for_month(&self, calendar_id: &str, year: i32, month: u32) -> Result<MonthTasks> {
        if days_in_month(year, month).is_none() {
            return Err(CalendarError::InvalidInput(format!(
                "invalid month {}-{}",
                year, month
            )));
        }

        let mut by_day: MonthTasks = BTreeMap::new();

        let one_off = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE calendar_id = ? AND year = ? AND month = ? AND repetition_type IS NULL",
            TASK_COLUMNS
        ))
        .bind(calendar_id)
        .bind(year)
        .bind(month)
        .fetch_all(self.pool)
        .await?;

        for task in one_off {
            by_day.entry(task.day).or_default().push(task);
        }

        let recurring = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE calendar_id = ? AND repetition_type IS NOT NULL",
            TASK_COLUMNS
        ))
        .bind(calendar_id)
        .fetch_all(self.pool)
        .await?;

        let hidden: HashSet<(i64, u32)> = sqlx::query_as::<_, (i64, u32)>(
            r#"
            SELECT h.task_id, h.day
            FROM hidden_repetitions h
            JOIN tasks t ON t.id = h.task_id
            WHERE t.calendar_id = ? AND h.year = ? AND h.month = ?
            "#,
        )
        .bind(calendar_id)
        .bind(year)
        .bind(month)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .collect();

        for task in recurring {
            let (Some(rule), Some(start)) = (task.recurrence(), task.date()) else {
                tracing::warn!("Skipping task {} with an unusable recurrence rule", task.id);
                continue;
            };

            for day in rule.days_in(year, month) {
                let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                    continue;
                };
                if date < start || hidden.contains(&(task.id, day)) {
                    continue;
                }
                by_day.entry(day).or_default().push(task.clone());
            }
        }

        for tasks in by_day.values_mut() {
            sort_day(tasks);
        }

        Ok(by_day)
    }

    /// Tasks for every day in `from..=to`, skipping empty days.
    pub async fn tasks_between(
        &self,
        calendar_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, Vec<Task>>> {
        let mut result = BTreeMap::new();
        let mut cursor = (from.year(), from.month());

        while (cursor.0, cursor.1) <= (to.year(), to.month()) {
            let month = self.tasks_for_month(calendar_id, cursor.0, cursor.1).await?;
            for (day, tasks) in month {
                if let Some(date) = NaiveDate::from_ymd_opt(cursor.0, cursor.1, day) {
                    if date >= from && date <= to {
                        result.insert(date, tasks);
                    }
                }
            }
            cursor = crate::calendar::next_month(cursor.0, cursor.1);
        }

        Ok(result)
    }

    async fn check_calendar_exists(&self, calendar_id: &str) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM calendars WHERE id = ?)")
            .bind(calendar_id)
            .fetch_one(self.pool)
            .await?;

        if !exists {
            return Err(CalendarError::CalendarNotFound(calendar_id.to_string()));
        }

        Ok(())
    }
}

/// Drop one-off tasks that fall before `today`.
pub fn hide_past(tasks: &mut MonthTasks, year: i32, month: u32, today: NaiveDate) {
    tasks.retain(|day, day_tasks| {
        let Some(date) = NaiveDate::from_ymd_opt(year, month, *day) else {
            return false;
        };
        if date < today {
            day_tasks.retain(Task::is_recurring);
        }
        !day_tasks.is_empty()
    });
}

/// All-day tasks first, then by due time, then by id.
fn sort_day(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        b.is_all_day
            .cmp(&a.is_all_day)
            .then_with(|| a.due_time.cmp(&b.due_time))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn normalize(new_task: &NewTask) -> Result<NewTask> {
    let mut task = new_task.clone();

    task.title = task.title.trim().to_string();
    if task.title.is_empty() {
        return Err(CalendarError::InvalidInput("title is required".to_string()));
    }

    task.color = task.color.trim().to_string();
    if !is_valid_color(&task.color) {
        return Err(CalendarError::InvalidInput(format!(
            "invalid color '{}'",
            task.color
        )));
    }

    if task.is_all_day {
        task.due_time = None;
    } else {
        let due = task
            .due_time
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CalendarError::InvalidInput("due time is required unless the task is all-day".to_string())
            })?;
        let parsed = NaiveTime::parse_from_str(due, "%H:%M")
            .map_err(|_| CalendarError::InvalidInput(format!("invalid due time '{}'", due)))?;
        task.due_time = Some(parsed.format("%H:%M").to_string());
    }

    Ok(task)
}

fn is_valid_color(color: &str) -> bool {
    if let Some(hex) = color.strip_prefix('#') {
        return matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    !color.is_empty() && color.chars().all(|c| c.is_ascii_alphabetic())
}

fn recurrence_columns(task: &NewTask) -> (Option<&'static str>, Option<&'static str>, Option<i64>) {
    match task.recurrence {
        Some(rule) => {
            let (kind, subtype, value) = rule.to_parts();
            (Some(kind), subtype, Some(value))
        },
        None => (None, None, None),
    }
}
