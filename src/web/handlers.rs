use super::auth::{authorize, CurrentUser};
use super::models::{
    html_error, json_error, is_checked, parse_new_day, MonthQuery, NewTaskQuery, TaskForm,
    UserEditForm, UserEditQuery,
};
use super::server::AppState;
use super::views::{self, MonthView, TaskFormView};
use crate::calendar::{month_name, month_weeks, next_month, previous_month, weekday_names};
use crate::error::CalendarError;
use crate::tasks::{hide_past, TaskManager};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Json, Redirect, Response},
    Form,
};
use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};

/// Days shown by the calendar overview, today included
const OVERVIEW_DAYS: i64 = 8;

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn month_redirect(calendar_id: &str, year: i32, month: u32) -> Redirect {
    Redirect::to(&format!("/{}/?y={}&m={}", calendar_id, year, month))
}

fn check_year(state: &AppState, year: i32) -> crate::error::Result<()> {
    if year < state.config.min_year || year > state.config.max_year {
        return Err(CalendarError::InvalidInput(format!(
            "year {} is outside {}..={}",
            year, state.config.min_year, state.config.max_year
        )));
    }
    Ok(())
}

/// Month view of a calendar
pub async fn month_view(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(calendar_id): Path<String>,
    Query(query): Query<MonthQuery>,
) -> Response {
    let today = today();
    let year = query.y.unwrap_or_else(|| today.year());
    let month = query.m.unwrap_or_else(|| today.month());
    let view_past_tasks = is_checked(query.view_past_tasks.as_deref());

    let result = async {
        authorize(&state, &user, &calendar_id).await?;
        check_year(&state, year)?;

        let mut tasks = TaskManager::new(&state.db_pool)
            .tasks_for_month(&calendar_id, year, month)
            .await?;
        if state.config.hide_past_tasks && !view_past_tasks {
            hide_past(&mut tasks, year, month, today);
        }

        let previous = Some(previous_month(year, month))
            .filter(|(y, _)| *y >= state.config.min_year);
        let next = Some(next_month(year, month)).filter(|(y, _)| *y <= state.config.max_year);

        Ok::<_, CalendarError>(views::month_page(&MonthView {
            calendar_id: &calendar_id,
            username: &user.username,
            year,
            month,
            month_name: month_name(year, month, state.locale),
            weekday_names: weekday_names(state.config.week_start(), state.locale),
            weeks: month_weeks(year, month, state.config.week_start()),
            tasks: &tasks,
            today,
            previous,
            next,
            view_past_tasks,
        }))
    }
    .await;

    match result {
        Ok(html) => Html(html).into_response(),
        Err(e) => html_error(&e),
    }
}

/// Overview of today and the following week
pub async fn main_calendar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(calendar_id): Path<String>,
) -> Response {
    let today = today();

    let result = async {
        authorize(&state, &user, &calendar_id).await?;
        let users = state.users();
        let calendars = users.calendars_for(&user).await?;
        let calendar = calendars
            .iter()
            .find(|c| c.id == calendar_id)
            .cloned()
            .ok_or_else(|| CalendarError::CalendarNotFound(calendar_id.clone()))?;

        let days = TaskManager::new(&state.db_pool)
            .tasks_between(&calendar_id, today, today + Duration::days(OVERVIEW_DAYS - 1))
            .await?;

        Ok::<_, CalendarError>(views::main_page(&calendar, &user.username, &calendars, &days, today))
    }
    .await;

    match result {
        Ok(html) => Html(html).into_response(),
        Err(e) => html_error(&e),
    }
}

/// Empty task form, pre-filled with `?day=` when given
pub async fn new_task_form(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((calendar_id, year, month)): Path<(String, i32, u32)>,
    Query(query): Query<NewTaskQuery>,
) -> Response {
    let result = async {
        authorize(&state, &user, &calendar_id).await?;
        check_year(&state, year)?;

        let today = today();
        let default_day = if (today.year(), today.month()) == (year, month) {
            today.day()
        } else {
            1
        };
        let day = query.day.unwrap_or(default_day);
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            CalendarError::InvalidInput(format!("invalid date {}-{}-{}", year, month, day))
        })?;

        Ok::<_, CalendarError>(views::task_form_page(&TaskFormView {
            calendar_id: &calendar_id,
            username: &user.username,
            action: format!("/{}/new_task", calendar_id),
            date,
            task: None,
            instance: None,
            weekday_names: weekday_names(Weekday::Mon, state.locale),
        }))
    }
    .await;

    match result {
        Ok(html) => Html(html).into_response(),
        Err(e) => html_error(&e),
    }
}

/// Edit form for a task; the path date is the instance that was clicked
pub async fn edit_task_form(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((calendar_id, year, month, day, task_id)): Path<(String, i32, u32, u32, i64)>,
) -> Response {
    let result = async {
        authorize(&state, &user, &calendar_id).await?;
        let task = TaskManager::new(&state.db_pool)
            .get_task(&calendar_id, task_id)
            .await?;
        let date = task.date().ok_or_else(|| {
            CalendarError::InvalidInput(format!("task {} has an invalid date", task.id))
        })?;

        Ok::<_, CalendarError>(views::task_form_page(&TaskFormView {
            calendar_id: &calendar_id,
            username: &user.username,
            action: format!("/{}/{}/{}/{}/task/{}", calendar_id, year, month, day, task_id),
            date,
            task: Some(&task),
            instance: Some((year, month, day)),
            weekday_names: weekday_names(Weekday::Mon, state.locale),
        }))
    }
    .await;

    match result {
        Ok(html) => Html(html).into_response(),
        Err(e) => html_error(&e),
    }
}

pub async fn save_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(calendar_id): Path<String>,
    Form(form): Form<TaskForm>,
) -> Response {
    let result = async {
        authorize(&state, &user, &calendar_id).await?;
        let new_task = form.into_new_task()?;
        check_year(&state, new_task.date.year())?;
        TaskManager::new(&state.db_pool)
            .add_task(&calendar_id, &new_task)
            .await
    }
    .await;

    match result {
        Ok(task) => month_redirect(&calendar_id, task.year, task.month).into_response(),
        Err(e) => html_error(&e),
    }
}

pub async fn update_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((calendar_id, _year, _month, _day, task_id)): Path<(String, i32, u32, u32, i64)>,
    Form(form): Form<TaskForm>,
) -> Response {
    let result = async {
        authorize(&state, &user, &calendar_id).await?;
        let new_task = form.into_new_task()?;
        check_year(&state, new_task.date.year())?;
        TaskManager::new(&state.db_pool)
            .update_task(&calendar_id, task_id, &new_task)
            .await
    }
    .await;

    match result {
        Ok(task) => month_redirect(&calendar_id, task.year, task.month).into_response(),
        Err(e) => html_error(&e),
    }
}

pub async fn delete_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((calendar_id, _year, _month, _day, task_id)): Path<(String, i32, u32, u32, i64)>,
) -> Response {
    let result = async {
        authorize(&state, &user, &calendar_id).await?;
        TaskManager::new(&state.db_pool)
            .delete_task(&calendar_id, task_id)
            .await
    }
    .await;

    match result {
        Ok(()) => Json(serde_json::json!({})).into_response(),
        Err(e) => json_error(&e),
    }
}

/// Move a one-off task to another day of its month
pub async fn move_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((calendar_id, _year, _month, _day, task_id)): Path<(String, i32, u32, u32, i64)>,
    body: Bytes,
) -> Response {
    let result = async {
        authorize(&state, &user, &calendar_id).await?;
        let new_day = parse_new_day(&body)
            .ok_or_else(|| CalendarError::InvalidInput("newDay is required".to_string()))?;
        TaskManager::new(&state.db_pool)
            .move_task_day(&calendar_id, task_id, new_day)
            .await
    }
    .await;

    match result {
        Ok(_) => Json(serde_json::json!({})).into_response(),
        Err(e) => json_error(&e),
    }
}

/// Hide one occurrence of a recurring task
pub async fn hide_repetition(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((calendar_id, year, month, day, task_id)): Path<(String, i32, u32, u32, i64)>,
) -> Response {
    let result = async {
        authorize(&state, &user, &calendar_id).await?;
        TaskManager::new(&state.db_pool)
            .hide_repetition_instance(&calendar_id, task_id, year, month, day)
            .await
    }
    .await;

    match result {
        Ok(()) => month_redirect(&calendar_id, year, month).into_response(),
        Err(e) => html_error(&e),
    }
}

pub async fn chat_view(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Response {
    match state.chat.store().messages().await {
        Ok(history) => Html(views::chat_page(&user.username, &history)).into_response(),
        Err(e) => {
            // A broken log still lets people chat
            crate::log_error!(e, "loading chat history");
            Html(views::chat_page(&user.username, &[])).into_response()
        },
    }
}

pub async fn edit_user_form(
    CurrentUser(user): CurrentUser,
    Query(query): Query<UserEditQuery>,
) -> Html<String> {
    let notice = query.updated.is_some().then_some("Password changed.");
    Html(views::user_edit_page(&user.username, notice, None))
}

pub async fn edit_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<UserEditForm>,
) -> Response {
    let users = state.users();

    let render_error = |message: &str| {
        (
            axum::http::StatusCode::BAD_REQUEST,
            Html(views::user_edit_page(&user.username, None, Some(message))),
        )
            .into_response()
    };

    match users.authenticate(&user.username, &form.current_password).await {
        Ok(Some(_)) => {},
        Ok(None) => return render_error("Current password is wrong."),
        Err(e) => return html_error(&e),
    }
    if form.new_password != form.new_password_confirmation {
        return render_error("New passwords do not match.");
    }

    match users.update_password(user.id, &form.new_password).await {
        Ok(()) => Redirect::to("/user/edit/?updated=1").into_response(),
        Err(CalendarError::InvalidInput(message)) => render_error(&message),
        Err(e) => html_error(&e),
    }
}
