//! HTML rendering for the calendar pages.

use crate::calendar::{REPETITION_SUBTYPE_MONTH_DAY, REPETITION_SUBTYPE_WEEK_DAY};
use crate::chat::ChatMessage;
use crate::db::models::{Calendar, Task, DEFAULT_TASK_COLOR};
use crate::tasks::MonthTasks;
use axum::http::StatusCode;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::fmt::Write;

const STYLE: &str = r#"
    * { box-sizing: border-box; }
    body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 0; color: #333; background: #f7f7f7; }
    header { display: flex; justify-content: space-between; align-items: center; padding: 12px 24px; background: #667eea; color: white; }
    header a { color: white; margin-left: 16px; text-decoration: none; }
    main { padding: 24px; }
    table.month { width: 100%; border-collapse: collapse; table-layout: fixed; background: white; }
    table.month th, table.month td { border: 1px solid #ddd; vertical-align: top; padding: 4px; height: 110px; }
    table.month th { height: auto; background: #eef; }
    td.other-month { background: #f0f0f0; color: #aaa; }
    td.today { outline: 2px solid #667eea; }
    .day-number { font-weight: 600; }
    .task { display: block; margin: 2px 0; padding: 2px 4px; border-radius: 4px; color: white; font-size: 0.85em; text-decoration: none; overflow: hidden; }
    .task.recurring { font-style: italic; }
    .nav { display: flex; gap: 16px; align-items: center; margin-bottom: 16px; }
    .error { color: #b91c1c; }
    .notice { color: #047857; }
    form.task-form label { display: block; margin-top: 12px; }
    #messages { background: white; border: 1px solid #ddd; height: 360px; overflow-y: auto; padding: 8px; }
"#;

/// Everything the month view needs
pub struct MonthView<'a> {
    pub calendar_id: &'a str,
    pub username: &'a str,
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    pub weekday_names: Vec<String>,
    pub weeks: Vec<Vec<NaiveDate>>,
    pub tasks: &'a MonthTasks,
    pub today: NaiveDate,
    pub previous: Option<(i32, u32)>,
    pub next: Option<(i32, u32)>,
    pub view_past_tasks: bool,
}

/// Data for the new and edit task forms
pub struct TaskFormView<'a> {
    pub calendar_id: &'a str,
    pub username: &'a str,
    /// Where the form posts to
    pub action: String,
    pub date: NaiveDate,
    pub task: Option<&'a Task>,
    /// Year, month and day of the instance being edited
    pub instance: Option<(i32, u32, u32)>,
    /// Weekday names, Monday first
    pub weekday_names: Vec<String>,
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render task details as HTML: escaped text, clickable links, line breaks.
pub fn task_details_for_markup(details: &str) -> String {
    details
        .lines()
        .map(linkify_line)
        .collect::<Vec<_>>()
        .join("<br>")
}

fn linkify_line(line: &str) -> String {
    let mut out = String::new();
    let mut rest = line;

    while let Some(start) = find_url_start(rest) {
        out.push_str(&escape_html(&rest[..start]));
        let url_len = rest[start..]
            .find(|c: char| c.is_whitespace() || c == '<' || c == '>' || c == '"')
            .unwrap_or(rest.len() - start);
        let url = &rest[start..start + url_len];
        let escaped = escape_html(url);
        let _ = write!(out, r#"<a href="{}" target="_blank">{}</a>"#, escaped, escaped);
        rest = &rest[start + url_len..];
    }
    out.push_str(&escape_html(rest));
    out
}

fn find_url_start(text: &str) -> Option<usize> {
    let http = text.find("http://");
    let https = text.find("https://");
    match (http, https) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn layout(title: &str, username: Option<&str>, body: &str, script: &str) -> String {
    let nav = match username {
        Some(name) => format!(
            r#"<nav><span>{}</span><a href="/">Calendar</a><a href="/chat/">Chat</a><a href="/user/edit/">Account</a></nav>"#,
            escape_html(name)
        ),
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <link rel="icon" href="/favicon.ico">
    <style>{style}</style>
</head>
<body>
    <header><strong>Taskcal</strong>{nav}</header>
    <main>
{body}
    </main>
{script}
</body>
</html>
"#,
        title = escape_html(title),
        style = STYLE,
        nav = nav,
        body = body,
        script = script,
    )
}

pub fn login_page(error: bool) -> String {
    let message = if error {
        r#"<p class="error">Invalid username or password.</p>"#
    } else {
        ""
    };

    let body = format!(
        r#"<h1>Log in</h1>
{}
<form method="post" action="/do_login">
    <label>Username <input type="text" name="username" autofocus required></label>
    <label>Password <input type="password" name="password" required></label>
    <button type="submit">Log in</button>
</form>"#,
        message
    );
    layout("Log in", None, &body, "")
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let body = format!(
        r#"<h1>{}</h1>
<p class="error">{}</p>
<p><a href="/">Back to the calendar</a></p>"#,
        status,
        escape_html(message)
    );
    layout(&status.to_string(), None, &body, "")
}

fn month_url(calendar_id: &str, year: i32, month: u32) -> String {
    format!("/{}/?y={}&m={}", calendar_id, year, month)
}

fn task_url(calendar_id: &str, year: i32, month: u32, day: u32, task_id: i64) -> String {
    format!("/{}/{}/{}/{}/{}/", calendar_id, year, month, day, task_id)
}

fn task_color(task: &Task) -> String {
    if task.color.is_empty() {
        DEFAULT_TASK_COLOR.to_string()
    } else {
        escape_html(&task.color)
    }
}

fn task_label(task: &Task) -> String {
    match (&task.due_time, task.is_all_day) {
        (Some(time), false) => format!("{} {}", escape_html(time), escape_html(&task.title)),
        _ => escape_html(&task.title),
    }
}

pub fn month_page(view: &MonthView) -> String {
    let mut body = String::new();

    let previous = view
        .previous
        .map(|(y, m)| format!(r#"<a href="{}">&laquo;</a>"#, month_url(view.calendar_id, y, m)))
        .unwrap_or_default();
    let next = view
        .next
        .map(|(y, m)| format!(r#"<a href="{}">&raquo;</a>"#, month_url(view.calendar_id, y, m)))
        .unwrap_or_default();
    let past_toggle = if view.view_past_tasks {
        format!(
            r#"<a href="{}&view_past_tasks=0">Hide past tasks</a>"#,
            month_url(view.calendar_id, view.year, view.month)
        )
    } else {
        format!(
            r#"<a href="{}&view_past_tasks=1">Show past tasks</a>"#,
            month_url(view.calendar_id, view.year, view.month)
        )
    };

    let _ = write!(
        body,
        r#"<div class="nav">{previous}<h1>{month} {year}</h1>{next}
<a href="/{cal}/{year}/{month_num}/new_task">New task</a>
<a href="/main/{cal}/">Overview</a>
{past_toggle}</div>
<table class="month" data-calendar="{cal}" data-year="{year}" data-month="{month_num}">
<tr>"#,
        previous = previous,
        next = next,
        month = escape_html(&view.month_name),
        year = view.year,
        month_num = view.month,
        cal = escape_html(view.calendar_id),
        past_toggle = past_toggle,
    );
    for name in &view.weekday_names {
        let _ = write!(body, "<th>{}</th>", escape_html(name));
    }
    body.push_str("</tr>\n");

    for week in &view.weeks {
        body.push_str("<tr>");
        for date in week {
            if date.month() != view.month || date.year() != view.year {
                let _ = write!(body, r#"<td class="other-month">{}</td>"#, date.day());
                continue;
            }

            let class = if *date == view.today { " today" } else { "" };
            let _ = write!(
                body,
                r#"<td class="day{class}" data-day="{day}"><a class="day-number" href="/{cal}/{year}/{month}/new_task?day={day}">{day}</a>"#,
                class = class,
                day = date.day(),
                cal = escape_html(view.calendar_id),
                year = view.year,
                month = view.month,
            );

            for task in view.tasks.get(&date.day()).map(Vec::as_slice).unwrap_or_default() {
                let recurring = task.is_recurring();
                let _ = write!(
                    body,
                    r#"<a class="task{recurring_class}" href="{url}" style="background: {color}" title="{title}" data-task-id="{id}" draggable="{draggable}">{label}</a>"#,
                    recurring_class = if recurring { " recurring" } else { "" },
                    url = task_url(view.calendar_id, view.year, view.month, date.day(), task.id),
                    color = task_color(task),
                    title = escape_html(&task.details),
                    id = task.id,
                    draggable = !recurring,
                    label = task_label(task),
                );
            }
            body.push_str("</td>");
        }
        body.push_str("</tr>\n");
    }
    body.push_str("</table>");

    layout(
        &format!("{} {}", view.month_name, view.year),
        Some(view.username),
        &body,
        MONTH_SCRIPT,
    )
}

const MONTH_SCRIPT: &str = r#"<script>
document.querySelectorAll('.task[draggable="true"]').forEach(function (el) {
    el.addEventListener('dragstart', function (ev) {
        ev.dataTransfer.setData('text/plain', el.getAttribute('href'));
    });
});
document.querySelectorAll('td.day').forEach(function (cell) {
    cell.addEventListener('dragover', function (ev) { ev.preventDefault(); });
    cell.addEventListener('drop', function (ev) {
        ev.preventDefault();
        var url = ev.dataTransfer.getData('text/plain');
        fetch(url, {
            method: 'PUT',
            credentials: 'same-origin',
            headers: { 'Content-Type': 'application/json' },
            body: JSON.stringify({ newDay: parseInt(cell.dataset.day, 10) })
        }).then(function () { window.location.reload(); });
    });
});
</script>"#;

pub fn task_form_page(view: &TaskFormView) -> String {
    let task = view.task;
    let title = task.map(|t| escape_html(&t.title)).unwrap_or_default();
    let details = task.map(|t| escape_html(&t.details)).unwrap_or_default();
    let color = task
        .map(task_color)
        .unwrap_or_else(|| DEFAULT_TASK_COLOR.to_string());
    let is_all_day = task.map(|t| t.is_all_day).unwrap_or(true);
    let due_time = task
        .and_then(|t| t.due_time.as_deref())
        .map(escape_html)
        .unwrap_or_default();
    let recurrence = task.and_then(Task::recurrence);
    let (rep_type, rep_subtype, rep_value) = recurrence
        .map(|r| r.to_parts())
        .map(|(t, s, v)| (t, s.unwrap_or_default(), v))
        .unwrap_or(("w", REPETITION_SUBTYPE_WEEK_DAY, 0));

    let selected = |cond: bool| if cond { " selected" } else { "" };
    let checked = |cond: bool| if cond { " checked" } else { "" };

    let mut weekday_options = String::new();
    for (index, name) in view.weekday_names.iter().enumerate() {
        let _ = write!(
            weekday_options,
            r#"<option value="{}"{}>{}</option>"#,
            index,
            selected(recurrence.is_some() && rep_subtype == REPETITION_SUBTYPE_WEEK_DAY && rep_value == index as i64),
            escape_html(name)
        );
    }

    let heading = if task.is_some() { "Edit task" } else { "New task" };
    let mut body = format!(
        r#"<h1>{heading}</h1>
<p><a href="{back}">Back to {month}/{year}</a></p>
<form class="task-form" method="post" action="{action}">
    <label>Date <input type="date" name="date" value="{date}" required></label>
    <label>Title <input type="text" name="title" value="{title}" required></label>
    <label>Color <input type="color" name="color" value="{color}"></label>
    <label><input type="checkbox" name="is_all_day" value="1"{all_day}> All day</label>
    <label>Due time <input type="time" name="due_time" value="{due_time}"></label>
    <label>Details <textarea name="details" rows="4">{details}</textarea></label>
    <fieldset>
        <legend><label><input type="checkbox" name="repeats" value="1"{repeats}> Repeats</label></legend>
        <select name="repetition_type">
            <option value="w"{weekly}>Weekly</option>
            <option value="m"{monthly}>Monthly</option>
        </select>
        <select name="repetition_subtype">
            <option value="{sub_week}"{sub_week_selected}>On a weekday</option>
            <option value="{sub_month}"{sub_month_selected}>On a day of the month</option>
        </select>
        <select name="weekday" onchange="this.form.repetition_value.value = this.value">{weekday_options}</select>
        <input type="number" name="repetition_value" min="0" max="31" value="{rep_value}">
    </fieldset>
    <button type="submit">Save</button>
</form>"#,
        heading = heading,
        back = month_url(view.calendar_id, view.date.year(), view.date.month()),
        month = view.date.month(),
        year = view.date.year(),
        action = escape_html(&view.action),
        date = view.date.format("%Y-%m-%d"),
        title = title,
        color = color,
        all_day = checked(is_all_day),
        due_time = due_time,
        details = details,
        repeats = checked(recurrence.is_some()),
        weekly = selected(rep_type == "w"),
        monthly = selected(rep_type == "m"),
        sub_week = REPETITION_SUBTYPE_WEEK_DAY,
        sub_week_selected = selected(rep_subtype == REPETITION_SUBTYPE_WEEK_DAY),
        sub_month = REPETITION_SUBTYPE_MONTH_DAY,
        sub_month_selected = selected(rep_subtype == REPETITION_SUBTYPE_MONTH_DAY),
        weekday_options = weekday_options,
        rep_value = rep_value,
    );

    if let (Some(task), Some((year, month, day))) = (task, view.instance) {
        if !task.details.is_empty() {
            let _ = write!(
                body,
                r#"<h2>Details</h2><div class="details">{}</div>"#,
                task_details_for_markup(&task.details)
            );
        }

        let url = task_url(view.calendar_id, year, month, day, task.id);
        let _ = write!(
            body,
            r#"<p><button type="button" id="delete-task" data-url="{url}" data-back="{back}">Delete</button></p>"#,
            url = url,
            back = month_url(view.calendar_id, year, month),
        );
        if task.is_recurring() {
            let _ = write!(
                body,
                r#"<form method="post" action="{}hide/"><button type="submit">Hide this occurrence</button></form>"#,
                url
            );
        }
    }

    layout(heading, Some(view.username), &body, TASK_FORM_SCRIPT)
}

const TASK_FORM_SCRIPT: &str = r#"<script>
var deleteButton = document.getElementById('delete-task');
if (deleteButton) {
    deleteButton.addEventListener('click', function () {
        if (!window.confirm('Delete this task?')) { return; }
        fetch(deleteButton.dataset.url, { method: 'DELETE', credentials: 'same-origin' })
            .then(function () { window.location = deleteButton.dataset.back; });
    });
}
</script>"#;

/// Overview of the next few days across a calendar
pub fn main_page(
    calendar: &Calendar,
    username: &str,
    calendars: &[Calendar],
    days: &BTreeMap<NaiveDate, Vec<Task>>,
    today: NaiveDate,
) -> String {
    let mut body = format!(
        r#"<h1>{}</h1>
<p><a href="{}">Month view</a></p>"#,
        escape_html(&calendar.name),
        month_url(&calendar.id, today.year(), today.month())
    );

    if calendars.len() > 1 {
        body.push_str("<p>Calendars: ");
        for other in calendars {
            let _ = write!(
                body,
                r#"<a href="/main/{}/">{}</a> "#,
                escape_html(&other.id),
                escape_html(&other.name)
            );
        }
        body.push_str("</p>");
    }

    if days.is_empty() {
        body.push_str("<p>Nothing planned.</p>");
    }
    for (date, tasks) in days {
        let _ = write!(
            body,
            "<h2>{}{}</h2><ul>",
            date.format("%Y-%m-%d"),
            if *date == today { " (today)" } else { "" }
        );
        for task in tasks {
            let _ = write!(
                body,
                r#"<li><a href="{}" style="color: {}">{}</a></li>"#,
                task_url(&calendar.id, date.year(), date.month(), date.day(), task.id),
                task_color(task),
                task_label(task)
            );
        }
        body.push_str("</ul>");
    }

    layout(&calendar.name, Some(username), &body, "")
}

pub fn chat_page(username: &str, history: &[(String, ChatMessage)]) -> String {
    let mut items = String::new();
    for (_, message) in history {
        let _ = write!(
            items,
            "<div><small>{}</small> <strong>{}</strong>: {}</div>",
            escape_html(message.time.as_deref().unwrap_or_default()),
            escape_html(message.user_name.as_deref().unwrap_or_default()),
            escape_html(message.message.as_deref().unwrap_or_default())
        );
    }

    let body = format!(
        r#"<h1>Chat</h1>
<div id="messages">{items}</div>
<form id="chat-form">
    <input type="text" id="chat-input" autocomplete="off" placeholder="Message">
    <button type="submit">Send</button>
</form>"#,
        items = items
    );

    let script = format!(
        r#"<script>
var userName = {user};
var messages = document.getElementById('messages');
var scheme = window.location.protocol === 'https:' ? 'wss://' : 'ws://';
var socket = new WebSocket(scheme + window.location.host + '/socket');
function escapeText(text) {{
    var div = document.createElement('div');
    div.textContent = text || '';
    return div.innerHTML;
}}
socket.addEventListener('message', function (ev) {{
    var envelope = JSON.parse(ev.data);
    if (envelope.event !== 'my response') {{ return; }}
    var msg = envelope.data || {{}};
    if (!msg.message) {{ return; }}
    var line = document.createElement('div');
    line.innerHTML = '<small>' + escapeText(msg.time) + '</small> <strong>' +
        escapeText(msg.user_name) + '</strong>: ' + escapeText(msg.message);
    messages.appendChild(line);
    messages.scrollTop = messages.scrollHeight;
}});
socket.addEventListener('open', function () {{
    socket.send(JSON.stringify({{ event: 'my event', data: {{ user_name: userName, message: '' }} }}));
}});
document.getElementById('chat-form').addEventListener('submit', function (ev) {{
    ev.preventDefault();
    var input = document.getElementById('chat-input');
    socket.send(JSON.stringify({{ event: 'my event', data: {{ user_name: userName, message: input.value }} }}));
    input.value = '';
}});
</script>"#,
        user = serde_json::Value::from(username)
    );

    layout("Chat", Some(username), &body, &script)
}

/// Password change form. `notice` is a success message, `error` a failure.
pub fn user_edit_page(username: &str, notice: Option<&str>, error: Option<&str>) -> String {
    let notice = notice
        .map(|n| format!(r#"<p class="notice">{}</p>"#, escape_html(n)))
        .unwrap_or_default();
    let error = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, escape_html(e)))
        .unwrap_or_default();

    let body = format!(
        r#"<h1>Account: {user}</h1>
{notice}{error}
<form method="post" action="/user/edit/">
    <label>Current password <input type="password" name="current_password" required></label>
    <label>New password <input type="password" name="new_password" required></label>
    <label>Repeat new password <input type="password" name="new_password_confirmation" required></label>
    <button type="submit">Change password</button>
</form>"#,
        user = escape_html(username),
        notice = notice,
        error = error,
    );
    layout("Account", Some(username), &body, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(id: i64, title: &str) -> Task {
        Task {
            id,
            calendar_id: "home".into(),
            year: 2026,
            month: 10,
            day: 16,
            title: title.into(),
            details: String::new(),
            color: "#ff0000".into(),
            is_all_day: true,
            due_time: None,
            repetition_type: None,
            repetition_subtype: None,
            repetition_value: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#x27;Jerry&#x27;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_task_details_for_markup() {
        let html = task_details_for_markup("See https://example.com/a?b=1&c=2 now\n<script>");
        assert_eq!(
            html,
            r#"See <a href="https://example.com/a?b=1&amp;c=2" target="_blank">https://example.com/a?b=1&amp;c=2</a> now<br>&lt;script&gt;"#
        );
    }

    #[test]
    fn test_task_details_multiple_links() {
        let html = task_details_for_markup("http://a.test and https://b.test");
        assert_eq!(html.matches("<a href=").count(), 2);
        assert!(html.contains(r#"<a href="http://a.test" target="_blank">"#));
    }

    #[test]
    fn test_month_page_lists_tasks() {
        let mut tasks = MonthTasks::new();
        tasks.insert(16, vec![task(7, "Dentist <3")]);
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

        let html = month_page(&MonthView {
            calendar_id: "home",
            username: "ana",
            year: 2026,
            month: 10,
            month_name: "October".into(),
            weekday_names: vec!["Mon".into(); 7],
            weeks: crate::calendar::month_weeks(2026, 10, chrono::Weekday::Mon),
            tasks: &tasks,
            today,
            previous: Some((2026, 9)),
            next: None,
            view_past_tasks: false,
        });

        assert!(html.contains("October 2026"));
        assert!(html.contains("Dentist &lt;3"));
        assert!(html.contains(r#"href="/home/2026/10/16/7/""#));
        assert!(html.contains(r#"href="/home/?y=2026&m=9""#));
        assert!(!html.contains("&raquo;"));
    }

    #[test]
    fn test_task_form_page_for_edit() {
        let mut t = task(3, "Standup");
        t.repetition_type = Some("w".into());
        t.repetition_subtype = Some("w".into());
        t.repetition_value = Some(2);
        t.details = "Room https://meet.test".into();

        let html = task_form_page(&TaskFormView {
            calendar_id: "home",
            username: "ana",
            action: "/home/2026/10/21/task/3".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            task: Some(&t),
            instance: Some((2026, 10, 21)),
            weekday_names: vec!["Mon".into(), "Tue".into(), "Wed".into()],
        });

        assert!(html.contains("Edit task"));
        assert!(html.contains(r#"action="/home/2026/10/21/task/3""#));
        assert!(html.contains(r#"<option value="2" selected>Wed</option>"#));
        assert!(html.contains(r#"action="/home/2026/10/21/3/hide/""#));
        assert!(html.contains(r#"<a href="https://meet.test" target="_blank">"#));
    }

    #[test]
    fn test_chat_page_escapes_history() {
        let history = vec![(
            "1.000000".to_string(),
            ChatMessage::new("ana", "<b>hi</b>"),
        )];
        let html = chat_page("ana", &history);
        assert!(html.contains("&lt;b&gt;hi&lt;/b&gt;"));
        assert!(html.contains(r#"var userName = "ana";"#));
    }
}
