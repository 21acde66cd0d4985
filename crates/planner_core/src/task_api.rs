use crate::error::AppError;
use crate::model::{Priority, RecurrenceRule, Task, TaskDraft, TaskStatus};
use crate::recurrence;
use crate::storage::json_store::{self, TaskState};
use std::collections::HashSet;
use std::path::Path;
use time::OffsetDateTime;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub category_id: Option<String>,
    pub context_id: Option<String>,
    pub goal_id: Option<String>,
    pub due_date: Option<OffsetDateTime>,
    pub recurrence_rule: Option<RecurrenceRule>,
}

/// Field edits for an existing task. `None` leaves a field alone; for the
/// nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub category_id: Option<Option<String>>,
    pub context_id: Option<Option<String>>,
    pub goal_id: Option<Option<String>>,
    pub due_date: Option<Option<OffsetDateTime>>,
    pub recurrence_rule: Option<Option<RecurrenceRule>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub task: Task,
    /// Task spawned because a recurring task was completed.
    pub successor: Option<Task>,
}

pub fn create_task(user_id: &str, new_task: NewTask) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    create_task_with_path(&path, user_id, new_task)
}

pub fn get_task(user_id: &str, id: &str) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    get_task_with_path(&path, user_id, id)
}

pub fn list_tasks(user_id: &str, status: Option<TaskStatus>) -> Result<Vec<Task>, AppError> {
    let path = json_store::store_path()?;
    list_tasks_with_path(&path, user_id, status)
}

pub fn update_task(user_id: &str, id: &str, update: TaskUpdate) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    update_task_with_path(&path, user_id, id, update)
}

pub fn set_status(user_id: &str, id: &str, status: TaskStatus) -> Result<StatusChange, AppError> {
    let path = json_store::store_path()?;
    set_status_with_path(&path, user_id, id, status)
}

pub fn complete_task(user_id: &str, id: &str) -> Result<StatusChange, AppError> {
    set_status(user_id, id, TaskStatus::Done)
}

pub fn delete_task(user_id: &str, id: &str) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    delete_task_with_path(&path, user_id, id)
}

pub fn task_chain(user_id: &str, id: &str) -> Result<Vec<Task>, AppError> {
    let path = json_store::store_path()?;
    task_chain_with_path(&path, user_id, id)
}

pub fn preview_occurrences(
    user_id: &str,
    id: &str,
    count: usize,
) -> Result<Vec<OffsetDateTime>, AppError> {
    let path = json_store::store_path()?;
    preview_occurrences_with_path(&path, user_id, id, count)
}

fn require_user(user_id: &str) -> Result<&str, AppError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("user is required"));
    }
    Ok(trimmed)
}

fn require_id(id: &str) -> Result<&str, AppError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("id is required"));
    }
    Ok(trimmed)
}

fn require_title(title: &str) -> Result<String, AppError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("title is required"));
    }
    Ok(trimmed.to_string())
}

fn task_not_found() -> AppError {
    AppError::not_found("task not found")
}

fn fresh_id(state: &TaskState) -> String {
    let mut stamp = OffsetDateTime::now_utc().unix_timestamp_nanos();
    loop {
        let id = format!("task-{stamp}");
        if !state.tasks.iter().any(|task| task.id == id) {
            return id;
        }
        stamp += 1;
    }
}

fn create_task_with_path(path: &Path, user_id: &str, new_task: NewTask) -> Result<Task, AppError> {
    let user_id = require_user(user_id)?;
    let title = require_title(&new_task.title)?;

    let mut state = json_store::load_state(path)?;
    let now = OffsetDateTime::now_utc();
    let task = Task {
        id: fresh_id(&state),
        user_id: user_id.to_string(),
        title,
        description: new_task.description,
        priority: new_task.priority,
        category_id: new_task.category_id,
        context_id: new_task.context_id,
        goal_id: new_task.goal_id,
        status: TaskStatus::Todo,
        due_date: new_task.due_date,
        recurrence_rule: new_task.recurrence_rule,
        parent_task_id: None,
        order: state.next_order(user_id, TaskStatus::Todo),
        created_at: now,
        updated_at: now,
        completed_at: None,
    };

    state.tasks.push(task.clone());
    json_store::save_state(path, &state)?;
    info!(task_id = %task.id, recurring = task.recurrence_rule.is_some(), "task created");

    Ok(task)
}

fn get_task_with_path(path: &Path, user_id: &str, id: &str) -> Result<Task, AppError> {
    let user_id = require_user(user_id)?;
    let id = require_id(id)?;

    let state = json_store::load_state(path)?;
    state
        .find_owned(user_id, id)
        .cloned()
        .ok_or_else(task_not_found)
}

fn list_tasks_with_path(
    path: &Path,
    user_id: &str,
    status: Option<TaskStatus>,
) -> Result<Vec<Task>, AppError> {
    let user_id = require_user(user_id)?;

    let state = json_store::load_state(path)?;
    let mut tasks: Vec<Task> = state
        .tasks
        .into_iter()
        .filter(|task| task.user_id == user_id)
        .filter(|task| status.is_none_or(|wanted| task.status == wanted))
        .collect();
    tasks.sort_by_key(|task| (task.status, task.order));

    Ok(tasks)
}

fn update_task_with_path(
    path: &Path,
    user_id: &str,
    id: &str,
    update: TaskUpdate,
) -> Result<Task, AppError> {
    let user_id = require_user(user_id)?;
    let id = require_id(id)?;
    let title = update.title.as_deref().map(require_title).transpose()?;

    let mut state = json_store::load_state(path)?;
    let task = state.find_owned_mut(user_id, id).ok_or_else(task_not_found)?;

    if let Some(title) = title {
        task.title = title;
    }
    if let Some(description) = update.description {
        task.description = description;
    }
    if let Some(priority) = update.priority {
        task.priority = priority;
    }
    if let Some(category_id) = update.category_id {
        task.category_id = category_id;
    }
    if let Some(context_id) = update.context_id {
        task.context_id = context_id;
    }
    if let Some(goal_id) = update.goal_id {
        task.goal_id = goal_id;
    }
    if let Some(due_date) = update.due_date {
        task.due_date = due_date;
    }
    if let Some(recurrence_rule) = update.recurrence_rule {
        task.recurrence_rule = recurrence_rule;
    }
    task.updated_at = OffsetDateTime::now_utc();

    let updated = task.clone();
    json_store::save_state(path, &state)?;

    Ok(updated)
}

fn set_status_with_path(
    path: &Path,
    user_id: &str,
    id: &str,
    status: TaskStatus,
) -> Result<StatusChange, AppError> {
    let user_id = require_user(user_id)?;
    let id = require_id(id)?;

    let mut state = json_store::load_state(path)?;
    let previous = state
        .find_owned(user_id, id)
        .cloned()
        .ok_or_else(task_not_found)?;

    if previous.status == status {
        debug!(task_id = %previous.id, status = status.label(), "status unchanged");
        return Ok(StatusChange {
            task: previous,
            successor: None,
        });
    }

    let draft = recurrence::spawn_successor(&previous, status)?;
    let order = state.next_order(user_id, status);
    let now = OffsetDateTime::now_utc();

    let task = state.find_owned_mut(user_id, id).ok_or_else(task_not_found)?;
    task.status = status;
    task.order = order;
    task.updated_at = now;
    task.completed_at = if status.is_done() { Some(now) } else { None };
    let updated = task.clone();

    json_store::save_state(path, &state)?;
    info!(
        task_id = %updated.id,
        from = previous.status.label(),
        to = status.label(),
        "status changed"
    );

    let successor = match draft {
        Some(draft) => {
            let successor = task_from_draft(&state, user_id, draft, now);
            state.tasks.push(successor.clone());
            json_store::save_state(path, &state)?;
            info!(
                task_id = %successor.id,
                parent_task_id = %updated.id,
                "recurring task spawned"
            );
            Some(successor)
        }
        None => None,
    };

    Ok(StatusChange {
        task: updated,
        successor,
    })
}

fn task_from_draft(state: &TaskState, user_id: &str, draft: TaskDraft, now: OffsetDateTime) -> Task {
    Task {
        id: fresh_id(state),
        user_id: user_id.to_string(),
        title: draft.title,
        description: draft.description,
        priority: draft.priority,
        category_id: draft.category_id,
        context_id: draft.context_id,
        goal_id: draft.goal_id,
        order: state.next_order(user_id, draft.status),
        status: draft.status,
        due_date: Some(draft.due_date),
        recurrence_rule: Some(draft.recurrence_rule),
        parent_task_id: Some(draft.parent_task_id),
        created_at: now,
        updated_at: now,
        completed_at: None,
    }
}

fn delete_task_with_path(path: &Path, user_id: &str, id: &str) -> Result<Task, AppError> {
    let user_id = require_user(user_id)?;
    let id = require_id(id)?;

    let mut state = json_store::load_state(path)?;
    let index = state
        .tasks
        .iter()
        .position(|task| task.id == id && task.user_id == user_id)
        .ok_or_else(task_not_found)?;

    let removed = state.tasks.remove(index);
    for task in state.tasks.iter_mut().filter(|task| task.user_id == user_id) {
        if task.parent_task_id.as_deref() == Some(id) {
            task.parent_task_id = None;
        }
    }
    json_store::save_state(path, &state)?;

    Ok(removed)
}

fn task_chain_with_path(path: &Path, user_id: &str, id: &str) -> Result<Vec<Task>, AppError> {
    let user_id = require_user(user_id)?;
    let id = require_id(id)?;

    let state = json_store::load_state(path)?;
    let mut current = state.find_owned(user_id, id).ok_or_else(task_not_found)?;
    let mut seen = HashSet::new();
    let mut chain = Vec::new();

    loop {
        if !seen.insert(current.id.as_str()) {
            return Err(AppError::invalid_data(format!(
                "parent chain of {id} loops back to {}",
                current.id
            )));
        }
        chain.push(current.clone());

        let Some(parent_id) = current.parent_task_id.as_deref() else {
            break;
        };
        match state.find_owned(user_id, parent_id) {
            Some(parent) => current = parent,
            None => break,
        }
    }

    Ok(chain)
}

fn preview_occurrences_with_path(
    path: &Path,
    user_id: &str,
    id: &str,
    count: usize,
) -> Result<Vec<OffsetDateTime>, AppError> {
    let task = get_task_with_path(path, user_id, id)?;
    let rule = task
        .recurrence_rule
        .as_ref()
        .ok_or_else(|| AppError::invalid_input("task has no recurrence rule"))?;
    let due_date = task
        .due_date
        .ok_or_else(|| AppError::invalid_input("task has no due date"))?;

    recurrence::upcoming_occurrences(rule, due_date, count)
}
