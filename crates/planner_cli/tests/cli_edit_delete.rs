use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(file_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("planner-{nanos}-{file_name}"))
}

fn write_store(path: &Path, tasks: serde_json::Value) {
    let content = serde_json::json!({
        "schema_version": 1,
        "tasks": tasks
    });
    std::fs::write(path, serde_json::to_string_pretty(&content).unwrap()).unwrap();
}

fn read_store(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn run(store_path: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_planner"))
        .args(args)
        .env("PLANNER_STORE_PATH", store_path)
        .env("PLANNER_CONFIG_PATH", temp_path("no-config.json"))
        .env("PLANNER_USER", "user-1")
        .output()
        .expect("failed to run planner")
}

fn task(id: &str, status: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "userId": "user-1",
        "title": "renew passport",
        "description": "book appointment",
        "priority": "MEDIUM",
        "categoryId": "cat-admin",
        "contextId": "ctx-town",
        "goalId": "goal-travel",
        "status": status,
        "dueDate": "2026-03-10T00:00:00Z",
        "order": 0,
        "createdAt": "2026-02-20T00:00:00Z",
        "updatedAt": "2026-02-20T00:00:00Z"
    })
}

#[test]
fn edit_command_sets_due_date_and_keeps_other_fields() {
    let store_path = temp_path("cli-edit-due.json");
    write_store(&store_path, serde_json::json!([task("task-1", "TODO")]));

    let output = run(
        &store_path,
        &["edit", "task-1", "--title", "renew passport early", "--due", "2026-04-01"],
    );
    let stored = read_store(&store_path);
    std::fs::remove_file(&store_path).ok();

    assert!(output.status.success());
    let edited = &stored["tasks"][0];
    assert_eq!(edited["title"], "renew passport early");
    assert_eq!(edited["dueDate"], "2026-04-01T00:00:00Z");
    assert_eq!(edited["description"], "book appointment");
    assert_eq!(edited["categoryId"], "cat-admin");
}

#[test]
fn edit_command_clear_flags_remove_fields() {
    let store_path = temp_path("cli-edit-clear.json");
    write_store(&store_path, serde_json::json!([task("task-1", "TODO")]));

    let output = run(
        &store_path,
        &[
            "edit",
            "task-1",
            "--clear-due",
            "--clear-description",
            "--clear-category",
            "--clear-context",
            "--clear-goal",
        ],
    );
    let stored = read_store(&store_path);
    std::fs::remove_file(&store_path).ok();

    assert!(output.status.success());
    let edited = &stored["tasks"][0];
    assert!(edited["dueDate"].is_null());
    assert!(edited["description"].is_null());
    assert!(edited["categoryId"].is_null());
    assert!(edited["contextId"].is_null());
    assert!(edited["goalId"].is_null());
    assert_eq!(edited["title"], "renew passport");
}

#[test]
fn edit_command_rejects_due_together_with_clear_due() {
    let store_path = temp_path("cli-edit-conflict.json");
    write_store(&store_path, serde_json::json!([task("task-1", "TODO")]));

    let output = run(
        &store_path,
        &["edit", "task-1", "--due", "2026-04-01", "--clear-due"],
    );
    let stored = read_store(&store_path);
    std::fs::remove_file(&store_path).ok();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: invalid_input"));
    assert_eq!(stored["tasks"][0]["dueDate"], "2026-03-10T00:00:00Z");
}

#[test]
fn delete_command_unlinks_children() {
    let store_path = temp_path("cli-delete.json");
    let mut child = task("task-2", "TODO");
    child["parentTaskId"] = serde_json::json!("task-1");
    write_store(&store_path, serde_json::json!([task("task-1", "DONE"), child]));

    let output = run(&store_path, &["delete", "task-1"]);
    let stored = read_store(&store_path);
    std::fs::remove_file(&store_path).ok();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Deleted task: renew passport (task-1)"));

    let tasks = stored["tasks"].as_array().expect("tasks array");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], "task-2");
    assert!(tasks[0]["parentTaskId"].is_null());
}

#[test]
fn reopen_command_clears_completed_at() {
    let store_path = temp_path("cli-reopen.json");
    let mut done = task("task-1", "DONE");
    done["completedAt"] = serde_json::json!("2026-03-09T18:00:00Z");
    write_store(&store_path, serde_json::json!([done]));

    let output = run(&store_path, &["reopen", "task-1", "--json"]);
    let stored = read_store(&store_path);
    std::fs::remove_file(&store_path).ok();

    assert!(output.status.success());
    let printed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(printed["task"]["status"], "TODO");
    assert!(printed["successor"].is_null());

    assert_eq!(stored["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(stored["tasks"][0]["status"], "TODO");
    assert!(stored["tasks"][0]["completedAt"].is_null());
}

#[test]
fn show_command_prints_task_fields() {
    let store_path = temp_path("cli-show.json");
    write_store(&store_path, serde_json::json!([task("task-1", "TODO")]));

    let output = run(&store_path, &["show", "task-1", "--json"]);
    std::fs::remove_file(&store_path).ok();

    assert!(output.status.success());
    let printed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(printed["id"], "task-1");
    assert_eq!(printed["goalId"], "goal-travel");
}

#[test]
fn show_command_rejects_other_users_task() {
    let store_path = temp_path("cli-show-foreign.json");
    write_store(&store_path, serde_json::json!([task("task-1", "TODO")]));

    let output = run(&store_path, &["show", "task-1", "--user", "user-2"]);
    std::fs::remove_file(&store_path).ok();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: not_found"));
    assert!(output.stdout.is_empty());
}
