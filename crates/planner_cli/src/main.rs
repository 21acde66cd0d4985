use clap::Parser;
use clap::error::ErrorKind;
use planner_cli::cli::{
    Cli, Command, ConfigOverrideTarget, RecurCommand, parse_config_override, parse_date_arg,
};
use planner_core::config::{self, Config, ConfigOverrides, Palette};
use planner_core::error::AppError;
use planner_core::model::{Priority, RecurrenceRule, Task, TaskStatus};
use planner_core::recurrence;
use planner_core::task_api::{self, NewTask, StatusChange, TaskUpdate};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const LOG_ENV_VAR: &str = "PLANNER_LOG";

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "TITLE")]
    title: String,
    #[tabled(rename = "STATUS")]
    status: &'static str,
    #[tabled(rename = "PRIORITY")]
    priority: &'static str,
    #[tabled(rename = "DUE")]
    due: String,
    #[tabled(rename = "REPEATS")]
    repeats: String,
}

impl TaskRow {
    fn from_task(task: &Task) -> Result<Self, AppError> {
        Ok(Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status.label(),
            priority: task.priority.label(),
            due: format_optional_date(task.due_date)?,
            repeats: task
                .recurrence_rule
                .as_ref()
                .map_or_else(|| "-".to_string(), RecurrenceRule::to_string),
        })
    }
}

fn format_date(value: OffsetDateTime) -> Result<String, AppError> {
    value
        .format(&Rfc3339)
        .map_err(|err| AppError::invalid_data(err.to_string()))
}

fn format_optional_date(value: Option<OffsetDateTime>) -> Result<String, AppError> {
    value.map_or_else(|| Ok("-".to_string()), format_date)
}

fn task_json(task: &Task) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(task).map_err(|err| AppError::invalid_data(err.to_string()))
}

fn print_task_json(task: &Task) -> Result<(), AppError> {
    println!("{}", task_json(task)?);
    Ok(())
}

fn print_tasks_json(tasks: &[Task]) -> Result<(), AppError> {
    let payload = tasks.iter().map(task_json).collect::<Result<Vec<_>, _>>()?;
    println!("{}", serde_json::Value::Array(payload));
    Ok(())
}

fn print_tasks_table(tasks: &[Task]) -> Result<(), AppError> {
    let rows = tasks
        .iter()
        .map(TaskRow::from_task)
        .collect::<Result<Vec<_>, _>>()?;
    let mut table = Table::new(rows);
    table.with(Style::psql());
    println!("{table}");
    Ok(())
}

fn print_task_details(task: &Task, palette: &Palette) -> Result<(), AppError> {
    println!("{}", palette.accentize(&task.title));
    let fields = [
        ("id", task.id.clone()),
        ("status", task.status.label().to_string()),
        ("priority", task.priority.label().to_string()),
        ("due", format_optional_date(task.due_date)?),
        (
            "repeats",
            task.recurrence_rule
                .as_ref()
                .map_or_else(|| "-".to_string(), RecurrenceRule::to_string),
        ),
        ("parent", task.parent_task_id.clone().unwrap_or_else(|| "-".into())),
        ("description", task.description.clone().unwrap_or_else(|| "-".into())),
        ("category", task.category_id.clone().unwrap_or_else(|| "-".into())),
        ("context", task.context_id.clone().unwrap_or_else(|| "-".into())),
        ("goal", task.goal_id.clone().unwrap_or_else(|| "-".into())),
        ("completed", format_optional_date(task.completed_at)?),
    ];
    for (label, value) in fields {
        println!("  {} {}", palette.mutedize(&format!("{label:<12}")), value);
    }
    Ok(())
}

fn print_status_change(
    change: &StatusChange,
    json: bool,
    palette: &Palette,
) -> Result<(), AppError> {
    if json {
        let successor = change.successor.as_ref().map(task_json).transpose()?;
        let payload = serde_json::json!({
            "task": task_json(&change.task)?,
            "successor": successor,
        });
        println!("{payload}");
        return Ok(());
    }

    println!(
        "Task {} ({}) is now {}",
        change.task.title,
        change.task.id,
        palette.accentize(change.task.status.label())
    );
    if let Some(successor) = change.successor.as_ref() {
        println!(
            "Next occurrence: {} ({}) due {}",
            successor.title,
            successor.id,
            format_optional_date(successor.due_date)?
        );
    }
    Ok(())
}

fn print_dates(dates: &[OffsetDateTime], json: bool) -> Result<(), AppError> {
    let formatted = dates
        .iter()
        .map(|date| format_date(*date))
        .collect::<Result<Vec<_>, _>>()?;
    if json {
        println!("{}", serde_json::json!(formatted));
    } else {
        for date in formatted {
            println!("{date}");
        }
    }
    Ok(())
}

fn parse_priority(raw: &str) -> Result<Priority, AppError> {
    Priority::parse(raw).ok_or_else(|| {
        AppError::invalid_input(format!(
            "unknown priority '{}' (LOW, MEDIUM, HIGH, URGENT)",
            raw.trim()
        ))
    })
}

fn parse_status(raw: &str) -> Result<TaskStatus, AppError> {
    TaskStatus::parse(raw).ok_or_else(|| {
        AppError::invalid_input(format!(
            "unknown status '{}' (TODO, IN_PROGRESS, DONE)",
            raw.trim()
        ))
    })
}

fn parse_rule(raw: &str) -> Result<RecurrenceRule, AppError> {
    raw.parse()
}

/// Edit for a nullable field: `Some(None)` when cleared, `Some(Some(_))` when set.
fn field_edit<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn normalize_parse_error(err: &clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn effective_config(cli: &Cli) -> Result<Config, AppError> {
    let loaded = config::load_config_with_fallback();
    if let Some(err) = loaded.error {
        warn!(error = %err, "ignoring unreadable config");
    }

    let mut overrides = ConfigOverrides::default();
    for raw in &cli.config_override {
        let parsed = parse_config_override(raw).map_err(AppError::invalid_input)?;
        match parsed.target {
            ConfigOverrideTarget::User => overrides.user = Some(parsed.value),
            ConfigOverrideTarget::Theme => overrides.theme = Some(parsed.value),
        }
    }

    Ok(config::merge_overrides(&loaded.config, &overrides))
}

fn run_command(cli: Cli) -> Result<(), AppError> {
    let config = effective_config(&cli)?;
    let palette = config::palette_for_theme(config.theme.as_deref());
    let user = || config::resolve_user(cli.user.as_deref(), &config);

    match cli.command {
        Command::Add {
            title,
            description,
            priority,
            due,
            recur,
            category,
            context,
            goal,
        } => {
            let title = match title {
                Some(value) if !value.trim().is_empty() => value,
                _ => return Err(AppError::invalid_input("title is required")),
            };
            let new_task = NewTask {
                title,
                description,
                priority: priority.as_deref().map(parse_priority).transpose()?.unwrap_or_default(),
                category_id: category,
                context_id: context,
                goal_id: goal,
                due_date: due.as_deref().map(parse_date_arg).transpose()?,
                recurrence_rule: recur.as_deref().map(parse_rule).transpose()?,
            };

            let task = task_api::create_task(&user()?, new_task)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                println!("Added task: {} ({})", task.title, task.id);
            }
        }
        Command::Show { id } => {
            let task = task_api::get_task(&user()?, &id)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                print_task_details(&task, &palette)?;
            }
        }
        Command::List { status } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            let tasks = task_api::list_tasks(&user()?, status)?;
            if cli.json {
                print_tasks_json(&tasks)?;
            } else if tasks.is_empty() {
                println!("{}", palette.mutedize("No tasks."));
            } else {
                print_tasks_table(&tasks)?;
            }
        }
        Command::Edit {
            id,
            title,
            description,
            clear_description,
            priority,
            due,
            clear_due,
            category,
            clear_category,
            context,
            clear_context,
            goal,
            clear_goal,
        } => {
            let due = due.as_deref().map(parse_date_arg).transpose()?;
            let update = TaskUpdate {
                title,
                description: field_edit(description, clear_description),
                priority: priority.as_deref().map(parse_priority).transpose()?,
                category_id: field_edit(category, clear_category),
                context_id: field_edit(context, clear_context),
                goal_id: field_edit(goal, clear_goal),
                due_date: field_edit(due, clear_due),
                recurrence_rule: None,
            };
            let task = task_api::update_task(&user()?, &id, update)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                println!("Updated task: {} ({})", task.title, task.id);
            }
        }
        Command::Start { id } => {
            let change = task_api::set_status(&user()?, &id, TaskStatus::InProgress)?;
            print_status_change(&change, cli.json, &palette)?;
        }
        Command::Reopen { id } => {
            let change = task_api::set_status(&user()?, &id, TaskStatus::Todo)?;
            print_status_change(&change, cli.json, &palette)?;
        }
        Command::Done { id } => {
            let change = task_api::complete_task(&user()?, &id)?;
            print_status_change(&change, cli.json, &palette)?;
        }
        Command::Status { id, status } => {
            let status = parse_status(&status)?;
            let change = task_api::set_status(&user()?, &id, status)?;
            print_status_change(&change, cli.json, &palette)?;
        }
        Command::Delete { id } => {
            let task = task_api::delete_task(&user()?, &id)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                println!("Deleted task: {} ({})", task.title, task.id);
            }
        }
        Command::Chain { id } => {
            let chain = task_api::task_chain(&user()?, &id)?;
            if cli.json {
                print_tasks_json(&chain)?;
            } else {
                print_tasks_table(&chain)?;
            }
        }
        Command::Recur { recur } => match recur {
            RecurCommand::Set { id, rule } => {
                let update = TaskUpdate {
                    recurrence_rule: Some(Some(parse_rule(&rule)?)),
                    ..TaskUpdate::default()
                };
                let task = task_api::update_task(&user()?, &id, update)?;
                if cli.json {
                    print_task_json(&task)?;
                } else {
                    let rule = task
                        .recurrence_rule
                        .as_ref()
                        .map_or_else(|| "-".to_string(), RecurrenceRule::to_string);
                    println!("Task {} ({}) repeats {}", task.title, task.id, rule);
                }
            }
            RecurCommand::Clear { id } => {
                let update = TaskUpdate {
                    recurrence_rule: Some(None),
                    ..TaskUpdate::default()
                };
                let task = task_api::update_task(&user()?, &id, update)?;
                if cli.json {
                    print_task_json(&task)?;
                } else {
                    println!("Task {} ({}) no longer repeats", task.title, task.id);
                }
            }
            RecurCommand::Preview { id, count } => {
                let dates = task_api::preview_occurrences(&user()?, &id, count)?;
                print_dates(&dates, cli.json)?;
            }
        },
        Command::Next { rule, date, count } => {
            let rule = parse_rule(&rule)?;
            let from = parse_date_arg(&date)?;
            let dates = recurrence::upcoming_occurrences(&rule, from, count)?;
            print_dates(&dates, cli.json)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err)
            if !err.use_stderr()
                || err.kind() == ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand =>
        {
            err.exit()
        }
        Err(err) => {
            eprintln!("ERROR: {}", normalize_parse_error(&err));
            std::process::exit(1);
        }
    };

    if let Err(err) = run_command(cli) {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
