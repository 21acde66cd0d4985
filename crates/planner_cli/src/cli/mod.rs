use clap::{Parser, Subcommand};
use planner_core::config::canonicalize_key;
use planner_core::error::AppError;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

#[derive(Parser, Debug)]
#[command(author, version, about = "Tasks with recurring schedules", long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Act as this user (falls back to PLANNER_USER, then the config file)
    #[arg(long, global = true, value_name = "USER")]
    pub user: Option<String>,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a new task
    ///
    /// Example: planner add "Pay rent" --due 2026-03-01 --recur monthly
    Add {
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_name = "LOW|MEDIUM|HIGH|URGENT")]
        priority: Option<String>,
        /// Due date, RFC3339 or YYYY-MM-DD
        #[arg(long, value_name = "DATE")]
        due: Option<String>,
        /// Recurrence rule, e.g. weekly, weekly:1,3, biweekly, monthly
        #[arg(long, value_name = "RULE")]
        recur: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        goal: Option<String>,
    },
    /// Show details of a task
    ///
    /// Example: planner show task-1
    Show { id: String },
    /// List tasks
    ///
    /// Example: planner list --status todo
    List {
        #[arg(long, value_name = "STATUS")]
        status: Option<String>,
    },
    /// Edit a task's fields
    ///
    /// Example: planner edit task-1 --title "Pay rent" --clear-due
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        #[arg(long)]
        clear_description: bool,
        #[arg(long, value_name = "LOW|MEDIUM|HIGH|URGENT")]
        priority: Option<String>,
        #[arg(long, value_name = "DATE", conflicts_with = "clear_due")]
        due: Option<String>,
        #[arg(long)]
        clear_due: bool,
        #[arg(long, conflicts_with = "clear_category")]
        category: Option<String>,
        #[arg(long)]
        clear_category: bool,
        #[arg(long, conflicts_with = "clear_context")]
        context: Option<String>,
        #[arg(long)]
        clear_context: bool,
        #[arg(long, conflicts_with = "clear_goal")]
        goal: Option<String>,
        #[arg(long)]
        clear_goal: bool,
    },
    /// Move a task to IN_PROGRESS
    ///
    /// Example: planner start task-1
    Start { id: String },
    /// Move a task back to TODO
    ///
    /// Example: planner reopen task-1
    Reopen { id: String },
    /// Mark a task as done, spawning the next occurrence of recurring tasks
    ///
    /// Example: planner done task-1
    Done { id: String },
    /// Set a task's status
    ///
    /// Example: planner status task-1 in_progress
    Status { id: String, status: String },
    /// Delete a task
    ///
    /// Example: planner delete task-1
    Delete { id: String },
    /// Show a task and the tasks it was spawned from
    ///
    /// Example: planner chain task-3
    Chain { id: String },
    /// Manage a task's recurrence rule
    Recur {
        #[command(subcommand)]
        recur: RecurCommand,
    },
    /// Compute next occurrences of a rule without touching any task
    ///
    /// Example: planner next weekly:3 2026-02-23
    Next {
        rule: String,
        date: String,
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum RecurCommand {
    /// Attach or replace a recurrence rule
    ///
    /// Example: planner recur set task-1 weekly:1,3
    Set { id: String, rule: String },
    /// Remove a recurrence rule
    ///
    /// Example: planner recur clear task-1
    Clear { id: String },
    /// Preview upcoming occurrences from the task's due date
    ///
    /// Example: planner recur preview task-1 --count 4
    Preview {
        id: String,
        #[arg(long, default_value_t = 3)]
        count: usize,
    },
}

/// Parse an RFC3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_date_arg(raw: &str) -> Result<OffsetDateTime, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("date is required"));
    }

    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(parsed);
    }

    Date::parse(trimmed, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| AppError::invalid_input("date must be RFC3339 or YYYY-MM-DD"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    User,
    Theme,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let field = canonicalize_key(key_raw);
    if field.is_empty() {
        return Err("override key cannot be empty".to_string());
    }

    let target = match field.as_str() {
        "user" => ConfigOverrideTarget::User,
        "theme" => ConfigOverrideTarget::Theme,
        other => return Err(format!("unknown config field '{other}'")),
    };

    Ok(ParsedConfigOverride { target, value })
}
