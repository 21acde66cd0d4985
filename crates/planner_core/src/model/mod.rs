mod rule;
mod task;

pub use rule::{RecurrenceRule, WeekdaySet};
pub use task::{Priority, Task, TaskDraft, TaskStatus};
