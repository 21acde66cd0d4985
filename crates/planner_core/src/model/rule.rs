use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Ordered set of weekday numbers, 0 = Sunday through 6 = Saturday.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdaySet(BTreeSet<u8>);

impl WeekdaySet {
    pub fn new<I: IntoIterator<Item = u8>>(days: I) -> Result<Self, AppError> {
        let mut set = BTreeSet::new();
        for day in days {
            if day > 6 {
                return Err(AppError::invalid_input(format!(
                    "weekday {day} is out of range (0-6)"
                )));
            }
            set.insert(day);
        }
        Ok(Self(set))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    pub fn first(&self) -> Option<u8> {
        self.0.first().copied()
    }

    /// Smallest day in the set strictly after `day`.
    pub fn first_after(&self, day: u8) -> Option<u8> {
        self.0.range(day.saturating_add(1)..).next().copied()
    }
}

impl TryFrom<Vec<u8>> for WeekdaySet {
    type Error = AppError;

    fn try_from(days: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(days)
    }
}

impl From<WeekdaySet> for Vec<u8> {
    fn from(set: WeekdaySet) -> Self {
        set.0.into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frequency", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceRule {
    Weekly {
        #[serde(
            rename = "daysOfWeek",
            default,
            skip_serializing_if = "WeekdaySet::is_empty"
        )]
        days_of_week: WeekdaySet,
    },
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl RecurrenceRule {
    pub fn weekly() -> Self {
        Self::Weekly {
            days_of_week: WeekdaySet::default(),
        }
    }

    pub fn weekly_on<I: IntoIterator<Item = u8>>(days: I) -> Result<Self, AppError> {
        Ok(Self::Weekly {
            days_of_week: WeekdaySet::new(days)?,
        })
    }

    pub fn frequency_label(&self) -> &'static str {
        match self {
            Self::Weekly { .. } => "WEEKLY",
            Self::Biweekly => "BIWEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Quarterly => "QUARTERLY",
            Self::Yearly => "YEARLY",
        }
    }
}

/// Accepts `weekly`, `weekly:1,3`, `biweekly`, `monthly`, `quarterly` and
/// `yearly`, case-insensitively.
impl FromStr for RecurrenceRule {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (frequency, days) = match trimmed.split_once(':') {
            Some((frequency, days)) => (frequency.trim(), Some(days.trim())),
            None => (trimmed, None),
        };

        let rule = match frequency.to_ascii_lowercase().as_str() {
            "weekly" => {
                let days = match days {
                    Some(list) if !list.is_empty() => parse_weekday_list(list)?,
                    _ => Vec::new(),
                };
                return Self::weekly_on(days);
            }
            "biweekly" => Self::Biweekly,
            "monthly" => Self::Monthly,
            "quarterly" => Self::Quarterly,
            "yearly" => Self::Yearly,
            "" => return Err(AppError::malformed_rule("frequency is required")),
            other => {
                return Err(AppError::malformed_rule(format!(
                    "unknown frequency '{other}'"
                )));
            }
        };

        if days.is_some() {
            return Err(AppError::malformed_rule(format!(
                "{} rules do not take weekdays",
                rule.frequency_label()
            )));
        }

        Ok(rule)
    }
}

fn parse_weekday_list(list: &str) -> Result<Vec<u8>, AppError> {
    list.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u8>()
                .map_err(|_| AppError::invalid_input(format!("invalid weekday '{part}'")))
        })
        .collect()
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weekly { days_of_week } if !days_of_week.is_empty() => {
                let days: Vec<String> = days_of_week.iter().map(|day| day.to_string()).collect();
                write!(f, "weekly:{}", days.join(","))
            }
            other => f.write_str(&other.frequency_label().to_ascii_lowercase()),
        }
    }
}
