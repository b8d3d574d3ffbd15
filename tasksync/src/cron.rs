//! Five-field cron expressions expanded into scheduler triggers
//!
//! Fields are `minute hour day-of-month month day-of-week`. Each field takes
//! `*`, numbers, names (`JAN`..`DEC`, `SUN`..`SAT`), ranges `a-b`, steps
//! (`*/n`, `a-b/n`, `a/n`) and comma lists. Day-of-month and day-of-week also
//! accept `?`. A field is restricted when its values leave out part of its
//! range, however it is spelled. As in classic cron, when both day fields are
//! restricted the job fires on days matching either of them, unless one of
//! them starts with `*`, in which case both must match.

use std::collections::BTreeSet;

use chrono::Weekday;
use taskbelt_core::{DaySet, MonthSet, TimeOfDay, TriggerDescriptor, WeekdaySet};

use crate::error::DirectiveError;

/// Upper bound on the triggers a single task definition may carry
pub const MAX_CRON_TRIGGERS: usize = 48;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

struct FieldBounds {
    name: &'static str,
    min: u8,
    max: u8,
    /// Symbolic names and the value of the first one
    names: &'static [&'static str],
    name_base: u8,
    allows_question: bool,
}

const MINUTE: FieldBounds = FieldBounds {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
    allows_question: false,
};
const HOUR: FieldBounds = FieldBounds {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    name_base: 0,
    allows_question: false,
};
const DAY_OF_MONTH: FieldBounds = FieldBounds {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    name_base: 0,
    allows_question: true,
};
const MONTH: FieldBounds = FieldBounds {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    name_base: 1,
    allows_question: false,
};
// 0 and 7 are both Sunday
const DAY_OF_WEEK: FieldBounds = FieldBounds {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &WEEKDAY_NAMES,
    name_base: 0,
    allows_question: true,
};

/// One parsed field
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    values: BTreeSet<u8>,
    /// Written starting with `*` or as `?`
    starred: bool,
}

impl Field {
    fn covers(&self, bounds: &FieldBounds) -> bool {
        (bounds.min..=bounds.max).all(|v| self.values.contains(&v))
    }
}

fn parse_value(text: &str, bounds: &FieldBounds) -> Result<u8, String> {
    let upper = text.to_ascii_uppercase();
    if let Some(index) = bounds.names.iter().position(|name| *name == upper) {
        return Ok(bounds.name_base + index as u8);
    }

    let value: u8 = text
        .parse()
        .map_err(|_| format!("{} value '{}' is not a number", bounds.name, text))?;
    if value < bounds.min || value > bounds.max {
        return Err(format!(
            "{} value {} is out of range {}-{}",
            bounds.name, value, bounds.min, bounds.max
        ));
    }
    Ok(value)
}

fn parse_field(text: &str, bounds: &FieldBounds) -> Result<Field, String> {
    let starred = text.starts_with('*') || (bounds.allows_question && text == "?");
    if text == "?" && !bounds.allows_question {
        return Err(format!("'?' is not allowed in the {} field", bounds.name));
    }

    let mut values = BTreeSet::new();
    for part in text.split(',') {
        if part.is_empty() {
            return Err(format!("empty list element in {} field", bounds.name));
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u8 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{}' in {} field", step, bounds.name))?;
                if step == 0 {
                    return Err(format!("step must be positive in {} field", bounds.name));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" || range == "?" {
            (bounds.min, bounds.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, bounds)?, parse_value(b, bounds)?)
        } else {
            let value = parse_value(range, bounds)?;
            // `a/n` means every n-th value starting at a
            if step.is_some() {
                (value, bounds.max)
            } else {
                (value, value)
            }
        };

        if start > end {
            return Err(format!(
                "range {}-{} is reversed in {} field",
                start, end, bounds.name
            ));
        }

        for value in (start..=end).step_by(usize::from(step.unwrap_or(1))) {
            values.insert(value);
        }
    }

    Ok(Field { values, starred })
}

fn weekday_from_cron(value: u8) -> Weekday {
    match value % 7 {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        _ => Weekday::Sat,
    }
}

/// Expand a cron expression into the equivalent set of triggers
pub fn expand(expression: &str) -> Result<Vec<TriggerDescriptor>, DirectiveError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(DirectiveError::invalid_cron(
            expression,
            format!("expected 5 fields, found {}", fields.len()),
        ));
    }

    let invalid = |reason: String| DirectiveError::invalid_cron(expression, reason);
    let minutes = parse_field(fields[0], &MINUTE).map_err(invalid)?;
    let hours = parse_field(fields[1], &HOUR).map_err(invalid)?;
    let days = parse_field(fields[2], &DAY_OF_MONTH).map_err(invalid)?;
    let months = parse_field(fields[3], &MONTH).map_err(invalid)?;
    let weekdays = parse_field(fields[4], &DAY_OF_WEEK).map_err(invalid)?;

    let mut month_set = MonthSet::default();
    for month in &months.values {
        month_set.insert(*month)?;
    }
    let mut day_set = DaySet::default();
    for day in &days.values {
        day_set.insert(*day)?;
    }
    let weekday_set: WeekdaySet = weekdays.values.iter().map(|v| weekday_from_cron(*v)).collect();

    let days_restricted = !days.covers(&DAY_OF_MONTH);
    // 7 duplicates Sunday
    let weekdays_restricted = weekday_set.len() < 7;
    if days_restricted && weekdays_restricted && (days.starred || weekdays.starred) {
        return Err(invalid(
            "day-of-month and day-of-week must both match, which no trigger can express"
                .to_string(),
        ));
    }

    let mut triggers = Vec::new();

    if hours.covers(&HOUR) && !days_restricted && !weekdays_restricted && month_set.is_all() {
        for minute in &minutes.values {
            triggers.push(TriggerDescriptor::hourly(*minute)?);
        }
    } else {
        for hour in &hours.values {
            for minute in &minutes.values {
                let time = TimeOfDay::new(*hour, *minute)?;
                match (days_restricted, weekdays_restricted) {
                    (false, false) if month_set.is_all() => {
                        triggers.push(TriggerDescriptor::Daily { time });
                    }
                    (false, false) => triggers.push(TriggerDescriptor::Monthly {
                        days: DaySet::all(),
                        months: month_set,
                        time,
                    }),
                    (true, false) => triggers.push(TriggerDescriptor::Monthly {
                        days: day_set,
                        months: month_set,
                        time,
                    }),
                    (false, true) => triggers.push(weekday_trigger(weekday_set, month_set, time)),
                    (true, true) => {
                        triggers.push(TriggerDescriptor::Monthly {
                            days: day_set,
                            months: month_set,
                            time,
                        });
                        triggers.push(weekday_trigger(weekday_set, month_set, time));
                    }
                }
            }
        }
    }

    if triggers.len() > MAX_CRON_TRIGGERS {
        return Err(invalid(format!(
            "expands to {} triggers, at most {} are supported",
            triggers.len(),
            MAX_CRON_TRIGGERS
        )));
    }

    Ok(triggers)
}

fn weekday_trigger(days: WeekdaySet, months: MonthSet, time: TimeOfDay) -> TriggerDescriptor {
    if months.is_all() {
        TriggerDescriptor::Weekly { days, time }
    } else {
        TriggerDescriptor::MonthlyOnWeekdays { days, months, time }
    }
}
