//! Normalized schedule rules shared by the directive parser and the scheduler backends

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TriggerError;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Wall-clock time a calendar trigger fires at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, TriggerError> {
        if hour > 23 {
            return Err(TriggerError::Hour(hour));
        }
        if minute > 59 {
            return Err(TriggerError::Minute(minute));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Set of weekdays, bit `n` is `Weekday::num_days_from_monday() == n`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn single(day: Weekday) -> Self {
        let mut set = Self::default();
        set.insert(day);
        set
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Weekdays in Monday-first order
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEKDAYS.into_iter().filter(move |day| self.contains(*day))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = Self::default();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

/// Set of days of the month (1..=31)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DaySet(u32);

impl DaySet {
    pub fn single(day: u8) -> Result<Self, TriggerError> {
        let mut set = Self::default();
        set.insert(day)?;
        Ok(set)
    }

    pub fn all() -> Self {
        Self(0xFFFF_FFFE)
    }

    pub fn insert(&mut self, day: u8) -> Result<(), TriggerError> {
        if !(1..=31).contains(&day) {
            return Err(TriggerError::DayOfMonth(day));
        }
        self.0 |= 1 << day;
        Ok(())
    }

    pub fn contains(&self, day: u8) -> bool {
        (1..=31).contains(&day) && self.0 & (1 << day) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=31u8).filter(move |day| self.contains(*day))
    }
}

/// Set of months (1..=12)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MonthSet(u16);

impl MonthSet {
    pub fn all() -> Self {
        Self(0x1FFE)
    }

    pub fn insert(&mut self, month: u8) -> Result<(), TriggerError> {
        if !(1..=12).contains(&month) {
            return Err(TriggerError::Month(month));
        }
        self.0 |= 1 << month;
        Ok(())
    }

    pub fn contains(&self, month: u8) -> bool {
        (1..=12).contains(&month) && self.0 & (1 << month) != 0
    }

    pub fn is_all(&self) -> bool {
        *self == Self::all()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=12u8).filter(move |month| self.contains(*month))
    }
}

/// English month name for a 1-based month number
pub fn month_name(month: u8) -> &'static str {
    MONTH_NAMES
        .get(usize::from(month).wrapping_sub(1))
        .copied()
        .unwrap_or("Unknown")
}

/// A concrete scheduling rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerDescriptor {
    /// Every hour at `minute` past the hour
    Hourly { minute: u8 },
    Daily { time: TimeOfDay },
    Weekly { days: WeekdaySet, time: TimeOfDay },
    /// Days are not checked against the length of each month
    Monthly {
        days: DaySet,
        months: MonthSet,
        time: TimeOfDay,
    },
    /// Every listed weekday of the listed months
    MonthlyOnWeekdays {
        days: WeekdaySet,
        months: MonthSet,
        time: TimeOfDay,
    },
}

impl TriggerDescriptor {
    pub fn hourly(minute: u8) -> Result<Self, TriggerError> {
        if minute > 59 {
            return Err(TriggerError::Minute(minute));
        }
        Ok(Self::Hourly { minute })
    }

    pub fn daily(time: TimeOfDay) -> Self {
        Self::Daily { time }
    }

    pub fn weekly(day: Weekday, time: TimeOfDay) -> Self {
        Self::Weekly {
            days: WeekdaySet::single(day),
            time,
        }
    }

    pub fn monthly(day: u8, time: TimeOfDay) -> Result<Self, TriggerError> {
        Ok(Self::Monthly {
            days: DaySet::single(day)?,
            months: MonthSet::all(),
            time,
        })
    }

    /// Time of day for calendar triggers, `None` for hourly ones
    pub fn time(&self) -> Option<TimeOfDay> {
        match self {
            Self::Hourly { .. } => None,
            Self::Daily { time }
            | Self::Weekly { time, .. }
            | Self::Monthly { time, .. }
            | Self::MonthlyOnWeekdays { time, .. } => Some(*time),
        }
    }
}

fn join_weekdays(days: &WeekdaySet) -> String {
    days.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(",")
}

fn join_months(months: &MonthSet) -> String {
    months
        .iter()
        .map(|m| &month_name(m)[..3])
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for TriggerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hourly { minute } => write!(f, "hourly at :{:02}", minute),
            Self::Daily { time } => write!(f, "daily at {}", time),
            Self::Weekly { days, time } => {
                write!(f, "weekly on {} at {}", join_weekdays(days), time)
            }
            Self::Monthly { days, months, time } => {
                let days = days.iter().map(|d| d.to_string()).collect::<Vec<_>>();
                write!(f, "monthly on day {}", days.join(","))?;
                if !months.is_all() {
                    write!(f, " in {}", join_months(months))?;
                }
                write!(f, " at {}", time)
            }
            Self::MonthlyOnWeekdays { days, months, time } => write!(
                f,
                "monthly on {} in {} at {}",
                join_weekdays(days),
                join_months(months),
                time
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_of_day_bounds() {
        assert!(TimeOfDay::new(23, 59).is_ok());
        assert_eq!(TimeOfDay::new(24, 0), Err(TriggerError::Hour(24)));
        assert_eq!(TimeOfDay::new(12, 60), Err(TriggerError::Minute(60)));
    }

    #[test]
    fn test_sets_reject_out_of_range_values() {
        assert_eq!(DaySet::single(0), Err(TriggerError::DayOfMonth(0)));
        assert_eq!(DaySet::single(32), Err(TriggerError::DayOfMonth(32)));
        assert_eq!(MonthSet::default().insert(13), Err(TriggerError::Month(13)));
        assert_eq!(DaySet::all().iter().count(), 31);
        assert_eq!(MonthSet::all().iter().count(), 12);
    }

    #[test]
    fn test_display() {
        let time = TimeOfDay::new(9, 5).unwrap();
        assert_eq!(TriggerDescriptor::hourly(7).unwrap().to_string(), "hourly at :07");
        assert_eq!(TriggerDescriptor::daily(time).to_string(), "daily at 09:05");
        assert_eq!(
            TriggerDescriptor::weekly(Weekday::Wed, time).to_string(),
            "weekly on Wed at 09:05"
        );
        assert_eq!(
            TriggerDescriptor::monthly(15, time).unwrap().to_string(),
            "monthly on day 15 at 09:05"
        );
    }
}
