//! Task Scheduler 1.2 XML definitions

use chrono::Weekday;

use super::types::{RunAs, TaskRegistration};
use crate::trigger::{month_name, DaySet, MonthSet, TimeOfDay, TriggerDescriptor, WeekdaySet};

const TASK_NAMESPACE: &str = "http://schemas.microsoft.com/windows/2004/02/mit/task";

/// Date every trigger starts from; only the time part matters
const START_DATE: &str = "2000-01-01";

/// Escape text for element content
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn weekday_element(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn start_boundary(time: TimeOfDay) -> String {
    format!("{}T{}:00", START_DATE, time)
}

fn days_of_week(out: &mut String, days: &WeekdaySet) {
    out.push_str("<DaysOfWeek>");
    for day in days.iter() {
        out.push_str(&format!("<{} />", weekday_element(day)));
    }
    out.push_str("</DaysOfWeek>");
}

fn days_of_month(out: &mut String, days: &DaySet) {
    out.push_str("<DaysOfMonth>");
    for day in days.iter() {
        out.push_str(&format!("<Day>{}</Day>", day));
    }
    out.push_str("</DaysOfMonth>");
}

fn months(out: &mut String, months: &MonthSet) {
    out.push_str("<Months>");
    for month in months.iter() {
        out.push_str(&format!("<{} />", month_name(month)));
    }
    out.push_str("</Months>");
}

fn calendar_trigger(out: &mut String, time: TimeOfDay, schedule: &str) {
    out.push_str(&format!(
        "<CalendarTrigger><StartBoundary>{}</StartBoundary><Enabled>true</Enabled>{}</CalendarTrigger>",
        start_boundary(time),
        schedule
    ));
}

/// Render one trigger element
pub fn render_trigger(trigger: &TriggerDescriptor) -> String {
    let mut out = String::new();
    match trigger {
        TriggerDescriptor::Hourly { minute } => {
            out.push_str(&format!(
                "<TimeTrigger><Repetition><Interval>PT1H</Interval><StopAtDurationEnd>false</StopAtDurationEnd></Repetition>\
                 <StartBoundary>{}T00:{:02}:00</StartBoundary><Enabled>true</Enabled></TimeTrigger>",
                START_DATE, minute
            ));
        }
        TriggerDescriptor::Daily { time } => {
            calendar_trigger(
                &mut out,
                *time,
                "<ScheduleByDay><DaysInterval>1</DaysInterval></ScheduleByDay>",
            );
        }
        TriggerDescriptor::Weekly { days, time } => {
            let mut schedule = String::from("<ScheduleByWeek>");
            days_of_week(&mut schedule, days);
            schedule.push_str("<WeeksInterval>1</WeeksInterval></ScheduleByWeek>");
            calendar_trigger(&mut out, *time, &schedule);
        }
        TriggerDescriptor::Monthly {
            days,
            months: month_set,
            time,
        } => {
            let mut schedule = String::from("<ScheduleByMonth>");
            days_of_month(&mut schedule, days);
            months(&mut schedule, month_set);
            schedule.push_str("</ScheduleByMonth>");
            calendar_trigger(&mut out, *time, &schedule);
        }
        TriggerDescriptor::MonthlyOnWeekdays {
            days,
            months: month_set,
            time,
        } => {
            let mut schedule = String::from(
                "<ScheduleByMonthDayOfWeek><Weeks><Week>1</Week><Week>2</Week><Week>3</Week><Week>4</Week><Week>Last</Week></Weeks>",
            );
            days_of_week(&mut schedule, days);
            months(&mut schedule, month_set);
            schedule.push_str("</ScheduleByMonthDayOfWeek>");
            calendar_trigger(&mut out, *time, &schedule);
        }
    }
    out
}

fn logon_type(run_as: &RunAs) -> &'static str {
    match run_as {
        RunAs::System | RunAs::LocalService | RunAs::NetworkService => "ServiceAccount",
        RunAs::User { password: Some(_), .. } => "Password",
        RunAs::User { password: None, .. } => "InteractiveToken",
    }
}

/// Render the complete task definition passed to `Register-ScheduledTask -Xml`
pub fn render(registration: &TaskRegistration) -> String {
    let mut out = String::new();
    out.push_str(&format!("<Task version=\"1.2\" xmlns=\"{}\">", TASK_NAMESPACE));

    out.push_str("<RegistrationInfo>");
    out.push_str(&format!(
        "<Description>{}</Description>",
        escape(&registration.description)
    ));
    if let Some(documentation) = &registration.documentation {
        out.push_str(&format!(
            "<Documentation>{}</Documentation>",
            escape(documentation)
        ));
    }
    out.push_str("</RegistrationInfo>");

    out.push_str("<Triggers>");
    for trigger in &registration.triggers {
        out.push_str(&render_trigger(trigger));
    }
    out.push_str("</Triggers>");

    out.push_str(&format!(
        "<Principals><Principal id=\"Author\"><UserId>{}</UserId><LogonType>{}</LogonType>\
         <RunLevel>HighestAvailable</RunLevel></Principal></Principals>",
        escape(registration.run_as.principal()),
        logon_type(&registration.run_as)
    ));

    out.push_str(
        "<Settings><MultipleInstancesPolicy>IgnoreNew</MultipleInstancesPolicy>\
         <DisallowStartIfOnBatteries>false</DisallowStartIfOnBatteries>\
         <StopIfGoingOnBatteries>false</StopIfGoingOnBatteries>\
         <AllowHardTerminate>true</AllowHardTerminate>\
         <StartWhenAvailable>false</StartWhenAvailable>\
         <AllowStartOnDemand>true</AllowStartOnDemand>\
         <Enabled>true</Enabled><Hidden>false</Hidden>\
         <ExecutionTimeLimit>PT0S</ExecutionTimeLimit></Settings>",
    );

    out.push_str(&format!(
        "<Actions Context=\"Author\"><Exec><Command>{}</Command><WorkingDirectory>{}</WorkingDirectory></Exec></Actions>",
        escape(&registration.executable.to_string_lossy()),
        escape(&registration.working_directory.to_string_lossy())
    ));

    out.push_str("</Task>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn registration(triggers: Vec<TriggerDescriptor>, run_as: RunAs) -> TaskRegistration {
        TaskRegistration {
            folder: "\\Batch\\".to_string(),
            name: "backup".to_string(),
            executable: PathBuf::from("C:\\jobs\\R&D\\backup.bat"),
            working_directory: PathBuf::from("C:\\jobs\\R&D"),
            triggers,
            description: "Synchronized from <jobs>".to_string(),
            documentation: Some("deadbeef".to_string()),
            run_as,
        }
    }

    #[test]
    fn test_render_escapes_and_carries_documentation() {
        let xml = render(&registration(
            vec![TriggerDescriptor::daily(TimeOfDay::new(2, 0).unwrap())],
            RunAs::System,
        ));

        assert!(xml.contains("<Documentation>deadbeef</Documentation>"));
        assert!(xml.contains("<Description>Synchronized from &lt;jobs&gt;</Description>"));
        assert!(xml.contains("<Command>C:\\jobs\\R&amp;D\\backup.bat</Command>"));
        assert!(xml.contains("<UserId>NT AUTHORITY\\SYSTEM</UserId><LogonType>ServiceAccount</LogonType>"));
        assert!(xml.contains("<StartBoundary>2000-01-01T02:00:00</StartBoundary>"));
        assert!(xml.contains("<ScheduleByDay>"));
    }

    #[test]
    fn test_render_hourly_uses_repetition() {
        let xml = render_trigger(&TriggerDescriptor::hourly(45).unwrap());
        assert!(xml.starts_with("<TimeTrigger>"));
        assert!(xml.contains("<Interval>PT1H</Interval>"));
        assert!(xml.contains("T00:45:00"));
    }

    #[test]
    fn test_render_weekly_and_monthly() {
        let time = TimeOfDay::new(6, 30).unwrap();
        let weekly = render_trigger(&TriggerDescriptor::weekly(Weekday::Sat, time));
        assert!(weekly.contains("<DaysOfWeek><Saturday /></DaysOfWeek>"));

        let monthly = render_trigger(&TriggerDescriptor::monthly(31, time).unwrap());
        assert!(monthly.contains("<DaysOfMonth><Day>31</Day></DaysOfMonth>"));
        assert!(monthly.contains("<January />"));
        assert!(monthly.contains("<December />"));
    }

    #[test]
    fn test_password_user_logon_type() {
        let run_as = RunAs::parse("CORP\\svc", Some("pw".to_string())).unwrap();
        let xml = render(&registration(
            vec![TriggerDescriptor::hourly(0).unwrap()],
            run_as,
        ));
        assert!(xml.contains("<LogonType>Password</LogonType>"));
        assert!(!xml.contains("pw<"));
    }

    #[test]
    fn test_render_writes_every_element_in_order() {
        let time = TimeOfDay::new(23, 5).unwrap();
        let mut days = DaySet::single(1).unwrap();
        days.insert(15).unwrap();
        let triggers = vec![
            TriggerDescriptor::Monthly {
                days,
                months: MonthSet::all(),
                time,
            },
            TriggerDescriptor::weekly(Weekday::Mon, time),
        ];
        let xml = render(&registration(triggers, RunAs::NetworkService));

        assert!(xml.starts_with("<Task version=\"1.2\""));
        assert!(xml.ends_with("</Exec></Actions></Task>"));
        assert!(xml.contains("<DaysOfMonth><Day>1</Day><Day>15</Day></DaysOfMonth>"));
        let monthly = xml.find("<ScheduleByMonth>").unwrap();
        let weekly = xml.find("<ScheduleByWeek>").unwrap();
        assert!(monthly < weekly);
        assert!(xml.contains("<WorkingDirectory>C:\\jobs\\R&amp;D</WorkingDirectory>"));
    }
}
