use ansi_term::Style;
use chrono::{DateTime, Duration, Local, Utc};

use crate::daemon::storage::entities::{AppSummary, Session, WindowSummary};

pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}

fn format_range(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let start = start.with_timezone(&Local);
    let end = end.with_timezone(&Local);
    format!(
        "{} - {}",
        start.format("%x %H:%M"),
        end.format("%x %H:%M")
    )
}

fn header(text: &str) {
    println!("{}", Style::new().bold().paint(text));
}

pub fn print_status(current: Option<&Session>, today_total_seconds: i64, now: DateTime<Utc>) {
    match current {
        Some(session) => {
            println!(
                "Tracking: {} - {} (for {})",
                session.app_name,
                session.window_title.as_deref().unwrap_or("(no title)"),
                format_duration(session.elapsed(now)),
            );
        }
        None => println!("Tracking: nothing"),
    }
    println!(
        "Today: {}",
        format_duration(Duration::seconds(today_total_seconds))
    );
}

pub fn print_app_summaries(summaries: &[AppSummary], start: DateTime<Utc>, end: DateTime<Utc>) {
    if summaries.is_empty() {
        println!("No activity recorded for {}", format_range(start, end));
        return;
    }
    header(&format!("Usage for {}", format_range(start, end)));
    for summary in summaries {
        println!(
            "{}\t{} sessions\t{}",
            format_duration(Duration::seconds(summary.total_seconds)),
            summary.session_count,
            summary.app_name,
        );
    }
}

pub fn print_window_summaries(
    summaries: &[WindowSummary],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) {
    if summaries.is_empty() {
        println!("No activity recorded for {}", format_range(start, end));
        return;
    }
    header(&format!("Window usage for {}", format_range(start, end)));
    for summary in summaries {
        let title = if summary.window_title.is_empty() {
            "(no title)"
        } else {
            &summary.window_title
        };
        println!(
            "{}\t{} sessions\t{}\t{}",
            format_duration(Duration::seconds(summary.total_seconds)),
            summary.session_count,
            summary.app_name,
            title,
        );
    }
}

pub fn print_sessions(sessions: &[Session], now: DateTime<Utc>) {
    if sessions.is_empty() {
        println!("No sessions found");
        return;
    }
    for session in sessions {
        let started = session.started_at.with_timezone(&Local);
        let end_label = match session.ended_at {
            Some(_) => format_duration(session.elapsed(now)),
            None => format!("{} (open)", format_duration(session.elapsed(now))),
        };
        println!(
            "{}\t{}\t{}\t{}\t{}",
            session.id.unwrap_or(-1),
            started.format("%x %H:%M:%S"),
            end_label,
            session.app_name,
            session.window_title.as_deref().unwrap_or("(no title)"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::seconds(42)), "42s");
        assert_eq!(format_duration(Duration::seconds(62)), "1m2s");
        assert_eq!(format_duration(Duration::seconds(3723)), "1h2m3s");
    }
}
