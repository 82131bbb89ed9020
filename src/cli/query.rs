use std::fmt::Display;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use now::DateTimeNow;

use crate::{
    daemon::storage::{entities::SearchFilter, session_store::SessionStore},
    utils::{
        dir::create_application_default_path,
        time::{local_day_bounds, next_day_start},
    },
};

use super::{output, Args};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct RangeArgs {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\", \"12 AM 16/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\", \"12 AM 16/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Take inputs as whole days. For example if start and end are both 15/03/2025 this option allows to extract the whole day"
    )]
    treat_as_days: bool,
}

impl RangeArgs {
    /// Resolves to a UTC range, or `None` when no bounds were given at all.
    fn resolve(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        if self.start_date.is_none() && self.end_date.is_none() && !self.treat_as_days {
            return Ok(None);
        }

        let dialect: chrono_english::Dialect = self.date_style.into();
        let mut start = match self.start_date.as_deref() {
            Some(v) => parse_bound(v, dialect)?,
            None => Local::now().beginning_of_day(),
        };
        let mut end = match self.end_date.as_deref() {
            Some(v) => parse_bound(v, dialect)?,
            None => Local::now(),
        };
        if self.treat_as_days {
            start = start.beginning_of_day();
            end = next_day_start(end);
        }

        Ok(Some((
            start.with_timezone(&Utc),
            end.with_timezone(&Utc),
        )))
    }

    /// Like [Self::resolve] but defaults to the current local day.
    fn resolve_or_today(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        match self.resolve()? {
            Some(range) => Ok(range),
            None => Ok(local_day_bounds(Local::now())),
        }
    }
}

fn parse_bound(value: &str, dialect: chrono_english::Dialect) -> Result<DateTime<Local>> {
    match parse_date_string(value, Local::now(), dialect) {
        Ok(v) => Ok(v.with_timezone(&Local)),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate date {value:?}: {e}"),
            )
            .into()),
    }
}

fn open_store() -> Result<SessionStore> {
    Ok(SessionStore::open(&create_application_default_path()?)?)
}

/// Shows what is being tracked right now and how much attention today got.
pub fn process_status_command() -> Result<()> {
    let store = open_store()?;
    let now = Local::now();
    let (start, end) = local_day_bounds(now);
    let current = store.fetch_current()?;
    let today_total = store.total_seconds(start, end, now.with_timezone(&Utc))?;
    output::print_status(current.as_ref(), today_total, now.with_timezone(&Utc));
    Ok(())
}

#[derive(Debug, Parser)]
pub struct SummaryCommand {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(short, long, help = "Group by window title instead of application")]
    window: bool,
    #[arg(long, help = "Output as JSON")]
    json: bool,
}

/// Command to process `summary`. Aggregates recorded attention per app or per
/// window over a range, defaulting to the current day.
pub fn process_summary_command(
    SummaryCommand {
        range,
        window,
        json,
    }: SummaryCommand,
) -> Result<()> {
    let store = open_store()?;
    let (start, end) = range.resolve_or_today()?;
    // One `now` for the whole query keeps open sessions consistent across rows.
    let now = Utc::now();

    if window {
        let summaries = store.summarize_by_window(start, end, now)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        } else {
            output::print_window_summaries(&summaries, start, end);
        }
    } else {
        let summaries = store.summarize_by_app(start, end, now)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        } else {
            output::print_app_summaries(&summaries, start, end);
        }
    }
    Ok(())
}

#[derive(Debug, Parser)]
pub struct LogCommand {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(short, long, help = "Match sessions whose app name or title contains this text")]
    query: Option<String>,
    #[arg(short, long, help = "Only sessions of apps whose name contains this text")]
    app: Option<String>,
    #[arg(short, long, default_value_t = 50, help = "Maximum number of sessions shown")]
    limit: usize,
    #[arg(long, help = "Output as JSON")]
    json: bool,
}

/// Command to process `log`. Lists recent sessions, optionally narrowed by
/// free text, app and time range.
pub fn process_log_command(
    LogCommand {
        range,
        query,
        app,
        limit,
        json,
    }: LogCommand,
) -> Result<()> {
    let store = open_store()?;
    let range = range.resolve()?;

    let sessions = if query.is_none() && app.is_none() && range.is_none() {
        store.fetch_recent(limit)?
    } else {
        store.search_sessions(&SearchFilter {
            query,
            app_name: app,
            range,
            limit: Some(limit),
        })?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else {
        output::print_sessions(&sessions, Utc::now());
    }
    Ok(())
}

#[derive(Debug, Parser)]
pub struct DeleteCommand {
    #[arg(long, help = "Delete a single session by id", conflicts_with_all = ["app", "all"])]
    id: Option<i64>,
    #[arg(long, help = "Delete sessions of apps whose name contains this text")]
    app: Option<String>,
    #[command(flatten)]
    range: RangeArgs,
    #[arg(long, help = "Delete the whole history", conflicts_with = "app")]
    all: bool,
    #[arg(short = 'y', long, help = "Skip the confirmation prompt")]
    yes: bool,
}

/// Command to process `delete`. Every variant except `--id` asks for
/// confirmation first since there is no undo.
pub fn process_delete_command(
    DeleteCommand {
        id,
        app,
        range,
        all,
        yes,
    }: DeleteCommand,
) -> Result<()> {
    let store = open_store()?;
    let range = range.resolve()?;

    if let Some(id) = id {
        let deleted = store.delete_by_id(id)?;
        println!("{}", if deleted { "Deleted 1 session" } else { "No such session" });
        return Ok(());
    }

    let description = match (&app, range, all) {
        (Some(app), _, _) => format!("sessions of apps matching {app:?}"),
        (None, Some(_), false) => "sessions in the given range".to_string(),
        (None, _, true) => "the whole history".to_string(),
        (None, None, false) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::MissingRequiredArgument,
                    "Specify what to delete: --id, --app, --all or a range",
                )
                .into());
        }
    };
    if !yes && !confirm(&format!("Delete {description}?"))? {
        println!("Aborted");
        return Ok(());
    }

    let deleted = match (app, range, all) {
        (Some(app), range, _) => store.delete_by_app_name(&app, range)?,
        (None, _, true) => store.delete_all()?,
        (None, Some((start, end)), false) => store.delete_by_range(start, end)?,
        (None, None, false) => unreachable!("rejected above"),
    };
    println!("Deleted {deleted} sessions");
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
