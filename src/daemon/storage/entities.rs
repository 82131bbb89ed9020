use chrono::Duration;
use chrono::Utc;

use chrono::DateTime;
use serde::Deserialize;
use serde::Serialize;

use std::sync::Arc;

/// One contiguous span of attention on an (app, window title) pair. A null
/// `ended_at` means the session is still open; the daemon guarantees at most
/// one such row exists at a time.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct Session {
    /// Assigned by the store on insert, absent before.
    pub id: Option<i64>,
    pub app_id: Arc<str>,
    pub app_name: Arc<str>,
    pub window_title: Option<Arc<str>>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub started_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn open(
        app_id: Arc<str>,
        app_name: Arc<str>,
        window_title: Option<Arc<str>>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            app_id,
            app_name,
            window_title,
            started_at,
            ended_at: None,
        }
    }

    /// Duration of a closed session. `None` while the session is open.
    pub fn duration(&self) -> Option<Duration> {
        self.ended_at
            .map(|ended| (ended - self.started_at).max(Duration::zero()))
    }

    /// Duration with open sessions measured up to `now`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let end = self.ended_at.unwrap_or(now);
        (end - self.started_at).max(Duration::zero())
    }
}

/// Aggregated usage of one application over a query range.
#[derive(PartialEq, Eq, Debug, Serialize, Clone)]
pub struct AppSummary {
    pub app_id: String,
    pub app_name: String,
    pub total_seconds: i64,
    pub session_count: i64,
}

/// Aggregated usage of one (application, window title) pair. Sessions without
/// a title group under the empty string.
#[derive(PartialEq, Eq, Debug, Serialize, Clone)]
pub struct WindowSummary {
    pub app_id: String,
    pub app_name: String,
    pub window_title: String,
    pub total_seconds: i64,
    pub session_count: i64,
}

/// Filters for [SessionStore::search_sessions](super::session_store::SessionStore::search_sessions).
/// `query` is a case-insensitive substring match over app name and window
/// title; `app_name` narrows to apps whose name contains the text.
#[derive(Debug, Default, Clone)]
pub struct SearchFilter {
    pub query: Option<String>,
    pub app_name: Option<String>,
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn duration_clamps_to_zero() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let mut session = Session::open("app".into(), "App".into(), None, start);
        assert_eq!(session.duration(), None);

        // A clock step backwards must not produce negative durations.
        session.ended_at = Some(start - Duration::seconds(5));
        assert_eq!(session.duration(), Some(Duration::zero()));

        session.ended_at = Some(start + Duration::seconds(90));
        assert_eq!(session.duration(), Some(Duration::seconds(90)));
    }

    #[test]
    fn elapsed_uses_now_for_open_sessions() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let session = Session::open("app".into(), "App".into(), None, start);
        let now = start + Duration::seconds(30);
        assert_eq!(session.elapsed(now), Duration::seconds(30));
    }
}
