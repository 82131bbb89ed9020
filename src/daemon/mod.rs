use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::Utc;
use collection::collector::ActivityCollector;
use events::ActivityEvent;
use recorder::{SessionRecorder, TrackingModule};
use storage::session_store::SessionStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    exclusion::{pattern::PatternCache, ExclusionPolicy},
    utils::{
        clock::{Clock, DefaultClock},
        dir::config_file_path,
    },
    window_api::{GenericWindowManager, WindowManager},
};

pub mod args;
pub mod collection;
pub mod config_watch;
pub mod events;
pub mod recorder;
pub mod shutdown;
pub mod storage;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A poll gap beyond this is treated as the machine having slept.
const DEFAULT_SUSPEND_GAP: chrono::Duration = chrono::Duration::seconds(30);

/// In-flight transitions get this long to settle after a shutdown signal
/// before the daemon stops waiting for them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    std::env::set_current_dir("/")?;

    // Storage initialization is the one failure the daemon cannot run past.
    let store = Arc::new(SessionStore::open(&dir)?);

    // Open rows at startup survived an unclean shutdown; their real end time
    // is unknown.
    match store.delete_orphaned() {
        Ok(0) => {}
        Ok(count) => info!("Deleted {count} orphaned sessions (unknown end time)"),
        Err(e) => error!("Failed to delete orphaned sessions {e}"),
    }

    let patterns = Arc::new(PatternCache::default());
    let config_path = config_file_path(&dir);
    let policy = Arc::new(ExclusionPolicy::load(&config_path, patterns.clone()));
    let (apps, windows) = policy.rule_counts();
    info!("Exclusion rules loaded: {apps} apps, {windows} window rules");

    let (sender, receiver) = mpsc::channel::<ActivityEvent>(10);
    let manager = GenericWindowManager::new()?;
    let shutdown_token = CancellationToken::new();

    let collector = create_collector(sender.clone(), manager, &shutdown_token, DefaultClock);
    let tracker = create_tracker(store.clone(), policy, receiver, DefaultClock);

    // Hot reload is best effort. Without it the daemon still tracks with the
    // rules loaded above.
    let reload = match config_watch::watch_config(
        config_path,
        sender,
        patterns,
        shutdown_token.clone(),
        Box::new(DefaultClock),
    ) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("{e}. Config changes will not be detected automatically");
            None
        }
    };
    let (_watcher, reload_module) = reload.unzip();
    let reload_task = async move {
        match reload_module {
            Some(module) => module.run().await,
            None => Ok(()),
        }
    };

    let run_all = async {
        let (collection_result, tracking_result, reload_result) =
            tokio::join!(collector.run(), tracker.run(), reload_task);

        if let Err(collection_result) = collection_result {
            error!("Collection module got an error {:?}", collection_result);
        }
        if let Err(tracking_result) = tracking_result {
            error!("Tracking module got an error {:?}", tracking_result);
        }
        if let Err(reload_result) = reload_result {
            error!("Config reload module got an error {:?}", reload_result);
        }
    };

    tokio::select! {
        _ = run_all => {}
        _ = shutdown_with_grace(shutdown_token.clone()) => {
            error!("Shutdown grace period expired, abandoning in-flight work");
        }
    }

    // Fallback that needs no in-memory state: close whatever is still open in
    // storage at the shutdown instant. After a clean drain this finds nothing.
    match store.close_all_open(Utc::now()) {
        Ok(0) => {}
        Ok(count) => info!("Closed {count} open sessions"),
        Err(e) => error!("Failed to close open sessions {e}"),
    }

    Ok(())
}

async fn shutdown_with_grace(token: CancellationToken) {
    shutdown::detect_shutdown(token).await;
    tokio::time::sleep(SHUTDOWN_GRACE).await;
}

fn create_collector(
    sender: mpsc::Sender<ActivityEvent>,
    manager: impl WindowManager + 'static,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> ActivityCollector {
    ActivityCollector::new(
        sender,
        Box::new(manager),
        shutdown_token.clone(),
        DEFAULT_POLL_INTERVAL,
        DEFAULT_SUSPEND_GAP,
        Box::new(clock),
    )
}

fn create_tracker(
    store: Arc<SessionStore>,
    policy: Arc<ExclusionPolicy>,
    receiver: mpsc::Receiver<ActivityEvent>,
    clock: impl Clock,
) -> TrackingModule<SessionStore> {
    TrackingModule::new(
        receiver,
        SessionRecorder::new(store, policy, Box::new(clock)),
    )
}

#[cfg(test)]
mod daemon_tests {
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::{sync::mpsc, time::Instant};
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{create_collector, create_tracker, events::ActivityEvent},
        exclusion::{pattern::PatternCache, ExclusionPolicy},
        utils::{clock::Clock, logging::TEST_LOGGING},
        window_api::{ActivityInfo, MockWindowManager},
    };

    use super::*;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn test_items() -> Vec<ActivityInfo> {
        vec![
            ActivityInfo {
                app_id: "/usr/bin/editor".into(),
                app_name: "editor".into(),
                window_title: Some("a.rs".into()),
            },
            ActivityInfo {
                app_id: "/usr/bin/editor".into(),
                app_name: "editor".into(),
                window_title: Some("a.rs".into()),
            },
            ActivityInfo {
                app_id: "/usr/bin/browser".into(),
                app_name: "browser".into(),
                window_title: Some("news".into()),
            },
        ]
    }

    #[derive(Clone)]
    struct TestClock {
        start_time: DateTime<Utc>,
        reference: Instant,
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Utc> {
            self.start_time + self.reference.elapsed()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }

        async fn sleep_until(&self, instant: tokio::time::Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    /// End-to-end smoke test through the collector and tracker: focus changes
    /// observed by the window manager become closed session rows.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let mut mock_window_manager = MockWindowManager::new();
        let mut items = test_items().into_iter().cycle();
        mock_window_manager
            .expect_get_foreground()
            .returning(move || Ok(items.next().unwrap()))
            .times(..7);

        let shutdown_token = CancellationToken::new();

        let (sender, receiver) = mpsc::channel::<ActivityEvent>(10);
        let test_clock = TestClock {
            start_time: Utc.from_utc_datetime(&TEST_START_DATE),
            reference: Instant::now(),
        };

        let collector = create_collector(
            sender,
            mock_window_manager,
            &shutdown_token,
            test_clock.clone(),
        );

        let dir = tempdir()?;
        let store = Arc::new(SessionStore::open(dir.path())?);
        let policy = Arc::new(ExclusionPolicy::default_policy(Arc::new(
            PatternCache::default(),
        )));
        let tracker = create_tracker(store.clone(), policy, receiver, test_clock.clone());

        let (_, collection_result, tracking_result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(3600)).await;
                shutdown_token.cancel()
            },
            collector.run(),
            tracker.run(),
        );

        collection_result?;
        tracking_result?;

        // Polls at 0s/1s/2s/3s over the cycling items produce three focus
        // changes; the tracker close-out leaves nothing open.
        let day_start = Utc.from_utc_datetime(&TEST_START_DATE);
        let sessions = store.fetch_range(day_start, day_start + chrono::Duration::days(1))?;
        assert_eq!(sessions.len(), 3);
        assert!(sessions.iter().all(|session| session.ended_at.is_some()));
        assert!(store.fetch_current()?.is_none());

        Ok(())
    }
}
