use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    daemon::events::ActivityEvent,
    exclusion::{pattern::PatternCache, ExclusionPolicy, PolicyDocument},
    utils::clock::Clock,
};

/// Bursts of change notifications inside this window collapse into one reload.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Editors often rewrite files by delete-then-recreate. When the document is
/// gone at notification time, its return is polled on this interval.
const RETRY_INTERVAL: Duration = Duration::from_millis(500);
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
#[error("failed to set up config watch: {0}")]
pub struct WatchSetupError(#[from] notify::Error);

/// Starts the OS watch on the config document and returns the module that
/// consumes its notifications. The returned watcher handle must stay alive as
/// long as the module runs; dropping it releases the watch.
pub fn watch_config(
    path: PathBuf,
    next: mpsc::Sender<ActivityEvent>,
    patterns: Arc<PatternCache>,
    shutdown: CancellationToken,
    clock: Box<dyn Clock>,
) -> Result<(RecommendedWatcher, ConfigReloadModule), WatchSetupError> {
    // A missing document gets a default template, both as a watch target and
    // as a starting point for users.
    if !path.exists() {
        if let Err(e) = PolicyDocument::write_default(&path) {
            warn!("Failed to write default config document at {path:?}: {e}");
        }
    }

    let (change_sender, changes) = mpsc::channel(16);
    let file_name = path.file_name().map(|name| name.to_owned());
    let mut watcher = RecommendedWatcher::new(
        move |event: notify::Result<notify::Event>| {
            let Ok(event) = event else { return };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }
            let ours = event
                .paths
                .iter()
                .any(|changed| changed.file_name() == file_name.as_deref());
            if ours || event.paths.is_empty() {
                // A full queue already means a pending reload.
                let _ = change_sender.try_send(());
            }
        },
        notify::Config::default(),
    )?;

    // The parent directory is watched instead of the file so the watch
    // survives the file being deleted and recreated.
    let watch_root = path.parent().map(PathBuf::from).unwrap_or_else(|| path.clone());
    watcher.watch(&watch_root, RecursiveMode::NonRecursive)?;

    Ok((
        watcher,
        ConfigReloadModule::new(path, changes, next, patterns, shutdown, clock),
    ))
}

/// Turns config-file change notifications into [ActivityEvent::PolicyReloaded]
/// events for the tracking module.
///
/// Two states: watching (debounce and reload on every change) and awaiting
/// restore (the document vanished mid-rewrite; poll for its return a bounded
/// number of times). If the document never returns, the module stops and the
/// last loaded rules stay in effect until the daemon restarts.
pub struct ConfigReloadModule {
    path: PathBuf,
    changes: mpsc::Receiver<()>,
    next: mpsc::Sender<ActivityEvent>,
    patterns: Arc<PatternCache>,
    shutdown: CancellationToken,
    clock: Box<dyn Clock>,
}

impl ConfigReloadModule {
    pub fn new(
        path: PathBuf,
        changes: mpsc::Receiver<()>,
        next: mpsc::Sender<ActivityEvent>,
        patterns: Arc<PatternCache>,
        shutdown: CancellationToken,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            path,
            changes,
            next,
            patterns,
            shutdown,
            clock,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                change = self.changes.recv() => {
                    if change.is_none() {
                        return Ok(());
                    }
                    if !self.handle_change().await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Returns false when the document did not come back and automatic reload
    /// should stop.
    async fn handle_change(&mut self) -> bool {
        if self.path.exists() {
            self.debounce().await;
        } else if !self.await_restore().await {
            return false;
        }
        self.reload().await;
        true
    }

    /// Collapses a burst of notifications into one reload: wait a beat, then
    /// drain whatever queued up meanwhile.
    async fn debounce(&mut self) {
        self.clock.sleep(DEBOUNCE).await;
        while self.changes.try_recv().is_ok() {}
    }

    async fn await_restore(&mut self) -> bool {
        info!("Config document is gone, waiting for it to be rewritten");
        for _ in 0..MAX_RETRIES {
            self.clock.sleep(RETRY_INTERVAL).await;
            if self.path.exists() {
                debug!("Config document restored");
                // The recreate itself queued notifications; they are part of
                // the reload about to happen.
                while self.changes.try_recv().is_ok() {}
                return true;
            }
        }
        warn!(
            "Config document was not restored, keeping the current rules. \
             Automatic reload is disabled until the daemon restarts."
        );
        false
    }

    async fn reload(&mut self) {
        let policy = ExclusionPolicy::load(&self.path, self.patterns.clone());
        let (apps, windows) = policy.rule_counts();
        info!("Exclusion rules reloaded: {apps} apps, {windows} window rules");
        if let Err(e) = self
            .next
            .send(ActivityEvent::PolicyReloaded(Arc::new(policy)))
            .await
        {
            error!("Failed to push reloaded rules to the tracker {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use tokio::time::timeout;

    use crate::utils::clock::DefaultClock;

    use super::*;

    fn module(
        path: PathBuf,
        shutdown: &CancellationToken,
    ) -> (
        mpsc::Sender<()>,
        mpsc::Receiver<ActivityEvent>,
        ConfigReloadModule,
    ) {
        let (change_sender, changes) = mpsc::channel(16);
        let (next, events) = mpsc::channel(16);
        let module = ConfigReloadModule::new(
            path,
            changes,
            next,
            Arc::new(PatternCache::default()),
            shutdown.clone(),
            Box::new(DefaultClock),
        );
        (change_sender, events, module)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_changes_reloads_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, br#"{"excludedApps": [{"id": "com.example.vault"}]}"#).unwrap();

        let shutdown = CancellationToken::new();
        let (change_sender, mut events, module) = module(path, &shutdown);
        let run = tokio::spawn(module.run());

        for _ in 0..5 {
            change_sender.send(()).await.unwrap();
        }

        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        let ActivityEvent::PolicyReloaded(policy) = event else {
            panic!("expected a policy reload, got {event:?}");
        };
        assert!(policy.should_exclude_app("com.example.vault"));

        // The whole burst collapsed into that one reload.
        assert!(events.try_recv().is_err());
        shutdown.cancel();
        run.await.unwrap().unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_rewrite_falls_back_to_default_rules() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, b"{broken").unwrap();

        let shutdown = CancellationToken::new();
        let (change_sender, mut events, module) = module(path, &shutdown);
        let run = tokio::spawn(module.run());

        change_sender.send(()).await.unwrap();
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        let ActivityEvent::PolicyReloaded(policy) = event else {
            panic!("expected a policy reload, got {event:?}");
        };
        assert_eq!(policy.rule_counts(), (0, 0));

        shutdown.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_document_is_reloaded_after_restore() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let shutdown = CancellationToken::new();
        let (change_sender, mut events, module) = module(path.clone(), &shutdown);
        let run = tokio::spawn(module.run());

        // Delete-then-recreate: the notification arrives while the file is
        // absent, the rewrite lands one retry interval later.
        change_sender.send(()).await.unwrap();
        let restore = tokio::spawn(async move {
            tokio::time::sleep(RETRY_INTERVAL + Duration::from_millis(50)).await;
            std::fs::write(&path, br#"{"excludedApps": [{"id": "com.example.late"}]}"#).unwrap();
        });

        let event = timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap();
        let ActivityEvent::PolicyReloaded(policy) = event else {
            panic!("expected a policy reload, got {event:?}");
        };
        assert!(policy.should_exclude_app("com.example.late"));

        restore.await.unwrap();
        shutdown.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_stop_automatic_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never-restored.json");

        let shutdown = CancellationToken::new();
        let (change_sender, mut events, module) = module(path, &shutdown);
        let run = tokio::spawn(module.run());

        change_sender.send(()).await.unwrap();

        // The module gives up after the bounded retries and stops on its own,
        // without ever pushing a policy.
        timeout(Duration::from_secs(30), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn watch_config_creates_a_template_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let (next, _events) = mpsc::channel(16);

        let shutdown = CancellationToken::new();
        let result = watch_config(
            path.clone(),
            next,
            Arc::new(PatternCache::default()),
            shutdown.clone(),
            Box::new(DefaultClock),
        );
        let (watcher, _module) = result.expect("watch setup should succeed on a real directory");

        assert!(path.exists());
        let document: PolicyDocument =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(document, PolicyDocument::default());
        drop(watcher);
    }
}
