use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::{sync::mpsc::Receiver, task};
use tracing::{debug, error};

use crate::{
    daemon::{
        events::ActivityEvent,
        storage::{entities::Session, session_store::SessionBackend},
    },
    exclusion::ExclusionPolicy,
    utils::clock::Clock,
    window_api::ActivityInfo,
};

/// The persisted open session and the activity it tracks.
struct OpenSession {
    id: i64,
    info: ActivityInfo,
}

/// The tracking state machine. Owns the notion of "current open session":
/// either nothing is tracked, or exactly one persisted row is open and
/// `open` references it.
///
/// `displayed` is bookkeeping for what is in front regardless of whether it
/// is recorded. The two differ when the focused window matches an excluded
/// title: no row is written, but the app identity is remembered so a later,
/// non-excluded title change is detected as a change and resumes tracking.
///
/// Methods must only be called from one task at a time; [TrackingModule]
/// provides that serialization.
pub struct SessionRecorder<B: SessionBackend + 'static> {
    store: Arc<B>,
    policy: Arc<ExclusionPolicy>,
    clock: Box<dyn Clock>,
    displayed: Option<ActivityInfo>,
    open: Option<OpenSession>,
}

impl<B: SessionBackend + 'static> SessionRecorder<B> {
    pub fn new(store: Arc<B>, policy: Arc<ExclusionPolicy>, clock: Box<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
            displayed: None,
            open: None,
        }
    }

    pub async fn apply(&mut self, event: ActivityEvent) -> Result<()> {
        match event {
            ActivityEvent::Focused { info, at } => self.on_focused(info, at).await,
            ActivityEvent::TitleChanged { title, at } => self.on_title_changed(title, at).await,
            ActivityEvent::Suspended { at } => self.on_suspended(at).await,
            ActivityEvent::Resumed { info, at } => self.on_resumed(info, at).await,
            ActivityEvent::PolicyReloaded(policy) => self.on_policy_reloaded(policy).await,
        }
    }

    pub async fn on_focused(&mut self, info: ActivityInfo, at: DateTime<Utc>) -> Result<()> {
        if self
            .displayed
            .as_ref()
            .is_some_and(|displayed| displayed.same_target(&info))
        {
            return Ok(());
        }

        self.end_open(at).await?;

        if self.policy.should_exclude_app(&info.app_id) {
            debug!("Ignoring excluded app {}", info.app_id);
            self.displayed = None;
            return Ok(());
        }
        if info
            .window_title
            .as_deref()
            .is_some_and(|title| self.policy.should_exclude_window(&info.app_id, title))
        {
            debug!(
                "Title excluded for {}, keeping app identity without a session",
                info.app_id
            );
            self.displayed = Some(info);
            return Ok(());
        }

        self.start_session(info, at).await
    }

    pub async fn on_title_changed(
        &mut self,
        title: Option<Arc<str>>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let Some(displayed) = self.displayed.clone() else {
            // A title notification can outrun the first focus notification;
            // with no app identity there is nothing to attribute it to.
            debug!("Title change with no known application, dropping");
            return Ok(());
        };
        if displayed.window_title == title {
            return Ok(());
        }
        self.on_focused(displayed.with_title(title), at).await
    }

    /// The machine is going to sleep. What comes back after waking is
    /// anyone's guess, so tracking stops here.
    pub async fn on_suspended(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.end_open(at).await?;
        self.displayed = None;
        Ok(())
    }

    pub async fn on_resumed(
        &mut self,
        info: Option<ActivityInfo>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        match info {
            Some(info) => self.on_focused(info, at).await,
            None => Ok(()),
        }
    }

    /// Swaps the active exclusion rules and ends the current session when the
    /// new rules exclude it.
    pub async fn on_policy_reloaded(&mut self, policy: Arc<ExclusionPolicy>) -> Result<()> {
        self.policy = policy;

        let Some(displayed) = self.displayed.clone() else {
            return Ok(());
        };
        let app_excluded = self.policy.should_exclude_app(&displayed.app_id);
        let window_excluded = displayed
            .window_title
            .as_deref()
            .is_some_and(|title| self.policy.should_exclude_window(&displayed.app_id, title));
        if !app_excluded && !window_excluded {
            return Ok(());
        }

        let at = self.clock.time();
        self.end_open(at).await?;
        if app_excluded {
            self.displayed = None;
        }
        // Window-only exclusion keeps the app identity so a later title
        // change can resume tracking without a fresh focus event.
        Ok(())
    }

    /// Clean-shutdown path: closes the open session at the current instant.
    pub async fn finalize(&mut self) -> Result<()> {
        let at = self.clock.time();
        self.end_open(at).await?;
        self.displayed = None;
        Ok(())
    }

    /// Ends the open session, if any. On storage failure the in-memory state
    /// is left exactly as it was, so the machine still reports the session as
    /// tracked and a later event retries the close.
    async fn end_open(&mut self, at: DateTime<Utc>) -> Result<()> {
        let Some(open) = &self.open else {
            return Ok(());
        };
        let token = open.id;
        let ended_app = open.info.app_name.clone();
        let store = self.store.clone();
        task::spawn_blocking(move || store.end_session(token, at))
            .await
            .context("End-session task failed")?
            .context("Failed to end session")?;

        // The row is closed either way; memory only follows when this
        // transition still owns the open session.
        if self.open.as_ref().is_some_and(|open| open.id == token) {
            self.open = None;
            debug!("Ended: {ended_app}");
        } else {
            debug!("Open session changed while the end write was in flight");
        }
        Ok(())
    }

    async fn start_session(&mut self, info: ActivityInfo, at: DateTime<Utc>) -> Result<()> {
        let previous = self.displayed.replace(info.clone());
        let row = Session::open(
            info.app_id.clone(),
            info.app_name.clone(),
            info.window_title.clone(),
            at,
        );
        let store = self.store.clone();
        let inserted = match task::spawn_blocking(move || store.insert(row))
            .await
            .context("Insert-session task failed")?
        {
            Ok(inserted) => inserted,
            Err(e) => {
                // The machine must not claim to track a row that was never
                // written: report idle, with the display state rolled back.
                self.displayed = previous;
                self.open = None;
                return Err(e).context("Failed to insert session");
            }
        };

        let id = inserted
            .id
            .context("Store assigned no id to the inserted session")?;
        if self
            .displayed
            .as_ref()
            .is_some_and(|displayed| displayed.same_target(&info))
        {
            debug!(
                "Started: {} - {}",
                info.app_name,
                info.window_title.as_deref().unwrap_or("(no title)")
            );
            self.open = Some(OpenSession { id, info });
        } else {
            // A later transition superseded this one while the write was in
            // flight. The row is durable and will be swept as an orphan.
            debug!("Display target changed during insert, leaving session {id} untracked");
        }
        Ok(())
    }

    /// Activity the open session tracks, if one is open.
    pub fn tracked(&self) -> Option<&ActivityInfo> {
        self.open.as_ref().map(|open| &open.info)
    }

    /// What is currently in front, recorded or not.
    pub fn displayed(&self) -> Option<&ActivityInfo> {
        self.displayed.as_ref()
    }
}

/// Single consumer of the event channel. Owning the receiver makes it the one
/// logical writer of tracking state: transitions never interleave.
pub struct TrackingModule<B: SessionBackend + 'static> {
    receiver: Receiver<ActivityEvent>,
    recorder: SessionRecorder<B>,
}

impl<B: SessionBackend + 'static> TrackingModule<B> {
    pub fn new(receiver: Receiver<ActivityEvent>, recorder: SessionRecorder<B>) -> Self {
        Self { receiver, recorder }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(event) = self.receiver.recv().await {
            debug!("Processing event {:?}", event);
            if let Err(e) = self.recorder.apply(event).await {
                error!("Error applying event: {e:?}");
            }
        }

        let result = self.recorder.finalize().await;
        self.receiver.close();
        result
    }
}
