use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    daemon::events::ActivityEvent,
    utils::clock::Clock,
    window_api::{ActivityInfo, WindowManager},
};

/// Observes the foreground application on a fixed cadence and turns the
/// observations into [ActivityEvent]s: a focus change, an in-place title
/// change, or nothing when the same window is still in front.
///
/// A poll gap far beyond the cadence means the machine was asleep, so the gap
/// is reported as a suspend at the last observation followed by a resume with
/// whatever is in front now.
pub struct ActivityCollector {
    next: mpsc::Sender<ActivityEvent>,
    producer: Box<dyn WindowManager>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    suspend_gap: chrono::Duration,
    time_provider: Box<dyn Clock>,
    last_seen: Option<ActivityInfo>,
    last_poll: Option<DateTime<Utc>>,
}

impl ActivityCollector {
    pub fn new(
        next: mpsc::Sender<ActivityEvent>,
        producer: Box<dyn WindowManager>,
        shutdown: CancellationToken,
        poll_interval: Duration,
        suspend_gap: chrono::Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            producer,
            shutdown,
            poll_interval,
            suspend_gap,
            time_provider,
            last_seen: None,
            last_poll: None,
        }
    }

    /// One observation step. Updates the diffing state and returns the events
    /// this step produced, oldest first.
    fn collect_events(&mut self) -> Vec<ActivityEvent> {
        let now = self.time_provider.time();
        let mut events = Vec::new();

        let slept = self
            .last_poll
            .is_some_and(|last| now - last > self.suspend_gap);
        if slept {
            // `at` is the last instant attention was actually observed, not
            // some point mid-sleep.
            events.push(ActivityEvent::Suspended {
                at: self.last_poll.unwrap_or(now),
            });
            self.last_seen = None;
        }
        self.last_poll = Some(now);

        match self.producer.get_foreground() {
            Ok(info) => {
                if slept {
                    self.last_seen = Some(info.clone());
                    events.push(ActivityEvent::Resumed {
                        info: Some(info),
                        at: now,
                    });
                } else {
                    match &self.last_seen {
                        Some(previous) if previous.app_id == info.app_id => {
                            if previous.window_title != info.window_title {
                                events.push(ActivityEvent::TitleChanged {
                                    title: info.window_title.clone(),
                                    at: now,
                                });
                            }
                        }
                        _ => events.push(ActivityEvent::Focused {
                            info: info.clone(),
                            at: now,
                        }),
                    }
                    self.last_seen = Some(info);
                }
            }
            Err(e) => {
                error!("Encountered an error during observation {e:?}");
                if slept {
                    events.push(ActivityEvent::Resumed { info: None, at: now });
                }
            }
        }

        events
    }

    /// Executes the collector event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut collection_point = self.time_provider.instant();
        loop {
            collection_point += self.poll_interval;

            for event in self.collect_events() {
                debug!("Sending event {:?}", event);
                self.next
                    .send(event)
                    .await
                    .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
            }

            tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // the sender channel and consequently stop the tracking module.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(collection_point) => ()
            }
        }
    }
}
