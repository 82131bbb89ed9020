use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{exclusion::ExclusionPolicy, window_api::ActivityInfo};

/// Events feeding the tracking state machine. Sources are independent and may
/// interleave; the channel gives them one total order and the single consumer
/// serializes every transition.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    /// Focus moved to a different application or window.
    Focused {
        info: ActivityInfo,
        at: DateTime<Utc>,
    },
    /// The focused window changed its title in place.
    TitleChanged {
        title: Option<Arc<str>>,
        at: DateTime<Utc>,
    },
    /// The machine went to sleep; `at` is the last instant attention was
    /// observed.
    Suspended { at: DateTime<Utc> },
    /// The machine woke up. `info` is the activity observed right after
    /// waking, when it could be observed at all.
    Resumed {
        info: Option<ActivityInfo>,
        at: DateTime<Utc>,
    },
    /// The exclusion rules were reloaded.
    PolicyReloaded(Arc<ExclusionPolicy>),
}
