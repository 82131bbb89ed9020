//! Contains logic for observing the foreground application in different
//! environments. [GenericWindowManager] is the main artifact of this module
//! that abstracts the operations.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::sync::Arc;

use anyhow::Result;

/// Transient descriptor of what is currently in front. Only used to decide
/// whether tracking state must change, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityInfo {
    /// Stable application identifier. For example a bundle id or the full
    /// executable path, depending on the platform.
    pub app_id: Arc<str>,
    /// Display name. For example 'nvim' or 'Firefox'.
    pub app_name: Arc<str>,
    /// Focused window title; `None` when the platform reports no title.
    pub window_title: Option<Arc<str>>,
}

impl ActivityInfo {
    /// Whether `other` points at the same (app, window title) pair. App name
    /// is display-only and deliberately ignored.
    pub fn same_target(&self, other: &ActivityInfo) -> bool {
        self.app_id == other.app_id && self.window_title == other.window_title
    }

    pub fn with_title(&self, window_title: Option<Arc<str>>) -> ActivityInfo {
        ActivityInfo {
            app_id: self.app_id.clone(),
            app_name: self.app_name.clone(),
            window_title,
        }
    }
}

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowManager: Send {
    /// Reports the application and window currently holding focus.
    fn get_foreground(&mut self) -> Result<ActivityInfo>;
}

/// Serves as a cross-compatible WindowManager implementation.
pub struct GenericWindowManager {
    inner: Box<dyn WindowManager>,
}

impl GenericWindowManager {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsWindowManager;
                Ok(Self {
                    inner: Box::new(WindowsWindowManager::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxWindowManager;
                Ok(Self {
                    inner: Box::new(LinuxWindowManager::new()?),
                })
            }
            else {
                // This runtime error is needed to allow the project to be compiled for during testing.
                unimplemented!("No window manager was specified")
            }
        }
    }
}

impl WindowManager for GenericWindowManager {
    fn get_foreground(&mut self) -> Result<ActivityInfo> {
        self.inner.get_foreground()
    }
}

/// Derives a display name from an executable path, falling back to the whole
/// path when there is no file stem.
#[allow(dead_code)]
pub(crate) fn app_name_from_path(path: &str) -> Arc<str> {
    std::path::Path::new(path)
        .file_stem()
        .and_then(|v| v.to_str())
        .map(Into::into)
        .unwrap_or_else(|| path.into())
}
