use anyhow::{anyhow, Result};
use tracing::error;
use windows::{
    core::PWSTR,
    Win32::{
        Foundation::{BOOL, CloseHandle, HANDLE, HWND},
        System::Threading::{
            OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
            PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
        },
        UI::WindowsAndMessaging::{
            GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId,
        },
    },
};

use super::{app_name_from_path, ActivityInfo, WindowManager};

#[tracing::instrument]
pub fn get_foreground() -> Result<ActivityInfo> {
    let window = unsafe { GetForegroundWindow() };

    if window.is_invalid() {
        return Err(anyhow!("Failed to get foreground window"));
    }

    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    if id == 0 {
        return Err(anyhow!("Foreground window has no owning process"));
    }

    let process_handle = unsafe {
        OpenProcess(
            PROCESS_QUERY_INFORMATION | PROCESS_VM_READ,
            BOOL::from(false),
            id,
        )
    }
    .inspect_err(|e| error!("Failed to open process {e:?}"))?;

    let mut text: [u16; 4096] = [0; 4096];
    let executable = unsafe { get_window_process_path(process_handle, &mut text) }
        .inspect_err(|e| error!("Failed to get window process path {e:?}"))?;
    let title = unsafe { get_window_title(window, &mut text) };

    unsafe { CloseHandle(process_handle) }
        .inspect_err(|e| error!("Failed to close handle {e:?}"))?;

    Ok(ActivityInfo {
        app_name: app_name_from_path(&executable),
        app_id: executable.into(),
        window_title: if title.is_empty() {
            None
        } else {
            Some(title.into())
        },
    })
}

unsafe fn get_window_process_path(window_handle: HANDLE, text: &mut [u16]) -> Result<String> {
    unsafe {
        let mut length = text.len() as u32;
        QueryFullProcessImageNameW(
            window_handle,
            PROCESS_NAME_WIN32,
            PWSTR(text.as_mut_ptr()),
            &mut length,
        )?;
        Ok(String::from_utf16_lossy(&text[..length as usize]))
    }
}

unsafe fn get_window_title(window_handle: HWND, text: &mut [u16]) -> String {
    let len = unsafe { GetWindowTextW(window_handle, text) };
    String::from_utf16_lossy(&text[..len as usize])
}

pub struct WindowsWindowManager {}

impl WindowsWindowManager {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsWindowManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowManager for WindowsWindowManager {
    fn get_foreground(&mut self) -> Result<ActivityInfo> {
        get_foreground().inspect_err(|e| error!("Failed to get active window {e:?}"))
    }
}
