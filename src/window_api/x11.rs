use anyhow::{anyhow, Result};
use sysinfo::Pid;
use tracing::instrument;
use xcb::{
    x::{self, Atom, GetProperty, GrabServer, InternAtom, UngrabServer, Window, ATOM_ANY},
    Connection,
};

use super::{app_name_from_path, ActivityInfo, WindowManager};

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    let result_slice = result.value::<u32>();
    if result_slice.is_empty() {
        return Ok(None);
    }
    Ok(Some(result_slice[0]))
}

fn get_executable_path(id: u32) -> Option<String> {
    let system = sysinfo::System::new_all();
    let process = system.process(Pid::from_u32(id))?;
    process.exe().and_then(|v| v.to_str()).map(|v| v.to_string())
}

fn get_active_window(conn: &Connection, root: &Window, active_window_atom: Atom) -> Result<Window> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: *root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    let windows = result.value::<Window>();
    if windows.is_empty() {
        return Err(anyhow!("Root window reports no active window"));
    }
    Ok(windows[0])
}

fn get_title(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<Option<String>> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    let title = String::from_utf8_lossy(wm_name.value()).to_string();
    Ok(if title.is_empty() { None } else { Some(title) })
}

pub struct LinuxWindowManager {
    connection: Connection,
    preferred_screen: i32,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
}

impl LinuxWindowManager {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        let pid_atom = intern_atom(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            preferred_screen,
            active_window_atom,
            window_name_atom,
            pid_atom,
        })
    }

    #[instrument(skip(self))]
    fn get_foreground_inner(&self) -> Result<ActivityInfo> {
        let setup = self.connection.get_setup();

        // Currently the application only supports 1 x11 screen.
        let root = setup
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .ok_or_else(|| anyhow!("Preferred screen is not present"))?
            .root();

        let active_window = get_active_window(&self.connection, &root, self.active_window_atom)?;
        let title = get_title(&self.connection, active_window, self.window_name_atom)?;
        let pid = get_pid(&self.connection, active_window, self.pid_atom)?
            .ok_or_else(|| anyhow!("Active window has no _NET_WM_PID"))?;
        let executable = get_executable_path(pid)
            .ok_or_else(|| anyhow!("Can't resolve executable for pid {pid}"))?;

        Ok(ActivityInfo {
            app_name: app_name_from_path(&executable),
            app_id: executable.into(),
            window_title: title.map(Into::into),
        })
    }
}

impl WindowManager for LinuxWindowManager {
    #[instrument(skip(self))]
    fn get_foreground(&mut self) -> Result<ActivityInfo> {
        let _ = self.connection.send_request(&GrabServer {});

        let result = self.get_foreground_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        result
    }
}
