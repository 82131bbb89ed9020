use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use sysinfo::{get_current_pid, Signal, System};

const DAEMON_BINARY: &str = "focuswatch-daemon";

/// Path of the daemon binary, expected to sit next to the CLI binary.
fn daemon_executable() -> Result<PathBuf> {
    let cli = env::current_exe().context("Can't operate without an executable")?;
    let dir = cli
        .parent()
        .context("Executable has no parent directory")?;
    let mut path = dir.join(DAEMON_BINARY);
    if cfg!(windows) {
        path.set_extension("exe");
    }
    Ok(path)
}

/// Terminates every running daemon instance. Children of the current process
/// are skipped so a freshly spawned daemon does not kill itself.
pub fn kill_previous_servers(daemon: &Path) {
    let system = System::new_all();
    let current_id = get_current_pid().unwrap();
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| daemon == *v)
            .is_some()
        {
            // This will forcefully terminate the process on Windows. Anything better will require a
            // lot more work.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
        }
    }
}

pub fn stop_server() -> Result<()> {
    kill_previous_servers(&daemon_executable()?);
    Ok(())
}

/// Replaces any running daemon with a fresh one. The daemon binary detaches
/// itself from the console, so a plain spawn is enough here.
pub fn restart_server() -> Result<()> {
    let daemon = daemon_executable()?;
    kill_previous_servers(&daemon);

    println!("Spawning {DAEMON_BINARY}");
    #[allow(clippy::zombie_processes)]
    let _ = std::process::Command::new(daemon).spawn()?;
    println!("Success");
    Ok(())
}
