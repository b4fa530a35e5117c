//! Child process spawning and signalling

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{debug, error, warn};

use crate::error::SupervisorError;

/// Carries the certificate server token; never reaches the child
pub const TOKEN_ENV: &str = "JWT";

/// Build the command for the supervised child.
///
/// Standard streams are inherited so the child talks to the supervisor's
/// terminal. `TOKEN_ENV` and every variable in `strip_env` are removed from
/// the child's environment; the rest is inherited.
pub fn build_command(command: &str, args: &[String], strip_env: &[String]) -> Command {
    let mut cmd = Command::new(command);

    cmd.args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(false);

    cmd.env_remove(TOKEN_ENV);
    for var in strip_env.iter().filter(|var| var.as_str() != TOKEN_ENV) {
        cmd.env_remove(var);
    }

    cmd
}

/// Spawn the supervised child
pub fn spawn_child(command: &str, args: &[String], strip_env: &[String]) -> Result<Child, SupervisorError> {
    let child = build_command(command, args, strip_env)
        .spawn()
        .map_err(|source| SupervisorError::Spawn {
            command: command.to_string(),
            source,
        })?;

    debug!("Spawned `{}` with pid {:?}", command, child.id());
    Ok(child)
}

/// Ask a child to shut down with SIGTERM.
///
/// A child that already exited (ESRCH) is not an error.
pub fn terminate(pid: u32) -> Result<(), SupervisorError> {
    let raw = i32::try_from(pid).map_err(|_| SupervisorError::Signal {
        pid,
        source: Errno::EINVAL,
    })?;

    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            warn!("Child {} exited before it could be signalled", pid);
            Ok(())
        }
        Err(source) => Err(SupervisorError::Signal { pid, source }),
    }
}

/// SIGTERM the child ahead of a restart.
///
/// When the signal cannot be delivered the child is killed and reaped before
/// the error is returned, so it never outlives the supervisor.
pub async fn terminate_child(child: &mut Child, pid: u32) -> Result<(), SupervisorError> {
    if let Err(e) = terminate(pid) {
        error!("Failed to signal child {}: {}", pid, e);
        if let Err(kill_err) = child.kill().await {
            warn!("Failed to kill child {}: {}", pid, kill_err);
        }
        return Err(e);
    }
    Ok(())
}

/// Map a child's exit status onto a process exit code, shell style
pub fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}
