//! Platform glue: process attributes, signals, exit statuses, and terminal
//! ownership.

use std::io;
use std::process::{Command, ExitStatus};

/// Signals the job subsystem delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Polite termination request (`stop`).
    Terminate,
    /// Terminal hangup (shell exit).
    Hangup,
    /// Resume a suspended process (`background`/`foreground`).
    Continue,
}

/// Detach the child from the shell's signal group so signals aimed at the
/// shell (Ctrl-C at the prompt) do not reach background jobs.
#[cfg(unix)]
pub fn background_attr(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
pub fn background_attr(_cmd: &mut Command) {}

/// Build the command for `path`, with `args[0]` as the process name and the
/// rest as arguments.
pub fn build_command(path: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(path);
    if let Some((argv0, rest)) = args.split_first() {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.arg0(argv0);
        }
        #[cfg(not(unix))]
        let _ = argv0;
        cmd.args(rest);
    }
    cmd
}

#[cfg(unix)]
pub fn send_signal(pid: u32, signal: Signal) -> io::Result<()> {
    let signo = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Hangup => libc::SIGHUP,
        Signal::Continue => libc::SIGCONT,
    };
    // Safety: kill(2) has no memory-safety preconditions; pid is one of our children.
    let rc = unsafe { libc::kill(pid as libc::pid_t, signo) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn send_signal(pid: u32, signal: Signal) -> io::Result<()> {
    match signal {
        // No suspension on this platform, so nothing to resume.
        Signal::Continue => Ok(()),
        Signal::Terminate | Signal::Hangup => {
            std::process::Command::new("taskkill")
                .args(["/F", "/PID", &pid.to_string()])
                .output()
                .map(|_| ())
        }
    }
}

/// Shell convention: the exit code, or `128 + signal` for signal deaths.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    -1
}

/// Exit code recorded when the process could not be launched at all.
pub fn launch_error_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::NotFound => 127,
        io::ErrorKind::PermissionDenied => 126,
        _ => 1,
    }
}

/// Terminal ownership handed to a job's process group. Dropping it gives
/// the terminal back to the shell.
#[derive(Debug)]
pub struct TerminalGuard {
    #[cfg(unix)]
    shell_pgid: libc::pid_t,
}

/// Give the controlling terminal to process group `pgid`.
///
/// Returns `None` when stdin is not a terminal (scripts, pipelines, tests),
/// in which case there is nothing to hand over.
#[cfg(unix)]
pub fn give_terminal(pgid: u32) -> io::Result<Option<TerminalGuard>> {
    // Safety: plain libc calls on the process's own stdin descriptor.
    unsafe {
        if libc::isatty(libc::STDIN_FILENO) != 1 {
            return Ok(None);
        }
        let shell_pgid = libc::getpgrp();
        if libc::tcsetpgrp(libc::STDIN_FILENO, pgid as libc::pid_t) == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(Some(TerminalGuard { shell_pgid }))
    }
}

#[cfg(not(unix))]
pub fn give_terminal(_pgid: u32) -> io::Result<Option<TerminalGuard>> {
    Ok(None)
}

#[cfg(unix)]
impl Drop for TerminalGuard {
    fn drop(&mut self) {
        // The shell is a background group at this point; reclaiming the
        // terminal would stop it with SIGTTOU unless that is ignored.
        // Safety: signal disposition is restored before returning.
        unsafe {
            let previous = libc::signal(libc::SIGTTOU, libc::SIG_IGN);
            if libc::tcsetpgrp(libc::STDIN_FILENO, self.shell_pgid) == -1 {
                tracing::warn!(
                    "failed to reclaim terminal: {}",
                    io::Error::last_os_error()
                );
            }
            libc::signal(libc::SIGTTOU, previous);
        }
    }
}
