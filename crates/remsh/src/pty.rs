//! Pseudo-terminal subprocess lifecycle.
//!
//! Each [`PtyProcess`] owns one spawned child bound to a PTY: the command
//! line is handed to the shell as a single `-c` argument, so pipes,
//! redirection and every other shell metacharacter keep their meaning.
//! Reads are poll-with-timeout so the caller's loop can interleave liveness
//! checks; the master descriptor and its reader/writer ends are closed
//! exactly once, when the last handle drops, regardless of which teardown
//! path ran first.

use std::io::{ErrorKind, Read, Write};
use std::os::fd::RawFd;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};

use crate::error::EngineError;

/// Read buffer size. Reads of arbitrary partial length are fine; the engine
/// re-chunks for the transport.
const READ_BUF_SIZE: usize = 4096;

/// Poll step while waiting out the termination grace period.
const TERMINATE_POLL_MS: u64 = 50;

/// Outcome of a single poll-read.
#[derive(Debug, PartialEq, Eq)]
pub enum PtyRead {
    /// Output bytes, at most one buffer's worth.
    Data(Vec<u8>),
    /// The slave side is gone; no more output will arrive.
    Eof,
    /// No output within the timeout. Normal, not an error.
    Timeout,
}

/// Outcome of [`PtyProcess::terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited within the grace period after SIGTERM.
    Graceful,
    /// The process ignored SIGTERM and was SIGKILLed.
    Forced,
    /// The process was already dead; terminating it is a no-op.
    AlreadyDead,
}

/// One spawned subprocess bound to a pseudo-terminal.
pub struct PtyProcess {
    pid: u32,
    command: String,
    spawned_at: DateTime<Utc>,
    master_fd: RawFd,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    reader: Mutex<Box<dyn Read + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    // Keeps the master end open for the lifetime of the process handle.
    _master: Mutex<Box<dyn MasterPty + Send>>,
}

impl std::fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyProcess")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .field("spawned_at", &self.spawned_at)
            .finish()
    }
}

impl PtyProcess {
    /// Allocate a PTY pair and spawn `shell -c command` on the slave side,
    /// with the child's working directory set to `workdir`.
    pub fn spawn(command: &str, shell: &str, workdir: &Path) -> Result<Self, EngineError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| EngineError::SpawnFailure(e.to_string()))?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.arg("-c");
        cmd.arg(command);
        cmd.cwd(workdir);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| EngineError::SpawnFailure(e.to_string()))?;
        // The slave end lives on inside the child; drop our copy so EOF is
        // observable once the child exits.
        drop(pair.slave);

        let pid = match child.process_id() {
            Some(pid) => pid,
            None => {
                terminate_child(child);
                return Err(EngineError::SpawnFailure("child has no pid".to_string()));
            }
        };
        let master_fd = match pair.master.as_raw_fd() {
            Some(fd) => fd,
            None => {
                terminate_child(child);
                return Err(EngineError::SpawnFailure(
                    "master pty exposes no file descriptor".to_string(),
                ));
            }
        };
        let reader = match pair.master.try_clone_reader() {
            Ok(reader) => reader,
            Err(e) => {
                terminate_child(child);
                return Err(EngineError::SpawnFailure(e.to_string()));
            }
        };
        let writer = match pair.master.take_writer() {
            Ok(writer) => writer,
            Err(e) => {
                terminate_child(child);
                return Err(EngineError::SpawnFailure(e.to_string()));
            }
        };

        Ok(Self {
            pid,
            command: command.to_string(),
            spawned_at: Utc::now(),
            master_fd,
            child: Mutex::new(child),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            _master: Mutex::new(pair.master),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn spawned_at(&self) -> DateTime<Utc> {
        self.spawned_at
    }

    /// Poll the master descriptor for up to `timeout`, then perform one
    /// partial read. A `Timeout` signals "no output yet"; a read error means
    /// the slave side is gone (the master returns `EIO` then) and maps to
    /// `Eof`.
    pub fn read_timeout(&self, timeout: Duration) -> PtyRead {
        let mut pollfd = libc::pollfd {
            fd: self.master_fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        let ready = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                return PtyRead::Timeout;
            }
            return PtyRead::Eof;
        }
        if ready == 0 {
            return PtyRead::Timeout;
        }
        if pollfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) == 0 {
            return PtyRead::Timeout;
        }

        let mut buf = [0_u8; READ_BUF_SIZE];
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        match reader.read(&mut buf) {
            Ok(0) => PtyRead::Eof,
            Ok(n) => PtyRead::Data(buf[..n].to_vec()),
            Err(e) if e.kind() == ErrorKind::Interrupted => PtyRead::Timeout,
            Err(_) => PtyRead::Eof,
        }
    }

    /// Write bytes to the process's terminal input.
    pub fn write_all(&self, bytes: &[u8]) -> Result<(), EngineError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| EngineError::WriteFailure(e.to_string()))
    }

    /// Non-destructive liveness probe. Also reaps the child once it has
    /// exited, so a dead session never lingers as a zombie.
    pub fn is_alive(&self) -> bool {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(child.try_wait(), Ok(None))
    }

    /// Graceful-then-forced termination: SIGTERM, wait out `grace`, SIGKILL
    /// if the process is still alive. Idempotent: terminating an already
    /// dead process is a no-op.
    pub async fn terminate(&self, grace: Duration) -> Termination {
        if !self.is_alive() {
            return Termination::AlreadyDead;
        }

        unsafe {
            libc::kill(self.pid as libc::pid_t, libc::SIGTERM);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.is_alive() {
                return Termination::Graceful;
            }
            tokio::time::sleep(Duration::from_millis(TERMINATE_POLL_MS)).await;
        }

        self.force_kill();
        Termination::Forced
    }

    /// SIGKILL and reap if the process is still alive; otherwise a no-op.
    pub fn force_kill(&self) {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(child.try_wait(), Ok(None)) {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        self.force_kill();
    }
}

fn terminate_child(mut child: Box<dyn Child + Send + Sync>) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_in_tempdir(command: &str) -> (tempfile::TempDir, PtyProcess) {
        let dir = tempfile::tempdir().unwrap();
        let pty = PtyProcess::spawn(command, "bash", dir.path()).unwrap();
        (dir, pty)
    }

    /// Read until EOF or the deadline, returning everything seen.
    fn drain(pty: &PtyProcess, deadline: Duration) -> Vec<u8> {
        let start = Instant::now();
        let mut out = Vec::new();
        while start.elapsed() < deadline {
            match pty.read_timeout(Duration::from_millis(50)) {
                PtyRead::Data(bytes) => out.extend_from_slice(&bytes),
                PtyRead::Eof => break,
                PtyRead::Timeout => {}
            }
        }
        out
    }

    #[test]
    fn spawn_echo_and_drain_to_eof() {
        let (_dir, pty) = spawn_in_tempdir("echo pty-hello");
        let output = drain(&pty, Duration::from_secs(5));
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("pty-hello"), "output was: {text:?}");
        assert!(!pty.is_alive());
    }

    #[test]
    fn child_runs_in_the_given_working_directory() {
        let (dir, pty) = spawn_in_tempdir("pwd");
        let output = drain(&pty, Duration::from_secs(5));
        let text = String::from_utf8_lossy(&output);
        // Compare against the canonical path; the tempdir may be a symlink.
        let canonical = dir.path().canonicalize().unwrap();
        assert!(
            text.contains(canonical.to_str().unwrap()) || text.contains(dir.path().to_str().unwrap()),
            "pwd output was: {text:?}"
        );
    }

    #[test]
    fn write_reaches_the_child() {
        let (_dir, pty) = spawn_in_tempdir("cat");
        pty.write_all(b"marco\n").unwrap();

        let start = Instant::now();
        let mut seen = Vec::new();
        while start.elapsed() < Duration::from_secs(5) {
            match pty.read_timeout(Duration::from_millis(50)) {
                PtyRead::Data(bytes) => {
                    seen.extend_from_slice(&bytes);
                    if String::from_utf8_lossy(&seen).contains("marco") {
                        break;
                    }
                }
                PtyRead::Eof => break,
                PtyRead::Timeout => {}
            }
        }
        assert!(String::from_utf8_lossy(&seen).contains("marco"));
        pty.force_kill();
    }

    #[test]
    fn read_times_out_while_child_is_silent() {
        let (_dir, pty) = spawn_in_tempdir("sleep 5");
        assert_eq!(pty.read_timeout(Duration::from_millis(50)), PtyRead::Timeout);
        assert!(pty.is_alive());
        pty.force_kill();
        assert!(!pty.is_alive());
    }

    #[tokio::test]
    async fn terminate_is_graceful_then_idempotent() {
        let (_dir, pty) = spawn_in_tempdir("sleep 30");
        let first = pty.terminate(Duration::from_millis(500)).await;
        assert!(matches!(first, Termination::Graceful | Termination::Forced));
        assert!(!pty.is_alive());

        let second = pty.terminate(Duration::from_millis(500)).await;
        assert_eq!(second, Termination::AlreadyDead);
    }

    #[tokio::test]
    async fn terminate_force_kills_a_term_ignoring_child() {
        let (_dir, pty) = spawn_in_tempdir("trap '' TERM; sleep 30");
        // Give the shell a moment to install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let outcome = pty.terminate(Duration::from_millis(300)).await;
        assert_eq!(outcome, Termination::Forced);
        assert!(!pty.is_alive());
    }

    #[test]
    fn spawn_failure_surfaces_without_a_handle() {
        let dir = tempfile::tempdir().unwrap();
        let result = PtyProcess::spawn("echo hi", "/nonexistent/shell-xyz", dir.path());
        assert!(matches!(result, Err(EngineError::SpawnFailure(_))));
    }
}
