//! PTY (pseudo-terminal) management
//!
//! Creates PTY pair with forkpty and spawns shell in child process.
//! Provides master side read/write.

use anyhow::{anyhow, Context, Result};
use log::info;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{ForkResult, Pid};
use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// Initial size reported to the shell
const DEFAULT_COLS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;

/// PTY management structure
pub struct Pty {
    /// Master side file descriptor
    master: OwnedFd,
    /// Child process PID
    child_pid: Pid,
    /// Child already reaped by waitpid
    reaped: bool,
}

impl Pty {
    /// Create PTY and spawn `shell` as a login shell.
    /// `term_env` sets the TERM environment variable.
    pub fn spawn(shell: &str, term_env: &str) -> Result<Self> {
        // Everything the child needs is allocated before forking
        let shell_cstr = CString::new(shell).context("NUL byte in shell path")?;
        let shell_name = std::path::Path::new(shell)
            .file_name()
            .map(|n| format!("-{}", n.to_string_lossy()))
            .unwrap_or_else(|| "-sh".to_string());
        let argv0 = CString::new(shell_name).context("NUL byte in shell name")?;

        let winsize = Winsize {
            ws_row: DEFAULT_ROWS,
            ws_col: DEFAULT_COLS,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        // SAFETY: the child only sets env vars and execs
        let ForkptyResult {
            master,
            fork_result,
        } = unsafe { forkpty(Some(&winsize), None)? };

        match fork_result {
            ForkResult::Child => {
                std::env::set_var("TERM", term_env);
                let _ = nix::unistd::execvp(&shell_cstr, &[&argv0]);
                // SAFETY: exec failed, leave without running parent destructors
                unsafe { libc::_exit(127) }
            }
            ForkResult::Parent { child } => {
                info!(
                    "PTY spawned: {} pid={}, master_fd={}",
                    shell,
                    child,
                    master.as_raw_fd()
                );

                // Set master fd to non-blocking
                let flags = nix::fcntl::fcntl(master.as_raw_fd(), nix::fcntl::FcntlArg::F_GETFL)?;
                let mut flags = nix::fcntl::OFlag::from_bits_truncate(flags);
                flags.insert(nix::fcntl::OFlag::O_NONBLOCK);
                nix::fcntl::fcntl(master.as_raw_fd(), nix::fcntl::FcntlArg::F_SETFL(flags))?;

                Ok(Self {
                    master,
                    child_pid: child,
                    reaped: false,
                })
            }
        }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    /// Non-blocking read from PTY
    ///
    /// Returns Ok(0) if no data. EIO means the shell side is gone.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        match nix::unistd::read(self.master.as_raw_fd(), buf) {
            Ok(n) => Ok(n),
            Err(nix::errno::Errno::EAGAIN) => Ok(0),
            Err(e) => Err(anyhow!("PTY read error: {}", e)),
        }
    }

    /// Write all of `data` to the PTY
    pub fn write_all(&self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            match nix::unistd::write(self.master.as_raw_fd(), data) {
                Ok(n) => data = &data[n..],
                Err(nix::errno::Errno::EINTR) => {}
                Err(e) => return Err(anyhow!("PTY write error: {}", e)),
            }
        }
        Ok(())
    }

    /// Check if child process is alive, reaping it once it exited
    pub fn is_alive(&mut self) -> bool {
        if self.reaped {
            return false;
        }
        match waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            Ok(status) => {
                info!("PTY child exited: {:?}", status);
                self.reaped = true;
                false
            }
            Err(_) => {
                self.reaped = true;
                false
            }
        }
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        // Send SIGHUP and wait for child process to exit
        let _ = nix::sys::signal::kill(self.child_pid, nix::sys::signal::Signal::SIGHUP);
        let _ = waitpid(self.child_pid, None);
    }
}
