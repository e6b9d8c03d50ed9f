//! Terminal panes
//!
//! One pane per bound keyboard. A pane forwards its keyboard's events to a
//! shell on a PTY and copies the shell's output to stdout. The pane list
//! mirrors the controller's enabled list position by position.

pub mod keys;
pub mod pty;

use std::io::Write;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::mpsc;

use anyhow::Result;
use log::{debug, error, info, warn};

use crate::config::TerminalConfig;
use crate::input::{KeyboardEvent, KeyboardRef, ListChange};
use pty::Pty;

const READ_CHUNK: usize = 4096;

pub struct Pane {
    /// Stable identity for output headers
    serial: u64,
    keyboard: KeyboardRef,
    events: mpsc::Receiver<KeyboardEvent>,
    /// None when the shell could not be started
    pty: Option<Pty>,
}

impl Pane {
    fn open(serial: u64, keyboard: KeyboardRef, term: &TerminalConfig) -> Self {
        let events = keyboard.borrow_mut().subscribe();
        let pty = match Pty::spawn(&term.shell_command(), &term.term_env) {
            Ok(pty) => Some(pty),
            Err(e) => {
                error!("pane {}: cannot start shell: {:#}", serial, e);
                None
            }
        };
        Self {
            serial,
            keyboard,
            events,
            pty,
        }
    }

    /// Index digit the pane was bound with
    pub fn label(&self) -> u32 {
        self.keyboard.borrow().index_digit()
    }

    fn forward_input(&mut self) -> Result<()> {
        for event in self.events.try_iter() {
            let KeyboardEvent::Key(key) = event else {
                continue;
            };
            let Some(pty) = self.pty.as_ref() else {
                continue;
            };
            let bytes = keys::encode_key(&key);
            if !bytes.is_empty() {
                pty.write_all(&bytes)?;
            }
        }
        Ok(())
    }

    fn read_output(&mut self, buf: &mut [u8]) -> Vec<u8> {
        let mut output = Vec::new();
        let Some(pty) = self.pty.as_ref() else {
            return output;
        };
        loop {
            match pty.read(buf) {
                Ok(0) => break,
                Ok(n) => output.extend_from_slice(&buf[..n]),
                // EIO once the shell side is closed
                Err(_) => break,
            }
        }
        output
    }

    /// Restart an exited shell with a clean keyboard state.
    /// Returns false if the shell could not be restarted.
    fn respawn_if_exited(&mut self, term: &TerminalConfig) -> bool {
        let Some(pty) = self.pty.as_mut() else {
            return false;
        };
        if pty.is_alive() {
            return true;
        }

        info!("pane {}: shell exited, respawning", self.serial);
        self.keyboard.borrow_mut().reset(true);
        // Drop keys typed at the dead shell
        self.events.try_iter().for_each(drop);

        match Pty::spawn(&term.shell_command(), &term.term_env) {
            Ok(pty) => {
                self.pty = Some(pty);
                true
            }
            Err(e) => {
                error!("pane {}: cannot restart shell: {:#}", self.serial, e);
                self.pty = None;
                false
            }
        }
    }
}

/// Panes in enabled-list order
pub struct Panes {
    panes: Vec<Pane>,
    term: TerminalConfig,
    next_serial: u64,
    /// Pane whose output was printed last
    last_output: Option<u64>,
}

impl Panes {
    pub fn new(term: TerminalConfig) -> Self {
        Self {
            panes: Vec::new(),
            term,
            next_serial: 1,
            last_output: None,
        }
    }

    /// Panes currently open
    pub fn open_count(&self) -> usize {
        self.panes.len()
    }

    /// Mirror one change of the enabled list. Returns the keyboard of a
    /// pane whose shell failed to start; the caller unbinds it.
    pub fn apply(&mut self, change: ListChange<KeyboardRef>) -> Option<KeyboardRef> {
        match change {
            ListChange::Inserted(position, keyboard) => {
                let serial = self.next_serial;
                self.next_serial += 1;

                let pane = Pane::open(serial, keyboard.clone(), &self.term);
                let failed = pane.pty.is_none();
                debug!(
                    "pane {}: opened at {} for '{}'",
                    serial,
                    position,
                    keyboard.borrow().name()
                );
                self.panes.insert(position.min(self.panes.len()), pane);
                failed.then_some(keyboard)
            }
            ListChange::Removed(position, keyboard) => {
                let found = self
                    .panes
                    .get(position)
                    .filter(|pane| Rc::ptr_eq(&pane.keyboard, &keyboard))
                    .map(|_| position)
                    .or_else(|| {
                        self.panes
                            .iter()
                            .position(|pane| Rc::ptr_eq(&pane.keyboard, &keyboard))
                    });
                match found {
                    Some(position) => {
                        let pane = self.panes.remove(position);
                        debug!("pane {}: closed", pane.serial);
                    }
                    None => warn!("No pane for '{}'", keyboard.borrow().name()),
                }
                None
            }
        }
    }

    /// PTY fds to poll for output
    pub fn poll_fds(&self) -> Vec<RawFd> {
        self.panes
            .iter()
            .filter_map(|pane| pane.pty.as_ref().map(Pty::raw_fd))
            .collect()
    }

    /// Forward queued keys, copy output to `out`, restart exited shells.
    /// Returns keyboards whose pane must be closed.
    pub fn service(&mut self, out: &mut impl Write) -> Vec<KeyboardRef> {
        let mut buf = [0u8; READ_CHUNK];
        let mut closed = Vec::new();

        for pane in self.panes.iter_mut() {
            if let Err(e) = pane.forward_input() {
                warn!("pane {}: {:#}", pane.serial, e);
            }

            let output = pane.read_output(&mut buf);
            if !output.is_empty() {
                if self.last_output != Some(pane.serial) {
                    let _ = write!(out, "{}", pane_header(pane.label()));
                    self.last_output = Some(pane.serial);
                }
                let _ = out.write_all(&output);
            }

            if !pane.respawn_if_exited(&self.term) {
                closed.push(pane.keyboard.clone());
            }
        }

        let _ = out.flush();
        closed
    }
}

/// Separator printed when output switches panes
fn pane_header(label: u32) -> String {
    format!("\r\n-- pane {} --\r\n", label)
}
