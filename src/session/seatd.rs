//! libseat session backend
//!
//! Opens input device nodes without root via seatd or logind and reports
//! seat activation changes (VT switches).

use std::cell::Cell;
use std::collections::HashMap;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::rc::Rc;
use std::sync::mpsc;

use anyhow::{Context, Result};
use libseat::{Device, Seat, SeatEvent, SeatRef};
use log::{debug, info, warn};

/// Seat activation change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Seat acquired, input flows to us again
    Enable,
    /// Seat released to another session
    Disable,
}

pub struct SeatSession {
    seat: Seat,
    active: Rc<Cell<bool>>,
    event_rx: mpsc::Receiver<SessionEvent>,
    /// Open seat devices by the fd handed out for them
    devices: HashMap<RawFd, Device>,
    /// Device nodes opened so far
    opened: usize,
}

impl SeatSession {
    pub fn open() -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel();
        let active = Rc::new(Cell::new(false));
        let callback_active = active.clone();

        let mut seat = Seat::open(move |seat_ref: &mut SeatRef, event: SeatEvent| match event {
            SeatEvent::Enable => {
                info!("libseat: session enabled");
                callback_active.set(true);
                let _ = event_tx.send(SessionEvent::Enable);
            }
            SeatEvent::Disable => {
                info!("libseat: session disabled");
                callback_active.set(false);
                // Must be acknowledged before the seat moves on
                if let Err(e) = seat_ref.disable() {
                    warn!("libseat: failed to disable seat: {}", e);
                }
                let _ = event_tx.send(SessionEvent::Disable);
            }
        })
        .context("Failed to open libseat session")?;

        info!("libseat: opened seat '{}'", seat.name());

        Ok(Self {
            seat,
            active,
            event_rx,
            devices: HashMap::new(),
            opened: 0,
        })
    }

    pub fn name(&mut self) -> &str {
        self.seat.name()
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Pollable seat fd
    pub fn get_fd(&mut self) -> Result<RawFd> {
        let fd = self.seat.get_fd().context("Failed to get seat fd")?;
        Ok(fd.as_raw_fd())
    }

    /// Dispatch pending seat events without blocking
    pub fn dispatch(&mut self) -> Result<bool> {
        let count = self
            .seat
            .dispatch(0)
            .context("Failed to dispatch seat events")?;
        Ok(count > 0)
    }

    pub fn try_recv_event(&self) -> Option<SessionEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Open an input device node. The returned fd is a duplicate owned by
    /// the caller; it stays valid while the session is active. Hand it back
    /// to [`SeatSession::close_device`] before closing it.
    pub fn open_device<P: AsRef<Path>>(&mut self, path: P) -> Result<OwnedFd> {
        let path = path.as_ref();
        let device = self
            .seat
            .open_device(&path)
            .with_context(|| format!("libseat refused {}", path.display()))?;

        let raw_fd = device.as_fd().as_raw_fd();
        let dup_fd = nix::unistd::dup(raw_fd).context("Failed to dup device fd")?;
        // SAFETY: dup returned a fresh descriptor nobody else owns
        let fd = unsafe { OwnedFd::from_raw_fd(dup_fd) };

        self.devices.insert(dup_fd, device);
        self.opened += 1;
        debug!("libseat: opened {} (fd={}, total={})", path.display(), dup_fd, self.opened);
        Ok(fd)
    }

    /// Release the seat device behind an fd from [`SeatSession::open_device`]
    pub fn close_device(&mut self, fd: RawFd) -> Result<()> {
        let Some(device) = self.devices.remove(&fd) else {
            debug!("libseat: fd {} is not a seat device", fd);
            return Ok(());
        };
        self.seat
            .close_device(device)
            .with_context(|| format!("libseat failed to close device fd {}", fd))?;
        debug!("libseat: closed device fd={} ({} still open)", fd, self.devices.len());
        Ok(())
    }
}

impl Drop for SeatSession {
    fn drop(&mut self) {
        info!(
            "libseat: closing session after {} device opens, {} still open",
            self.opened,
            self.devices.len()
        );
    }
}
