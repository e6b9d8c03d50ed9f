//! Raw input device contract
//!
//! What the core needs from the input subsystem: device identity,
//! a name for logs, the keyboard capability and an LED line.

use std::cell::{Cell, OnceCell};
use std::fmt;
use std::rc::Rc;

use super::keymap::{KeyDirection, Locks};

/// Identity of a raw device handle, valid while the device is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Physical input device as seen by the core
pub trait InputDevice {
    fn id(&self) -> DeviceId;

    fn name(&self) -> String;

    /// Kernel node name ("event3"). Survives a libinput suspend/resume,
    /// unlike the identity.
    fn sysname(&self) -> String;

    fn is_keyboard(&self) -> bool;

    /// Push the {Caps, Num, Scroll} LED mask to the hardware
    fn update_leds(&self, leds: Locks);
}

/// Reference-counted device handle
pub type DeviceHandle = Rc<dyn InputDevice>;

/// Event delivered by the raw input source
pub enum RawEvent {
    DeviceAdded(DeviceHandle),
    DeviceRemoved(DeviceHandle),
    Key {
        device: DeviceHandle,
        /// evdev keycode
        keycode: u32,
        direction: KeyDirection,
    },
}

/// Raw input source drained by the controller
pub trait EventSource {
    /// Read everything pending, in arrival order
    fn dispatch(&mut self) -> std::io::Result<Vec<RawEvent>>;

    /// Pollable readiness fd, if the source has one
    fn raw_fd(&self) -> Option<i32>;

    /// Release every device. Removal events follow on the next dispatch.
    fn suspend(&mut self);

    /// Reopen the devices released by [`EventSource::suspend`].
    /// Add events follow on the next dispatch.
    fn resume(&mut self) -> std::io::Result<()>;
}

/// Write-once slot for the first device open failure
#[derive(Clone, Default)]
pub struct ErrorSlot {
    inner: Rc<ErrorSlotInner>,
}

#[derive(Default)]
struct ErrorSlotInner {
    message: OnceCell<String>,
    reported: Cell<bool>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` unless a failure was already recorded.
    /// Returns true if this call set the slot.
    pub fn set(&self, message: impl Into<String>) -> bool {
        self.inner.message.set(message.into()).is_ok()
    }

    pub fn failed(&self) -> bool {
        self.inner.message.get().is_some()
    }

    pub fn message(&self) -> Option<&str> {
        self.inner.message.get().map(String::as_str)
    }

    /// The recorded failure, returned once
    pub fn take_notice(&self) -> Option<String> {
        let message = self.inner.message.get()?;
        if self.inner.reported.replace(true) {
            return None;
        }
        Some(message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_slot_is_sticky() {
        let slot = ErrorSlot::new();
        assert!(!slot.failed());
        assert!(slot.take_notice().is_none());

        let shared = slot.clone();
        assert!(shared.set("permission denied"));
        assert!(!slot.set("second failure"));

        assert!(slot.failed());
        assert_eq!(slot.message(), Some("permission denied"));
        assert_eq!(slot.take_notice().as_deref(), Some("permission denied"));
        assert!(slot.take_notice().is_none());
        assert_eq!(slot.message(), Some("permission denied"));
    }
}
