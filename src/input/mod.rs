//! Keyboard input
//!
//! - libinput raw events from every device on a seat
//! - one xkbcommon state machine per keyboard
//! - the selection protocol that binds a keyboard to a pane

pub mod controller;
pub mod device;
pub mod keyboard;
pub mod keycodes;
pub mod keymap;
pub mod libinput;
pub mod list;

#[cfg(test)]
pub mod testing;

pub use controller::{Controller, ControllerError, ControllerOptions};
pub use device::ErrorSlot;
pub use keyboard::{KeyEvent, Keyboard, KeyboardEvent, KeyboardRef, RepeatTiming};
pub use keymap::{KeyDirection, KeymapError, LayoutId, Lock, Locks, Modifiers};
pub use libinput::DeviceOpener;
pub use list::{ListChange, ObservableList};
