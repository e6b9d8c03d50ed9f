//! Device registry and event demultiplexer
//!
//! Owns the raw event source, keeps one [`Keyboard`] per keyboard-capable
//! device and routes raw key events to it. Exposes the full keyboard list
//! and the list of keyboards bound to a pane.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use thiserror::Error;
use xkbcommon::xkb::keysyms;

use super::device::{DeviceHandle, DeviceId, ErrorSlot, EventSource, RawEvent};
use super::keyboard::{Keyboard, KeyboardRef, RepeatTiming};
use super::keymap::{KeymapCompiler, KeymapError, LayoutId, Lock, XkbCompiler};
use super::libinput::{DeviceOpener, LibinputSource};
use super::list::{ListChange, ObservableList};
use crate::constants::{LED_RESYNC_DELAY_MS, SELECTION_SLOTS};
use crate::session::console::SystemLocks;

/// Controller errors
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to assign seat '{0}' to the libinput context")]
    Seat(String),
    #[error("libinput I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("device {0} is already claimed by a keyboard")]
    AlreadyClaimed(DeviceId),
    #[error(transparent)]
    Keymap(#[from] KeymapError),
}

/// Settings applied to every keyboard the controller creates
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Display layout, None for plain US
    pub layout: Option<LayoutId>,
    pub repeat: RepeatTiming,
}

pub struct Controller {
    source: Box<dyn EventSource>,
    compiler: Rc<dyn KeymapCompiler>,
    options: ControllerOptions,
    /// device identity -> keyboard
    registry: HashMap<DeviceId, KeyboardRef>,
    keyboards: ObservableList<KeyboardRef>,
    enabled: ObservableList<KeyboardRef>,
    ignore_keypress: bool,
    errors: ErrorSlot,
    led_resync_at: Option<Instant>,
    /// Keyboards created so far, drives creation-order slots
    created: u32,
    /// While the source is suspended: keyboards whose device went away with
    /// it, by sysname
    suspended: Option<HashMap<String, KeyboardRef>>,
}

impl Controller {
    /// Open libinput on `seat` with the xkbcommon keymap backend.
    /// Failing to claim the seat is fatal.
    pub fn start(
        seat: &str,
        opener: DeviceOpener,
        options: ControllerOptions,
    ) -> Result<Self, ControllerError> {
        let errors = ErrorSlot::new();
        let source = LibinputSource::open(seat, opener, errors.clone())?;
        Ok(Self::new(
            Box::new(source),
            Rc::new(XkbCompiler::new()),
            errors,
            options,
        ))
    }

    pub fn new(
        source: Box<dyn EventSource>,
        compiler: Rc<dyn KeymapCompiler>,
        errors: ErrorSlot,
        options: ControllerOptions,
    ) -> Self {
        Self {
            source,
            compiler,
            options,
            registry: HashMap::new(),
            keyboards: ObservableList::new(),
            enabled: ObservableList::new(),
            ignore_keypress: false,
            errors,
            led_resync_at: None,
            created: 0,
            suspended: None,
        }
    }

    /// Every known keyboard, in creation order
    pub fn keyboards(&self) -> &ObservableList<KeyboardRef> {
        &self.keyboards
    }

    /// Keyboards bound to a pane, in binding order
    pub fn enabled(&self) -> &ObservableList<KeyboardRef> {
        &self.enabled
    }

    pub fn subscribe_keyboards(&mut self) -> mpsc::Receiver<ListChange<KeyboardRef>> {
        self.keyboards.subscribe()
    }

    pub fn subscribe_enabled(&mut self) -> mpsc::Receiver<ListChange<KeyboardRef>> {
        self.enabled.subscribe()
    }

    pub fn raw_fd(&self) -> Option<i32> {
        self.source.raw_fd()
    }

    /// True once any device failed to open
    pub fn failed(&self) -> bool {
        self.errors.failed()
    }

    /// First device open failure
    pub fn error(&self) -> Option<&str> {
        self.errors.message()
    }

    /// The first failure, reported once
    pub fn take_error_notice(&self) -> Option<String> {
        self.errors.take_notice()
    }

    /// Suppress key feeding (focus loss, VT switch). Turning suppression on
    /// resets every keyboard, keeping locks.
    pub fn ignore_keypress(&mut self, ignore: bool) {
        if ignore && !self.ignore_keypress {
            debug!("Ignoring key presses, resetting {} keyboards", self.keyboards.len());
            for keyboard in self.keyboards.iter() {
                keyboard.borrow_mut().reset(true);
            }
        }
        self.ignore_keypress = ignore;
    }

    /// Seat lost (VT switch away): stop feeding keys and let the source
    /// release its devices. Keyboards stay in both lists.
    pub fn suspend_at(&mut self, now: Instant) -> Result<(), ControllerError> {
        if self.suspended.is_some() {
            return Ok(());
        }
        self.ignore_keypress(true);
        self.source.suspend();
        self.suspended = Some(HashMap::new());
        self.dispatch_at(now)
    }

    /// Seat back: reopen the devices and pair every re-announced node with
    /// the keyboard it had before. Keyboards whose node did not come back
    /// are removed.
    pub fn resume_at(&mut self, now: Instant) -> Result<(), ControllerError> {
        if self.suspended.is_none() {
            return Ok(());
        }
        let result = match self.source.resume() {
            Ok(()) => self.dispatch_at(now),
            Err(e) => Err(e.into()),
        };

        let missing = self.suspended.take().unwrap_or_default();
        for (sysname, keyboard) in missing {
            info!("keyboard: '{}' ({}) did not come back", keyboard.borrow().name(), sysname);
            self.keyboards.remove_where(|k| Rc::ptr_eq(k, &keyboard));
            self.enabled.remove_where(|k| Rc::ptr_eq(k, &keyboard));
        }
        self.ignore_keypress(false);
        result
    }

    /// Set the display layout of every keyboard, present and future
    pub fn set_layout(&mut self, layout: &LayoutId) -> Result<(), KeymapError> {
        // Fail before touching any keyboard
        self.compiler.compile(layout)?;

        for keyboard in self.keyboards.iter() {
            let mut keyboard = keyboard.borrow_mut();
            if let Err(e) = keyboard.set_layout(layout) {
                warn!("keyboard: '{}' keeps its layout: {}", keyboard.name(), e);
            }
        }

        info!("Keyboard layout set to '{}'", layout);
        self.options.layout = Some(layout.clone());
        Ok(())
    }

    /// Detach a bound keyboard from its pane. Returns false if it was not bound.
    pub fn remove(&mut self, keyboard: &KeyboardRef) -> bool {
        let removed = self
            .enabled
            .remove_where(|k| Rc::ptr_eq(k, keyboard))
            .is_some();
        if removed {
            debug!("keyboard: '{}' unbound", keyboard.borrow().name());
        }
        removed
    }

    pub fn dispatch(&mut self) -> Result<(), ControllerError> {
        self.dispatch_at(Instant::now())
    }

    /// Drain the raw event source, in arrival order
    pub fn dispatch_at(&mut self, now: Instant) -> Result<(), ControllerError> {
        let events = self.source.dispatch()?;
        for event in events {
            self.handle_event_at(event, now);
        }
        Ok(())
    }

    pub fn handle_event_at(&mut self, event: RawEvent, now: Instant) {
        match event {
            RawEvent::DeviceAdded(device) => {
                if !device.is_keyboard() {
                    debug!("Ignoring non-keyboard device '{}'", device.name());
                    return;
                }
                if self.registry.contains_key(&device.id()) {
                    return;
                }
                if self.reattach_device(&device) {
                    self.schedule_led_resync(now);
                    return;
                }
                if let Err(e) = self.add_device(device) {
                    warn!("keyboard: cannot create keyboard: {}", e);
                    return;
                }
                // New hardware does not know the system lock state yet
                self.schedule_led_resync(now);
            }
            RawEvent::DeviceRemoved(device) => self.remove_device(device),
            RawEvent::Key {
                device,
                keycode,
                direction,
            } => {
                if self.ignore_keypress {
                    return;
                }

                let keyboard = match self.registry.get(&device.id()) {
                    Some(keyboard) => keyboard.clone(),
                    None if device.is_keyboard() => match self.add_device(device) {
                        Ok(keyboard) => {
                            self.schedule_led_resync(now);
                            keyboard
                        }
                        Err(e) => {
                            warn!("keyboard: cannot create keyboard: {}", e);
                            return;
                        }
                    },
                    None => return,
                };

                let was_enabled = keyboard.borrow().is_enabled();
                if !was_enabled {
                    self.assign_slot(&keyboard);
                }

                let sym = keyboard.borrow_mut().feed_key_at(direction, keycode, now);

                if !was_enabled && keyboard.borrow().is_enabled() {
                    self.enabled.push(keyboard);
                }

                if is_lock_sym(sym) {
                    self.schedule_led_resync(now);
                }
            }
        }
    }

    /// Nearest repeat or LED-resync deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.keyboards
            .iter()
            .filter_map(|keyboard| keyboard.borrow().repeat_deadline())
            .chain(self.led_resync_at)
            .min()
    }

    /// Fire every timer due at `now`
    pub fn run_timers(&mut self, now: Instant) {
        if self.led_resync_at.is_some_and(|at| at <= now) {
            self.led_resync_at = None;
            for keyboard in self.keyboards.iter() {
                keyboard.borrow().update_leds();
            }
        }

        for keyboard in self.keyboards.iter() {
            keyboard.borrow_mut().poll_repeat_at(now);
        }
    }

    /// Leave every keyboard's locks matching the system lock state and
    /// release all devices.
    pub fn shutdown(mut self, system: &dyn SystemLocks) {
        let locks = system.read();
        if locks.is_none() {
            warn!("Cannot read the system lock state, leaving locks off");
        }

        for keyboard in self.keyboards.iter() {
            let mut keyboard = keyboard.borrow_mut();
            keyboard.reset(false);

            if let Some(locks) = locks {
                for lock in Lock::ALL {
                    if locks.contains(lock.flag()) {
                        keyboard.apply_lock(lock);
                    }
                }
                keyboard.update_leds();
            }
        }

        info!("Released {} keyboards", self.keyboards.len());
        for (_, keyboard) in self.registry.drain() {
            keyboard.borrow_mut().detach_device();
        }
    }

    fn add_device(&mut self, device: DeviceHandle) -> Result<KeyboardRef, ControllerError> {
        let id = device.id();
        if self.registry.contains_key(&id) {
            return Err(ControllerError::AlreadyClaimed(id));
        }

        let mut keyboard = Keyboard::new(device, self.compiler.clone(), self.options.repeat)?;

        if let Some(layout) = &self.options.layout {
            if let Err(e) = keyboard.set_layout(layout) {
                warn!(
                    "keyboard: '{}' falls back to us: {}",
                    keyboard.name(),
                    e
                );
            }
        }

        self.created += 1;
        keyboard.set_index(slot_sym(self.created));

        let keyboard = keyboard.into_ref();
        self.registry.insert(id, keyboard.clone());
        self.keyboards.push(keyboard.clone());
        Ok(keyboard)
    }

    fn remove_device(&mut self, device: DeviceHandle) {
        let Some(keyboard) = self.registry.remove(&device.id()) else {
            return;
        };

        if let Some(suspended) = self.suspended.as_mut() {
            debug!("keyboard: '{}' parked until resume", keyboard.borrow().name());
            keyboard.borrow_mut().detach_device();
            suspended.insert(device.sysname(), keyboard);
            return;
        }

        info!("keyboard: '{}' removed", keyboard.borrow().name());
        keyboard.borrow_mut().detach_device();
        self.keyboards.remove_where(|k| Rc::ptr_eq(k, &keyboard));
        self.enabled.remove_where(|k| Rc::ptr_eq(k, &keyboard));
    }

    /// Hand a re-announced node back to its keyboard. Only while suspended.
    fn reattach_device(&mut self, device: &DeviceHandle) -> bool {
        let Some(keyboard) = self
            .suspended
            .as_mut()
            .and_then(|suspended| suspended.remove(&device.sysname()))
        else {
            return false;
        };

        keyboard.borrow_mut().attach_device(device.clone());
        self.registry.insert(device.id(), keyboard);
        true
    }

    /// Keep the creation-order slot unless a bound keyboard already uses it.
    /// Otherwise take `enabled count + 1`, or the first free slot.
    fn assign_slot(&self, keyboard: &KeyboardRef) {
        let taken: Vec<u32> = self
            .enabled
            .iter()
            .map(|k| k.borrow().index_sym())
            .collect();

        let current = keyboard.borrow().index_sym();
        if !taken.contains(&current) {
            return;
        }

        let by_position = slot_sym(self.enabled.len() as u32 + 1);
        let sym = if !taken.contains(&by_position) {
            by_position
        } else {
            (1..=SELECTION_SLOTS)
                .map(slot_sym)
                .find(|sym| !taken.contains(sym))
                .unwrap_or(by_position)
        };

        keyboard.borrow_mut().set_index(sym);
    }

    fn schedule_led_resync(&mut self, now: Instant) {
        if self.led_resync_at.is_none() {
            self.led_resync_at = Some(now + Duration::from_millis(LED_RESYNC_DELAY_MS));
        }
    }
}

/// Digit keysym of slot `n`: 1..9, then 0, wrapping
fn slot_sym(n: u32) -> u32 {
    keysyms::KEY_0 + n % SELECTION_SLOTS
}

fn is_lock_sym(sym: u32) -> bool {
    matches!(
        sym,
        keysyms::KEY_Caps_Lock | keysyms::KEY_Num_Lock | keysyms::KEY_Scroll_Lock
    )
}
