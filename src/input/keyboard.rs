//! Per-device keyboard state machine
//!
//! Each physical keyboard owns two keymap/state pairs:
//! - the US pair, authoritative for index-key detection, modifier tracking,
//!   LEDs and for every symbol produced while Control is held
//! - the optional display pair, used to resolve symbols in the user's layout
//!
//! A keyboard starts parked. Parked keyboards only watch for their index
//! digit; once it is pressed without modifiers the keyboard is bound and
//! forwards every key as a [`KeyEvent`] to its subscribers.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use xkbcommon::xkb;
use xkbcommon::xkb::keysyms;

use super::device::{DeviceHandle, DeviceId};
use super::keymap::{
    CompiledLayout, KeyDirection, KeymapCompiler, KeymapError, LayoutId, Lock, Locks, Modifiers,
};
use crate::constants::{INITIAL_REPEAT_TIMEOUT_MS, REPEAT_TIMEOUT_MS};

/// Shared handle to a keyboard (controller lists and panes)
pub type KeyboardRef = Rc<RefCell<Keyboard>>;

/// Resolved key press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub direction: KeyDirection,
    /// keysym
    pub sym: u32,
    pub modifiers: Modifiers,
}

/// Outbound keyboard event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardEvent {
    Key(KeyEvent),
    /// The keyboard went from parked to bound
    Enabled,
}

/// Auto-repeat timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatTiming {
    /// Delay before the first repeat
    pub delay: Duration,
    /// Interval between later repeats
    pub interval: Duration,
}

impl Default for RepeatTiming {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(INITIAL_REPEAT_TIMEOUT_MS),
            interval: Duration::from_millis(REPEAT_TIMEOUT_MS),
        }
    }
}

/// Pending repeat of the last pressed key
#[derive(Debug, Clone, Copy)]
struct Repeat {
    sym: u32,
    deadline: Instant,
}

pub struct Keyboard {
    /// None once the device has been removed
    device: Option<DeviceHandle>,
    name: String,
    us: CompiledLayout,
    display: Option<CompiledLayout>,
    layout: Option<LayoutId>,
    index_sym: u32,
    enabled: bool,
    repeat: Option<Repeat>,
    timing: RepeatTiming,
    compiler: Rc<dyn KeymapCompiler>,
    listeners: Vec<mpsc::Sender<KeyboardEvent>>,
}

impl Keyboard {
    /// Create the state machine for `device`.
    ///
    /// Compiles the US keymap eagerly and turns Num Lock on.
    pub fn new(
        device: DeviceHandle,
        compiler: Rc<dyn KeymapCompiler>,
        timing: RepeatTiming,
    ) -> Result<Self, KeymapError> {
        let us = compiler.compile(&LayoutId::us())?;
        let name = device.name();

        let mut keyboard = Self {
            device: Some(device),
            name,
            us,
            display: None,
            layout: None,
            index_sym: keysyms::KEY_0,
            enabled: false,
            repeat: None,
            timing,
            compiler,
            listeners: Vec::new(),
        };

        // Num Lock on by default
        keyboard.apply_lock(Lock::Num);

        info!("keyboard: created for '{}'", keyboard.name);
        Ok(keyboard)
    }

    pub fn into_ref(self) -> KeyboardRef {
        Rc::new(RefCell::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_id(&self) -> Option<DeviceId> {
        self.device.as_ref().map(|device| device.id())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Index keysym (one of XKB_KEY_0..XKB_KEY_9)
    pub fn index_sym(&self) -> u32 {
        self.index_sym
    }

    /// Index as a digit 0-9
    pub fn index_digit(&self) -> u32 {
        self.index_sym - keysyms::KEY_0
    }

    pub fn layout(&self) -> Option<&LayoutId> {
        self.layout.as_ref()
    }

    /// Locks active in the US state
    pub fn locks(&self) -> Locks {
        self.us.state.active_locks()
    }

    /// Modifiers held, as tracked by the US state
    pub fn modifiers(&self) -> Modifiers {
        self.us.state.active_modifiers()
    }

    /// Subscribe to key and enablement events
    pub fn subscribe(&mut self) -> mpsc::Receiver<KeyboardEvent> {
        let (tx, rx) = mpsc::channel();
        self.listeners.push(tx);
        rx
    }

    /// Set the display layout. The US pair keeps handling index keys and
    /// Control chords. On failure the previous layout stays active.
    pub fn set_layout(&mut self, layout: &LayoutId) -> Result<(), KeymapError> {
        let mut display = self.compiler.compile(layout)?;

        let locks = self.locks();
        for lock in Lock::ALL {
            if locks.contains(lock.flag()) {
                display.tap_lock(lock);
            }
        }

        debug!("keyboard: '{}' layout set to '{}'", self.name, layout);
        self.display = Some(display);
        self.layout = Some(layout.clone());
        Ok(())
    }

    /// Set the index keysym. Ignored once the keyboard is bound.
    pub fn set_index(&mut self, sym: u32) {
        if !(keysyms::KEY_0..=keysyms::KEY_9).contains(&sym) {
            warn!("keyboard: rejecting non-digit index keysym {:#x}", sym);
            return;
        }

        if self.enabled {
            return;
        }

        trace!("keyboard: '{}' index set to {}", self.name, sym - keysyms::KEY_0);
        self.index_sym = sym;
    }

    /// Deadline of the pending repeat, if any
    pub fn repeat_deadline(&self) -> Option<Instant> {
        self.repeat.map(|repeat| repeat.deadline)
    }

    pub fn feed_key(&mut self, direction: KeyDirection, keycode: u32) -> u32 {
        self.feed_key_at(direction, keycode, Instant::now())
    }

    /// Feed a raw key event. Returns the resolved keysym: the US symbol
    /// while Control is held, the display-layout symbol otherwise.
    pub fn feed_key_at(&mut self, direction: KeyDirection, keycode: u32, now: Instant) -> u32 {
        if self.device.is_none() {
            return keysyms::KEY_NoSymbol;
        }

        let sym_us = self.us.state.key_get_one_sym(keycode);
        let sym_display = self
            .display
            .as_ref()
            .map_or(sym_us, |display| display.state.key_get_one_sym(keycode));
        let repeats = self
            .display
            .as_ref()
            .unwrap_or(&self.us)
            .keymap
            .key_repeats(keycode);

        // Press: the modifier itself counts. Release: it still counts.
        let modifiers = match direction {
            KeyDirection::Down => {
                self.update_states(keycode, direction);
                self.modifiers()
            }
            KeyDirection::Up => {
                let modifiers = self.modifiers();
                self.update_states(keycode, direction);
                modifiers
            }
        };

        // Control chords are layout-invariant
        let sym = if modifiers.contains(Modifiers::CONTROL) {
            sym_us
        } else {
            sym_display
        };

        self.repeat = None;

        if self.enabled {
            self.emit_key(direction, sym, modifiers);

            if direction == KeyDirection::Down && repeats {
                self.repeat = Some(Repeat {
                    sym,
                    deadline: now + self.timing.delay,
                });
            }
        } else if direction == KeyDirection::Down
            && self.is_index_sym(sym_us)
            && modifiers.is_empty()
        {
            self.enable();
        }

        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "keyboard: effective keys: '{}', {} '{}', dev: '{}'",
                describe_keys(sym, modifiers),
                match direction {
                    KeyDirection::Down => "pressed",
                    KeyDirection::Up => "released",
                },
                xkb::keysym_get_name(xkb::Keysym::new(sym)),
                self.name
            );
        }

        sym
    }

    /// Fire the repeat timer if it is due. Returns true if a repeat was emitted.
    pub fn poll_repeat_at(&mut self, now: Instant) -> bool {
        let Some(repeat) = self.repeat else {
            return false;
        };

        if self.device.is_none() || !self.enabled {
            self.repeat = None;
            return false;
        }

        if now < repeat.deadline {
            return false;
        }

        self.repeat = Some(Repeat {
            sym: repeat.sym,
            deadline: now + self.timing.interval,
        });

        let modifiers = self.modifiers();
        self.emit_key(KeyDirection::Down, repeat.sym, modifiers);
        self.emit_key(KeyDirection::Up, repeat.sym, modifiers);

        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "keyboard: Repeat effective keys: '{}', dev: '{}'",
                describe_keys(repeat.sym, modifiers),
                self.name
            );
        }

        true
    }

    /// Drop pending repeats and modifier state. With `keep_locks`, the
    /// Caps/Num/Scroll locks of the previous state are re-applied.
    pub fn reset(&mut self, keep_locks: bool) {
        self.repeat = None;

        let previous = self.us.replace_state();
        if let Some(display) = self.display.as_mut() {
            display.replace_state();
        }

        debug!("keyboard: resetting '{}', keep-locks: {}", self.name, keep_locks);

        if keep_locks {
            let locks = previous.active_locks();
            for lock in Lock::ALL {
                if locks.contains(lock.flag()) {
                    self.apply_lock(lock);
                }
            }
        }

        self.update_leds();
    }

    /// Toggle a lock in both states without emitting events
    pub fn apply_lock(&mut self, lock: Lock) {
        self.us.tap_lock(lock);
        if let Some(display) = self.display.as_mut() {
            display.tap_lock(lock);
        }
    }

    /// Push the US state's locks to the hardware LEDs
    pub fn update_leds(&self) {
        let Some(device) = self.device.as_ref() else {
            return;
        };

        let leds = self.locks();
        device.update_leds(leds);

        trace!(
            "keyboard: updated '{}' LEDs. Caps: {}, Num: {}, Scroll: {}",
            self.name,
            leds.contains(Locks::CAPS),
            leds.contains(Locks::NUM),
            leds.contains(Locks::SCROLL)
        );
    }

    /// Forget the device after hardware removal
    pub fn detach_device(&mut self) {
        self.device = None;
        self.repeat = None;
    }

    /// Take over the handle libinput reports for the same node after a resume
    pub fn attach_device(&mut self, device: DeviceHandle) {
        debug!("keyboard: '{}' reattached ({})", self.name, device.id());
        self.device = Some(device);
    }

    fn is_index_sym(&self, sym: u32) -> bool {
        sym == self.index_sym || sym == self.index_sym - keysyms::KEY_0 + keysyms::KEY_KP_0
    }

    fn update_states(&mut self, keycode: u32, direction: KeyDirection) {
        self.us.state.update_key(keycode, direction);
        if let Some(display) = self.display.as_mut() {
            display.state.update_key(keycode, direction);
        }
    }

    fn enable(&mut self) {
        info!(
            "keyboard: '{}' bound with index {}",
            self.name,
            self.index_digit()
        );
        self.enabled = true;
        self.send(KeyboardEvent::Enabled);
    }

    fn emit_key(&mut self, direction: KeyDirection, sym: u32, modifiers: Modifiers) {
        // Alt+Tab belongs to the window manager
        if modifiers == Modifiers::ALT && sym == keysyms::KEY_Tab {
            return;
        }

        self.send(KeyboardEvent::Key(KeyEvent {
            direction,
            sym,
            modifiers,
        }));
    }

    fn send(&mut self, event: KeyboardEvent) {
        self.listeners.retain(|tx| tx.send(event).is_ok());
    }
}

impl Drop for Keyboard {
    fn drop(&mut self) {
        trace!("keyboard: finalizing '{}'", self.name);
    }
}

/// Human-readable chord, e.g. "Control + Alt + Tab"
pub fn describe_keys(sym: u32, modifiers: Modifiers) -> String {
    let mut keys = String::new();

    if modifiers.contains(Modifiers::SUPER)
        && sym != keysyms::KEY_Super_L
        && sym != keysyms::KEY_Super_R
    {
        keys.push_str("Super + ");
    }
    if modifiers.contains(Modifiers::CONTROL)
        && sym != keysyms::KEY_Control_L
        && sym != keysyms::KEY_Control_R
    {
        keys.push_str("Control + ");
    }
    if modifiers.contains(Modifiers::ALT) && sym != keysyms::KEY_Alt_L && sym != keysyms::KEY_Alt_R
    {
        keys.push_str("Alt + ");
    }
    if modifiers.contains(Modifiers::SHIFT)
        && sym != keysyms::KEY_Shift_L
        && sym != keysyms::KEY_Shift_R
    {
        keys.push_str("Shift + ");
    }

    keys.push_str(&xkb::keysym_get_name(xkb::Keysym::new(sym)));
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::keycodes::*;
    use crate::input::testing::{FakeDevice, TableCompiler};

    fn keyboard() -> (Keyboard, Rc<FakeDevice>) {
        let device = FakeDevice::keyboard(1);
        let keyboard = Keyboard::new(
            device.clone(),
            Rc::new(TableCompiler),
            RepeatTiming::default(),
        )
        .unwrap();
        (keyboard, device)
    }

    fn tap(keyboard: &mut Keyboard, keycode: u32, now: Instant) -> u32 {
        let sym = keyboard.feed_key_at(KeyDirection::Down, keycode, now);
        keyboard.feed_key_at(KeyDirection::Up, keycode, now);
        sym
    }

    fn bound_keyboard() -> (Keyboard, Rc<FakeDevice>, mpsc::Receiver<KeyboardEvent>) {
        let (mut keyboard, device) = keyboard();
        let rx = keyboard.subscribe();
        tap(&mut keyboard, KEY_0, Instant::now());
        assert!(keyboard.is_enabled());
        assert_eq!(rx.try_recv(), Ok(KeyboardEvent::Enabled));
        // The release of the index key is already forwarded
        assert_eq!(keys(&rx).len(), 1);
        (keyboard, device, rx)
    }

    fn keys(rx: &mpsc::Receiver<KeyboardEvent>) -> Vec<KeyEvent> {
        rx.try_iter()
            .filter_map(|event| match event {
                KeyboardEvent::Key(key) => Some(key),
                KeyboardEvent::Enabled => None,
            })
            .collect()
    }

    #[test]
    fn test_new_keyboard_is_parked_with_num_lock() {
        let (keyboard, _device) = keyboard();
        assert!(!keyboard.is_enabled());
        assert_eq!(keyboard.index_sym(), keysyms::KEY_0);
        assert_eq!(keyboard.locks(), Locks::NUM);
        assert!(keyboard.modifiers().is_empty());
    }

    #[test]
    fn test_index_activation_for_every_digit() {
        for digit in 0..10 {
            for keycode in [digit_row_key(digit), keypad_key(digit)] {
                let (mut keyboard, _device) = keyboard();
                keyboard.set_index(keysyms::KEY_0 + digit);
                keyboard.feed_key_at(KeyDirection::Down, keycode, Instant::now());
                assert!(keyboard.is_enabled(), "digit {} key {}", digit, keycode);
            }
        }
    }

    #[test]
    fn test_index_with_modifier_stays_parked() {
        for modifier in [KEY_LEFTSHIFT, KEY_LEFTCTRL, KEY_LEFTALT, KEY_LEFTMETA] {
            let (mut keyboard, _device) = keyboard();
            keyboard.set_index(keysyms::KEY_3);
            let now = Instant::now();
            keyboard.feed_key_at(KeyDirection::Down, modifier, now);
            keyboard.feed_key_at(KeyDirection::Down, digit_row_key(3), now);
            assert!(!keyboard.is_enabled());
        }
    }

    #[test]
    fn test_other_digit_and_release_do_not_bind() {
        let (mut keyboard, _device) = keyboard();
        keyboard.set_index(keysyms::KEY_2);
        let now = Instant::now();
        tap(&mut keyboard, digit_row_key(1), now);
        keyboard.feed_key_at(KeyDirection::Up, digit_row_key(2), now);
        assert!(!keyboard.is_enabled());
    }

    #[test]
    fn test_activating_press_is_not_forwarded() {
        let (mut keyboard, _device) = keyboard();
        let rx = keyboard.subscribe();
        let now = Instant::now();
        keyboard.feed_key_at(KeyDirection::Down, KEY_0, now);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![KeyboardEvent::Enabled]);

        keyboard.feed_key_at(KeyDirection::Up, KEY_0, now);
        let events = keys(&rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, KeyDirection::Up);
        assert_eq!(events[0].sym, keysyms::KEY_0);
    }

    #[test]
    fn test_set_index_frozen_while_bound() {
        let (mut keyboard, _device, _rx) = bound_keyboard();
        keyboard.set_index(keysyms::KEY_5);
        assert_eq!(keyboard.index_sym(), keysyms::KEY_0);
    }

    #[test]
    fn test_set_index_rejects_non_digit() {
        let (mut keyboard, _device) = keyboard();
        keyboard.set_index(keysyms::KEY_a);
        assert_eq!(keyboard.index_sym(), keysyms::KEY_0);
    }

    #[test]
    fn test_display_layout_resolves_symbols() {
        let (mut keyboard, _device, rx) = bound_keyboard();
        keyboard.set_layout(&"de".parse().unwrap()).unwrap();

        let now = Instant::now();
        assert_eq!(tap(&mut keyboard, KEY_Z, now), keysyms::KEY_y);
        assert_eq!(tap(&mut keyboard, KEY_Y, now), keysyms::KEY_z);

        let events = keys(&rx);
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].sym, keysyms::KEY_y);
        assert_eq!(events[0].direction, KeyDirection::Down);
        assert_eq!(events[1].direction, KeyDirection::Up);
    }

    #[test]
    fn test_control_chord_is_layout_invariant() {
        for layout in ["us", "de"] {
            let (mut keyboard, _device, rx) = bound_keyboard();
            keyboard.set_layout(&layout.parse().unwrap()).unwrap();
            let now = Instant::now();

            keyboard.feed_key_at(KeyDirection::Down, KEY_LEFTCTRL, now);
            let down = keyboard.feed_key_at(KeyDirection::Down, KEY_Z, now);
            let up = keyboard.feed_key_at(KeyDirection::Up, KEY_Z, now);
            keyboard.feed_key_at(KeyDirection::Up, KEY_LEFTCTRL, now);

            assert_eq!(down, keysyms::KEY_z, "layout {}", layout);
            assert_eq!(up, keysyms::KEY_z, "layout {}", layout);

            let events = keys(&rx);
            assert!(events
                .iter()
                .all(|event| event.modifiers == Modifiers::CONTROL));
        }
    }

    #[test]
    fn test_release_snapshot_includes_released_modifier() {
        let (mut keyboard, _device, rx) = bound_keyboard();
        let now = Instant::now();
        keyboard.feed_key_at(KeyDirection::Down, KEY_LEFTSHIFT, now);
        keyboard.feed_key_at(KeyDirection::Up, KEY_LEFTSHIFT, now);

        let events = keys(&rx);
        assert_eq!(events[0].modifiers, Modifiers::SHIFT);
        assert_eq!(events[1].modifiers, Modifiers::SHIFT);
        assert!(keyboard.modifiers().is_empty());
    }

    #[test]
    fn test_unknown_layout_keeps_previous() {
        let (mut keyboard, _device) = keyboard();
        keyboard.set_layout(&"de".parse().unwrap()).unwrap();
        assert!(keyboard.set_layout(&"xx".parse().unwrap()).is_err());
        assert_eq!(keyboard.layout().map(|l| l.to_string()).as_deref(), Some("de"));
    }

    #[test]
    fn test_set_layout_carries_locks() {
        let (mut keyboard, _device, rx) = bound_keyboard();
        keyboard.set_layout(&"de".parse().unwrap()).unwrap();
        // Num Lock was on before the layout change, keypad still yields digits
        assert_eq!(tap(&mut keyboard, keypad_key(7), Instant::now()), keysyms::KEY_KP_7);
        assert_eq!(keys(&rx).len(), 2);
    }

    #[test]
    fn test_alt_tab_is_suppressed() {
        let (mut keyboard, _device, rx) = bound_keyboard();
        let now = Instant::now();
        keyboard.feed_key_at(KeyDirection::Down, KEY_LEFTALT, now);
        tap(&mut keyboard, KEY_TAB, now);
        keyboard.feed_key_at(KeyDirection::Up, KEY_LEFTALT, now);

        let events = keys(&rx);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event.sym == keysyms::KEY_Alt_L));

        // Shift+Alt+Tab is not reserved
        keyboard.feed_key_at(KeyDirection::Down, KEY_LEFTALT, now);
        keyboard.feed_key_at(KeyDirection::Down, KEY_LEFTSHIFT, now);
        keyboard.feed_key_at(KeyDirection::Down, KEY_TAB, now);
        assert!(keys(&rx).iter().any(|event| event.sym == keysyms::KEY_Tab));
    }

    #[test]
    fn test_repeat_fires_after_delay_then_periodically() {
        let (mut keyboard, _device, rx) = bound_keyboard();
        let t0 = Instant::now();
        keyboard.feed_key_at(KeyDirection::Down, KEY_A, t0);
        assert_eq!(keys(&rx).len(), 1);
        assert_eq!(
            keyboard.repeat_deadline(),
            Some(t0 + Duration::from_millis(INITIAL_REPEAT_TIMEOUT_MS))
        );

        assert!(!keyboard.poll_repeat_at(t0 + Duration::from_millis(100)));
        assert!(keys(&rx).is_empty());

        let t1 = t0 + Duration::from_millis(250);
        assert!(keyboard.poll_repeat_at(t1));
        let events = keys(&rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].direction, KeyDirection::Down);
        assert_eq!(events[1].direction, KeyDirection::Up);
        assert!(events.iter().all(|event| event.sym == keysyms::KEY_a));

        assert!(!keyboard.poll_repeat_at(t1 + Duration::from_millis(20)));
        assert!(keyboard.poll_repeat_at(t1 + Duration::from_millis(33)));
        assert_eq!(keys(&rx).len(), 2);
    }

    #[test]
    fn test_any_feed_cancels_repeat() {
        let (mut keyboard, _device, rx) = bound_keyboard();
        let t0 = Instant::now();
        keyboard.feed_key_at(KeyDirection::Down, KEY_A, t0);
        keyboard.feed_key_at(KeyDirection::Down, KEY_LEFTSHIFT, t0 + Duration::from_millis(50));
        assert_eq!(keyboard.repeat_deadline(), None);
        assert!(!keyboard.poll_repeat_at(t0 + Duration::from_secs(1)));
        assert_eq!(keys(&rx).len(), 2);
    }

    #[test]
    fn test_modifiers_and_parked_keys_do_not_repeat() {
        let (mut bound, _device, _rx) = bound_keyboard();
        bound.feed_key_at(KeyDirection::Down, KEY_LEFTCTRL, Instant::now());
        assert_eq!(bound.repeat_deadline(), None);

        let (mut parked, _device) = keyboard();
        parked.feed_key_at(KeyDirection::Down, KEY_A, Instant::now());
        assert_eq!(parked.repeat_deadline(), None);
    }

    #[test]
    fn test_reset_keep_locks_round_trip() {
        let (mut keyboard, device) = keyboard();
        tap(&mut keyboard, KEY_CAPSLOCK, Instant::now());
        assert_eq!(keyboard.locks(), Locks::CAPS | Locks::NUM);

        keyboard.reset(true);
        assert_eq!(keyboard.locks(), Locks::CAPS | Locks::NUM);
        assert_eq!(device.leds(), Some(Locks::CAPS | Locks::NUM));

        keyboard.reset(false);
        assert!(keyboard.locks().is_empty());
        assert_eq!(device.leds(), Some(Locks::empty()));
    }

    #[test]
    fn test_reset_drops_held_modifiers_and_repeat() {
        let (mut keyboard, _device, _rx) = bound_keyboard();
        let now = Instant::now();
        keyboard.feed_key_at(KeyDirection::Down, KEY_LEFTSHIFT, now);
        keyboard.feed_key_at(KeyDirection::Down, KEY_A, now);
        assert!(keyboard.repeat_deadline().is_some());

        keyboard.reset(true);
        assert!(keyboard.modifiers().is_empty());
        assert_eq!(keyboard.repeat_deadline(), None);
        assert!(keyboard.is_enabled());
    }

    #[test]
    fn test_update_leds_pushes_us_state() {
        let (mut keyboard, device) = keyboard();
        assert_eq!(device.leds(), None);
        keyboard.update_leds();
        assert_eq!(device.leds(), Some(Locks::NUM));

        tap(&mut keyboard, KEY_SCROLLLOCK, Instant::now());
        keyboard.update_leds();
        assert_eq!(device.leds(), Some(Locks::NUM | Locks::SCROLL));
    }

    #[test]
    fn test_detached_keyboard_is_inert() {
        let (mut keyboard, device, rx) = bound_keyboard();
        let t0 = Instant::now();
        keyboard.feed_key_at(KeyDirection::Down, KEY_A, t0);
        keys(&rx);

        keyboard.detach_device();
        assert_eq!(keyboard.device_id(), None);
        assert!(!keyboard.poll_repeat_at(t0 + Duration::from_secs(1)));
        assert_eq!(
            keyboard.feed_key_at(KeyDirection::Down, KEY_A, t0),
            keysyms::KEY_NoSymbol
        );
        keyboard.update_leds();
        assert_eq!(device.led_writes(), 0);
        assert!(keys(&rx).is_empty());
    }

    #[test]
    fn test_reattached_keyboard_feeds_again() {
        let (mut keyboard, device, rx) = bound_keyboard();
        keyboard.detach_device();

        let reopened = device.reopened(9);
        keyboard.attach_device(reopened.clone());
        assert_eq!(keyboard.device_id(), Some(DeviceId(9)));
        assert!(keyboard.is_enabled());

        assert_eq!(tap(&mut keyboard, KEY_A, Instant::now()), keysyms::KEY_a);
        assert_eq!(keys(&rx).len(), 2);
        keyboard.update_leds();
        assert_eq!(reopened.leds(), Some(Locks::NUM));
        assert_eq!(device.led_writes(), 0);
    }

    #[test]
    fn test_describe_keys() {
        assert_eq!(
            describe_keys(keysyms::KEY_Tab, Modifiers::CONTROL | Modifiers::ALT),
            "Control + Alt + Tab"
        );
        assert_eq!(
            describe_keys(keysyms::KEY_Control_L, Modifiers::CONTROL),
            "Control_L"
        );
        assert_eq!(describe_keys(keysyms::KEY_A, Modifiers::SHIFT), "Shift + A");
    }
}
