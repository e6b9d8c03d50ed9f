//! Keymap engine
//!
//! Compiles a layout identifier ("us", "de+nodeadkeys") into a keymap plus
//! an evolvable modifier/lock state. The xkbcommon backend is the only one
//! used at runtime; the traits exist so the keyboard state machine can be
//! driven by a table keymap in tests.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use bitflags::bitflags;
use log::debug;
use thiserror::Error;
use xkbcommon::xkb;

use crate::constants::{EVDEV_XKB_OFFSET, US_LAYOUT, XKB_MODEL, XKB_RULES};
use crate::input::keycodes::{KEY_CAPSLOCK, KEY_NUMLOCK, KEY_SCROLLLOCK};

bitflags! {
    /// Held (non-lock) modifiers at the time a key event is processed
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const CONTROL = 1 << 0;
        const SHIFT = 1 << 1;
        /// Alt and Meta
        const ALT = 1 << 2;
        const SUPER = 1 << 3;
    }
}

bitflags! {
    /// Lock keys, doubling as the hardware LED mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Locks: u8 {
        const CAPS = 1 << 0;
        const NUM = 1 << 1;
        const SCROLL = 1 << 2;
    }
}

/// A single lock key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    Caps,
    Num,
    Scroll,
}

impl Lock {
    pub const ALL: [Lock; 3] = [Lock::Caps, Lock::Num, Lock::Scroll];

    /// xkb key name of the lock key
    pub fn key_name(self) -> &'static str {
        match self {
            Lock::Caps => "CAPS",
            Lock::Num => "NMLK",
            Lock::Scroll => "SCLK",
        }
    }

    /// evdev keycode of the lock key on a pc105 keyboard
    pub fn evdev_code(self) -> u32 {
        match self {
            Lock::Caps => KEY_CAPSLOCK,
            Lock::Num => KEY_NUMLOCK,
            Lock::Scroll => KEY_SCROLLLOCK,
        }
    }

    pub fn flag(self) -> Locks {
        match self {
            Lock::Caps => Locks::CAPS,
            Lock::Num => Locks::NUM,
            Lock::Scroll => Locks::SCROLL,
        }
    }
}

/// Press/release direction of a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

impl From<KeyDirection> for xkb::KeyDirection {
    fn from(direction: KeyDirection) -> Self {
        match direction {
            KeyDirection::Down => xkb::KeyDirection::Down,
            KeyDirection::Up => xkb::KeyDirection::Up,
        }
    }
}

/// Keymap errors
#[derive(Debug, Error)]
pub enum KeymapError {
    #[error("invalid layout id '{0}' (expected \"<layout>\" or \"<layout>+<variant>\")")]
    InvalidLayout(String),
    #[error("failed to compile xkb keymap (rules={rules}, model={model}, layout={layout}, variant={variant})")]
    Compile {
        rules: String,
        model: String,
        layout: String,
        variant: String,
    },
}

/// Layout identifier: `"<layout>"` or `"<layout>+<variant>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutId {
    layout: String,
    variant: Option<String>,
}

impl LayoutId {
    pub fn us() -> Self {
        Self {
            layout: US_LAYOUT.to_string(),
            variant: None,
        }
    }

    pub fn layout(&self) -> &str {
        &self.layout
    }

    /// Variant, or "" when none
    pub fn variant(&self) -> &str {
        self.variant.as_deref().unwrap_or("")
    }
}

impl FromStr for LayoutId {
    type Err = KeymapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = s.splitn(2, '+');
        let layout = parts.next().unwrap_or("").trim();
        let variant = parts.next().map(str::trim);

        if layout.is_empty() || variant.is_some_and(|v| v.contains('+')) {
            return Err(KeymapError::InvalidLayout(s.to_string()));
        }

        Ok(Self {
            layout: layout.to_string(),
            variant: variant.filter(|v| !v.is_empty()).map(str::to_string),
        })
    }
}

impl fmt::Display for LayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}+{}", self.layout, variant),
            None => f.write_str(&self.layout),
        }
    }
}

/// A compiled keymap. Keycodes are evdev codes.
pub trait Keymap {
    /// Create a fresh state with no modifiers or locks active
    fn new_state(&self) -> Box<dyn KeymapState>;

    /// Whether the key auto-repeats in this keymap
    fn key_repeats(&self, keycode: u32) -> bool;

    /// evdev keycode of a key by its xkb name ("CAPS", "NMLK", ...)
    fn key_by_name(&self, name: &str) -> Option<u32>;
}

/// Live modifier/lock state of a keymap. Keycodes are evdev codes.
pub trait KeymapState {
    /// Keysym the key produces in the current state
    fn key_get_one_sym(&self, keycode: u32) -> u32;

    fn update_key(&mut self, keycode: u32, direction: KeyDirection);

    fn active_modifiers(&self) -> Modifiers;

    fn active_locks(&self) -> Locks;
}

/// Keymap and its state, as produced by [`KeymapCompiler::compile`]
pub struct CompiledLayout {
    pub keymap: Rc<dyn Keymap>,
    pub state: Box<dyn KeymapState>,
}

impl CompiledLayout {
    /// Replace the state with a fresh one, returning the previous state
    pub fn replace_state(&mut self) -> Box<dyn KeymapState> {
        std::mem::replace(&mut self.state, self.keymap.new_state())
    }

    /// evdev keycode of a lock key
    pub fn lock_keycode(&self, lock: Lock) -> u32 {
        self.keymap
            .key_by_name(lock.key_name())
            .unwrap_or_else(|| lock.evdev_code())
    }

    /// Toggle a lock by feeding a press and release of its key to the state
    pub fn tap_lock(&mut self, lock: Lock) {
        let keycode = self.lock_keycode(lock);
        self.state.update_key(keycode, KeyDirection::Down);
        self.state.update_key(keycode, KeyDirection::Up);
    }
}

/// Layout compiler
pub trait KeymapCompiler {
    fn compile(&self, layout: &LayoutId) -> Result<CompiledLayout, KeymapError>;
}

/// xkbcommon-backed compiler
pub struct XkbCompiler {
    context: xkb::Context,
}

impl XkbCompiler {
    pub fn new() -> Self {
        Self {
            context: xkb::Context::new(xkb::CONTEXT_NO_FLAGS),
        }
    }
}

impl KeymapCompiler for XkbCompiler {
    fn compile(&self, layout: &LayoutId) -> Result<CompiledLayout, KeymapError> {
        let keymap = xkb::Keymap::new_from_names(
            &self.context,
            XKB_RULES,
            XKB_MODEL,
            layout.layout(),
            layout.variant(),
            None,
            xkb::COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| KeymapError::Compile {
            rules: XKB_RULES.to_string(),
            model: XKB_MODEL.to_string(),
            layout: layout.layout().to_string(),
            variant: layout.variant().to_string(),
        })?;

        debug!("Compiled xkb keymap for layout '{}'", layout);

        let keymap = XkbKeymap { keymap };
        let state = keymap.new_state();
        Ok(CompiledLayout {
            keymap: Rc::new(keymap),
            state,
        })
    }
}

fn xkb_keycode(evdev_code: u32) -> xkb::Keycode {
    xkb::Keycode::new(evdev_code + EVDEV_XKB_OFFSET)
}

struct XkbKeymap {
    keymap: xkb::Keymap,
}

impl Keymap for XkbKeymap {
    fn new_state(&self) -> Box<dyn KeymapState> {
        Box::new(XkbState {
            state: xkb::State::new(&self.keymap),
        })
    }

    fn key_repeats(&self, keycode: u32) -> bool {
        self.keymap.key_repeats(xkb_keycode(keycode))
    }

    fn key_by_name(&self, name: &str) -> Option<u32> {
        self.keymap
            .key_by_name(name)
            .map(|code| code.raw())
            .filter(|&raw| raw >= EVDEV_XKB_OFFSET)
            .map(|raw| raw - EVDEV_XKB_OFFSET)
    }
}

struct XkbState {
    state: xkb::State,
}

impl XkbState {
    fn mod_active(&self, name: &str) -> bool {
        self.state
            .mod_name_is_active(name, xkb::STATE_MODS_EFFECTIVE)
    }
}

impl KeymapState for XkbState {
    fn key_get_one_sym(&self, keycode: u32) -> u32 {
        self.state.key_get_one_sym(xkb_keycode(keycode)).raw()
    }

    fn update_key(&mut self, keycode: u32, direction: KeyDirection) {
        self.state.update_key(xkb_keycode(keycode), direction.into());
    }

    fn active_modifiers(&self) -> Modifiers {
        let mut modifiers = Modifiers::empty();
        if self.mod_active(xkb::MOD_NAME_CTRL) {
            modifiers |= Modifiers::CONTROL;
        }
        if self.mod_active(xkb::MOD_NAME_SHIFT) {
            modifiers |= Modifiers::SHIFT;
        }
        if self.mod_active(xkb::MOD_NAME_ALT) || self.mod_active("Meta") {
            modifiers |= Modifiers::ALT;
        }
        if self.mod_active(xkb::MOD_NAME_LOGO) || self.mod_active("Super") {
            modifiers |= Modifiers::SUPER;
        }
        modifiers
    }

    fn active_locks(&self) -> Locks {
        let mut locks = Locks::empty();
        if self.state.led_name_is_active(xkb::LED_NAME_CAPS) {
            locks |= Locks::CAPS;
        }
        if self.state.led_name_is_active(xkb::LED_NAME_NUM) {
            locks |= Locks::NUM;
        }
        if self.state.led_name_is_active(xkb::LED_NAME_SCROLL) {
            locks |= Locks::SCROLL;
        }
        locks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::keycodes::KEY_1;
    use xkbcommon::xkb::keysyms;

    #[test]
    fn test_parse_layout_id() {
        let id: LayoutId = "us".parse().unwrap();
        assert_eq!(id.layout(), "us");
        assert_eq!(id.variant(), "");

        let id: LayoutId = "de+nodeadkeys".parse().unwrap();
        assert_eq!(id.layout(), "de");
        assert_eq!(id.variant(), "nodeadkeys");
        assert_eq!(id.to_string(), "de+nodeadkeys");

        // Empty variant defaults to none
        let id: LayoutId = "fr+".parse().unwrap();
        assert_eq!(id.to_string(), "fr");
    }

    #[test]
    fn test_parse_layout_id_rejects_garbage() {
        assert!("".parse::<LayoutId>().is_err());
        assert!("+dvorak".parse::<LayoutId>().is_err());
        assert!("us+intl+extra".parse::<LayoutId>().is_err());
    }

    // Needs xkeyboard-config data installed on the host
    #[test]
    #[ignore]
    fn test_xkb_us_keymap() {
        let compiler = XkbCompiler::new();
        let mut us = compiler.compile(&LayoutId::us()).unwrap();
        assert_eq!(us.state.key_get_one_sym(KEY_1), keysyms::KEY_1);
        assert!(us.keymap.key_repeats(KEY_1));
        assert_eq!(us.lock_keycode(Lock::Num), KEY_NUMLOCK);
        assert!(us.state.active_locks().is_empty());
        us.tap_lock(Lock::Num);
        assert_eq!(us.state.active_locks(), Locks::NUM);
    }

    #[test]
    #[ignore]
    fn test_xkb_unknown_layout_fails() {
        let compiler = XkbCompiler::new();
        let id: LayoutId = "no-such-layout".parse().unwrap();
        assert!(compiler.compile(&id).is_err());
    }
}
