//! Test doubles: a table keymap, a fake device and a scripted source

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use xkbcommon::xkb::keysyms;

use super::device::{DeviceHandle, DeviceId, EventSource, InputDevice, RawEvent};
use super::keycodes::*;
use super::keymap::{
    CompiledLayout, KeyDirection, Keymap, KeymapCompiler, KeymapError, KeymapState, LayoutId,
    Locks, Modifiers,
};

/// Compiles "us" and a "de" lookalike with Y and Z swapped
pub struct TableCompiler;

impl KeymapCompiler for TableCompiler {
    fn compile(&self, layout: &LayoutId) -> Result<CompiledLayout, KeymapError> {
        let swap_yz = match layout.layout() {
            "us" => false,
            "de" => true,
            _ => {
                return Err(KeymapError::Compile {
                    rules: "table".to_string(),
                    model: "table".to_string(),
                    layout: layout.layout().to_string(),
                    variant: layout.variant().to_string(),
                })
            }
        };

        let keymap = Rc::new(TableKeymap { swap_yz });
        Ok(CompiledLayout {
            state: keymap.new_state(),
            keymap,
        })
    }
}

struct TableKeymap {
    swap_yz: bool,
}

impl Keymap for TableKeymap {
    fn new_state(&self) -> Box<dyn KeymapState> {
        Box::new(TableState {
            swap_yz: self.swap_yz,
            held: HashSet::new(),
            locks: Locks::empty(),
        })
    }

    fn key_repeats(&self, keycode: u32) -> bool {
        !is_modifier(keycode) && !is_lock(keycode)
    }

    fn key_by_name(&self, name: &str) -> Option<u32> {
        match name {
            "CAPS" => Some(KEY_CAPSLOCK),
            "NMLK" => Some(KEY_NUMLOCK),
            "SCLK" => Some(KEY_SCROLLLOCK),
            _ => None,
        }
    }
}

const SHIFTED_DIGITS: &[u8; 10] = b")!@#$%^&*(";

const KEYPAD_NAV: [u32; 10] = [
    keysyms::KEY_KP_Insert,
    keysyms::KEY_KP_End,
    keysyms::KEY_KP_Down,
    keysyms::KEY_KP_Next,
    keysyms::KEY_KP_Left,
    keysyms::KEY_KP_Begin,
    keysyms::KEY_KP_Right,
    keysyms::KEY_KP_Home,
    keysyms::KEY_KP_Up,
    keysyms::KEY_KP_Prior,
];

struct TableState {
    swap_yz: bool,
    held: HashSet<u32>,
    locks: Locks,
}

impl TableState {
    fn letter(&self, keycode: u32) -> Option<u8> {
        let letter = match keycode {
            16..=25 => b"qwertyuiop"[(keycode - 16) as usize],
            30..=38 => b"asdfghjkl"[(keycode - 30) as usize],
            44..=50 => b"zxcvbnm"[(keycode - 44) as usize],
            _ => return None,
        };

        Some(match (self.swap_yz, letter) {
            (true, b'y') => b'z',
            (true, b'z') => b'y',
            _ => letter,
        })
    }

    fn shift(&self) -> bool {
        self.held.contains(&KEY_LEFTSHIFT) || self.held.contains(&KEY_RIGHTSHIFT)
    }
}

impl KeymapState for TableState {
    fn key_get_one_sym(&self, keycode: u32) -> u32 {
        match keycode {
            KEY_LEFTCTRL => return keysyms::KEY_Control_L,
            KEY_RIGHTCTRL => return keysyms::KEY_Control_R,
            KEY_LEFTSHIFT => return keysyms::KEY_Shift_L,
            KEY_RIGHTSHIFT => return keysyms::KEY_Shift_R,
            KEY_LEFTALT => return keysyms::KEY_Alt_L,
            KEY_RIGHTALT => return keysyms::KEY_Alt_R,
            KEY_LEFTMETA => return keysyms::KEY_Super_L,
            KEY_RIGHTMETA => return keysyms::KEY_Super_R,
            KEY_CAPSLOCK => return keysyms::KEY_Caps_Lock,
            KEY_NUMLOCK => return keysyms::KEY_Num_Lock,
            KEY_SCROLLLOCK => return keysyms::KEY_Scroll_Lock,
            KEY_TAB => return keysyms::KEY_Tab,
            KEY_ENTER => return keysyms::KEY_Return,
            KEY_ESC => return keysyms::KEY_Escape,
            KEY_SPACE => return keysyms::KEY_space,
            _ => {}
        }

        if (KEY_1..=KEY_0).contains(&keycode) {
            let digit = (keycode - KEY_1 + 1) % 10;
            return if self.shift() {
                SHIFTED_DIGITS[digit as usize] as u32
            } else {
                keysyms::KEY_0 + digit
            };
        }

        if let Some(digit) = KEYPAD_DIGITS.iter().position(|&k| k == keycode) {
            return if self.locks.contains(Locks::NUM) {
                keysyms::KEY_KP_0 + digit as u32
            } else {
                KEYPAD_NAV[digit]
            };
        }

        match self.letter(keycode) {
            Some(letter) if self.shift() != self.locks.contains(Locks::CAPS) => {
                letter.to_ascii_uppercase() as u32
            }
            Some(letter) => letter as u32,
            None => keysyms::KEY_NoSymbol,
        }
    }

    fn update_key(&mut self, keycode: u32, direction: KeyDirection) {
        if is_modifier(keycode) {
            match direction {
                KeyDirection::Down => self.held.insert(keycode),
                KeyDirection::Up => self.held.remove(&keycode),
            };
        } else if direction == KeyDirection::Down {
            match keycode {
                KEY_CAPSLOCK => self.locks.toggle(Locks::CAPS),
                KEY_NUMLOCK => self.locks.toggle(Locks::NUM),
                KEY_SCROLLLOCK => self.locks.toggle(Locks::SCROLL),
                _ => {}
            }
        }
    }

    fn active_modifiers(&self) -> Modifiers {
        let mut modifiers = Modifiers::empty();
        for &keycode in &self.held {
            modifiers |= match keycode {
                KEY_LEFTCTRL | KEY_RIGHTCTRL => Modifiers::CONTROL,
                KEY_LEFTSHIFT | KEY_RIGHTSHIFT => Modifiers::SHIFT,
                KEY_LEFTALT | KEY_RIGHTALT => Modifiers::ALT,
                _ => Modifiers::SUPER,
            };
        }
        modifiers
    }

    fn active_locks(&self) -> Locks {
        self.locks
    }
}

/// Device recording the LED masks written to it
pub struct FakeDevice {
    id: DeviceId,
    sysname: String,
    keyboard: bool,
    leds: Cell<Option<Locks>>,
    led_writes: Cell<usize>,
}

impl FakeDevice {
    fn new(id: usize, sysname: String, keyboard: bool) -> Rc<Self> {
        Rc::new(Self {
            id: DeviceId(id),
            sysname,
            keyboard,
            leds: Cell::new(None),
            led_writes: Cell::new(0),
        })
    }

    pub fn keyboard(id: usize) -> Rc<Self> {
        Self::new(id, format!("event{}", id), true)
    }

    pub fn pointer(id: usize) -> Rc<Self> {
        Self::new(id, format!("event{}", id), false)
    }

    /// The same node under a new identity, as libinput reports it after a resume
    pub fn reopened(&self, id: usize) -> Rc<Self> {
        Self::new(id, self.sysname.clone(), self.keyboard)
    }

    /// Last LED mask written
    pub fn leds(&self) -> Option<Locks> {
        self.leds.get()
    }

    pub fn led_writes(&self) -> usize {
        self.led_writes.get()
    }
}

impl InputDevice for FakeDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn name(&self) -> String {
        format!("fake-{}", self.id.0)
    }

    fn sysname(&self) -> String {
        self.sysname.clone()
    }

    fn is_keyboard(&self) -> bool {
        self.keyboard
    }

    fn update_leds(&self, leds: Locks) {
        self.leds.set(Some(leds));
        self.led_writes.set(self.led_writes.get() + 1);
    }
}

pub fn key(device: &Rc<FakeDevice>, keycode: u32, direction: KeyDirection) -> RawEvent {
    RawEvent::Key {
        device: handle(device),
        keycode,
        direction,
    }
}

pub fn handle(device: &Rc<FakeDevice>) -> DeviceHandle {
    device.clone()
}

/// Source returning queued events on dispatch
#[derive(Clone, Default)]
pub struct ScriptedSource {
    queue: Rc<RefCell<VecDeque<RawEvent>>>,
    suspended: Rc<Cell<bool>>,
}

impl ScriptedSource {
    pub fn push(&self, event: RawEvent) {
        self.queue.borrow_mut().push_back(event);
    }

    pub fn tap(&self, device: &Rc<FakeDevice>, keycode: u32) {
        self.push(key(device, keycode, KeyDirection::Down));
        self.push(key(device, keycode, KeyDirection::Up));
    }
}

impl ScriptedSource {
    pub fn is_suspended(&self) -> bool {
        self.suspended.get()
    }
}

impl EventSource for ScriptedSource {
    fn dispatch(&mut self) -> std::io::Result<Vec<RawEvent>> {
        Ok(self.queue.borrow_mut().drain(..).collect())
    }

    fn suspend(&mut self) {
        self.suspended.set(true);
    }

    fn resume(&mut self) -> std::io::Result<()> {
        self.suspended.set(false);
        Ok(())
    }

    fn raw_fd(&self) -> Option<i32> {
        None
    }
}
