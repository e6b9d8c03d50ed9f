//! evdev keycode constants
//!
//! Linux input event codes from <linux/input-event-codes.h>
//! that keyterm refers to by number.

#![allow(dead_code)]

// ============================================================================
// Modifier Keys
// ============================================================================

/// Left Control key
pub const KEY_LEFTCTRL: u32 = 29;

/// Right Control key
pub const KEY_RIGHTCTRL: u32 = 97;

/// Left Shift key
pub const KEY_LEFTSHIFT: u32 = 42;

/// Right Shift key
pub const KEY_RIGHTSHIFT: u32 = 54;

/// Left Alt key
pub const KEY_LEFTALT: u32 = 56;

/// Right Alt key (AltGr on some keyboards)
pub const KEY_RIGHTALT: u32 = 100;

/// Left Super (Windows/Meta) key
pub const KEY_LEFTMETA: u32 = 125;

/// Right Super (Windows/Meta) key
pub const KEY_RIGHTMETA: u32 = 126;

// ============================================================================
// Lock Keys
// ============================================================================

/// Caps Lock key
pub const KEY_CAPSLOCK: u32 = 58;

/// Num Lock key
pub const KEY_NUMLOCK: u32 = 69;

/// Scroll Lock key
pub const KEY_SCROLLLOCK: u32 = 70;

// ============================================================================
// Main Block
// ============================================================================

/// Escape key
pub const KEY_ESC: u32 = 1;

/// Digit row: "1" key (KEY_2 = 3, ..., KEY_9 = 10)
pub const KEY_1: u32 = 2;

/// Digit row: "0" key
pub const KEY_0: u32 = 11;

/// Tab key
pub const KEY_TAB: u32 = 15;

/// Enter key
pub const KEY_ENTER: u32 = 28;

/// Space bar
pub const KEY_SPACE: u32 = 57;

/// Letter keys used by tests and diagnostics
pub const KEY_Q: u32 = 16;
pub const KEY_Y: u32 = 21;
pub const KEY_A: u32 = 30;
pub const KEY_C: u32 = 46;
pub const KEY_Z: u32 = 44;

// ============================================================================
// Keypad
// ============================================================================

/// Keypad digits in evdev order 0-9
pub const KEYPAD_DIGITS: [u32; 10] = [82, 79, 80, 81, 75, 76, 77, 71, 72, 73];

/// Evdev keycode of the digit-row key for `digit` (0-9)
pub fn digit_row_key(digit: u32) -> u32 {
    if digit == 0 {
        KEY_0
    } else {
        KEY_1 + digit - 1
    }
}

/// Evdev keycode of the keypad key for `digit` (0-9)
pub fn keypad_key(digit: u32) -> u32 {
    KEYPAD_DIGITS[(digit % 10) as usize]
}

/// Whether the key is one of the modifier keys
pub fn is_modifier(keycode: u32) -> bool {
    matches!(
        keycode,
        KEY_LEFTCTRL
            | KEY_RIGHTCTRL
            | KEY_LEFTSHIFT
            | KEY_RIGHTSHIFT
            | KEY_LEFTALT
            | KEY_RIGHTALT
            | KEY_LEFTMETA
            | KEY_RIGHTMETA
    )
}

/// Whether the key is one of the lock keys
pub fn is_lock(keycode: u32) -> bool {
    matches!(keycode, KEY_CAPSLOCK | KEY_NUMLOCK | KEY_SCROLLLOCK)
}
