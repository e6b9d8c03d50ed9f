//! Key event to terminal input bytes
//!
//! xterm-style encoding: cursor/navigation keys with `CSI 1;{mod}X`,
//! F1-F12, Ctrl+letter control codes, Alt as ESC prefix, UTF-8 otherwise.

use xkbcommon::xkb;
use xkbcommon::xkb::keysyms;

use crate::input::{KeyDirection, KeyEvent, Modifiers};

/// xterm modifier parameter (1 = none)
fn modifier_code(modifiers: Modifiers) -> u8 {
    let mut code = 1u8;
    if modifiers.contains(Modifiers::SHIFT) {
        code += 1;
    }
    if modifiers.contains(Modifiers::ALT) {
        code += 2;
    }
    if modifiers.contains(Modifiers::CONTROL) {
        code += 4;
    }
    code
}

fn is_modifier_sym(sym: u32) -> bool {
    matches!(
        sym,
        keysyms::KEY_Shift_L
            | keysyms::KEY_Shift_R
            | keysyms::KEY_Control_L
            | keysyms::KEY_Control_R
            | keysyms::KEY_Alt_L
            | keysyms::KEY_Alt_R
            | keysyms::KEY_Meta_L
            | keysyms::KEY_Meta_R
            | keysyms::KEY_Super_L
            | keysyms::KEY_Super_R
            | keysyms::KEY_ISO_Level3_Shift
            | keysyms::KEY_Caps_Lock
            | keysyms::KEY_Num_Lock
            | keysyms::KEY_Scroll_Lock
    )
}

/// Bytes to write to the PTY for `event`. Releases produce nothing.
pub fn encode_key(event: &KeyEvent) -> Vec<u8> {
    if event.direction == KeyDirection::Up {
        return Vec::new();
    }
    encode_press(event.sym, event.modifiers)
}

fn encode_press(sym: u32, modifiers: Modifiers) -> Vec<u8> {
    if is_modifier_sym(sym) {
        return Vec::new();
    }

    let ctrl = modifiers.contains(Modifiers::CONTROL);
    let alt = modifiers.contains(Modifiers::ALT);
    let mod_code = modifier_code(modifiers);
    let has_mods = mod_code > 1;

    // Cursor keys
    let cursor = match sym {
        keysyms::KEY_Up | keysyms::KEY_KP_Up => Some(b'A'),
        keysyms::KEY_Down | keysyms::KEY_KP_Down => Some(b'B'),
        keysyms::KEY_Right | keysyms::KEY_KP_Right => Some(b'C'),
        keysyms::KEY_Left | keysyms::KEY_KP_Left => Some(b'D'),
        keysyms::KEY_Home | keysyms::KEY_KP_Home => Some(b'H'),
        keysyms::KEY_End | keysyms::KEY_KP_End => Some(b'F'),
        _ => None,
    };
    if let Some(ch) = cursor {
        if has_mods {
            return format!("\x1b[1;{}{}", mod_code, ch as char).into_bytes();
        }
        return vec![0x1b, b'[', ch];
    }

    // Insert/Delete/PageUp/PageDown
    let tilde = match sym {
        keysyms::KEY_Insert | keysyms::KEY_KP_Insert => Some(2),
        keysyms::KEY_Delete | keysyms::KEY_KP_Delete => Some(3),
        keysyms::KEY_Page_Up | keysyms::KEY_KP_Page_Up => Some(5),
        keysyms::KEY_Page_Down | keysyms::KEY_KP_Page_Down => Some(6),
        _ => None,
    };
    if let Some(code) = tilde {
        if has_mods {
            return format!("\x1b[{};{}~", code, mod_code).into_bytes();
        }
        return format!("\x1b[{}~", code).into_bytes();
    }

    if let Some(bytes) = encode_function_key(sym, has_mods, mod_code) {
        return bytes;
    }

    let base = match sym {
        keysyms::KEY_Return | keysyms::KEY_KP_Enter => vec![b'\r'],
        keysyms::KEY_BackSpace => vec![0x7f],
        // xkb resolves Shift+Tab to ISO_Left_Tab
        keysyms::KEY_ISO_Left_Tab => b"\x1b[Z".to_vec(),
        keysyms::KEY_Tab if modifiers.contains(Modifiers::SHIFT) => b"\x1b[Z".to_vec(),
        keysyms::KEY_Tab => vec![b'\t'],
        keysyms::KEY_Escape => vec![0x1b],
        _ => {
            let Some(ch) = char::from_u32(xkb::keysym_to_utf32(xkb::Keysym::new(sym)))
                .filter(|&ch| ch != '\0')
            else {
                return Vec::new();
            };

            if ctrl {
                if let Some(code) = control_code(ch) {
                    vec![code]
                } else {
                    ch.to_string().into_bytes()
                }
            } else {
                ch.to_string().into_bytes()
            }
        }
    };

    // Alt as ESC prefix
    if alt {
        let mut bytes = vec![0x1b];
        bytes.extend(base);
        return bytes;
    }
    base
}

/// ASCII control code for Ctrl+`ch`
fn control_code(ch: char) -> Option<u8> {
    match ch {
        'a'..='z' | 'A'..='Z' => Some(ch.to_ascii_uppercase() as u8 - b'A' + 1),
        ' ' | '@' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '-' | '7' => Some(0x1f),
        '?' | '8' => Some(0x7f),
        _ => None,
    }
}

/// Function key escape sequences
fn encode_function_key(sym: u32, has_mods: bool, mod_code: u8) -> Option<Vec<u8>> {
    // F1-F4: SS3 format (no modifiers) or CSI 1;{mod}P/Q/R/S (with modifiers)
    let f1_4 = match sym {
        keysyms::KEY_F1 => Some(b'P'),
        keysyms::KEY_F2 => Some(b'Q'),
        keysyms::KEY_F3 => Some(b'R'),
        keysyms::KEY_F4 => Some(b'S'),
        _ => None,
    };
    if let Some(ch) = f1_4 {
        if has_mods {
            return Some(format!("\x1b[1;{}{}", mod_code, ch as char).into_bytes());
        }
        return Some(vec![0x1b, b'O', ch]);
    }

    // F5-F12: CSI {code}~ format
    let code = match sym {
        keysyms::KEY_F5 => 15,
        keysyms::KEY_F6 => 17,
        keysyms::KEY_F7 => 18,
        keysyms::KEY_F8 => 19,
        keysyms::KEY_F9 => 20,
        keysyms::KEY_F10 => 21,
        keysyms::KEY_F11 => 23,
        keysyms::KEY_F12 => 24,
        _ => return None,
    };
    if has_mods {
        Some(format!("\x1b[{};{}~", code, mod_code).into_bytes())
    } else {
        Some(format!("\x1b[{}~", code).into_bytes())
    }
}
