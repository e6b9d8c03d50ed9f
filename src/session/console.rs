//! System-wide lock state
//!
//! At shutdown every keyboard is left with the locks the rest of the
//! system believes in. On the console that is the keyboard LED flag set of
//! the active VT.

use std::fs::OpenOptions;
use std::os::unix::io::{AsRawFd, RawFd};

use anyhow::{anyhow, Context, Result};
use log::debug;

use crate::input::Locks;

/// KDGKBLED: get the console keyboard flags (`<linux/kd.h>`)
const KDGKBLED: libc::c_ulong = 0x4B64;

const LED_SCR: u8 = 0x01;
const LED_NUM: u8 = 0x02;
const LED_CAP: u8 = 0x04;

/// Consoles tried in order
const CONSOLE_PATHS: [&str; 2] = ["/dev/tty0", "/dev/console"];

/// Reader of the desktop-wide Caps/Num/Scroll state
pub trait SystemLocks {
    /// Current locks, None if unknown
    fn read(&self) -> Option<Locks>;
}

/// Reads the lock flags of the active virtual console
pub struct ConsoleLocks;

impl ConsoleLocks {
    fn read_from(path: &str) -> Result<Locks> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .with_context(|| format!("Cannot open {}", path))?;
        let flags = kdgkbled(file.as_raw_fd())?;
        Ok(decode_led_flags(flags))
    }
}

impl SystemLocks for ConsoleLocks {
    fn read(&self) -> Option<Locks> {
        for path in CONSOLE_PATHS {
            match Self::read_from(path) {
                Ok(locks) => {
                    debug!("System locks from {}: {:?}", path, locks);
                    return Some(locks);
                }
                Err(e) => debug!("{:#}", e),
            }
        }
        None
    }
}

fn kdgkbled(fd: RawFd) -> Result<u8> {
    let mut flags: libc::c_char = 0;
    // SAFETY: KDGKBLED writes a single char through the pointer
    let ret = unsafe { libc::ioctl(fd, KDGKBLED as _, &mut flags as *mut libc::c_char) };
    if ret < 0 {
        return Err(anyhow!(
            "KDGKBLED failed on fd {}: {}",
            fd,
            std::io::Error::last_os_error()
        ));
    }
    Ok(flags as u8)
}

/// Map console LED_* flags to [`Locks`]
pub fn decode_led_flags(flags: u8) -> Locks {
    let mut locks = Locks::empty();
    if flags & LED_CAP != 0 {
        locks |= Locks::CAPS;
    }
    if flags & LED_NUM != 0 {
        locks |= Locks::NUM;
    }
    if flags & LED_SCR != 0 {
        locks |= Locks::SCROLL;
    }
    locks
}

/// Fixed answer, for tests
#[cfg(test)]
pub struct FixedLocks(pub Option<Locks>);

#[cfg(test)]
impl SystemLocks for FixedLocks {
    fn read(&self) -> Option<Locks> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_led_flags() {
        assert_eq!(decode_led_flags(0), Locks::empty());
        assert_eq!(decode_led_flags(LED_NUM), Locks::NUM);
        assert_eq!(
            decode_led_flags(LED_CAP | LED_SCR),
            Locks::CAPS | Locks::SCROLL
        );
        // Upper bits carry the default flags, not the live state
        assert_eq!(decode_led_flags(0x70 | LED_NUM), Locks::NUM);
    }
}
