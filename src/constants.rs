//! Global constants for keyterm
//!
//! Consolidates timing and keymap constants
//! to eliminate magic numbers throughout the codebase.

// ============================================================================
// Timing Constants
// ============================================================================

/// Delay before a held key starts repeating, in milliseconds
pub const INITIAL_REPEAT_TIMEOUT_MS: u64 = 250;

/// Interval between synthesized repeats, in milliseconds
pub const REPEAT_TIMEOUT_MS: u64 = 33;

/// Delay before re-pushing LEDs to every keyboard after a lock change.
/// The kernel may rewrite LEDs of all keyboards on a lock key press,
/// so ours must land after it.
pub const LED_RESYNC_DELAY_MS: u64 = 1;

/// Upper bound for a single poll(2) wait in the main loop
pub const MAX_POLL_TIMEOUT_MS: i32 = 100;

// ============================================================================
// Keymap Constants
// ============================================================================

/// XKB rules used for every compiled keymap
pub const XKB_RULES: &str = "evdev";

/// XKB model used for every compiled keymap
pub const XKB_MODEL: &str = "pc105";

/// Layout of the reference keymap used for index detection and Control chords
pub const US_LAYOUT: &str = "us";

/// Offset between evdev keycodes and xkb keycodes
pub const EVDEV_XKB_OFFSET: u32 = 8;

// ============================================================================
// Input Constants
// ============================================================================

/// Seat assigned to the libinput udev context by default
pub const DEFAULT_SEAT: &str = "seat0";

/// Number of selection slots (digits 1-9, then 0)
pub const SELECTION_SLOTS: u32 = 10;
