//! Session integration
//!
//! - libseat session for rootless device access (`seatd` feature)
//! - console lock-state reader used at shutdown
//! - termination signal flag for the main loop

pub mod console;
pub mod signal;

#[cfg(all(target_os = "linux", feature = "seatd"))]
mod seatd;
#[cfg(all(target_os = "linux", feature = "seatd"))]
pub use seatd::{SeatSession, SessionEvent};
