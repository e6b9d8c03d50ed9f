//! libinput raw event source
//!
//! A udev-backed libinput context assigned to one seat. Device nodes are
//! opened either directly or through a libseat session.

use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, OwnedFd};
use std::path::Path;
use std::rc::Rc;

use input::event::keyboard::{KeyState, KeyboardEventTrait};
use input::event::{DeviceEvent, Event, EventTrait, KeyboardEvent};
use input::{AsRaw, DeviceCapability, Led, Libinput, LibinputInterface};
use log::{debug, info, warn};

#[cfg(all(target_os = "linux", feature = "seatd"))]
use crate::session::SeatSession;

use super::controller::ControllerError;
use super::device::{DeviceHandle, DeviceId, ErrorSlot, EventSource, InputDevice, RawEvent};
use super::keymap::{KeyDirection, Locks};

/// How libinput gets its device file descriptors
pub enum DeviceOpener {
    /// open(2) on the device node, needs the input group or root
    Direct,
    /// Through the libseat session
    #[cfg(all(target_os = "linux", feature = "seatd"))]
    Seat(Rc<RefCell<SeatSession>>),
}

fn record_open_failure(errors: &ErrorSlot, path: &Path, reason: &str) {
    let message = format!("Failed to open device '{}': {}", path.display(), reason);
    warn!("libinput: {}", message);
    errors.set(message);
}

/// Opens device nodes with open(2)
struct DirectInterface {
    errors: ErrorSlot,
}

impl LibinputInterface for DirectInterface {
    fn open_restricted(&mut self, path: &Path, flags: i32) -> Result<OwnedFd, i32> {
        let file = OpenOptions::new()
            .read(true)
            .write((flags & libc::O_WRONLY != 0) || (flags & libc::O_RDWR != 0))
            .custom_flags(flags & !libc::O_WRONLY & !libc::O_RDWR & !libc::O_RDONLY)
            .open(path)
            .map_err(|e| {
                record_open_failure(&self.errors, path, &e.to_string());
                -e.raw_os_error().unwrap_or(libc::ENOENT)
            })?;
        Ok(OwnedFd::from(file))
    }

    fn close_restricted(&mut self, fd: OwnedFd) {
        drop(fd);
    }
}

/// Opens device nodes through libseat
#[cfg(all(target_os = "linux", feature = "seatd"))]
struct SeatInterface {
    session: Rc<RefCell<SeatSession>>,
    errors: ErrorSlot,
}

#[cfg(all(target_os = "linux", feature = "seatd"))]
impl LibinputInterface for SeatInterface {
    fn open_restricted(&mut self, path: &Path, _flags: i32) -> Result<OwnedFd, i32> {
        match self.session.borrow_mut().open_device(path) {
            Ok(fd) => Ok(fd),
            Err(e) => {
                record_open_failure(&self.errors, path, &format!("{:#}", e));
                Err(-libc::EACCES)
            }
        }
    }

    fn close_restricted(&mut self, fd: OwnedFd) {
        if let Err(e) = self.session.borrow_mut().close_device(fd.as_raw_fd()) {
            warn!("{:#}", e);
        }
        drop(fd);
    }
}

/// libinput device behind the [`InputDevice`] contract
struct LibinputDevice {
    device: RefCell<input::Device>,
    id: DeviceId,
}

impl LibinputDevice {
    fn handle(device: input::Device) -> DeviceHandle {
        let id = DeviceId(device.as_raw() as usize);
        Rc::new(Self {
            device: RefCell::new(device),
            id,
        })
    }
}

impl InputDevice for LibinputDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn name(&self) -> String {
        self.device.borrow().name().to_string()
    }

    fn sysname(&self) -> String {
        self.device.borrow().sysname().to_string()
    }

    fn is_keyboard(&self) -> bool {
        self.device
            .borrow()
            .has_capability(DeviceCapability::Keyboard)
    }

    fn update_leds(&self, leds: Locks) {
        let mut mask = Led::empty();
        if leds.contains(Locks::CAPS) {
            mask |= Led::CAPSLOCK;
        }
        if leds.contains(Locks::NUM) {
            mask |= Led::NUMLOCK;
        }
        if leds.contains(Locks::SCROLL) {
            mask |= Led::SCROLLLOCK;
        }
        self.device.borrow_mut().led_update(mask);
    }
}

/// libinput context bound to a seat
pub struct LibinputSource {
    input: Libinput,
    fd: i32,
}

impl LibinputSource {
    pub fn open(
        seat: &str,
        opener: DeviceOpener,
        errors: ErrorSlot,
    ) -> Result<Self, ControllerError> {
        let mut input = match opener {
            DeviceOpener::Direct => Libinput::new_with_udev(DirectInterface { errors }),
            #[cfg(all(target_os = "linux", feature = "seatd"))]
            DeviceOpener::Seat(session) => {
                Libinput::new_with_udev(SeatInterface { session, errors })
            }
        };

        input
            .udev_assign_seat(seat)
            .map_err(|_| ControllerError::Seat(seat.to_string()))?;

        let fd = input.as_raw_fd();
        set_nonblocking(fd)?;

        info!("libinput: assigned seat '{}'", seat);
        Ok(Self { input, fd })
    }
}

fn set_nonblocking(fd: i32) -> io::Result<()> {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};

    let flags = fcntl(fd, FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(fd, FcntlArg::F_SETFL(flags))?;
    Ok(())
}

impl EventSource for LibinputSource {
    fn dispatch(&mut self) -> io::Result<Vec<RawEvent>> {
        self.input.dispatch()?;

        let mut events = Vec::new();
        for event in &mut self.input {
            match event {
                Event::Device(DeviceEvent::Added(added)) => {
                    let device = LibinputDevice::handle(added.device());
                    debug!("libinput: device added '{}' ({})", device.name(), device.id());
                    events.push(RawEvent::DeviceAdded(device));
                }
                Event::Device(DeviceEvent::Removed(removed)) => {
                    let device = LibinputDevice::handle(removed.device());
                    debug!("libinput: device removed '{}' ({})", device.name(), device.id());
                    events.push(RawEvent::DeviceRemoved(device));
                }
                Event::Keyboard(KeyboardEvent::Key(key)) => {
                    let direction = match key.key_state() {
                        KeyState::Pressed => KeyDirection::Down,
                        KeyState::Released => KeyDirection::Up,
                    };
                    events.push(RawEvent::Key {
                        device: LibinputDevice::handle(key.device()),
                        keycode: key.key(),
                        direction,
                    });
                }
                _ => {}
            }
        }

        Ok(events)
    }

    fn raw_fd(&self) -> Option<i32> {
        Some(self.fd)
    }

    fn suspend(&mut self) {
        info!("libinput: suspending");
        self.input.suspend();
    }

    fn resume(&mut self) -> io::Result<()> {
        info!("libinput: resuming");
        self.input
            .resume()
            .map_err(|()| io::Error::new(io::ErrorKind::Other, "libinput resume failed"))
    }
}
