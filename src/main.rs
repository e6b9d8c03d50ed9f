//! keyterm - one shell per physical keyboard on the Linux console
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Event Loop                  │
//! ├──────────────────────────────────────────┤
//! │  libinput  →  Controller  →  Keyboards   │
//! │                    ↓                     │
//! │        enabled list  →  Panes (PTY)      │
//! │                             ↓            │
//! │                          stdout          │
//! └──────────────────────────────────────────┘
//! ```

mod config;
mod constants;
mod input;
mod session;
mod terminal;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::os::fd::RawFd;
use std::sync::mpsc;
use std::time::Instant;

#[cfg(all(target_os = "linux", feature = "seatd"))]
use std::cell::RefCell;
#[cfg(all(target_os = "linux", feature = "seatd"))]
use std::rc::Rc;

use constants::MAX_POLL_TIMEOUT_MS;
use input::{Controller, ControllerOptions, DeviceOpener, KeyboardRef, LayoutId, ListChange};
use session::console::ConsoleLocks;
use terminal::Panes;

/// Print help message
fn print_help() {
    println!(
        r#"keyterm {} - one terminal pane per keyboard on the Linux console

USAGE:
    keyterm [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    -v                      More log output (repeat for more)
    --layout <LAYOUT>       Display layout, e.g. "de" or "de+nodeadkeys"
    --init-config           Generate a commented config file
    -f, --force             Overwrite an existing config file

Each keyboard on the seat starts parked. Press its digit (shown in the
log, 1-9 then 0) on that keyboard to bind it to a new pane.

CONFIG FILE:
    ~/.config/keyterm/config.toml
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Parsed command line
#[derive(Debug, Default, PartialEq)]
struct Args {
    help: bool,
    version: bool,
    verbosity: usize,
    layout: Option<String>,
    init_config: bool,
    force: bool,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "-V" | "--version" => parsed.version = true,
            "--init-config" => parsed.init_config = true,
            "-f" | "--force" => parsed.force = true,
            "--layout" => {
                let value = iter.next().context("--layout needs a value")?;
                parsed.layout = Some(value.clone());
            }
            _ if arg.starts_with("--layout=") => {
                parsed.layout = Some(arg["--layout=".len()..].to_string());
            }
            // -v, -vv, -vvv
            _ if arg.len() > 1 && arg.starts_with('-') && arg[1..].chars().all(|c| c == 'v') => {
                parsed.verbosity += arg.len() - 1;
            }
            _ => anyhow::bail!("Unknown option '{}' (see --help)", arg),
        }
    }
    Ok(parsed)
}

fn default_filter(verbosity: usize) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Milliseconds poll(2) may sleep before the nearest deadline
fn poll_timeout(deadline: Option<Instant>, now: Instant) -> i32 {
    let Some(deadline) = deadline else {
        return MAX_POLL_TIMEOUT_MS;
    };
    let wait = deadline.saturating_duration_since(now);
    // Round up so the deadline has passed on wakeup
    let ms = wait.as_micros().div_ceil(1000);
    ms.min(MAX_POLL_TIMEOUT_MS as u128) as i32
}

/// Wait until one of `fds` is readable or `timeout_ms` elapses
fn wait_readable(fds: &[RawFd], timeout_ms: i32) {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    // SAFETY: pollfds is a valid array of pollfd for its whole length
    let ret = unsafe {
        libc::poll(
            pollfds.as_mut_ptr(),
            pollfds.len() as libc::nfds_t,
            timeout_ms,
        )
    };
    if ret < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            warn!("poll failed: {}", err);
        }
    }
}

/// Apply pending enabled-list changes to the panes. Keyboards whose shell
/// could not start are unbound again.
fn sync_panes(
    controller: &mut Controller,
    panes: &mut Panes,
    changes: &mpsc::Receiver<ListChange<KeyboardRef>>,
) {
    loop {
        let failed: Vec<KeyboardRef> = changes
            .try_iter()
            .filter_map(|change| panes.apply(change))
            .collect();
        if failed.is_empty() {
            break;
        }
        for keyboard in failed {
            controller.remove(&keyboard);
        }
    }
}

/// Announce new keyboards and the digit that binds them
fn report_keyboards(changes: &mpsc::Receiver<ListChange<KeyboardRef>>) {
    for change in changes.try_iter() {
        let keyboard = change.item().borrow();
        match &change {
            ListChange::Inserted(..) => info!(
                "keyboard: '{}' connected, press {} on it to open a pane",
                keyboard.name(),
                keyboard.index_digit()
            ),
            ListChange::Removed(..) => info!("keyboard: '{}' disconnected", keyboard.name()),
        }
    }
}

fn permission_diagnostic(message: &str) {
    eprintln!("keyterm: {}", message);
    eprintln!("keyterm: some input devices cannot be opened. Add your user to the");
    eprintln!("keyterm: 'input' group, or run keyterm under seatd or logind.");
}

fn main() -> Result<()> {
    let argv: Vec<String> = std::env::args().collect();
    let args = parse_args(&argv)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter(args.verbosity)),
    )
    .init();

    if args.help {
        print_help();
        return Ok(());
    }

    if args.version {
        println!("keyterm {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.init_config {
        let path = config::Config::write_template(args.force)?;
        println!("Config file written: {}", path.display());
        return Ok(());
    }

    info!("keyterm starting...");

    let config = config::Config::load();
    let layout_override = args
        .layout
        .as_deref()
        .map(str::parse::<LayoutId>)
        .transpose()
        .context("Invalid --layout")?;
    let layout = match layout_override.clone() {
        Some(layout) => layout,
        None => match config.keyboard.layout_id() {
            Ok(layout) => layout,
            Err(e) => {
                warn!("Ignoring configured layout: {}", e);
                LayoutId::us()
            }
        },
    };

    session::signal::setup_termination_handler()?;

    #[cfg(all(target_os = "linux", feature = "seatd"))]
    let seat_session = match session::SeatSession::open() {
        Ok(mut session) => {
            // Pick up the initial enable
            if let Err(e) = session.dispatch() {
                warn!("{:#}", e);
            }
            if !session.is_active() {
                warn!("libseat: seat '{}' is not active yet", session.name());
            }
            Some(Rc::new(RefCell::new(session)))
        }
        Err(e) => {
            warn!("{:#}, opening devices directly", e);
            None
        }
    };

    #[cfg(all(target_os = "linux", feature = "seatd"))]
    let opener = match &seat_session {
        Some(session) => DeviceOpener::Seat(session.clone()),
        None => DeviceOpener::Direct,
    };
    #[cfg(not(all(target_os = "linux", feature = "seatd")))]
    let opener = DeviceOpener::Direct;

    let options = ControllerOptions {
        layout: Some(layout),
        repeat: config.keyboard.repeat_timing(),
    };
    let mut controller = Controller::start(&config.input.seat, opener, options)
        .context("fatal: cannot start input")?;

    let keyboard_changes = controller.subscribe_keyboards();
    let enabled_changes = controller.subscribe_enabled();
    let mut panes = Panes::new(config.terminal.clone());

    #[cfg(target_os = "linux")]
    let config_path = config::Config::config_path();
    #[cfg(target_os = "linux")]
    let config_watcher = config_path.as_deref().and_then(|path| {
        config::ConfigWatcher::new(path)
            .map_err(|e| warn!("Config hot reload disabled: {:#}", e))
            .ok()
    });
    #[cfg(target_os = "linux")]
    let mut file_layout = config.keyboard.layout.clone();

    info!("Input loop started");

    // Notify systemd that we're ready
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);

    let mut stdout = std::io::stdout();

    loop {
        if session::signal::termination_requested() {
            info!("Termination requested, shutting down...");
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
            break;
        }

        let mut fds: Vec<RawFd> = controller.raw_fd().into_iter().collect();
        #[cfg(all(target_os = "linux", feature = "seatd"))]
        if let Some(session) = &seat_session {
            match session.borrow_mut().get_fd() {
                Ok(fd) => fds.push(fd),
                Err(e) => debug!("{:#}", e),
            }
        }
        fds.extend(panes.poll_fds());

        wait_readable(&fds, poll_timeout(controller.next_deadline(), Instant::now()));

        // VT switches
        #[cfg(all(target_os = "linux", feature = "seatd"))]
        if let Some(session) = &seat_session {
            let events: Vec<session::SessionEvent> = {
                let mut session = session.borrow_mut();
                if let Err(e) = session.dispatch() {
                    warn!("{:#}", e);
                }
                std::iter::from_fn(|| session.try_recv_event()).collect()
            };
            for event in events {
                // The seat revokes device fds while disabled
                let result = match event {
                    session::SessionEvent::Disable => controller.suspend_at(Instant::now()),
                    session::SessionEvent::Enable => controller.resume_at(Instant::now()),
                };
                if let Err(e) = result {
                    warn!("{:?}: {}", event, e);
                }
            }
        }

        controller.dispatch()?;
        controller.run_timers(Instant::now());

        report_keyboards(&keyboard_changes);
        sync_panes(&mut controller, &mut panes, &enabled_changes);

        for keyboard in panes.service(&mut stdout) {
            controller.remove(&keyboard);
        }
        sync_panes(&mut controller, &mut panes, &enabled_changes);

        if let Some(message) = controller.take_error_notice() {
            permission_diagnostic(&message);
        }

        // Config hot-reload (Linux only)
        #[cfg(target_os = "linux")]
        if let (Some(watcher), Some(path)) = (&config_watcher, &config_path) {
            if watcher.check_reload() {
                info!("Config file change detected, reloading...");
                match config::Config::load_from_file(path) {
                    Ok(new_config) if new_config.keyboard.layout != file_layout => {
                        file_layout = new_config.keyboard.layout.clone();
                        if layout_override.is_some() {
                            info!("Layout pinned by --layout, ignoring config change");
                        } else {
                            match new_config
                                .keyboard
                                .layout_id()
                                .and_then(|layout| controller.set_layout(&layout))
                            {
                                Ok(()) => {}
                                Err(e) => warn!("Keeping previous layout: {}", e),
                            }
                        }
                    }
                    Ok(_) => debug!("Layout unchanged"),
                    Err(e) => warn!("{:#}", e),
                }
            }
        }
    }

    info!("Closing {} panes", panes.open_count());
    controller.shutdown(&ConsoleLocks);
    info!("keyterm stopped");
    Ok(())
}
