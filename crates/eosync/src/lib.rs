//! Live show-database mirror for Eos-family consoles over OSC/TCP.
//!
//! This crate keeps an in-memory copy of everything a console's show
//! holds — patch, cue lists, cues, groups, macros, submasters, presets,
//! palettes, curves, effects, snapshots, pixel maps, magic sheets — and
//! keeps that copy coherent while the console is edited live.
//!
//! The whole library is driven by a single periodic tick; there is no
//! background thread and no async runtime. Each tick advances the
//! connection, walks the discovery state machine (count a type's targets,
//! enumerate them by index, fold the replies), drains inbound replies and
//! `notify` events, and flushes at most one queued outbound packet.
//!
//! The library observes the console; it never mutates show data. Arbitrary
//! outbound OSC can still be sent through [`EosConsole::send`].
//!
//! # Example
//!
//! ```no_run
//! use eosync::EosConsole;
//!
//! let mut console = EosConsole::new();
//! console.initialize("192.168.1.10", EosConsole::DEFAULT_PORT)?;
//!
//! while console.is_running() {
//!     console.tick();
//!
//!     if console.is_connected_and_synchronized() {
//!         if let Some(groups) = console.groups() {
//!             println!("{} groups", groups.num_targets());
//!         }
//!         break;
//!     }
//!
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! console.shutdown();
//! # Ok::<(), eosync::Error>(())
//! ```
//!
//! # Synchronization model
//!
//! Every node of the mirror carries a tri-state [`SyncStatus`]
//! (uninitialized / running / complete) plus a sticky dirty bit. Statuses
//! aggregate upward: a target list is complete once every target it owns
//! is, the whole mirror once every list is. [`EosConsole::is_synchronized`]
//! reads the root; [`EosConsole::clear_dirty`] rearms change detection
//! after the host has consumed a tick's worth of updates.

pub mod client;
pub mod error;
pub mod list;
pub mod log;
pub mod number;
pub mod osc;
pub mod socket;
pub mod status;
pub mod sync;
pub mod target;

// Re-export the common types at crate root for convenience
pub use client::EosConsole;
pub use error::{Error, Result};
pub use list::{InitialSync, Parts, TargetList};
pub use log::{Log, LogKind, LogRecord};
pub use number::{DecimalNumber, PathData, TargetKey};
pub use osc::{Command, OscStream};
pub use socket::{ConnectState, TcpConnection};
pub use status::{SyncState, SyncStatus};
pub use sync::SyncData;
pub use target::{Property, PropertyGroup, Target, TargetType};

// The OSC codec is part of the public surface (`EosConsole::send` takes a
// `rosc::OscMessage`), so re-export it.
pub use rosc;
