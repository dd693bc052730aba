//! The console client facade.
//!
//! [`EosConsole`] owns the socket, the framed OSC stream, the log queue,
//! and the mirror, and wires them together under a single tick:
//!
//! ```no_run
//! use eosync::EosConsole;
//!
//! let mut console = EosConsole::new();
//! console.initialize("192.168.1.10", EosConsole::DEFAULT_PORT)?;
//! while console.is_running() {
//!     console.tick();
//!     for record in console.drain_log() {
//!         println!("[{}] {}", record.kind.label(), record.text);
//!     }
//!     if console.is_connected_and_synchronized() {
//!         // inspect console.data() / console.groups() / ...
//!     }
//!     console.clear_dirty();
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! # Ok::<(), eosync::Error>(())
//! ```

use rosc::{OscMessage, OscType};

use crate::error::Result;
use crate::list::TargetList;
use crate::log::{Log, LogRecord};
use crate::osc::OscStream;
use crate::socket::{ConnectState, TcpConnection};
use crate::status::SyncState;
use crate::sync::SyncData;
use crate::target::TargetType;

const SUBSCRIBE_PATH: &str = "/eos/subscribe";

/// A tick-driven client connection to one console.
#[derive(Debug, Default)]
pub struct EosConsole {
    log: Log,
    tcp: TcpConnection,
    osc: OscStream,
    data: SyncData,
}

impl EosConsole {
    /// The console's OSC-over-TCP control port.
    pub const DEFAULT_PORT: u16 = 3032;

    pub fn new() -> Self {
        Self::default()
    }

    /// Begin connecting. The connect completes over subsequent ticks.
    pub fn initialize(&mut self, host: &str, port: u16) -> Result<()> {
        self.tcp.initialize(&mut self.log, host, port)
    }

    /// Unsubscribe, drop the mirror, and close the socket.
    pub fn shutdown(&mut self) {
        let unsubscribe = OscMessage {
            addr: SUBSCRIBE_PATH.to_string(),
            args: vec![OscType::Bool(false)],
        };
        self.osc.send(&mut self.tcp, &mut self.log, unsubscribe, true);

        self.data.clear();
        self.osc.clear();
        self.tcp.shutdown();
    }

    /// Advance the connection, the mirror, and the outbound queue.
    pub fn tick(&mut self) {
        let was_connected = self.is_connected();

        self.tcp.tick(&mut self.log);

        if self.is_connected() {
            if !was_connected {
                let subscribe = OscMessage {
                    addr: SUBSCRIBE_PATH.to_string(),
                    args: vec![OscType::Bool(true)],
                };
                self.osc.send(&mut self.tcp, &mut self.log, subscribe, false);
            }

            self.data.tick(&mut self.tcp, &mut self.osc, &mut self.log);
            self.osc.tick(&mut self.tcp, &mut self.log);
        }
    }

    /// True while a connection attempt is in flight or established.
    pub fn is_running(&self) -> bool {
        self.tcp.connect_state() != ConnectState::NotConnected
    }

    pub fn is_connected(&self) -> bool {
        self.tcp.is_connected()
    }

    /// True once every target list has completed its initial sync.
    pub fn is_synchronized(&self) -> bool {
        self.data.status().value() == SyncState::Complete
    }

    pub fn is_connected_and_synchronized(&self) -> bool {
        self.is_connected() && self.is_synchronized()
    }

    /// Send an arbitrary OSC message to the console. Queued sends go out
    /// one per tick; immediate sends bypass the queue.
    pub fn send(&mut self, msg: OscMessage, immediate: bool) -> bool {
        self.is_connected() && self.osc.send(&mut self.tcp, &mut self.log, msg, immediate)
    }

    pub fn data(&self) -> &SyncData {
        &self.data
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    /// Take every pending log record.
    pub fn drain_log(&mut self) -> Vec<LogRecord> {
        self.log.drain()
    }

    /// Clear the dirty bit across the whole mirror.
    pub fn clear_dirty(&mut self) {
        self.data.clear_dirty();
    }

    pub fn patch(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::Patch, 0)
    }

    pub fn cue_list(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::CueList, 0)
    }

    /// The cues of one cue list.
    pub fn cues(&self, list_id: i32) -> Option<&TargetList> {
        self.data.target_list(TargetType::Cue, list_id)
    }

    pub fn groups(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::Group, 0)
    }

    pub fn macros(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::Macro, 0)
    }

    pub fn subs(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::Sub, 0)
    }

    pub fn presets(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::Preset, 0)
    }

    pub fn intensity_palettes(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::IntensityPalette, 0)
    }

    pub fn focus_palettes(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::FocusPalette, 0)
    }

    pub fn color_palettes(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::ColorPalette, 0)
    }

    pub fn beam_palettes(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::BeamPalette, 0)
    }

    pub fn curves(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::Curve, 0)
    }

    pub fn effects(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::Effect, 0)
    }

    pub fn snapshots(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::Snapshot, 0)
    }

    pub fn pixel_maps(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::PixelMap, 0)
    }

    pub fn magic_sheets(&self) -> Option<&TargetList> {
        self.data.target_list(TargetType::MagicSheet, 0)
    }
}
