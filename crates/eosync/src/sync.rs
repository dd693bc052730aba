//! The show-data mirror and its reply router.
//!
//! [`SyncData`] owns one [`TargetList`] per target type, plus one per
//! discovered cue list. Each tick advances every incomplete list's
//! discovery, then drains inbound OSC commands and routes them by path
//! prefix: `/eos/out/get/` replies to the matching list, `/eos/out/notify/`
//! events likewise, show loaded/cleared events reset the whole mirror.
//!
//! Cue lists get special handling: discovering the cue-list directory
//! spawns one `Cue` list per entry, a notify for an unknown cue list
//! installs a dummy so placeholders have somewhere to land, and cue lists
//! that disappear from the directory are pruned.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use crate::list::TargetList;
use crate::log::Log;
use crate::number::DecimalNumber;
use crate::osc::{Command, OscStream};
use crate::socket::TcpConnection;
use crate::status::{SyncState, SyncStatus};
use crate::target::TargetType;

/// Bound on the per-tick socket wait.
const RECV_TIMEOUT: Duration = Duration::from_millis(10);

const GET_REPLY_PREFIX: &str = "/eos/out/get/";
const NOTIFY_PREFIX: &str = "/eos/out/notify/";
const SHOW_LOADED_PREFIX: &str = "/eos/out/event/show/loaded";
const SHOW_CLEARED_PREFIX: &str = "/eos/out/event/show/cleared";

/// The in-memory mirror of the console's show database.
#[derive(Debug, Default)]
pub struct SyncData {
    status: SyncStatus,
    show_data: BTreeMap<TargetType, BTreeMap<i32, TargetList>>,
}

/// `atoi` semantics: optional sign, leading digits, zero otherwise.
fn leading_int(s: &str) -> i32 {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits.bytes().take_while(u8::is_ascii_digit).count();
    digits[..end].parse::<i32>().map(|v| sign * v).unwrap_or(0)
}

impl SyncData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    /// The full mirror: per-type, per-list-id target lists. Only cues use
    /// non-zero list ids.
    pub fn show_data(&self) -> &BTreeMap<TargetType, BTreeMap<i32, TargetList>> {
        &self.show_data
    }

    pub fn target_list(&self, ttype: TargetType, list_id: i32) -> Option<&TargetList> {
        self.show_data.get(&ttype)?.get(&list_id)
    }

    /// Drop the whole mirror and return to the uninitialized state.
    pub fn clear(&mut self) {
        self.show_data.clear();
        self.status.set_value(SyncState::Uninitialized);
    }

    /// Advance discovery and drain inbound commands.
    pub fn tick(&mut self, tcp: &mut TcpConnection, osc: &mut OscStream, log: &mut Log) {
        match self.status.value() {
            SyncState::Uninitialized => self.initialize(),
            SyncState::Running => self.tick_running(tcp, osc, log),
            SyncState::Complete => {}
        }

        self.recv(tcp, osc, log);
    }

    pub fn clear_dirty(&mut self) {
        if self.status.dirty() {
            for lists in self.show_data.values_mut() {
                for list in lists.values_mut() {
                    list.clear_dirty();
                }
            }
            self.status.clear_dirty();
        }
    }

    /// Install one empty list per non-cue type; cue lists are spawned as
    /// the cue-list directory is discovered.
    fn initialize(&mut self) {
        self.clear();
        for ttype in TargetType::ALL {
            if ttype != TargetType::Cue {
                self.show_data
                    .entry(ttype)
                    .or_default()
                    .insert(0, TargetList::new(ttype, 0));
            }
        }
        self.status.set_value(SyncState::Running);
    }

    fn tick_running(&mut self, tcp: &mut TcpConnection, osc: &mut OscStream, log: &mut Log) {
        let mut all_complete = true;

        let keys: Vec<(TargetType, i32)> = self
            .show_data
            .iter()
            .flat_map(|(t, lists)| lists.keys().map(|id| (*t, *id)))
            .collect();

        for (ttype, list_id) in keys {
            let Some(list) = self.show_data.get_mut(&ttype).and_then(|m| m.get_mut(&list_id))
            else {
                continue;
            };
            if list.status().value() == SyncState::Complete {
                continue;
            }

            let was_initial_sync_complete = list.initial_sync().complete;
            list.tick(tcp, osc, log);

            let child = list.status().clone();
            let finished_initial_sync = !was_initial_sync_complete && list.initial_sync().complete;
            let cue_list_numbers = (finished_initial_sync && ttype == TargetType::CueList)
                .then(|| list.targets().keys().copied().collect::<Vec<_>>());

            self.status.update_from_child(&child);
            if let Some(numbers) = cue_list_numbers {
                // freshly spawned cue lists start uninitialized; they get
                // their first tick next pass, so this pass cannot complete
                if self.on_cue_list_sync_complete(numbers) {
                    all_complete = false;
                }
            }

            if child.value() != SyncState::Complete {
                all_complete = false;
            }
        }

        if all_complete {
            self.status.set_value(SyncState::Complete);
            log.info("synchronization complete");
        }
    }

    /// The cue-list directory finished its initial sync: allocate a fresh
    /// `Cue` list per entry, or a dummy when the directory is empty so the
    /// aggregate can still complete. Returns whether any incomplete list
    /// was installed.
    fn on_cue_list_sync_complete(&mut self, cue_list_numbers: Vec<DecimalNumber>) -> bool {
        if cue_list_numbers.is_empty() {
            if !self.show_data.contains_key(&TargetType::Cue) {
                let mut dummy = TargetList::new(TargetType::Cue, 0);
                dummy.initialize_as_dummy();
                self.show_data
                    .entry(TargetType::Cue)
                    .or_default()
                    .insert(0, dummy);
            }
            return false;
        }

        for number in cue_list_numbers {
            let cue_list_id = number.whole;
            self.show_data
                .entry(TargetType::Cue)
                .or_default()
                .insert(cue_list_id, TargetList::new(TargetType::Cue, cue_list_id));
        }
        true
    }

    /// Drain every complete inbound packet through the router.
    fn recv(&mut self, tcp: &mut TcpConnection, osc: &mut OscStream, log: &mut Log) {
        let mut commands = VecDeque::new();
        osc.recv(tcp, log, RECV_TIMEOUT, &mut commands);

        for cmd in commands {
            self.recv_cmd(tcp, osc, log, &cmd);
        }
    }

    /// Match a reply/notify path against the type table: first type whose
    /// wire name prefixes the path wins (scan order makes `cuelist` win
    /// over `cue`). For cues the list id follows the type name and must be
    /// at least 1.
    fn route(&self, prefix: &str, path: &str) -> Option<(TargetType, i32)> {
        for ttype in TargetType::ALL {
            let type_prefix = format!("{prefix}{}", ttype.name());
            if !path.starts_with(&type_prefix) {
                continue;
            }

            let mut list_id = 0;
            if ttype == TargetType::Cue {
                if let Some(rest) = path.get(type_prefix.len() + 1..) {
                    list_id = leading_int(rest);
                }
                if list_id < 1 {
                    return None;
                }
            }

            return Some((ttype, list_id));
        }
        None
    }

    fn recv_cmd(&mut self, tcp: &mut TcpConnection, osc: &mut OscStream, log: &mut Log, cmd: &Command) {
        if cmd.path.starts_with(GET_REPLY_PREFIX) {
            if self.status.value() != SyncState::Running {
                log.info(format!("ignored unsolicited reply \"{}\"", cmd.path));
                return;
            }

            let routed = self.route(GET_REPLY_PREFIX, &cmd.path);
            let dispatched = routed.is_some_and(|(ttype, list_id)| {
                let Some(list) = self.show_data.get_mut(&ttype).and_then(|m| m.get_mut(&list_id))
                else {
                    return false;
                };
                list.recv(tcp, osc, log, cmd);
                let child = list.status().clone();
                self.status.update_from_child(&child);
                if ttype == TargetType::CueList {
                    self.remove_orphaned_cues();
                }
                true
            });

            if !dispatched {
                log.warning(format!("ignored unrecognized reply target \"{}\"", cmd.path));
            }
            return;
        }

        if self.status.value() == SyncState::Uninitialized {
            return;
        }

        if cmd.path.starts_with(NOTIFY_PREFIX) {
            let routed = self.route(NOTIFY_PREFIX, &cmd.path);
            let dispatched = routed.is_some_and(|(ttype, list_id)| {
                let Some(lists) = self.show_data.get_mut(&ttype) else {
                    return false;
                };
                if !lists.contains_key(&list_id) {
                    if ttype != TargetType::Cue {
                        return false;
                    }
                    // a freshly created cue list; install a dummy so the
                    // notify can seed placeholders
                    let mut dummy = TargetList::new(TargetType::Cue, list_id);
                    dummy.initialize_as_dummy();
                    lists.insert(list_id, dummy);
                }
                let list = lists.get_mut(&list_id).expect("just ensured");
                list.notify(log, cmd);
                let child = list.status().clone();
                self.status.update_from_child(&child);
                true
            });

            if !dispatched {
                log.warning(format!("ignored unrecognized notify target \"{}\"", cmd.path));
            }
        } else if cmd.path.starts_with(SHOW_LOADED_PREFIX) {
            log.info("reset sync data, new show loaded");
            self.clear();
        } else if cmd.path.starts_with(SHOW_CLEARED_PREFIX) {
            log.info("reset sync data, show cleared");
            self.clear();
        } else {
            log.warning(format!("ignored unrecognized path \"{}\"", cmd.path));
        }
    }

    /// Prune every cue list whose id no longer appears in the cue-list
    /// directory. List id 0 (the dummy) is always kept.
    fn remove_orphaned_cues(&mut self) {
        let Some(directory) = self
            .show_data
            .get(&TargetType::CueList)
            .and_then(|lists| lists.get(&0))
        else {
            return;
        };
        let known: Vec<i32> = directory
            .targets()
            .keys()
            .filter(|n| n.decimal == 0)
            .map(|n| n.whole)
            .collect();

        if let Some(cues) = self.show_data.get_mut(&TargetType::Cue) {
            cues.retain(|list_id, _| *list_id == 0 || known.contains(list_id));
        }
    }
}
