//! Per-type target list and its discovery state machine.
//!
//! A [`TargetList`] owns every target of one type (for cues, of one cue
//! list). Discovery is count-then-enumerate: request
//! `/eos/get/<type>[/<listId>]/count`, then one `/index/<i>` request per
//! announced slot, then fold the replies as they arrive. After the initial
//! sync, `notify` events punch holes back into the list (placeholders for
//! added or changed targets, full clear when the console won't say what
//! changed) and the next tick re-requests whatever is missing.
//!
//! Two statuses run in parallel: `status_internal` tracks only the count
//! handshake; `status` is the externally observable aggregate over every
//! owned target.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rosc::OscMessage;

use crate::log::Log;
use crate::number::{DecimalNumber, PathData};
use crate::osc::{Command, OscStream, arg_as_f64, arg_as_string, arg_as_u32};
use crate::socket::TcpConnection;
use crate::status::{SyncState, SyncStatus};
use crate::target::{Target, TargetType};

/// Progress of the count-then-enumerate handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitialSync {
    /// Target count announced by the console.
    pub count: usize,
    /// True once every announced target has been folded in.
    pub complete: bool,
}

/// All parts of one target number.
#[derive(Debug, Default)]
pub struct Parts {
    /// False while a placeholder is waiting for its info request to go out.
    pub initialized: bool,
    pub parts: BTreeMap<i32, Target>,
}

/// Every target of one type (and, for cues, one cue list).
#[derive(Debug)]
pub struct TargetList {
    ttype: TargetType,
    list_id: i32,
    targets: BTreeMap<DecimalNumber, Parts>,
    num_targets: usize,
    uid_lookup: HashMap<String, (DecimalNumber, i32)>,
    status: SyncStatus,
    status_internal: SyncStatus,
    initial_sync: InitialSync,
}

fn message(path: String) -> OscMessage {
    OscMessage {
        addr: path,
        args: Vec::new(),
    }
}

impl TargetList {
    pub fn new(ttype: TargetType, list_id: i32) -> Self {
        Self {
            ttype,
            list_id,
            targets: BTreeMap::new(),
            num_targets: 0,
            uid_lookup: HashMap::new(),
            status: SyncStatus::new(),
            status_internal: SyncStatus::new(),
            initial_sync: InitialSync::default(),
        }
    }

    pub fn target_type(&self) -> TargetType {
        self.ttype
    }

    pub fn list_id(&self) -> i32 {
        self.list_id
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn targets(&self) -> &BTreeMap<DecimalNumber, Parts> {
        &self.targets
    }

    pub fn num_targets(&self) -> usize {
        self.num_targets
    }

    pub fn initial_sync(&self) -> &InitialSync {
        &self.initial_sync
    }

    /// Look up one target by number and part.
    pub fn target(&self, num: DecimalNumber, part: i32) -> Option<&Target> {
        self.targets.get(&num).and_then(|p| p.parts.get(&part))
    }

    /// Resolve a console-assigned UID to its target.
    pub fn target_by_uid(&self, uid: &str) -> Option<&Target> {
        let (num, part) = self.uid_lookup.get(uid)?;
        self.target(*num, *part)
    }

    /// UID index entries, as `(uid, (number, part))`.
    pub fn uid_lookup(&self) -> &HashMap<String, (DecimalNumber, i32)> {
        &self.uid_lookup
    }

    /// Reset to the uninitialized state, dropping every target.
    pub fn clear(&mut self) {
        self.targets.clear();
        self.num_targets = 0;
        self.uid_lookup.clear();
        self.initial_sync = InitialSync::default();
        self.status.set_value(SyncState::Uninitialized);
        self.status_internal.set_value(SyncState::Uninitialized);
    }

    /// Mark this list as trivially complete without talking to the
    /// console. Used for the placeholder cue lists the router installs.
    pub fn initialize_as_dummy(&mut self) {
        self.clear();
        self.status_internal.set_value(SyncState::Complete);
        self.status.set_value(SyncState::Complete);
        self.initial_sync.complete = true;
    }

    /// `/eos/get/<type>[/<listId>]`
    fn request_base(&self) -> String {
        if self.ttype == TargetType::Cue {
            format!("/eos/get/{}/{}", self.ttype.name(), self.list_id)
        } else {
            format!("/eos/get/{}", self.ttype.name())
        }
    }

    /// `/eos/out/get/<type>[/<listId>]`
    fn reply_base(&self) -> String {
        if self.ttype == TargetType::Cue {
            format!("/eos/out/get/{}/{}", self.ttype.name(), self.list_id)
        } else {
            format!("/eos/out/get/{}", self.ttype.name())
        }
    }

    /// Advance discovery: kick off the count request, request info for any
    /// placeholder, and promote the aggregate status once everything the
    /// console announced has arrived.
    pub fn tick(&mut self, tcp: &mut TcpConnection, osc: &mut OscStream, log: &mut Log) {
        match self.status_internal.value() {
            SyncState::Uninitialized => {
                let path = format!("{}/count", self.request_base());
                if osc.send(tcp, log, message(path), false) {
                    self.status_internal.set_value(SyncState::Running);
                }
            }
            SyncState::Running => {
                // waiting for the count reply
            }
            SyncState::Complete => {
                if self.status.value() != SyncState::Running {
                    return;
                }

                let mut all_targets_complete = true;
                let base = self.request_base();
                for (num, parts) in self.targets.iter_mut() {
                    if !parts.initialized {
                        // a notify left a placeholder; request its info
                        let path = format!("{base}/{num}");
                        if osc.send(tcp, log, message(path), false) {
                            parts.initialized = true;
                        }
                        all_targets_complete = false;
                    } else if parts.parts.is_empty() {
                        // info request is out, reply pending
                        all_targets_complete = false;
                    } else if parts
                        .parts
                        .values()
                        .any(|t| t.status().value() != SyncState::Complete)
                    {
                        all_targets_complete = false;
                    }
                }

                if all_targets_complete {
                    if self.initial_sync.complete {
                        self.status.set_value(SyncState::Complete);
                    } else if self.num_targets >= self.initial_sync.count {
                        self.initial_sync.complete = true;
                        self.status.set_value(SyncState::Complete);
                    }
                }
            }
        }
    }

    /// Fold one `/eos/out/get/` reply into the list.
    pub fn recv(&mut self, tcp: &mut TcpConnection, osc: &mut OscStream, log: &mut Log, cmd: &Command) {
        match self.status_internal.value() {
            SyncState::Running => {
                let count_path = format!("{}/count", self.reply_base());
                if cmd.path == count_path {
                    if cmd.args.is_empty() {
                        return;
                    }
                    let count = match arg_as_u32(&cmd.args[0]) {
                        Some(count) => count as usize,
                        None => {
                            log.error(format!("ignored reply \"{}\", missing argument", cmd.path));
                            0
                        }
                    };
                    self.initial_sync.count = count;

                    let base = self.request_base();
                    for i in 0..count {
                        let path = format!("{base}/index/{i}");
                        if !osc.send(tcp, log, message(path.clone()), false) {
                            log.error(format!("failed to send command \"{path}\""));
                        }
                    }

                    self.status.set_value(SyncState::Running);
                    self.status_internal.set_value(SyncState::Complete);
                } else {
                    log.error(format!("ignored reply \"{}\", unhandled command", cmd.path));
                }
            }
            SyncState::Complete => {
                let prefix = format!("{}/", self.reply_base());
                if !cmd.path.starts_with(&prefix) {
                    log.error(format!("ignored reply \"{}\", unexpected format", cmd.path));
                    return;
                }
                match PathData::parse(&cmd.path, prefix.len()) {
                    Some(path_data) if path_data.key.is_valid() => {
                        self.process_received_target(log, cmd, &path_data);
                    }
                    Some(_) => {
                        log.error(format!("ignored reply \"{}\", invalid target", cmd.path));
                    }
                    None => {
                        log.error(format!("ignored reply \"{}\", could not extract target", cmd.path));
                    }
                }
            }
            SyncState::Uninitialized => {
                log.info(format!("ignored unsolicited reply \"{}\"", cmd.path));
            }
        }
    }

    fn process_received_target(&mut self, log: &mut Log, cmd: &Command, path_data: &PathData) {
        let mut part = path_data.key.part;
        match self.ttype {
            TargetType::Cue => {
                if part < 0 {
                    log.error(format!("invalid part number specified \"{}\"", cmd.path));
                    return;
                }
            }
            TargetType::Patch => {
                if part < 1 {
                    log.error(format!("invalid part number specified \"{}\"", cmd.path));
                    return;
                }
            }
            _ => {
                if part != 0 {
                    log.warning(format!("invalid part number specified \"{}\"", cmd.path));
                    part = 0;
                }
            }
        }

        let num = path_data.key.num;
        let base_target_info = path_data.group.is_empty();

        let uid = if base_target_info && cmd.args.len() > 1 {
            arg_as_string(&cmd.args[1]).unwrap_or_default()
        } else {
            String::new()
        };

        if base_target_info && uid.is_empty() {
            // a base reply without a UID announces a deletion
            let mut drop_number = false;
            if let Some(parts) = self.targets.get_mut(&num) {
                if parts.parts.remove(&part).is_some() {
                    self.uid_lookup.retain(|_, owner| *owner != (num, part));
                    self.num_targets -= 1;
                    self.status.set_dirty();
                }
                drop_number = parts.parts.is_empty();
            }
            if drop_number {
                self.targets.remove(&num);
            }
            return;
        }

        let ttype = self.ttype;
        let parts = self.targets.entry(num).or_default();
        parts.initialized = true;
        let added = if parts.parts.contains_key(&part) {
            false
        } else {
            parts.parts.insert(part, Target::new(ttype));
            true
        };

        if added {
            self.num_targets += 1;
            if uid.is_empty() {
                log.error(format!("target reply missing UID \"{}\"", cmd.path));
            } else {
                self.uid_lookup.insert(uid, (num, part));
            }
            self.status.set_dirty();
        }

        let Some(target) = self.targets.get_mut(&num).and_then(|p| p.parts.get_mut(&part)) else {
            return;
        };
        target.recv(log, cmd, path_data);
        let child = target.status().clone();
        self.status.update_from_child(&child);
    }

    /// Merge a `/eos/out/notify/` event.
    pub fn notify(&mut self, log: &mut Log, cmd: &Command) {
        if !self.initial_sync.complete {
            log.info(format!(
                "notified during initial sync \"{}\", restarting...",
                cmd.path
            ));
            self.clear();
            return;
        }

        // first arg is a sequence number used by the UDP flavor of the
        // protocol; skipped even over TCP
        if cmd.args.len() <= 1 {
            // the console won't say what changed; the whole list is dirty
            self.clear();
            return;
        }

        let mut bad_args = false;
        let mut numbers: BTreeSet<DecimalNumber> = BTreeSet::new();
        for arg in &cmd.args[1..] {
            if arg_as_f64(arg).is_some() {
                match arg_as_string(arg).map(|s| s.parse::<DecimalNumber>()) {
                    Some(Ok(num)) => {
                        numbers.insert(num);
                    }
                    _ => bad_args = true,
                }
            } else {
                // not a plain number; expecting an inclusive "a-b" range
                let mut got_range = false;
                if let Some(s) = arg_as_string(arg) {
                    if s.len() > 2 {
                        if let Some(n) = s.find('-') {
                            if n != 0 && n < s.len() - 1 {
                                if let (Ok(start), Ok(end)) =
                                    (s[..n].parse::<i32>(), s[n + 1..].parse::<i32>())
                                {
                                    if start <= end {
                                        for v in start..=end {
                                            numbers.insert(DecimalNumber::from(v));
                                        }
                                        got_range = true;
                                    }
                                }
                            }
                        }
                    }
                }
                if !got_range {
                    bad_args = true;
                }
            }
        }

        if bad_args {
            log.error(format!("invalid arguments in notify \"{}\"", cmd.path));
            return;
        }

        for num in numbers {
            match self.targets.get_mut(&num) {
                None => {
                    // new target; placeholder until the next tick requests it
                    self.targets.insert(num, Parts::default());
                    self.status.set_value(SyncState::Running);
                }
                Some(parts) => {
                    // existing target changed; drop its data, keep a placeholder
                    let removed = parts.parts.len();
                    parts.parts.clear();
                    parts.initialized = false;
                    self.uid_lookup.retain(|_, owner| owner.0 != num);
                    self.num_targets -= removed;
                    self.status.set_value(SyncState::Running);
                }
            }
        }
    }

    pub fn clear_dirty(&mut self) {
        if self.status.dirty() {
            for parts in self.targets.values_mut() {
                for target in parts.parts.values_mut() {
                    target.clear_dirty();
                }
            }
            self.status.clear_dirty();
        }
    }
}
