//! Addressable console objects and their property storage.
//!
//! Every console object a show can hold (one cue, one patch channel, one
//! group, ...) is a [`Target`]: a fixed set of named property groups, each
//! an ordered run of string-valued properties filled in by replies. The
//! legal group names depend on the [`TargetType`] and never change after
//! construction.

use std::collections::BTreeMap;

use crate::log::Log;
use crate::number::PathData;
use crate::osc::{Command, arg_as_string};
use crate::status::{SyncState, SyncStatus};

/// The sixteen target categories a console exports.
///
/// Declaration order matters: reply routing scans types in `Ord` order and
/// relies on `CueList` being tested before `Cue` so that a `cuelist` path
/// prefix is never claimed by the `cue` handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetType {
    Patch,
    CueList,
    Cue,
    Group,
    Macro,
    Sub,
    Preset,
    IntensityPalette,
    FocusPalette,
    ColorPalette,
    BeamPalette,
    Curve,
    Effect,
    Snapshot,
    PixelMap,
    MagicSheet,
}

impl TargetType {
    /// Every type, in routing order.
    pub const ALL: [TargetType; 16] = [
        TargetType::Patch,
        TargetType::CueList,
        TargetType::Cue,
        TargetType::Group,
        TargetType::Macro,
        TargetType::Sub,
        TargetType::Preset,
        TargetType::IntensityPalette,
        TargetType::FocusPalette,
        TargetType::ColorPalette,
        TargetType::BeamPalette,
        TargetType::Curve,
        TargetType::Effect,
        TargetType::Snapshot,
        TargetType::PixelMap,
        TargetType::MagicSheet,
    ];

    /// Wire name used in OSC paths.
    pub fn name(self) -> &'static str {
        match self {
            TargetType::Patch => "patch",
            TargetType::CueList => "cuelist",
            TargetType::Cue => "cue",
            TargetType::Group => "group",
            TargetType::Macro => "macro",
            TargetType::Sub => "sub",
            TargetType::Preset => "preset",
            TargetType::IntensityPalette => "ip",
            TargetType::FocusPalette => "fp",
            TargetType::ColorPalette => "cp",
            TargetType::BeamPalette => "bp",
            TargetType::Curve => "curve",
            TargetType::Effect => "fx",
            TargetType::Snapshot => "snap",
            TargetType::PixelMap => "pixmap",
            TargetType::MagicSheet => "ms",
        }
    }

    /// Legal property-group names for this type. The empty name is the
    /// general group every type carries.
    fn group_names(self) -> &'static [&'static str] {
        match self {
            TargetType::Patch => &["", "notes"],
            TargetType::CueList => &["", "links"],
            TargetType::Cue => &["", "fx", "links", "actions"],
            TargetType::Group => &["", "channels"],
            TargetType::Macro => &["", "text"],
            TargetType::Sub => &["", "fx"],
            TargetType::Preset => &["", "channels", "byType", "fx"],
            TargetType::IntensityPalette
            | TargetType::FocusPalette
            | TargetType::ColorPalette
            | TargetType::BeamPalette => &["", "channels", "byType"],
            TargetType::Curve
            | TargetType::Effect
            | TargetType::Snapshot
            | TargetType::MagicSheet => &[""],
            TargetType::PixelMap => &["", "channels"],
        }
    }
}

/// One string-valued property slot.
#[derive(Debug, Clone, Default)]
pub struct Property {
    pub initialized: bool,
    pub value: String,
}

/// An ordered run of properties under one group name. `initialized` flips
/// once the first reply for the group arrives and fixes the slot count.
#[derive(Debug, Clone, Default)]
pub struct PropertyGroup {
    pub initialized: bool,
    pub props: Vec<Property>,
}

/// One addressable console object.
#[derive(Debug)]
pub struct Target {
    status: SyncStatus,
    groups: BTreeMap<String, PropertyGroup>,
}

impl Target {
    /// Create a target with the group schema of `ttype`.
    pub fn new(ttype: TargetType) -> Self {
        let groups = ttype
            .group_names()
            .iter()
            .map(|name| (name.to_string(), PropertyGroup::default()))
            .collect();
        Self {
            status: SyncStatus::new(),
            groups,
        }
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    /// Property groups, keyed by group name ("" is the general group).
    pub fn prop_groups(&self) -> &BTreeMap<String, PropertyGroup> {
        &self.groups
    }

    /// Convenience lookup of one group.
    pub fn group(&self, name: &str) -> Option<&PropertyGroup> {
        self.groups.get(name)
    }

    /// Merge one reply into this target's properties.
    pub fn recv(&mut self, log: &mut Log, cmd: &Command, path_data: &PathData) {
        match self.status.value() {
            SyncState::Complete => {
                log.info(format!("ignored unsolicited reply \"{}\"", cmd.path));
                return;
            }
            SyncState::Uninitialized => self.status.set_value(SyncState::Running),
            SyncState::Running => {}
        }

        let Some(group) = self.groups.get_mut(&path_data.group) else {
            log.warning(format!(
                "ignored reply \"{}\", unexpected property group",
                cmd.path
            ));
            return;
        };

        let num_props = if path_data.is_list {
            path_data.list_size as usize
        } else {
            cmd.args.len()
        };

        if group.initialized {
            if group.props.len() != num_props {
                log.error(format!(
                    "invalid reply \"{}\", existing property count {} does not match new count {}",
                    cmd.path,
                    group.props.len(),
                    num_props
                ));
            }
        } else {
            group.props.resize_with(num_props, Property::default);
            group.initialized = true;
        }

        for (j, arg) in cmd.args.iter().enumerate() {
            if let Some(prop) = group.props.get_mut(j) {
                prop.value = arg_as_string(arg).unwrap_or_default();
                prop.initialized = true;
            } else {
                log.error(format!(
                    "invalid property \"{}\" at index {} of {}",
                    cmd.path,
                    j,
                    group.props.len()
                ));
            }
        }

        let got_all_props = self
            .groups
            .values()
            .all(|g| g.initialized && g.props.iter().all(|p| p.initialized));
        if got_all_props {
            self.status.set_value(SyncState::Complete);
        }
    }

    pub fn clear_dirty(&mut self) {
        self.status.clear_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::OscType;

    fn cmd(path: &str, args: Vec<OscType>) -> Command {
        Command {
            path: path.to_string(),
            args,
        }
    }

    fn path_data(path: &str) -> PathData {
        PathData::parse(path, 0).unwrap()
    }

    #[test]
    fn test_group_schema_is_fixed_per_type() {
        let cue = Target::new(TargetType::Cue);
        let names: Vec<_> = cue.prop_groups().keys().map(String::as_str).collect();
        assert_eq!(names, ["", "actions", "fx", "links"]);

        let curve = Target::new(TargetType::Curve);
        assert_eq!(curve.prop_groups().len(), 1);
        assert!(curve.group("").is_some());
    }

    #[test]
    fn test_single_group_type_completes_on_one_reply() {
        let mut log = Log::new();
        let mut target = Target::new(TargetType::Snapshot);

        let c = cmd(
            "/eos/out/get/snap/1",
            vec![
                OscType::Int(1),
                OscType::String("uid-1".into()),
                OscType::String("Preshow".into()),
            ],
        );
        target.recv(&mut log, &c, &path_data("1"));

        assert_eq!(target.status().value(), SyncState::Complete);
        let general = target.group("").unwrap();
        assert_eq!(general.props.len(), 3);
        assert_eq!(general.props[0].value, "1");
        assert_eq!(general.props[1].value, "uid-1");
        assert_eq!(general.props[2].value, "Preshow");
    }

    #[test]
    fn test_multi_group_type_needs_every_group() {
        let mut log = Log::new();
        let mut target = Target::new(TargetType::Group);

        let base = cmd(
            "/eos/out/get/group/7",
            vec![
                OscType::Int(7),
                OscType::String("uid-7".into()),
                OscType::String("cyc".into()),
            ],
        );
        target.recv(&mut log, &base, &path_data("7"));
        assert_eq!(target.status().value(), SyncState::Running);

        let channels = cmd(
            "/eos/out/get/group/7/channels",
            vec![OscType::Int(1), OscType::Int(2)],
        );
        target.recv(&mut log, &channels, &path_data("7/channels"));
        assert_eq!(target.status().value(), SyncState::Complete);
    }

    #[test]
    fn test_zero_property_group_does_not_block_completion() {
        let mut log = Log::new();
        let mut target = Target::new(TargetType::Group);

        // channels group announces an empty list
        let channels = cmd("/eos/out/get/group/7/channels", vec![]);
        target.recv(&mut log, &channels, &path_data("7/channels"));
        assert_eq!(target.status().value(), SyncState::Running);
        assert!(target.group("channels").unwrap().initialized);

        let base = cmd(
            "/eos/out/get/group/7",
            vec![OscType::Int(7), OscType::String("uid-7".into())],
        );
        target.recv(&mut log, &base, &path_data("7"));
        assert_eq!(target.status().value(), SyncState::Complete);
    }

    #[test]
    fn test_list_reply_sizes_from_announced_total() {
        let mut log = Log::new();
        let mut target = Target::new(TargetType::Snapshot);

        // first chunk announces 4 slots but delivers only 2 args
        let c = cmd(
            "/eos/out/get/snap/1/list/0/4",
            vec![OscType::Int(1), OscType::String("uid-1".into())],
        );
        target.recv(&mut log, &c, &path_data("1/list/0/4"));

        let general = target.group("").unwrap();
        assert_eq!(general.props.len(), 4);
        assert!(general.props[1].initialized);
        assert!(!general.props[2].initialized);
        assert_eq!(target.status().value(), SyncState::Running);
    }

    #[test]
    fn test_repeat_reply_with_mismatched_count_keeps_storage() {
        let mut log = Log::new();
        let mut target = Target::new(TargetType::Snapshot);

        let first = cmd(
            "/eos/out/get/snap/1/list/0/4",
            vec![OscType::Int(1), OscType::String("uid-1".into())],
        );
        target.recv(&mut log, &first, &path_data("1/list/0/4"));
        log.drain();

        let second = cmd("/eos/out/get/snap/1", vec![OscType::Int(1)]);
        target.recv(&mut log, &second, &path_data("1"));

        assert_eq!(target.group("").unwrap().props.len(), 4, "storage kept");
        let records = log.drain();
        assert!(records.iter().any(|r| r.text.contains("does not match")));
    }

    #[test]
    fn test_unknown_group_is_ignored_with_warning() {
        let mut log = Log::new();
        let mut target = Target::new(TargetType::Macro);

        let c = cmd("/eos/out/get/macro/1/channels", vec![OscType::Int(1)]);
        target.recv(&mut log, &c, &path_data("1/channels"));

        assert_eq!(target.status().value(), SyncState::Running);
        assert!(!target.group("").unwrap().initialized);
        let records = log.drain();
        assert!(records.iter().any(|r| r.text.contains("unexpected property group")));
    }

    #[test]
    fn test_replies_after_complete_are_unsolicited() {
        let mut log = Log::new();
        let mut target = Target::new(TargetType::Curve);

        let c = cmd("/eos/out/get/curve/901", vec![OscType::Int(901)]);
        target.recv(&mut log, &c, &path_data("901"));
        assert_eq!(target.status().value(), SyncState::Complete);
        log.drain();

        let before = target.group("").unwrap().props[0].value.clone();
        let again = cmd("/eos/out/get/curve/901", vec![OscType::Int(902)]);
        target.recv(&mut log, &again, &path_data("901"));

        assert_eq!(target.group("").unwrap().props[0].value, before);
        let records = log.drain();
        assert!(records.iter().any(|r| r.text.contains("unsolicited")));
    }
}
