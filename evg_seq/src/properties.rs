//! Statically-declared property table.
//!
//! Each device type publishes a fixed table of named properties. A binding
//! layer resolves names once, at configuration time, into descriptors and
//! then reads or writes through them; an unknown name fails resolution
//! instead of surfacing at run time.
//!
//! ```text
//! "event_codes" ──resolve()──▶ &PropertyDescriptor ──write()──▶ set_event_codes()
//! ```

use crate::definition::SequenceDefinition;
use evg_common::seq::error::SequenceError;
use evg_common::seq::types::{RunMode, TriggerSource};
use std::sync::Arc;

use Access::{Command, ReadOnly, ReadWrite};

/// How a property may be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Readback only.
    ReadOnly,
    /// Readable and writable.
    ReadWrite,
    /// Write triggers an action; reads return [`PropertyValue::None`].
    Command,
}

/// Value type carried by a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// No payload (commands).
    None,
    /// Boolean.
    Bool,
    /// Unsigned counter.
    Unsigned,
    /// Free text.
    Text,
    /// Byte array (event codes, masks).
    Codes,
    /// Tick array.
    Ticks,
    /// Trigger source.
    Trigger,
    /// Run mode.
    Mode,
}

impl ValueType {
    const fn name(self) -> &'static str {
        match self {
            ValueType::None => "no value",
            ValueType::Bool => "bool",
            ValueType::Unsigned => "unsigned integer",
            ValueType::Text => "text",
            ValueType::Codes => "byte array",
            ValueType::Ticks => "tick array",
            ValueType::Trigger => "trigger source",
            ValueType::Mode => "run mode",
        }
    }
}

/// A property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// No payload.
    None,
    /// Boolean.
    Bool(bool),
    /// Unsigned counter.
    Unsigned(u64),
    /// Free text.
    Text(String),
    /// Byte array.
    Codes(Vec<u8>),
    /// Tick array.
    Ticks(Vec<u64>),
    /// Trigger source.
    Trigger(TriggerSource),
    /// Run mode.
    Mode(RunMode),
}

/// Property identity used for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyId {
    /// Description text.
    Description,
    /// Working event codes.
    EventCodes,
    /// Working timestamps.
    Timestamps,
    /// Working masks.
    Masks,
    /// Working trigger source.
    TriggerSource,
    /// Working run mode.
    RunMode,
    /// Enable (true) or disable (false).
    Enable,
    /// Commit command.
    Commit,
    /// Load command.
    Load,
    /// Unload command.
    Unload,
    /// Abort command.
    Abort,
    /// Pause command.
    Pause,
    /// Software trigger command.
    SoftTrigger,
    /// Explicit sync command.
    Sync,
    /// Committed event codes.
    CommittedEventCodes,
    /// Committed absolute timestamps.
    CommittedTimestamps,
    /// Committed masks.
    CommittedMasks,
    /// Committed trigger source.
    CommittedTriggerSource,
    /// Committed run mode.
    CommittedRunMode,
    /// Working copy matches the snapshot.
    IsCommitted,
    /// Holds a Sequence RAM.
    IsLoaded,
    /// Hardware holds the snapshot.
    IsSynced,
    /// EOS counter.
    RunCount,
    /// SOS counter.
    StartCount,
}

/// One entry of a property table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Property name.
    pub name: &'static str,
    /// Dispatch id.
    pub id: PropertyId,
    /// Access rights.
    pub access: Access,
    /// Value type.
    pub value_type: ValueType,
}

const fn prop(
    name: &'static str,
    id: PropertyId,
    access: Access,
    value_type: ValueType,
) -> PropertyDescriptor {
    PropertyDescriptor {
        name,
        id,
        access,
        value_type,
    }
}

/// A device type and its property table.
#[derive(Debug)]
pub struct DeviceType {
    /// Device type name.
    pub name: &'static str,
    /// Property table.
    pub properties: &'static [PropertyDescriptor],
}

impl DeviceType {
    /// Resolve a property by name.
    ///
    /// # Errors
    /// `SequenceError::UnknownProperty` if the table has no such name.
    pub fn resolve(&self, name: &str) -> Result<&PropertyDescriptor, SequenceError> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| SequenceError::UnknownProperty(name.to_string()))
    }
}

/// Software sequence device type.
pub static SOFT_SEQUENCE: DeviceType = DeviceType {
    name: "SoftSeq",
    properties: &[
        prop("description", PropertyId::Description, ReadWrite, ValueType::Text),
        prop("event_codes", PropertyId::EventCodes, ReadWrite, ValueType::Codes),
        prop("timestamps", PropertyId::Timestamps, ReadWrite, ValueType::Ticks),
        prop("masks", PropertyId::Masks, ReadWrite, ValueType::Codes),
        prop("trigger_source", PropertyId::TriggerSource, ReadWrite, ValueType::Trigger),
        prop("run_mode", PropertyId::RunMode, ReadWrite, ValueType::Mode),
        prop("enable", PropertyId::Enable, ReadWrite, ValueType::Bool),
        prop("commit", PropertyId::Commit, Command, ValueType::None),
        prop("load", PropertyId::Load, Command, ValueType::None),
        prop("unload", PropertyId::Unload, Command, ValueType::None),
        prop("abort", PropertyId::Abort, Command, ValueType::None),
        prop("pause", PropertyId::Pause, Command, ValueType::None),
        prop("soft_trigger", PropertyId::SoftTrigger, Command, ValueType::None),
        prop("sync", PropertyId::Sync, Command, ValueType::None),
        prop("event_codes_ct", PropertyId::CommittedEventCodes, ReadOnly, ValueType::Codes),
        prop("timestamps_ct", PropertyId::CommittedTimestamps, ReadOnly, ValueType::Ticks),
        prop("masks_ct", PropertyId::CommittedMasks, ReadOnly, ValueType::Codes),
        prop("trigger_source_ct", PropertyId::CommittedTriggerSource, ReadOnly, ValueType::Trigger),
        prop("run_mode_ct", PropertyId::CommittedRunMode, ReadOnly, ValueType::Mode),
        prop("committed", PropertyId::IsCommitted, ReadOnly, ValueType::Bool),
        prop("loaded", PropertyId::IsLoaded, ReadOnly, ValueType::Bool),
        prop("synced", PropertyId::IsSynced, ReadOnly, ValueType::Bool),
        prop("run_count", PropertyId::RunCount, ReadOnly, ValueType::Unsigned),
        prop("start_count", PropertyId::StartCount, ReadOnly, ValueType::Unsigned),
    ],
};

fn type_error(prop: &PropertyDescriptor) -> SequenceError {
    SequenceError::PropertyType {
        property: prop.name,
        expected: prop.value_type.name(),
    }
}

/// Write `value` through a resolved property.
///
/// # Errors
/// - `SequenceError::PropertyReadOnly` for readback properties
/// - `SequenceError::PropertyType` if `value` does not match the property
/// - Whatever the underlying operation returns
pub fn write(
    def: &Arc<SequenceDefinition>,
    prop: &PropertyDescriptor,
    value: PropertyValue,
) -> Result<(), SequenceError> {
    if prop.access == ReadOnly {
        return Err(SequenceError::PropertyReadOnly(prop.name));
    }

    match (prop.id, value) {
        (PropertyId::Description, PropertyValue::Text(text)) => {
            def.set_description(text);
            Ok(())
        }
        (PropertyId::EventCodes, PropertyValue::Codes(codes)) => def.set_event_codes(&codes),
        (PropertyId::Timestamps, PropertyValue::Ticks(ticks)) => def.set_timestamps(&ticks),
        (PropertyId::Masks, PropertyValue::Codes(masks)) => def.set_masks(&masks),
        (PropertyId::TriggerSource, PropertyValue::Trigger(source)) => {
            def.set_trigger_source(source);
            Ok(())
        }
        (PropertyId::RunMode, PropertyValue::Mode(mode)) => {
            def.set_run_mode(mode);
            Ok(())
        }
        (PropertyId::RunMode, PropertyValue::Text(name)) => {
            let mode = RunMode::from_name(&name).ok_or_else(|| type_error(prop))?;
            def.set_run_mode(mode);
            Ok(())
        }
        (PropertyId::Enable, PropertyValue::Bool(true)) => {
            def.enable();
            Ok(())
        }
        (PropertyId::Enable, PropertyValue::Bool(false)) => def.disable(),
        (PropertyId::Commit, PropertyValue::None) => def.commit(),
        (PropertyId::Load, PropertyValue::None) => def.load(),
        (PropertyId::Unload, PropertyValue::None) => {
            def.unload();
            Ok(())
        }
        (PropertyId::Abort, PropertyValue::None) => def.abort(),
        (PropertyId::Pause, PropertyValue::None) => def.pause(),
        (PropertyId::SoftTrigger, PropertyValue::None) => def.soft_trigger(),
        (PropertyId::Sync, PropertyValue::None) => {
            def.sync();
            Ok(())
        }
        _ => Err(type_error(prop)),
    }
}

/// Read a resolved property.
pub fn read(def: &SequenceDefinition, prop: &PropertyDescriptor) -> PropertyValue {
    match prop.id {
        PropertyId::Description => PropertyValue::Text(def.description()),
        PropertyId::EventCodes => PropertyValue::Codes(def.event_codes()),
        PropertyId::Timestamps => PropertyValue::Ticks(def.timestamps()),
        PropertyId::Masks => PropertyValue::Codes(def.masks()),
        PropertyId::TriggerSource => PropertyValue::Trigger(def.trigger_source()),
        PropertyId::RunMode => PropertyValue::Mode(def.run_mode()),
        PropertyId::Enable => PropertyValue::Bool(def.is_enabled()),
        PropertyId::CommittedEventCodes => PropertyValue::Codes(def.committed().event_codes()),
        PropertyId::CommittedTimestamps => PropertyValue::Ticks(def.committed().timestamps()),
        PropertyId::CommittedMasks => PropertyValue::Codes(def.committed().masks()),
        PropertyId::CommittedTriggerSource => {
            PropertyValue::Trigger(def.committed().trigger_source)
        }
        PropertyId::CommittedRunMode => PropertyValue::Mode(def.committed().run_mode),
        PropertyId::IsCommitted => PropertyValue::Bool(def.is_committed()),
        PropertyId::IsLoaded => PropertyValue::Bool(def.is_loaded()),
        PropertyId::IsSynced => PropertyValue::Bool(def.is_synced()),
        PropertyId::RunCount => PropertyValue::Unsigned(def.run_count()),
        PropertyId::StartCount => PropertyValue::Unsigned(def.start_count()),
        PropertyId::Commit
        | PropertyId::Load
        | PropertyId::Unload
        | PropertyId::Abort
        | PropertyId::Pause
        | PropertyId::SoftTrigger
        | PropertyId::Sync => PropertyValue::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulation::SimSeqRam;
    use crate::compiler::CompileLimits;
    use crate::slot_manager::SlotManager;
    use std::collections::HashSet;

    fn definition() -> Arc<SequenceDefinition> {
        let slots = Arc::new(SlotManager::new(vec![Box::new(SimSeqRam::new(16))]));
        SequenceDefinition::new(
            1,
            "props",
            slots,
            CompileLimits {
                capacity: 16,
                post_gap: 125,
            },
        )
    }

    fn set(def: &Arc<SequenceDefinition>, name: &str, value: PropertyValue) {
        let prop = SOFT_SEQUENCE.resolve(name).unwrap();
        write(def, prop, value).unwrap();
    }

    #[test]
    fn test_names_are_unique() {
        let mut seen = HashSet::new();
        for prop in SOFT_SEQUENCE.properties {
            assert!(seen.insert(prop.name), "duplicate {}", prop.name);
        }
    }

    #[test]
    fn test_unknown_name_fails_resolution() {
        assert_eq!(
            SOFT_SEQUENCE.resolve("bogus"),
            Err(SequenceError::UnknownProperty("bogus".into()))
        );
    }

    #[test]
    fn test_write_then_read_through_table() {
        let def = definition();
        set(&def, "event_codes", PropertyValue::Codes(vec![1, 2]));
        set(&def, "timestamps", PropertyValue::Ticks(vec![10, 20]));
        set(&def, "trigger_source", PropertyValue::Trigger(TriggerSource::Software));
        set(&def, "commit", PropertyValue::None);

        let committed = SOFT_SEQUENCE.resolve("committed").unwrap();
        assert_eq!(read(&def, committed), PropertyValue::Bool(true));
        let ts = SOFT_SEQUENCE.resolve("timestamps_ct").unwrap();
        assert_eq!(read(&def, ts), PropertyValue::Ticks(vec![10, 20, 145]));
        let src = SOFT_SEQUENCE.resolve("trigger_source_ct").unwrap();
        assert_eq!(read(&def, src), PropertyValue::Trigger(TriggerSource::Software));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let def = definition();
        let prop = SOFT_SEQUENCE.resolve("run_count").unwrap();
        assert_eq!(
            write(&def, prop, PropertyValue::Unsigned(3)),
            Err(SequenceError::PropertyReadOnly("run_count"))
        );
    }

    #[test]
    fn test_wrong_value_type_rejected() {
        let def = definition();
        let prop = SOFT_SEQUENCE.resolve("masks").unwrap();
        assert!(matches!(
            write(&def, prop, PropertyValue::Bool(true)),
            Err(SequenceError::PropertyType { property: "masks", .. })
        ));
    }

    #[test]
    fn test_run_mode_accepts_names() {
        let def = definition();
        set(&def, "run_mode", PropertyValue::Text("recycle".into()));
        assert_eq!(def.run_mode(), RunMode::Auto);

        let prop = SOFT_SEQUENCE.resolve("run_mode").unwrap();
        assert!(matches!(
            write(&def, prop, PropertyValue::Text("twice".into())),
            Err(SequenceError::PropertyType { property: "run_mode", .. })
        ));
        assert_eq!(def.run_mode(), RunMode::Auto);
    }

    #[test]
    fn test_commands_drive_lifecycle() {
        let def = definition();
        set(&def, "load", PropertyValue::None);
        set(&def, "enable", PropertyValue::Bool(true));
        let loaded = SOFT_SEQUENCE.resolve("loaded").unwrap();
        assert_eq!(read(&def, loaded), PropertyValue::Bool(true));

        set(&def, "enable", PropertyValue::Bool(false));
        set(&def, "unload", PropertyValue::None);
        assert_eq!(read(&def, loaded), PropertyValue::Bool(false));
        assert_eq!(
            read(&def, SOFT_SEQUENCE.resolve("load").unwrap()),
            PropertyValue::None
        );
    }
}
