//! Zone entity composition
//!
//! Every command and attribute a zone exposes is derived from [`CAPABILITY_RULES`].
//! A rule fires when all of its function tags are declared, its range (if any)
//! parsed, and its choice list (if any) is non-empty. Nothing outside that table
//! decides what the host may send to a zone.

use crate::command::CommandKind;
use crate::config::ReceiverConfig;
use crate::error::{AvrError, Result};
use crate::types::{Range, Zone, ZoneId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Attribute an entity reports to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    State,
    Volume,
    Muted,
    Source,
    SourceList,
    SoundMode,
    SoundModeList,
    MediaState,
}

/// Where a rule takes its enumerated choices from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceSource {
    Inputs,
    SoundPrograms,
    Cursor,
    Menu,
    HdmiOutputs,
    Fixed(&'static [&'static str]),
}

impl ChoiceSource {
    fn choices(&self, zone: &Zone) -> Vec<String> {
        match self {
            ChoiceSource::Inputs => zone.inputs.clone(),
            ChoiceSource::SoundPrograms => zone.sound_programs.clone(),
            ChoiceSource::Cursor => zone.cursor_commands.iter().cloned().collect(),
            ChoiceSource::Menu => zone.menu_commands.iter().cloned().collect(),
            ChoiceSource::HdmiOutputs => zone.hdmi_outputs.iter().cloned().collect(),
            ChoiceSource::Fixed(items) => items.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One row of the capability table
#[derive(Debug, Clone, Copy)]
pub struct CapabilityRule {
    /// Function tags that must all be declared
    pub functions: &'static [&'static str],
    /// Range that must have parsed; carried on every command of the rule
    pub range: Option<&'static str>,
    /// Enumerated choices that must be non-empty; carried on every command of the rule
    pub choices: Option<ChoiceSource>,
    pub attributes: &'static [Attribute],
    pub commands: &'static [CommandKind],
}

/// Sleep timer values accepted by the receiver, in minutes
pub const SLEEP_CHOICES: &[&str] = &["0", "30", "60", "90", "120"];

pub const CAPABILITY_RULES: &[CapabilityRule] = &[
    CapabilityRule {
        functions: &["power"],
        range: None,
        choices: None,
        attributes: &[Attribute::State],
        commands: &[CommandKind::On, CommandKind::Off, CommandKind::Toggle],
    },
    CapabilityRule {
        functions: &["volume"],
        range: Some("volume"),
        choices: None,
        attributes: &[Attribute::Volume],
        commands: &[
            CommandKind::VolumeSet,
            CommandKind::VolumeUp,
            CommandKind::VolumeDown,
        ],
    },
    CapabilityRule {
        functions: &["mute"],
        range: None,
        choices: None,
        attributes: &[Attribute::Muted],
        commands: &[CommandKind::MuteToggle, CommandKind::Mute, CommandKind::Unmute],
    },
    CapabilityRule {
        functions: &["sound_program"],
        range: None,
        choices: Some(ChoiceSource::SoundPrograms),
        attributes: &[Attribute::SoundMode, Attribute::SoundModeList],
        commands: &[CommandKind::SelectSoundMode],
    },
    CapabilityRule {
        functions: &["cursor"],
        range: None,
        choices: Some(ChoiceSource::Cursor),
        attributes: &[],
        commands: &[CommandKind::Cursor],
    },
    CapabilityRule {
        functions: &["menu"],
        range: None,
        choices: Some(ChoiceSource::Menu),
        attributes: &[],
        commands: &[CommandKind::Menu],
    },
    CapabilityRule {
        functions: &[],
        range: None,
        choices: Some(ChoiceSource::Inputs),
        attributes: &[Attribute::Source, Attribute::SourceList, Attribute::MediaState],
        commands: &[CommandKind::SelectSource],
    },
    CapabilityRule {
        functions: &["sleep"],
        range: None,
        choices: Some(ChoiceSource::Fixed(SLEEP_CHOICES)),
        attributes: &[],
        commands: &[CommandKind::Sleep],
    },
    CapabilityRule {
        functions: &["direct"],
        range: None,
        choices: None,
        attributes: &[],
        commands: &[CommandKind::Direct],
    },
    CapabilityRule {
        functions: &["pure_direct"],
        range: None,
        choices: None,
        attributes: &[],
        commands: &[CommandKind::PureDirect],
    },
    CapabilityRule {
        functions: &["clear_voice"],
        range: None,
        choices: None,
        attributes: &[],
        commands: &[CommandKind::ClearVoice],
    },
    CapabilityRule {
        functions: &[],
        range: None,
        choices: Some(ChoiceSource::HdmiOutputs),
        attributes: &[],
        commands: &[CommandKind::HdmiOutput],
    },
];

/// Validation data carried by an exposed command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

/// Attributes and commands a zone exposes to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneEntityDefinition {
    pub zone_id: ZoneId,
    pub exposed_attributes: BTreeSet<Attribute>,
    pub exposed_commands: BTreeMap<CommandKind, CommandSpec>,
}

/// Derive the entity definition of a zone
pub fn compose(zone: &Zone) -> ZoneEntityDefinition {
    let mut exposed_attributes = BTreeSet::new();
    let mut exposed_commands = BTreeMap::new();

    for rule in CAPABILITY_RULES {
        if !rule.functions.iter().all(|f| zone.supports(f)) {
            continue;
        }

        let range = match rule.range {
            Some(control) => match zone.range(control) {
                Some(range) => Some(range),
                None => {
                    tracing::debug!(zone = %zone.id, control, "Range missing, rule skipped");
                    continue;
                }
            },
            None => None,
        };

        let choices = match rule.choices {
            Some(source) => {
                let choices = source.choices(zone);
                if choices.is_empty() {
                    continue;
                }
                Some(choices)
            }
            None => None,
        };

        exposed_attributes.extend(rule.attributes.iter().copied());
        for command in rule.commands {
            exposed_commands.insert(
                *command,
                CommandSpec {
                    range,
                    choices: choices.clone(),
                },
            );
        }
    }

    ZoneEntityDefinition {
        zone_id: zone.id.clone(),
        exposed_attributes,
        exposed_commands,
    }
}

impl ZoneEntityDefinition {
    pub fn exposes(&self, command: CommandKind) -> bool {
        self.exposed_commands.contains_key(&command)
    }

    pub fn reports(&self, attribute: Attribute) -> bool {
        self.exposed_attributes.contains(&attribute)
    }

    /// Get the validation data of an exposed command
    pub fn command(&self, command: CommandKind) -> Option<&CommandSpec> {
        self.exposed_commands.get(&command)
    }

    /// Range of the volume control, if volume is exposed
    pub fn volume_range(&self) -> Option<Range> {
        self.command(CommandKind::VolumeSet).and_then(|spec| spec.range)
    }

    /// Split the zone into the host entities that represent it
    pub fn entities(&self, config: &ReceiverConfig) -> Vec<EntityDefinition> {
        let mut entities = Vec::new();

        let player_commands: BTreeSet<CommandKind> = self
            .exposed_commands
            .keys()
            .copied()
            .filter(|kind| EntityKind::MediaPlayer.accepts(*kind))
            .collect();

        if !player_commands.is_empty() || !self.exposed_attributes.is_empty() {
            entities.push(EntityDefinition {
                entity_id: entity_id(EntityKind::MediaPlayer, &config.identifier, &self.zone_id),
                kind: EntityKind::MediaPlayer,
                zone_id: self.zone_id.clone(),
                name: entity_name(config, &self.zone_id),
                attributes: self.exposed_attributes.clone(),
                commands: player_commands,
            });
        }

        let has_navigation = self.exposes(CommandKind::Cursor) || self.exposes(CommandKind::Menu);
        if config.expose_remote && has_navigation {
            entities.push(EntityDefinition {
                entity_id: entity_id(EntityKind::Remote, &config.identifier, &self.zone_id),
                kind: EntityKind::Remote,
                zone_id: self.zone_id.clone(),
                name: entity_name(config, &self.zone_id),
                attributes: BTreeSet::new(),
                commands: self
                    .exposed_commands
                    .keys()
                    .copied()
                    .filter(|kind| EntityKind::Remote.accepts(*kind))
                    .collect(),
            });
        }

        entities
    }
}

/// Type of host entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    MediaPlayer,
    Remote,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::MediaPlayer => "media_player",
            EntityKind::Remote => "remote",
        }
    }

    /// Whether this entity type understands a command
    pub fn accepts(&self, command: CommandKind) -> bool {
        match self {
            EntityKind::MediaPlayer => !matches!(command, CommandKind::Cursor | CommandKind::Menu),
            EntityKind::Remote => matches!(
                command,
                CommandKind::On
                    | CommandKind::Off
                    | CommandKind::Toggle
                    | CommandKind::Cursor
                    | CommandKind::Menu
                    | CommandKind::Sleep
                    | CommandKind::Direct
                    | CommandKind::PureDirect
                    | CommandKind::ClearVoice
                    | CommandKind::HdmiOutput
            ),
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "media_player" => Some(EntityKind::MediaPlayer),
            "remote" => Some(EntityKind::Remote),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host entity backed by one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub entity_id: String,
    pub kind: EntityKind,
    pub zone_id: ZoneId,
    pub name: String,
    pub attributes: BTreeSet<Attribute>,
    pub commands: BTreeSet<CommandKind>,
}

/// Build the entity id `<type>.<device>.<zone>`
pub fn entity_id(kind: EntityKind, device_id: &str, zone_id: &str) -> String {
    format!("{}.{}.{}", kind, device_id, zone_id)
}

/// Split an entity id into its type, device id and zone id
///
/// Device ids may contain dots, so the zone is taken from the last segment.
pub fn parse_entity_id(entity_id: &str) -> Result<(EntityKind, String, ZoneId)> {
    let unknown = || AvrError::UnknownEntity(entity_id.to_string());

    let (kind, rest) = entity_id.split_once('.').ok_or_else(unknown)?;
    let kind = EntityKind::parse(kind).ok_or_else(unknown)?;
    let (device, zone) = rest.rsplit_once('.').ok_or_else(unknown)?;
    if device.is_empty() || zone.is_empty() {
        return Err(unknown());
    }

    Ok((kind, device.to_string(), zone.to_string()))
}

fn entity_name(config: &ReceiverConfig, zone_id: &str) -> String {
    if zone_id == "main" {
        config.name.clone()
    } else {
        format!("{} {}", config.name, zone_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_zone() -> Zone {
        let mut zone = Zone::new("main");
        zone.functions = ["power", "volume", "mute", "sound_program", "cursor", "menu", "sleep"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        zone.inputs = vec!["hdmi1".to_string(), "tuner".to_string()];
        zone.ranges.insert("volume".to_string(), Range::new(0.0, 161.0, 1.0).unwrap());
        zone.sound_programs = vec!["straight".to_string(), "2ch_stereo".to_string()];
        zone.cursor_commands = ["up", "down", "select"].iter().map(|s| s.to_string()).collect();
        zone.menu_commands = ["home", "on_screen"].iter().map(|s| s.to_string()).collect();
        zone
    }

    fn config() -> ReceiverConfig {
        ReceiverConfig::new("AABBCCDDEEFF", "Living Room", "192.168.1.20")
    }

    #[test]
    fn test_compose_full_zone() {
        let def = compose(&main_zone());
        assert_eq!(def.zone_id, "main");
        for attribute in [
            Attribute::State,
            Attribute::Volume,
            Attribute::Muted,
            Attribute::Source,
            Attribute::SourceList,
            Attribute::SoundMode,
            Attribute::MediaState,
        ] {
            assert!(def.reports(attribute), "{:?} missing", attribute);
        }

        assert_eq!(def.volume_range(), Range::new(0.0, 161.0, 1.0));
        assert_eq!(
            def.command(CommandKind::SelectSource).unwrap().choices,
            Some(vec!["hdmi1".to_string(), "tuner".to_string()])
        );
        assert_eq!(
            def.command(CommandKind::Sleep).unwrap().choices.as_ref().unwrap().len(),
            SLEEP_CHOICES.len()
        );
        assert!(!def.exposes(CommandKind::Direct));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let zone = main_zone();
        assert_eq!(compose(&zone), compose(&zone));
    }

    #[test]
    fn test_identical_capabilities_compose_equal_apart_from_id() {
        let first = main_zone();
        let mut second = main_zone();
        second.id = "zone2".to_string();

        let mut a = compose(&first);
        let b = compose(&second);
        a.zone_id = b.zone_id.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn test_volume_requires_parsed_range() {
        let mut zone = main_zone();
        zone.ranges.clear();
        let def = compose(&zone);
        assert!(!def.exposes(CommandKind::VolumeSet));
        assert!(!def.exposes(CommandKind::VolumeUp));
        assert!(!def.exposes(CommandKind::VolumeDown));
        assert!(!def.reports(Attribute::Volume));
    }

    #[test]
    fn test_list_without_function_tag_exposes_nothing() {
        let mut zone = Zone::new("zone3");
        zone.sound_programs = vec!["straight".to_string()];
        zone.cursor_commands.insert("up".to_string());
        let def = compose(&zone);
        assert!(def.exposed_commands.is_empty());
        assert!(def.exposed_attributes.is_empty());
    }

    #[test]
    fn test_commands_never_exceed_functions() {
        let mut zone = Zone::new("zone4");
        zone.functions = ["power", "sleep", "prepare_input_change", "scene"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let def = compose(&zone);
        let kinds: Vec<_> = def.exposed_commands.keys().copied().collect();
        assert_eq!(
            kinds,
            vec![CommandKind::On, CommandKind::Off, CommandKind::Toggle, CommandKind::Sleep]
        );
    }

    #[test]
    fn test_entities_split_player_and_remote() {
        let def = compose(&main_zone());
        let entities = def.entities(&config());
        assert_eq!(entities.len(), 2);

        let player = &entities[0];
        assert_eq!(player.entity_id, "media_player.AABBCCDDEEFF.main");
        assert_eq!(player.name, "Living Room");
        assert!(player.commands.contains(&CommandKind::VolumeUp));
        assert!(!player.commands.contains(&CommandKind::Cursor));

        let remote = &entities[1];
        assert_eq!(remote.kind, EntityKind::Remote);
        assert!(remote.commands.contains(&CommandKind::Cursor));
        assert!(remote.commands.contains(&CommandKind::On));
        assert!(!remote.commands.contains(&CommandKind::VolumeUp));
    }

    #[test]
    fn test_hdmi_output_needs_declared_outputs() {
        let mut zone = main_zone();
        assert!(!compose(&zone).exposes(CommandKind::HdmiOutput));

        zone.hdmi_outputs = ["1", "2"].iter().map(|s| s.to_string()).collect();
        let def = compose(&zone);
        assert_eq!(
            def.command(CommandKind::HdmiOutput).unwrap().choices,
            Some(vec!["1".to_string(), "2".to_string()])
        );

        let entities = def.entities(&config());
        assert!(entities.iter().all(|e| e.commands.contains(&CommandKind::HdmiOutput)));
        assert!(entities[1].commands.contains(&CommandKind::Sleep));
    }

    #[test]
    fn test_remote_can_be_disabled() {
        let mut config = config();
        config.expose_remote = false;
        let entities = compose(&main_zone()).entities(&config);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].kind, EntityKind::MediaPlayer);
    }

    #[test]
    fn test_parse_entity_id() {
        let (kind, device, zone) = parse_entity_id("remote.dev.42.zone2").unwrap();
        assert_eq!(kind, EntityKind::Remote);
        assert_eq!(device, "dev.42");
        assert_eq!(zone, "zone2");

        assert!(matches!(
            parse_entity_id("light.dev.main"),
            Err(AvrError::UnknownEntity(_))
        ));
        assert!(parse_entity_id("media_player.main").is_err());
    }
}
