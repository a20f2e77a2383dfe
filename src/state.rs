use crate::entity::{Attribute, ZoneEntityDefinition};
use crate::types::{PlaybackState, PowerState, Range, TriState, ZoneId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Observed state of one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    pub zone_id: ZoneId,
    pub power: PowerState,
    pub volume: Option<f64>,
    pub muted: Option<bool>,
    pub active_input: Option<String>,
    pub sound_program: Option<String>,
    pub playback: Option<PlaybackState>,
}

impl ZoneState {
    pub fn new(zone_id: impl Into<ZoneId>) -> Self {
        Self {
            zone_id: zone_id.into(),
            power: PowerState::Unknown,
            volume: None,
            muted: None,
            active_input: None,
            sound_program: None,
            playback: None,
        }
    }
}

/// Zone status reported by the device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceEvent {
    pub power: Option<PowerState>,
    pub volume: Option<f64>,
    pub mute: Option<bool>,
    pub input: Option<String>,
    pub sound_program: Option<String>,
    pub playback: Option<PlaybackState>,
    /// Fields this crate does not track
    pub extra: BTreeMap<String, Value>,
}

const STATUS_FIELDS: &[&str] = &["power", "volume", "mute", "input", "sound_program", "playback"];

impl DeviceEvent {
    /// Read a zone status document (`getStatus` response or one zone of a pushed event)
    pub fn from_status(json: &Value) -> Self {
        let str_field = |name: &str| json.get(name).and_then(|v| v.as_str());

        let mute = match TriState::from_descriptor(json.get("mute")) {
            TriState::True => Some(true),
            TriState::False => Some(false),
            TriState::Unknown => None,
        };

        let extra = json
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter(|(key, _)| !STATUS_FIELDS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            power: str_field("power").and_then(PowerState::from_device),
            volume: json.get("volume").and_then(|v| v.as_f64()),
            mute,
            input: str_field("input").map(|s| s.to_string()),
            sound_program: str_field("sound_program").map(|s| s.to_string()),
            playback: str_field("playback").and_then(PlaybackState::from_device),
            extra,
        }
    }

    fn is_empty(&self) -> bool {
        self.power.is_none()
            && self.volume.is_none()
            && self.mute.is_none()
            && self.input.is_none()
            && self.sound_program.is_none()
            && self.playback.is_none()
    }
}

/// Split a pushed event document into per-zone events
///
/// Each object-valued section is treated as a zone candidate; callers filter
/// on the zones they know about.
pub fn split_event_payload(json: &Value) -> Vec<(ZoneId, DeviceEvent)> {
    let Some(obj) = json.as_object() else {
        return Vec::new();
    };

    obj.iter()
        .filter(|(_, section)| section.is_object())
        .map(|(zone_id, section)| (zone_id.clone(), DeviceEvent::from_status(section)))
        .filter(|(_, event)| !event.is_empty())
        .collect()
}

/// Tentative state change applied when a command is routed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimisticUpdate {
    Power(PowerState),
    Volume(f64),
    Muted(bool),
}

/// A single host-visible attribute change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "attribute", content = "value", rename_all = "snake_case")]
pub enum AttributeChange {
    State(PowerState),
    Volume(f64),
    Muted(bool),
    Source(String),
    SoundMode(String),
    MediaState(PlaybackState),
}

/// Changed attributes of a zone, handed to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDelta {
    pub zone_id: ZoneId,
    pub changes: Vec<AttributeChange>,
    /// Whether the values are unconfirmed by the device
    pub optimistic: bool,
}

#[derive(Clone)]
struct TrackedZone {
    state: ZoneState,
    attributes: BTreeSet<Attribute>,
    volume_range: Option<Range>,
    /// Attributes whose stored value came from an optimistic update
    optimistic: BTreeSet<Attribute>,
}

impl TrackedZone {
    fn reports(&self, attribute: Attribute) -> bool {
        self.attributes.contains(&attribute)
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// Owner of all zone state
///
/// Device events and optimistic updates are the only ways state changes.
/// Confirmed values always replace optimistic ones, and no delta is produced
/// when a value does not change.
#[derive(Clone, Default)]
pub struct ZoneStateTracker {
    zones: BTreeMap<ZoneId, TrackedZone>,
}

impl ZoneStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a zone or refresh its gating after re-composition
    ///
    /// Values of attributes the zone no longer reports are cleared and the
    /// stored volume is clamped to the current range.
    pub fn register(&mut self, definition: &ZoneEntityDefinition) {
        let zone = self
            .zones
            .entry(definition.zone_id.clone())
            .or_insert_with(|| TrackedZone {
                state: ZoneState::new(definition.zone_id.clone()),
                attributes: BTreeSet::new(),
                volume_range: None,
                optimistic: BTreeSet::new(),
            });

        zone.attributes = definition.exposed_attributes.clone();
        zone.volume_range = definition.volume_range();
        let attributes = zone.attributes.clone();
        zone.optimistic.retain(|attribute| attributes.contains(attribute));

        let state = &mut zone.state;
        if !attributes.contains(&Attribute::State) {
            state.power = PowerState::Unknown;
        }
        match zone.volume_range {
            Some(range) if attributes.contains(&Attribute::Volume) => {
                state.volume = state.volume.map(|v| range.clamp(v));
            }
            _ => state.volume = None,
        }
        if !attributes.contains(&Attribute::Muted) {
            state.muted = None;
        }
        if !attributes.contains(&Attribute::Source) {
            state.active_input = None;
        }
        if !attributes.contains(&Attribute::SoundMode) {
            state.sound_program = None;
        }
        if !attributes.contains(&Attribute::MediaState) {
            state.playback = None;
        }
    }

    /// Stop tracking zones that are not in `zone_ids`
    pub fn retain_zones(&mut self, zone_ids: &BTreeSet<ZoneId>) {
        self.zones.retain(|zone_id, _| zone_ids.contains(zone_id));
    }

    /// Drop all state
    pub fn clear(&mut self) {
        self.zones.clear();
    }

    pub fn state(&self, zone_id: &str) -> Option<&ZoneState> {
        self.zones.get(zone_id).map(|zone| &zone.state)
    }

    /// Whether the stored value of an attribute is still unconfirmed
    pub fn is_optimistic(&self, zone_id: &str, attribute: Attribute) -> bool {
        self.zones
            .get(zone_id)
            .is_some_and(|zone| zone.optimistic.contains(&attribute))
    }

    /// Apply a device-reported event
    ///
    /// Fields for attributes the zone does not report are dropped, volumes are
    /// clamped to the declared range.
    pub fn apply_device_event(&mut self, zone_id: &str, event: &DeviceEvent) -> Option<AttributeDelta> {
        let Some(zone) = self.zones.get_mut(zone_id) else {
            tracing::debug!(zone = zone_id, "Event for untracked zone dropped");
            return None;
        };

        let mut changes = Vec::new();

        if let Some(power) = event.power {
            if zone.reports(Attribute::State) {
                zone.optimistic.remove(&Attribute::State);
                if replace(&mut zone.state.power, power) {
                    changes.push(AttributeChange::State(power));
                }
            } else {
                tracing::debug!(zone = zone_id, "Dropping power for zone without power");
            }
        }

        if let Some(volume) = event.volume {
            match zone.volume_range {
                Some(range) if zone.reports(Attribute::Volume) => {
                    let clamped = range.clamp(volume);
                    if clamped != volume {
                        tracing::debug!(zone = zone_id, "Clamped reported volume {} to {}", volume, clamped);
                    }
                    zone.optimistic.remove(&Attribute::Volume);
                    if replace(&mut zone.state.volume, Some(clamped)) {
                        changes.push(AttributeChange::Volume(clamped));
                    }
                }
                _ => tracing::debug!(zone = zone_id, "Dropping volume for zone without volume"),
            }
        }

        if let Some(muted) = event.mute {
            if zone.reports(Attribute::Muted) {
                zone.optimistic.remove(&Attribute::Muted);
                if replace(&mut zone.state.muted, Some(muted)) {
                    changes.push(AttributeChange::Muted(muted));
                }
            } else {
                tracing::debug!(zone = zone_id, "Dropping mute for zone without mute");
            }
        }

        if let Some(input) = &event.input {
            if zone.reports(Attribute::Source) {
                if replace(&mut zone.state.active_input, Some(input.clone())) {
                    changes.push(AttributeChange::Source(input.clone()));
                }
            } else {
                tracing::debug!(zone = zone_id, "Dropping input for zone without inputs");
            }
        }

        if let Some(program) = &event.sound_program {
            if zone.reports(Attribute::SoundMode) {
                if replace(&mut zone.state.sound_program, Some(program.clone())) {
                    changes.push(AttributeChange::SoundMode(program.clone()));
                }
            } else {
                tracing::debug!(zone = zone_id, "Dropping sound program for zone without sound programs");
            }
        }

        if let Some(playback) = event.playback {
            if zone.reports(Attribute::MediaState) {
                if replace(&mut zone.state.playback, Some(playback)) {
                    changes.push(AttributeChange::MediaState(playback));
                }
            } else {
                tracing::debug!(zone = zone_id, "Dropping playback for zone without media state");
            }
        }

        if !event.extra.is_empty() {
            tracing::debug!(zone = zone_id, fields = ?event.extra.keys().collect::<Vec<_>>(), "Ignoring untracked fields");
        }

        if changes.is_empty() {
            None
        } else {
            Some(AttributeDelta {
                zone_id: zone_id.to_string(),
                changes,
                optimistic: false,
            })
        }
    }

    /// Apply a tentative update until the device confirms or corrects it
    pub fn apply_optimistic(&mut self, zone_id: &str, update: OptimisticUpdate) -> Option<AttributeDelta> {
        let zone = self.zones.get_mut(zone_id)?;

        let change = match update {
            OptimisticUpdate::Power(power) if zone.reports(Attribute::State) => {
                zone.optimistic.insert(Attribute::State);
                replace(&mut zone.state.power, power).then_some(AttributeChange::State(power))
            }
            OptimisticUpdate::Volume(volume) if zone.reports(Attribute::Volume) => {
                let volume = zone.volume_range.map_or(volume, |range| range.clamp(volume));
                zone.optimistic.insert(Attribute::Volume);
                replace(&mut zone.state.volume, Some(volume)).then_some(AttributeChange::Volume(volume))
            }
            OptimisticUpdate::Muted(muted) if zone.reports(Attribute::Muted) => {
                zone.optimistic.insert(Attribute::Muted);
                replace(&mut zone.state.muted, Some(muted)).then_some(AttributeChange::Muted(muted))
            }
            _ => None,
        };

        change.map(|change| AttributeDelta {
            zone_id: zone_id.to_string(),
            changes: vec![change],
            optimistic: true,
        })
    }
}
