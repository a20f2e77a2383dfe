use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Zone identifier ("main", "zone2", ...)
pub type ZoneId = String;

/// Function tag declared by a zone or the system ("power", "volume", ...)
pub type FunctionTag = String;

/// Input source identifier ("hdmi1", "tuner", ...)
pub type InputId = String;

/// Three-valued descriptor flag
///
/// Receivers publish booleans as the text `"True"`/`"False"`. A flag that is
/// not present at all is `Unknown`, which is kept apart from `False` so it can
/// be reported, but gates features exactly like `False`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    True,
    False,
    #[default]
    Unknown,
}

impl TriState {
    /// Read a descriptor value, accepting textual booleans in any case and JSON booleans
    pub fn from_descriptor(value: Option<&serde_json::Value>) -> Self {
        match value {
            Some(serde_json::Value::Bool(true)) => TriState::True,
            Some(serde_json::Value::Bool(false)) => TriState::False,
            Some(serde_json::Value::String(s)) => {
                if s.eq_ignore_ascii_case("true") {
                    TriState::True
                } else if s.eq_ignore_ascii_case("false") {
                    TriState::False
                } else {
                    TriState::Unknown
                }
            }
            _ => TriState::Unknown,
        }
    }

    /// Whether a value looks like a tri-state flag at all
    pub(crate) fn is_flag_value(value: &serde_json::Value) -> bool {
        match value {
            serde_json::Value::Bool(_) => true,
            serde_json::Value::String(s) => {
                s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false")
            }
            _ => false,
        }
    }

    /// Feature gating treats unknown as disabled
    pub fn is_enabled(self) -> bool {
        self == TriState::True
    }
}

/// Numeric limits of a continuous control
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Range {
    /// Build a range, rejecting `min > max`, non-positive steps and non-finite bounds
    pub fn new(min: f64, max: f64, step: f64) -> Option<Self> {
        let finite = min.is_finite() && max.is_finite() && step.is_finite();
        if finite && min <= max && step > 0.0 {
            Some(Self { min, max, step })
        } else {
            None
        }
    }

    /// Whether `value` lies within `[min, max]`
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Constrain `value` to the nearest boundary
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }
}

/// An independently controllable output path of the receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,

    /// Supported function tags, including ones this crate does not understand
    pub functions: BTreeSet<FunctionTag>,

    /// Inputs routable to this zone, in descriptor order
    pub inputs: Vec<InputId>,

    /// Continuous control limits keyed by control id
    pub ranges: BTreeMap<String, Range>,

    pub sound_programs: Vec<String>,

    pub cursor_commands: BTreeSet<String>,

    pub menu_commands: BTreeSet<String>,

    /// Selectable HDMI output numbers ("1", "2", ...)
    #[serde(default)]
    pub hdmi_outputs: BTreeSet<String>,

    /// Textual tri-state flags found on the zone entry
    #[serde(default)]
    pub flags: BTreeMap<String, TriState>,
}

impl Zone {
    /// Create an empty zone with the given id
    pub fn new(id: impl Into<ZoneId>) -> Self {
        Self {
            id: id.into(),
            functions: BTreeSet::new(),
            inputs: Vec::new(),
            ranges: BTreeMap::new(),
            sound_programs: Vec::new(),
            cursor_commands: BTreeSet::new(),
            menu_commands: BTreeSet::new(),
            hdmi_outputs: BTreeSet::new(),
            flags: BTreeMap::new(),
        }
    }

    /// Check whether a function tag was declared
    pub fn supports(&self, function: &str) -> bool {
        self.functions.contains(function)
    }

    /// Get the parsed range of a control
    pub fn range(&self, control: &str) -> Option<Range> {
        self.ranges.get(control).copied()
    }

    /// Get a zone flag, `Unknown` when absent
    pub fn flag(&self, name: &str) -> TriState {
        self.flags.get(name).copied().unwrap_or_default()
    }
}

/// Typed capability descriptor of one receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityModel {
    /// Zones in descriptor order
    pub zones: Vec<Zone>,

    /// Device-wide function tags (party mode, bluetooth, ...), informational only
    pub system_functions: BTreeSet<FunctionTag>,

    /// Device-wide textual tri-state flags
    pub system_flags: BTreeMap<String, TriState>,

    /// Non-fatal problems found while parsing
    pub warnings: Vec<DescriptorWarning>,
}

impl CapabilityModel {
    /// Look up a zone by id
    pub fn zone(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.id == id)
    }

    /// Get the ids of all zones in presentation order
    pub fn zone_ids(&self) -> Vec<ZoneId> {
        self.zones.iter().map(|zone| zone.id.clone()).collect()
    }

    /// Get a device-wide flag; a system function tag counts as enabled
    pub fn system_flag(&self, name: &str) -> TriState {
        if self.system_functions.contains(name) {
            return TriState::True;
        }
        self.system_flags.get(name).copied().unwrap_or_default()
    }
}

/// Non-fatal descriptor problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorWarning {
    pub zone: ZoneId,
    pub field: String,
    pub message: String,
}

/// Power state of a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
    #[default]
    Unknown,
}

impl PowerState {
    /// Parse the receiver's power string ("on", "standby", "off")
    ///
    /// Returns `None` for anything else so an unrecognised report never
    /// replaces a known state.
    pub fn from_device(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "on" => Some(PowerState::On),
            "standby" | "off" => Some(PowerState::Off),
            _ => None,
        }
    }
}

/// Playback state of the zone's current source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackState {
    /// Parse the receiver's playback string
    pub fn from_device(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "play" | "playing" => Some(PlaybackState::Playing),
            "pause" | "paused" => Some(PlaybackState::Paused),
            "stop" | "stopped" => Some(PlaybackState::Stopped),
            _ => None,
        }
    }
}
