use crate::error::{AvrError, Result};
use crate::types::{CapabilityModel, DescriptorWarning, Range, TriState, Zone};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

const MAIN_ZONE: &str = "main";

/// Parse a capability descriptor (the receiver's `getFeatures` document)
///
/// Parsing is all-or-nothing at the zone level: a missing `zone` list, a zone
/// that is not an object, a zone without an `id` or a repeated `id` fails the
/// whole descriptor. Range entries are parsed leniently; bad ones are dropped
/// and recorded in [`CapabilityModel::warnings`].
pub fn parse_descriptor(json: &Value) -> Result<CapabilityModel> {
    let root = json
        .as_object()
        .ok_or_else(|| AvrError::MalformedDescriptor("Descriptor is not an object".to_string()))?;

    let zone_entries = root
        .get("zone")
        .and_then(|v| v.as_array())
        .ok_or_else(|| AvrError::MalformedDescriptor("Missing zone list".to_string()))?;

    let mut warnings = Vec::new();
    let mut zones: Vec<Zone> = Vec::with_capacity(zone_entries.len());

    for (index, entry) in zone_entries.iter().enumerate() {
        let zone = parse_zone(index, entry, &mut warnings)?;
        if zones.iter().any(|z| z.id == zone.id) {
            return Err(AvrError::MalformedDescriptor(format!(
                "Duplicate zone id {}",
                zone.id
            )));
        }
        zones.push(zone);
    }

    let system = root.get("system").and_then(|v| v.as_object());

    let system_functions: BTreeSet<String> = system
        .and_then(|s| s.get("func_list"))
        .map(string_list)
        .unwrap_or_default()
        .into_iter()
        .collect();

    let system_flags = system.map(collect_flags).unwrap_or_default();

    // HDMI outputs are declared system-wide but switched from the main zone
    if let Some(main) = zones.iter_mut().find(|zone| zone.id == MAIN_ZONE) {
        main.hdmi_outputs.extend(hdmi_outputs(&system_functions));
    }

    Ok(CapabilityModel {
        zones,
        system_functions,
        system_flags,
        warnings,
    })
}

/// Parse a capability descriptor from raw text
pub fn parse_descriptor_str(text: &str) -> Result<CapabilityModel> {
    let json: Value = serde_json::from_str(text)?;
    parse_descriptor(&json)
}

fn parse_zone(index: usize, entry: &Value, warnings: &mut Vec<DescriptorWarning>) -> Result<Zone> {
    let obj = entry.as_object().ok_or_else(|| {
        AvrError::MalformedDescriptor(format!("Zone entry {} is not an object", index))
    })?;

    let id = obj
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AvrError::MalformedDescriptor(format!("Zone entry {} has no id", index)))?;

    let mut zone = Zone::new(id);

    zone.functions = obj
        .get("func_list")
        .map(string_list)
        .unwrap_or_default()
        .into_iter()
        .collect();
    zone.hdmi_outputs = hdmi_outputs(&zone.functions).collect();

    if let Some(inputs) = obj.get("input_list").and_then(|v| v.as_array()) {
        for input in inputs {
            // Inputs are either bare ids or objects carrying an id
            let input_id = input
                .as_str()
                .or_else(|| input.get("id").and_then(|v| v.as_str()));
            let Some(input_id) = input_id else {
                warn(warnings, id, "input_list", "Input entry without id ignored".to_string());
                continue;
            };
            if zone.inputs.iter().any(|existing| existing == input_id) {
                warn(warnings, id, "input_list", format!("Duplicate input {} ignored", input_id));
                continue;
            }
            zone.inputs.push(input_id.to_string());
        }
    }

    zone.sound_programs = obj.get("sound_program_list").map(string_list).unwrap_or_default();
    let mut seen = BTreeSet::new();
    zone.sound_programs.retain(|program| seen.insert(program.clone()));

    zone.cursor_commands = obj
        .get("cursor_list")
        .map(string_list)
        .unwrap_or_default()
        .into_iter()
        .collect();

    zone.menu_commands = obj
        .get("menu_list")
        .map(string_list)
        .unwrap_or_default()
        .into_iter()
        .collect();

    if let Some(ranges) = obj.get("range_step").and_then(|v| v.as_array()) {
        for range in ranges {
            if let Some((control, parsed)) = parse_range(id, &zone, range, warnings) {
                zone.ranges.insert(control, parsed);
            }
        }
    }

    zone.flags = collect_flags(obj);

    Ok(zone)
}

fn parse_range(
    zone_id: &str,
    zone: &Zone,
    entry: &Value,
    warnings: &mut Vec<DescriptorWarning>,
) -> Option<(String, Range)> {
    let Some(control) = entry.get("id").and_then(|v| v.as_str()) else {
        warn(warnings, zone_id, "range_step", "Range entry without id dropped".to_string());
        return None;
    };

    let bound = |name: &str| entry.get(name).and_then(|v| v.as_f64());
    let (Some(min), Some(max), Some(step)) = (bound("min"), bound("max"), bound("step")) else {
        warn(
            warnings,
            zone_id,
            "range_step",
            format!("Range {} is missing min, max or step", control),
        );
        return None;
    };

    let Some(range) = Range::new(min, max, step) else {
        warn(
            warnings,
            zone_id,
            "range_step",
            format!("Range {} has invalid bounds min={} max={} step={}", control, min, max, step),
        );
        return None;
    };

    if !zone.supports(control) {
        warn(
            warnings,
            zone_id,
            "range_step",
            format!("Range {} has no matching function", control),
        );
        return None;
    }

    Some((control.to_string(), range))
}

fn warn(warnings: &mut Vec<DescriptorWarning>, zone: &str, field: &str, message: String) {
    tracing::warn!(zone, field, "{}", message);
    warnings.push(DescriptorWarning {
        zone: zone.to_string(),
        field: field.to_string(),
        message,
    });
}

/// Output numbers of `hdmi_out_<n>` function tags
fn hdmi_outputs(functions: &BTreeSet<String>) -> impl Iterator<Item = String> + '_ {
    functions
        .iter()
        .filter_map(|tag| tag.strip_prefix("hdmi_out_"))
        .filter_map(|n| n.parse::<u8>().ok())
        .map(|n| n.to_string())
}

/// Collect string items of an array, skipping anything else
fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn collect_flags(obj: &serde_json::Map<String, Value>) -> BTreeMap<String, TriState> {
    obj.iter()
        .filter(|(_, value)| TriState::is_flag_value(value))
        .map(|(key, value)| (key.clone(), TriState::from_descriptor(Some(value))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> Value {
        json!({
            "system": {
                "func_list": ["wired_lan", "party_mode", "bluetooth_standby"],
                "speaker_pattern": "True",
                "hdmi_standby_through": "false"
            },
            "zone": [
                {
                    "id": "main",
                    "func_list": ["power", "sleep", "volume", "mute", "sound_program", "tone_control", "cursor", "menu", "surr_decoder_type"],
                    "input_list": ["hdmi1", "hdmi2", "tuner", "hdmi1"],
                    "sound_program_list": ["straight", "2ch_stereo", "surr_decoder"],
                    "cursor_list": ["up", "down", "left", "right", "select", "return"],
                    "menu_list": ["on_screen", "home", "red"],
                    "range_step": [
                        {"id": "volume", "min": 0, "max": 161, "step": 1},
                        {"id": "tone_control", "min": -12, "max": 12, "step": 1},
                        {"id": "dialogue_level", "min": 0, "max": 3, "step": 1}
                    ],
                    "link_audio_delay": "True"
                },
                {
                    "id": "zone2",
                    "func_list": ["power", "volume", "mute"],
                    "input_list": ["hdmi1", "tuner"],
                    "range_step": [
                        {"id": "volume", "min": 0, "max": 161}
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_parse_zones_in_order() {
        let model = parse_descriptor(&descriptor()).unwrap();
        assert_eq!(model.zone_ids(), vec!["main".to_string(), "zone2".to_string()]);

        let main = model.zone("main").unwrap();
        assert!(main.supports("surr_decoder_type"));
        assert_eq!(main.inputs, vec!["hdmi1", "hdmi2", "tuner"]);
        assert_eq!(main.range("volume"), Range::new(0.0, 161.0, 1.0));
        assert_eq!(main.range("tone_control"), Range::new(-12.0, 12.0, 1.0));
        assert!(main.cursor_commands.contains("return"));
        assert_eq!(main.flag("link_audio_delay"), TriState::True);
        assert_eq!(main.flag("not_there"), TriState::Unknown);
    }

    #[test]
    fn test_bad_range_entries_are_dropped_with_warning() {
        let model = parse_descriptor(&descriptor()).unwrap();

        // No function tag for dialogue_level, no step for zone2 volume
        assert!(model.zone("main").unwrap().range("dialogue_level").is_none());
        assert!(model.zone("zone2").unwrap().range("volume").is_none());

        let range_warnings: Vec<_> = model
            .warnings
            .iter()
            .filter(|w| w.field == "range_step")
            .collect();
        assert_eq!(range_warnings.len(), 2);
        assert!(model.warnings.iter().any(|w| w.field == "input_list" && w.zone == "main"));
    }

    #[test]
    fn test_hdmi_outputs_belong_to_main_zone() {
        let mut json = descriptor();
        json["system"]["func_list"] = json!(["wired_lan", "hdmi_out_1", "hdmi_out_2", "hdmi_out_x"]);
        let model = parse_descriptor(&json).unwrap();

        let main = model.zone("main").unwrap();
        assert_eq!(main.hdmi_outputs.iter().collect::<Vec<_>>(), vec!["1", "2"]);
        assert!(model.zone("zone2").unwrap().hdmi_outputs.is_empty());
        assert!(parse_descriptor(&descriptor()).unwrap().zone("main").unwrap().hdmi_outputs.is_empty());
    }

    #[test]
    fn test_system_flags() {
        let model = parse_descriptor(&descriptor()).unwrap();
        assert_eq!(model.system_flag("party_mode"), TriState::True);
        assert_eq!(model.system_flag("speaker_pattern"), TriState::True);
        assert_eq!(model.system_flag("hdmi_standby_through"), TriState::False);
        assert_eq!(model.system_flag("bluetooth_tx"), TriState::Unknown);
    }

    #[test]
    fn test_missing_zone_list_is_malformed() {
        let err = parse_descriptor(&json!({"system": {}})).unwrap_err();
        assert!(matches!(err, AvrError::MalformedDescriptor(_)));
    }

    #[test]
    fn test_zone_without_id_fails_whole_descriptor() {
        let json = json!({
            "zone": [
                {"id": "main", "func_list": ["power"]},
                {"func_list": ["power"]}
            ]
        });
        assert!(matches!(
            parse_descriptor(&json),
            Err(AvrError::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn test_duplicate_zone_id_is_malformed() {
        let json = json!({"zone": [{"id": "main"}, {"id": "main"}]});
        assert!(matches!(
            parse_descriptor(&json),
            Err(AvrError::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let json = json!({
            "future_section": {"x": 1},
            "zone": [{"id": "zone4", "func_list": ["power", "scene"], "future_field": [1, 2]}]
        });
        let model = parse_descriptor(&json).unwrap();
        let zone = model.zone("zone4").unwrap();
        assert!(zone.supports("scene"));
        assert!(zone.ranges.is_empty());
        assert!(zone.inputs.is_empty());
    }

    #[test]
    fn test_parse_from_text() {
        let model = parse_descriptor_str(r#"{"zone": [{"id": "main", "func_list": ["power"]}]}"#).unwrap();
        assert_eq!(model.zones.len(), 1);
        assert!(matches!(parse_descriptor_str("not json"), Err(AvrError::Json(_))));
    }
}
