use crate::command::{Command, CommandKind};
use crate::entity::{CommandSpec, ZoneEntityDefinition};
use crate::error::{AvrError, Result};
use crate::protocol::{number_value, NativeRequest};
use crate::state::{OptimisticUpdate, ZoneState, ZoneStateTracker};
use crate::types::{PowerState, Range, ZoneId};
use std::collections::BTreeMap;

/// Composed definitions keyed by zone id
pub type Definitions = BTreeMap<ZoneId, ZoneEntityDefinition>;

/// Outcome of routing a command
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedCommand {
    /// Request to hand to the transport
    pub request: NativeRequest,
    /// State to apply before the device confirms
    pub optimistic: Option<OptimisticUpdate>,
}

/// Validates commands against composed zone definitions and translates them
/// into native requests
///
/// Routing is pure: it reads zone state but never changes it. The caller
/// decides whether to apply [`RoutedCommand::optimistic`].
#[derive(Debug, Clone, Default)]
pub struct CommandRouter {
    volume_step: Option<f64>,
}

impl CommandRouter {
    /// Create a router; `volume_step` overrides the descriptor step for relative volume commands
    pub fn new(volume_step: Option<f64>) -> Self {
        Self { volume_step }
    }

    /// Route a command for `zone_id`
    pub fn route(
        &self,
        definitions: &Definitions,
        states: &ZoneStateTracker,
        zone_id: &str,
        command: &Command,
    ) -> Result<RoutedCommand> {
        let definition = definitions
            .get(zone_id)
            .ok_or_else(|| AvrError::UnknownZone(zone_id.to_string()))?;

        let unknown_state;
        let state = match states.state(zone_id) {
            Some(state) => state,
            None => {
                unknown_state = ZoneState::new(zone_id);
                &unknown_state
            }
        };

        let routed = self.route_zone(definition, state, command)?;
        tracing::debug!(
            zone = zone_id,
            command = %command.kind(),
            path = %routed.request.path(),
            "Routed command"
        );
        Ok(routed)
    }

    /// Route a command against one zone's definition and state
    pub fn route_zone(
        &self,
        definition: &ZoneEntityDefinition,
        state: &ZoneState,
        command: &Command,
    ) -> Result<RoutedCommand> {
        let zone = definition.zone_id.as_str();
        let kind = command.kind();
        let spec = definition
            .command(kind)
            .ok_or_else(|| AvrError::UnsupportedCommand {
                zone: zone.to_string(),
                command: kind.to_string(),
            })?;

        let routed = match command {
            Command::On => power(zone, "on", Some(PowerState::On)),
            Command::Off => power(zone, "standby", Some(PowerState::Off)),
            Command::Toggle => {
                let next = match state.power {
                    PowerState::On => Some(PowerState::Off),
                    PowerState::Off => Some(PowerState::On),
                    PowerState::Unknown => None,
                };
                power(zone, "toggle", next)
            }
            Command::VolumeSet(value) => {
                let range = required_range(zone, kind, spec)?;
                if !range.contains(*value) {
                    return Err(AvrError::OutOfRange {
                        zone: zone.to_string(),
                        command: kind.to_string(),
                        value: *value,
                        min: range.min,
                        max: range.max,
                    });
                }
                RoutedCommand {
                    request: set_volume(zone, *value),
                    optimistic: Some(OptimisticUpdate::Volume(*value)),
                }
            }
            Command::VolumeUp | Command::VolumeDown => {
                let range = required_range(zone, kind, spec)?;
                let step = self.volume_step.unwrap_or(range.step);
                let up = matches!(command, Command::VolumeUp);
                let request = match state.volume {
                    Some(current) => {
                        let target = if up { current + step } else { current - step };
                        set_volume(zone, range.clamp(target))
                    }
                    // Without a known level the receiver steps relative to its own value
                    None => NativeRequest::zone(zone, "setVolume")
                        .with_param("volume", if up { "up" } else { "down" })
                        .with_param("step", number_value(step)),
                };
                RoutedCommand {
                    request,
                    optimistic: None,
                }
            }
            Command::Mute => mute(zone, true),
            Command::Unmute => mute(zone, false),
            Command::MuteToggle => mute(zone, !state.muted.unwrap_or(false)),
            Command::SelectSource(source) => {
                check_choice(zone, kind, spec, source)?;
                plain(
                    NativeRequest::zone(zone, "setInput")
                        .with_param("input", source.as_str())
                        .with_param("mode", "autoplay_disabled"),
                )
            }
            Command::SelectSoundMode(program) => {
                check_choice(zone, kind, spec, program)?;
                plain(NativeRequest::zone(zone, "setSoundProgram").with_param("program", program.as_str()))
            }
            Command::Cursor(token) => {
                check_choice(zone, kind, spec, token)?;
                plain(NativeRequest::zone(zone, "controlCursor").with_param("cursor", token.as_str()))
            }
            Command::Menu(token) => {
                check_choice(zone, kind, spec, token)?;
                plain(NativeRequest::zone(zone, "controlMenu").with_param("menu", token.as_str()))
            }
            Command::Sleep(minutes) => {
                check_choice(zone, kind, spec, &minutes.to_string())?;
                plain(NativeRequest::zone(zone, "setSleep").with_param("sleep", *minutes))
            }
            Command::Direct(enable) => {
                plain(NativeRequest::zone(zone, "setDirect").with_param("enable", *enable))
            }
            Command::PureDirect(enable) => {
                plain(NativeRequest::zone(zone, "setPureDirect").with_param("enable", *enable))
            }
            Command::ClearVoice(enable) => {
                plain(NativeRequest::zone(zone, "setClearVoice").with_param("enable", *enable))
            }
            Command::HdmiOutput { output, enable } => {
                check_choice(zone, kind, spec, &output.to_string())?;
                plain(
                    NativeRequest::system(format!("setHdmiOut{}", output)).with_param("enable", *enable),
                )
            }
        };

        Ok(routed)
    }
}

fn plain(request: NativeRequest) -> RoutedCommand {
    RoutedCommand {
        request,
        optimistic: None,
    }
}

fn power(zone: &str, value: &str, next: Option<PowerState>) -> RoutedCommand {
    RoutedCommand {
        request: NativeRequest::zone(zone, "setPower").with_param("power", value),
        optimistic: next.map(OptimisticUpdate::Power),
    }
}

fn mute(zone: &str, enable: bool) -> RoutedCommand {
    RoutedCommand {
        request: NativeRequest::zone(zone, "setMute").with_param("enable", enable),
        optimistic: Some(OptimisticUpdate::Muted(enable)),
    }
}

fn set_volume(zone: &str, volume: f64) -> NativeRequest {
    NativeRequest::zone(zone, "setVolume").with_param("volume", number_value(volume))
}

fn required_range(zone: &str, kind: CommandKind, spec: &CommandSpec) -> Result<Range> {
    spec.range.ok_or_else(|| AvrError::UnsupportedCommand {
        zone: zone.to_string(),
        command: kind.to_string(),
    })
}

fn check_choice(zone: &str, kind: CommandKind, spec: &CommandSpec, choice: &str) -> Result<()> {
    let allowed = spec
        .choices
        .as_ref()
        .is_some_and(|choices| choices.iter().any(|c| c == choice));
    if allowed {
        Ok(())
    } else {
        Err(AvrError::InvalidChoice {
            zone: zone.to_string(),
            command: kind.to_string(),
            choice: choice.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::compose;
    use crate::state::DeviceEvent;
    use crate::types::Zone;

    fn zone(id: &str, functions: &[&str]) -> Zone {
        let mut zone = Zone::new(id);
        zone.functions = functions.iter().map(|s| s.to_string()).collect();
        zone
    }

    fn setup() -> (Definitions, ZoneStateTracker) {
        let mut main = zone("main", &["power", "volume", "mute", "sound_program", "cursor", "menu", "sleep", "pure_direct"]);
        main.ranges.insert("volume".to_string(), Range::new(0.0, 161.0, 1.0).unwrap());
        main.inputs = vec!["hdmi1".to_string(), "hdmi2".to_string()];
        main.sound_programs = vec!["straight".to_string(), "surr_decoder".to_string()];
        main.cursor_commands.insert("up".to_string());
        main.menu_commands.insert("home".to_string());

        let mut zone2 = zone("zone2", &["power", "volume", "mute"]);
        zone2.ranges.insert("volume".to_string(), Range::new(0.0, 161.0, 1.0).unwrap());

        let zone4 = zone("zone4", &["power", "sleep", "prepare_input_change", "scene"]);

        let mut definitions = Definitions::new();
        let mut tracker = ZoneStateTracker::new();
        for zone in [main, zone2, zone4] {
            let definition = compose(&zone);
            tracker.register(&definition);
            definitions.insert(zone.id.clone(), definition);
        }
        (definitions, tracker)
    }

    fn set_volume_state(tracker: &mut ZoneStateTracker, zone: &str, volume: f64) {
        let event = DeviceEvent {
            volume: Some(volume),
            ..Default::default()
        };
        tracker.apply_device_event(zone, &event);
    }

    #[test]
    fn test_unknown_zone() {
        let (definitions, tracker) = setup();
        let err = CommandRouter::default()
            .route(&definitions, &tracker, "zone7", &Command::On)
            .unwrap_err();
        assert!(matches!(err, AvrError::UnknownZone(zone) if zone == "zone7"));
    }

    #[test]
    fn test_volume_set_on_zone_without_volume_is_unsupported() {
        let (definitions, tracker) = setup();
        let err = CommandRouter::default()
            .route(&definitions, &tracker, "zone4", &Command::VolumeSet(50.0))
            .unwrap_err();
        assert!(matches!(err, AvrError::UnsupportedCommand { .. }));
    }

    #[test]
    fn test_volume_set_bounds() {
        let (definitions, tracker) = setup();
        let router = CommandRouter::default();

        for value in [0.0, 80.0, 161.0] {
            let routed = router
                .route(&definitions, &tracker, "zone2", &Command::VolumeSet(value))
                .unwrap();
            assert_eq!(routed.request.number("volume"), Some(value));
            assert_eq!(routed.optimistic, Some(OptimisticUpdate::Volume(value)));
        }

        for value in [-1.0, 161.5, f64::NAN] {
            let err = router
                .route(&definitions, &tracker, "zone2", &Command::VolumeSet(value))
                .unwrap_err();
            assert!(matches!(err, AvrError::OutOfRange { .. }), "{} accepted", value);
        }
    }

    #[test]
    fn test_volume_down_at_bottom_clamps() {
        let (definitions, mut tracker) = setup();
        set_volume_state(&mut tracker, "zone2", 0.0);

        let routed = CommandRouter::default()
            .route(&definitions, &tracker, "zone2", &Command::VolumeDown)
            .unwrap();
        assert_eq!(routed.request.target, "zone2");
        assert_eq!(routed.request.operation, "setVolume");
        assert_eq!(routed.request.number("volume"), Some(0.0));
        assert_eq!(routed.optimistic, None);
    }

    #[test]
    fn test_volume_up_at_top_clamps() {
        let (definitions, mut tracker) = setup();
        set_volume_state(&mut tracker, "zone2", 161.0);

        let routed = CommandRouter::new(Some(5.0))
            .route(&definitions, &tracker, "zone2", &Command::VolumeUp)
            .unwrap();
        assert_eq!(routed.request.number("volume"), Some(161.0));
    }

    #[test]
    fn test_volume_step_uses_configured_step() {
        let (definitions, mut tracker) = setup();
        set_volume_state(&mut tracker, "zone2", 40.0);

        let routed = CommandRouter::new(Some(5.0))
            .route(&definitions, &tracker, "zone2", &Command::VolumeUp)
            .unwrap();
        assert_eq!(routed.request.number("volume"), Some(45.0));

        let routed = CommandRouter::default()
            .route(&definitions, &tracker, "zone2", &Command::VolumeDown)
            .unwrap();
        assert_eq!(routed.request.number("volume"), Some(39.0));
    }

    #[test]
    fn test_volume_step_without_known_level_is_relative() {
        let (definitions, tracker) = setup();
        let routed = CommandRouter::default()
            .route(&definitions, &tracker, "zone2", &Command::VolumeUp)
            .unwrap();
        assert_eq!(
            routed.request.path(),
            "/YamahaExtendedControl/v1/zone2/setVolume?step=1&volume=up"
        );
    }

    #[test]
    fn test_source_choice() {
        let (definitions, tracker) = setup();
        let router = CommandRouter::default();

        let routed = router
            .route(&definitions, &tracker, "main", &Command::SelectSource("hdmi2".to_string()))
            .unwrap();
        assert_eq!(
            routed.request.path(),
            "/YamahaExtendedControl/v1/main/setInput?input=hdmi2&mode=autoplay_disabled"
        );

        let err = router
            .route(&definitions, &tracker, "main", &Command::SelectSource("hdmi9".to_string()))
            .unwrap_err();
        assert!(matches!(err, AvrError::InvalidChoice { choice, .. } if choice == "hdmi9"));
    }

    #[test]
    fn test_enumerated_commands() {
        let (definitions, tracker) = setup();
        let router = CommandRouter::default();

        let routed = router
            .route(&definitions, &tracker, "main", &Command::SelectSoundMode("straight".to_string()))
            .unwrap();
        assert_eq!(routed.request.operation, "setSoundProgram");

        assert!(router
            .route(&definitions, &tracker, "main", &Command::Cursor("up".to_string()))
            .is_ok());
        assert!(matches!(
            router.route(&definitions, &tracker, "main", &Command::Menu("red".to_string())),
            Err(AvrError::InvalidChoice { .. })
        ));
        assert!(matches!(
            router.route(&definitions, &tracker, "zone4", &Command::Sleep(45)),
            Err(AvrError::InvalidChoice { .. })
        ));

        let routed = router
            .route(&definitions, &tracker, "zone4", &Command::Sleep(90))
            .unwrap();
        assert_eq!(routed.request.path(), "/YamahaExtendedControl/v1/zone4/setSleep?sleep=90");
    }

    #[test]
    fn test_hdmi_output_is_a_system_request() {
        let (mut definitions, mut tracker) = setup();
        let router = CommandRouter::default();
        let command = Command::HdmiOutput { output: 2, enable: true };

        assert!(matches!(
            router.route(&definitions, &tracker, "main", &command),
            Err(AvrError::UnsupportedCommand { .. })
        ));

        let mut main = zone("main", &["power"]);
        main.hdmi_outputs.insert("1".to_string());
        main.hdmi_outputs.insert("2".to_string());
        let definition = compose(&main);
        tracker.register(&definition);
        definitions.insert("main".to_string(), definition);

        let routed = router.route(&definitions, &tracker, "main", &command).unwrap();
        assert_eq!(
            routed.request.path(),
            "/YamahaExtendedControl/v1/system/setHdmiOut2?enable=true"
        );
        assert_eq!(routed.optimistic, None);

        assert!(matches!(
            router.route(&definitions, &tracker, "main", &Command::HdmiOutput { output: 3, enable: true }),
            Err(AvrError::InvalidChoice { choice, .. }) if choice == "3"
        ));
    }

    #[test]
    fn test_power_and_mute_are_optimistic() {
        let (definitions, mut tracker) = setup();
        let router = CommandRouter::default();

        let routed = router.route(&definitions, &tracker, "main", &Command::Off).unwrap();
        assert_eq!(routed.request.param("power").and_then(|v| v.as_str()), Some("standby"));
        assert_eq!(routed.optimistic, Some(OptimisticUpdate::Power(PowerState::Off)));

        // Toggle without a known power state has nothing to predict
        let routed = router.route(&definitions, &tracker, "main", &Command::Toggle).unwrap();
        assert_eq!(routed.optimistic, None);

        let routed = router.route(&definitions, &tracker, "main", &Command::MuteToggle).unwrap();
        assert_eq!(routed.optimistic, Some(OptimisticUpdate::Muted(true)));

        let event = DeviceEvent {
            mute: Some(true),
            ..Default::default()
        };
        tracker.apply_device_event("main", &event);
        let routed = router.route(&definitions, &tracker, "main", &Command::MuteToggle).unwrap();
        assert_eq!(routed.request.path(), "/YamahaExtendedControl/v1/main/setMute?enable=false");
    }

    #[test]
    fn test_routing_does_not_touch_state() {
        let (definitions, tracker) = setup();
        CommandRouter::default()
            .route(&definitions, &tracker, "zone2", &Command::VolumeSet(10.0))
            .unwrap();
        assert_eq!(tracker.state("zone2").unwrap().volume, None);
    }

    #[test]
    fn test_unsupported_simple_command() {
        let (definitions, tracker) = setup();
        let router = CommandRouter::default();
        assert!(router
            .route(&definitions, &tracker, "main", &Command::PureDirect(true))
            .is_ok());
        assert!(matches!(
            router.route(&definitions, &tracker, "main", &Command::ClearVoice(true)),
            Err(AvrError::UnsupportedCommand { .. })
        ));
    }
}
