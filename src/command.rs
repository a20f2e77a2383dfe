//! Host command vocabulary
//!
//! [`CommandKind`] names a command independent of its arguments and is what
//! zone entity definitions expose. [`Command`] is a concrete request carrying
//! its arguments, usually built from the host's command id and parameters with
//! [`Command::from_host`]. Host requests that stand for several commands,
//! such as a remote's command sequence, expand into a [`CommandBatch`].

use crate::error::{AvrError, Result};
use crate::types::TriState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

const SEND_CMD: &str = "send_cmd";
const SEND_CMD_SEQUENCE: &str = "send_cmd_sequence";
const MAX_REPEAT: u64 = 100;

/// Kind of command a zone entity can accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    On,
    Off,
    Toggle,
    VolumeSet,
    VolumeUp,
    VolumeDown,
    MuteToggle,
    Mute,
    Unmute,
    SelectSource,
    SelectSoundMode,
    Cursor,
    Menu,
    Sleep,
    Direct,
    PureDirect,
    ClearVoice,
    HdmiOutput,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::On => "on",
            CommandKind::Off => "off",
            CommandKind::Toggle => "toggle",
            CommandKind::VolumeSet => "volume_set",
            CommandKind::VolumeUp => "volume_up",
            CommandKind::VolumeDown => "volume_down",
            CommandKind::MuteToggle => "mute_toggle",
            CommandKind::Mute => "mute",
            CommandKind::Unmute => "unmute",
            CommandKind::SelectSource => "select_source",
            CommandKind::SelectSoundMode => "select_sound_mode",
            CommandKind::Cursor => "cursor",
            CommandKind::Menu => "menu",
            CommandKind::Sleep => "sleep",
            CommandKind::Direct => "direct",
            CommandKind::PureDirect => "pure_direct",
            CommandKind::ClearVoice => "clear_voice",
            CommandKind::HdmiOutput => "hdmi_output",
        }
    }

    /// Commands whose state effect is applied before the device confirms it
    pub fn is_optimistic(&self) -> bool {
        matches!(
            self,
            CommandKind::On
                | CommandKind::Off
                | CommandKind::Toggle
                | CommandKind::MuteToggle
                | CommandKind::Mute
                | CommandKind::Unmute
                | CommandKind::VolumeSet
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete command addressed to a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum Command {
    On,
    Off,
    Toggle,
    VolumeSet(f64),
    VolumeUp,
    VolumeDown,
    MuteToggle,
    Mute,
    Unmute,
    SelectSource(String),
    SelectSoundMode(String),
    Cursor(String),
    Menu(String),
    /// Sleep timer in minutes, 0 disables it
    Sleep(u32),
    Direct(bool),
    PureDirect(bool),
    ClearVoice(bool),
    HdmiOutput { output: u8, enable: bool },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::On => CommandKind::On,
            Command::Off => CommandKind::Off,
            Command::Toggle => CommandKind::Toggle,
            Command::VolumeSet(_) => CommandKind::VolumeSet,
            Command::VolumeUp => CommandKind::VolumeUp,
            Command::VolumeDown => CommandKind::VolumeDown,
            Command::MuteToggle => CommandKind::MuteToggle,
            Command::Mute => CommandKind::Mute,
            Command::Unmute => CommandKind::Unmute,
            Command::SelectSource(_) => CommandKind::SelectSource,
            Command::SelectSoundMode(_) => CommandKind::SelectSoundMode,
            Command::Cursor(_) => CommandKind::Cursor,
            Command::Menu(_) => CommandKind::Menu,
            Command::Sleep(_) => CommandKind::Sleep,
            Command::Direct(_) => CommandKind::Direct,
            Command::PureDirect(_) => CommandKind::PureDirect,
            Command::ClearVoice(_) => CommandKind::ClearVoice,
            Command::HdmiOutput { .. } => CommandKind::HdmiOutput,
        }
    }

    /// Translate a host command id and its parameters
    ///
    /// `zone` is only used to label an [`AvrError::UnsupportedCommand`] for ids
    /// outside the vocabulary. Besides command ids this accepts the receiver's
    /// simple command names ("Sleep 30", "HDMI Output 1", ...) and `send_cmd`,
    /// which names the actual command in its `command` parameter.
    pub fn from_host(zone: &str, cmd_id: &str, params: Option<&Value>) -> Result<Self> {
        let command = match cmd_id {
            "on" => Command::On,
            "off" => Command::Off,
            "toggle" => Command::Toggle,
            "volume" => Command::VolumeSet(number_param(cmd_id, params, "volume")?),
            "volume_up" => Command::VolumeUp,
            "volume_down" => Command::VolumeDown,
            "mute_toggle" => Command::MuteToggle,
            "mute" => Command::Mute,
            "unmute" => Command::Unmute,
            "select_source" => Command::SelectSource(string_param(cmd_id, params, "source")?),
            "select_sound_mode" => {
                Command::SelectSoundMode(string_param(cmd_id, params, "sound_mode")?)
            }
            "cursor_up" => Command::Cursor("up".to_string()),
            "cursor_down" => Command::Cursor("down".to_string()),
            "cursor_left" => Command::Cursor("left".to_string()),
            "cursor_right" => Command::Cursor("right".to_string()),
            "cursor_enter" => Command::Cursor("select".to_string()),
            "back" => Command::Cursor("return".to_string()),
            "home" => Command::Menu("home".to_string()),
            "menu" => Command::Menu("on_screen".to_string()),
            "info" => Command::Menu("display".to_string()),
            "sleep" => {
                let minutes = number_param(cmd_id, params, "minutes")?;
                if minutes < 0.0 || minutes.fract() != 0.0 || minutes > u32::MAX as f64 {
                    return Err(AvrError::InvalidParameter {
                        command: cmd_id.to_string(),
                        parameter: "minutes".to_string(),
                        detail: format!("{} is not a whole number of minutes", minutes),
                    });
                }
                Command::Sleep(minutes as u32)
            }
            "direct" => Command::Direct(enable_param(cmd_id, params)?),
            "pure_direct" => Command::PureDirect(enable_param(cmd_id, params)?),
            "clear_voice" => Command::ClearVoice(enable_param(cmd_id, params)?),
            "hdmi_output" => {
                let output = number_param(cmd_id, params, "output")?;
                if output < 1.0 || output.fract() != 0.0 || output > u8::MAX as f64 {
                    return Err(AvrError::InvalidParameter {
                        command: cmd_id.to_string(),
                        parameter: "output".to_string(),
                        detail: format!("{} is not an output number", output),
                    });
                }
                Command::HdmiOutput {
                    output: output as u8,
                    enable: enable_param(cmd_id, params)?,
                }
            }
            SEND_CMD => {
                let inner = string_param(cmd_id, params, "command")?;
                if inner == SEND_CMD || inner == SEND_CMD_SEQUENCE {
                    return Err(AvrError::InvalidParameter {
                        command: cmd_id.to_string(),
                        parameter: "command".to_string(),
                        detail: format!("{} cannot be nested", inner),
                    });
                }
                return Command::from_host(zone, &inner, params);
            }
            other => match simple_command(other) {
                Some(command) => command,
                None => match other.strip_prefix("menu_").or_else(|| other.strip_prefix("function_")) {
                    Some(token) if !token.is_empty() => Command::Menu(token.to_string()),
                    _ => {
                        return Err(AvrError::UnsupportedCommand {
                            zone: zone.to_string(),
                            command: cmd_id.to_string(),
                        })
                    }
                },
            },
        };
        Ok(command)
    }
}

/// Receiver-specific simple commands offered to the host by name
fn simple_command(name: &str) -> Option<Command> {
    let command = match name {
        "Sleep Off" => Command::Sleep(0),
        "Sleep 30" => Command::Sleep(30),
        "Sleep 60" => Command::Sleep(60),
        "Sleep 90" => Command::Sleep(90),
        "Sleep 120" => Command::Sleep(120),
        "HDMI Output 1" => Command::HdmiOutput { output: 1, enable: true },
        "HDMI Output 2" => Command::HdmiOutput { output: 2, enable: true },
        "Sound Mode Direct" => Command::Direct(true),
        "Sound Mode Pure Direct" => Command::PureDirect(true),
        "Clear Voice" => Command::ClearVoice(true),
        "Return" => Command::Cursor("return".to_string()),
        _ => return None,
    };
    Some(command)
}

/// Commands a single host request expands into
///
/// `send_cmd_sequence` carries its steps in the `sequence` parameter. Any
/// request may carry `repeat` (how often the whole batch runs) and `delay`
/// (milliseconds the transport should wait after each request).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBatch {
    pub commands: Vec<Command>,
    pub delay: Duration,
}

impl CommandBatch {
    /// Expand a host request; a malformed step fails the whole batch
    pub fn from_host(zone: &str, cmd_id: &str, params: Option<&Value>) -> Result<Self> {
        let steps = if cmd_id == SEND_CMD_SEQUENCE {
            let sequence = param(cmd_id, params, "sequence")?;
            let invalid = |detail: String| AvrError::InvalidParameter {
                command: cmd_id.to_string(),
                parameter: "sequence".to_string(),
                detail,
            };
            let items = sequence
                .as_array()
                .ok_or_else(|| invalid(format!("expected a list, got {}", sequence)))?;
            if items.is_empty() {
                return Err(invalid("sequence is empty".to_string()));
            }

            let mut steps = Vec::with_capacity(items.len());
            for item in items {
                let step = item
                    .as_str()
                    .ok_or_else(|| invalid(format!("expected a command name, got {}", item)))?;
                if step == SEND_CMD || step == SEND_CMD_SEQUENCE {
                    return Err(invalid(format!("{} cannot be nested", step)));
                }
                steps.push(Command::from_host(zone, step, params)?);
            }
            steps
        } else {
            vec![Command::from_host(zone, cmd_id, params)?]
        };

        let repeat = optional_count(cmd_id, params, "repeat")?.unwrap_or(1);
        if repeat == 0 || repeat > MAX_REPEAT {
            return Err(AvrError::InvalidParameter {
                command: cmd_id.to_string(),
                parameter: "repeat".to_string(),
                detail: format!("repeat must be between 1 and {}", MAX_REPEAT),
            });
        }
        let delay = optional_count(cmd_id, params, "delay")?.unwrap_or(0);

        let mut commands = Vec::with_capacity(steps.len() * repeat as usize);
        for _ in 0..repeat {
            commands.extend(steps.iter().cloned());
        }

        Ok(Self {
            commands,
            delay: Duration::from_millis(delay),
        })
    }
}

fn param<'a>(cmd_id: &str, params: Option<&'a Value>, name: &str) -> Result<&'a Value> {
    params
        .and_then(|p| p.get(name))
        .ok_or_else(|| AvrError::MissingParameter {
            command: cmd_id.to_string(),
            parameter: name.to_string(),
        })
}

fn number_param(cmd_id: &str, params: Option<&Value>, name: &str) -> Result<f64> {
    let value = param(cmd_id, params, name)?;
    // Hosts occasionally send numbers as strings
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .ok_or_else(|| AvrError::InvalidParameter {
            command: cmd_id.to_string(),
            parameter: name.to_string(),
            detail: format!("expected a number, got {}", value),
        })
}

fn string_param(cmd_id: &str, params: Option<&Value>, name: &str) -> Result<String> {
    let value = param(cmd_id, params, name)?;
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| AvrError::InvalidParameter {
            command: cmd_id.to_string(),
            parameter: name.to_string(),
            detail: format!("expected a string, got {}", value),
        })
}

/// Optional non-negative whole number, given as a number or numeric string
fn optional_count(cmd_id: &str, params: Option<&Value>, name: &str) -> Result<Option<u64>> {
    if params.and_then(|p| p.get(name)).is_none() {
        return Ok(None);
    }
    let value = number_param(cmd_id, params, name)?;
    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(AvrError::InvalidParameter {
            command: cmd_id.to_string(),
            parameter: name.to_string(),
            detail: format!("{} is not a whole non-negative number", value),
        });
    }
    Ok(Some(value as u64))
}

/// `enable` defaults to true when absent
fn enable_param(cmd_id: &str, params: Option<&Value>) -> Result<bool> {
    match params.and_then(|p| p.get("enable")) {
        None => Ok(true),
        Some(value) => match TriState::from_descriptor(Some(value)) {
            TriState::True => Ok(true),
            TriState::False => Ok(false),
            TriState::Unknown => Err(AvrError::InvalidParameter {
                command: cmd_id.to_string(),
                parameter: "enable".to_string(),
                detail: format!("expected a boolean, got {}", value),
            }),
        },
    }
}
