// Message types exchanged with the UI over zenoh

use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchOutcome;
use crate::protocol::CommandKind;

/// Colour buttons on the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorPreset {
    Red,
    Green,
    Blue,
    Off,
}

impl ColorPreset {
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            ColorPreset::Red => (255, 0, 0),
            ColorPreset::Green => (0, 255, 0),
            ColorPreset::Blue => (0, 0, 255),
            ColorPreset::Off => (0, 0, 0),
        }
    }
}

/// UI -> runtime. Joystick coordinates are page pixels, like the pad origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UiEvent {
    Connect,
    Stop,
    ToggleAim,
    Color { color: ColorPreset },
    JoystickStart { x: f64, y: f64 },
    JoystickMove { x: f64, y: f64 },
    JoystickEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Sent,
    Busy,
    Failed,
}

/// Runtime -> UI, one per dispatched request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReport {
    pub command: CommandKind,
    pub status: DispatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandReport {
    pub fn new(command: CommandKind, outcome: &DispatchOutcome) -> Self {
        let (status, sequence, error) = match outcome {
            DispatchOutcome::Sent { sequence } => (DispatchStatus::Sent, Some(*sequence), None),
            DispatchOutcome::Busy => (DispatchStatus::Busy, None, None),
            DispatchOutcome::Failed(e) => (DispatchStatus::Failed, None, Some(e.to_string())),
        };
        Self {
            command,
            status,
            sequence,
            error,
        }
    }
}
