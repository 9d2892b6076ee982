// Command ids and data layouts for the commands this client sends

use serde::{Deserialize, Serialize};

/// Virtual device that owns driving and LED commands
pub const DEVICE_SPHERO: u8 = 0x02;

/// Command ids within `DEVICE_SPHERO`
pub const CMD_SET_HEADING: u8 = 0x01;
pub const CMD_SET_RGB_LED: u8 = 0x20;
pub const CMD_SET_BACK_LED: u8 = 0x21;
pub const CMD_ROLL: u8 = 0x30;

/// Speed byte carried by the stop packet (ignored by the device when state is Stop)
pub const STOP_SPEED: u8 = 100;

/// Roll data flag
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollState {
    Stop = 0,
    Engage = 1,
}

/// Which public dispatcher operation a packet came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    SetHeading,
    Roll,
    Stop,
    SetColor,
    SetBackLed,
}

/// A fully specified command, ready to be framed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetHeading { heading: u16 },
    Roll { speed: u8, heading: u16, state: RollState },
    SetColor { red: u8, green: u8, blue: u8 },
    SetBackLed { brightness: u8 },
}

impl Command {
    /// Stop packet: a roll with state Stop that keeps the last heading
    pub fn stop(last_heading: u16) -> Self {
        Command::Roll {
            speed: STOP_SPEED,
            heading: last_heading,
            state: RollState::Stop,
        }
    }

    pub fn device_id(&self) -> u8 {
        DEVICE_SPHERO
    }

    pub fn command_id(&self) -> u8 {
        match self {
            Command::SetHeading { .. } => CMD_SET_HEADING,
            Command::Roll { .. } => CMD_ROLL,
            Command::SetColor { .. } => CMD_SET_RGB_LED,
            Command::SetBackLed { .. } => CMD_SET_BACK_LED,
        }
    }

    /// Data bytes. Roll's heading goes MSB first; set-heading sends its
    /// 16-bit value in little-endian order, as the robot's host stack emits it.
    pub fn payload(&self) -> Vec<u8> {
        match *self {
            Command::SetHeading { heading } => heading.to_le_bytes().to_vec(),
            Command::Roll {
                speed,
                heading,
                state,
            } => {
                let [msb, lsb] = heading.to_be_bytes();
                vec![speed, msb, lsb, state as u8]
            }
            // Last byte is the "persist as user colour" flag, always off
            Command::SetColor { red, green, blue } => vec![red, green, blue, 0],
            Command::SetBackLed { brightness } => vec![brightness],
        }
    }
}
