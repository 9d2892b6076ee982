// Defaults for timing, topics, serial link and pad geometry, plus CLI overrides
use clap::Parser;
use std::time::Duration;

use crate::dispatch::{DispatchPolicy, GatePolicy, RetryPolicy};
use crate::motion::{JoystickPad, MotionError};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Zenoh topics
pub const TOPIC_UI_EVENTS: &str = "bb8/ui/events"; // UI -> runtime
pub const TOPIC_COMMAND_REPORTS: &str = "bb8/state/commands"; // one report per command

// Serial link (Bluetooth serial profile)
pub const SERIAL_PORT: &str = "/dev/rfcomm0";
pub const SERIAL_BAUDRATE: u32 = 115_200;
pub const SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

// Poll interval while stop waits for the gate
pub const STOP_RETRY_INTERVAL: Duration = Duration::from_millis(100);

// On-screen joystick pad, in pixels
pub const PAD_RADIUS: f64 = 150.0;

// Colour shown once connected
pub const CONNECTED_COLOR: (u8, u8, u8) = (0, 250, 0);

/// Command-line configuration for the runtime binary
#[derive(Debug, Clone, Parser)]
#[command(name = "bb8-drive", about = "Drive a BB-8 style robot from UI events over zenoh")]
pub struct Config {
    /// Serial device connected to the robot
    #[arg(long, default_value = SERIAL_PORT)]
    pub port: String,

    #[arg(long, default_value_t = SERIAL_BAUDRATE)]
    pub baud_rate: u32,

    /// Use the in-memory robot instead of the serial port
    #[arg(long)]
    pub simulate: bool,

    #[arg(long, default_value_t = PAD_RADIUS)]
    pub pad_radius: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub pad_origin_x: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub pad_origin_y: f64,

    /// Give up a pending stop after this many retries (default: never)
    #[arg(long)]
    pub stop_retry_limit: Option<u32>,

    /// Let back LED writes bypass the single-flight gate
    #[arg(long)]
    pub back_led_ungated: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_from(["bb8-drive"])
    }
}

impl Config {
    pub fn dispatch_policy(&self) -> DispatchPolicy {
        let set_back_led = if self.back_led_ungated {
            GatePolicy::Exempt
        } else {
            GatePolicy::DropIfBusy
        };

        DispatchPolicy {
            set_back_led,
            retry: RetryPolicy {
                interval: STOP_RETRY_INTERVAL,
                max_retries: self.stop_retry_limit,
            },
            ..DispatchPolicy::default()
        }
    }

    pub fn pad(&self) -> Result<JoystickPad, MotionError> {
        JoystickPad::new(self.pad_origin_x, self.pad_origin_y, self.pad_radius)
    }
}
