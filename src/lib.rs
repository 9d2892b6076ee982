//! Command-protocol engine for a BB-8 style rolling robot.
//!
//! - [`protocol`]: packet codec, sequence numbers, command layouts
//! - [`dispatch`]: single-flight gate and the per-session dispatcher
//! - [`motion`]: joystick pad to heading/speed
//! - [`transport`]: serial and simulated links
//! - [`runtime`]: zenoh-facing loop that turns UI events into commands
pub mod config;
pub mod dispatch;
pub mod messages;
pub mod motion;
pub mod protocol;
pub mod runtime;
pub mod transport;
