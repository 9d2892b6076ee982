// Keyboard teleop: publishes UI events to the runtime over zenoh
//
// C connect, WASD steer, R/F deflection, T toggle aim,
// 1/2/3/0 red/green/blue/off, Space stop, Q quit.
// Releasing the steering keys sends joystick_end, which stops the robot.

use bb8_drive::config::{PAD_RADIUS, TOPIC_UI_EVENTS};
use bb8_drive::messages::{ColorPreset, UiEvent};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

const DEFLECTIONS: [f64; 3] = [0.25, 0.5, 1.0]; // fraction of the pad radius
const INPUT_TIMEOUT_MS: u64 = 150; // Joystick released after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_UI_EVENTS).await?;

    info!("Controls: C=connect, WASD=steer, R/F=deflection, T=aim, 1/2/3/0=colour, Space=stop, Q=quit");
    info!("Deflection: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn send(
    publisher: &zenoh::pubsub::Publisher<'_>,
    event: UiEvent,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    publisher.put(serde_json::to_string(&event)?).await?;
    Ok(())
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut deflection_idx: usize = 0;

    // Stick offset from the pad centre, in units of the radius
    let mut stick: Option<(f64, f64)> = None;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let amount = DEFLECTIONS[deflection_idx];

                match code {
                    KeyCode::Char('w') if pressed => {
                        stick = Some((0.0, -amount));
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        stick = Some((0.0, amount));
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        stick = Some((-amount, 0.0));
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        stick = Some((amount, 0.0));
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('r') if pressed => {
                        deflection_idx = (deflection_idx + 1).min(2);
                        print_deflection(deflection_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        deflection_idx = deflection_idx.saturating_sub(1);
                        print_deflection(deflection_idx);
                    }

                    KeyCode::Char('c') if pressed => send(publisher, UiEvent::Connect).await?,
                    KeyCode::Char('t') if pressed => send(publisher, UiEvent::ToggleAim).await?,
                    KeyCode::Char(' ') if pressed => {
                        stick = None;
                        send(publisher, UiEvent::Stop).await?;
                    }
                    KeyCode::Char(c @ ('1' | '2' | '3' | '0')) if pressed => {
                        let color = match c {
                            '1' => ColorPreset::Red,
                            '2' => ColorPreset::Green,
                            '3' => ColorPreset::Blue,
                            _ => ColorPreset::Off,
                        };
                        send(publisher, UiEvent::Color { color }).await?;
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Release the stick if no steering input for INPUT_TIMEOUT_MS
        if stick.is_some() && last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            stick = None;
            send(publisher, UiEvent::JoystickEnd).await?;
        }

        // While held, publish the touch point at ~50Hz like a finger on the pad
        if let Some((dx, dy)) = stick {
            let x = PAD_RADIUS + dx * PAD_RADIUS;
            let y = PAD_RADIUS + dy * PAD_RADIUS;
            send(publisher, UiEvent::JoystickMove { x, y }).await?;
        }
    }

    Ok(())
}

fn print_deflection(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Deflection: {}", label);
}
