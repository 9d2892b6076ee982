// Serial probe: cycles the robot's LEDs over a real serial link
//
// Nothing here makes the robot roll. Use it to check the link before running the runtime.
//
// Usage: cargo run --example serial_probe -- [port]
// Example: cargo run --example serial_probe -- /dev/rfcomm0

use bb8_drive::config::SERIAL_PORT;
use bb8_drive::dispatch::{DispatchOutcome, DispatchPolicy, Dispatcher};
use bb8_drive::transport::{SerialTransport, Transport};
use std::time::Duration;
use tokio::time::sleep;

const STEP_DELAY: Duration = Duration::from_millis(500);

fn describe(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Sent { sequence } => format!("✓ sent (seq {})", sequence),
        DispatchOutcome::Busy => "… dropped, gate busy".to_string(),
        DispatchOutcome::Failed(e) => format!("✗ {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::DEBUG.into()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| SERIAL_PORT.to_string());

    let transport = SerialTransport::new(port);
    println!("Serial port: {}", transport.port_name());
    println!();

    println!("Step 1: Opening serial port...");
    let link = match transport.connect().await {
        Ok(link) => {
            println!("  ✓ Serial port opened successfully");
            link
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Bind the robot first, e.g. rfcomm bind 0 <address>");
            return Err(e.into());
        }
    };
    let dispatcher = Dispatcher::new(link, DispatchPolicy::default());
    println!();

    println!("Step 2: Cycling main LED...");
    for (name, (r, g, b)) in [
        ("red", (255, 0, 0)),
        ("green", (0, 255, 0)),
        ("blue", (0, 0, 255)),
        ("off", (0, 0, 0)),
    ] {
        let outcome = dispatcher.set_color(r, g, b).await;
        println!("  {:<6} {}", name, describe(&outcome));
        sleep(STEP_DELAY).await;
    }
    println!();

    println!("Step 3: Blinking back LED...");
    for brightness in [255, 0] {
        let outcome = dispatcher.set_back_led(brightness).await;
        println!("  {:<6} {}", brightness, describe(&outcome));
        sleep(STEP_DELAY).await;
    }
    println!();

    println!("Step 4: Sending stop (heading {})...", dispatcher.gate().last_heading());
    println!("  {}", describe(&dispatcher.stop().await));
    println!();

    println!("If the LEDs changed, the link works. Next step: cargo run -- --port {}", transport.port_name());
    Ok(())
}
