// 50 Hz loop: UI events in over zenoh, command reports out
// Each UI event is admitted to the gate as it arrives; the link writes then run
// on their own task, so a slow write never stalls event intake.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{Config, CONNECTED_COLOR, LOOP_HZ, TOPIC_COMMAND_REPORTS, TOPIC_UI_EVENTS};
use crate::dispatch::{DispatchOutcome, DispatchPolicy, Dispatcher, Request};
use crate::messages::{CommandReport, UiEvent};
use crate::motion::JoystickPad;
use crate::transport::{SerialTransport, SimTransport, Transport};

/// Turns UI events into dispatcher requests
pub struct Controller<T: Transport> {
    transport: T,
    policy: DispatchPolicy,
    pad: JoystickPad,
    dispatcher: Option<Arc<Dispatcher<T::Link>>>,
    aiming: bool,
    reports: mpsc::UnboundedSender<CommandReport>,
}

impl<T: Transport> Controller<T> {
    pub fn new(
        transport: T,
        policy: DispatchPolicy,
        pad: JoystickPad,
        reports: mpsc::UnboundedSender<CommandReport>,
    ) -> Self {
        Self {
            transport,
            policy,
            pad,
            dispatcher: None,
            aiming: false,
            reports,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_some()
    }

    pub fn is_aiming(&self) -> bool {
        self.aiming
    }

    /// Current session, if connected
    pub fn dispatcher(&self) -> Option<&Arc<Dispatcher<T::Link>>> {
        self.dispatcher.as_ref()
    }

    /// Handle one event. Returns the task running its requests, if any were issued.
    pub async fn on_event(&mut self, event: UiEvent) -> Option<JoinHandle<()>> {
        debug!("UI event: {:?}", event);
        match event {
            UiEvent::Connect => self.connect().await,
            UiEvent::Stop | UiEvent::JoystickEnd => self.submit(vec![Request::Stop]),
            UiEvent::ToggleAim => {
                self.aiming = !self.aiming;
                info!("Aim mode {}", if self.aiming { "on" } else { "off" });
                if self.aiming {
                    self.submit(vec![
                        Request::SetBackLed(0xFF),
                        Request::SetColor {
                            red: 0,
                            green: 0,
                            blue: 0,
                        },
                    ])
                } else {
                    self.submit(vec![Request::SetBackLed(0), Request::SetHeading(0)])
                }
            }
            UiEvent::Color { color } => {
                let (red, green, blue) = color.rgb();
                self.submit(vec![Request::SetColor { red, green, blue }])
            }
            UiEvent::JoystickStart { x, y } | UiEvent::JoystickMove { x, y } => {
                let motion = self.pad.map(x, y, self.aiming);
                debug!("Touch ({}, {}) -> {:?}", x, y, motion);
                self.submit(vec![Request::Roll {
                    heading: motion.heading,
                    speed: motion.speed,
                    state: motion.roll_state(),
                }])
            }
        }
    }

    /// Open a new session; sequence numbers and the gate start fresh
    async fn connect(&mut self) -> Option<JoinHandle<()>> {
        match self.transport.connect().await {
            Ok(link) => {
                info!("Connected");
                self.dispatcher = Some(Arc::new(Dispatcher::new(link, self.policy)));
                let (red, green, blue) = CONNECTED_COLOR;
                self.submit(vec![Request::SetColor { red, green, blue }])
            }
            Err(e) => {
                warn!("Connect failed: {}", e);
                None
            }
        }
    }

    /// Admit the first request now, in event order, then write it and run the
    /// rest on a new task. A failed step cancels the rest.
    fn submit(&self, requests: Vec<Request>) -> Option<JoinHandle<()>> {
        let Some(dispatcher) = self.dispatcher.clone() else {
            warn!("Not connected, ignoring {:?}", requests);
            return None;
        };
        let mut steps = requests.into_iter();
        let first = steps.next()?;
        let admission = dispatcher.try_issue(first);
        let reports = self.reports.clone();

        Some(tokio::spawn(async move {
            let outcome = dispatcher.settle(first, admission).await;
            if !report(&reports, first, &outcome) {
                return;
            }
            for request in steps {
                let outcome = dispatcher.request(request).await;
                if !report(&reports, request, &outcome) {
                    break;
                }
            }
        }))
    }
}

/// Queue a report; false if the chain should stop here
fn report(
    reports: &mpsc::UnboundedSender<CommandReport>,
    request: Request,
    outcome: &DispatchOutcome,
) -> bool {
    // Receiver gone means the runtime is shutting down
    let _ = reports.send(CommandReport::new(request.kind(), outcome));
    !outcome.is_failed()
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pad = config.pad()?;
    let policy = config.dispatch_policy();

    if config.simulate {
        info!("Simulation mode: commands go to an in-memory robot");
        drive(SimTransport::default(), policy, pad).await
    } else {
        let transport = SerialTransport::with_baudrate(config.port.clone(), config.baud_rate);
        drive(transport, policy, pad).await
    }
}

async fn drive<T: Transport>(
    transport: T,
    policy: DispatchPolicy,
    pad: JoystickPad,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_UI_EVENTS).await?;
    let pub_reports = session.declare_publisher(TOPIC_COMMAND_REPORTS).await?;

    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let mut controller = Controller::new(transport, policy, pad, report_tx);
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!("Runtime started: {}Hz loop", LOOP_HZ);
    info!("Subscribed to: {}", TOPIC_UI_EVENTS);
    info!("Publishing to: {}", TOPIC_COMMAND_REPORTS);

    loop {
        tick.tick().await;

        // 1. Drain all pending UI events, in arrival order
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<UiEvent>(&payload) {
                Ok(event) => {
                    // Request tasks run detached; their outcomes come back as reports
                    let _ = controller.on_event(event).await;
                }
                Err(e) => {
                    warn!("Failed to parse UI event: {}", e);
                }
            }
        }

        // 2. Publish outcomes of finished requests
        while let Ok(report) = report_rx.try_recv() {
            let report_json = serde_json::to_string(&report)?;
            pub_reports.put(report_json).await?;
        }
    }
}
