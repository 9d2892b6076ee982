// Public command API for one connected session
//
// Every operation: admission through the gate -> fresh sequence number ->
// packet -> link write -> gate released. The first three steps are
// synchronous (`try_issue`), so callers can fix issuance order before
// spawning the write. Failures are logged and reported as an outcome,
// never propagated.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::gate::{CommandGate, GatePermit};
use crate::config::STOP_RETRY_INTERVAL;
use crate::protocol::frame::{self, ProtocolError};
use crate::protocol::{Command, CommandFrame, CommandKind, RollState, SequenceGenerator};
use crate::transport::{Link, TransportError};

/// How a command treats a busy gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePolicy {
    /// Return `Busy` without sending
    DropIfBusy,
    /// Poll the gate every `RetryPolicy::interval` until it frees up
    RetryUntilFree,
    /// Send without entering the gate
    Exempt,
}

/// Polling for `GatePolicy::RetryUntilFree`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// Retries after the first attempt; `None` polls forever
    pub max_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: STOP_RETRY_INTERVAL,
            max_retries: None,
        }
    }
}

/// Gate policy for each command kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub set_heading: GatePolicy,
    pub roll: GatePolicy,
    pub stop: GatePolicy,
    pub set_color: GatePolicy,
    pub set_back_led: GatePolicy,
    pub retry: RetryPolicy,
}

impl Default for DispatchPolicy {
    /// Everything gated, stop waits for its turn
    fn default() -> Self {
        Self {
            set_heading: GatePolicy::DropIfBusy,
            roll: GatePolicy::DropIfBusy,
            stop: GatePolicy::RetryUntilFree,
            set_color: GatePolicy::DropIfBusy,
            set_back_led: GatePolicy::DropIfBusy,
            retry: RetryPolicy::default(),
        }
    }
}

impl DispatchPolicy {
    /// Default policy with the back LED writing straight through the gate
    pub fn legacy() -> Self {
        Self {
            set_back_led: GatePolicy::Exempt,
            ..Self::default()
        }
    }

    pub fn gate_for(&self, kind: CommandKind) -> GatePolicy {
        match kind {
            CommandKind::SetHeading => self.set_heading,
            CommandKind::Roll => self.roll,
            CommandKind::Stop => self.stop,
            CommandKind::SetColor => self.set_color,
            CommandKind::SetBackLed => self.set_back_led,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What happened to a request
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Written to the link with this sequence number
    Sent { sequence: u8 },
    /// Not sent: another command held the gate
    Busy,
    /// Not delivered
    Failed(DispatchError),
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchOutcome::Sent { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, DispatchOutcome::Busy)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DispatchOutcome::Failed(_))
    }
}

/// A dispatcher operation as a value, for queuing and routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    SetHeading(u16),
    Roll { heading: u16, speed: u8, state: RollState },
    Stop,
    SetColor { red: u8, green: u8, blue: u8 },
    SetBackLed(u8),
}

impl Request {
    pub fn kind(&self) -> CommandKind {
        match self {
            Request::SetHeading(_) => CommandKind::SetHeading,
            Request::Roll { .. } => CommandKind::Roll,
            Request::Stop => CommandKind::Stop,
            Request::SetColor { .. } => CommandKind::SetColor,
            Request::SetBackLed(_) => CommandKind::SetBackLed,
        }
    }
}

/// A request that passed admission: its sequence number is drawn and,
/// unless exempt, it holds the gate until dropped
#[derive(Debug)]
pub struct IssuedFrame {
    kind: CommandKind,
    sequence: u8,
    packet: Vec<u8>,
    _permit: Option<GatePermit>,
}

impl IssuedFrame {
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn packet(&self) -> &[u8] {
        &self.packet
    }
}

/// Result of the synchronous half of a request
#[derive(Debug)]
pub enum Admission {
    /// Ready to write
    Issued(IssuedFrame),
    /// Gate taken and the policy drops
    Busy,
    /// Gate taken and the policy retries
    MustWait,
    /// Could not be encoded; nothing was drawn
    Rejected(DispatchError),
}

/// One session: owns the link, its sequence counter and its gate
pub struct Dispatcher<L> {
    link: L,
    sequence: SequenceGenerator,
    gate: Arc<CommandGate>,
    policy: DispatchPolicy,
}

impl<L: Link> Dispatcher<L> {
    pub fn new(link: L, policy: DispatchPolicy) -> Self {
        info!("New session, policy {:?}", policy);
        Self {
            link,
            sequence: SequenceGenerator::new(),
            gate: Arc::new(CommandGate::new()),
            policy,
        }
    }

    pub fn gate(&self) -> &CommandGate {
        &self.gate
    }

    pub fn sequence(&self) -> &SequenceGenerator {
        &self.sequence
    }

    pub async fn set_heading(&self, heading: u16) -> DispatchOutcome {
        self.request(Request::SetHeading(heading)).await
    }

    /// Drive at `speed` towards `heading` degrees. Remembers the heading for `stop`.
    pub async fn roll(&self, heading: u16, speed: u8, state: RollState) -> DispatchOutcome {
        debug!("Roll heading={}, speed={}, state={:?}", heading, speed, state);
        self.request(Request::Roll {
            heading,
            speed,
            state,
        })
        .await
    }

    /// Stop rolling, keeping the last heading
    pub async fn stop(&self) -> DispatchOutcome {
        self.request(Request::Stop).await
    }

    pub async fn set_color(&self, red: u8, green: u8, blue: u8) -> DispatchOutcome {
        debug!("Set color: r={}, g={}, b={}", red, green, blue);
        self.request(Request::SetColor { red, green, blue }).await
    }

    pub async fn set_back_led(&self, brightness: u8) -> DispatchOutcome {
        debug!("Set back LED to {}", brightness);
        self.request(Request::SetBackLed(brightness)).await
    }

    pub async fn request(&self, request: Request) -> DispatchOutcome {
        self.settle(request, self.try_issue(request)).await
    }

    /// Gate check, command resolution and sequence number, without awaiting.
    /// Callers that must keep issuance order call this in that order and
    /// hand the result to `settle` later.
    pub fn try_issue(&self, request: Request) -> Admission {
        let kind = request.kind();
        let permit = match self.policy.gate_for(kind) {
            GatePolicy::Exempt => None,
            policy => match self.gate.try_acquire() {
                Some(permit) => Some(permit),
                None if policy == GatePolicy::RetryUntilFree => return Admission::MustWait,
                None => {
                    debug!("{:?} dropped, another command is in flight", kind);
                    return Admission::Busy;
                }
            },
        };

        let command = self.command_for(request);
        let payload = command.payload();
        // Checked before drawing a sequence number so a bad request consumes nothing
        if let Err(e) = frame::validate_payload(&payload) {
            return Admission::Rejected(e.into());
        }

        let sequence = self.sequence.next();
        match CommandFrame::build(command.device_id(), command.command_id(), sequence, &payload) {
            Ok(frame) => Admission::Issued(IssuedFrame {
                kind,
                sequence,
                packet: frame.to_bytes(),
                _permit: permit,
            }),
            Err(e) => Admission::Rejected(e.into()),
        }
    }

    /// Finish a request from its admission: write it, or poll the gate
    /// while the policy says to wait
    pub async fn settle(&self, request: Request, mut admission: Admission) -> DispatchOutcome {
        let kind = request.kind();
        let retry = self.policy.retry;
        let mut retries = 0u32;

        loop {
            match admission {
                Admission::Issued(issued) => return self.complete(issued).await,
                Admission::Busy => return DispatchOutcome::Busy,
                Admission::Rejected(e) => {
                    warn!("{:?} failed: {}", kind, e);
                    return DispatchOutcome::Failed(e);
                }
                Admission::MustWait => {
                    if retry.max_retries.is_some_and(|max| retries >= max) {
                        warn!("{:?} gave up after {} retries, gate still busy", kind, retries);
                        return DispatchOutcome::Busy;
                    }
                    retries += 1;
                    debug!("Gate busy, retrying {:?} in {:?}", kind, retry.interval);
                    sleep(retry.interval).await;
                    admission = self.try_issue(request);
                }
            }
        }
    }

    /// Write an issued frame; the gate is released once the write settles
    pub async fn complete(&self, issued: IssuedFrame) -> DispatchOutcome {
        debug!("Sending {:02X?}", issued.packet);
        let result = self.link.write_frame(&issued.packet).await;
        let IssuedFrame { kind, sequence, .. } = issued;

        match result {
            Ok(()) => {
                debug!("Command write done (seq={})", sequence);
                DispatchOutcome::Sent { sequence }
            }
            Err(e) => {
                warn!("{:?} failed: {}", kind, e);
                DispatchOutcome::Failed(e.into())
            }
        }
    }

    /// Resolve an admitted request; roll and stop read or write the gate's heading here
    fn command_for(&self, request: Request) -> Command {
        match request {
            Request::SetHeading(heading) => Command::SetHeading { heading },
            Request::Roll {
                heading,
                speed,
                state,
            } => {
                self.gate.record_heading(heading);
                Command::Roll {
                    speed,
                    heading,
                    state,
                }
            }
            Request::Stop => Command::stop(self.gate.last_heading()),
            Request::SetColor { red, green, blue } => Command::SetColor { red, green, blue },
            Request::SetBackLed(brightness) => Command::SetBackLed { brightness },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::{CMD_ROLL, CMD_SET_RGB_LED};
    use crate::transport::SimLink;
    use tokio::time::Instant;

    fn dispatcher(link: &SimLink, policy: DispatchPolicy) -> Arc<Dispatcher<SimLink>> {
        Arc::new(Dispatcher::new(link.clone(), policy))
    }

    /// Start a slow roll on another task and wait until it holds the gate
    async fn roll_in_flight(d: &Arc<Dispatcher<SimLink>>) -> tokio::task::JoinHandle<DispatchOutcome> {
        let d2 = Arc::clone(d);
        let handle = tokio::spawn(async move { d2.roll(90, 200, RollState::Engage).await });
        tokio::task::yield_now().await;
        assert!(d.gate().is_busy());
        handle
    }

    #[tokio::test]
    async fn test_set_color_sends_expected_packet() {
        let link = SimLink::new();
        let d = dispatcher(&link, DispatchPolicy::default());

        let outcome = d.set_color(0, 250, 0).await;
        assert!(matches!(outcome, DispatchOutcome::Sent { sequence: 0 }));
        assert_eq!(
            link.frames(),
            vec![vec![0xFF, 0xFF, 0x02, 0x20, 0x00, 0x05, 0x00, 0xFA, 0x00, 0x00, 0xDE]]
        );
        assert!(!d.gate().is_busy());
    }

    #[tokio::test]
    async fn test_sequence_shared_across_commands() {
        let link = SimLink::new();
        let d = dispatcher(&link, DispatchPolicy::default());

        d.set_back_led(255).await;
        d.set_color(0, 0, 0).await;
        d.roll(10, 50, RollState::Engage).await;
        d.set_heading(0).await;

        let sequences: Vec<u8> = link.decoded().iter().map(|f| f.sequence()).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_stop_replays_last_heading() {
        let link = SimLink::new();
        let d = dispatcher(&link, DispatchPolicy::default());

        // Nothing rolled yet: heading 0
        d.stop().await;
        d.roll(300, 180, RollState::Engage).await;
        d.stop().await;

        let frames = link.decoded();
        assert_eq!(frames[0].payload(), &[100, 0, 0, 0]);
        assert_eq!(frames[1].payload(), &[180, 0x01, 0x2C, 1]);
        assert_eq!(frames[2].command_id(), 0x30);
        assert_eq!(frames[2].payload(), &[100, 0x01, 0x2C, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gated_commands_dropped_while_busy() {
        let link = SimLink::with_latency(Duration::from_millis(250));
        let d = dispatcher(&link, DispatchPolicy::default());
        let roll = roll_in_flight(&d).await;

        assert!(d.set_color(255, 0, 0).await.is_busy());
        assert!(d.set_heading(0).await.is_busy());
        assert!(d.set_back_led(255).await.is_busy());
        // A dropped roll must not overwrite the stored heading
        assert!(d.roll(180, 255, RollState::Engage).await.is_busy());
        assert_eq!(d.gate().last_heading(), 90);

        assert!(matches!(roll.await.unwrap(), DispatchOutcome::Sent { sequence: 0 }));
        assert!(!d.gate().is_busy());
        assert_eq!(link.frames().len(), 1);
        assert_eq!(d.sequence().peek(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_policy_lets_back_led_through() {
        let link = SimLink::with_latency(Duration::from_millis(250));
        let d = dispatcher(&link, DispatchPolicy::legacy());
        let roll = roll_in_flight(&d).await;

        let led = Arc::clone(&d);
        let led = tokio::spawn(async move { led.set_back_led(255).await });
        tokio::task::yield_now().await;
        // Back LED bypasses the gate entirely
        assert!(d.gate().is_busy());
        assert_eq!(link.frames().len(), 2);

        assert!(matches!(led.await.unwrap(), DispatchOutcome::Sent { sequence: 1 }));
        assert!(roll.await.unwrap().is_sent());
        assert!(!d.gate().is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_gate_then_sends_once() {
        let link = SimLink::with_latency(Duration::from_millis(250));
        let d = dispatcher(&link, DispatchPolicy::default());
        let started = Instant::now();
        let roll = roll_in_flight(&d).await;

        let stopper = Arc::clone(&d);
        let stop = tokio::spawn(async move { stopper.stop().await });

        sleep(Duration::from_millis(150)).await;
        assert_eq!(link.frames().len(), 1, "stop must not send while the roll is in flight");

        assert!(roll.await.unwrap().is_sent());
        assert!(matches!(stop.await.unwrap(), DispatchOutcome::Sent { sequence: 1 }));
        // Polled at 100ms and 200ms, got in at 300ms
        assert!(started.elapsed() >= Duration::from_millis(300));

        let frames = link.decoded();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].payload(), &[100, 0, 90, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_gives_up_after_max_retries() {
        let link = SimLink::with_latency(Duration::from_secs(5));
        let policy = DispatchPolicy {
            retry: RetryPolicy {
                interval: Duration::from_millis(100),
                max_retries: Some(3),
            },
            ..DispatchPolicy::default()
        };
        let d = dispatcher(&link, policy);
        let started = Instant::now();
        let roll = roll_in_flight(&d).await;

        assert!(d.stop().await.is_busy());
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(d.sequence().peek(), 1);

        assert!(roll.await.unwrap().is_sent());
        assert_eq!(link.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_try_issue_holds_gate_until_complete() {
        let link = SimLink::new();
        let d = dispatcher(&link, DispatchPolicy::default());

        let Admission::Issued(roll) = d.try_issue(Request::Roll {
            heading: 90,
            speed: 255,
            state: RollState::Engage,
        }) else {
            panic!("first request must be issued");
        };
        // Sequence and heading are taken at admission, before any write
        assert_eq!(roll.sequence(), 0);
        assert_eq!(roll.kind(), CommandKind::Roll);
        assert_eq!(d.gate().last_heading(), 90);
        assert!(d.gate().is_busy());
        assert!(link.frames().is_empty());

        assert!(matches!(d.try_issue(Request::SetColor { red: 1, green: 2, blue: 3 }), Admission::Busy));
        assert!(matches!(d.try_issue(Request::Stop), Admission::MustWait));
        assert_eq!(d.sequence().peek(), 1);

        let packet = roll.packet().to_vec();
        assert!(matches!(d.complete(roll).await, DispatchOutcome::Sent { sequence: 0 }));
        assert!(!d.gate().is_busy());
        assert_eq!(link.frames(), vec![packet]);
        assert_eq!(link.decoded()[0].command_id(), CMD_ROLL);
    }

    #[tokio::test]
    async fn test_dropped_issue_releases_gate_without_sending() {
        let link = SimLink::new();
        let d = dispatcher(&link, DispatchPolicy::default());

        let issued = d.try_issue(Request::SetColor { red: 0, green: 0, blue: 255 });
        assert!(d.gate().is_busy());
        drop(issued);
        assert!(!d.gate().is_busy());
        assert!(link.frames().is_empty());

        // The drawn sequence number is spent
        assert!(matches!(d.set_color(0, 0, 255).await, DispatchOutcome::Sent { sequence: 1 }));
        assert_eq!(link.decoded()[0].command_id(), CMD_SET_RGB_LED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_stop_lands_after_issued_roll() {
        let link = SimLink::with_latency(Duration::from_millis(250));
        let d = dispatcher(&link, DispatchPolicy::default());

        let roll = Request::Roll {
            heading: 270,
            speed: 200,
            state: RollState::Engage,
        };
        let roll = d.try_issue(roll);
        let stop = d.try_issue(Request::Stop);
        assert!(matches!(stop, Admission::MustWait));

        // Settle in reverse order: the stop still cannot overtake the roll
        let stopper = Arc::clone(&d);
        let stop = tokio::spawn(async move { stopper.settle(Request::Stop, stop).await });
        tokio::task::yield_now().await;
        assert!(link.frames().is_empty());

        let roller = Arc::clone(&d);
        let roll_request = Request::Roll {
            heading: 270,
            speed: 200,
            state: RollState::Engage,
        };
        let roll = tokio::spawn(async move { roller.settle(roll_request, roll).await });

        assert!(matches!(roll.await.unwrap(), DispatchOutcome::Sent { sequence: 0 }));
        assert!(matches!(stop.await.unwrap(), DispatchOutcome::Sent { sequence: 1 }));
        let frames = link.decoded();
        assert_eq!(frames[0].payload(), &[200, 0x01, 0x0E, 1]);
        assert_eq!(frames[1].payload(), &[100, 0x01, 0x0E, 0]);
    }

    #[tokio::test]
    async fn test_transport_failure_releases_gate() {
        let link = SimLink::new();
        let d = dispatcher(&link, DispatchPolicy::default());
        link.set_failing(true);

        let outcome = d.roll(45, 120, RollState::Engage).await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Failed(DispatchError::Transport(TransportError::Disconnected))
        ));
        assert!(!d.gate().is_busy());
        assert!(d.stop().await.is_failed());
        assert!(!d.gate().is_busy());

        link.set_failing(false);
        assert!(matches!(d.set_color(0, 0, 255).await, DispatchOutcome::Sent { sequence: 2 }));
    }

    #[test]
    fn test_request_kinds() {
        assert_eq!(Request::Stop.kind(), CommandKind::Stop);
        assert_eq!(Request::SetBackLed(0).kind(), CommandKind::SetBackLed);
        assert_eq!(
            DispatchPolicy::default().gate_for(CommandKind::Stop),
            GatePolicy::RetryUntilFree
        );
        assert_eq!(
            DispatchPolicy::legacy().gate_for(CommandKind::SetBackLed),
            GatePolicy::Exempt
        );
        assert_eq!(
            DispatchPolicy::default().gate_for(CommandKind::SetBackLed),
            GatePolicy::DropIfBusy
        );
    }
}
