// Command dispatch: single-flight gate and the per-session dispatcher
pub mod dispatcher;
pub mod gate;

pub use dispatcher::{
    Admission, DispatchError, DispatchOutcome, DispatchPolicy, Dispatcher, GatePolicy, IssuedFrame,
    Request, RetryPolicy,
};
pub use gate::{CommandGate, GatePermit};
