//! Access flow for wicket.
//!
//! - [`AccessStateMachine`] - drives one login/register/demo/unlock submission
//!   through `Idle -> Authenticating -> Granted/Denied -> Welcome`, writes the
//!   resulting session and reports progress as [`Signal`]s
//! - [`TaskSet`] - cancellable delayed tasks backing every timed transition
//! - [`RouteGuard`] - presence check for entry into the protected area

mod guard;
mod machine;
mod scheduler;

pub use guard::RouteGuard;
pub use machine::{
    AccessStateMachine, Attempt, DEFAULT_DENIED_REDIRECT_DELAY, DEFAULT_GRANTED_DELAY,
    DEFAULT_WELCOME_DELAY, Signal, SubmitError, Timings,
};
pub use scheduler::{TaskHandle, TaskSet};
