//! The access flow: `Idle -> Authenticating -> Granted/Denied -> Welcome`.
//!
//! Every delayed transition is scheduled on the machine's [`TaskSet`]; after
//! [`AccessStateMachine::dispose`] no timer fires and no state changes.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wicket_client::{Authenticator, ClientError};
use wicket_store::{SessionStore, StoreError};
use wicket_types::{
    AccessState, Credential, DEMO_SESSION_TOKEN, EntitlementTier, RegistrationProfile, Role,
    Session, StorageTier, classify, classify_session, normalize_subscription,
};

use crate::scheduler::{TaskHandle, TaskSet};

pub const DEFAULT_GRANTED_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_WELCOME_DELAY: Duration = Duration::from_millis(3000);
pub const DEFAULT_DENIED_REDIRECT_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Granted -> Welcome.
    pub granted: Duration,
    /// Welcome -> completion.
    pub welcome: Duration,
    /// Denied -> automatic upgrade redirect.
    pub denied_redirect: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            granted: DEFAULT_GRANTED_DELAY,
            welcome: DEFAULT_WELCOME_DELAY,
            denied_redirect: DEFAULT_DENIED_REDIRECT_DELAY,
        }
    }
}

/// One submission of the access form.
#[derive(Clone)]
pub enum Attempt {
    Login {
        credential: Credential,
        remember: bool,
    },
    /// Register, then log in with the same credential.
    Register {
        profile: Box<RegistrationProfile>,
        remember: bool,
    },
    Demo {
        role: Role,
    },
    DeveloperUnlock {
        identifier: String,
        secret: String,
    },
}

impl fmt::Debug for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login {
                credential,
                remember,
            } => f
                .debug_struct("Login")
                .field("credential", credential)
                .field("remember", remember)
                .finish(),
            Self::Register { profile, remember } => f
                .debug_struct("Register")
                .field("identifier", &profile.credential.identifier.as_str())
                .field("role", &profile.role.as_str())
                .field("remember", remember)
                .finish(),
            Self::Demo { role } => f.debug_struct("Demo").field("role", role).finish(),
            Self::DeveloperUnlock { identifier, .. } => f
                .debug_struct("DeveloperUnlock")
                .field("identifier", identifier)
                .field("secret", &"<redacted>")
                .finish(),
        }
    }
}

impl Attempt {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Register { .. } => "register",
            Self::Demo { .. } => "demo",
            Self::DeveloperUnlock { .. } => "developer_unlock",
        }
    }

    /// Demo and developer sessions never outlive the process.
    const fn storage_tier(&self) -> StorageTier {
        match self {
            Self::Login { remember, .. } | Self::Register { remember, .. } => {
                StorageTier::from_remember_me(*remember)
            }
            Self::Demo { .. } | Self::DeveloperUnlock { .. } => StorageTier::Ephemeral,
        }
    }
}

/// Notifications for the hosting UI, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    State(AccessState),
    /// A failed submission; the machine is back in `Idle`.
    Error(String),
    /// Leave for the upgrade flow. Terminal.
    RedirectToUpgrade,
    /// Hand off to the protected area. Terminal.
    Completed,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("cannot submit while {0}")]
    Busy(AccessState),
    #[error("the access flow has been disposed")]
    Disposed,
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("Could not save the session: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Default)]
struct Inner {
    state: AccessState,
    disposed: bool,
    /// Set once a terminal signal has been sent.
    finished: bool,
    /// Bumped on every entry to Granted or Denied; stale timers compare it.
    epoch: u64,
    last_error: Option<String>,
    redirect_timer: Option<TaskHandle>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared by the machine and its timers.
#[derive(Debug, Clone)]
struct Shared {
    inner: Arc<Mutex<Inner>>,
    signals: mpsc::UnboundedSender<Signal>,
}

impl Shared {
    fn emit(&self, signal: Signal) {
        // A dropped receiver only means nobody is listening.
        let _ = self.signals.send(signal);
    }

    fn enter(&self, inner: &mut Inner, to: AccessState) {
        debug!(from = inner.state.as_str(), to = to.as_str(), "Access state transition");
        inner.state = to;
        self.emit(Signal::State(to));
    }

    fn complete(&self, epoch: u64) {
        let mut inner = lock(&self.inner);
        if inner.disposed
            || inner.finished
            || inner.epoch != epoch
            || inner.state != AccessState::Welcome
        {
            return;
        }
        inner.finished = true;
        info!("Access flow completed");
        self.emit(Signal::Completed);
    }
}

pub struct AccessStateMachine<A> {
    shared: Shared,
    authenticator: Arc<A>,
    store: SessionStore,
    timings: Timings,
    tasks: Arc<TaskSet>,
    demo_token: String,
}

impl<A: Authenticator> fmt::Debug for AccessStateMachine<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessStateMachine")
            .field("state", &self.state())
            .field("timings", &self.timings)
            .field("pending_tasks", &self.tasks.pending())
            .finish_non_exhaustive()
    }
}

impl<A: Authenticator> AccessStateMachine<A> {
    /// Create a machine in `Idle` and the receiver for its [`Signal`]s.
    #[must_use]
    pub fn new(
        authenticator: Arc<A>,
        store: SessionStore,
        timings: Timings,
    ) -> (Self, mpsc::UnboundedReceiver<Signal>) {
        let (signals, rx) = mpsc::unbounded_channel();
        let machine = Self {
            shared: Shared {
                inner: Arc::new(Mutex::new(Inner::default())),
                signals,
            },
            authenticator,
            store,
            timings,
            tasks: Arc::new(TaskSet::new()),
            demo_token: DEMO_SESSION_TOKEN.to_string(),
        };
        (machine, rx)
    }

    #[must_use]
    pub fn with_demo_token(mut self, demo_token: impl Into<String>) -> Self {
        self.demo_token = demo_token.into();
        self
    }

    #[must_use]
    pub fn state(&self) -> AccessState {
        lock(&self.shared.inner).state
    }

    /// Message from the most recent failed submission.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.inner).last_error.clone()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        lock(&self.shared.inner).disposed
    }

    /// Run one submission from `Idle`.
    ///
    /// On success the session is stored and the machine moves to `Granted`
    /// (admitted tiers) or `Denied`; the returned tier is the display
    /// classification. On failure it returns to `Idle` with the error message.
    pub async fn submit(&self, attempt: Attempt) -> Result<EntitlementTier, SubmitError> {
        {
            let mut inner = lock(&self.shared.inner);
            if inner.disposed {
                return Err(SubmitError::Disposed);
            }
            if !inner.state.accepts_submit() {
                return Err(SubmitError::Busy(inner.state));
            }
            inner.last_error = None;
            self.shared.enter(&mut inner, AccessState::Authenticating);
        }
        info!(attempt = attempt.kind(), "Access submission started");

        let tier = attempt.storage_tier();
        let result = match self.exchange(&attempt).await {
            Ok(session) => self.admit(session, tier),
            Err(err) => Err(SubmitError::from(err)),
        };

        result.inspect_err(|err| self.fail(err))
    }

    async fn exchange(&self, attempt: &Attempt) -> Result<Session, ClientError> {
        match attempt {
            Attempt::Login { credential, .. } => self.authenticator.login(credential).await,
            Attempt::Register { profile, .. } => {
                profile.validate().map_err(|err| {
                    debug!(error = %err, "Sign-up refused locally");
                    ClientError::ValidationFailed {
                        message: err.to_string(),
                    }
                })?;
                self.authenticator.register(profile).await?;
                self.authenticator.login(&profile.credential).await
            }
            Attempt::Demo { role } => self.authenticator.demo_login(role).await,
            Attempt::DeveloperUnlock { identifier, secret } => {
                self.authenticator
                    .developer_unlock(identifier, secret)
                    .await
            }
        }
    }

    /// Classify, store, and move to Granted or Denied.
    fn admit(&self, mut session: Session, tier: StorageTier) -> Result<EntitlementTier, SubmitError> {
        let entitlement = classify(session.role.as_str(), session.subscription.as_str());
        session.subscription = normalize_subscription(entitlement, &session.subscription);

        let mut inner = lock(&self.shared.inner);
        if inner.disposed {
            debug!("Access flow disposed during exchange; session not stored");
            return Err(SubmitError::Disposed);
        }
        self.store.write(&session, tier)?;

        inner.epoch += 1;
        let epoch = inner.epoch;
        if entitlement.is_admitted() {
            self.shared.enter(&mut inner, AccessState::Granted);
            drop(inner);
            self.schedule_welcome(epoch);
        } else {
            self.shared.enter(&mut inner, AccessState::Denied);
            let timer = self.schedule_redirect(epoch);
            inner.redirect_timer = Some(timer);
        }

        info!(
            entitlement = entitlement.as_str(),
            tier = tier.as_str(),
            "Access decided"
        );
        Ok(classify_session(&session, &self.demo_token))
    }

    fn fail(&self, err: &SubmitError) {
        let mut inner = lock(&self.shared.inner);
        if inner.disposed {
            return;
        }
        let message = err.to_string();
        warn!(error = %message, "Access submission failed");
        inner.last_error = Some(message.clone());
        self.shared.emit(Signal::Error(message));
        self.shared.enter(&mut inner, AccessState::Idle);
    }

    /// Granted -> Welcome, then completion once Welcome has been entered.
    fn schedule_welcome(&self, epoch: u64) {
        let shared = self.shared.clone();
        let tasks = Arc::downgrade(&self.tasks);
        let welcome = self.timings.welcome;
        self.tasks.schedule(self.timings.granted, move || {
            let mut inner = lock(&shared.inner);
            if inner.disposed || inner.epoch != epoch || inner.state != AccessState::Granted {
                return;
            }
            shared.enter(&mut inner, AccessState::Welcome);
            drop(inner);

            // Gone only when the machine itself was dropped.
            if let Some(tasks) = tasks.upgrade() {
                tasks.schedule(welcome, move || shared.complete(epoch));
            }
        });
    }

    fn schedule_redirect(&self, epoch: u64) -> TaskHandle {
        let shared = self.shared.clone();
        self.tasks.schedule(self.timings.denied_redirect, move || {
            let mut inner = lock(&shared.inner);
            if inner.disposed
                || inner.finished
                || inner.epoch != epoch
                || inner.state != AccessState::Denied
            {
                return;
            }
            inner.finished = true;
            info!("Redirecting denied session to upgrade");
            shared.emit(Signal::RedirectToUpgrade);
        })
    }

    /// Leave `Denied` for the upgrade flow now. Returns whether the redirect
    /// was issued by this call.
    pub fn request_upgrade(&self) -> bool {
        let mut inner = lock(&self.shared.inner);
        if inner.disposed || inner.finished || inner.state != AccessState::Denied {
            return false;
        }
        if let Some(timer) = inner.redirect_timer.take() {
            timer.cancel();
        }
        inner.finished = true;
        info!("Upgrade requested from denied state");
        self.shared.emit(Signal::RedirectToUpgrade);
        true
    }

    /// Back from `Denied` to `Idle`. The stored session is kept.
    pub fn return_to_idle(&self) -> bool {
        let mut inner = lock(&self.shared.inner);
        if inner.disposed || inner.finished || inner.state != AccessState::Denied {
            return false;
        }
        if let Some(timer) = inner.redirect_timer.take() {
            timer.cancel();
        }
        self.shared.enter(&mut inner, AccessState::Idle);
        true
    }

    /// Cancel every pending timer. No signal is sent afterwards.
    pub fn dispose(&self) {
        let mut inner = lock(&self.shared.inner);
        if inner.disposed {
            return;
        }
        inner.disposed = true;
        inner.redirect_timer = None;
        drop(inner);
        let cancelled = self.tasks.close();
        debug!(cancelled, "Access flow disposed");
    }
}

impl<A> Drop for AccessStateMachine<A> {
    fn drop(&mut self) {
        lock(&self.shared.inner).disposed = true;
    }
}
