use tracing::warn;
use wicket_store::SessionStore;

/// Entry check for the protected area.
///
/// Admission is by session presence alone. Entitlement is decided once, when
/// the session is created, so a stored session whose subscription has since
/// lapsed is still admitted here.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    store: SessionStore,
}

impl RouteGuard {
    #[must_use]
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// True iff the store holds a session with a non-blank token.
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        match self.store.read() {
            Ok(active) => active.is_some_and(|active| !active.session.token.is_blank()),
            Err(err) => {
                warn!(error = %err, "Session store unreadable; refusing entry");
                false
            }
        }
    }
}
