//! Endpoint session state
//!
//! Every endpoint owns one [`Session`] behind an `Arc`. References keep only a
//! [`SessionRef`] (a `Weak`), so they never extend the client's lifetime.

use crate::error::{BridgeError, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);
static OPEN_SESSIONS: AtomicUsize = AtomicUsize::new(0);

/// Number of sessions currently connected in this process
pub fn open_sessions() -> usize {
    OPEN_SESSIONS.load(Ordering::SeqCst)
}

/// Unique identity of an endpoint instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

impl EndpointId {
    fn next() -> Self {
        Self(NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Created, never connected
    #[default]
    Disconnected,
    /// Client is live
    Connected,
    /// Client released; terminal
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct Slot<C> {
    state: SessionState,
    client: Option<C>,
}

/// Shared session of one endpoint
pub(crate) struct Session<C> {
    id: EndpointId,
    target: String,
    slot: Mutex<Slot<C>>,
}

impl<C> Session<C> {
    pub(crate) fn new(target: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: EndpointId::next(),
            target: target.into(),
            slot: Mutex::new(Slot {
                state: SessionState::Disconnected,
                client: None,
            }),
        })
    }

    pub(crate) fn id(&self) -> EndpointId {
        self.id
    }

    pub(crate) fn target(&self) -> &str {
        &self.target
    }

    pub(crate) fn state(&self) -> SessionState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Slot<C>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Disconnected -> Connected using `connect` to build the client
    pub(crate) fn open(&self, connect: impl FnOnce() -> Result<C>) -> Result<()> {
        let mut slot = self.lock();
        match slot.state {
            SessionState::Connected => {
                tracing::debug!("Endpoint {} already connected", self.target);
                Ok(())
            }
            SessionState::Closed => Err(BridgeError::connection(
                &self.target,
                "endpoint has been closed",
            )),
            SessionState::Disconnected => {
                let client = connect()?;
                slot.client = Some(client);
                slot.state = SessionState::Connected;
                OPEN_SESSIONS.fetch_add(1, Ordering::SeqCst);
                tracing::info!("Connected to {}", self.target);
                Ok(())
            }
        }
    }

    /// Connected -> Closed; releases the client. No-op in any other state.
    pub(crate) fn close(&self) {
        let mut slot = self.lock();
        if slot.state != SessionState::Connected {
            return;
        }

        let client = slot.client.take();
        slot.state = SessionState::Closed;
        drop(client);
        OPEN_SESSIONS.fetch_sub(1, Ordering::SeqCst);
        tracing::info!("Disconnected from {}", self.target);
    }

    pub(crate) fn with_client<T>(&self, f: impl FnOnce(&C) -> Result<T>) -> Result<T> {
        let slot = self.lock();
        match (&slot.state, &slot.client) {
            (SessionState::Connected, Some(client)) => f(client),
            (state, _) => Err(BridgeError::NotConnected {
                target: self.target.clone(),
                state: *state,
            }),
        }
    }

    pub(crate) fn downgrade(self: &Arc<Self>) -> SessionRef<C> {
        SessionRef {
            id: self.id,
            session: Arc::downgrade(self),
        }
    }
}

impl<C> Drop for Session<C> {
    fn drop(&mut self) {
        if self.state() == SessionState::Connected {
            tracing::warn!("Endpoint {} was not closed, closing automatically", self.target);
            self.close();
        }
    }
}

/// Non-owning handle held by directory and file references
pub(crate) struct SessionRef<C> {
    id: EndpointId,
    session: Weak<Session<C>>,
}

impl<C> SessionRef<C> {
    pub(crate) fn id(&self) -> EndpointId {
        self.id
    }

    pub(crate) fn with_client<T>(&self, f: impl FnOnce(&C) -> Result<T>) -> Result<T> {
        match self.session.upgrade() {
            Some(session) => session.with_client(f),
            None => Err(BridgeError::NotConnected {
                target: format!("endpoint {}", self.id),
                state: SessionState::Closed,
            }),
        }
    }
}

impl<C> Clone for SessionRef<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            session: self.session.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine() {
        let session: Arc<Session<u32>> = Session::new("test");
        assert_eq!(session.state(), SessionState::Disconnected);

        // close before connect is a no-op
        session.close();
        assert_eq!(session.state(), SessionState::Disconnected);

        session.open(|| Ok(7)).unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.with_client(|c| Ok(*c)).unwrap(), 7);

        // second connect keeps the existing client
        session.open(|| Ok(9)).unwrap();
        assert_eq!(session.with_client(|c| Ok(*c)).unwrap(), 7);

        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.open(|| Ok(1)).is_err());
    }

    #[test]
    fn test_failed_connect_stays_disconnected() {
        let session: Arc<Session<u32>> = Session::new("test");
        let err = session
            .open(|| Err(BridgeError::connection("test", "refused")))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Connection { .. }));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_ref_requires_connected_session() {
        let session: Arc<Session<u32>> = Session::new("test");
        let weak = session.downgrade();

        let err = weak.with_client(|c| Ok(*c)).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::NotConnected { state: SessionState::Disconnected, .. }
        ));

        session.open(|| Ok(3)).unwrap();
        assert_eq!(weak.with_client(|c| Ok(*c)).unwrap(), 3);

        drop(session);
        assert!(matches!(
            weak.with_client(|c| Ok(*c)),
            Err(BridgeError::NotConnected { .. })
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        let a: Arc<Session<()>> = Session::new("a");
        let b: Arc<Session<()>> = Session::new("b");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.downgrade().id(), a.id());
    }
}
