//! Per-role instrument session registry.
//!
//! Several measurement drivers run against the same physical instruments
//! within one sweep. Reconnecting per driver would discard in-flight
//! instrument state (markers, sweep windows) and waste setup time, so the
//! registry hands out exactly one shared session per role, created lazily
//! on first use and reused until [`SessionRegistry::close_all`].
//!
//! The registry is an explicit value owned by the orchestrator and passed
//! to wherever sessions are needed — lifetime and ownership are visible at
//! the call sites instead of hiding in shared static state.

use crate::config::BenchSettings;
use crate::error::{BenchError, BenchResult};
use crate::instrument::session::InstrumentSession;
use log::{info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Session handle shared between drivers.
pub type SharedSession = Arc<Mutex<InstrumentSession>>;

/// Instrument role on the bench.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Vector signal analyzer (receive side).
    Vsa,
    /// Vector signal generator (transmit side).
    Vsg,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Vsa => write!(f, "VSA"),
            Role::Vsg => write!(f, "VSG"),
        }
    }
}

/// Locks a shared session for one instrument operation.
pub fn lock_session(session: &SharedSession, role: Role) -> BenchResult<MutexGuard<'_, InstrumentSession>> {
    session
        .lock()
        .map_err(|_| BenchError::Connection(format!("{role} session lock poisoned")))
}

/// Hands out one lazily-connected shared session per instrument role.
pub struct SessionRegistry {
    settings: Option<BenchSettings>,
    vsa: Option<SharedSession>,
    vsg: Option<SharedSession>,
}

impl SessionRegistry {
    /// Creates an empty registry; sessions connect on first use.
    pub fn new(settings: BenchSettings) -> Self {
        Self {
            settings: Some(settings),
            vsa: None,
            vsg: None,
        }
    }

    /// Builds a registry around already-connected sessions. Used by tests
    /// and offline dry-runs with scripted links; [`SessionRegistry::close_all`]
    /// behaves the same, but nothing can reconnect afterwards.
    pub fn with_sessions(vsa: SharedSession, vsg: SharedSession) -> Self {
        Self {
            settings: None,
            vsa: Some(vsa),
            vsg: Some(vsg),
        }
    }

    /// Returns the shared session for `role`, connecting it on first use.
    pub fn session(&mut self, role: Role) -> BenchResult<SharedSession> {
        let (slot, endpoint) = match role {
            Role::Vsa => (&mut self.vsa, self.settings.as_ref().map(|s| &s.vsa)),
            Role::Vsg => (&mut self.vsg, self.settings.as_ref().map(|s| &s.vsg)),
        };
        if let Some(session) = slot {
            return Ok(Arc::clone(session));
        }
        let endpoint = endpoint.ok_or_else(|| {
            BenchError::Connection(format!("no endpoint configured for {role}"))
        })?;
        info!("Opening {role} session at {endpoint}");
        let session = InstrumentSession::connect(endpoint)?;
        info!("{role} identity: {}", session.identity());
        let shared = Arc::new(Mutex::new(session));
        *slot = Some(Arc::clone(&shared));
        Ok(shared)
    }

    /// Closes both sessions and clears the registry so a later
    /// [`SessionRegistry::session`] call reconnects fresh.
    pub fn close_all(&mut self) {
        for (role, slot) in [(Role::Vsa, &mut self.vsa), (Role::Vsg, &mut self.vsg)] {
            if let Some(shared) = slot.take() {
                match shared.lock() {
                    Ok(mut session) => {
                        info!("Closing {role} session ({})", session.identity());
                        session.close();
                    }
                    Err(_) => warn!("{role} session lock poisoned during close"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::mock::MockLink;

    fn shared_mock(identity: &str) -> SharedSession {
        let link = MockLink::new(identity);
        Arc::new(Mutex::new(
            InstrumentSession::over_link(Box::new(link)).unwrap(),
        ))
    }

    #[test]
    fn injected_sessions_are_shared() {
        let mut registry = SessionRegistry::with_sessions(
            shared_mock("MOCK,VSA,0,1.0"),
            shared_mock("MOCK,VSG,0,1.0"),
        );
        let first = registry.session(Role::Vsa).unwrap();
        let second = registry.session(Role::Vsa).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn close_all_invalidates_sessions() {
        let vsa = shared_mock("MOCK,VSA,0,1.0");
        let mut registry =
            SessionRegistry::with_sessions(Arc::clone(&vsa), shared_mock("MOCK,VSG,0,1.0"));
        registry.close_all();
        assert!(!vsa.lock().unwrap().is_open());
        // No endpoints to reconnect from in an injected registry.
        assert!(matches!(
            registry.session(Role::Vsa),
            Err(BenchError::Connection(_))
        ));
    }
}
