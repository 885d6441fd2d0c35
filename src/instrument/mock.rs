//! Scripted SCPI link for tests and offline dry-runs.
//!
//! `MockLink` records every command it receives and answers queries from a
//! table of exact-match rules, falling back to sensible defaults for the
//! common IEEE 488.2 queries (`*IDN?`, `*OPC?`, `:SYST:ERR?`). Cloning the
//! link clones a handle to the same state, so a test can keep a handle,
//! hand the link to a session, and later assert on the command log.

use crate::error::BenchResult;
use crate::instrument::transport::ScpiLink;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct MockState {
    identity: String,
    rules: Vec<(String, String)>,
    sent: Vec<String>,
}

/// In-memory [`ScpiLink`] with scripted responses.
#[derive(Clone)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new("MOCK,SCPI,000000,1.0")
    }
}

impl MockLink {
    /// Creates a link that answers `*IDN?` with `identity`.
    pub fn new(identity: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                identity: identity.to_string(),
                ..MockState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers an exact-match response for a query. Later registrations
    /// win, so a test can override an earlier rule.
    pub fn on(&self, cmd: &str, response: &str) {
        self.state()
            .rules
            .push((cmd.to_string(), response.to_string()));
    }

    /// Every command sent so far, writes and queries alike, in order.
    pub fn sent(&self) -> Vec<String> {
        self.state().sent.clone()
    }

    /// Whether any sent command contains `needle`.
    pub fn sent_contains(&self, needle: &str) -> bool {
        self.state().sent.iter().any(|cmd| cmd.contains(needle))
    }

    /// Number of commands sent so far.
    pub fn sent_len(&self) -> usize {
        self.state().sent.len()
    }
}

impl ScpiLink for MockLink {
    fn write(&mut self, cmd: &str) -> BenchResult<()> {
        self.state().sent.push(cmd.to_string());
        Ok(())
    }

    fn query(&mut self, cmd: &str) -> BenchResult<String> {
        let mut state = self.state();
        state.sent.push(cmd.to_string());
        if let Some((_, response)) = state.rules.iter().rev().find(|(rule, _)| rule == cmd) {
            return Ok(response.clone());
        }
        let response = if cmd == "*IDN?" {
            state.identity.clone()
        } else if cmd.ends_with("*OPC?") {
            "1".to_string()
        } else if cmd == ":SYST:ERR?" {
            "0,\"No error\"".to_string()
        } else {
            // Generic numeric success, as a real instrument would never
            // leave a query unanswered.
            "0".to_string()
        };
        Ok(response)
    }
}
