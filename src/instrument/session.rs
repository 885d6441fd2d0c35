//! Instrument session: a live SCPI link plus instrument identity.
//!
//! A session is created by connecting a transport and immediately querying
//! `*IDN?`; an instrument that does not answer its identity is treated as
//! unreachable. Once [`InstrumentSession::close`] has been called the
//! session is permanently dead — every further operation fails and a new
//! session must be created through the registry.

use crate::config::Endpoint;
use crate::error::{BenchError, BenchResult};
use crate::instrument::transport::{ScpiLink, TcpTransport};
use log::{debug, info};

/// One live connection to an instrument.
pub struct InstrumentSession {
    link: Option<Box<dyn ScpiLink>>,
    identity: String,
}

impl std::fmt::Debug for InstrumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentSession")
            .field("identity", &self.identity)
            .field("open", &self.link.is_some())
            .finish()
    }
}

impl InstrumentSession {
    /// Connects to the endpoint and records the instrument identity.
    /// A non-responsive instrument at this step is a fatal connection
    /// error, not retried.
    pub fn connect(endpoint: &Endpoint) -> BenchResult<Self> {
        let transport = TcpTransport::connect(endpoint)?;
        Self::over_link(Box::new(transport))
    }

    /// Builds a session over an already-established link, issuing the
    /// identity query. Tests use this with a scripted [`MockLink`].
    ///
    /// [`MockLink`]: crate::instrument::mock::MockLink
    pub fn over_link(mut link: Box<dyn ScpiLink>) -> BenchResult<Self> {
        let identity = link
            .query("*IDN?")
            .map_err(|e| BenchError::Connection(format!("identity query failed: {e}")))?
            .trim()
            .to_string();
        if identity.is_empty() {
            return Err(BenchError::Connection(
                "instrument returned an empty identity".to_string(),
            ));
        }
        info!("Instrument identity: {identity}");
        Ok(Self {
            link: Some(link),
            identity,
        })
    }

    /// The trimmed `*IDN?` response recorded at connect time.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Whether the session is still usable.
    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    fn link(&mut self) -> BenchResult<&mut dyn ScpiLink> {
        match self.link.as_deref_mut() {
            Some(link) => Ok(link),
            None => Err(BenchError::Connection(format!(
                "session to {} is closed",
                self.identity
            ))),
        }
    }

    /// Sends a command without expecting a response.
    pub fn write(&mut self, cmd: &str) -> BenchResult<()> {
        self.link()?.write(cmd)
    }

    /// Sends a command and returns its single response line.
    pub fn query(&mut self, cmd: &str) -> BenchResult<String> {
        self.link()?.query(cmd)
    }

    /// Queries and parses the response as a float. A non-numeric answer is
    /// a [`BenchError::Protocol`].
    pub fn query_float(&mut self, cmd: &str) -> BenchResult<f64> {
        let response = self.query(cmd)?;
        response.trim().parse::<f64>().map_err(|_| {
            BenchError::Protocol(format!("expected a number from `{cmd}`, got `{response}`"))
        })
    }

    /// Sends `cmd` chained with `*OPC?` and waits for the completion reply,
    /// forcing synchronization with the instrument.
    pub fn query_opc(&mut self, cmd: &str) -> BenchResult<()> {
        self.query(&format!("{cmd};*OPC?"))?;
        Ok(())
    }

    /// Drains one entry from the instrument error queue.
    pub fn drain_error_queue(&mut self) -> BenchResult<String> {
        debug!("Draining instrument error queue");
        self.query(":SYST:ERR?")
    }

    /// Closes the session and drops the underlying connection. The session
    /// cannot be reused afterwards; the registry must create a fresh one.
    pub fn close(&mut self) {
        if self.link.take().is_some() {
            debug!("Session closed ({})", self.identity);
        }
    }
}
