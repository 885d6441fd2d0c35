//! Line-oriented SCPI transport over a raw TCP socket.
//!
//! The instruments speak ASCII SCPI on a raw socket: each command is one
//! line terminated by `\n`, queries end in `?`, and exactly one response
//! line arrives per query before the next command is sent. There is no
//! further framing and no multiplexing, so the transport is a plain
//! blocking request/response client.
//!
//! A stalled instrument is bounded by the per-session read timeout; hitting
//! it surfaces as [`BenchError::Timeout`] and the caller treats the current
//! operation as failed. Nothing is retried at this layer.

use crate::config::Endpoint;
use crate::error::{BenchError, BenchResult};
use log::{debug, trace};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Timeout for establishing the TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-session read timeout bounding a stalled query.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Read granularity; responses used here are short ASCII lines.
const READ_CHUNK: usize = 1024;

/// One side of a SCPI conversation: fire-and-forget writes and
/// single-response queries. Implemented by the TCP transport and by the
/// scripted mock link.
pub trait ScpiLink: Send {
    /// Sends a command without expecting a response.
    fn write(&mut self, cmd: &str) -> BenchResult<()>;

    /// Sends a command and blocks for its single response line.
    fn query(&mut self, cmd: &str) -> BenchResult<String>;
}

/// Blocking TCP client owning one physical instrument connection.
pub struct TcpTransport {
    stream: TcpStream,
    peer: String,
}

impl TcpTransport {
    /// Opens a connection to the instrument endpoint.
    pub fn connect(endpoint: &Endpoint) -> BenchResult<Self> {
        let peer = endpoint.to_string();
        let addr = peer
            .to_socket_addrs()
            .map_err(|e| BenchError::Connection(format!("cannot resolve {peer}: {e}")))?
            .next()
            .ok_or_else(|| BenchError::Connection(format!("no address found for {peer}")))?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|e| BenchError::Connection(format!("failed to connect to {peer}: {e}")))?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_write_timeout(Some(CONNECT_TIMEOUT))?;
        stream.set_nodelay(true)?;
        debug!("Connected to {peer}");
        Ok(Self { stream, peer })
    }

    /// Reads until a full response line is available. The protocol delivers
    /// one response per query, so a newline ends the message.
    fn read_line(&mut self) -> BenchResult<String> {
        let mut response: Vec<u8> = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = self
                .stream
                .read(&mut chunk)
                .map_err(|e| map_read_error(&self.peer, e))?;
            if n == 0 {
                return Err(BenchError::Connection(format!(
                    "{} closed the connection mid-query",
                    self.peer
                )));
            }
            let terminated = chunk[..n].contains(&b'\n');
            response.extend_from_slice(&chunk[..n]);
            if terminated {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&response).trim().to_string())
    }
}

fn map_read_error(peer: &str, err: std::io::Error) -> BenchError {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => BenchError::Timeout(READ_TIMEOUT),
        _ => BenchError::Connection(format!("read from {peer} failed: {err}")),
    }
}

impl ScpiLink for TcpTransport {
    fn write(&mut self, cmd: &str) -> BenchResult<()> {
        trace!("[{}] write: {cmd}", self.peer);
        self.stream.write_all(cmd.as_bytes())?;
        self.stream.write_all(b"\n")?;
        Ok(())
    }

    fn query(&mut self, cmd: &str) -> BenchResult<String> {
        self.write(cmd)?;
        let response = self.read_line()?;
        trace!("[{}] query: {cmd} -> {response}", self.peer);
        Ok(response)
    }
}
