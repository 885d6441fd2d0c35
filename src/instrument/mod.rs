//! Instrument communication layer.
//!
//! A [`transport::TcpTransport`] carries one SCPI line conversation over a
//! raw TCP socket. A [`session::InstrumentSession`] wraps a transport with
//! instrument identity and typed query helpers, and a
//! [`registry::SessionRegistry`] hands out exactly one shared session per
//! instrument role. [`mock::MockLink`] is a scripted in-memory link used by
//! the test suites.

pub mod mock;
pub mod registry;
pub mod session;
pub mod transport;
