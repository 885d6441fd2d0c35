//! Transport, session and registry lifecycle against a loopback SCPI
//! listener standing in for an instrument.

use rf_bench::config::{BenchSettings, Endpoint};
use rf_bench::error::BenchError;
use rf_bench::instrument::registry::{Role, SessionRegistry};
use rf_bench::instrument::session::InstrumentSession;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

/// Minimal line-based SCPI responder: answers every query line, swallows
/// writes, and serves connections until the test process exits.
fn spawn_instrument(identity: &'static str) -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let cmd = line.trim();
                if !cmd.contains('?') {
                    continue;
                }
                let reply = if cmd == "*IDN?" {
                    identity
                } else if cmd.ends_with("*OPC?") {
                    "1"
                } else if cmd == ":SYST:ERR?" {
                    "0,\"No error\""
                } else if cmd == ":SOUR1:POW:PEP?" {
                    "-8.25"
                } else {
                    "0"
                };
                if writeln!(writer, "{reply}").is_err() {
                    break;
                }
            }
        }
    });
    Endpoint {
        address: "127.0.0.1".to_string(),
        port,
    }
}

#[test]
fn connect_queries_identity_first() {
    let endpoint = spawn_instrument("Rohde&Schwarz,FSW-26,100001,5.30");
    let mut session = InstrumentSession::connect(&endpoint).unwrap();
    assert_eq!(session.identity(), "Rohde&Schwarz,FSW-26,100001,5.30");
    assert_eq!(session.query_float(":SOUR1:POW:PEP?").unwrap(), -8.25);
    session.query_opc("*RST").unwrap();
    assert_eq!(session.drain_error_queue().unwrap(), "0,\"No error\"");
}

#[test]
fn unreachable_instrument_is_a_connection_error() {
    // Bind a port and drop the listener so nothing is listening.
    let endpoint = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        Endpoint {
            address: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
        }
    };
    assert!(matches!(
        InstrumentSession::connect(&endpoint),
        Err(BenchError::Connection(_))
    ));
}

#[test]
fn registry_hands_out_one_session_per_role() {
    let settings = BenchSettings {
        vsa: spawn_instrument("MOCK,VSA,1,1.0"),
        vsg: spawn_instrument("MOCK,VSG,2,1.0"),
    };
    let mut registry = SessionRegistry::new(settings);
    let first = registry.session(Role::Vsa).unwrap();
    let second = registry.session(Role::Vsa).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let vsg = registry.session(Role::Vsg).unwrap();
    assert!(!Arc::ptr_eq(&first, &vsg));
    assert_eq!(first.lock().unwrap().identity(), "MOCK,VSA,1,1.0");
    assert_eq!(vsg.lock().unwrap().identity(), "MOCK,VSG,2,1.0");
}

#[test]
fn close_all_forces_a_fresh_reconnect() {
    let settings = BenchSettings {
        vsa: spawn_instrument("MOCK,VSA,1,1.0"),
        vsg: spawn_instrument("MOCK,VSG,2,1.0"),
    };
    let mut registry = SessionRegistry::new(settings);
    let stale = registry.session(Role::Vsa).unwrap();
    registry.close_all();
    // The old handle is dead for every holder.
    assert!(matches!(
        stale.lock().unwrap().query("*IDN?"),
        Err(BenchError::Connection(_))
    ));
    // A later request reconnects fresh.
    let fresh = registry.session(Role::Vsa).unwrap();
    assert!(!Arc::ptr_eq(&stale, &fresh));
    assert_eq!(fresh.lock().unwrap().identity(), "MOCK,VSA,1,1.0");
}
