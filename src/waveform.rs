//! Waveform and setup file naming grammar.
//!
//! Generator waveform files (`.wv`) and analyzer setup recalls (`.dfl`)
//! encode the full signal configuration in their base name:
//!
//! ```text
//! <STD>_<UL|DL>_<N>MHz_<MOD>_<N>kHz_<N>RB_<N>RBO.<wv|dfl>
//! 5GNR_UL_10MHz_256QAM_30kHz_24RB_0RBO.wv
//! ```
//!
//! The modulation token set differs per signal family (5G-NR names end in
//! `QAM`, the LTE tooling prefixes it) but the grammar is otherwise
//! identical. A name is either accepted as a whole or rejected; a rejected
//! name never yields a partially-populated descriptor — drivers fall back
//! to the per-family defaults instead.

use crate::error::{BenchError, BenchResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Signal family a driver measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SignalFamily {
    /// 5G New Radio, FR1.
    #[serde(rename = "NR5G")]
    Nr5g,
    /// LTE.
    #[serde(rename = "LTE")]
    Lte,
}

impl SignalFamily {
    /// Leading token in waveform/setup file names.
    pub fn file_token(&self) -> &'static str {
        match self {
            SignalFamily::Nr5g => "5GNR",
            SignalFamily::Lte => "LTE",
        }
    }

    /// Measurement application selector in analyzer commands
    /// (`:CONF:<app>:MEAS ...`).
    pub fn meas_app(&self) -> &'static str {
        match self {
            SignalFamily::Nr5g => "NR5G",
            SignalFamily::Lte => "LTE",
        }
    }

    /// Averaged-EVM fetch query for this family.
    pub fn evm_fetch_query(&self) -> &'static str {
        match self {
            SignalFamily::Nr5g => ":FETC:CC1:SUMM:EVM:ALL:AVER?",
            SignalFamily::Lte => ":FETC:SUMM:EVM:ALL:AVER?",
        }
    }
}

impl fmt::Display for SignalFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.meas_app())
    }
}

/// Transmission direction encoded in the file name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LinkDirection {
    /// Uplink (`UL`).
    #[serde(rename = "UL")]
    Uplink,
    /// Downlink (`DL`).
    #[serde(rename = "DL")]
    Downlink,
}

impl LinkDirection {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "UL" => Some(LinkDirection::Uplink),
            "DL" => Some(LinkDirection::Downlink),
            _ => None,
        }
    }
}

impl fmt::Display for LinkDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkDirection::Uplink => f.write_str("UL"),
            LinkDirection::Downlink => f.write_str("DL"),
        }
    }
}

/// Duplexing scheme, inferred from the link direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Duplexing {
    /// Frequency-division duplexing.
    #[serde(rename = "FDD")]
    Fdd,
    /// Time-division duplexing.
    #[serde(rename = "TDD")]
    Tdd,
}

impl Duplexing {
    /// FDD for uplink captures, TDD otherwise.
    pub fn for_direction(direction: LinkDirection) -> Self {
        match direction {
            LinkDirection::Uplink => Duplexing::Fdd,
            LinkDirection::Downlink => Duplexing::Tdd,
        }
    }
}

impl fmt::Display for Duplexing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Duplexing::Fdd => f.write_str("FDD"),
            Duplexing::Tdd => f.write_str("TDD"),
        }
    }
}

/// Modulation order. File names spell it per family (`256QAM` vs `QAM256`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Modulation {
    /// QPSK.
    Qpsk,
    /// 16-QAM.
    Qam16,
    /// 64-QAM.
    Qam64,
    /// 256-QAM.
    Qam256,
    /// 1024-QAM.
    Qam1024,
}

impl Modulation {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "QPSK" => Some(Modulation::Qpsk),
            "16QAM" | "QAM16" => Some(Modulation::Qam16),
            "64QAM" | "QAM64" => Some(Modulation::Qam64),
            "256QAM" | "QAM256" => Some(Modulation::Qam256),
            "1024QAM" | "QAM1024" => Some(Modulation::Qam1024),
            _ => None,
        }
    }

    /// Token in the family's file-name spelling.
    pub fn token(&self, family: SignalFamily) -> &'static str {
        match (family, self) {
            (_, Modulation::Qpsk) => "QPSK",
            (SignalFamily::Nr5g, Modulation::Qam16) => "16QAM",
            (SignalFamily::Nr5g, Modulation::Qam64) => "64QAM",
            (SignalFamily::Nr5g, Modulation::Qam256) => "256QAM",
            (SignalFamily::Nr5g, Modulation::Qam1024) => "1024QAM",
            (SignalFamily::Lte, Modulation::Qam16) => "QAM16",
            (SignalFamily::Lte, Modulation::Qam64) => "QAM64",
            (SignalFamily::Lte, Modulation::Qam256) => "QAM256",
            (SignalFamily::Lte, Modulation::Qam1024) => "QAM1024",
        }
    }
}

/// What a file is used for; decides the accepted extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    /// Generator waveform (`.wv`).
    Waveform,
    /// Analyzer setup recall (`.dfl`).
    Setup,
}

impl FileKind {
    fn extension(&self) -> &'static str {
        match self {
            FileKind::Waveform => "wv",
            FileKind::Setup => "dfl",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FileKind::Waveform => "waveform",
            FileKind::Setup => "setup",
        }
    }
}

/// Signal parameters decoded from a waveform file name. Immutable once
/// parsed; only produced when the whole name matched the grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaveformDescriptor {
    /// Signal family the name was parsed against.
    pub family: SignalFamily,
    /// Uplink or downlink.
    pub link_direction: LinkDirection,
    /// Channel bandwidth in MHz.
    pub bandwidth_mhz: u32,
    /// Modulation order.
    pub modulation: Modulation,
    /// Subcarrier spacing in kHz.
    pub subcarrier_spacing_khz: u32,
    /// Allocated resource blocks.
    pub resource_blocks: u32,
    /// Resource block offset.
    pub resource_block_offset: u32,
    /// Duplexing scheme (FDD iff uplink).
    pub duplexing: Duplexing,
}

impl WaveformDescriptor {
    /// Built-in parameters used when no waveform file is supplied or its
    /// name does not decode.
    pub fn family_default(family: SignalFamily) -> Self {
        match family {
            SignalFamily::Nr5g => Self {
                family,
                link_direction: LinkDirection::Uplink,
                bandwidth_mhz: 10,
                modulation: Modulation::Qam256,
                subcarrier_spacing_khz: 30,
                resource_blocks: 24,
                resource_block_offset: 0,
                duplexing: Duplexing::Fdd,
            },
            SignalFamily::Lte => Self {
                family,
                link_direction: LinkDirection::Uplink,
                bandwidth_mhz: 20,
                modulation: Modulation::Qam256,
                subcarrier_spacing_khz: 15,
                resource_blocks: 100,
                resource_block_offset: 0,
                duplexing: Duplexing::Fdd,
            },
        }
    }
}

static NR5G_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^5GNR_(UL|DL)_(\d+)MHz_(QPSK|16QAM|64QAM|256QAM|1024QAM)_(\d+)kHz_(\d+)RB_(\d+)RBO\.(wv|dfl)$",
    )
    .expect("hard-coded grammar")
});

static LTE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^LTE_(UL|DL)_(\d+)MHz_(QPSK|QAM16|QAM64|QAM256)_(\d+)kHz_(\d+)RB_(\d+)RBO\.(wv|dfl)$",
    )
    .expect("hard-coded grammar")
});

fn grammar(family: SignalFamily) -> &'static Regex {
    match family {
        SignalFamily::Nr5g => &NR5G_NAME,
        SignalFamily::Lte => &LTE_NAME,
    }
}

/// Base file name of a path, trimmed. The grammar applies to the base name
/// only; directories are instrument-local and carry no parameters.
pub fn base_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
        .trim()
}

/// Checks a waveform or setup file name against the naming grammar,
/// including the extension expected for `kind`. Failing this check aborts
/// driver construction.
pub fn validate_file_name(family: SignalFamily, path: &str, kind: FileKind) -> BenchResult<()> {
    let name = base_name(path);
    let captures = grammar(family).captures(name).ok_or_else(|| {
        BenchError::Validation(format!("invalid {} file name: {name}", kind.label()))
    })?;
    let extension = captures.get(7).map(|m| m.as_str()).unwrap_or_default();
    if extension != kind.extension() {
        return Err(BenchError::Validation(format!(
            "{} file must use .{}: {name}",
            kind.label(),
            kind.extension()
        )));
    }
    Ok(())
}

/// Decodes a descriptor from a file name. Pure function of the string; no
/// instrument I/O. Returns `None` when the name does not match the grammar,
/// in which case callers use [`WaveformDescriptor::family_default`].
pub fn parse_file_name(family: SignalFamily, path: &str) -> Option<WaveformDescriptor> {
    let captures = grammar(family).captures(base_name(path))?;
    let link_direction = LinkDirection::from_token(captures.get(1)?.as_str())?;
    Some(WaveformDescriptor {
        family,
        link_direction,
        bandwidth_mhz: captures.get(2)?.as_str().parse().ok()?,
        modulation: Modulation::from_token(captures.get(3)?.as_str())?,
        subcarrier_spacing_khz: captures.get(4)?.as_str().parse().ok()?,
        resource_blocks: captures.get(5)?.as_str().parse().ok()?,
        resource_block_offset: captures.get(6)?.as_str().parse().ok()?,
        duplexing: Duplexing::for_direction(link_direction),
    })
}
