//! Proxi wire protocol - proximity zones, verdict packets and signal samples
//!
//! Client → Beacon: a UTF-8 decimal integer (the RSSI the client observes).
//! Beacon → Client: `DATA_PACKET: <TAG>` or `DATA_PACKET: <TAG> | POINTS:<n>`.

pub mod gatt;

use std::fmt;

/// Samples strictly above this are ultra close
pub const ULTRA_CLOSE_THRESHOLD: i32 = -20;

/// Samples strictly above this (and not ultra close) are in the standard zone
pub const STANDARD_THRESHOLD: i32 = -60;

/// Points sent with an ultra close verdict. Negative is a penalty.
pub const DEFAULT_ULTRA_CLOSE_POINTS: i32 = -3;

pub const PACKET_PREFIX: &str = "DATA_PACKET: ";
pub const POINTS_MARKER: &str = "POINTS:";
pub const FIELD_SEPARATOR: &str = " | ";

pub const TAG_ULTRA_CLOSE: &str = "ULTRA_CLOSE_PROXIMITY";
pub const TAG_STANDARD: &str = "STANDARD_ZONE";
pub const TAG_WEAK: &str = "WEAK_SIGNAL_IDLE";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    #[error("empty signal sample")]
    EmptySample,
    #[error("invalid signal sample: {0:?}")]
    InvalidSample(String),
    #[error("invalid points payload: {0:?}")]
    InvalidPoints(String),
}

/// One RSSI reading in dBm, as sent by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalSample(i32);

impl SignalSample {
    pub fn new(dbm: i32) -> Self {
        Self(dbm)
    }

    pub fn dbm(&self) -> i32 {
        self.0
    }

    /// Wire form: bare decimal integer, no delimiter
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_string().into_bytes()
    }

    /// Parse a written sample. Surrounding whitespace and trailing NULs
    /// (some stacks pad C strings) are tolerated, anything else is not.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtoError> {
        let text = String::from_utf8_lossy(data);
        let text = text.trim_end_matches('\0').trim();
        if text.is_empty() {
            return Err(ProtoError::EmptySample);
        }
        text.parse::<i32>()
            .map(Self)
            .map_err(|_| ProtoError::InvalidSample(text.to_string()))
    }
}

impl From<i16> for SignalSample {
    fn from(dbm: i16) -> Self {
        Self(dbm as i32)
    }
}

impl fmt::Display for SignalSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proximity zone, ordered from weakest to strongest signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProximityZone {
    Weak,
    Standard,
    UltraClose,
}

impl ProximityZone {
    /// Fixed thresholds, first match wins
    pub fn classify(sample: SignalSample) -> Self {
        let dbm = sample.dbm();
        if dbm > ULTRA_CLOSE_THRESHOLD {
            ProximityZone::UltraClose
        } else if dbm > STANDARD_THRESHOLD {
            ProximityZone::Standard
        } else {
            ProximityZone::Weak
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ProximityZone::UltraClose => TAG_ULTRA_CLOSE,
            ProximityZone::Standard => TAG_STANDARD,
            ProximityZone::Weak => TAG_WEAK,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            TAG_ULTRA_CLOSE => Some(ProximityZone::UltraClose),
            TAG_STANDARD => Some(ProximityZone::Standard),
            TAG_WEAK => Some(ProximityZone::Weak),
            _ => None,
        }
    }

    /// Level of the beacon's external indicator for this zone
    pub fn indicator_active(&self) -> bool {
        !matches!(self, ProximityZone::Weak)
    }
}

impl fmt::Display for ProximityZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Beacon's answer to one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub zone: ProximityZone,
    /// Nonzero only for ultra close
    pub point_delta: i32,
}

impl Verdict {
    pub fn for_sample(sample: SignalSample, ultra_close_points: i32) -> Self {
        let zone = ProximityZone::classify(sample);
        let point_delta = match zone {
            ProximityZone::UltraClose => ultra_close_points,
            ProximityZone::Standard | ProximityZone::Weak => 0,
        };
        Self { zone, point_delta }
    }

    pub fn tag(&self) -> &'static str {
        self.zone.tag()
    }

    /// Ultra close verdicts always carry the points field, even when zero
    pub fn to_packet(&self) -> String {
        match self.zone {
            ProximityZone::UltraClose => format!(
                "{PACKET_PREFIX}{}{FIELD_SEPARATOR}{POINTS_MARKER}{}",
                self.tag(),
                self.point_delta
            ),
            ProximityZone::Standard | ProximityZone::Weak => {
                format!("{PACKET_PREFIX}{}", self.tag())
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_packet().into_bytes()
    }
}

/// Verdict notification as seen by the client
///
/// The client never trusts the packet to be well formed: authorization looks
/// for the ultra close tag anywhere in the text and points are read from
/// whatever follows the `POINTS:` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdictPacket {
    text: String,
}

impl VerdictPacket {
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            text: String::from_utf8_lossy(data).trim_end_matches('\0').to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_ultra_close(&self) -> bool {
        self.text.contains(TAG_ULTRA_CLOSE)
    }

    /// Zone named by a well formed packet, None on a protocol mismatch
    pub fn zone(&self) -> Option<ProximityZone> {
        let body = self.text.strip_prefix(PACKET_PREFIX)?;
        let tag = body.split(FIELD_SEPARATOR).next()?.trim();
        ProximityZone::from_tag(tag)
    }

    /// None if there is no `POINTS:` marker
    pub fn points(&self) -> Option<Result<i32, ProtoError>> {
        let (_, rest) = self.text.split_once(POINTS_MARKER)?;
        let raw = rest
            .split(|c: char| c.is_whitespace() || c == '|')
            .next()
            .unwrap_or_default();
        Some(
            raw.parse::<i32>()
                .map_err(|_| ProtoError::InvalidPoints(raw.to_string())),
        )
    }
}

impl fmt::Display for VerdictPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
