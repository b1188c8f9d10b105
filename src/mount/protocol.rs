//! Motor controller wire format.
//!
//! Every exchange is a fixed size command frame, optionally answered by a
//! fixed size response frame:
//!
//! | Command | Frame                                                          |
//! |---------|----------------------------------------------------------------|
//! | STATUS  | `57 00 00 00 00 00 00 00 00 00 00 1F 20`                       |
//! | STOP    | `57 00 00 00 00 00 00 00 00 00 00 0F 20`                       |
//! | SET     | `57 a4 a3 a2 a1 ph e4 e3 e2 e1 pv 2F 20` (ASCII digits)        |
//!
//! Responses are `echo h t u d ph h t u d pv end` with raw digit bytes,
//! `angle = 100h + 10t + u + d/10 - 360`. SET is never answered.
use crate::{
    error::{CommunicationError, RangeError},
    mount::{MountLimits, Pointing},
};

/// Command frame length
pub const COMMAND_LEN: usize = 13;
/// Response frame length
pub const RESPONSE_LEN: usize = 12;

const START: u8 = 0x57;
const END: u8 = 0x20;
/// Offset applied to angles on the wire, so they remain positive
const ANGLE_OFFSET_DEG: f64 = 360.0;
/// Largest value a 4 digit field can carry
const MAX_FIELD: i64 = 9999;

pub type Command = [u8; COMMAND_LEN];
pub type Response = [u8; RESPONSE_LEN];

/// Command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Stop = 0x0F,
    Status = 0x1F,
    Set = 0x2F,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;
    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x0F => Ok(Self::Stop),
            0x1F => Ok(Self::Status),
            0x2F => Ok(Self::Set),
            other => Err(other),
        }
    }
}

/// Commands the mount answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Reports the current position
    Status,
    /// Halts both axes and reports where they stopped
    Stop,
}

impl Query {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Status => Opcode::Status,
            Self::Stop => Opcode::Stop,
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Status => write!(f, "STATUS"),
            Self::Stop => write!(f, "STOP"),
        }
    }
}

/// Decoded STATUS/STOP response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Reported position
    pub pointing: Pointing,
    /// Reported pulse resolution
    pub pulse: u8,
}

/// Encodes a STATUS or STOP frame
pub fn encode_query(query: Query) -> Command {
    let mut frame = [0u8; COMMAND_LEN];
    frame[0] = START;
    frame[11] = query.opcode() as u8;
    frame[12] = END;
    frame
}

/// Returns the 4 ASCII digits of `round(pulse * (angle + 360))`
fn ascii_field(angle_deg: f64, pulse: u8) -> Result<[u8; 4], RangeError> {
    let value = (pulse as f64 * (angle_deg + ANGLE_OFFSET_DEG)).round() as i64;
    if !(0..=MAX_FIELD).contains(&value) {
        return Err(RangeError::DigitOverflow(value));
    }
    Ok([
        b'0' + (value / 1000) as u8,
        b'0' + (value / 100 % 10) as u8,
        b'0' + (value / 10 % 10) as u8,
        b'0' + (value % 10) as u8,
    ])
}

/// Encodes a SET frame, driving the mount to `target`
pub fn encode_set(target: Pointing, pulse: u8, limits: &MountLimits) -> Result<Command, RangeError> {
    if pulse == 0 {
        return Err(RangeError::NullPulse);
    }
    limits.check(&target)?;
    let az = ascii_field(target.azimuth_deg, pulse)?;
    let el = ascii_field(target.elevation_deg, pulse)?;
    let mut frame = [0u8; COMMAND_LEN];
    frame[0] = START;
    frame[1..5].copy_from_slice(&az);
    frame[5] = pulse;
    frame[6..10].copy_from_slice(&el);
    frame[10] = pulse;
    frame[11] = Opcode::Set as u8;
    frame[12] = END;
    Ok(frame)
}

/// Decodes a SET frame into (target, pulse). Returns None if this is not
/// a valid SET frame.
pub fn decode_set(frame: &Command) -> Option<(Pointing, u8)> {
    if frame[0] != START || frame[11] != Opcode::Set as u8 || frame[12] != END {
        return None;
    }
    let pulse = frame[5];
    if pulse == 0 || frame[10] != pulse {
        return None;
    }
    let field = |digits: &[u8]| -> Option<f64> {
        digits.iter().try_fold(0.0, |acc, d| {
            d.is_ascii_digit().then(|| acc * 10.0 + (d - b'0') as f64)
        })
    };
    let az = field(&frame[1..5])? / pulse as f64 - ANGLE_OFFSET_DEG;
    let el = field(&frame[6..10])? / pulse as f64 - ANGLE_OFFSET_DEG;
    Some((Pointing::new(az, el), pulse))
}

fn raw_angle(digits: &[u8]) -> f64 {
    100.0 * digits[0] as f64 + 10.0 * digits[1] as f64 + digits[2] as f64 + digits[3] as f64 / 10.0
        - ANGLE_OFFSET_DEG
}

/// Decodes a STATUS/STOP response
pub fn decode_response(bytes: &[u8]) -> Result<Reading, CommunicationError> {
    if bytes.len() < RESPONSE_LEN {
        return Err(CommunicationError::ShortRead {
            expected: RESPONSE_LEN,
            got: bytes.len(),
        });
    }
    let (horizontal, vertical) = (bytes[5], bytes[10]);
    if horizontal != vertical {
        return Err(CommunicationError::PulseMismatch {
            horizontal,
            vertical,
        });
    }
    Ok(Reading {
        pointing: Pointing::new(raw_angle(&bytes[1..5]), raw_angle(&bytes[6..10])),
        pulse: horizontal,
    })
}

/// Raw digits of `(angle + 360)` at 0.1° resolution
fn raw_field(angle_deg: f64) -> [u8; 4] {
    let tenths = ((angle_deg + ANGLE_OFFSET_DEG) * 10.0).round().clamp(0.0, MAX_FIELD as f64) as u16;
    [
        (tenths / 1000) as u8,
        (tenths / 100 % 10) as u8,
        (tenths / 10 % 10) as u8,
        (tenths % 10) as u8,
    ]
}

/// Encodes the response a mount at `reading` sends back.
pub fn encode_response(echo: u8, reading: &Reading) -> Response {
    let mut frame = [0u8; RESPONSE_LEN];
    frame[0] = echo;
    frame[1..5].copy_from_slice(&raw_field(reading.pointing.azimuth_deg));
    frame[5] = reading.pulse;
    frame[6..10].copy_from_slice(&raw_field(reading.pointing.elevation_deg));
    frame[10] = reading.pulse;
    frame[11] = END;
    frame
}
