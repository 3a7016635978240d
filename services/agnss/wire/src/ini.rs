//! Initial time and position messages.
//!
//! Builders for UBX-MGA-INI-TIME-UTC and UBX-MGA-INI-POS-LLH, and in-place
//! rewriting of the time carried by an MGA-INI-TIME-UTC or legacy AID-INI
//! frame that leads an assistance blob.

use crate::codec::FrameBuilder;
use crate::frame::{rewrite_checksum, Frame};
use crate::header::{aid, class, ini_type, mga, HEADER_SIZE};
use crate::WireError;
use bytes::Bytes;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Payload length of MGA-INI-TIME-UTC
pub const INI_TIME_UTC_LEN: usize = 24;
/// Payload length of MGA-INI-POS-LLH
pub const INI_POS_LLH_LEN: usize = 20;
/// Payload length of AID-INI
pub const AID_INI_LEN: usize = 48;

/// Leap seconds value meaning "unknown"
const LEAP_SECS_UNKNOWN: i8 = -128;

/// AID-INI flag: UTC time fields are valid
const AID_INI_FLAG_UTC: u32 = 0x400;

/// Uncertainty of a supplied time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeAccuracy {
    /// Whole seconds
    pub seconds: u16,
    /// Additional milliseconds
    pub millis: u16,
}

impl TimeAccuracy {
    /// Create an accuracy from seconds and milliseconds
    pub fn new(seconds: u16, millis: u16) -> Self {
        Self { seconds, millis }
    }

    fn nanos(&self) -> u32 {
        u32::from(self.millis) * 1_000_000
    }

    fn total_millis(&self) -> u32 {
        u32::from(self.seconds) * 1000 + u32::from(self.millis)
    }
}

/// Correction applied to the leading time message of an assistance blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAdjust {
    /// Replace the embedded time with this UTC time
    Absolute {
        /// UTC date and time
        utc: NaiveDateTime,
        /// Time uncertainty
        accuracy: TimeAccuracy,
    },
    /// Shift the embedded time by a signed offset (MGA only)
    Relative(Duration),
}

/// Initial position in geodetic coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PosLlh {
    /// Latitude in degrees
    pub lat_deg: f64,
    /// Longitude in degrees
    pub lon_deg: f64,
    /// Altitude in centimetres
    pub alt_cm: i32,
    /// Position accuracy in centimetres
    pub acc_cm: u32,
}

/// Whether `frame` is a message that carries the receiver's initial time
pub fn is_initial_time(frame: &Frame<'_>) -> bool {
    match (frame.class(), frame.id()) {
        (class::MGA, mga::INI) => frame.payload().first() == Some(&ini_type::TIME_UTC),
        (class::AID, aid::INI) => true,
        _ => false,
    }
}

/// Build a UBX-MGA-INI-TIME-UTC frame
pub fn mga_ini_time_utc(utc: &NaiveDateTime, accuracy: TimeAccuracy) -> Result<Bytes, WireError> {
    let mut payload = [0u8; INI_TIME_UTC_LEN];
    payload[0] = ini_type::TIME_UTC;
    payload[3] = LEAP_SECS_UNKNOWN as u8;
    write_utc_fields(&mut payload, utc)?;
    write_accuracy_fields(&mut payload, accuracy);

    FrameBuilder::new(class::MGA, mga::INI).part(&payload).build()
}

/// Build a UBX-MGA-INI-POS-LLH frame
pub fn mga_ini_pos_llh(pos: &PosLlh) -> Result<Bytes, WireError> {
    let mut payload = [0u8; INI_POS_LLH_LEN];
    payload[0] = ini_type::POS_LLH;
    let lat = degrees_e7(pos.lat_deg, 90.0, "latitude")?;
    let lon = degrees_e7(pos.lon_deg, 180.0, "longitude")?;
    payload[4..8].copy_from_slice(&lat.to_le_bytes());
    payload[8..12].copy_from_slice(&lon.to_le_bytes());
    payload[12..16].copy_from_slice(&pos.alt_cm.to_le_bytes());
    payload[16..20].copy_from_slice(&pos.acc_cm.to_le_bytes());

    FrameBuilder::new(class::MGA, mga::INI).part(&payload).build()
}

/// Degrees scaled to 1e-7 units; `limit` bounds the absolute value
fn degrees_e7(value: f64, limit: f64, field: &'static str) -> Result<i32, WireError> {
    if !value.is_finite() || value.abs() > limit {
        return Err(WireError::OutOfRange(field));
    }
    Ok((value * 1e7).round() as i32)
}

/// Rewrite the time of an initial-time frame in place and fix its checksum
pub fn adjust_time(frame: &mut [u8], adjust: &TimeAdjust) -> Result<(), WireError> {
    let (msg_class, msg_id, payload_len) = {
        let parsed = Frame::parse_exact(frame)?;
        if !is_initial_time(&parsed) {
            return Err(WireError::Unsupported("not an initial time message"));
        }
        (parsed.class(), parsed.id(), parsed.payload().len())
    };

    let end = frame.len() - 2;
    let payload = &mut frame[HEADER_SIZE..end];

    match (msg_class, msg_id) {
        (class::MGA, mga::INI) => {
            if payload_len < INI_TIME_UTC_LEN {
                return Err(WireError::PayloadTooShort);
            }
            match adjust {
                TimeAdjust::Absolute { utc, accuracy } => {
                    write_utc_fields(payload, utc)?;
                    write_accuracy_fields(payload, *accuracy);
                }
                TimeAdjust::Relative(offset) => {
                    let current = read_utc_fields(payload)?;
                    let shifted = current
                        .checked_add_signed(*offset)
                        .ok_or(WireError::Unsupported("time offset out of range"))?;
                    write_utc_fields(payload, &shifted)?;
                }
            }
        }
        _ => {
            if payload_len < AID_INI_LEN {
                return Err(WireError::PayloadTooShort);
            }
            match adjust {
                TimeAdjust::Absolute { utc, accuracy } => {
                    let year = utc.year() - 2000;
                    if !(0..=255).contains(&year) {
                        return Err(WireError::Unsupported("year outside AID-INI range"));
                    }
                    payload[18] = utc.month() as u8;
                    payload[19] = year as u8;
                    payload[20] = utc.second() as u8;
                    payload[21] = utc.minute() as u8;
                    payload[22] = utc.hour() as u8;
                    payload[23] = utc.day() as u8;
                    payload[28..32].copy_from_slice(&accuracy.total_millis().to_le_bytes());
                    payload[32..36].copy_from_slice(&0u32.to_le_bytes());
                    let flags = u32::from_le_bytes([payload[44], payload[45], payload[46], payload[47]])
                        | AID_INI_FLAG_UTC;
                    payload[44..48].copy_from_slice(&flags.to_le_bytes());
                }
                TimeAdjust::Relative(_) => {
                    return Err(WireError::Unsupported("relative AID-INI time adjustment"));
                }
            }
        }
    }

    rewrite_checksum(frame);
    Ok(())
}

fn write_utc_fields(payload: &mut [u8], utc: &NaiveDateTime) -> Result<(), WireError> {
    let year = u16::try_from(utc.year()).map_err(|_| WireError::Unsupported("negative year"))?;
    payload[4..6].copy_from_slice(&year.to_le_bytes());
    payload[6] = utc.month() as u8;
    payload[7] = utc.day() as u8;
    payload[8] = utc.hour() as u8;
    payload[9] = utc.minute() as u8;
    payload[10] = utc.second() as u8;
    Ok(())
}

fn write_accuracy_fields(payload: &mut [u8], accuracy: TimeAccuracy) {
    payload[16..18].copy_from_slice(&accuracy.seconds.to_le_bytes());
    payload[20..24].copy_from_slice(&accuracy.nanos().to_le_bytes());
}

fn read_utc_fields(payload: &[u8]) -> Result<NaiveDateTime, WireError> {
    let year = u16::from_le_bytes([payload[4], payload[5]]);
    NaiveDate::from_ymd_opt(i32::from(year), u32::from(payload[6]), u32::from(payload[7]))
        .and_then(|d| {
            d.and_hms_opt(
                u32::from(payload[8]),
                u32::from(payload[9]),
                u32::from(payload[10]),
            )
        })
        .ok_or(WireError::Unsupported("invalid time in MGA-INI-TIME-UTC"))
}
