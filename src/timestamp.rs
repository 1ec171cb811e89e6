//! Codec for the order backend's opaque binary timestamps.
//!
//! Layout (all integers big-endian):
//!
//! | bytes | meaning                                         |
//! |-------|-------------------------------------------------|
//! | 1     | version, `1` or `2`                             |
//! | 8     | seconds since 0001-01-01T00:00:00Z              |
//! | 4     | nanoseconds                                     |
//! | 2     | zone offset in minutes, `-1` for UTC            |
//! | 1     | zone offset seconds (version `2` only)          |
//!
//! The offset only describes the zone the instant was recorded in; the instant
//! itself is fully determined by the seconds and nanoseconds.

use chrono::{DateTime, Utc};

use crate::error::ServiceError;

const VERSION_V1: u8 = 1;
const VERSION_V2: u8 = 2;
const V1_LEN: usize = 15;
const V2_LEN: usize = 16;
const UTC_OFFSET: i16 = -1;

/// Seconds between 0001-01-01T00:00:00Z and the Unix epoch.
const UNIX_TO_INTERNAL: i64 = 62_135_596_800;

pub fn encode(instant: &DateTime<Utc>) -> Vec<u8> {
    let seconds = instant.timestamp() + UNIX_TO_INTERNAL;
    let nanos = instant.timestamp_subsec_nanos();

    let mut buf = Vec::with_capacity(V1_LEN);
    buf.push(VERSION_V1);
    buf.extend_from_slice(&seconds.to_be_bytes());
    buf.extend_from_slice(&nanos.to_be_bytes());
    buf.extend_from_slice(&UTC_OFFSET.to_be_bytes());
    buf
}

pub fn decode(bytes: &[u8]) -> Result<DateTime<Utc>, ServiceError> {
    let (&version, _) = bytes
        .split_first()
        .ok_or_else(|| ServiceError::decode("timestamp is empty"))?;

    let expected = match version {
        VERSION_V1 => V1_LEN,
        VERSION_V2 => V2_LEN,
        other => {
            return Err(ServiceError::decode(format!(
                "unsupported timestamp version {other}"
            )));
        }
    };
    if bytes.len() != expected {
        return Err(ServiceError::decode(format!(
            "timestamp version {version} must be {expected} bytes, got {}",
            bytes.len()
        )));
    }

    let seconds = i64::from_be_bytes(read_array(&bytes[1..9]));
    let nanos = u32::from_be_bytes(read_array(&bytes[9..13]));
    if nanos >= 1_000_000_000 {
        return Err(ServiceError::decode(format!(
            "timestamp nanoseconds out of range: {nanos}"
        )));
    }

    seconds
        .checked_sub(UNIX_TO_INTERNAL)
        .and_then(|unix| DateTime::from_timestamp(unix, nanos))
        .ok_or_else(|| ServiceError::decode(format!("timestamp seconds out of range: {seconds}")))
}

fn read_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}
