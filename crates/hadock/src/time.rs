// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! GPS-epoch timestamp handling.
//!
//! VMU timestamps are carried as coarse seconds since the GPS epoch
//! (1980-01-06T00:00:00Z) plus a fine part in 1/256 s units. Secondary
//! headers and the HRDP container carry a packed 5-byte form, [`Time5`].

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::io::{self, Read, Write};

/// UNIX timestamp of the GPS epoch, 1980-01-06T00:00:00Z.
pub const GPS_EPOCH_UNIX: i64 = 315_964_800;

/// GPS-UTC offset applied when labelling generation times.
pub const LEAP_SECONDS: i64 = 18;

const NANOS_PER_TICK: u32 = 1_000_000_000 / 256;

/// Convert a coarse/fine GPS stamp to UTC.
pub fn to_utc(coarse: u32, fine: u8) -> DateTime<Utc> {
    let secs = GPS_EPOCH_UNIX + i64::from(coarse);
    let nanos = u32::from(fine) * NANOS_PER_TICK;
    Utc.timestamp_opt(secs, nanos).single().unwrap_or_default()
}

/// Apply the GPS-UTC leap offset to a generation timestamp.
pub fn adjust_generation(t: DateTime<Utc>) -> DateTime<Utc> {
    t - Duration::seconds(LEAP_SECONDS)
}

/// Packed 5-byte GPS stamp: 32-bit seconds plus one byte of 1/256 s.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Time5 {
    pub secs: u32,
    pub sub: u8,
}

impl Time5 {
    pub fn new(secs: u32, sub: u8) -> Self {
        Self { secs, sub }
    }

    /// Split a UTC timestamp into its packed form. Times before the GPS
    /// epoch clamp to zero.
    pub fn from_utc(t: DateTime<Utc>) -> Self {
        let secs = (t.timestamp() - GPS_EPOCH_UNIX).clamp(0, i64::from(u32::MAX)) as u32;
        let sub = (t.timestamp_subsec_nanos() / NANOS_PER_TICK).min(255) as u8;
        Self { secs, sub }
    }

    pub fn to_utc(self) -> DateTime<Utc> {
        to_utc(self.secs, self.sub)
    }

    /// Whole seconds since the UNIX epoch.
    pub fn unix(self) -> i64 {
        GPS_EPOCH_UNIX + i64::from(self.secs)
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            secs: r.read_u32::<LittleEndian>()?,
            sub: r.read_u8()?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.secs)?;
        w.write_u8(self.sub)
    }
}
