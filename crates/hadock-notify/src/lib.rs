// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Acquisition summary notifications.
//!
//! The [`pool::Pool`] aggregates decoded records per
//! `(realtime, origin, instance)` key over a tumbling interval and emits
//! one [`Message`] per group to the configured [`notifier::Notifier`]s.
//!
//! # Message wire format
//!
//! Big-endian throughout; strings are a `u16` length followed by the
//! bytes:
//!
//! ```text
//! origin str | sequence u32 | instance i32 | channel i32 |
//! realtime u8 | count u32 | elapsed_ns i64 | generated i64 |
//! acquired i64 | size i64 | bad i64 | reference str | upi str
//! ```

pub mod notifier;
pub mod pool;

pub use notifier::{AcceptRules, LogNotifier, Notifier, UdpNotifier};
pub use pool::{Item, Pool};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Summary of one aggregated acquisition group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub origin: String,
    pub sequence: u32,
    pub instance: i32,
    pub channel: i32,
    pub realtime: bool,
    pub count: u32,
    /// Span between the first and last record of the group.
    pub elapsed: Duration,
    /// VMU generation time of the first record, UNIX seconds.
    pub generated: i64,
    /// Acquisition time of the first record, UNIX seconds.
    pub acquired: i64,
    /// Total payload bytes over the group.
    pub size: i64,
    /// Records with a failing checksum.
    pub bad: i64,
    /// Filename of the first record.
    pub reference: String,
    pub upi: String,
}

impl Message {
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_string(w, &self.origin)?;
        w.write_u32::<BigEndian>(self.sequence)?;
        w.write_i32::<BigEndian>(self.instance)?;
        w.write_i32::<BigEndian>(self.channel)?;
        w.write_u8(u8::from(self.realtime))?;
        w.write_u32::<BigEndian>(self.count)?;
        w.write_i64::<BigEndian>(self.elapsed.as_nanos().min(i64::MAX as u128) as i64)?;
        w.write_i64::<BigEndian>(self.generated)?;
        w.write_i64::<BigEndian>(self.acquired)?;
        w.write_i64::<BigEndian>(self.size)?;
        w.write_i64::<BigEndian>(self.bad)?;
        write_string(w, &self.reference)?;
        write_string(w, &self.upi)
    }

    pub fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let origin = read_string(r)?;
        let sequence = r.read_u32::<BigEndian>()?;
        let instance = r.read_i32::<BigEndian>()?;
        let channel = r.read_i32::<BigEndian>()?;
        let realtime = r.read_u8()? != 0;
        let count = r.read_u32::<BigEndian>()?;
        let elapsed = Duration::from_nanos(r.read_i64::<BigEndian>()?.max(0) as u64);
        let generated = r.read_i64::<BigEndian>()?;
        let acquired = r.read_i64::<BigEndian>()?;
        let size = r.read_i64::<BigEndian>()?;
        let bad = r.read_i64::<BigEndian>()?;
        let reference = read_string(r)?;
        let upi = read_string(r)?;
        Ok(Self {
            origin,
            sequence,
            instance,
            channel,
            realtime,
            count,
            elapsed,
            generated,
            acquired,
            size,
            bad,
            reference,
            upi,
        })
    }

    /// Records per second over the group span; the count itself when the
    /// span is empty.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            f64::from(self.count) / secs
        } else {
            f64::from(self.count)
        }
    }
}

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let bs = s.as_bytes();
    w.write_u16::<BigEndian>(bs.len().min(u16::MAX as usize) as u16)?;
    w.write_all(&bs[..bs.len().min(u16::MAX as usize)])
}

fn read_string<R: Read>(r: &mut R) -> io::Result<String> {
    let n = r.read_u16::<BigEndian>()? as usize;
    let mut bs = vec![0u8; n];
    r.read_exact(&mut bs)?;
    Ok(String::from_utf8_lossy(&bs).into_owned())
}
