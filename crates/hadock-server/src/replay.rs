// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Replay HRDP archives over the network.
//!
//! Walks the given archives, splits them on their length-prefixed record
//! framing and sends each VMU packet as HADOCK frames at a token-bucket
//! limited rate.

use anyhow::Context;
use hadock::FrameWriter;
use hadock_storage::hrdp::HRDP_HEADER_LEN;
use std::fs;
use std::io::{self, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub struct ReplayOptions {
    pub addr: String,
    pub archives: Vec<PathBuf>,
    /// Bytes per second, e.g. `8M`. Zero disables the limiter.
    pub rate: String,
    /// v2 fragment size; zero sends whole v1 frames.
    pub chunk: usize,
    pub vmu_version: u8,
    pub instance: u8,
    /// Stop after this many packets; zero replays everything.
    pub count: u64,
}

pub fn run(opts: &ReplayOptions) -> anyhow::Result<()> {
    let rate = parse_size(&opts.rate)
        .with_context(|| format!("invalid rate {}", opts.rate))?;
    let stream = TcpStream::connect(&opts.addr)
        .with_context(|| format!("connecting to {}", opts.addr))?;
    let mut writer = FrameWriter::new(
        RateLimited::new(stream, rate),
        opts.vmu_version,
        opts.instance,
        opts.chunk,
    );

    let started = Instant::now();
    let (mut sent, mut bytes) = (0u64, 0u64);
    'archives: for root in &opts.archives {
        for file in files_under(root)? {
            let data = fs::read(&file)?;
            for packet in split_records(&data) {
                writer.send(&packet)?;
                sent += 1;
                bytes += packet.len() as u64;
                if opts.count > 0 && sent >= opts.count {
                    break 'archives;
                }
            }
        }
    }
    writer.flush()?;
    tracing::info!(
        "{} packets ({:.2}KB) processed in {:?}",
        sent,
        bytes as f64 / 1024.0,
        started.elapsed()
    );
    Ok(())
}

/// Every regular file under `root`, lexically ordered.
fn files_under(root: &Path) -> io::Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Split an HRDP archive into the VMU wire images of its records. The
/// FSL header, sync word, length and trailing HRDL sum of each record
/// are stripped; what remains is the packet the listener decodes.
pub(crate) fn split_records(data: &[u8]) -> Vec<Vec<u8>> {
    const PREFIX: usize = HRDP_HEADER_LEN + 8;
    let mut out = Vec::new();
    let mut pos = 0usize;
    while data.len().saturating_sub(pos) >= 4 {
        let size =
            u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let end = pos + 4 + size;
        if size < PREFIX + 4 || end > data.len() {
            break;
        }
        out.push(data[pos + 4 + PREFIX..end - 4].to_vec());
        pos = end;
    }
    out
}

/// Token-bucket pacing writer with a one second burst.
pub(crate) struct RateLimited<W> {
    inner: W,
    rate: f64,
    budget: f64,
    last: Instant,
}

impl<W: Write> RateLimited<W> {
    pub fn new(inner: W, rate: u64) -> Self {
        Self {
            inner,
            rate: rate as f64,
            budget: rate as f64,
            last: Instant::now(),
        }
    }
}

impl<W: Write> Write for RateLimited<W> {
    fn write(&mut self, bs: &[u8]) -> io::Result<usize> {
        if self.rate > 0.0 {
            self.budget += self.last.elapsed().as_secs_f64() * self.rate;
            self.last = Instant::now();
            if self.budget > self.rate {
                self.budget = self.rate;
            }
            let need = bs.len() as f64;
            if need > self.budget {
                thread::sleep(Duration::from_secs_f64((need - self.budget) / self.rate));
                self.last = Instant::now();
                self.budget = 0.0;
            } else {
                self.budget -= need;
            }
        }
        self.inner.write(bs)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Parse a byte size with an optional K/M/G suffix (binary units).
pub(crate) fn parse_size(s: &str) -> anyhow::Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }
    let (digits, mult) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 1u64 << 10),
        Some('m') | Some('M') => (&s[..s.len() - 1], 1u64 << 20),
        Some('g') | Some('G') => (&s[..s.len() - 1], 1u64 << 30),
        _ => (s, 1),
    };
    let value: u64 = digits.trim().parse()?;
    Ok(value * mult)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
    use hadock::record::{Record, Sdh, SdhV2, VmuHeader, VMU_PROTOCOL_2};
    use hadock::time::Time5;

    fn sample_table() -> Record {
        Record::Table {
            vmu: VmuHeader {
                channel: 3,
                source: 0x2f,
                sequence: 11,
                coarse: 2000,
                fine: 1,
            },
            sdh: Sdh::V2(SdhV2 {
                acquisition: Time5::new(2000, 0),
                id: u32::from_be_bytes(*b"MMA "),
                ..SdhV2::default()
            }),
            body: vec![0x42; 24],
            valid: true,
        }
    }

    /// One archive record as the HRDP sink writes it.
    fn archive_record(rec: &Record) -> Vec<u8> {
        let mut hrdl = Vec::new();
        rec.export_hrdl(&mut hrdl).expect("hrdl");

        let mut out = Vec::new();
        out.write_u32::<LittleEndian>((HRDP_HEADER_LEN + hrdl.len()) as u32)
            .expect("size");
        out.write_u16::<BigEndian>(0).expect("spare");
        out.push(2);
        out.push(3);
        out.extend_from_slice(&[0u8; 10]);
        out.extend_from_slice(&hrdl);
        out
    }

    #[test]
    fn test_split_records_yields_decodable_packets() {
        let rec = sample_table();
        let mut archive = archive_record(&rec);
        archive.extend_from_slice(&archive_record(&rec));

        let packets = split_records(&archive);
        assert_eq!(packets.len(), 2);

        let back = Record::decode(VMU_PROTOCOL_2, &packets[0], true).expect("decode");
        assert_eq!(back.sequence(), 11);
        assert_eq!(back.body(), rec.body());
    }

    #[test]
    fn test_split_records_stops_on_truncation() {
        let rec = sample_table();
        let mut archive = archive_record(&rec);
        let cut = archive.len() - 10;
        archive.extend_from_slice(&archive_record(&rec)[..cut.min(20)]);

        let packets = split_records(&archive);
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("8M").expect("8M"), 8 << 20);
        assert_eq!(parse_size("512k").expect("512k"), 512 << 10);
        assert_eq!(parse_size("1G").expect("1G"), 1 << 30);
        assert_eq!(parse_size("1000").expect("plain"), 1000);
        assert!(parse_size("eight").is_err());
    }

    #[test]
    fn test_rate_limiter_paces_writes() {
        let rate = 50_000u64;
        let mut w = RateLimited::new(io::sink(), rate);

        let chunk = vec![0u8; 25_000];
        let started = Instant::now();
        for _ in 0..3 {
            w.write_all(&chunk).expect("write");
        }
        // 75 KB at 50 KB/s with a 50 KB burst needs roughly half a second.
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[test]
    fn test_rate_limiter_unlimited() {
        let mut w = RateLimited::new(io::sink(), 0);
        let started = Instant::now();
        w.write_all(&vec![0u8; 1 << 20]).expect("write");
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
