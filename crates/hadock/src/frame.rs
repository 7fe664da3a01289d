// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HADOCK transport frame scanner and writer.
//!
//! # Wire layout
//!
//! ```text
//! +0  u32  preamble = 0xF82E3553                      big-endian
//! +4  u16  version  ( hdk:4 | vmu:4 | instance:8 )    big-endian
//! +6  u16  counter          (v1) | fragment_index (v2)
//! +8  u16  -                     | fragment_total (v2)
//! +10 u16  -                     | counter        (v2)
//! +8/+12 u32 length
//! +.. [length] payload
//! +.. u16  checksum (one's-complement sum, preamble..payload)
//! ```
//!
//! The reader resynchronizes on the preamble after any structural damage,
//! marks frames with a failing checksum `valid = false` instead of
//! dropping them, reassembles v2 fragments, and ends cleanly at EOF.

use crate::checksum::{self, Sum16};
use byteorder::{BigEndian, WriteBytesExt};
use flate2::read::GzDecoder;
use std::io::{self, BufRead, BufReader, Read, Write};
use thiserror::Error;

/// HRDL frame boundary marker.
pub const PREAMBLE: u32 = 0xF82E_3553;

/// [`PREAMBLE`] as wire bytes.
pub const SYNC_WORD: [u8; 4] = [0xF8, 0x2E, 0x35, 0x53];

pub const HADOCK_VERSION_1: u8 = 1;
pub const HADOCK_VERSION_2: u8 = 2;

/// Length fields beyond this are treated as stream desynchronization.
pub const MAX_PAYLOAD: usize = 16 << 20;

/// Pack a frame version word.
pub fn pack_version(hadock: u8, vmu: u8, instance: u8) -> u16 {
    u16::from(hadock & 0xF) << 12 | u16::from(vmu & 0xF) << 8 | u16::from(instance)
}

/// Split a frame version word into (hadock, vmu, instance).
pub fn split_version(word: u16) -> (u8, u8, u8) {
    ((word >> 12) as u8 & 0xF, (word >> 8) as u8 & 0xF, word as u8)
}

/// A VMU packet recovered from the transport stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// VMU protocol version nibble of the version word.
    pub vmu_version: u8,
    /// Producer instance byte of the version word.
    pub instance: u8,
    pub counter: u16,
    /// `(index, total)` for an unmerged v2 fragment, `None` otherwise.
    pub fragment: Option<(u16, u16)>,
    pub payload: Vec<u8>,
    /// Checksum verdict. Bad frames still flow downstream.
    pub valid: bool,
}

/// Transport encoding of the byte source feeding a [`FrameReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReaderMode {
    /// Plain framed stream.
    #[default]
    Binary,
    /// RFC 1952 compressed stream.
    Gzip,
    /// Framed stream that may or may not be gzip-wrapped; sniffed from
    /// the first two bytes.
    BinaryGzip,
}

#[derive(Debug, Error)]
#[error("unsupported working mode {0}")]
pub struct UnknownMode(String);

impl std::str::FromStr for ReaderMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "binary" => Ok(Self::Binary),
            "gzip" | "rfc1952" => Ok(Self::Gzip),
            "binary+gzip" => Ok(Self::BinaryGzip),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

impl ReaderMode {
    /// Wrap a raw byte source according to the mode.
    pub fn wrap(self, r: impl Read + Send + 'static) -> Box<dyn Read + Send> {
        match self {
            Self::Binary => Box::new(BufReader::new(r)),
            Self::Gzip => Box::new(GzDecoder::new(BufReader::new(r))),
            Self::BinaryGzip => {
                let mut br = BufReader::new(r);
                let gzipped = br
                    .fill_buf()
                    .map(|b| b.starts_with(&[0x1f, 0x8b]))
                    .unwrap_or(false);
                if gzipped {
                    Box::new(GzDecoder::new(br))
                } else {
                    Box::new(br)
                }
            }
        }
    }
}

enum Scan {
    Frame(Frame),
    Desync,
    Eof,
}

struct Pending {
    vmu_version: u8,
    instance: u8,
    counter: u16,
    total: u16,
    next: u16,
    payload: Vec<u8>,
    valid: bool,
}

/// Scans a byte source for HADOCK frames.
pub struct FrameReader<R> {
    inner: R,
    instances: Vec<u8>,
    pending: Option<Pending>,
    done: bool,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            instances: Vec::new(),
            pending: None,
            done: false,
        }
    }

    /// Restrict emission to the given instances. An empty list accepts
    /// everything.
    pub fn with_instances(mut self, instances: Vec<u8>) -> Self {
        self.instances = instances;
        self
    }

    fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        loop {
            if !self.sync()? {
                return Ok(None);
            }
            let raw = match self.read_frame()? {
                Scan::Eof => return Ok(None),
                Scan::Desync => continue,
                Scan::Frame(f) => f,
            };
            if !self.instances.is_empty() && !self.instances.contains(&raw.instance) {
                continue;
            }
            if let Some(frame) = self.merge(raw) {
                return Ok(Some(frame));
            }
        }
    }

    /// Scan forward to the next preamble. Returns false at EOF.
    fn sync(&mut self) -> io::Result<bool> {
        let mut w = [0u8; 4];
        if !read_full(&mut self.inner, &mut w)? {
            return Ok(false);
        }
        while w != SYNC_WORD {
            let mut b = [0u8; 1];
            if !read_full(&mut self.inner, &mut b)? {
                return Ok(false);
            }
            w.copy_within(1.., 0);
            w[3] = b[0];
        }
        Ok(true)
    }

    fn read_frame(&mut self) -> io::Result<Scan> {
        let mut head = [0u8; 2];
        if !read_full(&mut self.inner, &mut head)? {
            return Ok(Scan::Eof);
        }
        let (hadock, vmu_version, instance) = split_version(u16::from_be_bytes(head));

        let mut sum = Sum16::new();
        sum.write(&SYNC_WORD);
        sum.write(&head);

        let (counter, fragment, length) = match hadock {
            HADOCK_VERSION_1 => {
                let mut rest = [0u8; 6];
                if !read_full(&mut self.inner, &mut rest)? {
                    return Ok(Scan::Eof);
                }
                sum.write(&rest);
                let counter = u16::from_be_bytes([rest[0], rest[1]]);
                let length = u32::from_be_bytes([rest[2], rest[3], rest[4], rest[5]]);
                (counter, None, length as usize)
            }
            HADOCK_VERSION_2 => {
                let mut rest = [0u8; 10];
                if !read_full(&mut self.inner, &mut rest)? {
                    return Ok(Scan::Eof);
                }
                sum.write(&rest);
                let index = u16::from_be_bytes([rest[0], rest[1]]);
                let total = u16::from_be_bytes([rest[2], rest[3]]);
                let counter = u16::from_be_bytes([rest[4], rest[5]]);
                let length = u32::from_be_bytes([rest[6], rest[7], rest[8], rest[9]]);
                (counter, Some((index, total)), length as usize)
            }
            _ => return Ok(Scan::Desync),
        };

        if length > MAX_PAYLOAD {
            return Ok(Scan::Desync);
        }
        let mut payload = vec![0u8; length];
        if !read_full(&mut self.inner, &mut payload)? {
            return Ok(Scan::Eof);
        }
        sum.write(&payload);

        let mut ck = [0u8; 2];
        if !read_full(&mut self.inner, &mut ck)? {
            return Ok(Scan::Eof);
        }
        let valid = u16::from_be_bytes(ck) == sum.sum();

        Ok(Scan::Frame(Frame {
            vmu_version,
            instance,
            counter,
            fragment,
            payload,
            valid,
        }))
    }

    /// Fold v2 fragments back into whole packets. A fragment that does
    /// not continue the pending sequence drops the partial packet.
    fn merge(&mut self, raw: Frame) -> Option<Frame> {
        let Some((index, total)) = raw.fragment else {
            return Some(raw);
        };
        if total <= 1 {
            return Some(Frame {
                fragment: None,
                ..raw
            });
        }
        if index == 0 {
            self.pending = Some(Pending {
                vmu_version: raw.vmu_version,
                instance: raw.instance,
                counter: raw.counter,
                total,
                next: 1,
                payload: raw.payload,
                valid: raw.valid,
            });
            return None;
        }
        let mut p = self.pending.take()?;
        if p.counter != raw.counter || p.total != total || p.next != index {
            return None;
        }
        p.payload.extend_from_slice(&raw.payload);
        p.valid &= raw.valid;
        p.next += 1;
        if p.next == total {
            return Some(Frame {
                vmu_version: p.vmu_version,
                instance: p.instance,
                counter: p.counter,
                fragment: None,
                payload: p.payload,
                valid: p.valid,
            });
        }
        self.pending = Some(p);
        None
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = io::Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match r.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Writes VMU payloads as HADOCK frames, v1 whole or v2 fragmented.
pub struct FrameWriter<W> {
    inner: W,
    version: u16,
    chunk: usize,
    counter: u16,
}

impl<W: Write> FrameWriter<W> {
    /// `chunk == 0` selects whole v1 frames; otherwise payloads are split
    /// into v2 fragments of at most `chunk` bytes.
    pub fn new(inner: W, vmu_version: u8, instance: u8, chunk: usize) -> Self {
        let hadock = if chunk == 0 {
            HADOCK_VERSION_1
        } else {
            HADOCK_VERSION_2
        };
        Self {
            inner,
            version: pack_version(hadock, vmu_version, instance),
            chunk,
            counter: 0,
        }
    }

    pub fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        if self.chunk == 0 {
            self.send_v1(payload)?;
        } else {
            self.send_v2(payload)?;
        }
        self.counter = self.counter.wrapping_add(1);
        Ok(())
    }

    fn send_v1(&mut self, payload: &[u8]) -> io::Result<()> {
        let mut buf = Vec::with_capacity(14 + payload.len());
        buf.write_u32::<BigEndian>(PREAMBLE)?;
        buf.write_u16::<BigEndian>(self.version)?;
        buf.write_u16::<BigEndian>(self.counter)?;
        buf.write_u32::<BigEndian>(payload.len() as u32)?;
        buf.extend_from_slice(payload);
        let sum = checksum::sum16(&buf);
        buf.write_u16::<BigEndian>(sum)?;
        self.inner.write_all(&buf)
    }

    fn send_v2(&mut self, payload: &[u8]) -> io::Result<()> {
        let total = payload.len().div_ceil(self.chunk).max(1);
        for i in 0..total {
            let part = &payload[i * self.chunk..payload.len().min((i + 1) * self.chunk)];
            let mut buf = Vec::with_capacity(18 + part.len());
            buf.write_u32::<BigEndian>(PREAMBLE)?;
            buf.write_u16::<BigEndian>(self.version)?;
            buf.write_u16::<BigEndian>(i as u16)?;
            buf.write_u16::<BigEndian>(total as u16)?;
            buf.write_u16::<BigEndian>(self.counter)?;
            buf.write_u32::<BigEndian>(part.len() as u32)?;
            buf.extend_from_slice(part);
            let sum = checksum::sum16(&buf);
            buf.write_u16::<BigEndian>(sum)?;
            self.inner.write_all(&buf)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frames(bytes: Vec<u8>) -> Vec<Frame> {
        FrameReader::new(Cursor::new(bytes))
            .collect::<io::Result<Vec<_>>>()
            .expect("read frames")
    }

    #[test]
    fn test_version_word() {
        let word = pack_version(2, 1, 255);
        assert_eq!(split_version(word), (2, 1, 255));
        assert_eq!(word, 0x21FF);
    }

    #[test]
    fn test_v1_roundtrip() {
        let mut w = FrameWriter::new(Vec::new(), 2, 255, 0);
        w.send(b"hello vmu").expect("send");
        let fs = frames(w.into_inner());

        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].vmu_version, 2);
        assert_eq!(fs[0].instance, 255);
        assert_eq!(fs[0].counter, 0);
        assert_eq!(fs[0].payload, b"hello vmu");
        assert!(fs[0].valid);
    }

    #[test]
    fn test_v2_fragments_reassembled() {
        let payload: Vec<u8> = (0..100u8).collect();
        let mut w = FrameWriter::new(Vec::new(), 2, 1, 32);
        w.send(&payload).expect("send");
        let fs = frames(w.into_inner());

        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].payload, payload);
        assert_eq!(fs[0].fragment, None);
        assert!(fs[0].valid);
    }

    #[test]
    fn test_counter_increments_across_sends() {
        let mut w = FrameWriter::new(Vec::new(), 1, 0, 0);
        w.send(b"a").expect("send");
        w.send(b"b").expect("send");
        let fs = frames(w.into_inner());

        assert_eq!(fs.len(), 2);
        assert_eq!(fs[0].counter, 0);
        assert_eq!(fs[1].counter, 1);
        assert_eq!(fs[0].payload, b"a");
        assert_eq!(fs[1].payload, b"b");
    }

    #[test]
    fn test_resync_skips_garbage() {
        let mut w = FrameWriter::new(Vec::new(), 2, 255, 0);
        w.send(b"payload").expect("send");
        let mut bytes = vec![0xde, 0xad, 0xbe, 0xef, 0x00, 0xf8];
        bytes.extend_from_slice(&w.into_inner());

        let fs = frames(bytes);
        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].payload, b"payload");
    }

    #[test]
    fn test_bad_checksum_flags_frame() {
        let mut w = FrameWriter::new(Vec::new(), 2, 255, 0);
        w.send(b"payload").expect("send");
        let mut bytes = w.into_inner();
        let n = bytes.len();
        bytes[n - 1] ^= 0xff;

        let fs = frames(bytes);
        assert_eq!(fs.len(), 1);
        assert!(!fs[0].valid);
        assert_eq!(fs[0].payload, b"payload");
    }

    #[test]
    fn test_instance_filter_discards() {
        let mut w = FrameWriter::new(Vec::new(), 2, 3, 0);
        w.send(b"skipped").expect("send");
        let mut w = FrameWriter::new(w.into_inner(), 2, 255, 0);
        w.send(b"kept").expect("send");

        let fs: Vec<Frame> = FrameReader::new(Cursor::new(w.into_inner()))
            .with_instances(vec![255])
            .collect::<io::Result<Vec<_>>>()
            .expect("read frames");

        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].payload, b"kept");
    }

    #[test]
    fn test_gzip_mode() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut w = FrameWriter::new(Vec::new(), 2, 255, 0);
        w.send(b"compressed").expect("send");

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&w.into_inner()).expect("compress");
        let gz = enc.finish().expect("finish");

        let reader = ReaderMode::Gzip.wrap(Cursor::new(gz));
        let fs: Vec<Frame> = FrameReader::new(reader)
            .collect::<io::Result<Vec<_>>>()
            .expect("read frames");

        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].payload, b"compressed");
    }

    #[test]
    fn test_binary_gzip_sniffs_plain_stream() {
        let mut w = FrameWriter::new(Vec::new(), 2, 255, 0);
        w.send(b"plain").expect("send");

        let reader = ReaderMode::BinaryGzip.wrap(Cursor::new(w.into_inner()));
        let fs: Vec<Frame> = FrameReader::new(reader)
            .collect::<io::Result<Vec<_>>>()
            .expect("read frames");

        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].payload, b"plain");
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("binary".parse::<ReaderMode>().unwrap(), ReaderMode::Binary);
        assert_eq!("gzip".parse::<ReaderMode>().unwrap(), ReaderMode::Gzip);
        assert_eq!(
            "binary+gzip".parse::<ReaderMode>().unwrap(),
            ReaderMode::BinaryGzip
        );
        assert!("mystery".parse::<ReaderMode>().is_err());
    }

    #[test]
    fn test_eof_ends_stream() {
        let fs = frames(Vec::new());
        assert!(fs.is_empty());

        // Truncated frame: preamble and half a header only.
        let fs = frames(vec![0xF8, 0x2E, 0x35, 0x53, 0x21]);
        assert!(fs.is_empty());
    }
}
