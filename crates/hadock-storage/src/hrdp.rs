// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Continuously rolling HRDP binary log.
//!
//! Records are appended length-framed to a file named from the current
//! wall clock, `YYYY/DDD/HH/hdk_<seq>_MM-SS.bin`. The file rolls when
//! `interval` has elapsed, `max-size` is reached or no write has arrived
//! for `timeout`; files that never received a record are removed.
//!
//! Two wire formats:
//!
//! - `hadock`: big-endian summary header (instance, channel, realtime,
//!   origin, sequence, acquisition, 32-byte UPI) ahead of the
//!   raw-encoded record.
//! - `hrdp`: the ground-segment FSL framing. The leading size is
//!   little-endian while the embedded sync word stays big-endian; that
//!   mixing matches the receiving equipment and must stay bit-exact.

use crate::{Control, Options, Storage, StoreError};
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use chrono::{Datelike, Timelike, Utc};
use hadock::time::Time5;
use hadock::Record;
use parking_lot::Mutex;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const FSL_MAGIC: u8 = 2;

/// Fixed FSL header bytes between the size field and the sync word.
pub const HRDP_HEADER_LEN: usize = 14;

const DEFAULT_INTERVAL: u64 = 300;
const DEFAULT_TIMEOUT: u64 = 60;

/// On-disk record format of the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HrdpFormat {
    Hadock,
    #[default]
    Hrdl,
}

impl HrdpFormat {
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "hadock" => Ok(Self::Hadock),
            "" | "hrdp" | "vmu" => Ok(Self::Hrdl),
            other => Err(StoreError::UnknownFormat(other.to_string())),
        }
    }
}

/// Rolling length-framed binary log sink.
pub struct HrdpStore {
    control: Control,
    datadir: PathBuf,
    format: HrdpFormat,
    interval: Duration,
    max_size: u64,
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    file: Option<OpenFile>,
    seq: u64,
}

struct OpenFile {
    path: PathBuf,
    writer: BufWriter<fs::File>,
    opened: Instant,
    last: Instant,
    bytes: u64,
    count: u64,
}

impl HrdpStore {
    pub fn new(opts: &Options) -> Result<Self, StoreError> {
        let datadir = PathBuf::from(&opts.location);
        let md = fs::metadata(&datadir)?;
        if !md.is_dir() {
            return Err(StoreError::NotDirectory(datadir));
        }
        let interval = if opts.interval == 0 {
            DEFAULT_INTERVAL
        } else {
            opts.interval
        };
        let timeout = if opts.timeout == 0 {
            DEFAULT_TIMEOUT
        } else {
            opts.timeout
        };
        let store = Self {
            control: opts.control.clone(),
            datadir,
            format: HrdpFormat::parse(&opts.format)?,
            interval: Duration::from_secs(interval),
            max_size: opts.max_size,
            inner: Arc::new(Mutex::new(Inner { file: None, seq: 0 })),
        };
        store.spawn_sweeper(Duration::from_secs(timeout))?;
        Ok(store)
    }

    fn spawn_sweeper(&self, timeout: Duration) -> Result<(), StoreError> {
        let inner = Arc::downgrade(&self.inner);
        thread::Builder::new()
            .name("hdk-hrdp-flush".to_string())
            .spawn(move || loop {
                thread::sleep(timeout);
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let mut inner = inner.lock();
                let idle = inner
                    .file
                    .as_ref()
                    .is_some_and(|f| f.last.elapsed() > timeout);
                if idle {
                    if let Err(e) = close_file(&mut inner) {
                        tracing::warn!("closing hrdp file failed: {}", e);
                    }
                }
            })?;
        Ok(())
    }
}

impl Storage for HrdpStore {
    fn store(&self, instance: u8, rec: &Record) -> Result<(), StoreError> {
        if !self.control.accepts(rec) {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(rec.body().len() + 128);
        match self.format {
            HrdpFormat::Hadock => encode_hadock(&mut buf, instance, rec)?,
            HrdpFormat::Hrdl => encode_hrdl(&mut buf, rec)?,
        }

        let mut inner = self.inner.lock();
        let rolled = match &inner.file {
            None => true,
            Some(f) => {
                f.opened.elapsed() >= self.interval
                    || (self.max_size > 0 && f.bytes >= self.max_size)
            }
        };
        if rolled {
            close_file(&mut inner)?;
            open_file(&self.datadir, &mut inner)?;
        }
        let Some(f) = inner.file.as_mut() else {
            return Ok(());
        };
        f.writer.write_all(&buf)?;
        f.bytes += buf.len() as u64;
        f.count += 1;
        f.last = Instant::now();
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        close_file(&mut self.inner.lock())
    }
}

fn open_file(datadir: &std::path::Path, inner: &mut Inner) -> Result<(), StoreError> {
    let now = Utc::now();
    let dir = datadir
        .join(format!("{:04}", now.year()))
        .join(format!("{:03}", now.ordinal()))
        .join(format!("{:02}", now.hour()));
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!(
        "hdk_{:04}_{:02}-{:02}.bin",
        inner.seq,
        now.minute(),
        now.second()
    ));
    inner.seq += 1;
    let file = fs::File::create(&path)?;
    inner.file = Some(OpenFile {
        path,
        writer: BufWriter::new(file),
        opened: Instant::now(),
        last: Instant::now(),
        bytes: 0,
        count: 0,
    });
    Ok(())
}

fn close_file(inner: &mut Inner) -> Result<(), StoreError> {
    if let Some(mut f) = inner.file.take() {
        f.writer.flush()?;
        drop(f.writer);
        if f.count == 0 {
            let _ = fs::remove_file(&f.path);
        }
    }
    Ok(())
}

/// `[u32 length][instance][channel][realtime][origin][u32 sequence]
/// [u32 acquisition][32B upi][raw record]`, big-endian.
fn encode_hadock(buf: &mut Vec<u8>, instance: u8, rec: &Record) -> Result<(), StoreError> {
    let mut body = Vec::with_capacity(rec.body().len() + 64);
    body.push(instance);
    body.push(rec.channel());
    body.push(u8::from(rec.is_realtime()));
    body.push(rec.vmu().source);
    body.write_u32::<BigEndian>(rec.sequence())?;
    body.write_u32::<BigEndian>(rec.acq_timestamp().timestamp().max(0) as u32)?;

    let mut upi = [0u8; 32];
    if let Some(u) = rec.upi() {
        let bs = u.as_bytes();
        let n = bs.len().min(32);
        upi[..n].copy_from_slice(&bs[..n]);
    }
    body.extend_from_slice(&upi);
    rec.export_raw(&mut body)?;

    buf.write_u32::<BigEndian>(body.len() as u32)?;
    buf.extend_from_slice(&body);
    Ok(())
}

/// FSL framing around the HRDL wire image of the record. The size field
/// counts everything after itself.
fn encode_hrdl(buf: &mut Vec<u8>, rec: &Record) -> Result<(), StoreError> {
    let mut hrdl = Vec::with_capacity(rec.body().len() + 128);
    rec.export_hrdl(&mut hrdl)?;

    buf.write_u32::<LittleEndian>((HRDP_HEADER_LEN + hrdl.len()) as u32)?;
    buf.write_u16::<BigEndian>(0)?;
    buf.write_u8(FSL_MAGIC)?;
    buf.write_u8(rec.channel())?;

    let acq = Time5::from_utc(rec.acq_timestamp());
    buf.write_u32::<BigEndian>(acq.secs)?;
    buf.write_u8(acq.sub)?;
    let rx = Time5::from_utc(Utc::now());
    buf.write_u32::<BigEndian>(rx.secs)?;
    buf.write_u8(rx.sub)?;

    buf.extend_from_slice(&hrdl);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadock::record::{Sdh, SdhV2, VmuHeader};
    use hadock::SYNC_WORD;

    fn table(sequence: u32) -> Record {
        Record::Table {
            vmu: VmuHeader {
                channel: 3,
                source: 0x2f,
                sequence,
                coarse: 1000,
                fine: 0,
            },
            sdh: Sdh::V2(SdhV2 {
                acquisition: Time5::new(1000, 0),
                id: u32::from_be_bytes(*b"MMA "),
                ..SdhV2::default()
            }),
            body: vec![0x55; 100],
            valid: true,
        }
    }

    fn bin_files(dir: &std::path::Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(d) = stack.pop() {
            for e in fs::read_dir(&d).expect("read dir") {
                let p = e.expect("entry").path();
                if p.is_dir() {
                    stack.push(p);
                } else {
                    out.push(p);
                }
            }
        }
        out.sort();
        out
    }

    #[test]
    fn test_appends_length_framed_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = HrdpStore::new(&Options {
            scheme: "hrdp".into(),
            location: dir.path().display().to_string(),
            format: "hadock".into(),
            ..Options::default()
        })
        .expect("hrdp store");

        store.store(255, &table(1)).expect("store");
        store.store(255, &table(2)).expect("store");
        store.close().expect("close");

        let files = bin_files(dir.path());
        assert_eq!(files.len(), 1);

        let data = fs::read(&files[0]).expect("read");
        let len = u32::from_be_bytes(data[..4].try_into().expect("len")) as usize;
        assert_eq!(data[4], 255); // instance
        assert_eq!(data[5], 3); // channel
        assert_eq!(data[6], 0); // playback
        assert_eq!(data[7], 0x2f); // origin

        // Two records, framed back to back.
        let second = &data[4 + len..];
        let len2 = u32::from_be_bytes(second[..4].try_into().expect("len")) as usize;
        assert_eq!(second.len(), 4 + len2);
    }

    #[test]
    fn test_hrdl_format_framing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = HrdpStore::new(&Options {
            scheme: "hrdp".into(),
            location: dir.path().display().to_string(),
            format: "hrdp".into(),
            ..Options::default()
        })
        .expect("hrdp store");

        store.store(255, &table(1)).expect("store");
        store.close().expect("close");

        let data = fs::read(&bin_files(dir.path())[0]).expect("read");
        let size = u32::from_le_bytes(data[..4].try_into().expect("size")) as usize;
        assert_eq!(size, data.len() - 4);
        assert_eq!(data[6], FSL_MAGIC);
        assert_eq!(data[7], 3); // channel
        assert_eq!(&data[18..22], &SYNC_WORD);
    }

    #[test]
    fn test_max_size_rolls_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = HrdpStore::new(&Options {
            scheme: "hrdp".into(),
            location: dir.path().display().to_string(),
            format: "hadock".into(),
            max_size: 64,
            ..Options::default()
        })
        .expect("hrdp store");

        for i in 0..4 {
            store.store(255, &table(i)).expect("store");
        }
        store.close().expect("close");

        let files = bin_files(dir.path());
        assert_eq!(files.len(), 4);
        assert!(files.iter().all(|f| fs::metadata(f).expect("md").len() > 0));
    }

    #[test]
    fn test_filename_shape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = HrdpStore::new(&Options {
            scheme: "hrdp".into(),
            location: dir.path().display().to_string(),
            ..Options::default()
        })
        .expect("hrdp store");

        store.store(255, &table(1)).expect("store");
        store.close().expect("close");

        let files = bin_files(dir.path());
        let name = files[0].file_name().expect("name").to_string_lossy();
        assert!(name.starts_with("hdk_0000_"));
        assert!(name.ends_with(".bin"));

        // YYYY/DDD/HH ancestry.
        let rel = files[0].strip_prefix(dir.path()).expect("rel");
        assert_eq!(rel.components().count(), 4);
    }
}
