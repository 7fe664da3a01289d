// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rolling TAR containers.
//!
//! Records are bucketed per cache key, either the full
//! `(instance, type, mode, origin)` tuple or the origin alone. A bucket
//! is an open tar archive named after its first record; entries are
//! raw-encoded records (plus an XML sidecar entry for images) whose
//! header ModTime is the configured record epoch, never wall-clock.
//!
//! A bucket closes when its first-record timestamp ages past `interval`,
//! when `max-size` bytes have been written, or when no write has arrived
//! for `timeout`. Buckets that never received an entry are deleted on
//! close.

use crate::meta;
use crate::planner::{self, DirPlanner, Epoch};
use crate::share::Share;
use crate::{Control, Options, Storage, StoreError};
use chrono::{DateTime, Utc};
use hadock::{instance_name, Record};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const TAR: &str = ".tar";

const DEFAULT_INTERVAL: u64 = 60;
const DEFAULT_TIMEOUT: u64 = 60;

type Buckets = HashMap<String, Arc<Mutex<TarBucket>>>;

/// Time-rolled tar container sink.
pub struct TarStore {
    control: Control,
    datadir: DirPlanner,
    levels: Vec<String>,
    epoch: Epoch,
    interval: chrono::Duration,
    granularity: u64,
    max_size: u64,
    timeout: Duration,
    key_by_origin: bool,
    shares: Vec<Share>,
    files: Arc<Mutex<Buckets>>,
}

impl TarStore {
    pub fn new(opts: &Options) -> Result<Self, StoreError> {
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
        let epoch = Epoch::parse(&opts.epoch);
        let datadir = DirPlanner::new(opts.location.clone(), opts.levels.clone(), epoch, 0)?;
        let shares = opts
            .shares
            .iter()
            .map(|s| Share::new(s, interval))
            .collect::<Result<Vec<_>, _>>()?;

        let store = Self {
            control: opts.control.clone(),
            levels: datadir.levels().to_vec(),
            datadir,
            epoch,
            interval: chrono::Duration::seconds(interval as i64),
            granularity: interval,
            max_size: opts.max_size,
            timeout: Duration::from_secs(timeout),
            key_by_origin: opts.key == "origin",
            shares,
            files: Arc::new(Mutex::new(HashMap::new())),
        };
        store.spawn_sweeper()?;
        Ok(store)
    }

    fn cache_key(&self, instance: u8, rec: &Record) -> String {
        if self.key_by_origin {
            return rec.origin();
        }
        format!(
            "{}/{}/{}/{}",
            instance_name(instance),
            if rec.is_image() { "images" } else { "sciences" },
            if rec.is_realtime() {
                "realtime"
            } else {
                "playback"
            },
            rec.origin()
        )
    }

    fn bucket(
        &self,
        instance: u8,
        rec: &Record,
        when: DateTime<Utc>,
    ) -> Result<Arc<Mutex<TarBucket>>, StoreError> {
        let key = self.cache_key(instance, rec);
        let mut files = self.files.lock();

        let expired = files.get(&key).is_some_and(|b| {
            let g = b.lock();
            when - g.first >= self.interval || (self.max_size > 0 && g.bytes >= self.max_size)
        });
        if expired {
            if let Some(b) = files.remove(&key) {
                b.lock().close()?;
            }
        }
        if let Some(b) = files.get(&key) {
            return Ok(Arc::clone(b));
        }

        let dir = self.datadir.prepare(instance, rec)?;
        let path = dir.join(format!("{}{}", rec.filename(), TAR));
        let file = fs::File::create(&path)?;
        for share in &self.shares {
            share.link(&path, None, instance, rec)?;
        }
        let bucket = Arc::new(Mutex::new(TarBucket {
            path,
            builder: Some(tar::Builder::new(BufWriter::new(file))),
            first: when,
            last: Instant::now(),
            bytes: 0,
            count: 0,
        }));
        files.insert(key, Arc::clone(&bucket));
        Ok(bucket)
    }

    fn spawn_sweeper(&self) -> Result<(), StoreError> {
        let files = Arc::downgrade(&self.files);
        let timeout = self.timeout;
        thread::Builder::new()
            .name("hdk-tar-flush".to_string())
            .spawn(move || loop {
                thread::sleep(timeout);
                let Some(files) = files.upgrade() else {
                    break;
                };
                let mut idle = Vec::new();
                files.lock().retain(|_, b| {
                    let expired = b.lock().last.elapsed() > timeout;
                    if expired {
                        idle.push(Arc::clone(b));
                    }
                    !expired
                });
                for b in idle {
                    if let Err(e) = b.lock().close() {
                        tracing::warn!("closing tar bucket failed: {}", e);
                    }
                }
            })?;
        Ok(())
    }
}

impl Storage for TarStore {
    fn store(&self, instance: u8, rec: &Record) -> Result<(), StoreError> {
        if !self.control.accepts(rec) {
            return Ok(());
        }
        let when = self.epoch.time_of(rec);
        let bucket = self.bucket(instance, rec, when)?;
        let mut bucket = bucket.lock();

        let entry = planner::resolve_levels(
            Path::new(""),
            &self.levels,
            self.granularity,
            instance,
            rec,
            when,
        )
        .join(rec.filename());

        let mut buf = Vec::with_capacity(rec.body().len() + 64);
        rec.export_raw(&mut buf)?;
        bucket.append(&entry, when, &buf)?;

        if let Some(doc) = meta::image_metadata(rec) {
            let mut xml = entry.into_os_string();
            xml.push(crate::file::XML);
            bucket.append(Path::new(&xml), when, doc.as_bytes())?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut failed = None;
        let buckets: Vec<_> = self.files.lock().drain().map(|(_, b)| b).collect();
        for b in buckets {
            if let Err(e) = b.lock().close() {
                failed = Some(e);
            }
        }
        failed.map_or(Ok(()), Err)
    }
}

struct TarBucket {
    path: PathBuf,
    builder: Option<tar::Builder<BufWriter<fs::File>>>,
    first: DateTime<Utc>,
    last: Instant,
    bytes: u64,
    count: u64,
}

impl TarBucket {
    fn append(&mut self, name: &Path, when: DateTime<Utc>, data: &[u8]) -> Result<(), StoreError> {
        let Some(builder) = self.builder.as_mut() else {
            return Ok(());
        };
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_uid(1000);
        header.set_gid(1000);
        header.set_mtime(when.timestamp().max(0) as u64);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, name, data)?;

        self.bytes += data.len() as u64;
        self.count += 1;
        self.last = Instant::now();
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if let Some(builder) = self.builder.take() {
            let mut inner = builder.into_inner()?;
            inner.flush()?;
        }
        if self.count == 0 {
            let _ = fs::remove_file(&self.path);
        }
        Ok(())
    }
}
