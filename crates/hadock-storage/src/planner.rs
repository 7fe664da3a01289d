// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Directory planning from configurable level tokens.
//!
//! A storage path is the left-to-right concatenation of level tokens:
//!
//! | Token | Expansion |
//! |---|---|
//! | `classic` | `instance/type/mode/source` |
//! | `upi` | trimmed UPI, spaces as `-`, else `IMAGES`/`SCIENCES` |
//! | `instance` | `TEST`, `SIM1`, `SIM2`, `OPS`, `DATA-n` |
//! | `type` | `images` or `sciences` |
//! | `mode` | `realtime` or `playback` |
//! | `source` | record origin |
//! | `year`/`doy`/`hour`/`minute` | `%04d`/`%03d`/`%02d`/`%02d` |
//! | `vmu` | `year/doy/hour/minute` on the VMU timestamp |
//! | `acq` | `year/doy/hour/minute` on the acquisition timestamp |
//!
//! Unrecognized tokens pass through as literal path segments. `minute`
//! is truncated to the configured granularity and omitted without one.
//!
//! [`DirPlanner`] adds a bounded cache of created directories; a
//! background sweeper evicts entries idle for five minutes so a stale
//! entry costs at most one extra `mkdir`.

use crate::StoreError;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use hadock::{instance_name, time as htime, Record};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const LEVEL_CLASSIC: &str = "classic";
pub const LEVEL_UPI: &str = "upi";
pub const LEVEL_SOURCE: &str = "source";
pub const LEVEL_INSTANCE: &str = "instance";
pub const LEVEL_TYPE: &str = "type";
pub const LEVEL_MODE: &str = "mode";
pub const LEVEL_YEAR: &str = "year";
pub const LEVEL_DOY: &str = "doy";
pub const LEVEL_HOUR: &str = "hour";
pub const LEVEL_MIN: &str = "minute";
pub const LEVEL_VMU_TIME: &str = "vmu";
pub const LEVEL_ACQ_TIME: &str = "acq";

const CACHE_TTL: Duration = Duration::from_secs(300);
const SWEEP_EVERY: Duration = Duration::from_secs(60);

/// Which record timestamp drives the date tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Epoch {
    #[default]
    Vmu,
    Acq,
}

impl Epoch {
    pub fn parse(s: &str) -> Self {
        match s {
            "acq" => Self::Acq,
            _ => Self::Vmu,
        }
    }

    /// Reference time of a record under this epoch. VMU generation times
    /// carry the GPS leap offset.
    pub fn time_of(self, rec: &Record) -> DateTime<Utc> {
        match self {
            Self::Vmu => htime::adjust_generation(rec.timestamp()),
            Self::Acq => rec.acq_timestamp(),
        }
    }
}

/// Pure path computation from level tokens.
pub fn resolve_levels(
    base: &Path,
    levels: &[String],
    granularity: u64,
    instance: u8,
    rec: &Record,
    t: DateTime<Utc>,
) -> PathBuf {
    let mut base = base.to_path_buf();
    for level in levels {
        match level.to_ascii_lowercase().as_str() {
            LEVEL_CLASSIC => {
                let ns = [
                    LEVEL_INSTANCE.to_string(),
                    LEVEL_TYPE.to_string(),
                    LEVEL_MODE.to_string(),
                    LEVEL_SOURCE.to_string(),
                ];
                base = resolve_levels(&base, &ns, granularity, instance, rec, t);
            }
            LEVEL_UPI => base.push(upi_dir(rec)),
            LEVEL_INSTANCE => base.push(instance_name(instance)),
            LEVEL_TYPE => base.push(if rec.is_image() { "images" } else { "sciences" }),
            LEVEL_MODE => base.push(if rec.is_realtime() {
                "realtime"
            } else {
                "playback"
            }),
            LEVEL_SOURCE => base.push(rec.origin()),
            LEVEL_YEAR => base.push(format!("{:04}", t.year())),
            LEVEL_DOY => base.push(format!("{:03}", t.ordinal())),
            LEVEL_HOUR => base.push(format!("{:02}", t.hour())),
            LEVEL_MIN => {
                if granularity > 0 {
                    base.push(format!("{:02}", truncate(t, granularity).minute()));
                }
            }
            LEVEL_VMU_TIME => {
                let when = htime::adjust_generation(rec.timestamp());
                base = resolve_date(&base, granularity, instance, rec, when);
            }
            LEVEL_ACQ_TIME => {
                let when = rec.acq_timestamp();
                base = resolve_date(&base, granularity, instance, rec, when);
            }
            _ => base.push(level),
        }
    }
    base
}

fn resolve_date(
    base: &Path,
    granularity: u64,
    instance: u8,
    rec: &Record,
    t: DateTime<Utc>,
) -> PathBuf {
    let ns = [
        LEVEL_YEAR.to_string(),
        LEVEL_DOY.to_string(),
        LEVEL_HOUR.to_string(),
        LEVEL_MIN.to_string(),
    ];
    resolve_levels(base, &ns, granularity, instance, rec, t)
}

fn truncate(t: DateTime<Utc>, granularity: u64) -> DateTime<Utc> {
    let secs = t.timestamp();
    let g = granularity as i64;
    Utc.timestamp_opt(secs - secs.rem_euclid(g), 0)
        .single()
        .unwrap_or(t)
}

fn upi_dir(rec: &Record) -> String {
    match rec.upi() {
        Some(u) => u.replace(' ', "-"),
        None if rec.is_image() => "IMAGES".to_string(),
        None => "SCIENCES".to_string(),
    }
}

/// Level-token planner with a mkdir cache.
pub struct DirPlanner {
    base: PathBuf,
    levels: Vec<String>,
    epoch: Epoch,
    granularity: u64,
    cache: Arc<Mutex<HashMap<PathBuf, Instant>>>,
}

impl DirPlanner {
    /// `base` must be an existing directory. Empty `levels` default to
    /// `classic/vmu`.
    pub fn new(
        base: impl Into<PathBuf>,
        levels: Vec<String>,
        epoch: Epoch,
        granularity: u64,
    ) -> Result<Self, StoreError> {
        let base = base.into();
        let md = fs::metadata(&base)?;
        if !md.is_dir() {
            return Err(StoreError::NotDirectory(base));
        }
        let levels = check_levels(levels);
        let cache = Arc::new(Mutex::new(HashMap::new()));
        spawn_sweeper(&cache)?;
        Ok(Self {
            base,
            levels,
            epoch,
            granularity,
            cache,
        })
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Path of a record, without touching the filesystem.
    pub fn resolve(&self, instance: u8, rec: &Record) -> PathBuf {
        resolve_levels(
            &self.base,
            &self.levels,
            self.granularity,
            instance,
            rec,
            self.epoch.time_of(rec),
        )
    }

    /// Resolve and create the directory. Creation is skipped for paths
    /// seen recently.
    pub fn prepare(&self, instance: u8, rec: &Record) -> Result<PathBuf, StoreError> {
        let dir = self.resolve(instance, rec);
        let mut cache = self.cache.lock();
        if !cache.contains_key(&dir) {
            fs::create_dir_all(&dir)?;
        }
        cache.insert(dir.clone(), Instant::now());
        Ok(dir)
    }
}

fn check_levels(levels: Vec<String>) -> Vec<String> {
    let levels: Vec<String> = levels.into_iter().filter(|l| !l.is_empty()).collect();
    if levels.is_empty() {
        vec![LEVEL_CLASSIC.to_string(), LEVEL_VMU_TIME.to_string()]
    } else {
        levels
    }
}

fn spawn_sweeper(cache: &Arc<Mutex<HashMap<PathBuf, Instant>>>) -> Result<(), StoreError> {
    let cache = Arc::downgrade(cache);
    thread::Builder::new()
        .name("hdk-dircache".to_string())
        .spawn(move || loop {
            thread::sleep(SWEEP_EVERY);
            let Some(cache) = cache.upgrade() else {
                break;
            };
            cache.lock().retain(|_, last| last.elapsed() < CACHE_TTL);
        })?;
    Ok(())
}
