// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Storage fan-out for decoded VMU records.
//!
//! A sink implements [`Storage`]; heterogeneous sinks are combined with
//! [`MultiStore`], which invokes every sink for every record and reports
//! the last failure without aborting the others. Available sinks:
//!
//! - [`file::FileStore`]: one file per record under a planned directory
//!   tree, with optional link mirrors and XML sidecars
//! - [`archive::TarStore`]: time-rolled tar containers per origin key
//! - [`hrdp::HrdpStore`]: continuously rolling length-framed binary log

pub mod archive;
pub mod control;
pub mod file;
pub mod hrdp;
mod meta;
pub mod planner;
pub mod share;

pub use control::Control;
pub use planner::{DirPlanner, Epoch};

use hadock::Record;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}: not a directory")]
    NotDirectory(PathBuf),
    #[error("{0}: unrecognized storage type")]
    UnknownScheme(String),
    #[error("{0}: unrecognized storage format")]
    UnknownFormat(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The packet-store contract.
pub trait Storage: Send + Sync {
    fn store(&self, instance: u8, rec: &Record) -> Result<(), StoreError>;

    /// Flush and release held resources. Sinks without rolling state use
    /// the default no-op.
    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Decoded per-sink configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Options {
    #[serde(rename = "type")]
    pub scheme: String,
    pub location: String,
    #[serde(default)]
    pub levels: Vec<String>,
    /// Which timestamp drives date path tokens and container ModTime:
    /// `vmu` or `acq`.
    #[serde(default, rename = "time")]
    pub epoch: String,
    /// File sink: minute granularity in seconds. Rolling sinks: roll
    /// interval in seconds.
    #[serde(default)]
    pub interval: u64,
    #[serde(default)]
    pub format: String,
    #[serde(default, rename = "keep-bad")]
    pub keep_bad: bool,
    #[serde(default)]
    pub control: Control,
    #[serde(default, rename = "share")]
    pub shares: Vec<ShareOptions>,
    #[serde(default, rename = "max-size")]
    pub max_size: u64,
    /// Idle seconds after which rolling containers are closed.
    #[serde(default)]
    pub timeout: u64,
    /// TAR bucket key: `classic` (instance/type/mode/origin) or `origin`.
    #[serde(default)]
    pub key: String,
}

/// Mirror tree configuration of a `share` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShareOptions {
    pub location: String,
    #[serde(default)]
    pub levels: Vec<String>,
    #[serde(default, rename = "time")]
    pub epoch: String,
    /// `hard` or `soft`.
    #[serde(default)]
    pub link: String,
}

/// Build the sink described by `opts`.
pub fn open(opts: &Options) -> Result<Box<dyn Storage>, StoreError> {
    match opts.scheme.as_str() {
        "file" => Ok(Box::new(file::FileStore::new(opts)?)),
        "tar" => Ok(Box::new(archive::TarStore::new(opts)?)),
        "hrdp" => Ok(Box::new(hrdp::HrdpStore::new(opts)?)),
        other => Err(StoreError::UnknownScheme(other.to_string())),
    }
}

/// Ordered fan-out over a set of sinks.
pub struct MultiStore {
    sinks: Vec<Box<dyn Storage>>,
}

impl MultiStore {
    pub fn new(sinks: Vec<Box<dyn Storage>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Storage for MultiStore {
    fn store(&self, instance: u8, rec: &Record) -> Result<(), StoreError> {
        let mut failed = None;
        for sink in &self.sinks {
            if let Err(e) = sink.store(instance, rec) {
                tracing::warn!("storing VMU packet {} failed: {}", rec.filename(), e);
                failed = Some(e);
            }
        }
        failed.map_or(Ok(()), Err)
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut failed = None;
        for sink in &self.sinks {
            if let Err(e) = sink.close() {
                failed = Some(e);
            }
        }
        failed.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadock::record::{Sdh, SdhV2, VmuHeader};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sample_record() -> Record {
        Record::Table {
            vmu: VmuHeader {
                channel: 3,
                source: 0x2f,
                sequence: 1,
                coarse: 1000,
                fine: 0,
            },
            sdh: Sdh::V2(SdhV2::default()),
            body: vec![1, 2, 3],
            valid: true,
        }
    }

    struct CountingSink {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Storage for CountingSink {
        fn store(&self, _instance: u8, _rec: &Record) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::StorageFull,
                    "no space left on device",
                )))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_fanout_invokes_every_sink() {
        let calls: Vec<Arc<AtomicUsize>> =
            (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let sinks: Vec<Box<dyn Storage>> = calls
            .iter()
            .enumerate()
            .map(|(i, c)| {
                Box::new(CountingSink {
                    calls: Arc::clone(c),
                    fail: i == 1,
                }) as Box<dyn Storage>
            })
            .collect();

        let ms = MultiStore::new(sinks);
        let err = ms.store(255, &sample_record());

        assert!(err.is_err());
        for c in &calls {
            assert_eq!(c.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_fanout_last_error_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sinks: Vec<Box<dyn Storage>> = vec![
            Box::new(CountingSink {
                calls: Arc::clone(&calls),
                fail: true,
            }),
            Box::new(CountingSink {
                calls: Arc::clone(&calls),
                fail: false,
            }),
        ];
        let ms = MultiStore::new(sinks);

        // The failure of the first sink survives the success of the last.
        assert!(ms.store(0, &sample_record()).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_open_rejects_unknown_scheme() {
        let opts = Options {
            scheme: "ftp".into(),
            ..Options::default()
        };
        assert!(matches!(open(&opts), Err(StoreError::UnknownScheme(_))));
    }
}
