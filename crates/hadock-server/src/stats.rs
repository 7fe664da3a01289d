// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion counters.
//!
//! A process-wide [`Stats`] registry backed by atomics, a periodic
//! reporter that logs-and-resets when anything moved, and an optional
//! TCP listener serving a JSON snapshot per connection.

use serde::Serialize;
use std::io::{self, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Stats {
    total: AtomicU64,
    images: AtomicU64,
    sciences: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
    bytes: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub total: u64,
    pub images: u64,
    pub sciences: u64,
    pub skipped: u64,
    pub errors: u64,
    pub bytes: u64,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.total == 0 && self.skipped == 0 && self.errors == 0
    }
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) {
        self.images.fetch_add(1, Ordering::Relaxed);
    }

    pub fn science(&self) {
        self.sciences.fetch_add(1, Ordering::Relaxed);
    }

    /// A record made it into the pipeline.
    pub fn forwarded(&self, payload: usize) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(payload as u64, Ordering::Relaxed);
    }

    /// A record was dropped on a full channel.
    pub fn skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            total: self.total.load(Ordering::Relaxed),
            images: self.images.load(Ordering::Relaxed),
            sciences: self.sciences.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    fn drain(&self) -> Snapshot {
        Snapshot {
            total: self.total.swap(0, Ordering::Relaxed),
            images: self.images.swap(0, Ordering::Relaxed),
            sciences: self.sciences.swap(0, Ordering::Relaxed),
            skipped: self.skipped.swap(0, Ordering::Relaxed),
            errors: self.errors.swap(0, Ordering::Relaxed),
            bytes: self.bytes.swap(0, Ordering::Relaxed),
        }
    }
}

/// Log a one-line digest every `every`, resetting the counters. Quiet
/// intervals log nothing.
pub fn spawn_reporter(stats: Arc<Stats>, every: Duration) -> io::Result<()> {
    thread::Builder::new()
        .name("hdk-stats".to_string())
        .spawn(move || loop {
            thread::sleep(every);
            let s = stats.drain();
            if s.is_empty() {
                continue;
            }
            tracing::info!(
                "{:6} total, {:6} images, {:6} sciences, {:6} skipped, {:6} errors, {:7}KB",
                s.total,
                s.images,
                s.sciences,
                s.skipped,
                s.errors,
                s.bytes >> 10
            );
        })?;
    Ok(())
}

/// Serve the current snapshot as one JSON line per connection.
pub fn spawn_monitor(addr: &str, stats: Arc<Stats>) -> io::Result<()> {
    spawn_monitor_on(TcpListener::bind(addr)?, stats)
}

fn spawn_monitor_on(listener: TcpListener, stats: Arc<Stats>) -> io::Result<()> {
    thread::Builder::new()
        .name("hdk-monitor".to_string())
        .spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else {
                    continue;
                };
                let Ok(mut body) = serde_json::to_vec(&stats.snapshot()) else {
                    continue;
                };
                body.push(b'\n');
                let _ = stream.write_all(&body);
            }
        })?;
    Ok(())
}
