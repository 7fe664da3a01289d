// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The ingestion pipeline.
//!
//! One thread per accepted connection drives the frame reader (with an
//! optional tee to the cascading proxy); frames funnel into a bounded
//! channel consumed by the converter, which decodes them into records
//! and forwards `(instance, record)` items to the store workers with a
//! non-blocking send. Workers run the storage fan-out and hand the
//! record to the notification pool. Per-connection ordering is
//! preserved by the blocking frame channel.

use crate::config::Config;
use crate::stats::{self, Stats};
use crossbeam::channel::{bounded, Receiver, Sender};
use hadock::{Frame, FrameReader, Record};
use hadock_cascade::{Level, Proxy};
use hadock_notify::{Item, Pool};
use hadock_storage::Storage;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const KEEPALIVE: Duration = Duration::from_secs(90);
const RECV_BUFFER: usize = 8 << 20;
const STORE_WORKERS: usize = 4;

pub fn run(cfg: &Config) -> anyhow::Result<()> {
    cfg.validate()?;
    let listener = TcpListener::bind(&cfg.address)?;
    tracing::info!("listening on {}", cfg.address);
    serve(listener, cfg)
}

pub(crate) fn serve(listener: TcpListener, cfg: &Config) -> anyhow::Result<()> {
    let mode = cfg.reader_mode()?;
    let store: Arc<dyn Storage> = Arc::new(cfg.build_storage()?);
    let pool = Arc::new(cfg.build_pool()?);
    let stats = Arc::new(Stats::new());

    if let Some(addr) = &cfg.monitor {
        stats::spawn_monitor(addr, Arc::clone(&stats))?;
    }
    stats::spawn_reporter(Arc::clone(&stats), Duration::from_secs(1))?;

    let depth = cfg.buffer.max(1);
    let (frame_tx, frame_rx) = bounded::<Frame>(depth);
    let (item_tx, item_rx) = bounded::<Item>(depth);

    {
        let stats = Arc::clone(&stats);
        thread::Builder::new()
            .name("hdk-convert".to_string())
            .spawn(move || convert(frame_rx, item_tx, stats))?;
    }
    for i in 0..STORE_WORKERS {
        let rx = item_rx.clone();
        let store = Arc::clone(&store);
        let pool = Arc::clone(&pool);
        thread::Builder::new()
            .name(format!("hdk-store-{}", i))
            .spawn(move || store_loop(rx, store, pool))?;
    }
    drop(item_rx);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("accept failed: {}", e);
                continue;
            }
        };
        if let Err(e) = configure(&stream) {
            tracing::warn!("tuning connection failed: {}", e);
        }
        let tx = frame_tx.clone();
        let instances = cfg.instances.clone();
        let proxy = cfg.proxy.clone();
        thread::Builder::new()
            .name("hdk-conn".to_string())
            .spawn(move || {
                let peer = stream
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                tracing::info!("connection from {}", peer);

                let source: Box<dyn Read + Send> = if proxy.address.is_empty() {
                    Box::new(stream)
                } else {
                    match Proxy::dial(&proxy.address, Level::parse(&proxy.level), proxy.size) {
                        Ok(p) => Box::new(Tee::new(stream, p)),
                        Err(e) => {
                            tracing::warn!("dialing proxy {} failed: {}", proxy.address, e);
                            Box::new(stream)
                        }
                    }
                };
                let reader = FrameReader::new(mode.wrap(source)).with_instances(instances);
                for frame in reader {
                    match frame {
                        Ok(f) => {
                            if tx.send(f).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("connection {}: {}", peer, e);
                            return;
                        }
                    }
                }
                tracing::info!("connection closed: {}", peer);
            })?;
    }
    Ok(())
}

/// Keep-alive and a large receive buffer on every accepted connection.
fn configure(stream: &TcpStream) -> io::Result<()> {
    let sock = socket2::SockRef::from(stream);
    sock.set_tcp_keepalive(&socket2::TcpKeepalive::new().with_time(KEEPALIVE))?;
    sock.set_recv_buffer_size(RECV_BUFFER)
}

fn convert(rx: Receiver<Frame>, tx: Sender<Item>, stats: Arc<Stats>) {
    for frame in rx {
        let rec = match Record::decode(frame.vmu_version, &frame.payload, frame.valid) {
            Ok(rec) => rec,
            Err(e) => {
                stats.error();
                tracing::warn!("decoding VMU packet failed: {}", e);
                continue;
            }
        };
        if rec.is_image() {
            stats.image();
        } else {
            stats.science();
        }
        let item = Item {
            instance: i32::from(frame.instance),
            record: Arc::new(rec),
        };
        if tx.try_send(item).is_ok() {
            stats.forwarded(frame.payload.len());
        } else {
            stats.skip();
        }
    }
}

fn store_loop(rx: Receiver<Item>, store: Arc<dyn Storage>, pool: Arc<Pool>) {
    for item in rx {
        if let Err(e) = store.store(item.instance as u8, &item.record) {
            tracing::warn!(
                "storing VMU packet {} failed: {}",
                item.record.filename(),
                e
            );
        }
        pool.notify(item);
    }
}

/// Duplicates everything read from `inner` into `sink`, best-effort.
struct Tee<R, W> {
    inner: R,
    sink: W,
}

impl<R, W> Tee<R, W> {
    fn new(inner: R, sink: W) -> Self {
        Self { inner, sink }
    }
}

impl<R: Read, W: Write> Read for Tee<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            let _ = self.sink.write(&buf[..n]);
        }
        Ok(n)
    }
}
