// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cascading tee-proxy.
//!
//! [`Proxy`] duplicates an ingress byte stream to an upstream peer over
//! a bounded pool of pre-dialed, optionally gzip-wrapping connections.
//! Bytes are buffered until the next write starts with the HRDL sync
//! word (or a zero-length flush arrives); the accumulated buffer is then
//! sent asynchronously in a single write, so upstream message boundaries
//! line up with the framing without the proxy parsing anything further.
//!
//! Pool contract: take is a non-blocking receive or a fresh dial; put is
//! a non-blocking send or a close. A connection returns to the pool only
//! after a successful send and is discarded on any write error.
//!
//! [`Relay`] is the single-connection variant: one upstream connection,
//! auto-reconnect on write errors with a 5 s dial timeout loop, and a
//! discarding writer standing in while the reconnect runs, so the caller
//! never blocks. TCP and UDP peers behave the same way.

use crossbeam::channel::{bounded, Receiver, Sender};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// HRDL frame boundary marker.
pub const SYNC_WORD: [u8; 4] = [0xF8, 0x2E, 0x35, 0x53];

const DEFAULT_POOL: usize = 4;
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Gzip level applied to upstream connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    /// No gzip wrapping at all.
    #[default]
    Plain,
    None,
    Speed,
    Best,
    Default,
}

impl Level {
    pub fn parse(s: &str) -> Self {
        match s {
            "no" => Self::None,
            "speed" => Self::Speed,
            "best" => Self::Best,
            "default" => Self::Default,
            _ => Self::Plain,
        }
    }

    fn compression(self) -> Option<Compression> {
        match self {
            Self::Plain => None,
            Self::None => Some(Compression::none()),
            Self::Speed => Some(Compression::fast()),
            Self::Best => Some(Compression::best()),
            Self::Default => Some(Compression::default()),
        }
    }
}

enum Conn {
    Plain(TcpStream),
    Gzip(GzEncoder<TcpStream>),
}

impl Conn {
    fn dial(addr: &str, level: Level) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        match level.compression() {
            None => Ok(Self::Plain(stream)),
            Some(c) => Ok(Self::Gzip(GzEncoder::new(stream, c))),
        }
    }

    /// One complete send. Gzip connections flush after each write so the
    /// peer sees whole frames.
    fn send(&mut self, bs: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(s) => s.write_all(bs),
            Self::Gzip(s) => {
                s.write_all(bs)?;
                s.flush()
            }
        }
    }
}

/// Pooled tee-proxy. Implements [`Write`]; write errors never surface to
/// the ingress path.
pub struct Proxy {
    addr: String,
    level: Level,
    tx: Sender<Conn>,
    rx: Receiver<Conn>,
    buffer: Vec<u8>,
}

impl Proxy {
    /// Pre-dial `size` connections (a zero size selects the default).
    pub fn dial(addr: &str, level: Level, size: usize) -> io::Result<Self> {
        let size = if size == 0 { DEFAULT_POOL } else { size };
        let (tx, rx) = bounded(size);
        for _ in 0..size {
            let conn = Conn::dial(addr, level)?;
            let _ = tx.try_send(conn);
        }
        Ok(Self {
            addr: addr.to_string(),
            level,
            tx,
            rx,
            buffer: Vec::new(),
        })
    }

    fn take(&self) -> io::Result<Conn> {
        match self.rx.try_recv() {
            Ok(conn) => Ok(conn),
            Err(_) => Conn::dial(&self.addr, self.level),
        }
    }

    /// Send the accumulated buffer on a pooled connection, off-thread.
    fn dispatch(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let Ok(mut conn) = self.take() else {
            // Upstream unreachable: the buffered bytes are discarded.
            self.buffer.clear();
            return;
        };
        let out = std::mem::take(&mut self.buffer);
        let tx = self.tx.clone();
        thread::spawn(move || {
            if conn.send(&out).is_ok() {
                // A full pool closes the connection instead.
                let _ = tx.try_send(conn);
            }
        });
    }

    /// Flush pending bytes and drop every pooled connection.
    pub fn close(&mut self) {
        self.dispatch();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Write for Proxy {
    fn write(&mut self, bs: &[u8]) -> io::Result<usize> {
        if bs.is_empty() || (bs.starts_with(&SYNC_WORD) && !self.buffer.is_empty()) {
            self.dispatch();
        }
        self.buffer.extend_from_slice(bs);
        Ok(bs.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        self.close();
    }
}

enum Peer {
    Tcp(TcpStream),
    TcpGzip(GzEncoder<TcpStream>),
    Udp(UdpSocket),
    /// Stand-in while a reconnect runs.
    Discard,
}

impl Peer {
    fn dial(proto: &str, addr: &str, level: Level) -> io::Result<Self> {
        match proto {
            "udp" => {
                let socket = UdpSocket::bind("0.0.0.0:0")?;
                socket.connect(addr)?;
                Ok(Self::Udp(socket))
            }
            _ => {
                let sa = addr
                    .to_socket_addrs()?
                    .next()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, addr.to_string()))?;
                let stream = TcpStream::connect_timeout(&sa, DIAL_TIMEOUT)?;
                match level.compression() {
                    None => Ok(Self::Tcp(stream)),
                    Some(c) => Ok(Self::TcpGzip(GzEncoder::new(stream, c))),
                }
            }
        }
    }

    fn send(&mut self, bs: &[u8]) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.write_all(bs),
            Self::TcpGzip(s) => {
                s.write_all(bs)?;
                s.flush()
            }
            Self::Udp(s) => s.send(bs).map(|_| ()),
            Self::Discard => Ok(()),
        }
    }
}

/// Single-connection relay with auto-reconnect.
pub struct Relay {
    proto: String,
    addr: String,
    level: Level,
    peer: Arc<Mutex<Peer>>,
    reconnecting: Arc<AtomicBool>,
}

impl Relay {
    pub fn dial(proto: &str, addr: &str, level: Level) -> io::Result<Self> {
        let peer = Peer::dial(proto, addr, level)?;
        Ok(Self {
            proto: proto.to_string(),
            addr: addr.to_string(),
            level,
            peer: Arc::new(Mutex::new(peer)),
            reconnecting: Arc::new(AtomicBool::new(false)),
        })
    }

    fn reconnect(&self) {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let proto = self.proto.clone();
        let addr = self.addr.clone();
        let level = self.level;
        let peer = Arc::clone(&self.peer);
        let reconnecting = Arc::clone(&self.reconnecting);
        thread::spawn(move || {
            loop {
                match Peer::dial(&proto, &addr, level) {
                    Ok(p) => {
                        if let Ok(mut guard) = peer.lock() {
                            *guard = p;
                        }
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("redialing {} failed: {}", addr, e);
                        thread::sleep(DIAL_TIMEOUT);
                    }
                }
            }
            reconnecting.store(false, Ordering::SeqCst);
        });
    }
}

impl Write for Relay {
    fn write(&mut self, bs: &[u8]) -> io::Result<usize> {
        let failed = match self.peer.lock() {
            Ok(mut peer) => match peer.send(bs) {
                Ok(()) => false,
                Err(_) => {
                    *peer = Peer::Discard;
                    true
                }
            },
            Err(_) => false,
        };
        if failed {
            self.reconnect();
        }
        Ok(bs.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
