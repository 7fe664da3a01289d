// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Notification targets: external UDP peers and a line-oriented logger.

use crate::Message;
use chrono::{SecondsFormat, TimeZone, Utc};
use hadock::time as htime;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::net::UdpSocket;

/// Per-notifier emission gate.
#[derive(Debug, Clone)]
pub struct AcceptRules {
    /// `realtime`, `playback` or empty for both.
    pub source: String,
    /// Matching instance, or negative for any.
    pub instance: i32,
    /// Accepted channels; empty accepts all.
    pub channels: Vec<i32>,
}

impl Default for AcceptRules {
    fn default() -> Self {
        Self {
            source: String::new(),
            instance: -1,
            channels: Vec::new(),
        }
    }
}

impl AcceptRules {
    pub fn accepts(&self, msg: &Message) -> bool {
        if self.instance >= 0 && self.instance != msg.instance {
            return false;
        }
        if !self.channels.is_empty() && !self.channels.contains(&msg.channel) {
            return false;
        }
        match self.source.as_str() {
            "realtime" => msg.realtime,
            "playback" => !msg.realtime,
            _ => true,
        }
    }
}

/// A notification target. Emission is best-effort; failures are logged
/// by the pool and never retried.
pub trait Notifier: Send + Sync {
    fn accept(&self, msg: &Message) -> bool;
    fn notify(&self, msg: &Message) -> io::Result<()>;
}

/// Sends encoded messages on a pre-dialed UDP socket.
pub struct UdpNotifier {
    socket: UdpSocket,
    rules: AcceptRules,
}

impl UdpNotifier {
    pub fn dial(addr: &str, rules: AcceptRules) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        Ok(Self { socket, rules })
    }
}

impl Notifier for UdpNotifier {
    fn accept(&self, msg: &Message) -> bool {
        self.rules.accepts(msg)
    }

    fn notify(&self, msg: &Message) -> io::Result<()> {
        let mut buf = Vec::with_capacity(128);
        msg.encode(&mut buf)?;
        self.socket.send(&buf)?;
        Ok(())
    }
}

/// Formats one log line per message into a sink writer.
pub struct LogNotifier {
    out: Mutex<Box<dyn Write + Send>>,
    rules: AcceptRules,
}

impl LogNotifier {
    pub fn new(out: Box<dyn Write + Send>, rules: AcceptRules) -> Self {
        Self {
            out: Mutex::new(out),
            rules,
        }
    }
}

impl Notifier for LogNotifier {
    fn accept(&self, msg: &Message) -> bool {
        self.rules.accepts(msg)
    }

    fn notify(&self, msg: &Message) -> io::Result<()> {
        let generated = htime::adjust_generation(
            Utc.timestamp_opt(msg.generated, 0)
                .single()
                .unwrap_or_default(),
        );
        let acquired = Utc
            .timestamp_opt(msg.acquired, 0)
            .single()
            .unwrap_or_default();
        let mut out = self.out.lock();
        writeln!(
            out,
            "| {:3} | {:6} | {:8} | {:3} | {:6} | {:12.3?} | {:8.3} | {} | {} | {:32} | {}",
            msg.instance,
            msg.origin,
            msg.sequence,
            msg.channel,
            msg.count,
            msg.elapsed,
            msg.rate(),
            generated.to_rfc3339_opts(SecondsFormat::Secs, true),
            acquired.to_rfc3339_opts(SecondsFormat::Secs, true),
            msg.upi,
            msg.reference,
        )?;
        out.flush()
    }
}
