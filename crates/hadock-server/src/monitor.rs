// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Print notification messages broadcast by the pool.

use anyhow::Context;
use chrono::{SecondsFormat, TimeZone, Utc};
use hadock::time as htime;
use hadock_notify::Message;
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::thread;

pub fn run(groups: &[String]) -> anyhow::Result<()> {
    let mut handles = Vec::with_capacity(groups.len());
    for group in groups {
        let socket = bind_group(group).with_context(|| format!("binding {}", group))?;
        handles.push(thread::spawn(move || listen_loop(socket)));
    }
    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

fn bind_group(addr: &str) -> anyhow::Result<UdpSocket> {
    let sa: SocketAddr = addr.parse()?;
    let socket = UdpSocket::bind(sa)?;
    if let IpAddr::V4(ip) = sa.ip() {
        if ip.is_multicast() {
            socket.join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)?;
        }
    }
    Ok(socket)
}

fn listen_loop(socket: UdpSocket) {
    let mut buf = vec![0u8; 64 << 10];
    loop {
        let n = match socket.recv(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("receiving notification failed: {}", e);
                return;
            }
        };
        let mut r = Cursor::new(&buf[..n]);
        while (r.position() as usize) < n {
            match Message::decode(&mut r) {
                Ok(msg) => print_message(&msg),
                Err(e) => {
                    tracing::warn!("decoding notification failed: {}", e);
                    break;
                }
            }
        }
    }
}

fn print_message(msg: &Message) {
    let generated = htime::adjust_generation(
        Utc.timestamp_opt(msg.generated, 0)
            .single()
            .unwrap_or_default(),
    );
    let acquired = Utc
        .timestamp_opt(msg.acquired, 0)
        .single()
        .unwrap_or_default();
    println!(
        "{} | {:9} | {:3} | {} | {:9} | {:9} | {:12.3?} | {:6.3} | {} | {} | {}",
        msg.origin,
        msg.sequence,
        msg.instance,
        msg.channel,
        if msg.realtime { "realtime" } else { "playback" },
        msg.count,
        msg.elapsed,
        msg.rate(),
        generated.to_rfc3339_opts(SecondsFormat::Secs, true),
        acquired.to_rfc3339_opts(SecondsFormat::Secs, true),
        msg.reference,
    );
}
