// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Notification pool.
//!
//! Accepted records enter a bounded queue; a dispatcher thread groups
//! them by `(realtime, origin, instance)` and, on every tick of the
//! configured interval, emits one summary [`Message`] per non-empty
//! group before clearing the map wholesale. Enqueue never blocks: on a
//! full queue the record is dropped and counted. Records older than the
//! configured age are dropped at the door.

use crate::notifier::Notifier;
use crate::Message;
use chrono::Utc;
use crossbeam::channel::{bounded, Receiver, Sender};
use hadock::Record;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Ingress queue capacity.
pub const QUEUE_CAPACITY: usize = 1000;

/// A decoded record tagged with its producer instance.
#[derive(Debug, Clone)]
pub struct Item {
    pub instance: i32,
    pub record: Arc<Record>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    realtime: bool,
    origin: String,
    instance: i32,
}

impl Key {
    fn of(item: &Item) -> Self {
        Self {
            realtime: item.record.is_realtime(),
            origin: item.record.origin(),
            instance: item.instance,
        }
    }
}

/// Aggregating notification pool.
pub struct Pool {
    tx: Option<Sender<Item>>,
    age: Option<chrono::Duration>,
    dropped: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl Pool {
    /// A zero `interval` produces an inert pool that accepts and ignores
    /// every record. A zero `age` disables the ingress age gate.
    pub fn new(
        notifiers: Vec<Box<dyn Notifier>>,
        age: Duration,
        interval: Duration,
    ) -> io::Result<Self> {
        let dropped = Arc::new(AtomicU64::new(0));
        let age = if age.is_zero() {
            None
        } else {
            chrono::Duration::from_std(age).ok()
        };
        if interval.is_zero() {
            return Ok(Self {
                tx: None,
                age,
                dropped,
                handle: None,
            });
        }

        let (tx, rx) = bounded(QUEUE_CAPACITY);
        let notifiers: Arc<[Box<dyn Notifier>]> = notifiers.into();
        let handle = thread::Builder::new()
            .name("hdk-pool".to_string())
            .spawn(move || dispatch(rx, notifiers, interval))?;
        Ok(Self {
            tx: Some(tx),
            age,
            dropped,
            handle: Some(handle),
        })
    }

    /// Enqueue a record for aggregation. Never blocks.
    pub fn notify(&self, item: Item) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Some(age) = self.age {
            if Utc::now() - item.record.acq_timestamp() > age {
                return;
            }
        }
        offer(tx, &self.dropped, item);
    }

    /// Records dropped on a full queue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Closing the channel drains the dispatcher.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn offer(tx: &Sender<Item>, dropped: &AtomicU64, item: Item) {
    if tx.try_send(item).is_err() {
        dropped.fetch_add(1, Ordering::Relaxed);
    }
}

fn dispatch(rx: Receiver<Item>, notifiers: Arc<[Box<dyn Notifier>]>, interval: Duration) {
    let ticker = crossbeam::channel::tick(interval);
    let mut groups: HashMap<Key, Vec<Item>> = HashMap::new();
    loop {
        crossbeam::select! {
            recv(rx) -> item => match item {
                Ok(item) => groups.entry(Key::of(&item)).or_default().push(item),
                Err(_) => {
                    flush(&mut groups, &notifiers);
                    return;
                }
            },
            recv(ticker) -> _ => flush(&mut groups, &notifiers),
        }
    }
}

/// Summarize and emit every non-empty group, then clear the map. The
/// emission itself runs on a worker thread so a slow notifier cannot
/// stall aggregation.
fn flush(groups: &mut HashMap<Key, Vec<Item>>, notifiers: &Arc<[Box<dyn Notifier>]>) {
    if groups.is_empty() {
        return;
    }
    let messages: Vec<Message> = groups
        .drain()
        .filter(|(_, items)| !items.is_empty())
        .map(|(key, mut items)| summarize(&key, &mut items))
        .collect();
    if messages.is_empty() {
        return;
    }
    let notifiers = Arc::clone(notifiers);
    thread::spawn(move || {
        for msg in &messages {
            for n in notifiers.iter() {
                if !n.accept(msg) {
                    continue;
                }
                if let Err(e) = n.notify(msg) {
                    tracing::warn!("notifying {} failed: {}", msg.reference, e);
                }
            }
        }
    });
}

fn summarize(key: &Key, items: &mut [Item]) -> Message {
    items.sort_by_key(|i| i.record.sequence());
    let first = &items[0].record;
    let last = &items[items.len() - 1].record;

    let (mut size, mut bad) = (0i64, 0i64);
    for item in items.iter() {
        size += item.record.body().len() as i64;
        if !item.record.is_valid() {
            bad += 1;
        }
    }

    Message {
        origin: key.origin.clone(),
        sequence: first.sequence(),
        instance: key.instance,
        channel: i32::from(first.channel()),
        realtime: key.realtime,
        count: items.len() as u32,
        elapsed: (last.timestamp() - first.timestamp())
            .to_std()
            .unwrap_or_default(),
        generated: first.timestamp().timestamp(),
        acquired: first.acq_timestamp().timestamp(),
        size,
        bad,
        reference: first.filename(),
        upi: extract_upi(first),
    }
}

fn extract_upi(rec: &Record) -> String {
    let alt = if rec.is_image() { "IMAGE" } else { "SCIENCE" };
    if rec.is_realtime() {
        return alt.to_string();
    }
    rec.upi().unwrap_or_else(|| alt.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::AcceptRules;
    use hadock::record::{Sdh, SdhV2, VmuHeader};
    use hadock::time::Time5;
    use parking_lot::Mutex;

    fn item(sequence: u32, coarse: u32, valid: bool) -> Item {
        let now = Time5::from_utc(Utc::now());
        Item {
            instance: 255,
            record: Arc::new(Record::Table {
                vmu: VmuHeader {
                    channel: 3,
                    source: 0x2f,
                    sequence,
                    coarse,
                    fine: 0,
                },
                sdh: Sdh::V2(SdhV2 {
                    acquisition: now,
                    ..SdhV2::default()
                }),
                body: vec![0; 10],
                valid,
            }),
        }
    }

    struct Collector {
        messages: Arc<Mutex<Vec<Message>>>,
        rules: AcceptRules,
    }

    impl Notifier for Collector {
        fn accept(&self, msg: &Message) -> bool {
            self.rules.accepts(msg)
        }

        fn notify(&self, msg: &Message) -> io::Result<()> {
            self.messages.lock().push(msg.clone());
            Ok(())
        }
    }

    #[test]
    fn test_summarize_group() {
        let key = Key {
            realtime: false,
            origin: "2f".into(),
            instance: 255,
        };
        // Out of order on purpose; elapsed covers 1000..1010.
        let mut items = vec![
            item(12, 1010, true),
            item(10, 1000, true),
            item(11, 1005, false),
        ];
        let msg = summarize(&key, &mut items);

        assert_eq!(msg.count, 3);
        assert_eq!(msg.sequence, 10);
        assert_eq!(msg.elapsed, Duration::from_secs(10));
        assert_eq!(msg.size, 30);
        assert_eq!(msg.bad, 1);
        assert_eq!(msg.reference, "2f_10_1000_0");
        assert_eq!(msg.upi, "SCIENCE");
    }

    #[test]
    fn test_pool_emits_one_message_per_key() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let collector = Collector {
            messages: Arc::clone(&messages),
            rules: AcceptRules::default(),
        };
        let pool = Pool::new(
            vec![Box::new(collector)],
            Duration::ZERO,
            Duration::from_millis(50),
        )
        .expect("pool");

        pool.notify(item(1, 1000, true));
        pool.notify(item(2, 1001, true));
        let mut other = item(3, 1000, true);
        other.instance = 0;
        pool.notify(other);

        thread::sleep(Duration::from_millis(300));
        let got = messages.lock().clone();
        assert_eq!(got.len(), 2);
        let by_255 = got.iter().find(|m| m.instance == 255).expect("group 255");
        assert_eq!(by_255.count, 2);

        // Groups were cleared: the next tick emits nothing further.
        thread::sleep(Duration::from_millis(200));
        assert_eq!(messages.lock().len(), 2);
    }

    #[test]
    fn test_age_gate_drops_stale_records() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let collector = Collector {
            messages: Arc::clone(&messages),
            rules: AcceptRules::default(),
        };
        let pool = Pool::new(
            vec![Box::new(collector)],
            Duration::from_secs(60),
            Duration::from_millis(50),
        )
        .expect("pool");

        // Acquisition stamp far in the past.
        let mut stale = item(1, 1000, true);
        stale.record = Arc::new(Record::Table {
            vmu: VmuHeader {
                channel: 3,
                source: 0x2f,
                sequence: 1,
                coarse: 1000,
                fine: 0,
            },
            sdh: Sdh::V2(SdhV2::default()),
            body: Vec::new(),
            valid: true,
        });
        pool.notify(stale);

        thread::sleep(Duration::from_millis(200));
        assert!(messages.lock().is_empty());
    }

    #[test]
    fn test_offer_drops_on_full_queue_without_blocking() {
        let (tx, rx) = bounded::<Item>(2);
        let dropped = AtomicU64::new(0);

        for i in 0..5 {
            offer(&tx, &dropped, item(i, 1000, true));
        }
        assert_eq!(dropped.load(Ordering::Relaxed), 3);
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn test_notifier_accept_gates_emission() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let collector = Collector {
            messages: Arc::clone(&messages),
            rules: AcceptRules {
                instance: 7,
                ..AcceptRules::default()
            },
        };
        let pool = Pool::new(
            vec![Box::new(collector)],
            Duration::ZERO,
            Duration::from_millis(50),
        )
        .expect("pool");

        pool.notify(item(1, 1000, true));
        thread::sleep(Duration::from_millis(200));
        assert!(messages.lock().is_empty());
    }

    #[test]
    fn test_inert_pool_ignores_records() {
        let pool = Pool::new(Vec::new(), Duration::ZERO, Duration::ZERO).expect("pool");
        pool.notify(item(1, 1000, true));
        assert_eq!(pool.dropped(), 0);
    }
}
