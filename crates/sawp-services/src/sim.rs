//! In-memory unreliable network for deterministic protocol tests.
//!
//! A [`SimNetwork`] hands out [`SimSocket`] endpoints that implement
//! [`Datagram`]. Every datagram sent through it is routed per destination
//! address. Each destination has a link that applies, in order:
//!
//! | Fault       | Effect                                                        |
//! |-------------|---------------------------------------------------------------|
//! | `Pass`      | deliver unchanged                                             |
//! | `Drop`      | lose the datagram                                             |
//! | `Corrupt`   | alter one payload byte (Data) or one raw byte (anything else) |
//! | `Duplicate` | deliver twice                                                 |
//! | `Delay`     | hold back until the next datagram on the link is delivered    |
//!
//! Scripted faults are consumed first, one per datagram. After the script
//! runs out, a seeded random loss rate applies, so lossy runs reproduce
//! exactly for a given seed.
//!
//! Everything that crosses the network is recorded as a [`TraceEntry`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use sawp_core::wire::Packet;

use crate::transport::Datagram;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Pass,
    Drop,
    Corrupt,
    Duplicate,
    Delay,
}

/// What the network did with a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Delivered,
    Dropped,
    Corrupted,
    Duplicated,
    Delayed,
    /// A previously delayed datagram, now delivered.
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub from: SocketAddr,
    pub to: SocketAddr,
    /// The datagram as sent, before any corruption. `None` if undecodable.
    pub packet: Option<Packet>,
    pub fate: Fate,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.packet {
            Some(p) => write!(f, "{p} {:?}", self.fate),
            None => write!(f, "<raw> {:?}", self.fate),
        }
    }
}

type Inbox = mpsc::UnboundedSender<(Bytes, SocketAddr)>;

#[derive(Default)]
struct Link {
    script: VecDeque<Fault>,
    loss_rate: f64,
    held: Vec<(Bytes, SocketAddr, Option<Packet>)>,
}

struct NetState {
    next_port: u16,
    inboxes: HashMap<SocketAddr, Inbox>,
    links: HashMap<SocketAddr, Link>,
    rng: StdRng,
    trace: Vec<TraceEntry>,
}

#[derive(Clone)]
pub struct SimNetwork {
    state: Arc<Mutex<NetState>>,
}

impl SimNetwork {
    pub fn new(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(NetState {
                next_port: 40_000,
                inboxes: HashMap::new(),
                links: HashMap::new(),
                rng: StdRng::seed_from_u64(seed),
                trace: Vec::new(),
            })),
        }
    }

    /// A fresh endpoint on the next free synthetic address.
    pub fn socket(&self) -> SimSocket {
        let addr = {
            let mut state = self.lock();
            let port = state.next_port;
            state.next_port += 1;
            SocketAddr::from(([10, 0, 0, 1], port))
        };
        self.socket_at(addr)
    }

    /// An endpoint at a chosen address. Replaces any endpoint already there.
    pub fn socket_at(&self, addr: SocketAddr) -> SimSocket {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().inboxes.insert(addr, tx);
        SimSocket {
            addr,
            net: self.clone(),
            inbox: tokio::sync::Mutex::new(rx),
        }
    }

    /// Queue faults for the next datagrams sent to `to`.
    pub fn script(&self, to: SocketAddr, faults: impl IntoIterator<Item = Fault>) {
        self.lock()
            .links
            .entry(to)
            .or_default()
            .script
            .extend(faults);
    }

    /// Random loss applied to datagrams sent to `to` once its script is empty.
    pub fn set_loss(&self, to: SocketAddr, rate: f64) {
        self.lock().links.entry(to).or_default().loss_rate = rate.clamp(0.0, 1.0);
    }

    pub fn trace(&self) -> Vec<TraceEntry> {
        self.lock().trace.clone()
    }

    fn lock(&self) -> MutexGuard<'_, NetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn route(&self, from: SocketAddr, to: SocketAddr, datagram: Bytes) {
        let mut state = self.lock();
        let NetState {
            inboxes,
            links,
            rng,
            trace,
            ..
        } = &mut *state;
        let link = links.entry(to).or_default();
        let packet = Packet::decode(&datagram).ok();

        let fault = match link.script.pop_front() {
            Some(fault) => fault,
            None if link.loss_rate > 0.0 && rng.gen_bool(link.loss_rate) => Fault::Drop,
            None => Fault::Pass,
        };

        let deliver = |datagram: Bytes| {
            if let Some(inbox) = inboxes.get(&to) {
                // A closed inbox is a vanished host; the datagram is lost.
                let _ = inbox.send((datagram, from));
            }
        };

        let fate = match fault {
            Fault::Pass => {
                deliver(datagram);
                Fate::Delivered
            }
            Fault::Drop => Fate::Dropped,
            Fault::Corrupt => {
                deliver(corrupt(&datagram));
                Fate::Corrupted
            }
            Fault::Duplicate => {
                deliver(datagram.clone());
                deliver(datagram);
                Fate::Duplicated
            }
            Fault::Delay => {
                link.held.push((datagram, from, packet.clone()));
                Fate::Delayed
            }
        };
        trace.push(TraceEntry {
            from,
            to,
            packet,
            fate,
        });

        if matches!(fate, Fate::Delivered | Fate::Corrupted | Fate::Duplicated) {
            for (datagram, held_from, packet) in std::mem::take(&mut link.held) {
                if let Some(inbox) = inboxes.get(&to) {
                    let _ = inbox.send((datagram, held_from));
                }
                trace.push(TraceEntry {
                    from: held_from,
                    to,
                    packet,
                    fate: Fate::Released,
                });
            }
        }
    }
}

/// Damage a datagram. Data packets keep a valid encoding so the damage
/// surfaces as a checksum mismatch rather than a parse failure.
pub fn corrupt(datagram: &[u8]) -> Bytes {
    if let Ok(Packet::Data {
        seq,
        payload,
        checksum,
    }) = Packet::decode(datagram)
    {
        if !payload.is_empty() {
            let mut altered = payload.to_vec();
            altered[0] ^= 0x01;
            let damaged = Packet::Data {
                seq,
                payload: Bytes::from(altered),
                checksum,
            };
            if let Ok(frame) = damaged.encode() {
                return Bytes::from(frame);
            }
        }
    }
    let mut raw = datagram.to_vec();
    if let Some(byte) = raw.get_mut(datagram.len() / 2) {
        *byte ^= 0x01;
    }
    Bytes::from(raw)
}

/// One endpoint on a [`SimNetwork`].
pub struct SimSocket {
    addr: SocketAddr,
    net: SimNetwork,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Bytes, SocketAddr)>>,
}

impl SimSocket {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Datagram for SimSocket {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.net.route(self.addr, dest, Bytes::copy_from_slice(buf));
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut inbox = self.inbox.lock().await;
        let (datagram, from) = inbox
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "endpoint replaced"))?;
        // Truncate like a real datagram socket with a short buffer.
        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok((len, from))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}
