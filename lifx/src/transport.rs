//! The UDP side of things: one socket, sequence numbers, and getting each reply to the caller
//! that is waiting for it.
//!
//! There is no background thread.  Callers waiting for a reply take turns reading the socket:
//! whoever holds the reader lock does a bounded `recv_from`, files the datagram under its
//! sequence number and wakes everyone else up.  Datagrams nobody is waiting for are dropped.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::num::Wrapping;
use std::sync::{Condvar, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use get_if_addrs::{get_if_addrs, IfAddr, Ifv4Addr};
use lifx_core::{BuildOptions, HardwareAddress, Message, RawMessage};
use log::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// How long a waiting caller sleeps before checking whether it should take over reading.
const FOLLOWER_POLL: Duration = Duration::from_millis(20);

/// What a request needs to hear back before it counts as answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// An [Message::Acknowledgement] (sets `ack_required`).
    Ack,
    /// Any other message (sets `res_required`).
    Response,
}

struct PendingRequest {
    /// Only replies from this host count.  `None` when the request was broadcast.
    from: Option<IpAddr>,
    /// Type of the request itself, so an echo of our own broadcast isn't taken for a reply.
    request_typ: u16,
    expect: Expect,
    replies: VecDeque<(SocketAddr, RawMessage)>,
}

impl PendingRequest {
    fn accepts(&self, raw: &RawMessage, sender: SocketAddr) -> bool {
        let typ = raw.protocol_header.typ;
        if let Some(ip) = self.from {
            if ip != sender.ip() {
                return false;
            }
        }
        if typ == self.request_typ {
            return false;
        }
        match self.expect {
            Expect::Ack => typ == 45,
            Expect::Response => typ != 45,
        }
    }
}

/// Sequence counter and the requests waiting on each sequence number.
struct Pending {
    next_seq: Wrapping<u8>,
    table: HashMap<u8, PendingRequest>,
}

impl Pending {
    fn new(first_seq: u8) -> Pending {
        Pending {
            next_seq: Wrapping(first_seq),
            table: HashMap::new(),
        }
    }

    fn next_seq(&mut self) -> u8 {
        let Wrapping(v) = self.next_seq;
        self.next_seq += Wrapping(1);
        v
    }

    /// Claims the next sequence number that isn't already waiting for a reply.
    fn register(&mut self, request: PendingRequest) -> Result<u8> {
        for _ in 0..=u8::MAX as usize {
            let seq = self.next_seq();
            if let Entry::Vacant(slot) = self.table.entry(seq) {
                slot.insert(request);
                return Ok(seq);
            }
        }
        Err(Error::SequenceExhausted)
    }
}

/// Owns the socket and the pending-request table.
///
/// `Transport` is `Sync`; share it between threads (or device handles) with an `Arc`.
pub struct Transport {
    sock: UdpSocket,
    source: u32,
    broadcast_addrs: Vec<SocketAddr>,
    pending: Mutex<Pending>,
    arrived: Condvar,
    reader: Mutex<()>,
}

impl Transport {
    /// Binds the socket described by `config` and enables broadcast on it.
    pub fn bind(config: &ClientConfig) -> Result<Transport> {
        let sock = UdpSocket::bind(config.bind_addr).map_err(|e| Error::network("bind", e))?;
        sock.set_broadcast(true)
            .map_err(|e| Error::network("set_broadcast", e))?;

        let broadcast_addrs = if config.broadcast_addrs.is_empty() {
            interface_broadcasts(config.port)
        } else {
            config.broadcast_addrs.clone()
        };
        debug!(
            "Bound {:?}, source {:#010x}, broadcasting to {:?}",
            sock.local_addr().ok(),
            config.source,
            broadcast_addrs
        );

        Ok(Transport {
            sock,
            source: config.source,
            broadcast_addrs,
            pending: Mutex::new(Pending::new(rand::random())),
            arrived: Condvar::new(),
            reader: Mutex::new(()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.sock
            .local_addr()
            .map_err(|e| Error::network("local_addr", e))
    }

    pub fn source(&self) -> u32 {
        self.source
    }

    pub fn broadcast_addrs(&self) -> &[SocketAddr] {
        &self.broadcast_addrs
    }

    /// Number of requests currently waiting for a reply.
    pub fn outstanding(&self) -> usize {
        self.lock_pending().table.len()
    }

    /// Sends a message without waiting for anything.
    ///
    /// `addr` of `None` means every broadcast address.
    pub fn send(
        &self,
        addr: Option<SocketAddr>,
        target: Option<HardwareAddress>,
        msg: Message,
    ) -> Result<()> {
        let seq = self.lock_pending().next_seq();
        let raw = RawMessage::build(&self.options(target, seq, None), msg)?;
        self.send_raw(addr, &raw)
    }

    /// Sends a message and blocks until the reply arrives or `timeout` passes.
    ///
    /// Returns the sender's address along with the reply.  A reply that shows up after the
    /// timeout is discarded.
    pub fn request(
        &self,
        addr: Option<SocketAddr>,
        target: Option<HardwareAddress>,
        msg: Message,
        expect: Expect,
        timeout: Duration,
    ) -> Result<(SocketAddr, RawMessage)> {
        let entry = self.register(addr.map(|a| a.ip()), msg.get_num(), expect)?;
        let raw = RawMessage::build(&self.options(target, entry.seq, Some(expect)), msg)?;
        self.send_raw(addr, &raw)?;

        let deadline = Instant::now() + timeout;
        match self.next_reply(entry.seq, deadline)? {
            Some(reply) => Ok(reply),
            None => {
                debug!("Timed out waiting for reply to seq {}", entry.seq);
                Err(Error::Timeout {
                    seq: entry.seq,
                    timeout,
                })
            }
        }
    }

    /// Broadcasts a message and returns every reply that arrives within `window`.
    ///
    /// Replies are read lazily as the iterator is advanced; it ends once the window is over.
    pub fn broadcast(&self, msg: Message, window: Duration) -> Result<Broadcast<'_>> {
        let entry = self.register(None, msg.get_num(), Expect::Response)?;
        let raw = RawMessage::build(
            &self.options(None, entry.seq, Some(Expect::Response)),
            msg,
        )?;
        self.send_raw(None, &raw)?;

        Ok(Broadcast {
            entry,
            deadline: Instant::now() + window,
            failed: false,
        })
    }

    fn options(&self, target: Option<HardwareAddress>, seq: u8, expect: Option<Expect>) -> BuildOptions {
        BuildOptions {
            target: target.map(|t| t.target()),
            ack_required: expect == Some(Expect::Ack),
            res_required: expect == Some(Expect::Response),
            sequence: seq,
            source: self.source,
        }
    }

    fn register(&self, from: Option<IpAddr>, request_typ: u16, expect: Expect) -> Result<PendingEntry<'_>> {
        let seq = self.lock_pending().register(PendingRequest {
            from,
            request_typ,
            expect,
            replies: VecDeque::new(),
        })?;
        Ok(PendingEntry {
            transport: self,
            seq,
        })
    }

    fn send_raw(&self, addr: Option<SocketAddr>, raw: &RawMessage) -> Result<()> {
        let bytes = raw.pack()?;
        match addr {
            Some(addr) => {
                debug!(
                    "Sending type {} seq {} to {}",
                    raw.protocol_header.typ, raw.frame_addr.sequence, addr
                );
                self.sock
                    .send_to(&bytes, addr)
                    .map_err(|e| Error::network("send_to", e))?;
            }
            None => {
                for addr in &self.broadcast_addrs {
                    debug!(
                        "Broadcasting type {} seq {} to {}",
                        raw.protocol_header.typ, raw.frame_addr.sequence, addr
                    );
                    self.sock
                        .send_to(&bytes, addr)
                        .map_err(|e| Error::network("send_to", e))?;
                }
            }
        }
        Ok(())
    }

    fn lock_pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_reply(pending: &mut Pending, seq: u8) -> Option<(SocketAddr, RawMessage)> {
        pending
            .table
            .get_mut(&seq)
            .and_then(|req| req.replies.pop_front())
    }

    /// Waits for the next reply filed under `seq`, reading the socket if nobody else is.
    ///
    /// `Ok(None)` means the deadline passed.
    fn next_reply(&self, seq: u8, deadline: Instant) -> Result<Option<(SocketAddr, RawMessage)>> {
        loop {
            if let Some(reply) = Self::take_reply(&mut self.lock_pending(), seq) {
                return Ok(Some(reply));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let remaining = deadline - now;

            match self.reader.try_lock() {
                Ok(guard) => {
                    let pumped = self.pump(remaining);
                    drop(guard);
                    // let a waiter take over reading
                    self.arrived.notify_all();
                    pumped?;
                }
                Err(TryLockError::Poisoned(poisoned)) => {
                    let guard = poisoned.into_inner();
                    let pumped = self.pump(remaining);
                    drop(guard);
                    self.arrived.notify_all();
                    pumped?;
                }
                Err(TryLockError::WouldBlock) => {
                    let pending = self.lock_pending();
                    if pending
                        .table
                        .get(&seq)
                        .map_or(false, |req| !req.replies.is_empty())
                    {
                        continue;
                    }
                    let _ = self
                        .arrived
                        .wait_timeout(pending, remaining.min(FOLLOWER_POLL))
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }

    /// Reads at most one datagram, waiting no longer than `wait`, and files it.
    fn pump(&self, wait: Duration) -> Result<()> {
        // a zero read timeout is rejected by the OS
        let wait = wait.max(Duration::from_millis(1));
        self.sock
            .set_read_timeout(Some(wait))
            .map_err(|e| Error::network("set_read_timeout", e))?;

        let mut buf = [0; 1024];
        match self.sock.recv_from(&mut buf) {
            Ok((nbytes, sender)) => {
                self.dispatch(&buf[..nbytes], sender);
                Ok(())
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(())
            }
            Err(e) => Err(Error::network("recv_from", e)),
        }
    }

    fn dispatch(&self, bytes: &[u8], sender: SocketAddr) {
        let raw = match RawMessage::unpack(bytes) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Bad datagram ({} bytes) from {}: {}", bytes.len(), sender, e);
                return;
            }
        };

        if raw.frame.source != self.source {
            trace!(
                "Ignoring type {} from {} meant for source {:#010x}",
                raw.protocol_header.typ,
                sender,
                raw.frame.source
            );
            return;
        }

        let seq = raw.frame_addr.sequence;
        let mut pending = self.lock_pending();
        match pending.table.get_mut(&seq) {
            Some(req) if req.accepts(&raw, sender) => {
                trace!(
                    "Reply type {} seq {} from {}",
                    raw.protocol_header.typ,
                    seq,
                    sender
                );
                req.replies.push_back((sender, raw));
                drop(pending);
                self.arrived.notify_all();
            }
            _ => {
                trace!(
                    "Discarding unmatched type {} seq {} from {}",
                    raw.protocol_header.typ,
                    seq,
                    sender
                );
            }
        }
    }
}

/// A claimed sequence number.  Dropping it forgets the request, so replies arriving later are
/// discarded.
struct PendingEntry<'a> {
    transport: &'a Transport,
    seq: u8,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.transport.lock_pending().table.remove(&self.seq);
    }
}

/// Replies to a broadcast, as `(sender, packet)` pairs.  See [Transport::broadcast].
pub struct Broadcast<'a> {
    entry: PendingEntry<'a>,
    deadline: Instant,
    failed: bool,
}

impl Broadcast<'_> {
    pub fn sequence(&self) -> u8 {
        self.entry.seq
    }
}

impl Iterator for Broadcast<'_> {
    type Item = Result<(SocketAddr, RawMessage)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self
            .entry
            .transport
            .next_reply(self.entry.seq, self.deadline)
            .transpose();
        if let Some(Err(_)) = next {
            self.failed = true;
        }
        next
    }
}

/// Broadcast addresses of every non-loopback IPv4 interface, or the limited broadcast address if
/// there are none.
fn interface_broadcasts(port: u16) -> Vec<SocketAddr> {
    let mut addrs = Vec::new();
    match get_if_addrs() {
        Ok(ifaces) => {
            for iface in ifaces {
                if iface.ip().is_loopback() {
                    continue;
                }
                if let IfAddr::V4(Ifv4Addr {
                    broadcast: Some(bcast),
                    ..
                }) = iface.addr
                {
                    addrs.push(SocketAddr::new(IpAddr::V4(bcast), port));
                }
            }
        }
        Err(e) => warn!("Couldn't list network interfaces: {}", e),
    }
    if addrs.is_empty() {
        addrs.push(SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), port));
    }
    addrs
}
