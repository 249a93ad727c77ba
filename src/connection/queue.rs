//! Inbound message queue and the sequence-aware dequeue
//!
//! Every inbound datagram is copied into a pooled queue entry and appended
//! to one process-wide FIFO. Callers remove entries by predicate: a
//! destination window and/or a sequence id. The queue lock is never held
//! while waiting on the socket.

use super::Transport;
use crate::error::{ClientError, ClientResult};
use crate::pool::{ListNode, Pools};
use crate::protocol::*;
use crate::sync::SpinLock;
use nix::errno::Errno;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct QueueState {
    entries: VecDeque<Box<ListNode<Message>>>,
    recv_buf: Vec<u8>,
}

/// A connection to the display server
pub struct Connection {
    transport: Box<dyn Transport>,
    state: SpinLock<QueueState>,
    pools: Arc<Pools>,
    next_seqid: AtomicU32,
    poll_interval: Duration,
    reply_timeout: Option<Duration>,
}

impl Connection {
    pub fn new(
        transport: Box<dyn Transport>,
        pools: Arc<Pools>,
        poll_interval: Duration,
        reply_timeout: Option<Duration>,
    ) -> Self {
        Connection {
            transport,
            state: SpinLock::new(QueueState {
                entries: VecDeque::new(),
                recv_buf: vec![0u8; MAX_MESSAGE_LEN],
            }),
            pools,
            next_seqid: AtomicU32::new(1),
            poll_interval,
            reply_timeout,
        }
    }

    fn fresh_seqid(&self) -> u32 {
        loop {
            let seqid = self.next_seqid.fetch_add(1, Ordering::Relaxed);
            if seqid != SEQ_NONE {
                return seqid;
            }
        }
    }

    /// Send a message, stamping it with a fresh sequence id. Returns the id.
    pub fn send(&self, msg: &mut Message) -> ClientResult<u32> {
        msg.seqid = self.fresh_seqid();
        let bytes = msg.encode()?;
        log::debug!(
            "send {} seq={} src={} dest={} ({} bytes)",
            msg.kind,
            msg.seqid,
            msg.src,
            msg.dest,
            bytes.len()
        );
        self.transport.send(&bytes).map_err(transport_error)?;
        Ok(msg.seqid)
    }

    /// Drain every pending datagram into the queue without blocking.
    /// Returns how many messages were queued.
    pub fn poll(&self) -> ClientResult<usize> {
        let mut state = self.state.lock();
        self.poll_locked(&mut state)
    }

    fn poll_locked(&self, state: &mut QueueState) -> ClientResult<usize> {
        let mut queued = 0;
        loop {
            let len = match self.transport.try_recv(&mut state.recv_buf) {
                Ok(Some(len)) => len,
                Ok(None) => break,
                Err(e) => return Err(transport_error(e)),
            };
            match Message::decode(&state.recv_buf[..len]) {
                Ok(msg) => {
                    log::trace!("queued {} seq={} dest={}", msg.kind, msg.seqid, msg.dest);
                    let mut node = self.pools.nodes.get();
                    node.value = Some(msg);
                    state.entries.push_back(node);
                    queued += 1;
                }
                Err(e) => log::warn!("Dropping datagram: {}", e),
            }
        }
        Ok(queued)
    }

    /// Remove the first entry matching the predicate
    fn take_match(
        &self,
        state: &mut QueueState,
        window: Option<WinId>,
        seqid: u32,
    ) -> Option<Message> {
        let pos = state.entries.iter().position(|node| match &node.value {
            Some(msg) => matches(msg, window, seqid),
            None => false,
        })?;
        let mut node = state.entries.remove(pos)?;
        let msg = node.value.take();
        self.pools.nodes.put(node);
        msg.map(|mut msg| {
            msg.normalize();
            msg
        })
    }

    /// Dequeue the first message addressed to `window` (any window when
    /// `None`) carrying `seqid` (any non-internal message when
    /// [`SEQ_ANY`]). With `wait`, blocks in bounded slices until a match
    /// arrives.
    pub fn next(&self, window: Option<WinId>, seqid: u32, wait: bool) -> ClientResult<Option<Message>> {
        self.next_until(window, seqid, wait, None)
    }

    fn next_until(
        &self,
        window: Option<WinId>,
        seqid: u32,
        wait: bool,
        deadline: Option<Instant>,
    ) -> ClientResult<Option<Message>> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(msg) = self.take_match(&mut state, window, seqid) {
                    return Ok(Some(msg));
                }
                if self.poll_locked(&mut state)? > 0 {
                    if let Some(msg) = self.take_match(&mut state, window, seqid) {
                        return Ok(Some(msg));
                    }
                }
            }

            if !wait {
                return Ok(None);
            }

            let mut timeout = self.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    log::warn!("Timed out waiting for reply seq={}", seqid);
                    return Err(ClientError::Timeout { seqid });
                }
                timeout = timeout.min(deadline - now);
            }
            // Bounded: another thread may drain the socket before we wake
            self.transport.wait_readable(timeout).map_err(transport_error)?;
        }
    }

    /// Block until the reply carrying `seqid` arrives
    pub fn request_reply(&self, seqid: u32) -> ClientResult<Message> {
        let deadline = self.reply_timeout.map(|t| Instant::now() + t);
        match self.next_until(None, seqid, true, deadline)? {
            Some(msg) => Ok(msg),
            None => Err(ClientError::Timeout { seqid }),
        }
    }

    /// Send `msg` and wait for its reply. Error replies become
    /// [`ClientError::Server`]; a reply of the wrong kind becomes
    /// [`ClientError::UnexpectedReply`].
    pub fn request(&self, msg: &mut Message) -> ClientResult<Message> {
        let seqid = self.send(msg)?;
        let reply = self.request_reply(seqid)?;
        if reply.kind == MessageKind::Error {
            let code = reply.error_code().unwrap_or(0);
            log::debug!("request {} seq={} failed: errno {}", msg.kind, seqid, code);
            return Err(ClientError::Server {
                seqid,
                errno: Errno::from_raw(code),
            });
        }
        if let Some(expected) = msg.kind.reply_kind() {
            if reply.kind != expected {
                return Err(ClientError::UnexpectedReply {
                    expected,
                    got: reply.kind,
                });
            }
        }
        log::debug!("reply {} seq={}", reply.kind, seqid);
        Ok(reply)
    }

    /// Messages waiting in the queue
    pub fn pending(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Discard every queued message, returning entries to the pool
    pub fn drain(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.entries.len();
        while let Some(node) = state.entries.pop_front() {
            self.pools.nodes.put(node);
        }
        count
    }

    pub fn pools(&self) -> &Arc<Pools> {
        &self.pools
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let dropped = self.drain();
        if dropped > 0 {
            log::debug!("Discarded {} undelivered messages", dropped);
        }
    }
}

fn matches(msg: &Message, window: Option<WinId>, seqid: u32) -> bool {
    if let Some(window) = window {
        if msg.dest != window {
            return false;
        }
    }
    if seqid == SEQ_ANY {
        !msg.is_internal()
    } else {
        msg.seqid == seqid
    }
}

fn transport_error(e: io::Error) -> ClientError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe => {
            log::error!("Display server connection lost: {}", e);
            ClientError::Disconnected
        }
        _ => ClientError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::connection::UnixTransport;
    use std::os::unix::net::UnixDatagram;

    fn setup() -> (Connection, UnixDatagram) {
        let config = ClientConfig::testing();
        let (a, b) = UnixDatagram::pair().unwrap();
        let conn = Connection::new(
            Box::new(UnixTransport::from_socket(a).unwrap()),
            Arc::new(crate::pool::Pools::new(&config)),
            config.poll_interval,
            Some(Duration::from_millis(100)),
        );
        (conn, b)
    }

    fn event(kind: MessageKind, seqid: u32, dest: WinId) -> Message {
        let mut msg = Message::new(kind, WinId::ROOT, dest, Payload::Empty);
        msg.seqid = seqid;
        msg
    }

    fn deliver(server: &UnixDatagram, msg: &Message) {
        server.send(&msg.encode().unwrap()).unwrap();
    }

    #[test]
    fn test_send_assigns_fresh_nonzero_seqids() {
        let (conn, server) = setup();
        let mut a = event(MessageKind::WinShow, 0, WinId::ROOT);
        let mut b = event(MessageKind::WinHide, 0, WinId::ROOT);
        let first = conn.send(&mut a).unwrap();
        let second = conn.send(&mut b).unwrap();
        assert_ne!(first, SEQ_NONE);
        assert!(second > first);

        let mut buf = [0u8; MAX_MESSAGE_LEN];
        let n = server.recv(&mut buf).unwrap();
        assert_eq!(Message::decode(&buf[..n]).unwrap().seqid, first);
    }

    #[test]
    fn test_next_preserves_arrival_order_per_window() {
        let (conn, server) = setup();
        let w1 = WinId::new(1, 1);
        let w2 = WinId::new(1, 2);
        deliver(&server, &event(MessageKind::WinShown, 0, w1));
        deliver(&server, &event(MessageKind::FocusGained, 0, w2));
        deliver(&server, &event(MessageKind::WinRaised, 0, w1));

        let first = conn.next(Some(w1), SEQ_ANY, false).unwrap().unwrap();
        let second = conn.next(Some(w1), SEQ_ANY, false).unwrap().unwrap();
        assert_eq!(first.kind, MessageKind::WinShown);
        assert_eq!(second.kind, MessageKind::WinRaised);
        assert!(conn.next(Some(w1), SEQ_ANY, false).unwrap().is_none());
        assert_eq!(conn.next(None, SEQ_ANY, false).unwrap().unwrap().kind, MessageKind::FocusGained);
    }

    #[test]
    fn test_any_skips_internal_replies() {
        let (conn, server) = setup();
        let w = WinId::new(1, 1);
        deliver(&server, &event(MessageKind::WinCreated, 7, w));
        deliver(&server, &event(MessageKind::MouseMotion, 0, w));

        let got = conn.next(None, SEQ_ANY, false).unwrap().unwrap();
        assert_eq!(got.kind, MessageKind::MouseMotion);
        assert!(conn.next(None, SEQ_ANY, false).unwrap().is_none());
        assert_eq!(conn.pending(), 1);

        let reply = conn.next(None, 7, false).unwrap().unwrap();
        assert_eq!(reply.kind, MessageKind::WinCreated);
        assert_eq!(conn.pending(), 0);
    }

    #[test]
    fn test_invalid_reply_is_normalized() {
        let (conn, server) = setup();
        let mut reply = event(MessageKind::ResourceLoaded, 3, WinId::ROOT);
        reply.valid = false;
        reply.payload = Payload::Error(Errno::ENOENT as i32);
        deliver(&server, &reply);

        let got = conn.request_reply(3).unwrap();
        assert_eq!(got.kind, MessageKind::Error);
        assert_eq!(got.error_code(), Some(Errno::ENOENT as i32));
    }

    #[test]
    fn test_request_reply_times_out() {
        let (conn, _server) = setup();
        match conn.request_reply(42) {
            Err(ClientError::Timeout { seqid }) => assert_eq!(seqid, 42),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_waiting_next_sees_late_message() {
        let (conn, server) = setup();
        let w = WinId::new(1, 1);
        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            deliver(&server, &event(MessageKind::WinClosing, 0, w));
            server
        });
        let got = conn.next(Some(w), SEQ_ANY, true).unwrap().unwrap();
        assert_eq!(got.kind, MessageKind::WinClosing);
        sender.join().unwrap();
    }

    #[test]
    fn test_waiting_reply_survives_drain_by_other_thread() {
        let config = ClientConfig::testing();
        let (a, server) = UnixDatagram::pair().unwrap();
        let conn = Connection::new(
            Box::new(UnixTransport::from_socket(a).unwrap()),
            Arc::new(crate::pool::Pools::new(&config)),
            config.poll_interval,
            Some(Duration::from_secs(5)),
        );
        let w = WinId::new(1, 1);

        std::thread::scope(|s| {
            let waiter = s.spawn(|| {
                let reply = conn.request_reply(9);
                (reply, Instant::now())
            });
            std::thread::sleep(Duration::from_millis(30));

            // Read both datagrams here so the waiter never sees the socket
            // become readable with its reply in it
            {
                let mut state = conn.state.lock();
                deliver(&server, &event(MessageKind::WinCreated, 9, w));
                deliver(&server, &event(MessageKind::MouseMotion, 0, w));
                assert_eq!(conn.poll_locked(&mut state).unwrap(), 2);
            }
            let drained = Instant::now();

            let got = conn.next(None, SEQ_ANY, false).unwrap().unwrap();
            assert_eq!(got.kind, MessageKind::MouseMotion);
            assert!(conn.next(None, SEQ_ANY, false).unwrap().is_none());

            let (reply, at) = waiter.join().unwrap();
            let reply = reply.unwrap();
            assert_eq!(reply.kind, MessageKind::WinCreated);
            assert_eq!(reply.seqid, 9);
            assert!(at.duration_since(drained) < Duration::from_millis(500));
        });
        assert_eq!(conn.pending(), 0);
    }

    #[test]
    fn test_undecodable_datagrams_are_dropped() {
        let (conn, server) = setup();
        server.send(&[1, 2, 3]).unwrap();
        deliver(&server, &event(MessageKind::WinShown, 0, WinId::ROOT));
        assert_eq!(conn.poll().unwrap(), 1);
    }

    #[test]
    fn test_drain_returns_entries_to_pool() {
        let (conn, server) = setup();
        let before = conn.pools().nodes.available();
        for _ in 0..3 {
            deliver(&server, &event(MessageKind::WinShown, 0, WinId::ROOT));
        }
        conn.poll().unwrap();
        assert_eq!(conn.pools().nodes.available(), before - 3);
        assert_eq!(conn.drain(), 3);
        assert_eq!(conn.pools().nodes.available(), before);
        assert_eq!(conn.pools().nodes.outstanding(), 0);
    }
}
