use crate::prelude::*;
use std::collections::VecDeque;
use std::io::{Read, Write};

use super::{wire, Disconnection};

/// Larger frames are never valid; a client that sends one is dropped.
pub(super) const MAX_PACKET_LEN: usize = 1024;

/// Who a client is once logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub player: PlayerId,
    pub name: Name,
    pub world: usize,
}

#[derive(Debug, Copy, Clone)]
pub(super) enum State {
    Login,
    Play(Session),
}
#[derive(Debug)]
pub struct Inbox<'a>(&'a mut Client);
impl Inbox<'_> {
    pub fn submit(&mut self, response: Response) {
        self.0.queue.push_back(response);
        self.0.waiting_for_write = true;
    }
    pub fn session(&self) -> Option<Session> {
        self.0.session()
    }
}

pub struct Client {
    conn: TcpStream,
    state: State,
    queue: VecDeque<Response>,
    pending_bytes: Vec<u8>,
    pending_byte_cursor: usize,
    received: Vec<u8>,

    pub(super) waiting_for_write: bool,
}
impl Client {
    pub(super) fn is_playing(&self) -> bool {
        matches!(self.state, State::Play(_))
    }
    pub(super) fn session(&self) -> Option<Session> {
        match self.state {
            State::Play(session) => Some(session),
            State::Login => None,
        }
    }
    pub(super) fn conn(&self) -> &TcpStream {
        &self.conn
    }
    pub(super) fn inbox(&mut self) -> Inbox<'_> {
        Inbox(self)
    }
    pub fn accept(conn: TcpStream) -> io::Result<Self> {
        conn.set_nonblocking(true)?;
        Ok(Self {
            conn,
            queue: Default::default(),
            state: State::Login,
            pending_bytes: vec![],
            pending_byte_cursor: 0,
            received: vec![],
            waiting_for_write: false,
        })
    }
    /// Sends as much of the queue as the socket takes without blocking.
    pub fn write(&mut self, server: &crate::Server, buf: &mut Vec<u8>) -> Result<(), Disconnection> {
        // flush buffer of any half-sent packets
        if !self.send_pending()? {
            return Ok(());
        }
        let world = match self.state {
            State::Play(session) => session.world,
            State::Login => usize::MAX,
        };
        while let Some(response) = self.queue.pop_front() {
            let sending = response.write(server, world, buf);
            log::trace!("sending {response:?} {}kb", sending.len() as f64 / 1024.0);
            self.pending_bytes.clear();
            self.pending_bytes.extend_from_slice(sending);
            self.pending_byte_cursor = 0;
            if !self.send_pending()? {
                return Ok(());
            }
        }
        Ok(())
    }
    /// Returns `false` if the socket filled up first.
    fn send_pending(&mut self) -> Result<bool, Disconnection> {
        while self.pending_byte_cursor < self.pending_bytes.len() {
            match self.conn.write(&self.pending_bytes[self.pending_byte_cursor..]) {
                Ok(0) => return Err(Disconnection::new()),
                Ok(n) => self.pending_byte_cursor += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.waiting_for_write = true;
                    return Ok(false);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::debug!("write failed: {e}");
                    return Err(Disconnection::new());
                }
            }
        }
        Ok(true)
    }
    pub fn read(network: &mut super::Network, server: &mut crate::Server, id: usize) -> Result<(), Disconnection> {
        let mut scratch = core::mem::take(&mut network.scratch_buffer);
        let res = Self::receive(network, server, id, &mut scratch);
        network.scratch_buffer = scratch;
        res
    }
    fn receive(network: &mut super::Network, server: &mut crate::Server, id: usize, scratch: &mut [u8]) -> Result<(), Disconnection> {
        loop {
            let client = network.clients.get_mut(id).ok_or(Disconnection::new())?;
            let n = match client.conn.read(scratch) {
                Ok(0) => return Err(Disconnection::new()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("read failed for client {id}: {e}");
                    return Err(Disconnection::new());
                }
            };
            let mut received = core::mem::take(&mut client.received);
            received.extend_from_slice(&scratch[..n]);
            let mut buf = &received[..];
            while let Some((pkt, rem)) = wire::str(buf) {
                buf = rem;
                Self::handle(network, server, id, pkt)?;
            }
            if buf.len() > MAX_PACKET_LEN {
                log::debug!("client {id} sent an oversized packet");
                return Err(Disconnection::new());
            }
            let consumed = received.len() - buf.len();
            received.drain(..consumed);
            if let Some(client) = network.clients.get_mut(id) {
                client.received = received;
            }
        }
    }
    fn handle(network: &mut super::Network, server: &mut crate::Server, id: usize, pkt: &[u8]) -> Result<(), Disconnection> {
        log::trace!("client {id} sent {} bytes", pkt.len());
        let state = network.clients.get(id).ok_or(Disconnection::new())?.state;
        match state {
            State::Login => {
                let session = server.login(id, login_request(pkt)?, &mut super::Inboxes(network))?;
                if let Some(client) = network.clients.get_mut(id) {
                    client.state = State::Play(session);
                }
                Ok(())
            }
            State::Play(session) => server.play_request(id, session, &mut super::Inboxes(network), pkt),
        }
    }
}
impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fields = f.debug_struct("Client");
        if let Ok(addr) = self.conn.peer_addr() {
            fields.field("conn", &addr);
        }
        fields.field("state", &self.state);
        fields.finish()
    }
}

fn login_request(pkt: &[u8]) -> Result<Name, Disconnection> {
    let (id, pkt) = wire::varint(pkt).ok_or(Disconnection::new())?;
    match id {
        0x00 => Ok(wire::Wire::decode(pkt)?.0),
        _ => Err(Disconnection::new()),
    }
}
