//! Non-blocking TCP front end.
//!
//! Every packet in either direction is a varint length followed by a varint
//! id and the body. Clients send
//!
//! | id | packet | body |
//! |---|---|---|
//! | `0x00` | login | name |
//! | `0x01` | ping | `u64` |
//! | `0x02` | set block | `x, y, h: i16`, block `u8` |
//! | `0x03` | message | string; lines starting with `/` are commands |
//!
//! and receive the [`Response`]s. Integers are big-endian, strings are a
//! varint length and utf-8.

use crate::prelude::*;

mod response;
mod inboxes;
pub mod wire;
pub mod client;

pub use response::Response;
pub use inboxes::Inboxes;
pub use client::Session;

/// Marks a client that sent something it shouldn't. The connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnection(());
impl Disconnection {
    pub fn new() -> Self {
        Self(())
    }
}
impl Default for Disconnection {
    fn default() -> Self {
        Self::new()
    }
}

/// Who a response goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    /// Every logged in client in `world`, except possibly one.
    World { world: usize, except: Option<usize> },
    Client(usize),
}

/// Where the game sends its responses. Implemented by the network, and by
/// recorders in tests.
pub trait Clients {
    fn submit(&mut self, to: Recipients, response: Response);
    /// How many logged in clients are in `world`.
    fn players_in(&self, world: usize) -> usize;
}
impl<C: Clients + ?Sized> Clients for &mut C {
    fn submit(&mut self, to: Recipients, response: Response) {
        (**self).submit(to, response)
    }
    fn players_in(&self, world: usize) -> usize {
        (**self).players_in(world)
    }
}

#[derive(Debug)]
pub struct Network {
    pub(super) listener: std::net::TcpListener,
    pub(super) scratch_buffer: Vec<u8>,
    pub(super) packet_buffer: Vec<u8>,

    pub(super) poller: polling::Poller,
    pub(super) events: Vec<polling::Event>,

    pub(super) clients: SlotMap<client::Client>,
}

const LISTENER: usize = usize::MAX - 1;
impl Network {
    pub fn new(addr: &str) -> io::Result<Self> {
        let poller = polling::Poller::new()?;

        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        poller.add(&listener, polling::Event::readable(LISTENER))?;
        log::info!("listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            scratch_buffer: vec![0; 64 * 1024],
            packet_buffer: vec![],

            poller,
            events: vec![],

            clients: SlotMap::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn process_packets_until(&mut self, deadline: time::Instant, server: &mut crate::Server) -> io::Result<()> {
        loop {
            let Some(timeout) = deadline.checked_duration_since(time::Instant::now()) else {
                return Ok(());
            };
            match self.poller.wait(&mut self.events, Some(timeout)) {
                Ok(0) => return Ok(()),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
            while let Some(event) = self.events.pop() {
                if event.key == LISTENER {
                    self.poller.modify(&self.listener, polling::Event::readable(LISTENER))?;
                    self.accept_players();
                    continue;
                }
                if self.process_event(event, server).is_err() {
                    self.disconnect(event.key, server);
                }
            }
        }
    }
    fn process_event(&mut self, event: polling::Event, server: &mut crate::Server) -> Result<(), Disconnection> {
        let client = self.clients.get_mut(event.key).ok_or(Disconnection::new())?;
        let was_waiting_for_write = core::mem::take(&mut client.waiting_for_write);

        if event.readable {
            // may set the waiting_for_write flag
            client::Client::read(self, server, event.key)?;
        }
        let client = self.clients.get_mut(event.key).ok_or(Disconnection::new())?;
        if event.writable {
            client.write(server, &mut self.packet_buffer)?;
        }
        self.poller
            .modify(client.conn(), polling::Event {
                key: event.key,
                readable: true,
                writable: client.waiting_for_write || (was_waiting_for_write && !event.writable),
            })
            .map_err(|_| Disconnection::new())
    }
    fn disconnect(&mut self, idx: usize, server: &mut crate::Server) {
        if let Some(client) = self.clients.remove(idx) {
            log::debug!("client disconnected {idx}");
            if let Err(e) = self.poller.delete(client.conn()) {
                log::warn!("could not stop polling client {idx}: {e}");
            }
            server.logout(idx, client.session());
        }
    }
    fn accept_players(&mut self) {
        loop {
            match self.listener.accept() {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("failed to accept connection: {e}");
                    break;
                }
                Ok((conn, addr)) => {
                    let client = match client::Client::accept(conn) {
                        Ok(client) => client,
                        Err(e) => {
                            log::warn!("dropping connection from {addr}: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = self.poller.add(client.conn(), polling::Event::readable(self.clients.next_key())) {
                        log::warn!("dropping connection from {addr}: {e}");
                        continue;
                    }
                    let idx = self.clients.insert(client);
                    log::debug!("new player connected from {addr} as {idx}");
                }
            };
        }
    }
}
