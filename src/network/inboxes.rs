use super::*;

pub struct Inboxes<'a>(pub(super) &'a mut Network);

impl Network {
    /// Used by the server to send updates to the network
    pub fn inboxes(&mut self) -> Inboxes<'_> {
        Inboxes(self)
    }
}

impl Inboxes<'_> {
    /// Calls `send` on each logged in client, and makes sure the poller wakes
    /// up for any that now have something to write.
    fn for_each_playing(&mut self, mut send: impl FnMut(usize, client::Inbox)) {
        let poller = &self.0.poller;
        for (idx, client) in self.0.clients.iter_mut() {
            if client.is_playing() {
                deliver(poller, idx, client, &mut send);
            }
        }
    }
    fn send_to(&mut self, idx: usize, response: Response) {
        if let Some(client) = self.0.clients.get_mut(idx) {
            deliver(&self.0.poller, idx, client, |_, mut inbox| inbox.submit(response));
        }
    }
}

fn deliver(poller: &polling::Poller, idx: usize, client: &mut client::Client, send: impl FnOnce(usize, client::Inbox)) {
    let was_waiting_for_write = core::mem::take(&mut client.waiting_for_write);
    send(idx, client.inbox());
    if client.waiting_for_write && !was_waiting_for_write {
        if let Err(e) = poller.modify(client.conn(), polling::Event::all(idx)) {
            log::warn!("could not wake writer for client {idx}: {e}");
        }
    }
    client.waiting_for_write |= was_waiting_for_write;
}

impl Clients for Inboxes<'_> {
    fn submit(&mut self, to: Recipients, response: Response) {
        match to {
            Recipients::Client(idx) => self.send_to(idx, response),
            Recipients::World { world, except } => self.for_each_playing(|idx, mut inbox| {
                if Some(idx) != except && inbox.session().map(|s| s.world) == Some(world) {
                    inbox.submit(response.clone());
                }
            }),
        }
    }
    fn players_in(&self, world: usize) -> usize {
        self.0
            .clients
            .iter()
            .filter(|(_, client)| client.session().map(|s| s.world) == Some(world))
            .count()
    }
}
