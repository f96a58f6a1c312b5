use std::str::FromStr;
use std::time::Duration;

use crate::prelude::*;
use crate::blockdb::{unix_now, ChangeRecord};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::network::wire::{self, Wire};
use crate::network::{Disconnection, Session};
use crate::players::PlayerDirectory;
use crate::world::draw::DrawOp;
use crate::world::{Map, Origin, PendingUpdate, World};

/// How many records `/binfo` and `/bhist` list by default.
const DEFAULT_LISTED: usize = 10;

/// Why a command did nothing. Shown to whoever ran it.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command /{0}")]
    Unknown(String),
    #[error("usage: /{0}")]
    Usage(&'static str),
    #[error("unknown block {0:?}")]
    UnknownBlock(String),
    #[error("no player named {0:?}")]
    UnknownPlayer(String),
    #[error("no world named {0:?}")]
    UnknownWorld(String),
    #[error("only the console may do that")]
    NotAllowed,
    #[error("the map is not loaded")]
    Unloaded,
    #[error("that is outside the map")]
    OutsideMap,
    #[error("block log: {0}")]
    Log(#[from] Error),
}

// Owns every world and the player directory, and turns client requests and
// commands into queued updates, draw operations and log queries.
pub struct Server {
    config: Config,
    db: Arc<BlockDb>,
    worlds: Vec<World>,
    players: PlayerDirectory,
    tick: u32,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        if config.worlds.is_empty() {
            return Err(Error::InvalidWorld("at least one world is needed".into()));
        }
        std::fs::create_dir_all(&config.data_dir)?;
        let db = Arc::new(BlockDb::new(&config.data_dir, config.blockdb.enabled));
        let mut worlds: Vec<World> = vec![];
        for (id, settings) in config.worlds.iter().enumerate() {
            if worlds.iter().any(|w| w.name() == settings.name) {
                return Err(Error::InvalidWorld(format!("{} is configured twice", settings.name)));
            }
            let dims = V3(settings.width, settings.length, settings.height);
            let map = Map::flatgrass(dims)?;
            let log = db.log(&settings.name);
            config.blockdb.world(&settings.name).apply(&log, config.blockdb.durable_flush)?;
            log::info!(
                "loaded {} {dims}, block log {}",
                settings.name,
                if log.is_accepting() { "on" } else { "off" }
            );
            worlds.push(World::new(id, &settings.name, map, log));
        }
        let players = PlayerDirectory::open(config.data_dir.join("players.json"))?;
        Ok(Self { config, db, worlds, players, tick: 0 })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
    pub fn db(&self) -> &Arc<BlockDb> {
        &self.db
    }
    pub fn world(&self, id: usize) -> Option<&World> {
        self.worlds.get(id)
    }
    pub fn world_mut(&mut self, id: usize) -> Option<&mut World> {
        self.worlds.get_mut(id)
    }
    pub fn world_by_name(&self, name: &str) -> Option<&World> {
        self.worlds.iter().find(|w| w.name() == name)
    }
    pub fn players(&self) -> &PlayerDirectory {
        &self.players
    }

    pub fn tick_until(&mut self, tickn: u32, mut clients: impl Clients) {
        while self.tick < tickn {
            self.tick(&mut clients);
            self.tick += 1;
        }
    }
    pub fn next_tick(&self) -> u32 {
        self.tick + 1
    }
    fn tick(&mut self, clients: &mut impl Clients) {
        for world in &mut self.worlds {
            let players = clients.players_in(world.id());
            let budget = self.config.throttling.tick_budget(players, world.is_flushing());
            let report = world.tick(budget, &mut *clients);
            if report.applied + report.drawn > 0 {
                log::trace!("{}: {} updates, {} drawn", world.name(), report.applied, report.drawn);
            }
        }
    }

    /// Registers the player if they're new and puts them in the first world.
    pub fn login(&mut self, client: usize, name: Name, clients: &mut impl Clients) -> Result<Session, Disconnection> {
        let player = self.players.get_or_insert(name.as_str()).map_err(|e| {
            log::error!("could not register {name}: {e}");
            Disconnection::new()
        })?;
        let world = &self.worlds[0];
        let session = Session { player, name, world: world.id() };
        log::info!("{name} joined {} as client {client}", world.name());
        clients.submit(Recipients::Client(client), Response::Welcome(player, world.name().to_owned()));
        clients.submit(Recipients::Client(client), Response::LevelData());
        clients.submit(
            Recipients::World { world: world.id(), except: Some(client) },
            Response::Message(format!("{name} joined")),
        );
        Ok(session)
    }

    pub fn logout(&mut self, client: usize, session: Option<Session>) {
        for world in &mut self.worlds {
            world.forget_client(client);
        }
        if let Some(session) = session {
            log::info!("{} left", session.name);
        }
    }

    pub(crate) fn play_request(&mut self, client: usize, session: Session, clients: &mut impl Clients, pkt: &[u8]) -> Result<(), Disconnection> {
        let (id, pkt) = wire::varint(pkt).ok_or(Disconnection::new())?;
        match id {
            0x01 => clients.submit(Recipients::Client(client), Response::Pong(decode(pkt)?)),
            0x02 => {
                let (pos, block): (V3<i16>, Block) = decode(pkt)?;
                let origin = Origin { player: session.player, client: Some(client) };
                self.place_block(session.world, V3::from(pos), block, origin);
            }
            0x03 => {
                let text: &str = decode(pkt)?;
                self.message(client, session, text, clients);
            }
            _ => {
                log::debug!("client {client} sent unknown packet 0x{id:02x}");
                return Err(Disconnection::new());
            }
        }
        Ok(())
    }

    /// Queues a single block edit. Returns `false` if the world's map isn't
    /// loaded.
    pub fn place_block(&self, world: usize, pos: V3<i32>, block: Block, origin: Origin) -> bool {
        self.worlds
            .get(world)
            .is_some_and(|w| w.queue_update(PendingUpdate { pos, block, origin }))
    }

    fn message(&mut self, client: usize, session: Session, text: &str, clients: &mut impl Clients) {
        match text.strip_prefix('/') {
            Some(command) => {
                let origin = Origin { player: session.player, client: Some(client) };
                for reply in self.run_command(origin, session.world, command) {
                    clients.submit(Recipients::Client(client), Response::Message(reply));
                }
            }
            None => {
                log::info!("<{}> {text}", session.name);
                clients.submit(
                    Recipients::World { world: session.world, except: None },
                    Response::Message(format!("<{}> {text}", session.name)),
                );
            }
        }
    }

    /// Runs one command line (without the leading `/`) on behalf of `origin`
    /// in `world`, returning the lines to show them.
    pub fn run_command(&mut self, origin: Origin, world: usize, line: &str) -> Vec<String> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return vec![];
        };
        let args: Vec<&str> = words.collect();
        let result = match command {
            "binfo" => self.block_info(world, &args),
            "bhist" => self.block_history(world, &args),
            "bflush" => self.flush_log(world),
            "bclear" => self.clear_log(origin, world),
            "btrim" => self.trim_log(origin, world, &args),
            "cuboid" | "replace" | "line" => self.draw(origin, world, command, &args),
            "cancel" => self.cancel(origin, world),
            "regen" => self.regenerate(origin, &args),
            "unload" => self.unload(origin, &args),
            _ => Err(CommandError::Unknown(command.to_owned())),
        };
        result.unwrap_or_else(|e| vec![e.to_string()])
    }

    fn log_of(&self, world: usize) -> Result<&Arc<ChangeLog>, CommandError> {
        self.worlds.get(world).map(World::log).ok_or(CommandError::Unloaded)
    }

    fn block_info(&self, world: usize, args: &[&str]) -> Result<Vec<String>, CommandError> {
        const USAGE: &str = "binfo <x> <y> <h>";
        let pos: V3<i16> = coords(args, USAGE)?;
        let records = self.log_of(world)?.lookup_by_coordinate(pos)?;
        if records.is_empty() {
            return Ok(vec![format!("no changes recorded at {pos}")]);
        }
        let now = unix_now();
        let shown = records.len().min(DEFAULT_LISTED);
        let mut lines = vec![format!("{} changes at {pos}, newest first:", records.len())];
        lines.extend(records.iter().rev().take(shown).map(|r| {
            format!("{} ago {}: {} -> {}", ago(now, r), self.player_name(r.player), r.old_block.name(), r.new_block.name())
        }));
        Ok(lines)
    }

    fn block_history(&self, world: usize, args: &[&str]) -> Result<Vec<String>, CommandError> {
        const USAGE: &str = "bhist <player> [count | <seconds>s]";
        let name = *args.first().ok_or(CommandError::Usage(USAGE))?;
        let player = self.player_id(name)?;
        let log = self.log_of(world)?;
        let records = match args.get(1) {
            None => log.lookup_by_player(player, DEFAULT_LISTED)?,
            Some(arg) => match arg.strip_suffix('s') {
                Some(secs) => {
                    let secs = secs.parse().map_err(|_| CommandError::Usage(USAGE))?;
                    log.lookup_by_player_within(player, Duration::from_secs(secs))?
                }
                None => log.lookup_by_player(player, arg.parse().map_err(|_| CommandError::Usage(USAGE))?)?,
            },
        };
        if records.is_empty() {
            return Ok(vec![format!("no changes by {name}")]);
        }
        let now = unix_now();
        let mut lines = vec![format!("{} blocks last changed by {name}:", records.len())];
        lines.extend(records.iter().map(|r| {
            format!("{} {} -> {} ({} ago)", r.pos, r.old_block.name(), r.new_block.name(), ago(now, r))
        }));
        Ok(lines)
    }

    fn flush_log(&self, world: usize) -> Result<Vec<String>, CommandError> {
        let written = self.log_of(world)?.flush()?;
        Ok(vec![format!("flushed {written} block changes")])
    }

    fn clear_log(&self, origin: Origin, world: usize) -> Result<Vec<String>, CommandError> {
        console_only(origin)?;
        let log = self.log_of(world)?;
        log.clear()?;
        log::warn!("block log for {} cleared", log.world());
        Ok(vec![format!("block log for {} cleared", log.world())])
    }

    fn trim_log(&self, origin: Origin, world: usize, args: &[&str]) -> Result<Vec<String>, CommandError> {
        const USAGE: &str = "btrim <count> | btrim <seconds>s";
        console_only(origin)?;
        let log = self.log_of(world)?;
        let arg = *args.first().ok_or(CommandError::Usage(USAGE))?;
        match arg.strip_suffix('s') {
            Some(secs) => log.enforce_age_limit(Duration::from_secs(secs.parse().map_err(|_| CommandError::Usage(USAGE))?))?,
            None => log.enforce_count_limit(arg.parse().map_err(|_| CommandError::Usage(USAGE))?)?,
        }
        Ok(vec![format!("block log for {} trimmed", log.world())])
    }

    fn draw(&mut self, origin: Origin, world: usize, kind: &str, args: &[&str]) -> Result<Vec<String>, CommandError> {
        let usage = match kind {
            "cuboid" => "cuboid <x1> <y1> <h1> <x2> <y2> <h2> <block>",
            "replace" => "replace <x1> <y1> <h1> <x2> <y2> <h2> <from> <to>",
            _ => "line <x1> <y1> <h1> <x2> <y2> <h2> <block>",
        };
        let blocks_needed = if kind == "replace" { 2 } else { 1 };
        if args.len() != 6 + blocks_needed {
            return Err(CommandError::Usage(usage));
        }
        let a: V3<i32> = coords(&args[..3], usage)?;
        let b: V3<i32> = coords(&args[3..6], usage)?;
        let block = |arg: &str| Block::from_str(arg).map_err(|()| CommandError::UnknownBlock(arg.to_owned()));
        let world = self.worlds.get_mut(world).ok_or(CommandError::Unloaded)?;
        let map = world.map().ok_or(CommandError::Unloaded)?;
        let op: Box<dyn FnOnce(u64) -> DrawOp> = match kind {
            "cuboid" => {
                let block = block(args[6])?;
                let (a, b) = map.clip(a, b).ok_or(CommandError::OutsideMap)?;
                Box::new(move |id| DrawOp::cuboid(id, a, b, block, origin))
            }
            "replace" => {
                let (from, to) = (block(args[6])?, block(args[7])?);
                let (a, b) = map.clip(a, b).ok_or(CommandError::OutsideMap)?;
                Box::new(move |id| DrawOp::replace(id, a, b, from, to, origin))
            }
            _ => {
                let block = block(args[6])?;
                if !(map.in_bounds(a) && map.in_bounds(b)) {
                    return Err(CommandError::OutsideMap);
                }
                Box::new(move |id| DrawOp::line(id, a, b, block, origin))
            }
        };
        let mut started = 0;
        world
            .start_draw(|id| {
                started = id;
                op(id)
            })
            .ok_or(CommandError::Unloaded)?;
        Ok(vec![format!("started {kind} #{started}")])
    }

    fn cancel(&self, origin: Origin, world: usize) -> Result<Vec<String>, CommandError> {
        let world = self.worlds.get(world).ok_or(CommandError::Unloaded)?;
        let cancelled = world.cancel_draws(origin.player);
        Ok(vec![format!("cancelled {cancelled} draw operations")])
    }

    fn named_world(&mut self, name: &str) -> Result<&mut World, CommandError> {
        self.worlds
            .iter_mut()
            .find(|w| w.name() == name)
            .ok_or_else(|| CommandError::UnknownWorld(name.to_owned()))
    }

    /// Replaces a world's map with fresh terrain, loading it again if it was
    /// unloaded. Clients are sent the new level once the world's queue has
    /// drained.
    fn regenerate(&mut self, origin: Origin, args: &[&str]) -> Result<Vec<String>, CommandError> {
        console_only(origin)?;
        let name = *args.first().ok_or(CommandError::Usage("regen <world>"))?;
        let world = self.named_world(name)?;
        let map = Map::flatgrass(world.dims())?;
        world.load(map);
        world.begin_flush();
        Ok(vec![format!("regenerated {name}")])
    }

    /// Drops a world's map after the first tick that changes nothing.
    fn unload(&mut self, origin: Origin, args: &[&str]) -> Result<Vec<String>, CommandError> {
        console_only(origin)?;
        let name = *args.first().ok_or(CommandError::Usage("unload <world>"))?;
        let world = self.named_world(name)?;
        if world.map().is_none() {
            return Err(CommandError::Unloaded);
        }
        world.request_unload();
        Ok(vec![format!("unloading {name}")])
    }

    fn player_id(&self, name: &str) -> Result<PlayerId, CommandError> {
        if name == "console" {
            return Ok(PlayerId::CONSOLE);
        }
        self.players.id_of(name).ok_or_else(|| CommandError::UnknownPlayer(name.to_owned()))
    }
    fn player_name(&self, id: PlayerId) -> String {
        match self.players.name_of(id) {
            _ if id == PlayerId::CONSOLE => "console".to_owned(),
            Some(name) => name.to_owned(),
            None => format!("player #{}", id.0),
        }
    }
}

fn decode<'a, T: Wire<'a>>(pkt: &'a [u8]) -> Result<T, Disconnection> {
    Ok(T::decode(pkt)?.0)
}

fn console_only(origin: Origin) -> Result<(), CommandError> {
    (origin.player == PlayerId::CONSOLE).then_some(()).ok_or(CommandError::NotAllowed)
}

fn coords<T: FromStr>(args: &[&str], usage: &'static str) -> Result<V3<T>, CommandError> {
    match args {
        [x, y, z, ..] => {
            let parse = |s: &str| s.parse::<T>().map_err(|_| CommandError::Usage(usage));
            Ok(V3(parse(x)?, parse(y)?, parse(z)?))
        }
        _ => Err(CommandError::Usage(usage)),
    }
}

fn ago(now: u32, record: &ChangeRecord) -> String {
    let secs = now.saturating_sub(record.timestamp);
    match secs {
        0..=119 => format!("{secs}s"),
        120..=7199 => format!("{}m", secs / 60),
        _ => format!("{}h", secs / 3600),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::world::tests::Outbox;

    fn server(dir: &std::path::Path) -> Server {
        let config = Config {
            data_dir: dir.to_owned(),
            worlds: vec![
                WorldConfig { name: "main".into(), width: 16, length: 16, height: 16 },
                WorldConfig { name: "other".into(), width: 8, length: 8, height: 8 },
            ],
            ..Config::default()
        };
        Server::new(config).unwrap()
    }

    fn login(server: &mut Server, client: usize, name: &str, out: &mut Outbox) -> Session {
        server.login(client, Name::new(name).unwrap(), out).unwrap()
    }

    fn packet(id: u8, body: &[u8]) -> Vec<u8> {
        let mut pkt = vec![id];
        pkt.extend_from_slice(body);
        pkt
    }

    #[test]
    fn rejects_bad_world_lists() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { data_dir: dir.path().to_owned(), worlds: vec![], ..Config::default() };
        assert!(Server::new(config).is_err());
        let config = Config {
            data_dir: dir.path().to_owned(),
            worlds: vec![WorldConfig::default(), WorldConfig::default()],
            ..Config::default()
        };
        assert!(matches!(Server::new(config), Err(Error::InvalidWorld(_))));
    }

    #[test]
    fn login_sends_the_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(dir.path());
        let mut out = Outbox::default();
        let session = login(&mut server, 4, "alice", &mut out);
        assert_eq!(session.world, 0);
        assert_eq!(session.player, PlayerId(0));
        assert_eq!(out.sent[0], (Recipients::Client(4), Response::Welcome(PlayerId(0), "main".into())));
        assert_eq!(out.sent[1], (Recipients::Client(4), Response::LevelData()));
        assert_eq!(server.players().id_of("alice"), Some(PlayerId(0)));
    }

    #[test]
    fn placed_blocks_are_logged_and_queryable() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(dir.path());
        let mut out = Outbox::default();
        let session = login(&mut server, 1, "alice", &mut out);
        out.sent.clear();

        // set block at (1, 2, 12) to glass
        let pkt = packet(0x02, &[0, 1, 0, 2, 0, 12, 20]);
        server.play_request(1, session, &mut out, &pkt).unwrap();
        server.tick_until(1, &mut out);
        assert_eq!(out.sent, [(
            Recipients::World { world: 0, except: Some(1) },
            Response::SetBlock(V3(1, 2, 12), Block::GLASS),
        )]);
        assert_eq!(server.run_command(Origin::CONSOLE, 0, "bflush"), ["flushed 1 block changes"]);

        let lines = server.run_command(Origin::CONSOLE, 0, "binfo 1 2 12");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("alice: air -> glass"), "{lines:?}");

        let lines = server.run_command(Origin::CONSOLE, 0, "bhist alice 5");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("(1,2,12) air -> glass"), "{lines:?}");
        let lines = server.run_command(Origin::CONSOLE, 0, "bhist alice 3600s");
        assert_eq!(lines.len(), 2);
        assert_eq!(server.run_command(Origin::CONSOLE, 1, "binfo 1 2 12"), ["no changes recorded at (1,2,12)"]);
    }

    #[test]
    fn malformed_packets_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(dir.path());
        let mut out = Outbox::default();
        let session = login(&mut server, 1, "alice", &mut out);
        assert!(server.play_request(1, session, &mut out, &packet(0x02, &[0, 1, 0])).is_err());
        assert!(server.play_request(1, session, &mut out, &packet(0x02, &[0, 1, 0, 2, 0, 3, 99])).is_err());
        assert!(server.play_request(1, session, &mut out, &packet(0x7f, &[])).is_err());

        out.sent.clear();
        server.play_request(1, session, &mut out, &packet(0x01, &[0, 0, 0, 0, 0, 0, 0, 42])).unwrap();
        assert_eq!(out.sent, [(Recipients::Client(1), Response::Pong(42))]);
    }

    #[test]
    fn chat_and_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(dir.path());
        let mut out = Outbox::default();
        let session = login(&mut server, 1, "alice", &mut out);
        out.sent.clear();

        server.play_request(1, session, &mut out, &packet(0x03, b"\x05hello")).unwrap();
        assert_eq!(out.sent, [(
            Recipients::World { world: 0, except: None },
            Response::Message("<alice> hello".into()),
        )]);

        out.sent.clear();
        server.play_request(1, session, &mut out, &packet(0x03, b"\x06/bogus")).unwrap();
        assert_eq!(out.sent, [(Recipients::Client(1), Response::Message("unknown command /bogus".into()))]);

        let alice = Origin { player: session.player, client: Some(1) };
        assert_eq!(server.run_command(alice, 0, "bclear"), ["only the console may do that"]);
        assert_eq!(server.run_command(alice, 0, "binfo 1 2"), ["usage: /binfo <x> <y> <h>"]);
        assert_eq!(server.run_command(alice, 0, "bhist bob"), ["no player named \"bob\""]);
        assert_eq!(server.run_command(alice, 0, "cuboid 0 0 0 1 1 1 unobtainium"), ["unknown block \"unobtainium\""]);
    }

    #[test]
    fn draw_commands_run_over_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(dir.path());
        let mut out = Outbox::default();
        let session = login(&mut server, 1, "alice", &mut out);
        let alice = Origin { player: session.player, client: Some(1) };

        assert_eq!(server.run_command(alice, 0, "cuboid 0 0 10 3 3 10 gold"), ["started cuboid #1"]);
        assert_eq!(server.run_command(alice, 0, "line 0 0 11 0 0 15 stone"), ["started line #2"]);
        assert_eq!(server.run_command(alice, 0, "replace 0 0 0 15 15 15 grass sand"), ["started replace #3"]);
        out.players = 1;
        out.sent.clear();
        for n in 1..=30 {
            server.tick_until(n, &mut out);
        }
        let world = server.world(0).unwrap();
        assert!(world.map().unwrap().draw_ops().is_empty());
        assert_eq!(world.map().unwrap().get(V3(3, 3, 10)), Some(Block::GOLD));
        assert_eq!(world.map().unwrap().get(V3(0, 0, 7)), Some(Block::SAND));
        let summaries: Vec<_> = out
            .sent
            .iter()
            .filter_map(|(to, r)| match (to, r) {
                (Recipients::Client(1), Response::Message(m)) => Some(m.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(summaries, [
            "cuboid #1 done: 16 blocks updated, 0 skipped, 0 denied",
            "line #2 done: 5 blocks updated, 0 skipped, 0 denied",
            "replace #3 done: 256 blocks updated, 0 skipped, 0 denied",
        ]);
        let history = world.log().lookup_by_player(session.player, 1000).unwrap();
        assert_eq!(history.len(), 16 + 5 + 256);
    }

    #[test]
    fn draw_regions_are_clipped_to_the_map() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(dir.path());
        let mut out = Outbox::default();
        let session = login(&mut server, 1, "alice", &mut out);
        let alice = Origin { player: session.player, client: Some(1) };

        let outside = ["that is outside the map"];
        assert_eq!(server.run_command(alice, 0, "line -2147483648 0 0 2147483647 0 0 stone"), outside);
        assert_eq!(server.run_command(alice, 0, "line 0 0 0 16 0 0 stone"), outside);
        assert_eq!(server.run_command(alice, 0, "cuboid 1000 0 0 100000 1000 1000 stone"), outside);
        assert_eq!(server.run_command(alice, 0, "cuboid 2147483647 0 0 2147483647 0 0 stone"), outside);
        assert_eq!(
            server.run_command(alice, 0, "cuboid -2147483648 -2147483648 -2147483648 2147483647 2147483647 2147483647 stone"),
            ["started cuboid #1"]
        );
        assert_eq!(server.world(0).unwrap().map().unwrap().draw_ops()[0].remaining_work(), 16 * 16 * 16);

        out.sent.clear();
        server.tick_until(1, &mut out);
        assert!(server.world(0).unwrap().map().unwrap().draw_ops().is_empty());
        assert!(out.sent.contains(&(
            Recipients::Client(1),
            Response::Message("cuboid #1 done: 4096 blocks updated, 0 skipped, 0 denied".into())
        )));
    }

    #[test]
    fn cancel_and_logout() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(dir.path());
        let mut out = Outbox::default();
        let session = login(&mut server, 1, "alice", &mut out);
        let alice = Origin { player: session.player, client: Some(1) };
        server.run_command(alice, 0, "cuboid 0 0 0 15 15 15 glass");
        server.run_command(alice, 0, "line 0 0 0 15 0 0 glass");
        assert_eq!(server.run_command(alice, 0, "cancel"), ["cancelled 2 draw operations"]);

        server.run_command(alice, 0, "cuboid 0 0 0 15 15 15 glass");
        server.logout(1, Some(session));
        let op = &server.world(0).unwrap().map().unwrap().draw_ops()[2];
        assert_eq!(op.origin().client, None);
    }

    #[test]
    fn regenerating_resyncs_clients() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(dir.path());
        let mut out = Outbox::default();
        server.place_block(1, V3(0, 0, 7), Block::GOLD, Origin::CONSOLE);
        server.tick_until(1, &mut out);
        assert_eq!(server.world(1).unwrap().map().unwrap().get(V3(0, 0, 7)), Some(Block::GOLD));

        assert_eq!(server.run_command(Origin::CONSOLE, 0, "regen other"), ["regenerated other"]);
        assert!(server.world_by_name("other").unwrap().is_flushing());
        out.sent.clear();
        server.tick_until(2, &mut out);
        assert_eq!(out.sent, [(Recipients::World { world: 1, except: None }, Response::LevelData())]);
        assert_eq!(server.world(1).unwrap().map().unwrap().get(V3(0, 0, 7)), Some(Block::AIR));
    }

    #[test]
    fn unloaded_worlds_come_back_with_regen() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(dir.path());
        let mut out = Outbox::default();
        let session = login(&mut server, 1, "alice", &mut out);
        let alice = Origin { player: session.player, client: Some(1) };
        assert_eq!(server.run_command(alice, 0, "unload other"), ["only the console may do that"]);
        assert_eq!(server.run_command(Origin::CONSOLE, 0, "unload other"), ["unloading other"]);
        server.tick_until(1, &mut out);
        assert!(server.world(1).unwrap().map().is_none());
        assert!(!server.place_block(1, V3(0, 0, 0), Block::GOLD, Origin::CONSOLE));
        assert_eq!(server.run_command(Origin::CONSOLE, 1, "cuboid 0 0 0 1 1 1 gold"), ["the map is not loaded"]);
        assert_eq!(server.run_command(Origin::CONSOLE, 0, "unload other"), ["the map is not loaded"]);

        assert_eq!(server.run_command(Origin::CONSOLE, 0, "regen other"), ["regenerated other"]);
        let world = server.world(1).unwrap();
        assert_eq!(world.map().unwrap().dims(), V3(8, 8, 8));
        assert!(server.place_block(1, V3(0, 0, 0), Block::GOLD, Origin::CONSOLE));
    }
}
