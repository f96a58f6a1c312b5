use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::*;

use crossbeam::channel::{self, Receiver};
use voxserv::blockdb::FlushScheduler;
use voxserv::world::Origin;

/// Lines typed into the server's terminal, run as console commands.
fn console() -> std::io::Result<Receiver<String>> {
    let (lines, received) = channel::unbounded();
    std::thread::Builder::new().name("console".into()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if lines.send(line).is_err() {
                break;
            }
        }
    })?;
    Ok(received)
}

fn main() -> voxserv::Result<()> {
    env_logger::init();
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = voxserv::Config::load(config_path.as_deref())?;

    let tick_interval = config.throttling.tick_interval();
    let flush_interval = config.blockdb.flush_interval();
    let mut network = voxserv::Network::new(&config.listen)?;
    let mut server = voxserv::Server::new(config)?;
    let _flusher = FlushScheduler::spawn(Arc::clone(server.db()), flush_interval)?;
    let console = console()?;

    let starttime = Instant::now();
    loop {
        for line in console.try_iter() {
            let line = line.trim().trim_start_matches('/');
            if line == "stop" {
                log::info!("stopping");
                return Ok(());
            }
            for reply in server.run_command(Origin::CONSOLE, 0, line) {
                log::info!("{reply}");
            }
        }

        let next_tick_due = starttime + tick_interval * server.next_tick();
        network.process_packets_until(next_tick_due, &mut server)?;

        let time_passed_in_ticks = (Instant::now() - starttime).as_nanos() / tick_interval.as_nanos().max(1);
        server.tick_until(time_passed_in_ticks as u32, network.inboxes());
    }
}
