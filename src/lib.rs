//! A voxel world server that remembers every block change.
//!
//! Edits arrive from the network (or the console) as pending updates, are
//! applied once per tick under a throttled budget, broadcast to the world and
//! recorded in that world's [`blockdb::ChangeLog`].

pub mod blockdb;
pub mod collections;
pub mod config;
pub mod error;
pub mod network;
pub mod players;
pub mod server;
pub mod types;
pub mod world;

pub use config::Config;
pub use error::{Error, Result};
pub use network::Network;
pub use server::Server;
pub use world::World;

mod prelude {
    pub(crate) use crate::blockdb::{BlockDb, ChangeLog};
    pub(crate) use crate::collections::*;
    pub(crate) use crate::network::{Clients, Recipients, Response};
    pub(crate) use crate::types::*;
    pub(crate) use std::net::TcpStream;
    pub(crate) use std::sync::Arc;
    pub(crate) use std::{io, time};
}
