use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use bevy::prelude::*;

/// Global configuration parameters for the headless camp prototype.
#[derive(Resource, Debug, Clone)]
pub struct SimulationConfig {
    pub command_bind: SocketAddr,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            command_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 41800),
        }
    }
}

/// Tracks total polling ticks elapsed.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTick(pub u64);

pub fn advance_tick(mut tick: ResMut<SimulationTick>) {
    tick.0 += 1;
}
