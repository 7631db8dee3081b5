use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{info, warn};

use camp_core::{
    build_headless_app, clear_session_state, run_tick, CampEntry, CampRegistry, DeferredAction,
    DeferredQueue, GuardHurtEvent, SimulationConfig, SimulationMetrics, StaleCounters,
    WorldAdapters,
};
use camp_schema::{
    BlockPos, Dimension, EntityFilter, EntityHandle, EntityKind, EntityQuery, NotificationSink,
    OwnerId, PresenceError, PresenceSource, WorldQueryError,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let session = Arc::new(SessionWorld::default());
    let adapters = WorldAdapters {
        presence: session.clone(),
        entities: session.clone(),
        notifications: Arc::new(LogSink),
    };

    let mut app = build_headless_app(adapters);
    let config = app.world.resource::<SimulationConfig>().clone();
    let command_rx = spawn_command_listener(config.command_bind);

    info!(
        command_bind = %config.command_bind,
        "Emberhold headless camp server ready"
    );

    while let Ok(command) = command_rx.recv() {
        match command {
            Command::Tick(ticks) => {
                for _ in 0..ticks {
                    run_tick(&mut app);
                }
                info!(
                    target: "emberhold::server",
                    ticks,
                    "command.applied=tick"
                );
            }
            Command::Connect(owner) => {
                session.connect(owner.clone());
                info!(target: "emberhold::server", %owner, "command.applied=connect");
            }
            Command::Disconnect(owner) => {
                session.disconnect(&owner);
                info!(target: "emberhold::server", %owner, "command.applied=disconnect");
            }
            Command::Camp {
                owner,
                dimension,
                position,
            } => {
                let entry = CampEntry::new(owner.clone(), position, dimension);
                app.world.resource_mut::<CampRegistry>().register(entry);
                info!(
                    target: "emberhold::server",
                    %owner,
                    %dimension,
                    location = %position,
                    "command.applied=camp"
                );
            }
            Command::Complete(owner) => {
                app.world
                    .resource_mut::<DeferredQueue>()
                    .push(DeferredAction::MarkSpawningComplete {
                        owner: owner.clone(),
                    });
                info!(target: "emberhold::server", %owner, "command.deferred=complete");
            }
            Command::Day { owner, day } => {
                app.world
                    .resource_mut::<DeferredQueue>()
                    .push(DeferredAction::SetLastSpawnDay {
                        owner: owner.clone(),
                        day,
                    });
                info!(target: "emberhold::server", %owner, day, "command.deferred=day");
            }
            Command::Guard {
                owner,
                id,
                position,
            } => handle_guard_spawn(&mut app, &session, owner, id, position),
            Command::Unguard(id) => {
                session.remove_entity(id);
                info!(target: "emberhold::server", id, "command.applied=unguard");
            }
            Command::Hurt { owner, guard_id } => {
                let mut events = app
                    .world
                    .resource_mut::<bevy::prelude::Events<GuardHurtEvent>>();
                events.send(GuardHurtEvent {
                    owner: owner.clone(),
                    guard_id,
                });
                info!(target: "emberhold::server", %owner, guard_id, "command.applied=hurt");
            }
            Command::Clear => {
                clear_session_state(&mut app.world);
                info!(target: "emberhold::server", "command.applied=clear");
            }
            Command::Status => report_status(&app),
        }
    }
}

/// In-process world backing the presence and entity-query adapters. Stands in
/// for the live game session the production integration would wrap.
#[derive(Default)]
struct SessionWorld {
    connected: Mutex<HashSet<OwnerId>>,
    entities: Mutex<Vec<(Dimension, EntityHandle)>>,
}

impl SessionWorld {
    fn connect(&self, owner: OwnerId) {
        self.connected.lock().expect("presence lock").insert(owner);
    }

    fn disconnect(&self, owner: &OwnerId) {
        self.connected.lock().expect("presence lock").remove(owner);
    }

    fn add_entity(&self, dimension: Dimension, handle: EntityHandle) {
        self.entities
            .lock()
            .expect("entity lock")
            .push((dimension, handle));
    }

    fn remove_entity(&self, id: u64) {
        self.entities
            .lock()
            .expect("entity lock")
            .retain(|(_, handle)| handle.id != id);
    }
}

impl PresenceSource for SessionWorld {
    fn connected_owners(&self) -> Result<Vec<OwnerId>, PresenceError> {
        Ok(self
            .connected
            .lock()
            .expect("presence lock")
            .iter()
            .cloned()
            .collect())
    }
}

impl EntityQuery for SessionWorld {
    fn entities_near(
        &self,
        dimension: Dimension,
        center: BlockPos,
        filter: &EntityFilter,
    ) -> Result<Vec<EntityHandle>, WorldQueryError> {
        Ok(self
            .entities
            .lock()
            .expect("entity lock")
            .iter()
            .filter(|(entity_dimension, handle)| {
                *entity_dimension == dimension
                    && filter.matches(&center, handle.kind, &handle.position)
            })
            .map(|(_, handle)| *handle)
            .collect())
    }
}

/// Delivers notifications to the server log. A production host would route
/// these to the player's chat channel instead.
struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, owner: &OwnerId, message: &str) {
        info!(
            target: "emberhold::notify",
            %owner,
            message,
            "notification.delivered"
        );
    }
}

#[derive(Debug)]
enum Command {
    Tick(u32),
    Connect(OwnerId),
    Disconnect(OwnerId),
    Camp {
        owner: OwnerId,
        dimension: Dimension,
        position: BlockPos,
    },
    Complete(OwnerId),
    Day {
        owner: OwnerId,
        day: u64,
    },
    Guard {
        owner: OwnerId,
        id: u64,
        position: BlockPos,
    },
    Unguard(u64),
    Hurt {
        owner: OwnerId,
        guard_id: u64,
    },
    Clear,
    Status,
}

fn spawn_command_listener(bind_addr: std::net::SocketAddr) -> Receiver<Command> {
    let listener = TcpListener::bind(bind_addr).expect("command listener bind failed");
    listener
        .set_nonblocking(true)
        .expect("set_nonblocking failed");

    let (sender, receiver) = unbounded::<Command>();
    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!("Command client connected: {}", addr);
                let sender = sender.clone();
                thread::spawn(move || handle_client(stream, sender));
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(50));
            }
            Err(err) => {
                warn!("Error accepting command client: {}", err);
                thread::sleep(std::time::Duration::from_millis(200));
            }
        }
    });

    receiver
}

fn handle_client(stream: std::net::TcpStream, sender: Sender<Command>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_command(trimmed) {
                    Some(cmd) => {
                        if sender.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => warn!("Invalid command: {}", trimmed),
                }
            }
            Err(err) => {
                warn!("Command read error: {}", err);
                break;
            }
        }
    }
}

fn parse_command(input: &str) -> Option<Command> {
    let mut parts = input.split_whitespace();
    match parts.next()? {
        "tick" => {
            let amount = parts.next().unwrap_or("1").parse().ok()?;
            Some(Command::Tick(amount))
        }
        "connect" => Some(Command::Connect(OwnerId::new(parts.next()?))),
        "disconnect" => Some(Command::Disconnect(OwnerId::new(parts.next()?))),
        "camp" => {
            let owner = OwnerId::new(parts.next()?);
            let dimension = Dimension::parse(parts.next()?)?;
            let x: i32 = parts.next()?.parse().ok()?;
            let y: i32 = parts.next()?.parse().ok()?;
            let z: i32 = parts.next()?.parse().ok()?;
            Some(Command::Camp {
                owner,
                dimension,
                position: BlockPos::new(x, y, z),
            })
        }
        "complete" => Some(Command::Complete(OwnerId::new(parts.next()?))),
        "day" => {
            let owner = OwnerId::new(parts.next()?);
            let day: u64 = parts.next()?.parse().ok()?;
            Some(Command::Day { owner, day })
        }
        "guard" => {
            let owner = OwnerId::new(parts.next()?);
            let id: u64 = parts.next()?.parse().ok()?;
            let x: i32 = parts.next()?.parse().ok()?;
            let y: i32 = parts.next()?.parse().ok()?;
            let z: i32 = parts.next()?.parse().ok()?;
            Some(Command::Guard {
                owner,
                id,
                position: BlockPos::new(x, y, z),
            })
        }
        "unguard" => {
            let id: u64 = parts.next()?.parse().ok()?;
            Some(Command::Unguard(id))
        }
        "hurt" => {
            let owner = OwnerId::new(parts.next()?);
            let guard_id: u64 = parts.next()?.parse().ok()?;
            Some(Command::Hurt { owner, guard_id })
        }
        "clear" => Some(Command::Clear),
        "status" => Some(Command::Status),
        _ => None,
    }
}

fn handle_guard_spawn(
    app: &mut bevy::prelude::App,
    session: &SessionWorld,
    owner: OwnerId,
    id: u64,
    position: BlockPos,
) {
    let dimension = app
        .world
        .resource::<CampRegistry>()
        .get(&owner)
        .map(|entry| entry.dimension);
    match dimension {
        Some(dimension) => {
            session.add_entity(
                dimension,
                EntityHandle {
                    id,
                    kind: EntityKind::CampGuard,
                    position,
                },
            );
            info!(
                target: "emberhold::server",
                %owner,
                id,
                location = %position,
                "command.applied=guard"
            );
        }
        None => warn!(
            target: "emberhold::server",
            %owner,
            "guard.rejected=no_camp_for_owner"
        ),
    }
}

fn report_status(app: &bevy::prelude::App) {
    let registry = app.world.resource::<CampRegistry>();
    let counters = app.world.resource::<StaleCounters>();
    let metrics = app.world.resource::<SimulationMetrics>().clone();

    let snapshot = registry.snapshot_entries(counters);
    match serde_json::to_string(&snapshot) {
        Ok(camps) => info!(
            target: "emberhold::server",
            tick = metrics.tick,
            active_camps = metrics.active_camps,
            stale_tracked = metrics.stale_tracked,
            guards_cached = metrics.guards_cached,
            camps_expired = metrics.camps_expired,
            notifications_sent = metrics.notifications_sent,
            notifications_throttled = metrics.notifications_throttled,
            recount_failures = metrics.recount_failures,
            %camps,
            "status"
        ),
        Err(err) => warn!(
            target: "emberhold::server",
            error = %err,
            "status.snapshot_failed"
        ),
    }
}
