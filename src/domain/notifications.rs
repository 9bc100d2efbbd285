//! Outgoing notifications and the publisher that broadcasts them.

use std::sync::Arc;

use crate::domain::api::GameEvents;
use crate::domain::types::{GameEvent, IpBan, Operator, Player, ServerState, UserBan};
use crate::errors::RegistryError;
use crate::rpc::method::{NotificationMethod, OutgoingMethodAttributes};
use crate::rpc::registry::OutgoingRegistry;
use crate::rpc::server::ManagementServer;

pub static SERVER_STARTED: NotificationMethod = NotificationMethod::new("notification/server/started");
pub static SERVER_STOPPING: NotificationMethod =
    NotificationMethod::new("notification/server/stopping");
pub static SERVER_SAVING: NotificationMethod = NotificationMethod::new("notification/server/saving");
pub static SERVER_SAVED: NotificationMethod = NotificationMethod::new("notification/server/saved");
pub static SERVER_STATUS: NotificationMethod<ServerState> =
    NotificationMethod::with_param("notification/server/status", "status");

pub static PLAYER_JOINED: NotificationMethod<Player> =
    NotificationMethod::with_param("notification/players/joined", "player");
pub static PLAYER_LEFT: NotificationMethod<Player> =
    NotificationMethod::with_param("notification/players/left", "player");

pub static OPERATOR_ADDED: NotificationMethod<Operator> =
    NotificationMethod::with_param("notification/operators/added", "player");
pub static OPERATOR_REMOVED: NotificationMethod<Operator> =
    NotificationMethod::with_param("notification/operators/removed", "player");

pub static ALLOWLIST_ADDED: NotificationMethod<Player> =
    NotificationMethod::with_param("notification/allowlist/added", "player");
pub static ALLOWLIST_REMOVED: NotificationMethod<Player> =
    NotificationMethod::with_param("notification/allowlist/removed", "player");

pub static IP_BAN_ADDED: NotificationMethod<IpBan> =
    NotificationMethod::with_param("notification/ip_bans/added", "player");
pub static IP_BAN_REMOVED: NotificationMethod<String> =
    NotificationMethod::with_param("notification/ip_bans/removed", "player");

pub static BAN_ADDED: NotificationMethod<UserBan> =
    NotificationMethod::with_param("notification/bans/added", "player");
pub static BAN_REMOVED: NotificationMethod<Player> =
    NotificationMethod::with_param("notification/bans/removed", "player");

pub fn register(registry: &mut OutgoingRegistry) -> Result<(), RegistryError> {
    let attributes = OutgoingMethodAttributes::default();

    registry.register_notification(&SERVER_STARTED, "Server started", attributes)?;
    registry.register_notification(&SERVER_STOPPING, "Server shutting down", attributes)?;
    registry.register_notification(&SERVER_SAVING, "Server save started", attributes)?;
    registry.register_notification(&SERVER_SAVED, "Server save completed", attributes)?;
    registry.register_notification(&SERVER_STATUS, "Server status heartbeat", attributes)?;
    registry.register_notification(&PLAYER_JOINED, "Player joined", attributes)?;
    registry.register_notification(&PLAYER_LEFT, "Player left", attributes)?;
    registry.register_notification(&OPERATOR_ADDED, "Player was oped", attributes)?;
    registry.register_notification(&OPERATOR_REMOVED, "Player was deoped", attributes)?;
    registry.register_notification(&ALLOWLIST_ADDED, "Player was added to allowlist", attributes)?;
    registry.register_notification(
        &ALLOWLIST_REMOVED,
        "Player was removed from allowlist",
        attributes,
    )?;
    registry.register_notification(&IP_BAN_ADDED, "Ip was added to ip ban list", attributes)?;
    registry.register_notification(
        &IP_BAN_REMOVED,
        "Ip was removed from ip ban list",
        attributes,
    )?;
    registry.register_notification(&BAN_ADDED, "Player was added to ban list", attributes)?;
    registry.register_notification(&BAN_REMOVED, "Player was removed from ban list", attributes)
}

/// Turns game events into notifications on every live connection.
pub struct NotificationPublisher {
    server: Arc<ManagementServer>,
}

impl NotificationPublisher {
    pub fn new(server: Arc<ManagementServer>) -> Self {
        Self { server }
    }

    pub fn publish(&self, event: GameEvent) {
        let server = &self.server;
        match event {
            GameEvent::ServerStarted => server.broadcast(&SERVER_STARTED, &()),
            GameEvent::ServerStopping => server.broadcast(&SERVER_STOPPING, &()),
            GameEvent::ServerSaving => server.broadcast(&SERVER_SAVING, &()),
            GameEvent::ServerSaved => server.broadcast(&SERVER_SAVED, &()),
            GameEvent::Status(status) => server.broadcast(&SERVER_STATUS, &status),
            GameEvent::PlayerJoined(player) => server.broadcast(&PLAYER_JOINED, &player),
            GameEvent::PlayerLeft(player) => server.broadcast(&PLAYER_LEFT, &player),
            GameEvent::OperatorAdded(operator) => server.broadcast(&OPERATOR_ADDED, &operator),
            GameEvent::OperatorRemoved(operator) => {
                server.broadcast(&OPERATOR_REMOVED, &operator)
            }
            GameEvent::AllowlistAdded(player) => server.broadcast(&ALLOWLIST_ADDED, &player),
            GameEvent::AllowlistRemoved(player) => server.broadcast(&ALLOWLIST_REMOVED, &player),
            GameEvent::IpBanAdded(ban) => server.broadcast(&IP_BAN_ADDED, &ban),
            GameEvent::IpBanRemoved(ip) => server.broadcast(&IP_BAN_REMOVED, &ip),
            GameEvent::BanAdded(ban) => server.broadcast(&BAN_ADDED, &ban),
            GameEvent::BanRemoved(player) => server.broadcast(&BAN_REMOVED, &player),
        }
    }
}

impl GameEvents for NotificationPublisher {
    fn on_event(&self, event: GameEvent) {
        self.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::api::ManagementApi;
    use crate::domain::build_registries;
    use crate::domain::memory::InMemoryServer;
    use crate::rpc::connection::RpcContext;
    use crate::rpc::executor::MainThread;

    #[tokio::test]
    async fn game_events_reach_every_connection() {
        let main = MainThread::spawn().expect("spawn main thread");
        let game = Arc::new(InMemoryServer::new());
        let server = ManagementServer::new(
            RpcContext {
                registries: Arc::new(build_registries().expect("registries")),
                api: game.clone(),
                main_thread: main.handle(),
            },
            "token",
        );
        assert!(game.attach_events(Arc::new(NotificationPublisher::new(server.clone()))));

        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        server.on_connected(first_tx);
        server.on_connected(second_tx);

        game.replace_operators(vec![Operator {
            player: Player::named("Steve"),
            permission_level: Some(4),
            bypasses_player_limit: None,
        }]);

        let expected = json!({
            "jsonrpc": "2.0",
            "method": "minecraft:notification/operators/added",
            "params": [{"player": {"name": "Steve"}, "permissionLevel": 4}]
        });
        assert_eq!(first_rx.try_recv().expect("first notified"), expected);
        assert_eq!(second_rx.try_recv().expect("second notified"), expected);
    }

    #[tokio::test]
    async fn parameterless_events_carry_no_params() {
        let main = MainThread::spawn().expect("spawn main thread");
        let server = ManagementServer::new(
            RpcContext {
                registries: Arc::new(build_registries().expect("registries")),
                api: Arc::new(InMemoryServer::new()),
                main_thread: main.handle(),
            },
            "token",
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        server.on_connected(tx);

        NotificationPublisher::new(server).publish(GameEvent::ServerSaved);

        let sent = rx.try_recv().expect("notified");
        assert_eq!(sent["method"], "minecraft:notification/server/saved");
        assert!(sent.get("params").is_none());
    }
}
