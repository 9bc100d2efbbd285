//! A self-contained game server used by the binary and the tests.
//!
//! State lives behind a mutex; events are raised after the lock is released
//! so a listener may call back into the server.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, OnceLock, PoisonError,
};

use tokio::sync::Notify;
use tracing::{debug, info};

use crate::domain::api::{GameEvents, ManagementApi};
use crate::domain::types::{
    GameEvent, IpBan, KickPlayer, Operator, Player, ServerSettings, ServerState, SystemMessage,
    UserBan, Version,
};

pub const GAME_VERSION: &str = "1.21.9";
pub const PROTOCOL_VERSION: u32 = 773;

#[derive(Debug, Default)]
struct GameState {
    started: bool,
    online: Vec<Player>,
    allowlist: Vec<Player>,
    bans: Vec<UserBan>,
    ip_bans: Vec<IpBan>,
    operators: Vec<Operator>,
    settings: ServerSettings,
}

#[derive(Default)]
pub struct InMemoryServer {
    state: Mutex<GameState>,
    events: OnceLock<Arc<dyn GameEvents>>,
    stop_requested: AtomicBool,
    stop: Notify,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes future events to `listener`. Only the first listener sticks.
    pub fn attach_events(&self, listener: Arc<dyn GameEvents>) -> bool {
        self.events.set(listener).is_ok()
    }

    pub fn mark_started(&self) {
        self.state().started = true;
        info!("game server started");
        self.emit([GameEvent::ServerStarted]);
    }

    pub fn join(&self, player: Player) {
        self.state().online.push(player.clone());
        self.emit([GameEvent::PlayerJoined(player)]);
    }

    pub fn leave(&self, player: &Player) -> bool {
        let left = {
            let mut state = self.state();
            let position = state.online.iter().position(|online| online.is_same(player));
            position.map(|index| state.online.remove(index))
        };
        match left {
            Some(player) => {
                self.emit([GameEvent::PlayerLeft(player)]);
                true
            }
            None => false,
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolves once a client has asked the server to stop.
    pub async fn stop_requested(&self) {
        if self.is_stop_requested() {
            return;
        }
        self.stop.notified().await;
    }

    fn emit(&self, events: impl IntoIterator<Item = GameEvent>) {
        let Some(listener) = self.events.get() else {
            return;
        };
        for event in events {
            listener.on_event(event);
        }
    }

    fn state(&self) -> MutexGuard<'_, GameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Entries of `next` missing from `previous`, and entries of `previous`
/// missing from `next`.
fn diff<T: Clone>(
    previous: &[T],
    next: &[T],
    same: impl Fn(&T, &T) -> bool,
) -> (Vec<T>, Vec<T>) {
    let added = next
        .iter()
        .filter(|&entry| !previous.iter().any(|old| same(old, entry)))
        .cloned()
        .collect();
    let removed = previous
        .iter()
        .filter(|&entry| !next.iter().any(|new| same(entry, new)))
        .cloned()
        .collect();
    (added, removed)
}

impl ManagementApi for InMemoryServer {
    fn allowlist(&self) -> Vec<Player> {
        self.state().allowlist.clone()
    }

    fn replace_allowlist(&self, players: Vec<Player>) {
        let previous = std::mem::replace(&mut self.state().allowlist, players.clone());
        let (added, removed) = diff(&previous, &players, Player::is_same);
        self.emit(
            added
                .into_iter()
                .map(GameEvent::AllowlistAdded)
                .chain(removed.into_iter().map(GameEvent::AllowlistRemoved)),
        );
    }

    fn bans(&self) -> Vec<UserBan> {
        self.state().bans.clone()
    }

    fn replace_bans(&self, bans: Vec<UserBan>) {
        let previous = std::mem::replace(&mut self.state().bans, bans.clone());
        let (added, removed) = diff(&previous, &bans, |left, right| {
            left.player.is_same(&right.player)
        });
        self.emit(
            added.into_iter().map(GameEvent::BanAdded).chain(
                removed
                    .into_iter()
                    .map(|ban| GameEvent::BanRemoved(ban.player)),
            ),
        );
    }

    fn ip_bans(&self) -> Vec<IpBan> {
        self.state().ip_bans.clone()
    }

    fn replace_ip_bans(&self, bans: Vec<IpBan>) {
        let previous = std::mem::replace(&mut self.state().ip_bans, bans.clone());
        let (added, removed) = diff(&previous, &bans, |left, right| left.ip == right.ip);
        self.emit(
            added
                .into_iter()
                .map(GameEvent::IpBanAdded)
                .chain(removed.into_iter().map(|ban| GameEvent::IpBanRemoved(ban.ip))),
        );
    }

    fn operators(&self) -> Vec<Operator> {
        self.state().operators.clone()
    }

    fn replace_operators(&self, operators: Vec<Operator>) {
        let previous = std::mem::replace(&mut self.state().operators, operators.clone());
        let (added, removed) = diff(&previous, &operators, |left, right| {
            left.player.is_same(&right.player)
        });
        self.emit(
            added
                .into_iter()
                .map(GameEvent::OperatorAdded)
                .chain(removed.into_iter().map(GameEvent::OperatorRemoved)),
        );
    }

    fn players(&self) -> Vec<Player> {
        self.state().online.clone()
    }

    fn kick(&self, kick: &KickPlayer) -> Option<Player> {
        let kicked = {
            let mut state = self.state();
            let position = state
                .online
                .iter()
                .position(|online| online.is_same(&kick.player));
            position.map(|index| state.online.remove(index))
        }?;
        debug!(player = ?kicked.name, reason = ?kick.message, "player kicked");
        self.emit([GameEvent::PlayerLeft(kicked.clone())]);
        Some(kicked)
    }

    fn status(&self) -> ServerState {
        let state = self.state();
        ServerState {
            started: state.started,
            players: state.online.clone(),
            version: Version {
                name: GAME_VERSION.to_string(),
                protocol: PROTOCOL_VERSION,
            },
        }
    }

    fn save(&self, flush: bool) -> bool {
        self.emit([GameEvent::ServerSaving]);
        debug!(flush, "world saved");
        self.emit([GameEvent::ServerSaved]);
        true
    }

    fn request_stop(&self) -> bool {
        if self.stop_requested.swap(true, Ordering::AcqRel) {
            return true;
        }
        info!("stop requested by management client");
        self.stop.notify_one();
        true
    }

    fn system_message(&self, message: &SystemMessage) -> bool {
        let state = self.state();
        let recipients = match &message.receiving_players {
            Some(targets) => state
                .online
                .iter()
                .filter(|online| targets.iter().any(|target| target.is_same(online)))
                .count(),
            None => state.online.len(),
        };
        if recipients == 0 {
            return false;
        }
        info!(recipients, overlay = message.overlay, text = %message.message, "system message");
        true
    }

    fn settings(&self) -> ServerSettings {
        self.state().settings.clone()
    }

    fn replace_settings(&self, settings: ServerSettings) {
        self.state().settings = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<GameEvent>>,
    }

    impl GameEvents for Recorder {
        fn on_event(&self, event: GameEvent) {
            self.events.lock().expect("recorder lock").push(event);
        }
    }

    impl Recorder {
        fn take(&self) -> Vec<GameEvent> {
            std::mem::take(&mut *self.events.lock().expect("recorder lock"))
        }
    }

    fn server() -> (InMemoryServer, Arc<Recorder>) {
        let server = InMemoryServer::new();
        let recorder = Arc::new(Recorder::default());
        assert!(server.attach_events(recorder.clone()));
        (server, recorder)
    }

    #[test]
    fn replacing_a_list_reports_the_difference() {
        let (server, recorder) = server();
        server.replace_allowlist(vec![Player::named("Steve"), Player::named("Alex")]);
        recorder.take();

        server.replace_allowlist(vec![Player::named("alex"), Player::named("Herobrine")]);

        assert_eq!(
            recorder.take(),
            vec![
                GameEvent::AllowlistAdded(Player::named("Herobrine")),
                GameEvent::AllowlistRemoved(Player::named("Steve")),
            ]
        );
    }

    #[test]
    fn ip_ban_removal_reports_the_address() {
        let (server, recorder) = server();
        let ban = IpBan {
            ip: "10.0.0.1".to_string(),
            reason: None,
            source: None,
            expires: None,
        };
        server.replace_ip_bans(vec![ban.clone()]);
        server.replace_ip_bans(Vec::new());

        assert_eq!(
            recorder.take(),
            vec![
                GameEvent::IpBanAdded(ban),
                GameEvent::IpBanRemoved("10.0.0.1".to_string()),
            ]
        );
    }

    #[test]
    fn kick_only_affects_online_players() {
        let (server, recorder) = server();
        server.join(Player::named("Steve"));

        let kicked = server.kick(&KickPlayer {
            player: Player::named("steve"),
            message: None,
        });
        let missing = server.kick(&KickPlayer {
            player: Player::named("Alex"),
            message: None,
        });

        assert_eq!(kicked, Some(Player::named("Steve")));
        assert_eq!(missing, None);
        assert!(server.players().is_empty());
        assert_eq!(
            recorder.take(),
            vec![
                GameEvent::PlayerJoined(Player::named("Steve")),
                GameEvent::PlayerLeft(Player::named("Steve")),
            ]
        );
    }

    #[test]
    fn leave_reports_known_players_only() {
        let (server, recorder) = server();
        server.join(Player::named("Steve"));
        recorder.take();

        assert!(!server.leave(&Player::named("Alex")));
        assert!(server.leave(&Player::named("STEVE")));
        assert_eq!(
            recorder.take(),
            vec![GameEvent::PlayerLeft(Player::named("Steve"))]
        );
    }

    #[test]
    fn system_message_needs_a_recipient() {
        let (server, _recorder) = server();
        let message = SystemMessage {
            message: "hello".to_string(),
            overlay: false,
            receiving_players: None,
        };
        assert!(!server.system_message(&message));

        server.join(Player::named("Steve"));
        assert!(server.system_message(&message));
    }

    #[tokio::test]
    async fn stop_request_wakes_waiter() {
        let server = Arc::new(InMemoryServer::new());
        let waiter = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.stop_requested().await })
        };

        assert!(server.request_stop());
        waiter.await.expect("waiter task");
        assert!(server.is_stop_requested());
    }

    #[test]
    fn events_without_listener_are_dropped() {
        let server = InMemoryServer::new();
        server.mark_started();
        assert!(server.status().started);
    }
}
