//! The game-facing surface that management handlers act on.

use crate::domain::types::{
    GameEvent, IpBan, KickPlayer, Operator, Player, ServerSettings, ServerState, SystemMessage,
    UserBan,
};

/// Handle passed to every incoming handler.
///
/// Handlers registered as main-thread run on the simulation thread, so an
/// implementation only has to be consistent with itself; the `Send + Sync`
/// bound exists because the handle is shared with I/O tasks.
pub trait ManagementApi: Send + Sync {
    fn allowlist(&self) -> Vec<Player>;
    fn replace_allowlist(&self, players: Vec<Player>);

    fn bans(&self) -> Vec<UserBan>;
    fn replace_bans(&self, bans: Vec<UserBan>);

    fn ip_bans(&self) -> Vec<IpBan>;
    fn replace_ip_bans(&self, bans: Vec<IpBan>);

    fn operators(&self) -> Vec<Operator>;
    fn replace_operators(&self, operators: Vec<Operator>);

    fn players(&self) -> Vec<Player>;
    /// Disconnects the player. Returns the player as known to the server, or
    /// `None` when they are not online.
    fn kick(&self, kick: &KickPlayer) -> Option<Player>;

    fn status(&self) -> ServerState;
    /// Saves the world; `flush` waits for chunk storage.
    fn save(&self, flush: bool) -> bool;
    fn request_stop(&self) -> bool;
    fn system_message(&self, message: &SystemMessage) -> bool;

    fn settings(&self) -> ServerSettings;
    fn replace_settings(&self, settings: ServerSettings);
}

/// Receiver of state changes. The notification publisher implements this.
pub trait GameEvents: Send + Sync {
    fn on_event(&self, event: GameEvent);
}
