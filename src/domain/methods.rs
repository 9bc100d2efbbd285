//! Incoming management methods.
//!
//! Every handler touches game state, so all of them run on the main thread.
//! The four player lists share one shape (read, replace, add, remove, clear)
//! and are registered through [`ListKind`].

use serde::{de::DeserializeOwned, Serialize};

use crate::domain::api::ManagementApi;
use crate::domain::types::{
    Difficulty, IpBan, KickPlayer, Operator, Player, ServerState, SystemMessage, UserBan,
};
use crate::domain::utils::{
    normalize_ip, normalize_ip_ban, normalize_motd, normalize_operator, normalize_player,
    normalize_user_ban,
};
use crate::errors::{RegistryError, RpcError};
use crate::rpc::identifier::Identifier;
use crate::rpc::method::{IncomingMethod, IncomingMethodAttributes};
use crate::rpc::registry::IncomingRegistry;
use crate::rpc::schema::DescribeSchema;

const ON_MAIN: IncomingMethodAttributes = IncomingMethodAttributes::main_thread();

/// Wire names and descriptions of one list's five methods.
pub struct ListMethods {
    pub get: (&'static str, &'static str),
    pub set: (&'static str, &'static str),
    pub add: (&'static str, &'static str),
    pub remove: (&'static str, &'static str),
    pub clear: (&'static str, &'static str),
}

/// A server-side list of entries addressed by a key.
pub trait ListKind: 'static {
    type Entry: Clone + Serialize + DeserializeOwned + DescribeSchema + Send + Sync + 'static;
    type Key: DeserializeOwned + DescribeSchema + Send + Sync + 'static;

    const METHODS: ListMethods;
    /// Parameter name of `set` and `add`.
    const ENTRIES_PARAM: &'static str;
    /// Parameter name of `remove`.
    const KEYS_PARAM: &'static str;
    const RESULT: &'static str;

    fn read(api: &dyn ManagementApi) -> Vec<Self::Entry>;
    fn write(api: &dyn ManagementApi, entries: Vec<Self::Entry>);
    fn normalize_entry(entry: Self::Entry) -> Result<Self::Entry, RpcError>;
    fn normalize_key(key: Self::Key) -> Result<Self::Key, RpcError>;
    fn same_entry(left: &Self::Entry, right: &Self::Entry) -> bool;
    fn matches(entry: &Self::Entry, key: &Self::Key) -> bool;
}

pub struct Allowlist;

impl ListKind for Allowlist {
    type Entry = Player;
    type Key = Player;

    const METHODS: ListMethods = ListMethods {
        get: ("allowlist", "Get the allowlist"),
        set: ("allowlist/set", "Replace the allowlist"),
        add: ("allowlist/add", "Add players to the allowlist"),
        remove: ("allowlist/remove", "Remove players from the allowlist"),
        clear: ("allowlist/clear", "Clear the allowlist"),
    };
    const ENTRIES_PARAM: &'static str = "players";
    const KEYS_PARAM: &'static str = "players";
    const RESULT: &'static str = "allowlist";

    fn read(api: &dyn ManagementApi) -> Vec<Player> {
        api.allowlist()
    }

    fn write(api: &dyn ManagementApi, entries: Vec<Player>) {
        api.replace_allowlist(entries);
    }

    fn normalize_entry(entry: Player) -> Result<Player, RpcError> {
        normalize_player(entry)
    }

    fn normalize_key(key: Player) -> Result<Player, RpcError> {
        normalize_player(key)
    }

    fn same_entry(left: &Player, right: &Player) -> bool {
        left.is_same(right)
    }

    fn matches(entry: &Player, key: &Player) -> bool {
        entry.is_same(key)
    }
}

pub struct Bans;

impl ListKind for Bans {
    type Entry = UserBan;
    type Key = Player;

    const METHODS: ListMethods = ListMethods {
        get: ("bans", "Get the ban list"),
        set: ("bans/set", "Replace the ban list"),
        add: ("bans/add", "Ban players"),
        remove: ("bans/remove", "Unban players"),
        clear: ("bans/clear", "Clear the ban list"),
    };
    const ENTRIES_PARAM: &'static str = "bans";
    const KEYS_PARAM: &'static str = "players";
    const RESULT: &'static str = "banlist";

    fn read(api: &dyn ManagementApi) -> Vec<UserBan> {
        api.bans()
    }

    fn write(api: &dyn ManagementApi, entries: Vec<UserBan>) {
        api.replace_bans(entries);
    }

    fn normalize_entry(entry: UserBan) -> Result<UserBan, RpcError> {
        normalize_user_ban(entry)
    }

    fn normalize_key(key: Player) -> Result<Player, RpcError> {
        normalize_player(key)
    }

    fn same_entry(left: &UserBan, right: &UserBan) -> bool {
        left.player.is_same(&right.player)
    }

    fn matches(entry: &UserBan, key: &Player) -> bool {
        entry.player.is_same(key)
    }
}

pub struct IpBans;

impl ListKind for IpBans {
    type Entry = IpBan;
    type Key = String;

    const METHODS: ListMethods = ListMethods {
        get: ("ip_bans", "Get the IP ban list"),
        set: ("ip_bans/set", "Replace the IP ban list"),
        add: ("ip_bans/add", "Ban IP addresses"),
        remove: ("ip_bans/remove", "Unban IP addresses"),
        clear: ("ip_bans/clear", "Clear the IP ban list"),
    };
    const ENTRIES_PARAM: &'static str = "bans";
    const KEYS_PARAM: &'static str = "ips";
    const RESULT: &'static str = "banlist";

    fn read(api: &dyn ManagementApi) -> Vec<IpBan> {
        api.ip_bans()
    }

    fn write(api: &dyn ManagementApi, entries: Vec<IpBan>) {
        api.replace_ip_bans(entries);
    }

    fn normalize_entry(entry: IpBan) -> Result<IpBan, RpcError> {
        normalize_ip_ban(entry)
    }

    fn normalize_key(key: String) -> Result<String, RpcError> {
        normalize_ip(&key)
    }

    fn same_entry(left: &IpBan, right: &IpBan) -> bool {
        left.ip == right.ip
    }

    fn matches(entry: &IpBan, key: &String) -> bool {
        &entry.ip == key
    }
}

pub struct Operators;

impl ListKind for Operators {
    type Entry = Operator;
    type Key = Player;

    const METHODS: ListMethods = ListMethods {
        get: ("operators", "Get all operators"),
        set: ("operators/set", "Replace the operator list"),
        add: ("operators/add", "Op players"),
        remove: ("operators/remove", "Deop players"),
        clear: ("operators/clear", "Deop everybody"),
    };
    const ENTRIES_PARAM: &'static str = "operators";
    const KEYS_PARAM: &'static str = "players";
    const RESULT: &'static str = "operators";

    fn read(api: &dyn ManagementApi) -> Vec<Operator> {
        api.operators()
    }

    fn write(api: &dyn ManagementApi, entries: Vec<Operator>) {
        api.replace_operators(entries);
    }

    fn normalize_entry(entry: Operator) -> Result<Operator, RpcError> {
        normalize_operator(entry)
    }

    fn normalize_key(key: Player) -> Result<Player, RpcError> {
        normalize_player(key)
    }

    fn same_entry(left: &Operator, right: &Operator) -> bool {
        left.player.is_same(&right.player)
    }

    fn matches(entry: &Operator, key: &Player) -> bool {
        entry.player.is_same(key)
    }
}

fn normalize_all<T>(
    items: Vec<T>,
    normalize: impl Fn(T) -> Result<T, RpcError>,
) -> Result<Vec<T>, RpcError> {
    items.into_iter().map(normalize).collect()
}

/// Later duplicates are dropped, the first occurrence wins.
fn dedup_entries<K: ListKind>(entries: Vec<K::Entry>) -> Vec<K::Entry> {
    let mut unique: Vec<K::Entry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if !unique.iter().any(|kept| K::same_entry(kept, &entry)) {
            unique.push(entry);
        }
    }
    unique
}

fn set_list<K: ListKind>(
    api: &dyn ManagementApi,
    entries: Vec<K::Entry>,
) -> Result<Vec<K::Entry>, RpcError> {
    let entries = dedup_entries::<K>(normalize_all(entries, K::normalize_entry)?);
    K::write(api, entries);
    Ok(K::read(api))
}

fn add_to_list<K: ListKind>(
    api: &dyn ManagementApi,
    entries: Vec<K::Entry>,
) -> Result<Vec<K::Entry>, RpcError> {
    let entries = normalize_all(entries, K::normalize_entry)?;
    let mut list = K::read(api);
    list.extend(entries);
    K::write(api, dedup_entries::<K>(list));
    Ok(K::read(api))
}

fn remove_from_list<K: ListKind>(
    api: &dyn ManagementApi,
    keys: Vec<K::Key>,
) -> Result<Vec<K::Entry>, RpcError> {
    let keys = normalize_all(keys, K::normalize_key)?;
    let mut list = K::read(api);
    list.retain(|entry| !keys.iter().any(|key| K::matches(entry, key)));
    K::write(api, list);
    Ok(K::read(api))
}

fn register_list<K: ListKind>(registry: &mut IncomingRegistry) -> Result<(), RegistryError> {
    let methods = K::METHODS;

    registry.register(
        Identifier::vanilla(methods.get.0),
        IncomingMethod::parameterless(methods.get.1, K::RESULT, ON_MAIN, |api, _client| {
            Ok(K::read(api))
        }),
    )?;
    registry.register(
        Identifier::vanilla(methods.set.0),
        IncomingMethod::with_params(
            methods.set.1,
            K::ENTRIES_PARAM,
            K::RESULT,
            ON_MAIN,
            |api, entries: Vec<K::Entry>, _client| set_list::<K>(api, entries),
        ),
    )?;
    registry.register(
        Identifier::vanilla(methods.add.0),
        IncomingMethod::with_params(
            methods.add.1,
            K::ENTRIES_PARAM,
            K::RESULT,
            ON_MAIN,
            |api, entries: Vec<K::Entry>, _client| add_to_list::<K>(api, entries),
        ),
    )?;
    registry.register(
        Identifier::vanilla(methods.remove.0),
        IncomingMethod::with_params(
            methods.remove.1,
            K::KEYS_PARAM,
            K::RESULT,
            ON_MAIN,
            |api, keys: Vec<K::Key>, _client| remove_from_list::<K>(api, keys),
        ),
    )?;
    registry.register(
        Identifier::vanilla(methods.clear.0),
        IncomingMethod::parameterless(methods.clear.1, K::RESULT, ON_MAIN, |api, _client| {
            K::write(api, Vec::new());
            Ok(K::read(api))
        }),
    )?;
    Ok(())
}

fn register_players(registry: &mut IncomingRegistry) -> Result<(), RegistryError> {
    registry.register(
        Identifier::vanilla("players"),
        IncomingMethod::parameterless(
            "Get all connected players",
            "players",
            ON_MAIN,
            |api, _client| Ok(api.players()),
        ),
    )?;
    registry.register(
        Identifier::vanilla("players/kick"),
        IncomingMethod::with_params(
            "Kick players",
            "kick",
            "kicked",
            ON_MAIN,
            |api, kicks: Vec<KickPlayer>, _client| {
                let mut kicked = Vec::new();
                for kick in kicks {
                    let kick = KickPlayer {
                        player: normalize_player(kick.player)?,
                        ..kick
                    };
                    kicked.extend(api.kick(&kick));
                }
                Ok(kicked)
            },
        ),
    )
}

fn register_server(registry: &mut IncomingRegistry) -> Result<(), RegistryError> {
    registry.register(
        Identifier::vanilla("server/status"),
        IncomingMethod::parameterless(
            "Get server status",
            "status",
            ON_MAIN,
            |api, _client| -> Result<ServerState, RpcError> { Ok(api.status()) },
        ),
    )?;
    registry.register(
        Identifier::vanilla("server/save"),
        IncomingMethod::with_params(
            "Save server state",
            "flush",
            "saving",
            ON_MAIN,
            |api, flush: bool, _client| Ok(api.save(flush)),
        ),
    )?;
    registry.register(
        Identifier::vanilla("server/stop"),
        IncomingMethod::parameterless("Stop server", "stopping", ON_MAIN, |api, _client| {
            Ok(api.request_stop())
        }),
    )?;
    registry.register(
        Identifier::vanilla("server/system_message"),
        IncomingMethod::with_params(
            "Send a system message",
            "message",
            "sent",
            ON_MAIN,
            |api, message: SystemMessage, _client| {
                let receiving_players = message
                    .receiving_players
                    .map(|players| normalize_all(players, normalize_player))
                    .transpose()?;
                Ok(api.system_message(&SystemMessage {
                    receiving_players,
                    ..message
                }))
            },
        ),
    )
}

fn register_settings(registry: &mut IncomingRegistry) -> Result<(), RegistryError> {
    registry.register(
        Identifier::vanilla("serversettings/autosave"),
        IncomingMethod::parameterless(
            "Get whether automatic world saving is enabled",
            "enabled",
            ON_MAIN,
            |api, _client| Ok(api.settings().autosave),
        ),
    )?;
    registry.register(
        Identifier::vanilla("serversettings/autosave/set"),
        IncomingMethod::with_params(
            "Enable or disable automatic world saving",
            "enable",
            "enabled",
            ON_MAIN,
            |api, enable: bool, _client| {
                let mut settings = api.settings();
                settings.autosave = enable;
                api.replace_settings(settings);
                Ok(api.settings().autosave)
            },
        ),
    )?;
    registry.register(
        Identifier::vanilla("serversettings/difficulty"),
        IncomingMethod::parameterless(
            "Get the current difficulty level",
            "difficulty",
            ON_MAIN,
            |api, _client| Ok(api.settings().difficulty),
        ),
    )?;
    registry.register(
        Identifier::vanilla("serversettings/difficulty/set"),
        IncomingMethod::with_params(
            "Set the difficulty level",
            "difficulty",
            "difficulty",
            ON_MAIN,
            |api, difficulty: Difficulty, _client| {
                let mut settings = api.settings();
                settings.difficulty = difficulty;
                api.replace_settings(settings);
                Ok(api.settings().difficulty)
            },
        ),
    )?;
    registry.register(
        Identifier::vanilla("serversettings/motd"),
        IncomingMethod::parameterless(
            "Get the server message of the day",
            "message",
            ON_MAIN,
            |api, _client| Ok(api.settings().motd),
        ),
    )?;
    registry.register(
        Identifier::vanilla("serversettings/motd/set"),
        IncomingMethod::with_params(
            "Set the server message of the day",
            "message",
            "message",
            ON_MAIN,
            |api, message: String, _client| {
                let mut settings = api.settings();
                settings.motd = normalize_motd(message)?;
                api.replace_settings(settings);
                Ok(api.settings().motd)
            },
        ),
    )?;
    registry.register(
        Identifier::vanilla("serversettings/max_players"),
        IncomingMethod::parameterless(
            "Get the maximum number of players allowed to connect",
            "max",
            ON_MAIN,
            |api, _client| Ok(api.settings().max_players),
        ),
    )?;
    registry.register(
        Identifier::vanilla("serversettings/max_players/set"),
        IncomingMethod::with_params(
            "Set the maximum number of players allowed to connect",
            "max",
            "max",
            ON_MAIN,
            |api, max: u32, _client| {
                if max == 0 {
                    return Err(RpcError::invalid_params("max must be at least 1"));
                }
                let mut settings = api.settings();
                settings.max_players = max;
                api.replace_settings(settings);
                Ok(api.settings().max_players)
            },
        ),
    )
}

pub fn register(registry: &mut IncomingRegistry) -> Result<(), RegistryError> {
    register_list::<Allowlist>(registry)?;
    register_list::<Bans>(registry)?;
    register_list::<IpBans>(registry)?;
    register_list::<Operators>(registry)?;
    register_players(registry)?;
    register_server(registry)?;
    register_settings(registry)
}
