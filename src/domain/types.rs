//! Payload types exchanged with management clients.

use serde::{Deserialize, Serialize};

use crate::rpc::schema::{DescribeSchema, Property, Schema};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Player {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    /// Same player: equal ids when both are known, else equal names ignoring
    /// case.
    pub fn is_same(&self, other: &Player) -> bool {
        if let (Some(left), Some(right)) = (&self.id, &other.id) {
            return left == right;
        }
        match (&self.name, &other.name) {
            (Some(left), Some(right)) => left.eq_ignore_ascii_case(right),
            _ => false,
        }
    }
}

impl DescribeSchema for Player {
    fn schema() -> Schema {
        Schema::Object(vec![
            Property::optional("id", Schema::String),
            Property::optional("name", Schema::String),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBan {
    pub player: Player,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

impl DescribeSchema for UserBan {
    fn schema() -> Schema {
        Schema::Object(vec![
            Property::required("player", Player::schema()),
            Property::optional("reason", Schema::String),
            Property::optional("source", Schema::String),
            Property::optional("expires", Schema::String),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpBan {
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

impl DescribeSchema for IpBan {
    fn schema() -> Schema {
        Schema::Object(vec![
            Property::required("ip", Schema::String),
            Property::optional("reason", Schema::String),
            Property::optional("source", Schema::String),
            Property::optional("expires", Schema::String),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub player: Player,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bypasses_player_limit: Option<bool>,
}

impl DescribeSchema for Operator {
    fn schema() -> Schema {
        Schema::Object(vec![
            Property::required("player", Player::schema()),
            Property::optional("permissionLevel", Schema::Integer),
            Property::optional("bypassesPlayerLimit", Schema::Boolean),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickPlayer {
    pub player: Player,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DescribeSchema for KickPlayer {
    fn schema() -> Schema {
        Schema::Object(vec![
            Property::required("player", Player::schema()),
            Property::optional("message", Schema::String),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessage {
    pub message: String,
    #[serde(default)]
    pub overlay: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiving_players: Option<Vec<Player>>,
}

impl DescribeSchema for SystemMessage {
    fn schema() -> Schema {
        Schema::Object(vec![
            Property::required("message", Schema::String),
            Property::optional("overlay", Schema::Boolean),
            Property::optional("receivingPlayers", Schema::array_of(Player::schema())),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub name: String,
    pub protocol: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState {
    pub started: bool,
    pub players: Vec<Player>,
    pub version: Version,
}

impl DescribeSchema for ServerState {
    fn schema() -> Schema {
        Schema::Object(vec![
            Property::required("started", Schema::Boolean),
            Property::required("players", Schema::array_of(Player::schema())),
            Property::required(
                "version",
                Schema::Object(vec![
                    Property::required("name", Schema::String),
                    Property::required("protocol", Schema::Integer),
                ]),
            ),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Peaceful,
    Easy,
    Normal,
    Hard,
}

impl DescribeSchema for Difficulty {
    fn schema() -> Schema {
        Schema::Enum(vec!["peaceful", "easy", "normal", "hard"])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub autosave: bool,
    pub difficulty: Difficulty,
    pub motd: String,
    pub max_players: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            autosave: true,
            difficulty: Difficulty::Normal,
            motd: "A Minecraft Server".to_string(),
            max_players: 20,
        }
    }
}

/// State changes reported by the game, one notification each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    ServerStarted,
    ServerStopping,
    ServerSaving,
    ServerSaved,
    Status(ServerState),
    PlayerJoined(Player),
    PlayerLeft(Player),
    OperatorAdded(Operator),
    OperatorRemoved(Operator),
    AllowlistAdded(Player),
    AllowlistRemoved(Player),
    IpBanAdded(IpBan),
    IpBanRemoved(String),
    BanAdded(UserBan),
    BanRemoved(Player),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn same_player_prefers_ids() {
        let by_id = Player {
            id: Some("1".to_string()),
            name: Some("Steve".to_string()),
        };
        let renamed = Player {
            id: Some("1".to_string()),
            name: Some("Alex".to_string()),
        };
        let other = Player {
            id: Some("2".to_string()),
            name: Some("Steve".to_string()),
        };

        assert!(by_id.is_same(&renamed));
        assert!(!by_id.is_same(&other));
        assert!(Player::named("steve").is_same(&by_id));
    }

    #[test]
    fn operator_uses_camel_case_on_the_wire() {
        let operator = Operator {
            player: Player::named("Steve"),
            permission_level: Some(4),
            bypasses_player_limit: None,
        };

        assert_eq!(
            serde_json::to_value(&operator).expect("serialize operator"),
            json!({"player": {"name": "Steve"}, "permissionLevel": 4})
        );
    }

    #[test]
    fn difficulty_is_lowercase() {
        let parsed: Difficulty = serde_json::from_value(json!("hard")).expect("parse difficulty");
        assert_eq!(parsed, Difficulty::Hard);
        assert!(serde_json::from_value::<Difficulty>(json!("HARD")).is_err());
    }
}
