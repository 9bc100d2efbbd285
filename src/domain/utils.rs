//! Shared validation and normalization for management payloads

use std::net::IpAddr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::domain::types::{IpBan, Operator, Player, UserBan};
use crate::errors::RpcError;

pub const MAX_PLAYER_NAME_LEN: usize = 16;
pub const MAX_PERMISSION_LEVEL: u8 = 4;

pub fn normalize_player(player: Player) -> Result<Player, RpcError> {
    let id = player
        .id
        .map(|id| id.trim().to_ascii_lowercase())
        .filter(|id| !id.is_empty());
    let name = player
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    if id.is_none() && name.is_none() {
        return Err(RpcError::invalid_params(
            "player must have an id or a name",
        ));
    }

    if let Some(name) = &name {
        if name.len() > MAX_PLAYER_NAME_LEN
            || !name
                .chars()
                .all(|character| character.is_ascii_alphanumeric() || character == '_')
        {
            return Err(RpcError::invalid_params(
                "player name must be 1-16 characters of letters, digits, and underscores",
            ));
        }
    }

    Ok(Player { id, name })
}

pub fn normalize_ip(ip: &str) -> Result<String, RpcError> {
    ip.trim()
        .parse::<IpAddr>()
        .map(|address| address.to_string())
        .map_err(|_| RpcError::invalid_params("ip must be a valid IPv4 or IPv6 address"))
}

/// Parses an RFC3339 expiry and re-renders it in UTC with a trailing `Z`.
pub fn normalize_expiry(value: Option<String>) -> Result<Option<String>, RpcError> {
    let Some(value) = value else {
        return Ok(None);
    };

    let parsed = DateTime::parse_from_rfc3339(value.trim()).map_err(|_| {
        RpcError::invalid_params("expires must be an RFC3339 timestamp")
    })?;

    Ok(Some(
        parsed
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    ))
}

pub fn normalize_user_ban(ban: UserBan) -> Result<UserBan, RpcError> {
    Ok(UserBan {
        player: normalize_player(ban.player)?,
        expires: normalize_expiry(ban.expires)?,
        ..ban
    })
}

pub fn normalize_ip_ban(ban: IpBan) -> Result<IpBan, RpcError> {
    Ok(IpBan {
        ip: normalize_ip(&ban.ip)?,
        expires: normalize_expiry(ban.expires)?,
        ..ban
    })
}

pub fn normalize_operator(operator: Operator) -> Result<Operator, RpcError> {
    if operator
        .permission_level
        .is_some_and(|level| level > MAX_PERMISSION_LEVEL)
    {
        return Err(RpcError::invalid_params("permissionLevel must be 0-4"));
    }

    Ok(Operator {
        player: normalize_player(operator.player)?,
        ..operator
    })
}

pub fn normalize_motd(motd: String) -> Result<String, RpcError> {
    if motd.chars().any(|character| character.is_control() && character != '\n') {
        return Err(RpcError::invalid_params(
            "motd must not contain control characters",
        ));
    }

    Ok(motd)
}

#[cfg(test)]
mod tests {
    use super::{normalize_expiry, normalize_ip, normalize_operator, normalize_player};
    use crate::domain::types::{Operator, Player};

    #[test]
    fn normalizes_player_name_and_id() {
        let player = normalize_player(Player {
            id: Some(" 853C80EF-3C37-49FD-AA49-938B674ADAE6 ".to_string()),
            name: Some("  Steve ".to_string()),
        })
        .expect("valid player");

        assert_eq!(player.id.as_deref(), Some("853c80ef-3c37-49fd-aa49-938b674adae6"));
        assert_eq!(player.name.as_deref(), Some("Steve"));
    }

    #[test]
    fn rejects_anonymous_player() {
        let error = normalize_player(Player {
            id: Some("  ".to_string()),
            name: None,
        })
        .expect_err("expected missing identity");
        assert!(error.data().is_some_and(|data| data.contains("id or a name")));
    }

    #[test]
    fn rejects_player_name_with_disallowed_characters() {
        assert!(normalize_player(Player::named("not a name")).is_err());
        assert!(normalize_player(Player::named("a_name_that_is_far_too_long")).is_err());
    }

    #[test]
    fn normalizes_ip_addresses() {
        assert_eq!(normalize_ip(" 10.0.0.1 ").expect("valid ip"), "10.0.0.1");
        assert_eq!(normalize_ip("2001:DB8::1").expect("valid ip"), "2001:db8::1");
        assert!(normalize_ip("10.0.0.256").is_err());
    }

    #[test]
    fn expiry_is_rendered_in_utc() {
        let expiry = normalize_expiry(Some("2026-03-01T12:00:00+02:00".to_string()))
            .expect("valid expiry");
        assert_eq!(expiry.as_deref(), Some("2026-03-01T10:00:00Z"));
        assert!(normalize_expiry(Some("tomorrow".to_string())).is_err());
    }

    #[test]
    fn rejects_out_of_range_permission_level() {
        let operator = Operator {
            player: Player::named("Steve"),
            permission_level: Some(5),
            bypasses_player_limit: None,
        };
        assert!(normalize_operator(operator).is_err());
    }
}
