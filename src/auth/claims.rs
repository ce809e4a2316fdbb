use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT payload. `sub` is the user id, `iat`/`exp` are unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

impl Claims {
    pub fn issue(
        sub: Uuid,
        kind: TokenKind,
        ttl: Duration,
        iss: &str,
        aud: &str,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            sub,
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            iss: iss.to_string(),
            aud: aud.to_string(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn expiry_follows_ttl() {
        let now = datetime!(2024-01-01 0:00 UTC);
        let c = Claims::issue(Uuid::nil(), TokenKind::Refresh, Duration::minutes(10), "i", "a", now);
        assert_eq!(c.exp - c.iat, 600);
        assert_eq!(c.iat, 1_704_067_200);
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&TokenKind::Access).unwrap(), "\"access\"");
    }
}
