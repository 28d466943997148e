use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Feed paging position: the SQL order keys of the last item served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCursor {
    #[serde(rename = "p")]
    pub priority: i32,
    #[serde(rename = "t")]
    pub created_at_ms: i64,
    #[serde(rename = "i")]
    pub user_id: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("cursor is not valid base64url")]
    Encoding,
    #[error("cursor payload is malformed")]
    Payload,
}

impl FeedCursor {
    pub fn encode(&self) -> String {
        // Serializing three integers cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|_| CursorError::Encoding)?;
        let cursor: FeedCursor = serde_json::from_slice(&bytes).map_err(|_| CursorError::Payload)?;
        if cursor.user_id <= 0 || !(0..=1).contains(&cursor.priority) {
            return Err(CursorError::Payload);
        }
        Ok(cursor)
    }

    /// True when a row with these keys sorts strictly after the cursor.
    pub fn precedes(&self, priority: i32, created_at_ms: i64, user_id: i64) -> bool {
        priority < self.priority
            || (priority == self.priority
                && (created_at_ms < self.created_at_ms
                    || (created_at_ms == self.created_at_ms && user_id < self.user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_short_keys_without_padding() {
        let cursor = FeedCursor { priority: 0, created_at_ms: 1_770_638_340_000, user_id: 42 };
        let token = cursor.encode();

        assert!(!token.contains('='));
        let json = String::from_utf8(URL_SAFE_NO_PAD.decode(&token).unwrap()).unwrap();
        assert_eq!(json, r#"{"p":0,"t":1770638340000,"i":42}"#);
        assert_eq!(FeedCursor::decode(&token).unwrap(), cursor);
    }

    #[test]
    fn malformed_cursors_are_rejected() {
        assert!(matches!(FeedCursor::decode("%%%"), Err(CursorError::Encoding)));
        let not_json = URL_SAFE_NO_PAD.encode(b"hello");
        assert!(matches!(FeedCursor::decode(&not_json), Err(CursorError::Payload)));
        let bad_user = URL_SAFE_NO_PAD.encode(br#"{"p":0,"t":1,"i":0}"#);
        assert!(FeedCursor::decode(&bad_user).is_err());
    }

    #[test]
    fn strict_predicate_excludes_the_cursor_row() {
        let c = FeedCursor { priority: 1, created_at_ms: 1000, user_id: 50 };
        assert!(!c.precedes(1, 1000, 50));
        assert!(c.precedes(1, 1000, 49));
        assert!(c.precedes(1, 999, 99));
        assert!(c.precedes(0, 5000, 99));
        assert!(!c.precedes(1, 1001, 1));
    }
}
