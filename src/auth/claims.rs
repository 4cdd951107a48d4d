use serde::Deserialize;
use serde_json::{Map, Value};

/// Decoded ID token claims
///
/// Kept as the raw JSON mapping so that custom attributes (`userCategory`,
/// `isAdmin`, ...) are compared by their actual JSON type, never coerced.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct IdTokenClaims(Map<String, Value>);

/// One row of the claims table on the protected page
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimRow {
    pub name: String,
    pub value: String,
}

impl IdTokenClaims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Build from a JSON value; `None` unless it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn sub(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// Expiry as unix seconds
    pub fn exp(&self) -> Option<i64> {
        self.0.get("exp").and_then(Value::as_i64)
    }

    pub fn nonce(&self) -> Option<&str> {
        self.get_str("nonce")
    }

    /// Best human-readable name available in the token
    pub fn display_name(&self) -> String {
        ["name", "preferred_username", "email", "sub"]
            .iter()
            .find_map(|key| self.get_str(key))
            .unwrap_or("partner")
            .to_string()
    }

    /// True when `exp` is missing or at/before `now` (unix seconds)
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.exp() {
            Some(exp) => exp <= now,
            None => true,
        }
    }

    /// Claims as display rows, sorted by name, values rendered as JSON
    pub fn rows(&self) -> Vec<ClaimRow> {
        let mut rows: Vec<ClaimRow> = self
            .0
            .iter()
            .map(|(name, value)| ClaimRow {
                name: name.clone(),
                value: match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }
}

/// Current unix time in seconds
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Compare the `nonce` claim against the value sent with the authorize request
pub fn nonce_matches(claims: &IdTokenClaims, expected: &str) -> bool {
    claims.nonce() == Some(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> IdTokenClaims {
        IdTokenClaims::from_value(value).unwrap()
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(IdTokenClaims::from_value(json!("token")).is_none());
        assert!(IdTokenClaims::from_value(json!([1, 2])).is_none());
    }

    #[test]
    fn test_expiry() {
        let c = claims(json!({"sub": "u1", "exp": 1_000}));
        assert!(!c.is_expired_at(999));
        assert!(c.is_expired_at(1_000));
        assert!(c.is_expired_at(5_000));

        let no_exp = claims(json!({"sub": "u1"}));
        assert!(no_exp.is_expired_at(0));
    }

    #[test]
    fn test_display_name_prefers_name_then_username() {
        let c = claims(json!({"sub": "00u1", "email": "a@atko.com", "name": "Ada Lovelace"}));
        assert_eq!(c.display_name(), "Ada Lovelace");

        let c = claims(json!({"sub": "00u1", "email": "a@atko.com"}));
        assert_eq!(c.display_name(), "a@atko.com");

        let c = claims(json!({"sub": "00u1"}));
        assert_eq!(c.display_name(), "00u1");
    }

    #[test]
    fn test_nonce_matches_exact_value_only() {
        let c = claims(json!({"sub": "u1", "nonce": "abc"}));
        assert!(nonce_matches(&c, "abc"));
        assert!(!nonce_matches(&c, "abd"));
        assert!(!nonce_matches(&claims(json!({"sub": "u1"})), "abc"));
    }

    #[test]
    fn test_rows_are_sorted_and_json_rendered() {
        let c = claims(json!({"sub": "u1", "isAdmin": true, "amr": ["pwd"], "email": "a@atko.com"}));
        let rows = c.rows();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["amr", "email", "isAdmin", "sub"]);
        assert_eq!(rows[0].value, "[\"pwd\"]");
        assert_eq!(rows[1].value, "a@atko.com");
        assert_eq!(rows[2].value, "true");
    }
}
