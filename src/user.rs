//! The authenticated principal embedded in every request.
//!
//! `username` and `realm` are the identity tuple; `id` is derived from them so that
//! external stores can key on it without holding a reference back to this struct.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    id: Uuid,
    username: String,
    realm: String,
    pub roles: Vec<String>,
    pub attributes: HashMap<String, String>,
}

impl User {
    pub fn new(username: impl Into<String>, realm: impl Into<String>) -> Self {
        let username = username.into();
        let realm = realm.into();
        let id = derive_id(&username, &realm);
        Self {
            id,
            username,
            realm,
            roles: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Checks whether this user carries any of `roles`. Raises `Forbidden` rather
    /// than returning `false`, matching the fail-closed style of the system this was
    /// adapted from: callers that want a boolean should match on the error kind.
    pub fn is_authorized(&self, roles: &[String]) -> Result<()> {
        if roles.iter().any(|r| self.roles.contains(r)) {
            Ok(())
        } else {
            Err(Error::Forbidden("not authorized to access this resource".to_string()))
        }
    }
}

/// `id = uuid5(NAMESPACE_NIL, "{username}{len(username)}{realm}{len(realm)}")`.
/// Length-prefixing each field disambiguates `("ab", "c")` from `("a", "bc")`, which a
/// bare concatenation would collide on.
fn derive_id(username: &str, realm: &str) -> Uuid {
    let unique_string = format!("{username}{}{realm}{}", username.len(), realm.len());
    Uuid::new_v5(&Uuid::nil(), unique_string.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_deterministic_in_identity() {
        let a = User::new("alice", "ecmwf");
        let b = User::new("alice", "ecmwf");
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn id_distinguishes_concatenation_ambiguity() {
        let a = User::new("ab", "c");
        let b = User::new("a", "bc");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn is_authorized_matches_any_role() {
        let mut user = User::new("alice", "ecmwf");
        user.roles.push("reader".to_string());
        assert!(user.is_authorized(&["reader".to_string(), "writer".to_string()]).is_ok());
        assert!(user.is_authorized(&["writer".to_string()]).is_err());
    }
}
