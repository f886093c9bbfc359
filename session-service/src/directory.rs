use std::collections::HashMap;

use common_auth::{Claims, Deferred, UserLookup, UserProvider};
use serde_json::{json, Value};

/// In-memory user records keyed by id.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, Claims>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded() -> Self {
        let mut directory = Self::new();
        directory.insert(user("u-100", "Ada Lovelace", &["reports:read"]));
        directory.insert(user("u-200", "Grace Hopper", &["admin", "audit", "reports:read"]));
        directory.insert(user("u-300", "Alan Turing", &[]));
        directory
    }

    /// Adds or replaces a record. Records without an `id` are ignored.
    pub fn insert(&mut self, user: Claims) {
        if let Some(id) = user.id_string() {
            self.users.insert(id, user);
        }
    }

    pub fn find(&self, id: &Value) -> Option<Claims> {
        let key = match id {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        self.users.get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserProvider for UserDirectory {
    fn get_user(&self, id: Value) -> UserLookup {
        Deferred::ready(Ok(self.find(&id)))
    }
}

fn user(id: &str, name: &str, privileges: &[&str]) -> Claims {
    let mut claims = Claims::with_id(id);
    claims.insert("name", name);
    claims.insert("privilegeList", json!(privileges));
    claims
}
