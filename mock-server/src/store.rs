//! In-memory resource tables backing the mock server.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::{json, Map, Value};

/// Tables the mock knows about. `files` is only reachable through API v5.
pub const COLLECTIONS: [&str; 6] = [
    "projects",
    "passwords",
    "my_passwords",
    "users",
    "groups",
    "files",
];

#[derive(Debug, Clone)]
pub struct Store {
    tables: HashMap<&'static str, BTreeMap<u64, Value>>,
    favorite_passwords: BTreeSet<u64>,
    favorite_projects: BTreeSet<u64>,
    next_id: u64,
}

impl Store {
    /// Empty tables plus the account the server authenticates as (id 1).
    pub fn new(username: &str) -> Self {
        let mut store = Self {
            tables: COLLECTIONS.iter().map(|name| (*name, BTreeMap::new())).collect(),
            favorite_passwords: BTreeSet::new(),
            favorite_projects: BTreeSet::new(),
            next_id: 1,
        };
        store.insert(
            "users",
            json!({
                "username": username,
                "name": "Administrator",
                "role": "Admin",
                "active": true,
            }),
        );
        store
    }

    pub fn is_collection(name: &str) -> bool {
        COLLECTIONS.contains(&name)
    }

    /// Every row of a table in id order.
    pub fn all(&self, collection: &str) -> Vec<Value> {
        self.tables
            .get(collection)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, collection: &str, id: u64) -> Option<&Value> {
        self.tables.get(collection)?.get(&id)
    }

    pub fn contains(&self, collection: &str, id: u64) -> bool {
        self.get(collection, id).is_some()
    }

    /// Store `item` under a fresh id and return that id.
    ///
    /// Returns `None` for an unknown table or a payload that is not an object.
    pub fn insert(&mut self, collection: &str, item: Value) -> Option<u64> {
        let Value::Object(mut fields) = item else {
            return None;
        };
        let table = self.tables.get_mut(collection)?;
        let id = self.next_id;
        self.next_id += 1;
        fields.insert("id".to_string(), json!(id));
        table.insert(id, Value::Object(fields));
        Some(id)
    }

    /// Shallow-merge the fields of `patch` into a row. `false` if absent.
    pub fn merge(&mut self, collection: &str, id: u64, patch: &Value) -> bool {
        let Some(Value::Object(fields)) = self.row_mut(collection, id) else {
            return false;
        };
        if let Value::Object(patch) = patch {
            for (key, value) in patch {
                if key != "id" {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
        true
    }

    /// Set one field on a row. `false` if absent.
    pub fn set(&mut self, collection: &str, id: u64, key: &str, value: Value) -> bool {
        self.merge(collection, id, &Value::Object(Map::from_iter([(key.to_string(), value)])))
    }

    pub fn unset(&mut self, collection: &str, id: u64, key: &str) -> bool {
        match self.row_mut(collection, id) {
            Some(Value::Object(fields)) => {
                fields.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, collection: &str, id: u64) -> bool {
        let removed = self
            .tables
            .get_mut(collection)
            .and_then(|table| table.remove(&id))
            .is_some();
        if removed {
            match collection {
                "passwords" => {
                    self.favorite_passwords.remove(&id);
                }
                "projects" => {
                    self.favorite_projects.remove(&id);
                }
                _ => {}
            }
        }
        removed
    }

    /// Favorite set for `projects` or `passwords`.
    pub fn favorites(&self, collection: &str) -> Option<&BTreeSet<u64>> {
        match collection {
            "passwords" => Some(&self.favorite_passwords),
            "projects" => Some(&self.favorite_projects),
            _ => None,
        }
    }

    pub fn favorites_mut(&mut self, collection: &str) -> Option<&mut BTreeSet<u64>> {
        match collection {
            "passwords" => Some(&mut self.favorite_passwords),
            "projects" => Some(&mut self.favorite_projects),
            _ => None,
        }
    }

    fn row_mut(&mut self, collection: &str, id: u64) -> Option<&mut Value> {
        self.tables.get_mut(collection)?.get_mut(&id)
    }
}
