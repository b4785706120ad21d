//! Directory of registered app peers and their optional metadata.

use crate::broker::protocol::AppEntry;
use crate::identity::ConnectionIdentity;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Default)]
pub struct Directory {
    entries: HashMap<ConnectionIdentity, Option<Value>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id`, or refresh it. Metadata is replaced only when supplied.
    /// Returns true when `id` was not listed before.
    pub fn register(&mut self, id: ConnectionIdentity, info: Option<Value>) -> bool {
        match self.entries.get_mut(&id) {
            Some(existing) => {
                if info.is_some() {
                    *existing = info;
                }
                false
            }
            None => {
                self.entries.insert(id, info);
                true
            }
        }
    }

    /// Remove `id` and its metadata. Returns true when it was listed.
    pub fn unregister(&mut self, id: &ConnectionIdentity) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn info(&self, id: &ConnectionIdentity) -> Option<&Value> {
        self.entries.get(id).and_then(Option::as_ref)
    }

    /// Snapshot of all entries, ordered by identity.
    pub fn list(&self) -> Vec<AppEntry> {
        let mut list: Vec<AppEntry> = self
            .entries
            .iter()
            .map(|(id, info)| AppEntry {
                client_id: id.clone(),
                client_info: info.clone(),
            })
            .collect();
        list.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        list
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
