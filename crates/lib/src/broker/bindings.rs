//! Binding table: app identity -> set of bound web identities.
//!
//! A set exists once the app has registered and may outlive the app's connection,
//! so a reconnecting app can pick its web peers back up.

use crate::identity::ConnectionIdentity;
use std::collections::{BTreeSet, HashMap};

#[derive(Default)]
pub struct BindingTable {
    sets: HashMap<ConnectionIdentity, BTreeSet<ConnectionIdentity>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty set for `app` if absent. Returns true when the set already existed.
    pub fn ensure_binding_set(&mut self, app: &ConnectionIdentity) -> bool {
        if self.sets.contains_key(app) {
            return true;
        }
        self.sets.insert(app.clone(), BTreeSet::new());
        false
    }

    pub fn has_binding_set(&self, app: &ConnectionIdentity) -> bool {
        self.sets.contains_key(app)
    }

    /// Add `web` to `app`'s set. Fails without mutation when `app` has no set.
    pub fn bind(&mut self, app: &ConnectionIdentity, web: &ConnectionIdentity) -> bool {
        match self.sets.get_mut(app) {
            Some(set) => {
                set.insert(web.clone());
                true
            }
            None => false,
        }
    }

    /// Remove `web` from every set when `remove_from_all_sets` is true.
    /// Returns the apps `web` was removed from.
    pub fn unbind_web(
        &mut self,
        web: &ConnectionIdentity,
        remove_from_all_sets: bool,
    ) -> Vec<ConnectionIdentity> {
        if !remove_from_all_sets {
            return Vec::new();
        }
        let mut removed: Vec<ConnectionIdentity> = self
            .sets
            .iter_mut()
            .filter_map(|(app, set)| set.remove(web).then(|| app.clone()))
            .collect();
        removed.sort();
        removed
    }

    /// Drop `app`'s set when `drop_binding_set` is true; otherwise keep it for a later rebind.
    pub fn on_app_removed(&mut self, app: &ConnectionIdentity, drop_binding_set: bool) {
        if drop_binding_set {
            self.sets.remove(app);
        }
    }

    /// Web peers bound to `app`, in identity order.
    pub fn members_of(&self, app: &ConnectionIdentity) -> Vec<ConnectionIdentity> {
        self.sets
            .get(app)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Apps whose set contains `web`, in identity order.
    pub fn apps_bound_to(&self, web: &ConnectionIdentity) -> Vec<ConnectionIdentity> {
        let mut apps: Vec<ConnectionIdentity> = self
            .sets
            .iter()
            .filter(|(_, set)| set.contains(web))
            .map(|(app, _)| app.clone())
            .collect();
        apps.sort();
        apps
    }
}
