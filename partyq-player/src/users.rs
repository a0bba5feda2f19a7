//! Registered party users
//!
//! The registry decides who may vote and who is banned. Banning implies
//! registration, and a ban issued before a user registers still applies once
//! they do.

use partyq_common::User;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

#[derive(Debug, Default)]
struct Registry {
    /// Registration order, for stable listings
    registered: HashMap<User, usize>,
    banned: HashSet<User>,
}

#[derive(Debug, Default)]
pub struct UserRegistry {
    inner: RwLock<Registry>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `user`; returns false if already registered
    pub fn register(&self, user: &User) -> bool {
        let mut registry = self.write();
        if registry.registered.contains_key(user) {
            return false;
        }
        let order = registry.registered.len();
        registry.registered.insert(user.clone(), order);
        info!("Registered {}", user);
        true
    }

    /// Ban `user`, registering them first if needed; returns false if already banned
    pub fn ban(&self, user: &User) -> bool {
        let mut registry = self.write();
        let order = registry.registered.len();
        registry.registered.entry(user.clone()).or_insert(order);
        let newly = registry.banned.insert(user.clone());
        if newly {
            info!("Banned {}", user);
        }
        newly
    }

    pub fn is_registered(&self, user: &User) -> bool {
        self.read().registered.contains_key(user)
    }

    pub fn is_banned(&self, user: &User) -> bool {
        self.read().banned.contains(user)
    }

    /// Registered users who are not banned
    pub fn active_count(&self) -> usize {
        let registry = self.read();
        registry
            .registered
            .keys()
            .filter(|u| !registry.banned.contains(*u))
            .count()
    }

    /// All registered users in registration order, with their ban flag set
    pub fn users(&self) -> Vec<User> {
        let registry = self.read();
        let mut users: Vec<_> = registry
            .registered
            .iter()
            .map(|(user, order)| {
                let mut user = user.clone();
                user.is_banned = registry.banned.contains(&user);
                (*order, user)
            })
            .collect();
        users.sort_by_key(|(order, _)| *order);
        users.into_iter().map(|(_, user)| user).collect()
    }

    pub fn clear(&self) {
        let mut registry = self.write();
        registry.registered.clear();
        registry.banned.clear();
    }
}
