//! Local record of the rooms that should be joined.

use std::collections::{HashMap, HashSet};

use crate::types::{RoomKey, RoomSubscription};

/// Room subscriptions keyed by `"{kind}:{room}"`.
///
/// Besides the subscriptions themselves, the registry tracks consecutive
/// join failures per room and which rooms were already (re-)joined since
/// the current authentication, so replay skips them.
///
/// A room whose joins kept being rejected is marked given up. It stays
/// registered until it is left or requested again, but is never replayed.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomKey, RoomSubscription>,
    failures: HashMap<RoomKey, u32>,
    joined_this_session: HashSet<RoomKey>,
    given_up: HashSet<RoomKey>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &RoomKey) -> bool {
        self.rooms.contains_key(key)
    }

    pub fn get(&self, key: &RoomKey) -> Option<&RoomSubscription> {
        self.rooms.get(key)
    }

    /// Inserts a subscription. Returns `false` (and keeps the existing
    /// entry) if the key is already present.
    pub fn insert(&mut self, sub: RoomSubscription) -> bool {
        let key = sub.key();
        if self.rooms.contains_key(&key) {
            return false;
        }
        self.rooms.insert(key, sub);
        true
    }

    /// Removes a subscription along with its failure count and marks.
    pub fn remove(&mut self, key: &RoomKey) -> Option<RoomSubscription> {
        self.failures.remove(key);
        self.joined_this_session.remove(key);
        self.given_up.remove(key);
        self.rooms.remove(key)
    }

    /// Keys of every active subscription for `room`, whatever its kind.
    pub fn keys_for_room(&self, room: &str) -> Vec<RoomKey> {
        let mut keys: Vec<RoomKey> = self
            .active()
            .filter(|sub| sub.room == room)
            .map(RoomSubscription::key)
            .collect();
        keys.sort();
        keys
    }

    /// Active subscriptions, ordered by key.
    pub fn subscriptions(&self) -> Vec<RoomSubscription> {
        let mut subs: Vec<RoomSubscription> = self.active().cloned().collect();
        subs.sort_by_key(RoomSubscription::key);
        subs
    }

    /// Given-up subscriptions, ordered by key.
    pub fn given_up(&self) -> Vec<RoomSubscription> {
        let mut subs: Vec<RoomSubscription> = self
            .rooms
            .values()
            .filter(|sub| self.given_up.contains(&sub.key()))
            .cloned()
            .collect();
        subs.sort_by_key(RoomSubscription::key);
        subs
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.rooms.len() - self.given_up.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn active(&self) -> impl Iterator<Item = &RoomSubscription> {
        self.rooms
            .iter()
            .filter(|(key, _)| !self.given_up.contains(*key))
            .map(|(_, sub)| sub)
    }

    /// Stops rejoining a registered room. Its failure count is cleared so a
    /// later request starts afresh.
    pub fn give_up(&mut self, key: &RoomKey) {
        if self.rooms.contains_key(key) {
            self.failures.remove(key);
            self.joined_this_session.remove(key);
            self.given_up.insert(key.clone());
        }
    }

    pub fn is_given_up(&self, key: &RoomKey) -> bool {
        self.given_up.contains(key)
    }

    /// Records a join failure and returns the consecutive failure count.
    pub fn record_failure(&mut self, key: &RoomKey) -> u32 {
        let count = self.failures.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn failures(&self, key: &RoomKey) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    pub fn clear_failures(&mut self, key: &RoomKey) {
        self.failures.remove(key);
    }

    pub fn reset_failures(&mut self) {
        self.failures.clear();
    }

    /// Starts a new authenticated session: nothing counts as re-joined yet.
    pub fn begin_session(&mut self) {
        self.joined_this_session.clear();
    }

    /// Marks a room as joined in the current session.
    pub fn mark_joined(&mut self, key: &RoomKey) {
        if self.rooms.contains_key(key) {
            self.joined_this_session.insert(key.clone());
        }
    }

    /// Active subscriptions not yet joined in the current session, oldest
    /// first.
    pub fn pending_replay(&self) -> Vec<RoomSubscription> {
        let mut subs: Vec<RoomSubscription> = self
            .active()
            .filter(|sub| !self.joined_this_session.contains(&sub.key()))
            .cloned()
            .collect();
        subs.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.key().cmp(&b.key())));
        subs
    }
}
