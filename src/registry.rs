//! Registry of online peers
//!
//! Peers are bucketed by username; a bucket keeps insertion order so that
//! enumeration is deterministic. Every mutation happens under one write
//! lock, so a peer is never observed half-inserted or half-removed.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::peer::Peer;

/// Online peers, queryable by username and/or uuid
#[derive(Clone, Default)]
pub struct PeerRegistry {
    buckets: Arc<RwLock<HashMap<String, Vec<Peer>>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer
    ///
    /// Returns the peer previously registered under the same
    /// `(username, uuid)`, which the caller is expected to close.
    pub fn insert(&self, peer: Peer) -> Option<Peer> {
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(peer.username().to_string()).or_default();

        let replaced = bucket
            .iter()
            .position(|p| p.uuid() == peer.uuid())
            .map(|index| bucket.remove(index));

        debug!("Registry add {}", peer.key());
        bucket.push(peer);
        replaced
    }

    /// Remove exactly this peer
    ///
    /// Returns false if it was not registered (already removed or replaced).
    pub fn remove(&self, peer: &Peer) -> bool {
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        let Some(bucket) = buckets.get_mut(peer.username()) else {
            return false;
        };
        let Some(index) = bucket.iter().position(|p| p.same_as(peer)) else {
            return false;
        };

        bucket.remove(index);
        if bucket.is_empty() {
            buckets.remove(peer.username());
        }
        debug!("Registry remove {}", peer.key());
        true
    }

    /// Count the peers matching the filter
    ///
    /// - no username, no uuid: every online peer
    /// - username only: peers sharing that username
    /// - username and uuid: 1 if that exact peer is online, else 0
    /// - uuid only: peers with that uuid under any username
    pub fn peers(&self, username: Option<&str>, uuid: Option<&str>) -> usize {
        self.select(username, uuid).len()
    }

    /// Invoke `callback` once per peer matching the filter and return the count
    ///
    /// The callback runs after the registry lock is released, so it may
    /// close peers.
    pub fn each_peer<F>(&self, username: Option<&str>, uuid: Option<&str>, mut callback: F) -> usize
    where
        F: FnMut(&Peer),
    {
        let selected = self.select(username, uuid);
        for peer in &selected {
            callback(peer);
        }
        selected.len()
    }

    /// Look up one peer by its full identity
    pub fn get(&self, username: &str, uuid: &str) -> Option<Peer> {
        self.select(Some(username), Some(uuid)).into_iter().next()
    }

    fn select(&self, username: Option<&str>, uuid: Option<&str>) -> Vec<Peer> {
        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        let matches_uuid = |peer: &&Peer| uuid.map_or(true, |uuid| peer.uuid() == uuid);

        match username {
            Some(username) => buckets
                .get(username)
                .map(|bucket| bucket.iter().filter(matches_uuid).cloned().collect())
                .unwrap_or_default(),
            None => {
                let mut names: Vec<&String> = buckets.keys().collect();
                names.sort();
                names
                    .into_iter()
                    .flat_map(|name| buckets[name].iter())
                    .filter(matches_uuid)
                    .cloned()
                    .collect()
            }
        }
    }
}
