//! Registry of rounds that stay open across several player actions.

use crate::common::types::UserId;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Anything that belongs to one user.
pub trait Owned {
    fn owner(&self) -> UserId;
}

/// Thread-safe pool of open rounds keyed by round id
pub struct SessionPool<T> {
    sessions: DashMap<Uuid, Arc<T>>,
}

impl<T: Owned> SessionPool<T> {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    pub fn insert(&self, id: Uuid, session: Arc<T>) {
        self.sessions.insert(id, session);
    }

    /// Looks a round up on behalf of `user`; other users' rounds are invisible.
    pub fn get_for(&self, id: Uuid, user: UserId) -> Option<Arc<T>> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .filter(|session| session.owner() == user)
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub fn open_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of every open round, for sweeps.
    pub fn all(&self) -> Vec<Arc<T>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn open_for(&self, user: UserId) -> Vec<Uuid> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().owner() == user)
            .map(|entry| *entry.key())
            .collect()
    }
}

impl<T: Owned> Default for SessionPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Seat(UserId);

    impl Owned for Seat {
        fn owner(&self) -> UserId {
            self.0
        }
    }

    #[test]
    fn test_pool_scopes_by_owner() {
        let pool = SessionPool::new();
        let id = Uuid::new_v4();
        pool.insert(id, Arc::new(Seat(1)));

        assert!(pool.get_for(id, 1).is_some());
        assert!(pool.get_for(id, 2).is_none());
        assert_eq!(pool.open_for(1), vec![id]);
        assert_eq!(pool.open_count(), 1);
        assert_eq!(pool.all().len(), 1);

        assert!(pool.remove(id));
        assert!(!pool.remove(id));
        assert_eq!(pool.open_count(), 0);
    }
}
