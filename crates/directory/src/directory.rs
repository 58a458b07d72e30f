//! The published user set.
//!
//! Readers load an `Arc` to the current [`Snapshot`] without taking a lock;
//! publishing swaps in a new `Arc` atomically. Nothing is held across a load,
//! so reloads never stall readers, and a reader always sees one whole
//! snapshot.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::record::{Identity, User};
use crate::snapshot::Snapshot;

/// Client id of the built-in service-to-service client.
pub const EXAMPLE_CLIENT_ID: &str = "service";

/// A snapshot together with the generation it was published as.
struct Published<R> {
    snapshot: Arc<Snapshot<R>>,
    generation: u64,
}

/// Holder of the current snapshot.
pub struct Directory<R = User> {
    current: ArcSwap<Published<R>>,
}

impl<R: Identity> Directory<R> {
    /// Start serving `initial` as generation 1.
    pub fn new(initial: Snapshot<R>) -> Self {
        Self {
            current: ArcSwap::from_pointee(Published {
                snapshot: Arc::new(initial),
                generation: 1,
            }),
        }
    }

    /// The current snapshot. Hold on to it to make several reads against
    /// one consistent view.
    pub fn snapshot(&self) -> Arc<Snapshot<R>> {
        Arc::clone(&self.current.load().snapshot)
    }

    /// Number of snapshots published so far.
    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<R>> {
        self.snapshot().get_by_id(id)
    }

    pub fn get_by_username(&self, username: &str) -> Option<Arc<R>> {
        self.snapshot().get_by_username(username)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Publish `snapshot`; every read that starts after this returns sees it.
    /// Returns the new generation.
    pub fn replace_snapshot(&self, snapshot: Snapshot<R>) -> u64 {
        let users = snapshot.len();
        let next = Arc::new(snapshot);
        let previous = self.current.rcu(|current| Published {
            snapshot: Arc::clone(&next),
            generation: current.generation + 1,
        });
        let generation = previous.generation + 1;
        info!(
            generation,
            users,
            previous_users = previous.snapshot.len(),
            "published user snapshot"
        );
        generation
    }

    pub fn example_client_id(&self) -> &'static str {
        EXAMPLE_CLIENT_ID
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use userdir_core::DuplicateUsernamePolicy;

    use super::*;

    fn user(id: &str, username: &str, email: &str) -> User {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "username": username,
            "password": "pw",
            "email": email,
        }))
        .unwrap()
    }

    fn snapshot(users: Vec<User>) -> Snapshot {
        Snapshot::from_records(users, DuplicateUsernamePolicy::First).unwrap()
    }

    #[test]
    fn lookups_follow_current_snapshot() {
        let dir = Directory::new(snapshot(vec![
            user("1", "alice", "a@old"),
            user("2", "bob", "b@x"),
        ]));
        assert_eq!(dir.generation(), 1);
        assert_eq!(dir.get_by_username("alice").unwrap().id, "1");
        assert_eq!(dir.get_by_id("1").unwrap().email, "a@old");

        let generation = dir.replace_snapshot(snapshot(vec![user("1", "alice", "a@new")]));
        assert_eq!(generation, 2);
        assert_eq!(dir.get_by_id("1").unwrap().email, "a@new");
        assert!(dir.get_by_id("2").is_none(), "bob only existed in the old snapshot");
        assert!(dir.get_by_username("bob").is_none());
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn held_snapshot_is_unaffected_by_swap() {
        let dir = Directory::new(snapshot(vec![user("1", "alice", "a@old")]));
        let before = dir.snapshot();
        dir.replace_snapshot(snapshot(vec![user("1", "alice", "a@new")]));
        assert_eq!(before.get_by_id("1").unwrap().email, "a@old");
        assert_eq!(dir.get_by_id("1").unwrap().email, "a@new");
    }

    #[test]
    fn example_client_id_is_constant() {
        let empty: Directory = Directory::new(Snapshot::empty());
        assert_eq!(empty.example_client_id(), "service");
        assert!(empty.is_empty());
    }

    #[test]
    fn concurrent_readers_never_see_mixed_snapshots() {
        // Both users carry the version in their email; a torn read would
        // observe two different versions in one snapshot.
        let versioned = |v: usize| {
            snapshot(vec![
                user("1", "alice", &format!("v{v}")),
                user("2", "bob", &format!("v{v}")),
            ])
        };
        let dir = Arc::new(Directory::new(versioned(0)));
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let dir = Arc::clone(&dir);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    let mut reads = 0usize;
                    while !stop.load(Ordering::Relaxed) {
                        let snap = dir.snapshot();
                        let a = snap.get_by_id("1").unwrap();
                        let b = snap.get_by_id("2").unwrap();
                        assert_eq!(a.email, b.email);
                        reads += 1;
                    }
                    reads
                })
            })
            .collect();

        for v in 1..=200 {
            dir.replace_snapshot(versioned(v));
        }
        stop.store(true, Ordering::Relaxed);

        for reader in readers {
            reader.join().expect("reader panicked");
        }
        assert_eq!(dir.generation(), 201);
        assert_eq!(dir.get_by_id("2").unwrap().email, "v200");
    }

    #[test]
    fn concurrent_publishers_each_get_a_generation() {
        let dir = Arc::new(Directory::new(snapshot(vec![user("1", "alice", "v0")])));
        let writers: Vec<_> = (0..2)
            .map(|w| {
                let dir = Arc::clone(&dir);
                thread::spawn(move || {
                    (0..100)
                        .map(|v| dir.replace_snapshot(snapshot(vec![user("1", "alice", &format!("w{w}v{v}"))])))
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut generations: Vec<u64> = writers
            .into_iter()
            .flat_map(|w| w.join().expect("writer panicked"))
            .collect();
        generations.sort_unstable();
        generations.dedup();
        assert_eq!(generations, (2..=201).collect::<Vec<u64>>());
        assert_eq!(dir.generation(), 201);
    }
}
