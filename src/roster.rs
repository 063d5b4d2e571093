//! In-memory roster of identified students and the admin broadcast path.
//!
//! Single source of truth for "who is online". Every mutation and the
//! broadcast it triggers happen under one lock, so no observer ever sees a
//! partially-applied roster. Observer queues are bounded and fed with
//! `try_send` only; a slow admin dashboard drops updates instead of stalling
//! student connection handling.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Per-observer queue depth. Roster updates are full snapshots, so a dropped
/// update is superseded by the next one.
const OBSERVER_QUEUE_DEPTH: usize = 64;

/// Opaque per-connection handle, minted by [`Roster::allocate_conn_id`].
/// Allocation is monotonic, which keeps `BTreeMap` iteration in connection
/// order and makes snapshot ordering deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId(u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exam track chosen by the student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Track {
    B1,
    B2,
}

/// Identity record supplied by a student on login.
/// Fields are stored as given; nothing is validated and `numero` is not
/// required to be unique across connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    #[serde(default)]
    pub nom: String,
    #[serde(default)]
    pub numero: String,
    #[serde(default)]
    pub option: Option<Track>,
}

/// Point-in-time view of all identified, still-connected students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub count: usize,
    pub users: Vec<Student>,
}

/// Event pushed to admin observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminEvent {
    RosterUpdate { count: usize, users: Vec<Student> },
    NewResult { data: Value },
}

impl AdminEvent {
    fn from_snapshot(snapshot: RosterSnapshot) -> Self {
        AdminEvent::RosterUpdate {
            count: snapshot.count,
            users: snapshot.users,
        }
    }
}

/// Identifies a subscribed admin observer for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObserverId(u64);

struct RosterInner {
    next_conn_id: u64,
    next_observer_id: u64,
    students: BTreeMap<ConnId, Student>,
    observers: BTreeMap<ObserverId, mpsc::Sender<AdminEvent>>,
}

/// Process-wide presence state. One instance lives in `AppState` for the
/// process duration; handlers receive it by reference.
pub struct Roster {
    inner: Mutex<RosterInner>,
}

impl Roster {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RosterInner {
                next_conn_id: 0,
                next_observer_id: 0,
                students: BTreeMap::new(),
                observers: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RosterInner> {
        // Mutations are total and leave the maps structurally valid, so a
        // poisoned lock carries usable state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mint a fresh connection id for a newly opened student socket.
    pub fn allocate_conn_id(&self) -> ConnId {
        let mut inner = self.lock();
        let id = ConnId(inner.next_conn_id);
        inner.next_conn_id += 1;
        id
    }

    /// Register (or overwrite) the identity for a connection and broadcast
    /// the new roster. Re-identification on the same connection is allowed
    /// and simply replaces the entry.
    pub fn identify(&self, conn: ConnId, student: Student) {
        let mut inner = self.lock();
        inner.students.insert(conn, student);
        broadcast_roster(&mut inner);
    }

    /// Drop the entry for a closed connection. A connection that never
    /// identified has no entry; that is a no-op, not an error. The roster is
    /// re-broadcast unconditionally either way, which keeps the close path
    /// branch-free at the cost of an occasional redundant (idempotent) push.
    pub fn disconnect(&self, conn: ConnId) {
        let mut inner = self.lock();
        inner.students.remove(&conn);
        broadcast_roster(&mut inner);
    }

    /// Consistent point-in-time view of the roster.
    pub fn snapshot(&self) -> RosterSnapshot {
        snapshot_locked(&self.lock())
    }

    /// Register an admin observer. The current snapshot is queued before the
    /// lock is released, so the observer sees current state immediately and
    /// no concurrent mutation can slip between snapshot and registration.
    pub fn subscribe(&self) -> (ObserverId, mpsc::Receiver<AdminEvent>) {
        let (tx, rx) = mpsc::channel(OBSERVER_QUEUE_DEPTH);
        let mut inner = self.lock();
        let id = ObserverId(inner.next_observer_id);
        inner.next_observer_id += 1;
        let snapshot = snapshot_locked(&inner);
        let _ = tx.try_send(AdminEvent::from_snapshot(snapshot));
        inner.observers.insert(id, tx);
        (id, rx)
    }

    /// Remove an observer. Safe to call after the observer was already pruned
    /// as closed during a broadcast.
    pub fn unsubscribe(&self, id: ObserverId) {
        self.lock().observers.remove(&id);
    }

    /// Relay a result payload to all observers. Does not touch the student
    /// map; the result path is independent of the presence lifecycle.
    pub fn publish_result(&self, data: Value) {
        broadcast_event(&mut self.lock(), AdminEvent::NewResult { data });
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_locked(inner: &RosterInner) -> RosterSnapshot {
    RosterSnapshot {
        count: inner.students.len(),
        users: inner.students.values().cloned().collect(),
    }
}

fn broadcast_roster(inner: &mut RosterInner) {
    let event = AdminEvent::from_snapshot(snapshot_locked(inner));
    broadcast_event(inner, event);
}

/// Fire-and-forget delivery to every observer queue. A full queue drops this
/// event for that observer; a closed queue prunes the observer. Neither
/// outcome is reported to the caller.
fn broadcast_event(inner: &mut RosterInner, event: AdminEvent) {
    inner.observers.retain(|id, tx| match tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(observer = id.0, "observer queue full, dropping update");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(nom: &str, numero: &str, option: Option<Track>) -> Student {
        Student {
            nom: nom.to_string(),
            numero: numero.to_string(),
            option,
        }
    }

    #[test]
    fn snapshot_counts_identified_connections() {
        let roster = Roster::new();
        let a = roster.allocate_conn_id();
        let b = roster.allocate_conn_id();
        assert_eq!(roster.snapshot().count, 0);

        roster.identify(a, student("Alice", "123", Some(Track::B1)));
        assert_eq!(roster.snapshot().count, 1);

        roster.identify(b, student("Bob", "456", Some(Track::B2)));
        assert_eq!(roster.snapshot().count, 2);

        roster.disconnect(a);
        let snap = roster.snapshot();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.users[0].nom, "Bob");
    }

    #[test]
    fn disconnect_is_idempotent_and_tolerates_anonymous() {
        let roster = Roster::new();
        let anon = roster.allocate_conn_id();
        // Never identified: removal is a no-op, not an error.
        roster.disconnect(anon);
        assert_eq!(roster.snapshot().count, 0);

        let a = roster.allocate_conn_id();
        roster.identify(a, student("Alice", "123", Some(Track::B1)));
        roster.disconnect(a);
        roster.disconnect(a);
        assert_eq!(roster.snapshot().count, 0);
    }

    #[test]
    fn reidentification_overwrites_entry() {
        let roster = Roster::new();
        let a = roster.allocate_conn_id();
        roster.identify(a, student("Alice", "123", Some(Track::B1)));
        roster.identify(a, student("Alicia", "123", Some(Track::B2)));

        let snap = roster.snapshot();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.users[0].nom, "Alicia");
        assert_eq!(snap.users[0].option, Some(Track::B2));
    }

    #[test]
    fn final_state_depends_only_on_surviving_connections() {
        let alice = student("Alice", "1", Some(Track::B1));
        let bob = student("Bob", "2", Some(Track::B2));

        // Two interleavings of the same event set.
        let r1 = Roster::new();
        let (a1, b1, c1) = (
            r1.allocate_conn_id(),
            r1.allocate_conn_id(),
            r1.allocate_conn_id(),
        );
        r1.identify(a1, alice.clone());
        r1.identify(c1, student("Carol", "3", None));
        r1.identify(b1, bob.clone());
        r1.disconnect(c1);

        let r2 = Roster::new();
        let (a2, b2, c2) = (
            r2.allocate_conn_id(),
            r2.allocate_conn_id(),
            r2.allocate_conn_id(),
        );
        r2.identify(c2, student("Carol", "3", None));
        r2.disconnect(c2);
        r2.identify(a2, alice.clone());
        r2.identify(b2, bob.clone());

        assert_eq!(r1.snapshot(), r2.snapshot());
        assert_eq!(r1.snapshot().users, vec![alice, bob]);
    }

    #[test]
    fn subscriber_gets_immediate_snapshot_then_one_event_per_mutation() {
        let roster = Roster::new();
        let a = roster.allocate_conn_id();
        roster.identify(a, student("Alice", "123", Some(Track::B1)));

        let (_id, mut rx) = roster.subscribe();
        match rx.try_recv() {
            Ok(AdminEvent::RosterUpdate { count, users }) => {
                assert_eq!(count, 1);
                assert_eq!(users[0].nom, "Alice");
            }
            other => panic!("expected initial roster update, got {:?}", other),
        }

        let b = roster.allocate_conn_id();
        roster.identify(b, student("Bob", "456", Some(Track::B2)));
        roster.disconnect(a);

        match rx.try_recv() {
            Ok(AdminEvent::RosterUpdate { count, .. }) => assert_eq!(count, 2),
            other => panic!("expected roster update, got {:?}", other),
        }
        match rx.try_recv() {
            Ok(AdminEvent::RosterUpdate { count, users }) => {
                assert_eq!(count, 1);
                assert_eq!(users[0].nom, "Bob");
            }
            other => panic!("expected roster update, got {:?}", other),
        }
        assert!(rx.try_recv().is_err(), "exactly one event per mutation");
    }

    #[test]
    fn closed_observer_is_pruned_without_affecting_others() {
        let roster = Roster::new();
        let (_gone_id, gone_rx) = roster.subscribe();
        let (_live_id, mut live_rx) = roster.subscribe();
        drop(gone_rx);

        let a = roster.allocate_conn_id();
        roster.identify(a, student("Alice", "123", Some(Track::B1)));

        // Initial snapshot + the identify broadcast.
        assert!(matches!(
            live_rx.try_recv(),
            Ok(AdminEvent::RosterUpdate { count: 0, .. })
        ));
        assert!(matches!(
            live_rx.try_recv(),
            Ok(AdminEvent::RosterUpdate { count: 1, .. })
        ));
    }

    #[test]
    fn full_observer_queue_drops_new_events() {
        let roster = Roster::new();
        let (_id, mut rx) = roster.subscribe();

        let conns: Vec<ConnId> = (0..OBSERVER_QUEUE_DEPTH + 8)
            .map(|_| roster.allocate_conn_id())
            .collect();
        for (i, conn) in conns.iter().enumerate() {
            roster.identify(*conn, student(&format!("S{i}"), &i.to_string(), None));
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, OBSERVER_QUEUE_DEPTH);
        // The registry itself is unaffected by the drops.
        assert_eq!(roster.snapshot().count, conns.len());
    }

    #[test]
    fn publish_result_reaches_observers_and_skips_registry() {
        let roster = Roster::new();
        let (_id, mut rx) = roster.subscribe();
        let _ = rx.try_recv(); // initial snapshot

        roster.publish_result(serde_json::json!({"nom": "A", "score_global": 90}));
        match rx.try_recv() {
            Ok(AdminEvent::NewResult { data }) => {
                assert_eq!(data["nom"], "A");
                assert_eq!(data["score_global"], 90);
            }
            other => panic!("expected new_result, got {:?}", other),
        }
        assert_eq!(roster.snapshot().count, 0);
    }

    #[test]
    fn roster_update_serializes_with_type_tag() {
        let event = AdminEvent::RosterUpdate {
            count: 1,
            users: vec![student("Alice", "123", Some(Track::B1))],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "roster_update");
        assert_eq!(json["count"], 1);
        assert_eq!(json["users"][0]["nom"], "Alice");
        assert_eq!(json["users"][0]["option"], "B1");
    }
}
