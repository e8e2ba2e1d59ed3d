use std::collections::{hash_map::Entry, HashMap};

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Write endpoint of one session's connection. Lines pushed here are
/// drained onto the socket by that session's writer task, so sending
/// never blocks on network I/O.
pub type Sink = mpsc::UnboundedSender<String>;

/// Shared map from username to outbound sink. Every operation takes the
/// lock briefly and releases it before any delivery happens.
pub struct UserRegistry {
    users: Mutex<HashMap<String, Sink>>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Atomic check-and-insert. True iff `name` was free and is now
    /// owned by `sink`.
    pub async fn try_register(&self, name: &str, sink: Sink) -> bool {
        let mut users = self.users.lock().await;
        match users.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(sink);
                true
            }
        }
    }

    /// Atomic removal. True iff an entry existed and was removed.
    pub async fn unregister(&self, name: &str) -> bool {
        self.users.lock().await.remove(name).is_some()
    }

    pub async fn lookup(&self, name: &str) -> Option<Sink> {
        self.users.lock().await.get(name).cloned()
    }

    /// Names present at the moment of the call, in ascending order.
    pub async fn snapshot_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Delivers `message` to every sink registered when the call takes
    /// its snapshot. A recipient whose session is tearing down is
    /// skipped without affecting the rest.
    pub async fn broadcast(&self, message: &str) {
        let sinks: Vec<Sink> = self.users.lock().await.values().cloned().collect();
        for sink in sinks {
            if sink.send(message.to_string()).is_err() {
                debug!("skipped delivery to a disconnecting session");
            }
        }
    }
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
