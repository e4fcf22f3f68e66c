use flightctl_types::Event;
use tokio::sync::RwLock;

/// Append-only event log. Events for the same `(kind, name)` are delivered
/// in emission order (§5) — a plain `Vec` appended under a single lock
/// guarantees that trivially; a sharded/partitioned log would need to take
/// care to preserve it per key.
#[derive(Default)]
pub struct EventLog {
    events: RwLock<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, event: Event) {
        self.events.write().await.push(event);
    }

    pub async fn list_for(&self, kind: &str, name: &str) -> Vec<Event> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.involved_object.kind == kind && e.involved_object.name == name)
            .cloned()
            .collect()
    }

    pub async fn list_all(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }
}
