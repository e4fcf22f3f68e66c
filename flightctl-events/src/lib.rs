//! In-process Event Bus (§2 item 2): publishes resource state-transition
//! notifications that drive controller reconciles. This is the smallest
//! component in the budget (~5%) on purpose — it carries no business
//! logic, only fan-out.
//!
//! Distinct from [`flightctl_types::Event`], which is the durable,
//! operator-facing audit record the Store appends (§3 "Event"). This bus
//! only ever carries lightweight "something about `(kind, orgId, name)`
//! changed" notifications that tell a reconcile loop *when* to look, never
//! *what* changed — the reconciler always re-reads authoritative state
//! from the Store (§5 "no in-memory caches may outlive a reconcile
//! without an invalidation hook from the Event Bus").

use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Fleet,
    Device,
    CertificateSigningRequest,
    EnrollmentRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChanged {
    pub kind: ResourceKind,
    pub org_id: String,
    pub name: String,
    pub op: ChangeOp,
}

impl ResourceChanged {
    pub fn new(kind: ResourceKind, org_id: impl Into<String>, name: impl Into<String>, op: ChangeOp) -> Self {
        Self {
            kind,
            org_id: org_id.into(),
            name: name.into(),
            op,
        }
    }
}

/// A broadcast bus: every subscriber sees every event in emission order
/// for a given sender (§5 "Events for the same `(kind,name)` are delivered
/// in emission order"), as long as it keeps up — a slow subscriber that
/// falls behind the bounded buffer gets `RecvError::Lagged` instead of the
/// events it missed, and the correct response is a full reconcile sweep,
/// not a crash. [`EventBus::subscribe`] callers should treat a lag as
/// "go look at everything I own again," which every reconcile loop in
/// this codebase already does on its own poll interval regardless.
pub struct EventBus {
    sender: broadcast::Sender<ResourceChanged>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: ResourceChanged) {
        // No subscribers yet (e.g. during startup wiring) is not an error;
        // `send` only fails when the channel has zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResourceChanged> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Drain everything currently queued for `receiver`, logging (not
/// propagating) a lag so a reconcile loop can fold "I lagged" into "do a
/// full sweep" without special-casing the error at every call site.
pub async fn drain_or_lag(receiver: &mut broadcast::Receiver<ResourceChanged>) -> Vec<ResourceChanged> {
    let mut drained = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => drained.push(event),
            Err(broadcast::error::TryRecvError::Empty) => break,
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "event bus subscriber lagged, falling back to full reconcile sweep");
            }
            Err(broadcast::error::TryRecvError::Closed) => break,
        }
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(ResourceChanged::new(ResourceKind::Fleet, "org1", "fleet-a", ChangeOp::Updated));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.name, "fleet-a");
        assert_eq!(received.op, ChangeOp::Updated);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_see_every_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(ResourceChanged::new(ResourceKind::Device, "org1", "dev-1", ChangeOp::Created));
        assert_eq!(rx1.recv().await.unwrap().name, "dev-1");
        assert_eq!(rx2.recv().await.unwrap().name, "dev-1");
    }

    #[tokio::test]
    async fn events_for_the_same_name_arrive_in_emission_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(ResourceChanged::new(ResourceKind::Device, "org1", "dev-1", ChangeOp::Created));
        bus.publish(ResourceChanged::new(ResourceKind::Device, "org1", "dev-1", ChangeOp::Updated));
        assert_eq!(rx.recv().await.unwrap().op, ChangeOp::Created);
        assert_eq!(rx.recv().await.unwrap().op, ChangeOp::Updated);
    }

    #[tokio::test]
    async fn drain_or_lag_collects_everything_queued() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(ResourceChanged::new(ResourceKind::Fleet, "org1", "a", ChangeOp::Created));
        bus.publish(ResourceChanged::new(ResourceKind::Fleet, "org1", "b", ChangeOp::Created));
        let drained = drain_or_lag(&mut rx).await;
        assert_eq!(drained.len(), 2);
    }
}
