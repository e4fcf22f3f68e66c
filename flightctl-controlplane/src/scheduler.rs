//! Background reconcile loop: the process that actually calls
//! `flightctl-rollout`/`flightctl-pki`'s controllers repeatedly, never
//! concurrently for the same fleet (`RolloutController::reconcile_fleet`'s
//! own doc comment names this as the caller's responsibility).
//!
//! `Store` has no "list every org" method, so org discovery works the same
//! way `flightctl-rollout`'s `EventBus` docs describe reconcile discovery
//! in general: subscribe for incremental updates, fall back to a periodic
//! full sweep over everything seen so far. A lagged subscriber or a missed
//! event only ever delays a reconcile until the next sweep tick, never
//! causes one to be skipped forever.

use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use flightctl_events::{drain_or_lag, EventBus, ResourceKind};
use flightctl_pki::{EnrollmentController, ManagementCertRenewal};
use flightctl_rollout::{FleetRuntimeState, RolloutController, RolloutError};
use flightctl_store::{Store, StoreError};
use flightctl_types::csr::SignerName;
use flightctl_types::ResourceRef;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{info, warn};

const MAX_RETRY_ATTEMPTS: u32 = 10;
const BASE_RETRY_DELAY_MS: u64 = 20;
const MAX_RETRY_DELAY_MS: u64 = 500;

pub struct Scheduler {
    store: Arc<dyn Store>,
    events: Arc<EventBus>,
    rollout: RolloutController,
    enrollment: EnrollmentController,
    renewal: ManagementCertRenewal,
    known_orgs: DashSet<String>,
    known_enrollment_requests: DashSet<ResourceRef>,
    fleet_runtime: DashMap<ResourceRef, Arc<Mutex<FleetRuntimeState>>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<EventBus>,
        ca: Arc<flightctl_pki::CertificateAuthority>,
    ) -> Self {
        Self {
            rollout: RolloutController::new(store.clone(), events.clone()),
            enrollment: EnrollmentController::new(store.clone(), events.clone(), ca.clone()),
            renewal: ManagementCertRenewal::new(store.clone(), events.clone(), ca),
            store,
            events,
            known_orgs: DashSet::new(),
            known_enrollment_requests: DashSet::new(),
            fleet_runtime: DashMap::new(),
        }
    }

    /// Runs until `shutdown` resolves. Two independent timers drive the
    /// loop: a fast one drains the event bus to learn about new orgs and
    /// enrollment requests as they appear, a slow one re-sweeps every org
    /// this process has ever seen so reconciles keep happening even if an
    /// event was missed.
    pub async fn run(self: Arc<Self>, reconcile_interval: Duration, sweep_interval: Duration, shutdown: impl std::future::Future<Output = ()>) {
        let mut events_rx = self.events.subscribe();
        let mut reconcile_tick = interval(reconcile_interval);
        let mut sweep_tick = interval(sweep_interval);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("scheduler shutting down");
                    return;
                }
                _ = reconcile_tick.tick() => {
                    let drained = drain_or_lag(&mut events_rx).await;
                    self.absorb(&drained);
                    self.reconcile_known_orgs().await;
                }
                _ = sweep_tick.tick() => {
                    self.reconcile_known_orgs().await;
                }
            }
        }
    }

    fn absorb(&self, changes: &[flightctl_events::ResourceChanged]) {
        for change in changes {
            self.known_orgs.insert(change.org_id.clone());
            if change.kind == ResourceKind::EnrollmentRequest {
                let reference = ResourceRef::new(change.org_id.clone(), change.name.clone());
                match change.op {
                    flightctl_events::ChangeOp::Deleted => {
                        self.known_enrollment_requests.remove(&reference);
                    }
                    _ => {
                        self.known_enrollment_requests.insert(reference);
                    }
                }
            }
        }
    }

    async fn reconcile_known_orgs(&self) {
        let orgs: Vec<String> = self.known_orgs.iter().map(|o| (*o).clone()).collect();
        for org_id in orgs {
            self.reconcile_fleets(&org_id).await;
            self.reconcile_csrs(&org_id).await;
        }

        let enrollment_refs: Vec<ResourceRef> = self.known_enrollment_requests.iter().map(|r| (*r).clone()).collect();
        for reference in enrollment_refs {
            if let Err(err) = self.reconcile_enrollment_request_with_retry(&reference).await {
                warn!(org_id = %reference.org_id, name = %reference.name, error = %err, "enrollment request reconcile gave up");
            }
        }
    }

    async fn reconcile_fleets(&self, org_id: &str) {
        for fleet in self.store.list_fleets(org_id).await {
            let reference = fleet.metadata.reference();
            let runtime = {
                let guard = self
                    .fleet_runtime
                    .entry(reference.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(FleetRuntimeState::default())));
                Arc::clone(&guard)
            };

            // Holding this lock across the whole retry loop is what gives
            // "never concurrently for the same fleet" its teeth: a second
            // sweep tick landing mid-retry just waits its turn instead of
            // racing the first.
            let mut guard = runtime.lock().await;
            if let Err(err) = self.reconcile_fleet_with_retry(&reference, &mut guard).await {
                warn!(org_id, fleet = %reference.name, error = %err, "fleet reconcile gave up");
            }
        }
    }

    async fn reconcile_fleet_with_retry(&self, reference: &ResourceRef, runtime: &mut FleetRuntimeState) -> Result<(), RolloutError> {
        let mut attempt = 0u32;
        loop {
            let now = chrono::Utc::now();
            match self.rollout.reconcile_fleet(reference, runtime, now).await {
                Ok(()) => return Ok(()),
                Err(err) if is_retryable_rollout_error(&err) && attempt < MAX_RETRY_ATTEMPTS => {
                    attempt += 1;
                    backoff_with_jitter(attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn reconcile_csrs(&self, org_id: &str) {
        for csr in self.store.list_csrs(org_id).await {
            let reference = csr.metadata.reference();
            let result = match csr.spec.signer_name {
                SignerName::DeviceEnrollment => self.reconcile_csr_with_retry(&reference).await,
                SignerName::DeviceManagementRenewal => self.reconcile_renewal_csr_with_retry(&reference).await,
            };
            if let Err(err) = result {
                warn!(org_id, csr = %reference.name, error = %err, "csr reconcile gave up");
            }
        }
    }

    async fn reconcile_csr_with_retry(&self, reference: &ResourceRef) -> Result<(), flightctl_pki::PkiError> {
        let mut attempt = 0u32;
        loop {
            match self.enrollment.reconcile_csr(reference).await {
                Ok(()) => return Ok(()),
                Err(err) if is_retryable_pki_error(&err) && attempt < MAX_RETRY_ATTEMPTS => {
                    attempt += 1;
                    backoff_with_jitter(attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn reconcile_renewal_csr_with_retry(&self, reference: &ResourceRef) -> Result<(), flightctl_pki::PkiError> {
        let mut attempt = 0u32;
        loop {
            match self.renewal.reconcile_renewal_csr(reference).await {
                Ok(()) => return Ok(()),
                Err(err) if is_retryable_pki_error(&err) && attempt < MAX_RETRY_ATTEMPTS => {
                    attempt += 1;
                    backoff_with_jitter(attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn reconcile_enrollment_request_with_retry(&self, reference: &ResourceRef) -> Result<(), flightctl_pki::PkiError> {
        let mut attempt = 0u32;
        loop {
            match self.enrollment.reconcile_enrollment_request(reference).await {
                Ok(()) => return Ok(()),
                Err(err) if is_retryable_pki_error(&err) && attempt < MAX_RETRY_ATTEMPTS => {
                    attempt += 1;
                    backoff_with_jitter(attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_retryable_rollout_error(err: &RolloutError) -> bool {
    matches!(err, RolloutError::Conflict(_)) || matches!(err, RolloutError::Store(StoreError::Conflict { .. }))
}

fn is_retryable_pki_error(err: &flightctl_pki::PkiError) -> bool {
    matches!(err, flightctl_pki::PkiError::Store(StoreError::Conflict { .. }))
}

/// Exponential backoff with full jitter, capped low since every retryable
/// error here is a single-writer optimistic-concurrency collision that
/// another reconcile pass just lost, not an overloaded downstream.
async fn backoff_with_jitter(attempt: u32) {
    let max_delay = (BASE_RETRY_DELAY_MS.saturating_mul(1u64 << attempt.min(8))).min(MAX_RETRY_DELAY_MS);
    let delay = rand::thread_rng().gen_range(0..=max_delay);
    tokio::time::sleep(Duration::from_millis(delay)).await;
}
