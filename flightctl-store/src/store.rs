use async_trait::async_trait;
use flightctl_types::{
    AuthProvider, CertificateSigningRequest, Device, EnrollmentRequest, Event, Fleet,
    LabelSelector, ResourceRef, ResourceVersion,
};

use crate::error::StoreResult;
use crate::events::EventLog;
use crate::table::Table;

/// The abstraction the rollout engine consumes (§2 item 1, §5
/// "shared-resource policy"). A real deployment backs this with Postgres;
/// this crate ships only the in-memory reference implementation used by
/// the engine's own tests and by `flightctl-service` when no external
/// database is wired up — the SQL schema and driver are explicitly out of
/// scope (§1).
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_fleet(&self, fleet: Fleet) -> StoreResult<Fleet>;
    async fn get_fleet(&self, reference: &ResourceRef) -> StoreResult<Fleet>;
    async fn list_fleets(&self, org_id: &str) -> Vec<Fleet>;
    async fn update_fleet(
        &self,
        reference: &ResourceRef,
        expected_version: ResourceVersion,
        mutate: Box<dyn FnOnce(&mut Fleet) + Send>,
    ) -> StoreResult<Fleet>;
    async fn delete_fleet(&self, reference: &ResourceRef) -> StoreResult<()>;

    async fn create_device(&self, device: Device) -> StoreResult<Device>;
    async fn get_device(&self, reference: &ResourceRef) -> StoreResult<Device>;
    async fn list_devices(&self, org_id: &str, selector: &LabelSelector) -> Vec<Device>;
    async fn update_device(
        &self,
        reference: &ResourceRef,
        expected_version: ResourceVersion,
        mutate: Box<dyn FnOnce(&mut Device) + Send>,
    ) -> StoreResult<Device>;

    async fn create_csr(&self, csr: CertificateSigningRequest) -> StoreResult<CertificateSigningRequest>;
    async fn get_csr(&self, reference: &ResourceRef) -> StoreResult<CertificateSigningRequest>;
    async fn list_csrs(&self, org_id: &str) -> Vec<CertificateSigningRequest>;
    async fn replace_csr(
        &self,
        reference: &ResourceRef,
        expected_version: ResourceVersion,
        incoming: CertificateSigningRequest,
    ) -> StoreResult<CertificateSigningRequest>;

    async fn create_enrollment_request(&self, er: EnrollmentRequest) -> StoreResult<EnrollmentRequest>;
    async fn get_enrollment_request(&self, reference: &ResourceRef) -> StoreResult<EnrollmentRequest>;
    async fn update_enrollment_request(
        &self,
        reference: &ResourceRef,
        expected_version: ResourceVersion,
        mutate: Box<dyn FnOnce(&mut EnrollmentRequest) + Send>,
    ) -> StoreResult<EnrollmentRequest>;

    async fn create_auth_provider(&self, provider: AuthProvider) -> StoreResult<AuthProvider>;
    async fn get_auth_provider(&self, reference: &ResourceRef) -> StoreResult<AuthProvider>;
    async fn list_auth_providers(&self, org_id: &str) -> Vec<AuthProvider>;

    async fn emit_event(&self, event: Event);
    async fn list_events_for(&self, kind: &str, name: &str) -> Vec<Event>;
}

/// Reference in-memory `Store`. Each resource kind is its own [`Table`], so
/// a write to one kind never blocks a read of another.
#[derive(Default)]
pub struct MemoryStore {
    fleets: Table<Fleet>,
    devices: Table<Device>,
    csrs: Table<CertificateSigningRequest>,
    enrollment_requests: Table<EnrollmentRequest>,
    auth_providers: Table<AuthProvider>,
    events: EventLog,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            fleets: Table::new("Fleet"),
            devices: Table::new("Device"),
            csrs: Table::new("CertificateSigningRequest"),
            enrollment_requests: Table::new("EnrollmentRequest"),
            auth_providers: Table::new("AuthProvider"),
            events: EventLog::new(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_fleet(&self, fleet: Fleet) -> StoreResult<Fleet> {
        self.fleets.create(fleet).await
    }

    async fn get_fleet(&self, reference: &ResourceRef) -> StoreResult<Fleet> {
        self.fleets.get(reference).await
    }

    async fn list_fleets(&self, org_id: &str) -> Vec<Fleet> {
        self.fleets.list_all(org_id).await
    }

    async fn update_fleet(
        &self,
        reference: &ResourceRef,
        expected_version: ResourceVersion,
        mutate: Box<dyn FnOnce(&mut Fleet) + Send>,
    ) -> StoreResult<Fleet> {
        self.fleets.update(reference, expected_version, mutate).await
    }

    async fn delete_fleet(&self, reference: &ResourceRef) -> StoreResult<()> {
        self.fleets.delete(reference).await
    }

    async fn create_device(&self, device: Device) -> StoreResult<Device> {
        self.devices.create(device).await
    }

    async fn get_device(&self, reference: &ResourceRef) -> StoreResult<Device> {
        self.devices.get(reference).await
    }

    async fn list_devices(&self, org_id: &str, selector: &LabelSelector) -> Vec<Device> {
        self.devices.list(org_id, selector).await
    }

    async fn update_device(
        &self,
        reference: &ResourceRef,
        expected_version: ResourceVersion,
        mutate: Box<dyn FnOnce(&mut Device) + Send>,
    ) -> StoreResult<Device> {
        self.devices.update(reference, expected_version, mutate).await
    }

    async fn create_csr(&self, csr: CertificateSigningRequest) -> StoreResult<CertificateSigningRequest> {
        self.csrs.create(csr).await
    }

    async fn get_csr(&self, reference: &ResourceRef) -> StoreResult<CertificateSigningRequest> {
        self.csrs.get(reference).await
    }

    async fn list_csrs(&self, org_id: &str) -> Vec<CertificateSigningRequest> {
        self.csrs.list_all(org_id).await
    }

    async fn replace_csr(
        &self,
        reference: &ResourceRef,
        expected_version: ResourceVersion,
        incoming: CertificateSigningRequest,
    ) -> StoreResult<CertificateSigningRequest> {
        self.csrs
            .update(reference, expected_version, move |existing| {
                let mut replacement = incoming;
                existing.preserve_conditions_across_replace(&mut replacement);
                *existing = replacement;
            })
            .await
    }

    async fn create_enrollment_request(&self, er: EnrollmentRequest) -> StoreResult<EnrollmentRequest> {
        self.enrollment_requests.create(er).await
    }

    async fn get_enrollment_request(&self, reference: &ResourceRef) -> StoreResult<EnrollmentRequest> {
        self.enrollment_requests.get(reference).await
    }

    async fn update_enrollment_request(
        &self,
        reference: &ResourceRef,
        expected_version: ResourceVersion,
        mutate: Box<dyn FnOnce(&mut EnrollmentRequest) + Send>,
    ) -> StoreResult<EnrollmentRequest> {
        self.enrollment_requests.update(reference, expected_version, mutate).await
    }

    async fn create_auth_provider(&self, provider: AuthProvider) -> StoreResult<AuthProvider> {
        self.auth_providers.create(provider).await
    }

    async fn get_auth_provider(&self, reference: &ResourceRef) -> StoreResult<AuthProvider> {
        self.auth_providers.get(reference).await
    }

    async fn list_auth_providers(&self, org_id: &str) -> Vec<AuthProvider> {
        self.auth_providers.list_all(org_id).await
    }

    async fn emit_event(&self, event: Event) {
        self.events.append(event).await;
    }

    async fn list_events_for(&self, kind: &str, name: &str) -> Vec<Event> {
        self.events.list_for(kind, name).await
    }
}
