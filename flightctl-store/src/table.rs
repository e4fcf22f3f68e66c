use std::collections::BTreeMap;

use flightctl_types::metadata::WithMeta;
use flightctl_types::{LabelSelector, ResourceRef, ResourceVersion};
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};

/// A single in-memory resource table, generic over any type carrying an
/// `ObjectMeta`. This is the reference Store backend named in §2 item 1 —
/// it offers the same CRUD-plus-label-selector-listing-plus-optimistic-
/// concurrency contract a SQL-backed Store would, without prescribing a
/// schema (persistence driver choice stays out of scope, per §1).
pub struct Table<T> {
    kind: &'static str,
    rows: RwLock<BTreeMap<ResourceRef, T>>,
}

impl<T: Clone + WithMeta> Table<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn create(&self, mut item: T) -> StoreResult<T> {
        let key = item.meta().reference();
        let mut rows = self.rows.write().await;
        if rows.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: self.kind,
                org_id: key.org_id,
                name: key.name,
            });
        }
        item.meta_mut().resource_version = Some(ResourceVersion::INITIAL);
        rows.insert(key, item.clone());
        Ok(item)
    }

    pub async fn get(&self, reference: &ResourceRef) -> StoreResult<T> {
        let rows = self.rows.read().await;
        rows.get(reference).cloned().ok_or_else(|| StoreError::NotFound {
            kind: self.kind,
            org_id: reference.org_id.clone(),
            name: reference.name.clone(),
        })
    }

    /// List everything in `org_id` whose labels match `selector`, ordered
    /// by name ascending — the stable total order the Selector relies on
    /// (§4.2).
    pub async fn list(&self, org_id: &str, selector: &LabelSelector) -> Vec<T> {
        let rows = self.rows.read().await;
        let mut out: Vec<T> = rows
            .iter()
            .filter(|(k, _)| k.org_id == org_id)
            .filter(|(_, v)| selector.matches(&v.meta().labels))
            .map(|(_, v)| v.clone())
            .collect();
        out.sort_by(|a, b| a.meta().name.cmp(&b.meta().name));
        out
    }

    pub async fn list_all(&self, org_id: &str) -> Vec<T> {
        self.list(org_id, &LabelSelector::default()).await
    }

    /// Optimistic-concurrency update: `expected_version` must match the
    /// stored version, else `StoreError::Conflict`. The stamped version in
    /// the returned item is `expected_version.next()` — callers retry with
    /// jitter on conflict per §5.
    pub async fn update(
        &self,
        reference: &ResourceRef,
        expected_version: ResourceVersion,
        mutate: impl FnOnce(&mut T),
    ) -> StoreResult<T> {
        let mut rows = self.rows.write().await;
        let existing = rows.get_mut(reference).ok_or_else(|| StoreError::NotFound {
            kind: self.kind,
            org_id: reference.org_id.clone(),
            name: reference.name.clone(),
        })?;
        let actual = existing.meta().resource_version.unwrap_or(ResourceVersion::INITIAL);
        if actual != expected_version {
            return Err(StoreError::Conflict {
                kind: self.kind,
                org_id: reference.org_id.clone(),
                name: reference.name.clone(),
                expected: expected_version,
                actual,
            });
        }
        mutate(existing);
        existing.meta_mut().resource_version = Some(actual.next());
        Ok(existing.clone())
    }

    pub async fn delete(&self, reference: &ResourceRef) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        rows.remove(reference).map(|_| ()).ok_or_else(|| StoreError::NotFound {
            kind: self.kind,
            org_id: reference.org_id.clone(),
            name: reference.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightctl_types::device::{ConsoleConfig, DeviceSpec, DeviceStatus, OciReference};
    use flightctl_types::{Device, ObjectMeta};

    fn device(org: &str, name: &str) -> Device {
        Device {
            metadata: ObjectMeta::new(org, name),
            spec: DeviceSpec {
                os_image: OciReference("quay.io/flightctl/os@sha256:abc".into()),
                config_providers: vec![],
                applications: vec![],
                resource_monitors: vec![],
                systemd_matches: vec![],
                console: ConsoleConfig::default(),
            },
            status: DeviceStatus::default(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let table: Table<Device> = Table::new("Device");
        let created = table.create(device("org1", "dev-1")).await.unwrap();
        assert_eq!(created.metadata.resource_version, Some(ResourceVersion::INITIAL));
        let fetched = table.get(&ResourceRef::new("org1", "dev-1")).await.unwrap();
        assert_eq!(fetched.metadata.name, "dev-1");
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let table: Table<Device> = Table::new("Device");
        table.create(device("org1", "dev-1")).await.unwrap();
        let reference = ResourceRef::new("org1", "dev-1");

        table
            .update(&reference, ResourceVersion::INITIAL, |d| {
                d.metadata.labels.insert("site".into(), "madrid".into());
            })
            .await
            .unwrap();

        let err = table
            .update(&reference, ResourceVersion::INITIAL, |d| {
                d.metadata.labels.insert("site".into(), "paris".into());
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn list_is_sorted_by_name() {
        let table: Table<Device> = Table::new("Device");
        table.create(device("org1", "zeta")).await.unwrap();
        table.create(device("org1", "alpha")).await.unwrap();
        let all = table.list_all("org1").await;
        assert_eq!(all[0].metadata.name, "alpha");
        assert_eq!(all[1].metadata.name, "zeta");
    }
}
