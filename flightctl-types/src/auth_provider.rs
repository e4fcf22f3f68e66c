use serde::{Deserialize, Serialize};

use crate::device::AuthProviderSpec;
use crate::metadata::ObjectMeta;

/// First-class resource wrapping [`AuthProviderSpec`] so it has a `(orgId,
/// name)` identity of its own and a read path the hiding obligation in
/// §4.7 actually applies to (REST surface per §6 lists `AuthProvider`
/// alongside `Repository`/`ResourceSync`, neither of which carries its own
/// behavior beyond CRUD).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthProvider {
    pub metadata: ObjectMeta,
    pub spec: AuthProviderSpec,
}

impl crate::metadata::WithMeta for AuthProvider {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl AuthProvider {
    /// Read-path transform for §4.7: never return the real secret value.
    pub fn hide_sensitive_data(&mut self) {
        self.spec.hide_sensitive_data();
    }
}
