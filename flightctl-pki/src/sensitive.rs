//! Sensitive-data hiding (§4.7): every read path returning an
//! `AuthProvider` (or, in the future, a `Repository` spec carrying the
//! same discriminated secret shapes) must replace secret fields with
//! `*****` before the value leaves the process. The per-field logic lives
//! on the types themselves (`AuthProviderSpec::hide_sensitive_data`,
//! `OciAuth::hide_sensitive_data`) so it can't drift between call sites;
//! this module is the single place `flightctl-service`'s read handlers
//! call into, so the obligation is enforced at one seam rather than
//! scattered across every handler.

use flightctl_types::AuthProvider;

/// Apply the hide-on-read transform to a single `AuthProvider` before it
/// is serialized back to a caller. The discriminator is preserved by
/// construction (§4.7, §8) — see `AuthProviderSpec::hide_sensitive_data`.
pub fn hide_auth_provider(provider: &mut AuthProvider) {
    provider.hide_sensitive_data();
}

/// Apply the same transform across a batch, e.g. a LIST response.
pub fn hide_auth_providers(providers: &mut [AuthProvider]) {
    for provider in providers {
        hide_auth_provider(provider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightctl_types::device::AuthProviderSpec;
    use flightctl_types::metadata::ObjectMeta;

    #[test]
    fn hides_secret_but_preserves_discriminator() {
        let mut provider = AuthProvider {
            metadata: ObjectMeta::new("org1", "provider-1"),
            spec: AuthProviderSpec::Basic {
                username: "svc".into(),
                password: Some("hunter2".into()),
            },
        };
        let before = provider.spec.discriminator();
        hide_auth_provider(&mut provider);
        assert_eq!(provider.spec.discriminator(), before);
        match &provider.spec {
            AuthProviderSpec::Basic { password, .. } => {
                assert_eq!(password.as_deref(), Some("*****"));
            }
            _ => panic!("discriminator changed"),
        }
    }
}
