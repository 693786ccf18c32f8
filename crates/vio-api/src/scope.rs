//! # Scope Resolution
//!
//! Maps an authenticated [`Principal`] to the [`Scope`] that bounds every
//! read and write of the request. Resolution runs once per request and its
//! result is never cached.

use vio_core::{Principal, Role, Scope, ScopeError};

use crate::service::ServiceError;
use crate::store::Directory;

/// Resolve the visibility scope of `principal`.
///
/// Oversight bodies see the active contractor organizations directly under
/// them; an empty set is a valid result and admits nothing. Landfill users
/// have no scope and are denied.
pub async fn resolve_scope<D>(directory: &D, principal: &Principal) -> Result<Scope, ServiceError>
where
    D: Directory + ?Sized,
{
    let scope = match principal.role {
        Role::CityAuthority => Scope::City,
        Role::OversightBody => Scope::Oversight {
            org_id: principal.org_id,
            contractor_ids: directory.child_contractors(principal.org_id).await?,
        },
        Role::ContractorAdmin => Scope::Contractor {
            org_id: principal.org_id,
        },
        Role::Driver => Scope::Driver {
            driver_id: principal.driver_id,
        },
        Role::LandfillAdmin => Scope::Technical,
        Role::LandfillUser => {
            return Err(ScopeError::Unsupported {
                role: principal.role.to_string(),
            }
            .into())
        }
    };

    tracing::debug!(
        user_id = %principal.user_id,
        role = %principal.role,
        scope = scope.kind(),
        "resolved scope"
    );
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, OrgFact};
    use uuid::Uuid;

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            role,
            driver_id: None,
        }
    }

    fn contractor(parent: Uuid, is_active: bool) -> OrgFact {
        OrgFact {
            id: Uuid::new_v4(),
            name: "Contractor".into(),
            parent_org_id: Some(parent),
            is_contractor: true,
            is_active,
        }
    }

    #[tokio::test]
    async fn city_role_is_unrestricted() {
        let store = MemoryStore::new();
        let scope = resolve_scope(&store, &principal(Role::CityAuthority))
            .await
            .unwrap();
        assert_eq!(scope, Scope::City);
    }

    #[tokio::test]
    async fn oversight_collects_active_children_only() {
        let store = MemoryStore::new();
        let body = principal(Role::OversightBody);
        let active = contractor(body.org_id, true);
        let inactive = contractor(body.org_id, false);
        let unrelated = contractor(Uuid::new_v4(), true);
        store.insert_organization(active.clone());
        store.insert_organization(inactive);
        store.insert_organization(unrelated);

        let scope = resolve_scope(&store, &body).await.unwrap();
        assert_eq!(
            scope,
            Scope::Oversight {
                org_id: body.org_id,
                contractor_ids: vec![active.id],
            }
        );
    }

    #[tokio::test]
    async fn oversight_without_children_is_empty_not_error() {
        let store = MemoryStore::new();
        let scope = resolve_scope(&store, &principal(Role::OversightBody))
            .await
            .unwrap();
        assert!(scope.is_empty());
    }

    #[tokio::test]
    async fn driver_without_driver_id_gets_empty_scope() {
        let store = MemoryStore::new();
        let scope = resolve_scope(&store, &principal(Role::Driver)).await.unwrap();
        assert_eq!(scope, Scope::Driver { driver_id: None });
        assert!(scope.is_empty());
    }

    #[tokio::test]
    async fn landfill_admin_gets_technical_scope() {
        let store = MemoryStore::new();
        let scope = resolve_scope(&store, &principal(Role::LandfillAdmin))
            .await
            .unwrap();
        assert_eq!(scope, Scope::Technical);
    }

    #[tokio::test]
    async fn landfill_user_is_denied() {
        let store = MemoryStore::new();
        let err = resolve_scope(&store, &principal(Role::LandfillUser))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }
}
