//! Access resolver
//!
//! Decides which thread(s) an actor may read or write for a project. Pure
//! predicate over the routing/bid gate: no side effects, and every denial is
//! typed so callers surface the exact reason instead of guessing a scope.

use thiserror::Error;
use uuid::Uuid;

use crate::auth::{AuthContext, Role};
use crate::domain::{ThreadKey, ThreadScope};
use crate::store::{RoutingGate, StoreError};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("ambiguous scope: {0}")]
    AmbiguousScope(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// Resolve the thread scope an actor may use on a project.
///
/// Rules, first match wins:
/// 1. Admin: allowed; reads span the whole project, writes must name a
///    vendor thread.
/// 2. Business owner: allowed, but the vendor scope must be explicit
///    whenever more than one vendor thread exists.
/// 3. Vendor: allowed only with a routing entry or a bid; the scope is
///    forced to the vendor's own thread regardless of what was requested.
/// 4. Anyone else: denied.
pub async fn resolve_scope(
    gate: &dyn RoutingGate,
    actor: &AuthContext,
    project_id: Uuid,
    requested_vendor: Option<Uuid>,
    operation: Operation,
) -> Result<ThreadScope, AccessError> {
    let project = gate
        .project(project_id)
        .await?
        .ok_or_else(|| AccessError::NotFound("project not found".to_string()))?;

    match actor.role {
        Role::Admin => match (operation, requested_vendor) {
            (_, Some(vendor_id)) => Ok(ThreadScope::Vendor(vendor_id)),
            (Operation::Read, None) => Ok(ThreadScope::Project),
            (Operation::Write, None) => Err(AccessError::AmbiguousScope(
                "a write must name a vendor thread".to_string(),
            )),
        },
        Role::Business => {
            if project.owner_id != actor.user_id {
                return Err(AccessError::NotAuthorized(
                    "only the project owner may access its threads".to_string(),
                ));
            }
            let eligible = gate.eligible_vendors(project_id).await?;
            match requested_vendor {
                Some(vendor_id) => {
                    if eligible.contains(&vendor_id) {
                        Ok(ThreadScope::Vendor(vendor_id))
                    } else {
                        Err(AccessError::NotFound(
                            "no thread exists for that vendor".to_string(),
                        ))
                    }
                }
                None => match eligible.as_slice() {
                    [] => Err(AccessError::NotFound(
                        "project has no vendor threads yet".to_string(),
                    )),
                    [only] => Ok(ThreadScope::Vendor(*only)),
                    _ => Err(AccessError::AmbiguousScope(
                        "multiple vendor threads exist; vendor_id is required".to_string(),
                    )),
                },
            }
        }
        Role::Vendor => {
            let routed = gate.is_routed(project_id, actor.user_id).await?;
            let has_bid = gate
                .bid_status(project_id, actor.user_id)
                .await?
                .grants_access();
            if routed || has_bid {
                // Forced to the vendor's own thread; a requested scope is
                // ignored, not an error.
                Ok(ThreadScope::Vendor(actor.user_id))
            } else {
                Err(AccessError::NotAuthorized(
                    "vendor has no standing on this project".to_string(),
                ))
            }
        }
    }
}

/// Every thread key the actor may see on the project.
pub async fn visible_threads(
    gate: &dyn RoutingGate,
    actor: &AuthContext,
    project_id: Uuid,
) -> Result<Vec<ThreadKey>, AccessError> {
    let scope = resolve_all_scope(gate, actor, project_id).await?;
    let vendors = match scope {
        ThreadScope::Vendor(vendor_id) => vec![vendor_id],
        ThreadScope::Project => gate.eligible_vendors(project_id).await?,
    };
    Ok(vendors
        .into_iter()
        .map(|vendor_id| ThreadKey::new(project_id, vendor_id))
        .collect())
}

/// The widest read scope the actor holds on the project.
async fn resolve_all_scope(
    gate: &dyn RoutingGate,
    actor: &AuthContext,
    project_id: Uuid,
) -> Result<ThreadScope, AccessError> {
    let project = gate
        .project(project_id)
        .await?
        .ok_or_else(|| AccessError::NotFound("project not found".to_string()))?;

    match actor.role {
        Role::Admin => Ok(ThreadScope::Project),
        Role::Business if project.owner_id == actor.user_id => Ok(ThreadScope::Project),
        Role::Business => Err(AccessError::NotAuthorized(
            "only the project owner may access its threads".to_string(),
        )),
        Role::Vendor => {
            let routed = gate.is_routed(project_id, actor.user_id).await?;
            let has_bid = gate
                .bid_status(project_id, actor.user_id)
                .await?
                .grants_access();
            if routed || has_bid {
                Ok(ThreadScope::Vendor(actor.user_id))
            } else {
                Err(AccessError::NotAuthorized(
                    "vendor has no standing on this project".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::domain::{BidStatus, Project, ProjectStatus};
    use crate::store::MemoryStore;

    fn project(owner_id: Uuid) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            owner_id,
            name: "Brand refresh".to_string(),
            status: ProjectStatus::Open,
            selected_vendor_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn actor(role: Role) -> AuthContext {
        AuthContext::new(Uuid::new_v4(), role)
    }

    #[tokio::test]
    async fn admin_reads_span_the_project_and_writes_need_a_vendor() {
        let store = MemoryStore::new();
        let p = project(Uuid::new_v4());
        store.upsert_project(p.clone());
        let vendor = Uuid::new_v4();
        store.add_routing_entry(p.id, vendor);

        let admin = actor(Role::Admin);
        let read = resolve_scope(&store, &admin, p.id, None, Operation::Read)
            .await
            .unwrap();
        assert_eq!(read, ThreadScope::Project);

        let scoped = resolve_scope(&store, &admin, p.id, Some(vendor), Operation::Write)
            .await
            .unwrap();
        assert_eq!(scoped, ThreadScope::Vendor(vendor));

        let err = resolve_scope(&store, &admin, p.id, None, Operation::Write)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::AmbiguousScope(_)));
    }

    #[tokio::test]
    async fn business_owner_must_name_a_vendor_when_several_exist() {
        let store = MemoryStore::new();
        let owner = actor(Role::Business);
        let p = project(owner.user_id);
        store.upsert_project(p.clone());
        let (v1, v2) = (Uuid::new_v4(), Uuid::new_v4());
        store.add_routing_entry(p.id, v1);
        store.add_routing_entry(p.id, v2);

        let err = resolve_scope(&store, &owner, p.id, None, Operation::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::AmbiguousScope(_)));

        let scoped = resolve_scope(&store, &owner, p.id, Some(v2), Operation::Write)
            .await
            .unwrap();
        assert_eq!(scoped, ThreadScope::Vendor(v2));
    }

    #[tokio::test]
    async fn business_scope_defaults_to_the_single_vendor() {
        let store = MemoryStore::new();
        let owner = actor(Role::Business);
        let p = project(owner.user_id);
        store.upsert_project(p.clone());
        let vendor = Uuid::new_v4();
        store.upsert_bid(p.id, vendor, BidStatus::Submitted);

        let scoped = resolve_scope(&store, &owner, p.id, None, Operation::Write)
            .await
            .unwrap();
        assert_eq!(scoped, ThreadScope::Vendor(vendor));
    }

    #[tokio::test]
    async fn business_with_no_vendor_threads_gets_not_found() {
        let store = MemoryStore::new();
        let owner = actor(Role::Business);
        let p = project(owner.user_id);
        store.upsert_project(p.clone());

        let err = resolve_scope(&store, &owner, p.id, None, Operation::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NotFound(_)));

        // Naming an unknown vendor is not found either, never a new thread.
        let err = resolve_scope(&store, &owner, p.id, Some(Uuid::new_v4()), Operation::Write)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NotFound(_)));
    }

    #[tokio::test]
    async fn non_owner_business_is_denied() {
        let store = MemoryStore::new();
        let p = project(Uuid::new_v4());
        store.upsert_project(p.clone());
        store.add_routing_entry(p.id, Uuid::new_v4());

        let outsider = actor(Role::Business);
        let err = resolve_scope(&store, &outsider, p.id, None, Operation::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn vendor_scope_is_forced_to_its_own_thread() {
        let store = MemoryStore::new();
        let p = project(Uuid::new_v4());
        store.upsert_project(p.clone());
        let vendor = actor(Role::Vendor);
        let other = Uuid::new_v4();
        store.add_routing_entry(p.id, vendor.user_id);
        store.add_routing_entry(p.id, other);

        // Asking for another vendor's thread still resolves to its own.
        let scoped = resolve_scope(&store, &vendor, p.id, Some(other), Operation::Read)
            .await
            .unwrap();
        assert_eq!(scoped, ThreadScope::Vendor(vendor.user_id));
    }

    #[tokio::test]
    async fn vendor_without_routing_or_bid_is_denied_read_and_write() {
        let store = MemoryStore::new();
        let p = project(Uuid::new_v4());
        store.upsert_project(p.clone());
        store.add_routing_entry(p.id, Uuid::new_v4());

        let stranger = actor(Role::Vendor);
        for op in [Operation::Read, Operation::Write] {
            let err = resolve_scope(&store, &stranger, p.id, None, op)
                .await
                .unwrap_err();
            assert!(matches!(err, AccessError::NotAuthorized(_)));
        }
    }

    #[tokio::test]
    async fn a_bid_alone_grants_the_vendor_standing() {
        let store = MemoryStore::new();
        let p = project(Uuid::new_v4());
        store.upsert_project(p.clone());
        let vendor = actor(Role::Vendor);
        store.upsert_bid(p.id, vendor.user_id, BidStatus::Submitted);

        let scoped = resolve_scope(&store, &vendor, p.id, None, Operation::Write)
            .await
            .unwrap();
        assert_eq!(scoped, ThreadScope::Vendor(vendor.user_id));

        // Rejection is terminal for the bid but not for thread access.
        store.upsert_bid(p.id, vendor.user_id, BidStatus::Rejected);
        let scoped = resolve_scope(&store, &vendor, p.id, None, Operation::Read)
            .await
            .unwrap();
        assert_eq!(scoped, ThreadScope::Vendor(vendor.user_id));
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let store = MemoryStore::new();
        let admin = actor(Role::Admin);
        let err = resolve_scope(&store, &admin, Uuid::new_v4(), None, Operation::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NotFound(_)));
    }

    #[tokio::test]
    async fn visible_threads_match_the_actor_standing() {
        let store = MemoryStore::new();
        let owner = actor(Role::Business);
        let p = project(owner.user_id);
        store.upsert_project(p.clone());
        let (v1, v2) = (Uuid::new_v4(), Uuid::new_v4());
        store.add_routing_entry(p.id, v1);
        store.upsert_bid(p.id, v2, BidStatus::Submitted);

        let admin = actor(Role::Admin);
        let all = visible_threads(&store, &admin, p.id).await.unwrap();
        assert_eq!(all.len(), 2);

        let owned = visible_threads(&store, &owner, p.id).await.unwrap();
        assert_eq!(owned, all);

        let vendor = AuthContext::new(v1, Role::Vendor);
        let own = visible_threads(&store, &vendor, p.id).await.unwrap();
        assert_eq!(own, vec![ThreadKey::new(p.id, v1)]);

        let stranger = actor(Role::Vendor);
        let err = visible_threads(&store, &stranger, p.id).await.unwrap_err();
        assert!(matches!(err, AccessError::NotAuthorized(_)));
    }
}
