// libs/appointment-cell/src/services/locks.rs
//
// In-process serialization of check-then-write sequences per scheduling scope.
// An organization-wide booking holds the organization lock exclusively; a
// staff-scoped booking holds it shared plus the staff lock. Two bookings for
// the same practitioner therefore never interleave their conflict check and
// insert, and an unscoped booking waits for every scoped one in its
// organization.
//
// Only valid while a single API instance serves a given organization.
// Entries nobody holds or waits on are dropped on the next acquire, so the
// maps only hold scopes with bookings in flight.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::models::SchedulingScope;

#[derive(Default)]
pub struct SchedulingLocks {
    organizations: Mutex<HashMap<Uuid, Arc<RwLock<()>>>>,
    staff: Mutex<HashMap<(Uuid, Uuid), Arc<Mutex<()>>>>,
}

/// Held for the duration of a conflict check plus write. Dropping releases.
pub struct SchedulingGuard {
    _held: HeldLock,
}

enum HeldLock {
    Organization(OwnedRwLockWriteGuard<()>),
    Staff {
        _organization: OwnedRwLockReadGuard<()>,
        _staff: OwnedMutexGuard<()>,
    },
}

impl SchedulingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, scope: SchedulingScope) -> SchedulingGuard {
        let organization_lock = {
            let mut organizations = self.organizations.lock().await;
            organizations.retain(|_, lock| Arc::strong_count(lock) > 1);
            organizations
                .entry(scope.organization_id)
                .or_insert_with(|| Arc::new(RwLock::new(())))
                .clone()
        };

        let held = match scope.staff_id {
            None => {
                debug!("Acquiring organization-wide scheduling lock for {}", scope.organization_id);
                HeldLock::Organization(organization_lock.write_owned().await)
            }
            Some(staff_id) => {
                let staff_lock = {
                    let mut staff = self.staff.lock().await;
                    staff.retain(|_, lock| Arc::strong_count(lock) > 1);
                    staff
                        .entry((scope.organization_id, staff_id))
                        .or_insert_with(|| Arc::new(Mutex::new(())))
                        .clone()
                };

                debug!("Acquiring staff scheduling lock for {}/{}", scope.organization_id, staff_id);
                // Organization first, always, so lock order is fixed
                let organization = organization_lock.read_owned().await;
                let staff = staff_lock.lock_owned().await;
                HeldLock::Staff {
                    _organization: organization,
                    _staff: staff,
                }
            }
        };

        SchedulingGuard { _held: held }
    }

    #[cfg(test)]
    async fn tracked(&self) -> (usize, usize) {
        (self.organizations.lock().await.len(), self.staff.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scope(organization_id: Uuid, staff_id: Option<Uuid>) -> SchedulingScope {
        SchedulingScope { organization_id, staff_id }
    }

    #[tokio::test]
    async fn test_same_staff_is_serialized() {
        let locks = Arc::new(SchedulingLocks::new());
        let org = Uuid::new_v4();
        let staff = Some(Uuid::new_v4());

        let guard = locks.acquire(scope(org, staff)).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(scope(org, staff)).await; })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_staff_run_in_parallel() {
        let locks = SchedulingLocks::new();
        let org = Uuid::new_v4();

        let _first = locks.acquire(scope(org, Some(Uuid::new_v4()))).await;
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(scope(org, Some(Uuid::new_v4()))),
        ).await;

        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_organization_booking_waits_for_staff_bookings() {
        let locks = Arc::new(SchedulingLocks::new());
        let org = Uuid::new_v4();

        let guard = locks.acquire(scope(org, Some(Uuid::new_v4()))).await;

        let blocked = tokio::time::timeout(
            Duration::from_millis(30),
            locks.acquire(scope(org, None)),
        ).await;
        assert!(blocked.is_err());

        drop(guard);
        let _org_guard = locks.acquire(scope(org, None)).await;
    }

    #[tokio::test]
    async fn test_organizations_are_independent() {
        let locks = SchedulingLocks::new();

        let _first = locks.acquire(scope(Uuid::new_v4(), None)).await;
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(scope(Uuid::new_v4(), None)),
        ).await;

        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_released_scopes_are_pruned() {
        let locks = SchedulingLocks::new();

        for _ in 0..10 {
            let _guard = locks.acquire(scope(Uuid::new_v4(), Some(Uuid::new_v4()))).await;
        }

        let held = locks.acquire(scope(Uuid::new_v4(), Some(Uuid::new_v4()))).await;
        assert_eq!(locks.tracked().await, (1, 1));

        drop(held);
        let _org_guard = locks.acquire(scope(Uuid::new_v4(), None)).await;
        assert_eq!(locks.tracked().await.0, 1);
    }
}
