//! Cluster membership of the node.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::lifecycle::state::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Decommissioning,
    Decommissioned,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MembershipError {
    #[error("node cannot be decommissioned while {0}")]
    NotServing(Phase),
}

/// Membership record of one node.
#[derive(Debug, Clone)]
pub struct Membership {
    node_id: Uuid,
    status: Arc<Mutex<MembershipStatus>>,
}

impl Membership {
    pub fn new(node_id: Uuid) -> Self {
        Self {
            node_id,
            status: Arc::new(Mutex::new(MembershipStatus::Active)),
        }
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    pub fn status(&self) -> MembershipStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove the node from the cluster membership. Idempotent.
    ///
    /// Only a running node hands off its membership; a node that is still
    /// starting or already shutting down is refused.
    pub async fn decommission(&self, phase: Phase) -> Result<MembershipStatus, MembershipError> {
        {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            match *status {
                MembershipStatus::Decommissioned => return Ok(MembershipStatus::Decommissioned),
                MembershipStatus::Decommissioning => {}
                MembershipStatus::Active => {
                    if phase != Phase::Running {
                        return Err(MembershipError::NotServing(phase));
                    }
                    *status = MembershipStatus::Decommissioning;
                    tracing::info!(node_id = %self.node_id, "Decommissioning node");
                }
            }
        }

        // Let in-progress status readers observe the intermediate state.
        tokio::task::yield_now().await;

        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        *status = MembershipStatus::Decommissioned;
        tracing::info!(node_id = %self.node_id, "Node decommissioned");
        Ok(*status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn running_node_is_decommissioned_once() {
        let membership = Membership::new(Uuid::new_v4());
        assert_eq!(membership.status(), MembershipStatus::Active);

        let status = membership.decommission(Phase::Running).await.unwrap();
        assert_eq!(status, MembershipStatus::Decommissioned);

        // Idempotent, even once the node has moved on.
        let status = membership.decommission(Phase::Draining).await.unwrap();
        assert_eq!(status, MembershipStatus::Decommissioned);
    }

    #[tokio::test]
    async fn starting_node_is_refused() {
        let membership = Membership::new(Uuid::new_v4());
        let err = membership.decommission(Phase::Starting).await.unwrap_err();

        assert_eq!(err, MembershipError::NotServing(Phase::Starting));
        assert_eq!(membership.status(), MembershipStatus::Active);
    }
}
