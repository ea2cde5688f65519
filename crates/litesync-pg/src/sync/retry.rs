//! One-shot retry policies applied by the sync orchestrator.

use tokio_postgres::error::SqlState;

use super::error::SyncError;

/// What to do before retrying a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    /// `ALTER ROLE current_user WITH REPLICATION`, then reconnect.
    GrantReplication,
    /// Free slot capacity by dropping the shard's inactive slots.
    DropInactiveSlots,
    /// Drop and recreate the shard schema.
    ResyncShard,
}

/// Retry a failure class a bounded number of times after a remedy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub name: &'static str,
    pub max_attempts: u32,
    pub matches: fn(&SyncError) -> bool,
    pub remedy: Remedy,
}

impl RetryPolicy {
    pub fn grant_replication() -> Self {
        RetryPolicy {
            name: "insufficient privilege",
            max_attempts: 1,
            matches: |e| e.sql_state() == Some(&SqlState::INSUFFICIENT_PRIVILEGE),
            remedy: Remedy::GrantReplication,
        }
    }

    pub fn free_slots() -> Self {
        RetryPolicy {
            name: "replication slot limit",
            max_attempts: 1,
            matches: |e| e.sql_state() == Some(&SqlState::CONFIGURATION_LIMIT_EXCEEDED),
            remedy: Remedy::DropInactiveSlots,
        }
    }

    pub fn resync_shard() -> Self {
        RetryPolicy {
            name: "missing publications",
            max_attempts: 1,
            matches: |e| matches!(e, SyncError::MissingPublications(_)),
            remedy: Remedy::ResyncShard,
        }
    }
}

/// Tracks how many retries each policy has left.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    policies: Vec<(RetryPolicy, u32)>,
}

impl RetryBudget {
    pub fn new(policies: Vec<RetryPolicy>) -> Self {
        RetryBudget {
            policies: policies.into_iter().map(|p| (p, 0)).collect(),
        }
    }

    /// Policies for `CREATE_REPLICATION_SLOT`.
    pub fn slot_creation() -> Self {
        Self::new(vec![RetryPolicy::grant_replication(), RetryPolicy::free_slots()])
    }

    /// Policies for shard setup.
    pub fn shard_setup() -> Self {
        Self::new(vec![RetryPolicy::resync_shard()])
    }

    /// The remedy to apply for `err`, consuming one attempt of the matching
    /// policy. `None` means the error is final.
    pub fn claim(&mut self, err: &SyncError) -> Option<Remedy> {
        let (policy, used) = self
            .policies
            .iter_mut()
            .find(|(policy, _)| (policy.matches)(err))?;
        if *used >= policy.max_attempts {
            return None;
        }
        *used += 1;
        tracing::warn!(
            policy = policy.name,
            attempt = *used,
            error = %err,
            "Retrying after remedy"
        );
        Some(policy.remedy)
    }
}
