//! Convergence verification.
//!
//! Replication has caught up when two replicas have applied the same set of
//! transforms. Comparing transform logs tells whether that holds and, if
//! not, which side is missing what.

use std::collections::BTreeSet;

use tether_core::{TransformId, TransformLog};
use tether_store::Store;

use crate::error::Result;

/// Order-independent digest of a transform log.
///
/// Algorithm:
/// 1. Sort the applied ids
/// 2. Hash: Blake3(domain || len(id) || id || ...)
pub fn log_digest(log: &TransformLog) -> [u8; 32] {
    let sorted: BTreeSet<&str> = log.iter().map(TransformId::as_str).collect();

    let mut hasher = blake3::Hasher::new();
    hasher.update(b"tether-log-v0:");
    for id in sorted {
        hasher.update(&(id.len() as u64).to_le_bytes());
        hasher.update(id.as_bytes());
    }
    *hasher.finalize().as_bytes()
}

/// Hex form of [`log_digest`] for a store.
pub async fn compute_log_digest<S>(store: &S) -> Result<String>
where
    S: Store + ?Sized,
{
    let log = store.transform_log().await?;
    Ok(hex::encode(log_digest(&log)))
}

/// Result of comparing two replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both replicas applied exactly the same transforms.
    Converged,

    /// The replicas differ.
    Diverged {
        /// Applied remotely but not here.
        missing_locally: Vec<TransformId>,
        /// Applied here but not remotely.
        missing_remotely: Vec<TransformId>,
    },
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare two transform logs.
pub fn compare_logs(local: &TransformLog, remote: &TransformLog) -> ConvergenceResult {
    let missing_locally: Vec<TransformId> =
        remote.iter().filter(|id| !local.contains(id)).cloned().collect();
    let missing_remotely: Vec<TransformId> =
        local.iter().filter(|id| !remote.contains(id)).cloned().collect();

    if missing_locally.is_empty() && missing_remotely.is_empty() {
        ConvergenceResult::Converged
    } else {
        ConvergenceResult::Diverged {
            missing_locally,
            missing_remotely,
        }
    }
}

/// Verify that two stores have converged.
pub async fn verify_convergence<L, R>(local: &L, remote: &R) -> Result<ConvergenceResult>
where
    L: Store + ?Sized,
    R: Store + ?Sized,
{
    let local_log = local.transform_log().await?;
    let remote_log = remote.transform_log().await?;
    Ok(compare_logs(&local_log, &remote_log))
}
