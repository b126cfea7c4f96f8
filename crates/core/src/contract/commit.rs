//! Durable form of a committed transaction
//!
//! A [`CommitRecord`] is everything needed to replay one commit into empty
//! stores: the revision (if the transaction touched audited data) and the
//! merged entity changes in the order they were first made.

use super::{EntityChange, Revision};
use crate::error::{AnnalsError, AnnalsResult};
use serde::{Deserialize, Serialize};

/// One committed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Transaction identifier (unique, not necessarily contiguous)
    pub txn_id: u64,
    /// Revision created by the commit, if any audited entity changed
    pub revision: Option<Revision>,
    /// Merged changes
    pub changes: Vec<EntityChange>,
}

impl CommitRecord {
    /// Encode with MessagePack
    pub fn to_bytes(&self) -> AnnalsResult<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| AnnalsError::serialization(e.to_string()))
    }

    /// Decode from MessagePack
    pub fn from_bytes(bytes: &[u8]) -> AnnalsResult<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| AnnalsError::serialization(e.to_string()))
    }

    /// True when the commit touched audited data
    pub fn is_audited(&self) -> bool {
        self.revision.is_some()
    }
}
