//! Weighted payout split entries

use serde::{Deserialize, Serialize};

use crate::types::ProjectId;

/// Split group holding a project's payout recipients
pub const GROUP_PAYOUTS: u64 = 1;

/// A weighted payout recipient entry.
///
/// Exactly one routing target is honored, in resolution order: `allocator`,
/// then `project_id`, then `beneficiary`, then the operation caller.
/// `percent` is parts per billion of `SPLITS_TOTAL_PERCENT`; a list summing
/// below the total leaves the remainder for the project owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub percent: u64,
    pub project_id: Option<ProjectId>,
    pub beneficiary: Option<String>,
    /// Address of an allocator capability, resolved through the splits store
    pub allocator: Option<String>,
    pub prefer_claimed: bool,
    /// Route a project-target split through `add_to_balance_of` instead of `pay`
    pub prefer_add_to_balance: bool,
    /// Until this timestamp the configuring collaborator must carry the split
    /// forward across reconfigurations; not enforced by the engine
    pub locked_until: u64,
}

impl Split {
    /// Split paying a plain beneficiary address
    pub fn to_beneficiary(percent: u64, beneficiary: impl Into<String>) -> Self {
        Self {
            percent,
            project_id: None,
            beneficiary: Some(beneficiary.into()),
            allocator: None,
            prefer_claimed: false,
            prefer_add_to_balance: false,
            locked_until: 0,
        }
    }

    /// Split paying another project through its terminal
    pub fn to_project(percent: u64, project_id: ProjectId) -> Self {
        Self {
            percent,
            project_id: Some(project_id),
            beneficiary: None,
            allocator: None,
            prefer_claimed: false,
            prefer_add_to_balance: false,
            locked_until: 0,
        }
    }

    /// Split routed through an allocator capability
    pub fn to_allocator(percent: u64, allocator: impl Into<String>) -> Self {
        Self {
            percent,
            project_id: None,
            beneficiary: None,
            allocator: Some(allocator.into()),
            prefer_claimed: false,
            prefer_add_to_balance: false,
            locked_until: 0,
        }
    }
}
