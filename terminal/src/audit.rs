//! Ordered audit trail of completed operations
//!
//! Every state-changing operation appends one record after it commits, so
//! the journal replays the terminal's history: deposits, payouts, fee
//! events, migrations. Records are serializable and ride along in engine
//! snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fountain_core::ProjectId;

/// What happened, with the figures that mattered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditEvent {
    Payment {
        project: ProjectId,
        payer: String,
        amount: u128,
        token_count: u128,
    },
    Deposit {
        project: ProjectId,
        amount: u128,
        refunded_fees: u128,
    },
    Distribution {
        project: ProjectId,
        amount: u128,
        debit: u128,
        fees: u128,
        leftover: u128,
    },
    AllowanceDraw {
        project: ProjectId,
        amount: u128,
        debit: u128,
        fee: u128,
        beneficiary: String,
    },
    Redemption {
        project: ProjectId,
        holder: String,
        token_count: u128,
        reclaimed: u128,
    },
    Migration {
        project: ProjectId,
        balance: u128,
        successor: String,
    },
    HeldFeesProcessed {
        project: ProjectId,
        settled: u128,
    },
    FeelessChanged {
        address: String,
        feeless: bool,
    },
}

impl AuditEvent {
    /// Project the event concerns, if it concerns one
    pub fn project(&self) -> Option<ProjectId> {
        match self {
            AuditEvent::Payment { project, .. }
            | AuditEvent::Deposit { project, .. }
            | AuditEvent::Distribution { project, .. }
            | AuditEvent::AllowanceDraw { project, .. }
            | AuditEvent::Redemption { project, .. }
            | AuditEvent::Migration { project, .. }
            | AuditEvent::HeldFeesProcessed { project, .. } => Some(*project),
            AuditEvent::FeelessChanged { .. } => None,
        }
    }
}

/// One journal entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: AuditEvent,
}

/// Append-only operation journal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditJournal {
    next_sequence: u64,
    records: Vec<AuditRecord>,
}

impl AuditJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: AuditEvent) {
        log::debug!("audit #{}: {:?}", self.next_sequence, event);
        self.records.push(AuditRecord {
            sequence: self.next_sequence,
            recorded_at: Utc::now(),
            event,
        });
        self.next_sequence += 1;
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn for_project(&self, project: ProjectId) -> Vec<&AuditRecord> {
        self.records
            .iter()
            .filter(|record| record.event.project() == Some(project))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
