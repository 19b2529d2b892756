//! Fee deferral, refund and settlement
//!
//! Held fees model "undoing" a payout: when a cycle holds its fees, the fee
//! portion of each outbound amount stays in the terminal's coffers instead
//! of moving to the protocol project. Money deposited back retires the queue
//! oldest-first and forgives the matching fee portion; whatever is still
//! queued can be settled to the protocol project at any time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use fountain_core::constants::{MAX_FEE, MAX_FEE_DISCOUNT, PROTOCOL_PROJECT};
use fountain_core::{Directory, FeeGauge, ProjectId, TerminalContext};
use ledger::LedgerStore;

use crate::error::{FeeError, Result};
use crate::math::fee_amount;

/// A deferred protocol fee, computed against a pre-fee gross amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldFee {
    /// Pre-fee amount the fee was computed against; shrinks as deposits
    /// refund it
    pub gross: u128,
    pub fee_rate: u64,
    pub fee_discount: u64,
    /// Address attributed when the fee is eventually settled
    pub beneficiary: String,
}

/// Protocol fee engine
pub struct FeeEngine {
    fee_rate: u64,
    feeless: HashSet<String>,
    held: HashMap<ProjectId, VecDeque<HeldFee>>,
    gauge: Option<Arc<dyn FeeGauge>>,
    directory: Arc<dyn Directory>,
}

impl FeeEngine {
    pub fn new(
        fee_rate: u64,
        gauge: Option<Arc<dyn FeeGauge>>,
        directory: Arc<dyn Directory>,
    ) -> Result<Self> {
        if fee_rate > MAX_FEE {
            return Err(FeeError::InvalidFeeRate(fee_rate));
        }
        Ok(Self {
            fee_rate,
            feeless: HashSet::new(),
            held: HashMap::new(),
            gauge,
            directory,
        })
    }

    pub fn fee_rate(&self) -> u64 {
        self.fee_rate
    }

    /// Owner-managed; access control belongs to the embedding application
    pub fn set_fee_rate(&mut self, fee_rate: u64) -> Result<()> {
        if fee_rate > MAX_FEE {
            return Err(FeeError::InvalidFeeRate(fee_rate));
        }
        self.fee_rate = fee_rate;
        Ok(())
    }

    pub fn is_feeless(&self, address: &str) -> bool {
        self.feeless.contains(address)
    }

    /// Owner-managed allow-list of fee-exempt addresses
    pub fn set_feeless(&mut self, address: &str, flag: bool) {
        if flag {
            self.feeless.insert(address.to_string());
        } else {
            self.feeless.remove(address);
        }
        log::info!("feeless[{}] = {}", address, flag);
    }

    /// Discount in force for a project. The gauge is untrusted: a fault or
    /// an out-of-range value degrades to no discount rather than blocking
    /// or inflating a payout.
    pub fn current_discount_for(&self, project: ProjectId) -> u64 {
        let Some(gauge) = &self.gauge else {
            return 0;
        };
        match gauge.current_discount_for(project) {
            Ok(discount) if discount <= MAX_FEE_DISCOUNT => discount,
            Ok(discount) => {
                log::warn!(
                    "{}: fee gauge returned out-of-range discount {}, using 0",
                    project,
                    discount
                );
                0
            }
            Err(fault) => {
                log::warn!("{}: fee gauge fault ({}), using 0", project, fault);
                0
            }
        }
    }

    /// Fee owed on an outbound `amount` for `project`, or zero when any of
    /// the involved addresses is feeless or the payer is the protocol itself
    pub fn fee_for(
        &self,
        project: ProjectId,
        amount: u128,
        discount: u64,
        counterparties: &[&str],
    ) -> Result<u128> {
        if project == PROTOCOL_PROJECT
            || counterparties.iter().any(|address| self.is_feeless(address))
        {
            return Ok(0);
        }
        Ok(fee_amount(amount, self.fee_rate, discount)?)
    }

    /// Currently queued held fees for a project, oldest first
    pub fn held_fees_of(&self, project: ProjectId) -> Vec<HeldFee> {
        self.held
            .get(&project)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Defer a fee: queue it against its gross and leave the fee portion in
    /// the terminal's coffers
    pub fn hold_fee(
        &mut self,
        project: ProjectId,
        gross: u128,
        fee_discount: u64,
        beneficiary: &str,
    ) {
        log::info!(
            "{}: holding fee on gross {} (rate {}, discount {})",
            project,
            gross,
            self.fee_rate,
            fee_discount
        );
        self.held.entry(project).or_default().push_back(HeldFee {
            gross,
            fee_rate: self.fee_rate,
            fee_discount,
            beneficiary: beneficiary.to_string(),
        });
    }

    /// Settle one fee amount to the protocol project right now.
    ///
    /// When the protocol project's primary terminal for the token is the
    /// very terminal paying the fee, the amount never leaves: it is recorded
    /// as a payment to the protocol project in the shared ledger. Otherwise
    /// the peer terminal's `pay` surface is invoked.
    pub fn process_fee(
        &self,
        ctx: &TerminalContext,
        store: &mut LedgerStore,
        amount: u128,
        beneficiary: &str,
    ) -> Result<()> {
        let terminal = self
            .directory
            .primary_terminal_of(PROTOCOL_PROJECT, &ctx.token)
            .ok_or_else(|| FeeError::ProtocolTerminalNotFound {
                token: ctx.token.clone(),
            })?;

        if terminal.address() == ctx.address {
            store.record_payment_from(
                ctx,
                &ctx.address,
                amount,
                PROTOCOL_PROJECT,
                beneficiary,
                "fee",
                &[],
            )?;
        } else {
            terminal
                .pay(
                    &ctx.address,
                    PROTOCOL_PROJECT,
                    amount,
                    &ctx.token,
                    beneficiary,
                    "fee",
                )
                .map_err(FeeError::TerminalFault)?;
        }
        log::info!("fee of {} settled to {}", amount, PROTOCOL_PROJECT);
        Ok(())
    }

    /// Walk the held queue with a deposit, oldest first, and return the
    /// forgiven fee portion to credit on top of the deposit.
    ///
    /// The walk is computed before the queue is touched so a math error
    /// leaves the queue exactly as it was.
    pub fn refund_held_fees(&mut self, project: ProjectId, deposit: u128) -> Result<u128> {
        let Some(queue) = self.held.get_mut(&project) else {
            return Ok(0);
        };

        let mut remaining = deposit;
        let mut bonus: u128 = 0;
        let mut retired = 0usize;
        let mut partial: Option<u128> = None;

        for entry in queue.iter() {
            if remaining == 0 {
                break;
            }
            if remaining >= entry.gross {
                bonus += fee_amount(entry.gross, entry.fee_rate, entry.fee_discount)?;
                remaining -= entry.gross;
                retired += 1;
            } else {
                bonus += fee_amount(remaining, entry.fee_rate, entry.fee_discount)?;
                partial = Some(entry.gross - remaining);
                remaining = 0;
            }
        }

        queue.drain(..retired);
        if let Some(gross) = partial {
            if let Some(front) = queue.front_mut() {
                front.gross = gross;
            }
        }
        if queue.is_empty() {
            self.held.remove(&project);
        }

        if bonus > 0 {
            log::info!(
                "{}: deposit of {} refunded {} of held fees",
                project,
                deposit,
                bonus
            );
        }
        Ok(bonus)
    }

    /// Settle every held fee for a project to the protocol project and clear
    /// the queue. A no-op on an empty queue, so repeat calls are harmless.
    ///
    /// Entries already settled when a later one faults stay settled (their
    /// external payment happened) and the unsettled tail is re-queued.
    pub fn process_fees(
        &mut self,
        ctx: &TerminalContext,
        store: &mut LedgerStore,
        project: ProjectId,
    ) -> Result<u128> {
        let Some(mut queue) = self.held.remove(&project) else {
            return Ok(0);
        };

        let mut settled: u128 = 0;
        while let Some(entry) = queue.pop_front() {
            let amount = match fee_amount(entry.gross, entry.fee_rate, entry.fee_discount) {
                Ok(amount) => amount,
                Err(error) => {
                    queue.push_front(entry);
                    self.held.insert(project, queue);
                    return Err(error.into());
                }
            };
            if amount == 0 {
                continue;
            }
            if let Err(error) = self.process_fee(ctx, store, amount, &entry.beneficiary) {
                queue.push_front(entry);
                self.held.insert(project, queue);
                return Err(error);
            }
            settled += amount;
        }

        if settled > 0 {
            log::info!("{}: processed held fees totaling {}", project, settled);
        }
        Ok(settled)
    }

    /// Serializable row form of the engine state
    pub fn snapshot(&self) -> FeeSnapshot {
        let mut feeless: Vec<String> = self.feeless.iter().cloned().collect();
        feeless.sort();

        let mut held: Vec<HeldFeeRow> = self
            .held
            .iter()
            .map(|(project, queue)| HeldFeeRow {
                project: *project,
                fees: queue.iter().cloned().collect(),
            })
            .collect();
        held.sort_by_key(|row| row.project);

        FeeSnapshot {
            fee_rate: self.fee_rate,
            feeless,
            held,
        }
    }

    /// Replace the engine state with a previously captured snapshot
    pub fn restore(&mut self, snapshot: FeeSnapshot) {
        self.fee_rate = snapshot.fee_rate;
        self.feeless = snapshot.feeless.into_iter().collect();
        self.held = snapshot
            .held
            .into_iter()
            .map(|row| (row.project, row.fees.into()))
            .collect();
    }
}

/// Held-fee queue of one project, in row form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeldFeeRow {
    pub project: ProjectId,
    pub fees: Vec<HeldFee>,
}

/// Row-vector form of the fee engine state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeeSnapshot {
    pub fee_rate: u64,
    pub feeless: Vec<String>,
    pub held: Vec<HeldFeeRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fountain_core::testing::{GaugeBehavior, StaticDirectory, StaticGauge};

    const PROJECT: ProjectId = ProjectId(7);
    const RATE: u64 = 25_000_000; // 2.5%

    fn engine_with_gauge(behavior: GaugeBehavior) -> FeeEngine {
        FeeEngine::new(
            RATE,
            Some(Arc::new(StaticGauge { behavior })),
            Arc::new(StaticDirectory::new()),
        )
        .unwrap()
    }

    fn engine() -> FeeEngine {
        FeeEngine::new(RATE, None, Arc::new(StaticDirectory::new())).unwrap()
    }

    #[test]
    fn test_fee_rate_validation() {
        assert!(FeeEngine::new(MAX_FEE + 1, None, Arc::new(StaticDirectory::new())).is_err());
        let mut engine = engine();
        assert!(engine.set_fee_rate(MAX_FEE).is_ok());
        assert!(engine.set_fee_rate(MAX_FEE + 1).is_err());
    }

    #[test]
    fn test_gauge_fault_degrades_to_zero_discount() {
        assert_eq!(
            engine_with_gauge(GaugeBehavior::Discount(500)).current_discount_for(PROJECT),
            500
        );
        assert_eq!(
            engine_with_gauge(GaugeBehavior::Fault).current_discount_for(PROJECT),
            0
        );
        assert_eq!(
            engine_with_gauge(GaugeBehavior::OutOfRange).current_discount_for(PROJECT),
            0
        );
        assert_eq!(engine().current_discount_for(PROJECT), 0);
    }

    #[test]
    fn test_feeless_counterparty_waives_fee() {
        let mut engine = engine();
        engine.set_feeless("alice", true);

        let fee = engine.fee_for(PROJECT, 1_000_000, 0, &["alice"]).unwrap();
        assert_eq!(fee, 0);

        let fee = engine.fee_for(PROJECT, 1_000_000, 0, &["bob"]).unwrap();
        assert!(fee > 0);

        engine.set_feeless("alice", false);
        let fee = engine.fee_for(PROJECT, 1_000_000, 0, &["alice"]).unwrap();
        assert!(fee > 0);
    }

    #[test]
    fn test_protocol_project_pays_no_fee() {
        let engine = engine();
        let fee = engine
            .fee_for(PROTOCOL_PROJECT, 1_000_000, 0, &["bob"])
            .unwrap();
        assert_eq!(fee, 0);
    }

    #[test]
    fn test_refund_exact_gross_retires_entry() {
        let mut engine = engine();
        let gross = 1_000_000_000_000u128;
        engine.hold_fee(PROJECT, gross, 0, "owner");

        let bonus = engine.refund_held_fees(PROJECT, gross).unwrap();
        assert_eq!(bonus, fee_amount(gross, RATE, 0).unwrap());
        assert!(engine.held_fees_of(PROJECT).is_empty());
    }

    #[test]
    fn test_refund_double_gross_pays_one_bonus() {
        let mut engine = engine();
        let gross = 1_000_000_000_000u128;
        engine.hold_fee(PROJECT, gross, 0, "owner");

        // The second half of the deposit finds no queue left: face value only
        let bonus = engine.refund_held_fees(PROJECT, 2 * gross).unwrap();
        assert_eq!(bonus, fee_amount(gross, RATE, 0).unwrap());
        assert!(engine.held_fees_of(PROJECT).is_empty());
    }

    #[test]
    fn test_refund_half_gross_shrinks_entry() {
        let mut engine = engine();
        let gross = 1_000_000_000_000u128;
        engine.hold_fee(PROJECT, gross, 0, "owner");

        let bonus = engine.refund_held_fees(PROJECT, gross / 2).unwrap();
        assert_eq!(bonus, fee_amount(gross / 2, RATE, 0).unwrap());

        let queue = engine.held_fees_of(PROJECT);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].gross, gross / 2);
    }

    #[test]
    fn test_refund_walks_queue_oldest_first() {
        let mut engine = engine();
        engine.hold_fee(PROJECT, 100, 0, "first");
        engine.hold_fee(PROJECT, 200, 0, "second");

        engine.refund_held_fees(PROJECT, 150).unwrap();
        let queue = engine.held_fees_of(PROJECT);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].beneficiary, "second");
        assert_eq!(queue[0].gross, 150);
    }

    #[test]
    fn test_refund_without_queue_is_zero() {
        let mut engine = engine();
        assert_eq!(engine.refund_held_fees(PROJECT, 1_000).unwrap(), 0);
    }
}
