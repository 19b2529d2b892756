//! The payment terminal: entry points over the treasury engine
//!
//! One `RwLock` guards the ledger, the fee engine and the audit journal for
//! the whole of every operation, so each call runs single-writer from first
//! validation to last internal mutation. Operations with post-commit
//! external calls capture a state checkpoint first and restore it on
//! failure; delegates are invoked only after the lock is released.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use economics::{convert_amount, rescale_decimals};
use fees::{FeeEngine, FeeSnapshot, HeldFee};
use fountain_core::{
    CollaboratorFault, Controller, Currency, Directory, DidPay, DidRedeem, FeeGauge,
    FundingCycleProvider, PriceOracle, ProjectId, SplitsStore, TerminalContext, TerminalHandle,
    TokenMover, GROUP_PAYOUTS,
};
use fountain_storage::SnapshotStore;
use ledger::{LedgerSnapshot, LedgerStore};
use router::{DistributionSummary, PayoutRouter};

use crate::audit::{AuditEvent, AuditJournal, AuditRecord};
use crate::error::{Result, TerminalError};

/// Everything a terminal needs wired in
pub struct TerminalParams {
    pub ctx: TerminalContext,
    /// Protocol fee rate, parts of `MAX_FEE`
    pub fee_rate: u64,
    pub cycles: Arc<dyn FundingCycleProvider>,
    pub controller: Arc<dyn Controller>,
    pub prices: Arc<dyn PriceOracle>,
    pub directory: Arc<dyn Directory>,
    pub splits: Arc<dyn SplitsStore>,
    pub gauge: Option<Arc<dyn FeeGauge>>,
    pub mover: Arc<dyn TokenMover>,
}

struct EngineState {
    store: LedgerStore,
    fees: FeeEngine,
    journal: AuditJournal,
}

/// A project treasury terminal
pub struct PaymentTerminal {
    ctx: TerminalContext,
    prices: Arc<dyn PriceOracle>,
    mover: Arc<dyn TokenMover>,
    router: PayoutRouter,
    state: RwLock<EngineState>,
}

#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub token_count: u128,
    pub memo: String,
}

#[derive(Debug, Clone)]
pub struct DepositReceipt {
    /// Amount credited to the balance: the deposit plus any refunded fees
    pub credited: u128,
    pub refunded_fees: u128,
}

#[derive(Debug, Clone)]
pub struct DistributionReceipt {
    /// Amount debited from the balance, in the terminal's currency
    pub debit: u128,
    pub total_fee: u128,
    pub summary: DistributionSummary,
}

#[derive(Debug, Clone)]
pub struct AllowanceReceipt {
    pub debit: u128,
    pub fee: u128,
    /// Amount actually sent to the beneficiary
    pub net: u128,
}

#[derive(Debug, Clone)]
pub struct RedemptionReceipt {
    pub reclaimed: u128,
    pub memo: String,
}

/// Serializable state of a whole terminal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub ledger: LedgerSnapshot,
    pub fees: FeeSnapshot,
    pub journal: AuditJournal,
}

impl PaymentTerminal {
    pub fn new(params: TerminalParams) -> Result<Self> {
        let store = LedgerStore::new(
            params.cycles,
            params.controller,
            params.prices.clone(),
            params.directory.clone(),
        );
        let fees = FeeEngine::new(params.fee_rate, params.gauge, params.directory.clone())?;
        let router = PayoutRouter::new(params.splits, params.directory, params.mover.clone());

        Ok(Self {
            ctx: params.ctx,
            prices: params.prices,
            mover: params.mover,
            router,
            state: RwLock::new(EngineState {
                store,
                fees,
                journal: AuditJournal::new(),
            }),
        })
    }

    pub fn context(&self) -> &TerminalContext {
        &self.ctx
    }

    // ---- views ----------------------------------------------------------

    pub fn balance_of(&self, project: ProjectId) -> u128 {
        self.state.read().store.balance_of(&self.ctx.address, project)
    }

    pub fn used_distribution_limit_of(&self, project: ProjectId, number: u64) -> u128 {
        self.state
            .read()
            .store
            .used_distribution_limit_of(&self.ctx.address, project, number)
    }

    pub fn used_overflow_allowance_of(&self, project: ProjectId, configuration: u64) -> u128 {
        self.state
            .read()
            .store
            .used_overflow_allowance_of(&self.ctx.address, project, configuration)
    }

    pub fn current_overflow_of(&self, project: ProjectId) -> Result<u128> {
        Ok(self.state.read().store.current_overflow_of(&self.ctx, project)?)
    }

    pub fn current_total_overflow_of(
        &self,
        project: ProjectId,
        decimals: u32,
        currency: Currency,
    ) -> Result<u128> {
        Ok(self
            .state
            .read()
            .store
            .current_total_overflow_of(&self.ctx, project, decimals, currency)?)
    }

    pub fn current_reclaimable_overflow_of(
        &self,
        project: ProjectId,
        token_count: u128,
    ) -> Result<u128> {
        Ok(self
            .state
            .read()
            .store
            .current_reclaimable_overflow_of(&self.ctx, project, token_count)?)
    }

    pub fn held_fees_of(&self, project: ProjectId) -> Vec<HeldFee> {
        self.state.read().fees.held_fees_of(project)
    }

    pub fn is_feeless(&self, address: &str) -> bool {
        self.state.read().fees.is_feeless(address)
    }

    pub fn fee_rate(&self) -> u64 {
        self.state.read().fees.fee_rate()
    }

    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.state.read().journal.records().to_vec()
    }

    // ---- owner-managed configuration ------------------------------------

    pub fn set_feeless(&self, address: &str, feeless: bool) {
        let mut state = self.state.write();
        state.fees.set_feeless(address, feeless);
        state.journal.record(AuditEvent::FeelessChanged {
            address: address.to_string(),
            feeless,
        });
    }

    pub fn set_fee_rate(&self, fee_rate: u64) -> Result<()> {
        Ok(self.state.write().fees.set_fee_rate(fee_rate)?)
    }

    // ---- operations ------------------------------------------------------

    /// Record an incoming payment for `project`. Token custody is the
    /// caller's job; this records the deposit and returns the token count
    /// for the token-supply component to mint.
    pub fn pay(
        &self,
        payer: &str,
        amount: u128,
        project: ProjectId,
        beneficiary: &str,
        memo: &str,
        metadata: &[u8],
    ) -> Result<PaymentReceipt> {
        let (receipt, delegate) = {
            let mut state = self.state.write();
            let record = state.store.record_payment_from(
                &self.ctx,
                payer,
                amount,
                project,
                beneficiary,
                memo,
                metadata,
            )?;
            state.journal.record(AuditEvent::Payment {
                project,
                payer: payer.to_string(),
                amount,
                token_count: record.token_count,
            });
            let context = record.delegate.map(|hook| {
                (
                    hook,
                    DidPay {
                        terminal: self.ctx.address.clone(),
                        payer: payer.to_string(),
                        project,
                        amount,
                        token_count: record.token_count,
                        beneficiary: beneficiary.to_string(),
                        memo: record.memo.clone(),
                    },
                )
            });
            (
                PaymentReceipt {
                    token_count: record.token_count,
                    memo: record.memo,
                },
                context,
            )
        };

        // Post-commit notification, outside the lock
        if let Some((hook, context)) = delegate {
            hook.did_pay(&context);
        }
        Ok(receipt)
    }

    /// Credit a deposit, refunding matching held fees on top
    pub fn add_to_balance_of(
        &self,
        project: ProjectId,
        amount: u128,
        memo: &str,
    ) -> Result<DepositReceipt> {
        let mut state = self.state.write();
        let checkpoint = state.fees.snapshot();

        let refunded_fees = state.fees.refund_held_fees(project, amount)?;
        let credited = amount.saturating_add(refunded_fees);
        if let Err(error) = state
            .store
            .record_added_balance_for(&self.ctx, project, credited)
        {
            state.fees.restore(checkpoint);
            return Err(error.into());
        }

        state.journal.record(AuditEvent::Deposit {
            project,
            amount,
            refunded_fees,
        });
        log::debug!("{}: deposit memo {:?}", project, memo);
        Ok(DepositReceipt {
            credited,
            refunded_fees,
        })
    }

    /// Distribute from the balance up to the cycle's distribution limit,
    /// fanning out across the project's payout splits
    pub fn distribute_payouts_of(
        &self,
        project: ProjectId,
        amount: u128,
        currency: Currency,
        caller: &str,
        owner: &str,
    ) -> Result<DistributionReceipt> {
        let mut state = self.state.write();
        let store_checkpoint = state.store.snapshot();
        let fees_checkpoint = state.fees.snapshot();

        let (cycle, debit) =
            state
                .store
                .record_distribution_for(&self.ctx, project, amount, currency)?;
        let discount = state.fees.current_discount_for(project);

        let EngineState {
            store,
            fees,
            journal,
        } = &mut *state;
        let outcome = match self.router.plan(
            &self.ctx,
            project,
            cycle.configuration,
            GROUP_PAYOUTS,
            debit,
            caller,
        ) {
            Ok(plan) => self.router.execute(
                &self.ctx,
                store,
                fees,
                plan,
                project,
                caller,
                owner,
                cycle.metadata.hold_fees,
                discount,
            ),
            Err(error) => Err(error),
        };

        match outcome {
            Ok(summary) => {
                journal.record(AuditEvent::Distribution {
                    project,
                    amount,
                    debit,
                    fees: summary.total_fee,
                    leftover: summary.leftover_gross,
                });
                Ok(DistributionReceipt {
                    debit,
                    total_fee: summary.total_fee,
                    summary,
                })
            }
            Err(error) => {
                store.restore(store_checkpoint);
                fees.restore(fees_checkpoint);
                Err(error.into())
            }
        }
    }

    /// Draw on the cycle's one-time overflow allowance, sending the net to
    /// `beneficiary`
    pub fn use_allowance_of(
        &self,
        project: ProjectId,
        amount: u128,
        currency: Currency,
        beneficiary: &str,
        caller: &str,
        owner: &str,
    ) -> Result<AllowanceReceipt> {
        let mut state = self.state.write();
        let store_checkpoint = state.store.snapshot();
        let fees_checkpoint = state.fees.snapshot();

        let (cycle, debit) =
            state
                .store
                .record_used_allowance_of(&self.ctx, project, amount, currency)?;
        let discount = state.fees.current_discount_for(project);

        let EngineState {
            store,
            fees,
            journal,
        } = &mut *state;
        let fee = fees.fee_for(project, debit, discount, &[caller])?;
        let net = debit - fee;

        let mut outcome: Result<()> = Ok(());
        if fee > 0 {
            if cycle.metadata.hold_fees {
                fees.hold_fee(project, debit, discount, owner);
            } else {
                outcome = fees
                    .process_fee(&self.ctx, store, fee, owner)
                    .map_err(Into::into);
            }
        }
        if outcome.is_ok() && net > 0 {
            outcome = self
                .mover
                .transfer(&self.ctx.token, beneficiary, net)
                .map_err(TerminalError::Transfer);
        }

        match outcome {
            Ok(()) => {
                journal.record(AuditEvent::AllowanceDraw {
                    project,
                    amount,
                    debit,
                    fee,
                    beneficiary: beneficiary.to_string(),
                });
                Ok(AllowanceReceipt { debit, fee, net })
            }
            Err(error) => {
                store.restore(store_checkpoint);
                fees.restore(fees_checkpoint);
                Err(error)
            }
        }
    }

    /// Redeem project tokens against overflow, paying the reclaim to
    /// `beneficiary`. Burning the tokens is the token-supply component's
    /// job.
    pub fn redeem_tokens_of(
        &self,
        holder: &str,
        project: ProjectId,
        token_count: u128,
        beneficiary: &str,
        memo: &str,
        metadata: &[u8],
    ) -> Result<RedemptionReceipt> {
        let (receipt, delegate) = {
            let mut state = self.state.write();
            let checkpoint = state.store.snapshot();

            let record = state.store.record_redemption_for(
                &self.ctx,
                holder,
                project,
                token_count,
                beneficiary,
                memo,
                metadata,
            )?;

            if record.reclaim > 0 {
                if let Err(fault) = self
                    .mover
                    .transfer(&self.ctx.token, beneficiary, record.reclaim)
                {
                    state.store.restore(checkpoint);
                    return Err(TerminalError::Transfer(fault));
                }
            }

            state.journal.record(AuditEvent::Redemption {
                project,
                holder: holder.to_string(),
                token_count,
                reclaimed: record.reclaim,
            });
            let context = record.delegate.map(|hook| {
                (
                    hook,
                    DidRedeem {
                        terminal: self.ctx.address.clone(),
                        holder: holder.to_string(),
                        project,
                        token_count,
                        reclaimed: record.reclaim,
                        beneficiary: beneficiary.to_string(),
                        memo: record.memo.clone(),
                    },
                )
            });
            (
                RedemptionReceipt {
                    reclaimed: record.reclaim,
                    memo: record.memo,
                },
                context,
            )
        };

        if let Some((hook, context)) = delegate {
            hook.did_redeem(&context);
        }
        Ok(receipt)
    }

    /// Hand a project's entire balance to a successor terminal
    pub fn migrate(&self, project: ProjectId, successor: &Arc<dyn TerminalHandle>) -> Result<u128> {
        let mut state = self.state.write();
        let checkpoint = state.store.snapshot();

        let balance = state.store.record_migration(&self.ctx, project);
        if balance > 0 {
            if let Err(fault) = self
                .mover
                .transfer(&self.ctx.token, &successor.address(), balance)
            {
                state.store.restore(checkpoint);
                return Err(TerminalError::Transfer(fault));
            }
            if let Err(fault) =
                successor.add_to_balance_of(project, balance, &self.ctx.token, "migration")
            {
                state.store.restore(checkpoint);
                return Err(TerminalError::Successor(fault));
            }
        }

        state.journal.record(AuditEvent::Migration {
            project,
            balance,
            successor: successor.address(),
        });
        Ok(balance)
    }

    /// Settle every held fee for `project` to the protocol project
    pub fn process_fees(&self, project: ProjectId) -> Result<u128> {
        let mut state = self.state.write();
        let EngineState {
            store,
            fees,
            journal,
        } = &mut *state;

        let settled = fees.process_fees(&self.ctx, store, project)?;
        if settled > 0 {
            journal.record(AuditEvent::HeldFeesProcessed { project, settled });
        }
        Ok(settled)
    }

    // ---- persistence -----------------------------------------------------

    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.state.read();
        EngineSnapshot {
            ledger: state.store.snapshot(),
            fees: state.fees.snapshot(),
            journal: state.journal.clone(),
        }
    }

    pub fn restore(&self, snapshot: EngineSnapshot) {
        let mut state = self.state.write();
        state.store.restore(snapshot.ledger);
        state.fees.restore(snapshot.fees);
        state.journal = snapshot.journal;
    }

    pub fn persist_to(&self, snapshots: &SnapshotStore, name: &str) -> Result<()> {
        snapshots.save(name, &self.snapshot())?;
        Ok(())
    }

    pub fn load_from(&self, snapshots: &SnapshotStore, name: &str) -> Result<()> {
        let snapshot: EngineSnapshot = snapshots.load(name)?;
        self.restore(snapshot);
        Ok(())
    }
}

impl TerminalHandle for PaymentTerminal {
    fn address(&self) -> String {
        self.ctx.address.clone()
    }

    fn token(&self) -> String {
        self.ctx.token.clone()
    }

    fn decimals(&self) -> u32 {
        self.ctx.decimals
    }

    fn currency(&self) -> Currency {
        self.ctx.currency
    }

    fn pay(
        &self,
        sender: &str,
        project: ProjectId,
        amount: u128,
        token: &str,
        beneficiary: &str,
        memo: &str,
    ) -> std::result::Result<(), CollaboratorFault> {
        if token != self.ctx.token {
            return Err(CollaboratorFault::Call(format!(
                "terminal {} does not accept {token}",
                self.ctx.address
            )));
        }
        PaymentTerminal::pay(self, sender, amount, project, beneficiary, memo, &[])
            .map(|_| ())
            .map_err(|error| CollaboratorFault::Call(error.to_string()))
    }

    fn add_to_balance_of(
        &self,
        project: ProjectId,
        amount: u128,
        token: &str,
        memo: &str,
    ) -> std::result::Result<(), CollaboratorFault> {
        if token != self.ctx.token {
            return Err(CollaboratorFault::Call(format!(
                "terminal {} does not accept {token}",
                self.ctx.address
            )));
        }
        PaymentTerminal::add_to_balance_of(self, project, amount, memo)
            .map(|_| ())
            .map_err(|error| CollaboratorFault::Call(error.to_string()))
    }

    fn current_overflow_of(
        &self,
        project: ProjectId,
        decimals: u32,
        currency: Currency,
    ) -> std::result::Result<u128, CollaboratorFault> {
        let local = PaymentTerminal::current_overflow_of(self, project)
            .map_err(|error| CollaboratorFault::Call(error.to_string()))?;
        let converted = convert_amount(local, self.ctx.currency, currency, &*self.prices)
            .map_err(|error| CollaboratorFault::Call(error.to_string()))?;
        rescale_decimals(converted, self.ctx.decimals, decimals)
            .map_err(|error| CollaboratorFault::Call(error.to_string()))
    }
}
