//! Split resolution and payout execution
//!
//! Distribution runs in two phases. `plan` resolves every split to a
//! concrete target (allocator capability, peer terminal, plain address, or
//! the caller), so configuration absences such as a missing allocator or
//! terminal fail before the caller commits any debit. `execute` then runs
//! the transfers, pricing the fee on each through the FeeEngine.

use std::sync::Arc;

use economics::mul_div;
use fees::FeeEngine;
use fountain_core::constants::SPLITS_TOTAL_PERCENT;
use fountain_core::{
    AllocationContext, Directory, ProjectId, Split, SplitAllocator, SplitsStore, TerminalContext,
    TerminalHandle, TokenMover,
};
use ledger::LedgerStore;

use crate::error::{Result, RouterError};

enum PlannedTarget {
    Allocator(Arc<dyn SplitAllocator>),
    ProjectTerminal {
        project: ProjectId,
        handle: Arc<dyn TerminalHandle>,
        beneficiary: String,
        add_to_balance: bool,
        /// Routing stays inside this very terminal: no transfer, no fee
        same_terminal: bool,
    },
    Beneficiary(String),
    Caller,
}

struct PlannedPayout {
    split: Split,
    gross: u128,
    target: PlannedTarget,
    /// Addresses whose feeless registration waives this payout's fee
    fee_parties: Vec<String>,
}

/// A fully resolved fan-out, ready to execute
pub struct PayoutPlan {
    payouts: Vec<PlannedPayout>,
    /// Remainder owed to the project owner after all splits
    pub leftover: u128,
    /// Total amount the plan distributes, leftover included
    pub amount: u128,
    group: u64,
}

/// One executed transfer
#[derive(Debug, Clone)]
pub struct ExecutedPayout {
    pub split: Split,
    pub gross: u128,
    pub fee: u128,
    pub net: u128,
}

/// Outcome of a distribution fan-out
#[derive(Debug, Clone, Default)]
pub struct DistributionSummary {
    pub payouts: Vec<ExecutedPayout>,
    pub total_fee: u128,
    pub leftover_gross: u128,
    pub leftover_net: u128,
}

/// Resolves split lists into transfers
pub struct PayoutRouter {
    splits: Arc<dyn SplitsStore>,
    directory: Arc<dyn Directory>,
    mover: Arc<dyn TokenMover>,
}

impl PayoutRouter {
    pub fn new(
        splits: Arc<dyn SplitsStore>,
        directory: Arc<dyn Directory>,
        mover: Arc<dyn TokenMover>,
    ) -> Self {
        Self {
            splits,
            directory,
            mover,
        }
    }

    /// Resolve the split list of (project, domain, group) over `amount`.
    ///
    /// Fails if a named allocator is unregistered, a target project has no
    /// terminal for the token, or the percents consume more than `amount`.
    pub fn plan(
        &self,
        ctx: &TerminalContext,
        project: ProjectId,
        domain: u64,
        group: u64,
        amount: u128,
        caller: &str,
    ) -> Result<PayoutPlan> {
        let splits = self.splits.splits_of(project, domain, group);
        let mut payouts = Vec::with_capacity(splits.len());
        let mut leftover = amount;

        for split in splits {
            let gross = mul_div(amount, split.percent as u128, SPLITS_TOTAL_PERCENT as u128)?;
            leftover = leftover
                .checked_sub(gross)
                .ok_or(RouterError::SplitsExceedAmount)?;

            let mut fee_parties = vec![caller.to_string()];
            let target = if let Some(address) = &split.allocator {
                let allocator = self
                    .splits
                    .allocator_of(address)
                    .ok_or_else(|| RouterError::AllocatorNotFound(address.clone()))?;
                fee_parties.push(allocator.address());
                PlannedTarget::Allocator(allocator)
            } else if let Some(target_project) = split.project_id {
                let handle = self
                    .directory
                    .primary_terminal_of(target_project, &ctx.token)
                    .ok_or_else(|| RouterError::TerminalNotFound {
                        project: target_project,
                        token: ctx.token.clone(),
                    })?;
                fee_parties.push(handle.address());
                let beneficiary = split
                    .beneficiary
                    .clone()
                    .unwrap_or_else(|| caller.to_string());
                PlannedTarget::ProjectTerminal {
                    project: target_project,
                    same_terminal: handle.address() == ctx.address,
                    handle,
                    beneficiary,
                    add_to_balance: split.prefer_add_to_balance,
                }
            } else if let Some(beneficiary) = &split.beneficiary {
                PlannedTarget::Beneficiary(beneficiary.clone())
            } else {
                PlannedTarget::Caller
            };

            payouts.push(PlannedPayout {
                split,
                gross,
                target,
                fee_parties,
            });
        }

        Ok(PayoutPlan {
            payouts,
            leftover,
            amount,
            group,
        })
    }

    /// Run a resolved plan: price the fee on each transfer, defer or settle
    /// it per `hold_fees`, move the net, and pay the leftover to `owner`.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &self,
        ctx: &TerminalContext,
        store: &mut LedgerStore,
        fees: &mut FeeEngine,
        plan: PayoutPlan,
        project: ProjectId,
        caller: &str,
        owner: &str,
        hold_fees: bool,
        discount: u64,
    ) -> Result<DistributionSummary> {
        let mut summary = DistributionSummary::default();

        for payout in plan.payouts {
            if payout.gross == 0 {
                continue;
            }

            let exempt = matches!(
                payout.target,
                PlannedTarget::ProjectTerminal {
                    same_terminal: true,
                    ..
                }
            );
            let parties: Vec<&str> = payout.fee_parties.iter().map(String::as_str).collect();
            let fee = if exempt {
                0
            } else {
                fees.fee_for(project, payout.gross, discount, &parties)?
            };
            let net = payout.gross - fee;

            if fee > 0 {
                if hold_fees {
                    fees.hold_fee(project, payout.gross, discount, owner);
                } else {
                    fees.process_fee(ctx, store, fee, owner)?;
                }
            }

            match payout.target {
                PlannedTarget::Allocator(allocator) => {
                    let context = AllocationContext {
                        token: ctx.token.clone(),
                        amount: net,
                        decimals: ctx.decimals,
                        project,
                        group: plan.group,
                        split: payout.split.clone(),
                    };
                    allocator
                        .allocate(&context)
                        .map_err(RouterError::AllocatorFault)?;
                }
                PlannedTarget::ProjectTerminal {
                    project: target_project,
                    handle,
                    beneficiary,
                    add_to_balance,
                    same_terminal,
                } => {
                    if same_terminal {
                        // Funds never leave this terminal; only the shared
                        // ledger moves
                        if add_to_balance {
                            store.record_added_balance_for(ctx, target_project, net)?;
                        } else {
                            store.record_payment_from(
                                ctx,
                                caller,
                                net,
                                target_project,
                                &beneficiary,
                                "payout",
                                &[],
                            )?;
                        }
                    } else {
                        self.mover
                            .transfer(&ctx.token, &handle.address(), net)
                            .map_err(RouterError::TransferFault)?;
                        if add_to_balance {
                            handle
                                .add_to_balance_of(target_project, net, &ctx.token, "payout")
                                .map_err(RouterError::TerminalFault)?;
                        } else {
                            handle
                                .pay(
                                    &ctx.address,
                                    target_project,
                                    net,
                                    &ctx.token,
                                    &beneficiary,
                                    "payout",
                                )
                                .map_err(RouterError::TerminalFault)?;
                        }
                    }
                }
                PlannedTarget::Beneficiary(address) => {
                    self.mover
                        .transfer(&ctx.token, &address, net)
                        .map_err(RouterError::TransferFault)?;
                }
                PlannedTarget::Caller => {
                    self.mover
                        .transfer(&ctx.token, caller, net)
                        .map_err(RouterError::TransferFault)?;
                }
            }

            summary.total_fee += fee;
            summary.payouts.push(ExecutedPayout {
                split: payout.split,
                gross: payout.gross,
                fee,
                net,
            });
        }

        if plan.leftover > 0 {
            let fee = fees.fee_for(project, plan.leftover, discount, &[caller])?;
            let net = plan.leftover - fee;
            if fee > 0 {
                if hold_fees {
                    fees.hold_fee(project, plan.leftover, discount, owner);
                } else {
                    fees.process_fee(ctx, store, fee, owner)?;
                }
            }
            self.mover
                .transfer(&ctx.token, owner, net)
                .map_err(RouterError::TransferFault)?;
            summary.total_fee += fee;
            summary.leftover_gross = plan.leftover;
            summary.leftover_net = net;
        }

        log::info!(
            "{}: fanned out {} across {} splits (fees {}, leftover {})",
            project,
            plan.amount,
            summary.payouts.len(),
            summary.total_fee,
            summary.leftover_gross
        );
        Ok(summary)
    }
}
