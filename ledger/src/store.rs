//! The keyed balance and spending-ceiling store
//!
//! Rows are keyed by (terminal address, project) plus the cycle number or
//! configuration for the two used-counters. Operations validate everything
//! first and mutate last, so a failed call leaves no partial state. External
//! hooks (data sources, delegates) never run inside a mutation: operations
//! hand any delegate back to the caller for invocation after commit.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use economics::{
    convert_amount, effective_redemption_rate, mul_div, pow10, reclaimable_amount,
    rescale_decimals, MathError,
};
use fountain_core::{
    Controller, Currency, Directory, FundingCycle, FundingCycleProvider, PayDelegate, PayParams,
    PriceOracle, ProjectId, RedeemParams, RedemptionDelegate, TerminalContext,
};

use crate::error::{LedgerError, Result};

type BalanceKey = (String, ProjectId);
type CycleKey = (String, ProjectId, u64);

/// Outcome of recording a payment
pub struct PaymentRecord {
    pub cycle: FundingCycle,
    /// Project tokens the payment is worth at the applied weight; minting
    /// them is the token-supply component's job
    pub token_count: u128,
    pub memo: String,
    pub delegate: Option<Arc<dyn PayDelegate>>,
}

/// Outcome of recording a redemption
pub struct RedemptionRecord {
    pub cycle: FundingCycle,
    /// Amount debited from the project's balance for the holder
    pub reclaim: u128,
    pub memo: String,
    pub delegate: Option<Arc<dyn RedemptionDelegate>>,
}

/// Per-(terminal, project) treasury ledger
pub struct LedgerStore {
    balances: HashMap<BalanceKey, u128>,
    /// Consumed distribution limit, keyed by funding-cycle number: a
    /// recurring ceiling that resets on every rollover
    used_distribution_limit: HashMap<CycleKey, u128>,
    /// Consumed overflow allowance, keyed by funding-cycle configuration: a
    /// one-time ceiling that survives automatic rollovers
    used_overflow_allowance: HashMap<CycleKey, u128>,
    cycles: Arc<dyn FundingCycleProvider>,
    controller: Arc<dyn Controller>,
    prices: Arc<dyn PriceOracle>,
    directory: Arc<dyn Directory>,
}

impl LedgerStore {
    pub fn new(
        cycles: Arc<dyn FundingCycleProvider>,
        controller: Arc<dyn Controller>,
        prices: Arc<dyn PriceOracle>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            balances: HashMap::new(),
            used_distribution_limit: HashMap::new(),
            used_overflow_allowance: HashMap::new(),
            cycles,
            controller,
            prices,
            directory,
        }
    }

    /// Recorded balance for (terminal, project)
    pub fn balance_of(&self, terminal: &str, project: ProjectId) -> u128 {
        self.balances
            .get(&(terminal.to_string(), project))
            .copied()
            .unwrap_or(0)
    }

    /// Distribution limit consumed within one cycle number
    pub fn used_distribution_limit_of(
        &self,
        terminal: &str,
        project: ProjectId,
        number: u64,
    ) -> u128 {
        self.used_distribution_limit
            .get(&(terminal.to_string(), project, number))
            .copied()
            .unwrap_or(0)
    }

    /// Overflow allowance consumed within one configuration
    pub fn used_overflow_allowance_of(
        &self,
        terminal: &str,
        project: ProjectId,
        configuration: u64,
    ) -> u128 {
        self.used_overflow_allowance
            .get(&(terminal.to_string(), project, configuration))
            .copied()
            .unwrap_or(0)
    }

    fn require_cycle(&self, project: ProjectId) -> Result<FundingCycle> {
        self.cycles
            .current_of(project)
            .ok_or(LedgerError::InvalidFundingCycle(project))
    }

    fn credit(&mut self, terminal: &str, project: ProjectId, amount: u128) -> Result<()> {
        let entry = self
            .balances
            .entry((terminal.to_string(), project))
            .or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or(MathError::Overflow("balance credit"))?;
        Ok(())
    }

    fn debit(&mut self, terminal: &str, project: ProjectId, amount: u128) {
        // Callers have already proven amount <= balance
        if let Some(entry) = self.balances.get_mut(&(terminal.to_string(), project)) {
            *entry = entry.saturating_sub(amount);
        }
    }

    /// Record a deposit. Deposits are never constrained: no ceiling and no
    /// pause flag applies to money coming in.
    pub fn record_added_balance_for(
        &mut self,
        ctx: &TerminalContext,
        project: ProjectId,
        amount: u128,
    ) -> Result<()> {
        self.credit(&ctx.address, project, amount)?;
        log::info!(
            "{}: added {} to balance at terminal {}",
            project,
            amount,
            ctx.address
        );
        Ok(())
    }

    /// Record a payout drawn against the recurring distribution limit.
    ///
    /// `amount` is denominated in the configured limit currency; the
    /// returned debit is in the terminal's own currency.
    pub fn record_distribution_for(
        &mut self,
        ctx: &TerminalContext,
        project: ProjectId,
        amount: u128,
        currency: Currency,
    ) -> Result<(FundingCycle, u128)> {
        let cycle = self.require_cycle(project)?;
        if cycle.metadata.pause_distributions {
            return Err(LedgerError::DistributionPaused(project));
        }

        let (limit, limit_currency) = self.controller.distribution_limit_of(
            project,
            cycle.configuration,
            &ctx.address,
            &ctx.token,
        );
        if currency != limit_currency {
            return Err(LedgerError::CurrencyMismatch {
                got: currency,
                expected: limit_currency,
            });
        }

        let used = self.used_distribution_limit_of(&ctx.address, project, cycle.number);
        let total = used
            .checked_add(amount)
            .ok_or(MathError::Overflow("used distribution limit"))?;
        if limit == 0 || total > limit {
            return Err(LedgerError::DistributionLimitReached {
                used,
                requested: amount,
                limit,
            });
        }

        let debit = convert_amount(amount, currency, ctx.currency, &*self.prices)?;
        let balance = self.balance_of(&ctx.address, project);
        if debit > balance {
            return Err(LedgerError::InsufficientBalance {
                requested: debit,
                available: balance,
            });
        }

        self.used_distribution_limit
            .insert((ctx.address.clone(), project, cycle.number), total);
        self.debit(&ctx.address, project, debit);
        log::info!(
            "{}: distribution of {} (debit {}) in cycle {} at terminal {}",
            project,
            amount,
            debit,
            cycle.number,
            ctx.address
        );
        Ok((cycle, debit))
    }

    /// Record a payout drawn against the one-time overflow allowance.
    ///
    /// The allowance draws from the same pooled balance as the distribution
    /// limit; it does not pre-subtract limit-reserved funds.
    pub fn record_used_allowance_of(
        &mut self,
        ctx: &TerminalContext,
        project: ProjectId,
        amount: u128,
        currency: Currency,
    ) -> Result<(FundingCycle, u128)> {
        let cycle = self.require_cycle(project)?;
        if cycle.metadata.pause_distributions {
            return Err(LedgerError::DistributionPaused(project));
        }

        let (allowance, allowance_currency) = self.controller.overflow_allowance_of(
            project,
            cycle.configuration,
            &ctx.address,
            &ctx.token,
        );
        if currency != allowance_currency {
            return Err(LedgerError::CurrencyMismatch {
                got: currency,
                expected: allowance_currency,
            });
        }

        let used = self.used_overflow_allowance_of(&ctx.address, project, cycle.configuration);
        let total = used
            .checked_add(amount)
            .ok_or(MathError::Overflow("used overflow allowance"))?;
        if allowance == 0 || total > allowance {
            return Err(LedgerError::OverflowAllowanceReached {
                used,
                requested: amount,
                allowance,
            });
        }

        let debit = convert_amount(amount, currency, ctx.currency, &*self.prices)?;
        let balance = self.balance_of(&ctx.address, project);
        if debit > balance {
            return Err(LedgerError::InsufficientBalance {
                requested: debit,
                available: balance,
            });
        }

        self.used_overflow_allowance
            .insert((ctx.address.clone(), project, cycle.configuration), total);
        self.debit(&ctx.address, project, debit);
        log::info!(
            "{}: allowance draw of {} (debit {}) under configuration {} at terminal {}",
            project,
            amount,
            debit,
            cycle.configuration,
            ctx.address
        );
        Ok((cycle, debit))
    }

    /// Record an incoming payment.
    ///
    /// A zero amount is a clean no-op that still produces a record, so
    /// callers can register intent (memo, delegate hooks) without funds.
    #[allow(clippy::too_many_arguments)]
    pub fn record_payment_from(
        &mut self,
        ctx: &TerminalContext,
        payer: &str,
        amount: u128,
        project: ProjectId,
        beneficiary: &str,
        memo: &str,
        metadata: &[u8],
    ) -> Result<PaymentRecord> {
        let cycle = self.require_cycle(project)?;
        if cycle.metadata.pause_pay {
            return Err(LedgerError::PaymentPaused(project));
        }

        // Weight applies in the cycle's base currency
        let base_amount = convert_amount(
            amount,
            ctx.currency,
            ctx.base_weight_currency,
            &*self.prices,
        )?;

        let mut weight = cycle.weight;
        let mut memo = memo.to_string();
        let mut delegate = None;
        if cycle.metadata.use_data_source_for_pay {
            if let Some(source) = self.cycles.pay_data_source_of(project) {
                let params = PayParams {
                    terminal: ctx.address.clone(),
                    payer: payer.to_string(),
                    amount,
                    project,
                    cycle: cycle.clone(),
                    beneficiary: beneficiary.to_string(),
                    weight,
                    memo: memo.clone(),
                    metadata: metadata.to_vec(),
                };
                let adjusted = source.pay_params(&params).map_err(LedgerError::DataSource)?;
                weight = adjusted.weight;
                memo = adjusted.memo;
                delegate = adjusted.delegate;
            }
        }

        let token_count = mul_div(base_amount, weight, pow10(ctx.decimals)?)?;

        if amount > 0 {
            self.credit(&ctx.address, project, amount)?;
        }
        log::info!(
            "{}: payment of {} from {} at terminal {} worth {} tokens",
            project,
            amount,
            payer,
            ctx.address,
            token_count
        );
        Ok(PaymentRecord {
            cycle,
            token_count,
            memo,
            delegate,
        })
    }

    /// Record a redemption of project tokens against overflow
    #[allow(clippy::too_many_arguments)]
    pub fn record_redemption_for(
        &mut self,
        ctx: &TerminalContext,
        holder: &str,
        project: ProjectId,
        token_count: u128,
        beneficiary: &str,
        memo: &str,
        metadata: &[u8],
    ) -> Result<RedemptionRecord> {
        let cycle = self.require_cycle(project)?;
        if cycle.metadata.pause_redeem {
            return Err(LedgerError::RedemptionPaused(project));
        }

        let holder_balance = self.controller.token_balance_of(holder, project);
        if token_count > holder_balance {
            return Err(LedgerError::InsufficientTokens {
                requested: token_count,
                available: holder_balance,
            });
        }

        let total_supply = self.controller.total_outstanding_tokens_of(project);
        let overflow = if cycle.metadata.use_total_overflow_for_redemptions {
            self.current_total_overflow_of(ctx, project, ctx.decimals, ctx.currency)?
        } else {
            self.overflow_during(ctx, project, &cycle)?
        };

        let rate = effective_redemption_rate(&cycle.metadata, self.cycles.ballot_state_of(project));
        let mut reclaim = reclaimable_amount(overflow, token_count, total_supply, rate)?;

        let mut memo = memo.to_string();
        let mut delegate = None;
        if cycle.metadata.use_data_source_for_redeem {
            if let Some(source) = self.cycles.redeem_data_source_of(project) {
                let params = RedeemParams {
                    terminal: ctx.address.clone(),
                    holder: holder.to_string(),
                    project,
                    cycle: cycle.clone(),
                    token_count,
                    total_supply,
                    overflow,
                    reclaim,
                    beneficiary: beneficiary.to_string(),
                    memo: memo.clone(),
                    metadata: metadata.to_vec(),
                };
                let adjusted = source
                    .redeem_params(&params)
                    .map_err(LedgerError::DataSource)?;
                reclaim = adjusted.reclaim;
                memo = adjusted.memo;
                delegate = adjusted.delegate;
            }
        }

        let balance = self.balance_of(&ctx.address, project);
        if reclaim > balance {
            return Err(LedgerError::InsufficientBalance {
                requested: reclaim,
                available: balance,
            });
        }

        self.debit(&ctx.address, project, reclaim);
        log::info!(
            "{}: redemption of {} tokens by {} reclaims {} at terminal {}",
            project,
            token_count,
            holder,
            reclaim,
            ctx.address
        );
        Ok(RedemptionRecord {
            cycle,
            reclaim,
            memo,
            delegate,
        })
    }

    /// Hand the entire recorded balance to a successor terminal: returns the
    /// balance and zeroes it in one step
    pub fn record_migration(&mut self, ctx: &TerminalContext, project: ProjectId) -> u128 {
        let balance = self
            .balances
            .remove(&(ctx.address.clone(), project))
            .unwrap_or(0);
        log::info!(
            "{}: migrated balance of {} away from terminal {}",
            project,
            balance,
            ctx.address
        );
        balance
    }

    /// Overflow this terminal holds for the project: balance beyond the
    /// remaining distribution limit (converted), floored at zero
    pub fn current_overflow_of(&self, ctx: &TerminalContext, project: ProjectId) -> Result<u128> {
        let cycle = self.require_cycle(project)?;
        self.overflow_during(ctx, project, &cycle)
    }

    fn overflow_during(
        &self,
        ctx: &TerminalContext,
        project: ProjectId,
        cycle: &FundingCycle,
    ) -> Result<u128> {
        let balance = self.balance_of(&ctx.address, project);
        if balance == 0 {
            return Ok(0);
        }

        let (limit, limit_currency) = self.controller.distribution_limit_of(
            project,
            cycle.configuration,
            &ctx.address,
            &ctx.token,
        );
        let used = self.used_distribution_limit_of(&ctx.address, project, cycle.number);
        let remaining = limit.saturating_sub(used);
        let reserved = convert_amount(remaining, limit_currency, ctx.currency, &*self.prices)?;

        Ok(balance.saturating_sub(reserved))
    }

    /// Overflow aggregated across every terminal the project is registered
    /// with, reported in the requested currency and decimals
    pub fn current_total_overflow_of(
        &self,
        ctx: &TerminalContext,
        project: ProjectId,
        decimals: u32,
        currency: Currency,
    ) -> Result<u128> {
        let mut total: u128 = 0;
        for handle in self.directory.terminals_of(project) {
            // This store already knows its own terminal; asking the handle
            // would re-enter the caller's lock
            let overflow = if handle.address() == ctx.address {
                let local = self.current_overflow_of(ctx, project)?;
                let converted = convert_amount(local, ctx.currency, currency, &*self.prices)?;
                rescale_decimals(converted, ctx.decimals, decimals)?
            } else {
                handle
                    .current_overflow_of(project, decimals, currency)
                    .map_err(LedgerError::TerminalFault)?
            };
            total = total
                .checked_add(overflow)
                .ok_or(MathError::Overflow("total overflow"))?;
        }
        Ok(total)
    }

    /// Value `token_count` tokens could currently reclaim, honoring the
    /// cycle's overflow basis and the ballot-sensitive redemption rate
    pub fn current_reclaimable_overflow_of(
        &self,
        ctx: &TerminalContext,
        project: ProjectId,
        token_count: u128,
    ) -> Result<u128> {
        let cycle = self.require_cycle(project)?;
        let overflow = if cycle.metadata.use_total_overflow_for_redemptions {
            self.current_total_overflow_of(ctx, project, ctx.decimals, ctx.currency)?
        } else {
            self.overflow_during(ctx, project, &cycle)?
        };
        let total_supply = self.controller.total_outstanding_tokens_of(project);
        let rate = effective_redemption_rate(&cycle.metadata, self.cycles.ballot_state_of(project));
        Ok(reclaimable_amount(overflow, token_count, total_supply, rate)?)
    }

    /// Same computation from explicit figures, for callers that already
    /// hold the overflow and supply
    pub fn reclaimable_overflow_with(
        &self,
        overflow: u128,
        token_count: u128,
        total_supply: u128,
        redemption_rate: u64,
    ) -> Result<u128> {
        Ok(reclaimable_amount(
            overflow,
            token_count,
            total_supply,
            redemption_rate,
        )?)
    }

    /// Serializable row form of the store
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut balances: Vec<BalanceRow> = self
            .balances
            .iter()
            .map(|((terminal, project), amount)| BalanceRow {
                terminal: terminal.clone(),
                project: *project,
                amount: *amount,
            })
            .collect();
        balances.sort();

        let mut used_distribution_limits: Vec<UsedLimitRow> = self
            .used_distribution_limit
            .iter()
            .map(|((terminal, project, number), amount)| UsedLimitRow {
                terminal: terminal.clone(),
                project: *project,
                number: *number,
                amount: *amount,
            })
            .collect();
        used_distribution_limits.sort();

        let mut used_overflow_allowances: Vec<UsedAllowanceRow> = self
            .used_overflow_allowance
            .iter()
            .map(|((terminal, project, configuration), amount)| UsedAllowanceRow {
                terminal: terminal.clone(),
                project: *project,
                configuration: *configuration,
                amount: *amount,
            })
            .collect();
        used_overflow_allowances.sort();

        LedgerSnapshot {
            balances,
            used_distribution_limits,
            used_overflow_allowances,
        }
    }

    /// Replace the store's rows with a previously captured snapshot
    pub fn restore(&mut self, snapshot: LedgerSnapshot) {
        self.balances = snapshot
            .balances
            .into_iter()
            .map(|row| ((row.terminal, row.project), row.amount))
            .collect();
        self.used_distribution_limit = snapshot
            .used_distribution_limits
            .into_iter()
            .map(|row| ((row.terminal, row.project, row.number), row.amount))
            .collect();
        self.used_overflow_allowance = snapshot
            .used_overflow_allowances
            .into_iter()
            .map(|row| ((row.terminal, row.project, row.configuration), row.amount))
            .collect();
    }
}

/// One recorded balance
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceRow {
    pub terminal: String,
    pub project: ProjectId,
    pub amount: u128,
}

/// Distribution limit consumed within one cycle number
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsedLimitRow {
    pub terminal: String,
    pub project: ProjectId,
    pub number: u64,
    pub amount: u128,
}

/// Overflow allowance consumed within one configuration
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsedAllowanceRow {
    pub terminal: String,
    pub project: ProjectId,
    pub configuration: u64,
    pub amount: u128,
}

/// Row-vector form of the whole store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balances: Vec<BalanceRow>,
    pub used_distribution_limits: Vec<UsedLimitRow>,
    pub used_overflow_allowances: Vec<UsedAllowanceRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fountain_core::testing::{StaticController, StaticCycles, StaticDirectory, StaticPrices};
    use fountain_core::{FundingCycleMetadata, TerminalContext};

    const NATIVE: Currency = Currency(1);
    const USD: Currency = Currency(2);
    const PROJECT: ProjectId = ProjectId(7);
    const ONE: u128 = 1_000_000_000_000_000_000; // 18 decimals

    fn ctx() -> TerminalContext {
        TerminalContext {
            address: "term-1".to_string(),
            token: "native".to_string(),
            decimals: 18,
            currency: NATIVE,
            base_weight_currency: NATIVE,
        }
    }

    fn cycle(number: u64, configuration: u64) -> FundingCycle {
        FundingCycle {
            number,
            configuration,
            start: 0,
            duration: 86400,
            weight: ONE,
            discount_rate: 0,
            metadata: FundingCycleMetadata::default(),
        }
    }

    struct Fixture {
        cycles: Arc<StaticCycles>,
        controller: Arc<StaticController>,
        prices: Arc<StaticPrices>,
        store: LedgerStore,
    }

    fn fixture() -> Fixture {
        let cycles = Arc::new(StaticCycles::new());
        let controller = Arc::new(StaticController::new());
        let prices = Arc::new(StaticPrices::new());
        let directory = Arc::new(StaticDirectory::new());
        let store = LedgerStore::new(
            cycles.clone(),
            controller.clone(),
            prices.clone(),
            directory.clone(),
        );
        Fixture {
            cycles,
            controller,
            prices,
            store,
        }
    }

    #[test]
    fn test_deposit_then_distribute() {
        let mut fx = fixture();
        fx.cycles.set_cycle(PROJECT, cycle(1, 100));
        fx.controller
            .set_distribution_limit(PROJECT, 100, 60 * ONE, NATIVE);

        fx.store
            .record_added_balance_for(&ctx(), PROJECT, 100 * ONE)
            .unwrap();
        let (cycle, debit) = fx
            .store
            .record_distribution_for(&ctx(), PROJECT, 40 * ONE, NATIVE)
            .unwrap();

        assert_eq!(cycle.number, 1);
        assert_eq!(debit, 40 * ONE);
        assert_eq!(fx.store.balance_of("term-1", PROJECT), 60 * ONE);
        assert_eq!(fx.store.used_distribution_limit_of("term-1", PROJECT, 1), 40 * ONE);
    }

    #[test]
    fn test_distribution_requires_matching_currency() {
        let mut fx = fixture();
        fx.cycles.set_cycle(PROJECT, cycle(1, 100));
        fx.controller
            .set_distribution_limit(PROJECT, 100, 60 * ONE, USD);

        let result = fx
            .store
            .record_distribution_for(&ctx(), PROJECT, 10 * ONE, NATIVE);
        assert!(matches!(
            result,
            Err(LedgerError::CurrencyMismatch { got, expected })
                if got == NATIVE && expected == USD
        ));
    }

    #[test]
    fn test_distribution_limit_zero_means_nothing_distributable() {
        let mut fx = fixture();
        fx.cycles.set_cycle(PROJECT, cycle(1, 100));
        fx.controller.set_distribution_limit(PROJECT, 100, 0, NATIVE);
        fx.store
            .record_added_balance_for(&ctx(), PROJECT, 100 * ONE)
            .unwrap();

        let result = fx.store.record_distribution_for(&ctx(), PROJECT, 1, NATIVE);
        assert!(matches!(
            result,
            Err(LedgerError::DistributionLimitReached { limit: 0, .. })
        ));
    }

    #[test]
    fn test_distribution_in_foreign_currency_converts_debit() {
        let mut fx = fixture();
        fx.cycles.set_cycle(PROJECT, cycle(1, 100));
        fx.controller
            .set_distribution_limit(PROJECT, 100, 10_000 * ONE, USD);
        // 2 USD per native unit
        fx.prices.set_price(USD, NATIVE, 2 * ONE);

        fx.store
            .record_added_balance_for(&ctx(), PROJECT, 100 * ONE)
            .unwrap();
        let (_, debit) = fx
            .store
            .record_distribution_for(&ctx(), PROJECT, 10 * ONE, USD)
            .unwrap();

        assert_eq!(debit, 5 * ONE);
        assert_eq!(fx.store.balance_of("term-1", PROJECT), 95 * ONE);
        // The used counter tracks the limit currency, not the debit
        assert_eq!(fx.store.used_distribution_limit_of("term-1", PROJECT, 1), 10 * ONE);
    }

    #[test]
    fn test_failed_distribution_leaves_no_partial_state() {
        let mut fx = fixture();
        fx.cycles.set_cycle(PROJECT, cycle(1, 100));
        fx.controller
            .set_distribution_limit(PROJECT, 100, 500 * ONE, NATIVE);
        fx.store
            .record_added_balance_for(&ctx(), PROJECT, 10 * ONE)
            .unwrap();

        // Within the limit but beyond the balance
        let result = fx
            .store
            .record_distribution_for(&ctx(), PROJECT, 50 * ONE, NATIVE);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(fx.store.balance_of("term-1", PROJECT), 10 * ONE);
        assert_eq!(fx.store.used_distribution_limit_of("term-1", PROJECT, 1), 0);
    }

    #[test]
    fn test_allowance_is_keyed_by_configuration() {
        let mut fx = fixture();
        fx.cycles.set_cycle(PROJECT, cycle(1, 100));
        fx.controller
            .set_overflow_allowance(PROJECT, 100, 30 * ONE, NATIVE);
        fx.store
            .record_added_balance_for(&ctx(), PROJECT, 100 * ONE)
            .unwrap();

        fx.store
            .record_used_allowance_of(&ctx(), PROJECT, 20 * ONE, NATIVE)
            .unwrap();
        assert_eq!(
            fx.store.used_overflow_allowance_of("term-1", PROJECT, 100),
            20 * ONE
        );

        // Rolling the cycle number forward does not free the allowance
        fx.cycles.set_cycle(PROJECT, cycle(2, 100));
        let result = fx
            .store
            .record_used_allowance_of(&ctx(), PROJECT, 20 * ONE, NATIVE);
        assert!(matches!(
            result,
            Err(LedgerError::OverflowAllowanceReached { used, .. }) if used == 20 * ONE
        ));
    }

    #[test]
    fn test_allowance_draws_from_pooled_balance() {
        let mut fx = fixture();
        fx.cycles.set_cycle(PROJECT, cycle(1, 100));
        fx.controller
            .set_distribution_limit(PROJECT, 100, 90 * ONE, NATIVE);
        fx.controller
            .set_overflow_allowance(PROJECT, 100, 50 * ONE, NATIVE);
        fx.store
            .record_added_balance_for(&ctx(), PROJECT, 100 * ONE)
            .unwrap();

        // The limit reserves 90 but does not protect it: the allowance may
        // still draw anything up to the pooled balance
        fx.store
            .record_used_allowance_of(&ctx(), PROJECT, 50 * ONE, NATIVE)
            .unwrap();
        assert_eq!(fx.store.balance_of("term-1", PROJECT), 50 * ONE);
    }

    #[test]
    fn test_pause_flags_block_actions() {
        let mut fx = fixture();
        let mut paused = cycle(1, 100);
        paused.metadata.pause_pay = true;
        paused.metadata.pause_distributions = true;
        paused.metadata.pause_redeem = true;
        fx.cycles.set_cycle(PROJECT, paused);

        let result =
            fx.store
                .record_payment_from(&ctx(), "payer", ONE, PROJECT, "bob", "", &[]);
        assert!(matches!(result, Err(LedgerError::PaymentPaused(_))));

        let result = fx.store.record_distribution_for(&ctx(), PROJECT, ONE, NATIVE);
        assert!(matches!(result, Err(LedgerError::DistributionPaused(_))));

        let result =
            fx.store
                .record_redemption_for(&ctx(), "holder", PROJECT, 1, "bob", "", &[]);
        assert!(matches!(result, Err(LedgerError::RedemptionPaused(_))));
    }

    #[test]
    fn test_payment_requires_funding_cycle() {
        let mut fx = fixture();
        let result =
            fx.store
                .record_payment_from(&ctx(), "payer", ONE, PROJECT, "bob", "", &[]);
        assert!(matches!(result, Err(LedgerError::InvalidFundingCycle(_))));
    }

    #[test]
    fn test_zero_amount_payment_records_intent_only() {
        let mut fx = fixture();
        fx.cycles.set_cycle(PROJECT, cycle(1, 100));

        let record = fx
            .store
            .record_payment_from(&ctx(), "payer", 0, PROJECT, "bob", "hello", &[])
            .unwrap();
        assert_eq!(record.token_count, 0);
        assert_eq!(record.memo, "hello");
        assert_eq!(fx.store.balance_of("term-1", PROJECT), 0);
    }

    #[test]
    fn test_payment_weight_produces_token_count() {
        let mut fx = fixture();
        let mut weighted = cycle(1, 100);
        weighted.weight = 3 * ONE; // 3 tokens per unit paid
        fx.cycles.set_cycle(PROJECT, weighted);

        let record = fx
            .store
            .record_payment_from(&ctx(), "payer", 2 * ONE, PROJECT, "bob", "", &[])
            .unwrap();
        assert_eq!(record.token_count, 6 * ONE);
        assert_eq!(fx.store.balance_of("term-1", PROJECT), 2 * ONE);
    }

    #[test]
    fn test_migration_zeroes_balance() {
        let mut fx = fixture();
        fx.cycles.set_cycle(PROJECT, cycle(1, 100));
        fx.store
            .record_added_balance_for(&ctx(), PROJECT, 42 * ONE)
            .unwrap();

        let migrated = fx.store.record_migration(&ctx(), PROJECT);
        assert_eq!(migrated, 42 * ONE);
        assert_eq!(fx.store.balance_of("term-1", PROJECT), 0);
        assert_eq!(fx.store.record_migration(&ctx(), PROJECT), 0);
    }

    #[test]
    fn test_overflow_is_balance_beyond_remaining_limit() {
        let mut fx = fixture();
        fx.cycles.set_cycle(PROJECT, cycle(1, 100));
        fx.controller
            .set_distribution_limit(PROJECT, 100, 60 * ONE, NATIVE);
        fx.store
            .record_added_balance_for(&ctx(), PROJECT, 100 * ONE)
            .unwrap();

        assert_eq!(fx.store.current_overflow_of(&ctx(), PROJECT).unwrap(), 40 * ONE);

        // Distributing shrinks both the balance and the reserved remainder
        fx.store
            .record_distribution_for(&ctx(), PROJECT, 50 * ONE, NATIVE)
            .unwrap();
        assert_eq!(fx.store.current_overflow_of(&ctx(), PROJECT).unwrap(), 40 * ONE);

        // Limit larger than the balance floors overflow at zero
        fx.controller
            .set_distribution_limit(PROJECT, 100, 500 * ONE, NATIVE);
        assert_eq!(fx.store.current_overflow_of(&ctx(), PROJECT).unwrap(), 0);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut fx = fixture();
        fx.cycles.set_cycle(PROJECT, cycle(1, 100));
        fx.controller
            .set_distribution_limit(PROJECT, 100, 60 * ONE, NATIVE);
        fx.store
            .record_added_balance_for(&ctx(), PROJECT, 100 * ONE)
            .unwrap();
        fx.store
            .record_distribution_for(&ctx(), PROJECT, 10 * ONE, NATIVE)
            .unwrap();

        let snapshot = fx.store.snapshot();
        let mut other = fixture();
        other.store.restore(snapshot);

        assert_eq!(other.store.balance_of("term-1", PROJECT), 90 * ONE);
        assert_eq!(
            other.store.used_distribution_limit_of("term-1", PROJECT, 1),
            10 * ONE
        );
    }
}
