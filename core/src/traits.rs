//! Collaborator interfaces consumed by the treasury engine
//!
//! Every external dependency of the engine is a trait object behind `Arc`:
//! funding-cycle data, spending limits, prices, fee discounts, split lists,
//! peer terminals, and the optional per-cycle data sources. All of them are
//! read/call-only from the engine's perspective and treated as untrusted.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::split::Split;
use crate::types::{BallotState, Currency, FundingCycle, ProjectId};

/// Fault raised by an untrusted external collaborator call
#[derive(Error, Debug)]
pub enum CollaboratorFault {
    #[error("collaborator call failed: {0}")]
    Call(String),

    #[error("collaborator returned an out-of-range value: {0}")]
    OutOfRange(String),
}

/// Source of the current funding cycle and ballot state for a project
pub trait FundingCycleProvider: Send + Sync {
    /// Current cycle for the project, if any is configured
    fn current_of(&self, project: ProjectId) -> Option<FundingCycle>;

    /// State of the project's reconfiguration ballot
    fn ballot_state_of(&self, project: ProjectId) -> BallotState;

    /// Data source consulted on payments, when the cycle opts in
    fn pay_data_source_of(&self, _project: ProjectId) -> Option<Arc<dyn PayDataSource>> {
        None
    }

    /// Data source consulted on redemptions, when the cycle opts in
    fn redeem_data_source_of(&self, _project: ProjectId) -> Option<Arc<dyn RedeemDataSource>> {
        None
    }
}

/// Source of configured spending ceilings and token-supply figures
pub trait Controller: Send + Sync {
    /// Distribution limit for (project, configuration, terminal, token)
    fn distribution_limit_of(
        &self,
        project: ProjectId,
        configuration: u64,
        terminal: &str,
        token: &str,
    ) -> (u128, Currency);

    /// Overflow allowance for (project, configuration, terminal, token)
    fn overflow_allowance_of(
        &self,
        project: ProjectId,
        configuration: u64,
        terminal: &str,
        token: &str,
    ) -> (u128, Currency);

    /// Total outstanding project tokens, including unclaimed reserves
    fn total_outstanding_tokens_of(&self, project: ProjectId) -> u128;

    /// A holder's recorded project-token balance
    fn token_balance_of(&self, holder: &str, project: ProjectId) -> u128;
}

/// Exchange-rate source. Rates are fixed point with the requested number of
/// digits: units of `currency` per one unit of `base`, scaled by
/// `10^decimals`.
pub trait PriceOracle: Send + Sync {
    fn price_for(
        &self,
        currency: Currency,
        base: Currency,
        decimals: u32,
    ) -> Result<u128, CollaboratorFault>;
}

/// Source of per-project fee discounts (parts of `MAX_FEE_DISCOUNT`).
/// A fault or out-of-range result degrades to no discount; it never blocks
/// a payout.
pub trait FeeGauge: Send + Sync {
    fn current_discount_for(&self, project: ProjectId) -> Result<u64, CollaboratorFault>;
}

/// Store of configured split lists and their allocator capabilities
pub trait SplitsStore: Send + Sync {
    /// Ordered splits for (project, domain, group); domain is the funding
    /// cycle configuration the list was fixed for
    fn splits_of(&self, project: ProjectId, domain: u64, group: u64) -> Vec<Split>;

    /// Resolve an allocator address from a split to its capability object
    fn allocator_of(&self, address: &str) -> Option<Arc<dyn SplitAllocator>>;
}

/// Registry of payment terminals across projects
pub trait Directory: Send + Sync {
    /// Every terminal the project is registered with
    fn terminals_of(&self, project: ProjectId) -> Vec<Arc<dyn TerminalHandle>>;

    /// The project's primary terminal accepting `token`, if any
    fn primary_terminal_of(&self, project: ProjectId, token: &str)
        -> Option<Arc<dyn TerminalHandle>>;

    /// Whether `terminal` is registered to `project`
    fn is_terminal_of(&self, project: ProjectId, terminal: &str) -> bool;
}

/// Surface a peer payment terminal exposes to this engine
pub trait TerminalHandle: Send + Sync {
    fn address(&self) -> String;
    fn token(&self) -> String;
    fn decimals(&self) -> u32;
    fn currency(&self) -> Currency;

    /// Record a payment to `project` from `sender`, crediting tokens to
    /// `beneficiary`
    #[allow(clippy::too_many_arguments)]
    fn pay(
        &self,
        sender: &str,
        project: ProjectId,
        amount: u128,
        token: &str,
        beneficiary: &str,
        memo: &str,
    ) -> Result<(), CollaboratorFault>;

    /// Credit `project`'s balance without minting
    fn add_to_balance_of(
        &self,
        project: ProjectId,
        amount: u128,
        token: &str,
        memo: &str,
    ) -> Result<(), CollaboratorFault>;

    /// The project's overflow held by this terminal, reported in the
    /// requested currency and decimals
    fn current_overflow_of(
        &self,
        project: ProjectId,
        decimals: u32,
        currency: Currency,
    ) -> Result<u128, CollaboratorFault>;
}

impl fmt::Debug for dyn TerminalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TerminalHandle({})", self.address())
    }
}

/// Token custody and transfer mechanics, owned by the embedding application
pub trait TokenMover: Send + Sync {
    fn transfer(&self, token: &str, to: &str, amount: u128) -> Result<(), CollaboratorFault>;
}

/// Payment context handed to a pay data source
#[derive(Debug, Clone)]
pub struct PayParams {
    pub terminal: String,
    pub payer: String,
    pub amount: u128,
    pub project: ProjectId,
    pub cycle: FundingCycle,
    pub beneficiary: String,
    /// Weight the engine would apply absent an override
    pub weight: u128,
    pub memo: String,
    pub metadata: Vec<u8>,
}

/// Adjusted payment parameters returned by a pay data source
pub struct PayAdjustment {
    pub weight: u128,
    pub memo: String,
    pub delegate: Option<Arc<dyn PayDelegate>>,
}

/// Per-cycle hook that may override payment weight, memo, and delegate
pub trait PayDataSource: Send + Sync {
    fn pay_params(&self, params: &PayParams) -> Result<PayAdjustment, CollaboratorFault>;
}

/// Redemption context handed to a redeem data source
#[derive(Debug, Clone)]
pub struct RedeemParams {
    pub terminal: String,
    pub holder: String,
    pub project: ProjectId,
    pub cycle: FundingCycle,
    pub token_count: u128,
    pub total_supply: u128,
    pub overflow: u128,
    /// Reclaim the curve produced absent an override
    pub reclaim: u128,
    pub beneficiary: String,
    pub memo: String,
    pub metadata: Vec<u8>,
}

/// Adjusted redemption parameters returned by a redeem data source
pub struct RedeemAdjustment {
    pub reclaim: u128,
    pub memo: String,
    pub delegate: Option<Arc<dyn RedemptionDelegate>>,
}

/// Per-cycle hook that may override the reclaim amount, memo, and delegate
pub trait RedeemDataSource: Send + Sync {
    fn redeem_params(&self, params: &RedeemParams) -> Result<RedeemAdjustment, CollaboratorFault>;
}

/// Completed-payment notification payload
#[derive(Debug, Clone)]
pub struct DidPay {
    pub terminal: String,
    pub payer: String,
    pub project: ProjectId,
    pub amount: u128,
    pub token_count: u128,
    pub beneficiary: String,
    pub memo: String,
}

/// Notified after a payment has fully committed
pub trait PayDelegate: Send + Sync {
    fn did_pay(&self, context: &DidPay);
}

/// Completed-redemption notification payload
#[derive(Debug, Clone)]
pub struct DidRedeem {
    pub terminal: String,
    pub holder: String,
    pub project: ProjectId,
    pub token_count: u128,
    pub reclaimed: u128,
    pub beneficiary: String,
    pub memo: String,
}

/// Notified after a redemption has fully committed
pub trait RedemptionDelegate: Send + Sync {
    fn did_redeem(&self, context: &DidRedeem);
}

/// Context handed to a split allocator
#[derive(Debug, Clone)]
pub struct AllocationContext {
    pub token: String,
    /// Net amount the allocator receives, after any fee
    pub amount: u128,
    pub decimals: u32,
    pub project: ProjectId,
    pub group: u64,
    pub split: Split,
}

/// Capability object a split can route its payout through
pub trait SplitAllocator: Send + Sync {
    /// Address checked against the feeless list
    fn address(&self) -> String;

    fn allocate(&self, context: &AllocationContext) -> Result<(), CollaboratorFault>;
}
