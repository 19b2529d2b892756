//! In-memory collaborators for exercising the engine in tests
//!
//! Simple table-backed implementations of every collaborator trait, with
//! interior mutability so tests can reconfigure cycles, prices and limits
//! mid-scenario, plus recording fakes with fault injection for the
//! capability objects the engine calls out to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::split::Split;
use crate::traits::{
    AllocationContext, CollaboratorFault, Controller, Directory, FeeGauge, FundingCycleProvider,
    PayDataSource, PriceOracle, RedeemDataSource, SplitAllocator, SplitsStore, TerminalHandle,
    TokenMover,
};
use crate::types::{BallotState, Currency, FundingCycle, ProjectId};

/// Table-backed funding-cycle provider
#[derive(Default)]
pub struct StaticCycles {
    cycles: Mutex<HashMap<ProjectId, FundingCycle>>,
    ballots: Mutex<HashMap<ProjectId, BallotState>>,
    pay_sources: Mutex<HashMap<ProjectId, Arc<dyn PayDataSource>>>,
    redeem_sources: Mutex<HashMap<ProjectId, Arc<dyn RedeemDataSource>>>,
}

impl StaticCycles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cycle(&self, project: ProjectId, cycle: FundingCycle) {
        self.cycles.lock().unwrap().insert(project, cycle);
    }

    pub fn set_ballot(&self, project: ProjectId, state: BallotState) {
        self.ballots.lock().unwrap().insert(project, state);
    }

    pub fn set_pay_data_source(&self, project: ProjectId, source: Arc<dyn PayDataSource>) {
        self.pay_sources.lock().unwrap().insert(project, source);
    }

    pub fn set_redeem_data_source(&self, project: ProjectId, source: Arc<dyn RedeemDataSource>) {
        self.redeem_sources.lock().unwrap().insert(project, source);
    }
}

impl FundingCycleProvider for StaticCycles {
    fn current_of(&self, project: ProjectId) -> Option<FundingCycle> {
        self.cycles.lock().unwrap().get(&project).cloned()
    }

    fn ballot_state_of(&self, project: ProjectId) -> BallotState {
        self.ballots
            .lock()
            .unwrap()
            .get(&project)
            .copied()
            .unwrap_or(BallotState::Approved)
    }

    fn pay_data_source_of(&self, project: ProjectId) -> Option<Arc<dyn PayDataSource>> {
        self.pay_sources.lock().unwrap().get(&project).cloned()
    }

    fn redeem_data_source_of(&self, project: ProjectId) -> Option<Arc<dyn RedeemDataSource>> {
        self.redeem_sources.lock().unwrap().get(&project).cloned()
    }
}

/// Table-backed controller: limits keyed by (project, configuration),
/// terminal and token ignored
#[derive(Default)]
pub struct StaticController {
    distribution_limits: Mutex<HashMap<(ProjectId, u64), (u128, Currency)>>,
    overflow_allowances: Mutex<HashMap<(ProjectId, u64), (u128, Currency)>>,
    total_supplies: Mutex<HashMap<ProjectId, u128>>,
    token_balances: Mutex<HashMap<(String, ProjectId), u128>>,
}

impl StaticController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_distribution_limit(
        &self,
        project: ProjectId,
        configuration: u64,
        amount: u128,
        currency: Currency,
    ) {
        self.distribution_limits
            .lock()
            .unwrap()
            .insert((project, configuration), (amount, currency));
    }

    pub fn set_overflow_allowance(
        &self,
        project: ProjectId,
        configuration: u64,
        amount: u128,
        currency: Currency,
    ) {
        self.overflow_allowances
            .lock()
            .unwrap()
            .insert((project, configuration), (amount, currency));
    }

    pub fn set_total_supply(&self, project: ProjectId, supply: u128) {
        self.total_supplies.lock().unwrap().insert(project, supply);
    }

    pub fn set_token_balance(&self, holder: &str, project: ProjectId, balance: u128) {
        self.token_balances
            .lock()
            .unwrap()
            .insert((holder.to_string(), project), balance);
    }
}

impl Controller for StaticController {
    fn distribution_limit_of(
        &self,
        project: ProjectId,
        configuration: u64,
        _terminal: &str,
        _token: &str,
    ) -> (u128, Currency) {
        self.distribution_limits
            .lock()
            .unwrap()
            .get(&(project, configuration))
            .copied()
            .unwrap_or((0, Currency(0)))
    }

    fn overflow_allowance_of(
        &self,
        project: ProjectId,
        configuration: u64,
        _terminal: &str,
        _token: &str,
    ) -> (u128, Currency) {
        self.overflow_allowances
            .lock()
            .unwrap()
            .get(&(project, configuration))
            .copied()
            .unwrap_or((0, Currency(0)))
    }

    fn total_outstanding_tokens_of(&self, project: ProjectId) -> u128 {
        self.total_supplies
            .lock()
            .unwrap()
            .get(&project)
            .copied()
            .unwrap_or(0)
    }

    fn token_balance_of(&self, holder: &str, project: ProjectId) -> u128 {
        self.token_balances
            .lock()
            .unwrap()
            .get(&(holder.to_string(), project))
            .copied()
            .unwrap_or(0)
    }
}

/// Table-backed price oracle; unknown pairs fault
#[derive(Default)]
pub struct StaticPrices {
    rates: Mutex<HashMap<(Currency, Currency), u128>>,
}

impl StaticPrices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Units of `currency` per one `base`, at the requested fidelity
    pub fn set_price(&self, currency: Currency, base: Currency, rate: u128) {
        self.rates.lock().unwrap().insert((currency, base), rate);
    }
}

impl PriceOracle for StaticPrices {
    fn price_for(
        &self,
        currency: Currency,
        base: Currency,
        _decimals: u32,
    ) -> Result<u128, CollaboratorFault> {
        self.rates
            .lock()
            .unwrap()
            .get(&(currency, base))
            .copied()
            .ok_or_else(|| CollaboratorFault::Call(format!("no pair {currency}/{base}")))
    }
}

/// Fee gauge returning a fixed outcome
pub enum GaugeBehavior {
    Discount(u64),
    Fault,
    OutOfRange,
}

pub struct StaticGauge {
    pub behavior: GaugeBehavior,
}

impl FeeGauge for StaticGauge {
    fn current_discount_for(&self, _project: ProjectId) -> Result<u64, CollaboratorFault> {
        match self.behavior {
            GaugeBehavior::Discount(discount) => Ok(discount),
            GaugeBehavior::Fault => Err(CollaboratorFault::Call("gauge offline".to_string())),
            GaugeBehavior::OutOfRange => Ok(u64::MAX),
        }
    }
}

/// Table-backed splits store with registered allocators
#[derive(Default)]
pub struct StaticSplits {
    splits: Mutex<HashMap<(ProjectId, u64, u64), Vec<Split>>>,
    allocators: Mutex<HashMap<String, Arc<dyn SplitAllocator>>>,
}

impl StaticSplits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_splits(&self, project: ProjectId, domain: u64, group: u64, splits: Vec<Split>) {
        self.splits
            .lock()
            .unwrap()
            .insert((project, domain, group), splits);
    }

    pub fn register_allocator(&self, allocator: Arc<dyn SplitAllocator>) {
        self.allocators
            .lock()
            .unwrap()
            .insert(allocator.address(), allocator);
    }
}

impl SplitsStore for StaticSplits {
    fn splits_of(&self, project: ProjectId, domain: u64, group: u64) -> Vec<Split> {
        self.splits
            .lock()
            .unwrap()
            .get(&(project, domain, group))
            .cloned()
            .unwrap_or_default()
    }

    fn allocator_of(&self, address: &str) -> Option<Arc<dyn SplitAllocator>> {
        self.allocators.lock().unwrap().get(address).cloned()
    }
}

/// Table-backed terminal directory
#[derive(Default)]
pub struct StaticDirectory {
    terminals: Mutex<HashMap<ProjectId, Vec<Arc<dyn TerminalHandle>>>>,
    primaries: Mutex<HashMap<(ProjectId, String), Arc<dyn TerminalHandle>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_terminal(&self, project: ProjectId, handle: Arc<dyn TerminalHandle>) {
        self.terminals
            .lock()
            .unwrap()
            .entry(project)
            .or_default()
            .push(handle);
    }

    /// Register `handle` as the project's primary for its token, and list it
    pub fn set_primary(&self, project: ProjectId, handle: Arc<dyn TerminalHandle>) {
        self.primaries
            .lock()
            .unwrap()
            .insert((project, handle.token()), handle.clone());
        self.add_terminal(project, handle);
    }
}

impl Directory for StaticDirectory {
    fn terminals_of(&self, project: ProjectId) -> Vec<Arc<dyn TerminalHandle>> {
        self.terminals
            .lock()
            .unwrap()
            .get(&project)
            .cloned()
            .unwrap_or_default()
    }

    fn primary_terminal_of(
        &self,
        project: ProjectId,
        token: &str,
    ) -> Option<Arc<dyn TerminalHandle>> {
        self.primaries
            .lock()
            .unwrap()
            .get(&(project, token.to_string()))
            .cloned()
    }

    fn is_terminal_of(&self, project: ProjectId, terminal: &str) -> bool {
        self.terminals_of(project)
            .iter()
            .any(|handle| handle.address() == terminal)
    }
}

/// A recorded peer-terminal interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalCall {
    pub sender: String,
    pub project: ProjectId,
    pub amount: u128,
    pub token: String,
    pub counterparty: String,
    pub memo: String,
}

/// Recording peer terminal with a fixed overflow figure and fault injection
pub struct RecordingTerminal {
    address: String,
    token: String,
    decimals: u32,
    currency: Currency,
    pub overflow: Mutex<u128>,
    pub paid: Mutex<Vec<TerminalCall>>,
    pub credited: Mutex<Vec<TerminalCall>>,
    pub fail: AtomicBool,
}

impl RecordingTerminal {
    pub fn new(address: &str, token: &str, decimals: u32, currency: Currency) -> Self {
        Self {
            address: address.to_string(),
            token: token.to_string(),
            decimals,
            currency,
            overflow: Mutex::new(0),
            paid: Mutex::new(Vec::new()),
            credited: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    fn check_fault(&self) -> Result<(), CollaboratorFault> {
        if self.fail.load(Ordering::SeqCst) {
            Err(CollaboratorFault::Call(format!(
                "terminal {} offline",
                self.address
            )))
        } else {
            Ok(())
        }
    }
}

impl TerminalHandle for RecordingTerminal {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn token(&self) -> String {
        self.token.clone()
    }

    fn decimals(&self) -> u32 {
        self.decimals
    }

    fn currency(&self) -> Currency {
        self.currency
    }

    fn pay(
        &self,
        sender: &str,
        project: ProjectId,
        amount: u128,
        token: &str,
        beneficiary: &str,
        memo: &str,
    ) -> Result<(), CollaboratorFault> {
        self.check_fault()?;
        self.paid.lock().unwrap().push(TerminalCall {
            sender: sender.to_string(),
            project,
            amount,
            token: token.to_string(),
            counterparty: beneficiary.to_string(),
            memo: memo.to_string(),
        });
        Ok(())
    }

    fn add_to_balance_of(
        &self,
        project: ProjectId,
        amount: u128,
        token: &str,
        memo: &str,
    ) -> Result<(), CollaboratorFault> {
        self.check_fault()?;
        self.credited.lock().unwrap().push(TerminalCall {
            sender: String::new(),
            project,
            amount,
            token: token.to_string(),
            counterparty: String::new(),
            memo: memo.to_string(),
        });
        Ok(())
    }

    fn current_overflow_of(
        &self,
        _project: ProjectId,
        _decimals: u32,
        _currency: Currency,
    ) -> Result<u128, CollaboratorFault> {
        self.check_fault()?;
        Ok(*self.overflow.lock().unwrap())
    }
}

/// Recording token mover with per-destination fault injection
#[derive(Default)]
pub struct RecordingMover {
    pub transfers: Mutex<Vec<(String, String, u128)>>,
    pub fail_for: Mutex<Vec<String>>,
}

impl RecordingMover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_transfers_to(&self, address: &str) {
        self.fail_for.lock().unwrap().push(address.to_string());
    }

    pub fn total_to(&self, address: &str) -> u128 {
        self.transfers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, to, _)| to == address)
            .map(|(_, _, amount)| amount)
            .sum()
    }
}

impl TokenMover for RecordingMover {
    fn transfer(&self, token: &str, to: &str, amount: u128) -> Result<(), CollaboratorFault> {
        if self.fail_for.lock().unwrap().iter().any(|addr| addr == to) {
            return Err(CollaboratorFault::Call(format!("transfer to {to} failed")));
        }
        self.transfers
            .lock()
            .unwrap()
            .push((token.to_string(), to.to_string(), amount));
        Ok(())
    }
}

/// Recording allocator with fault injection
pub struct RecordingAllocator {
    address: String,
    pub allocations: Mutex<Vec<AllocationContext>>,
    pub fail: AtomicBool,
}

impl RecordingAllocator {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            allocations: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }
}

impl SplitAllocator for RecordingAllocator {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn allocate(&self, context: &AllocationContext) -> Result<(), CollaboratorFault> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorFault::Call(format!(
                "allocator {} failed",
                self.address
            )));
        }
        self.allocations.lock().unwrap().push(context.clone());
        Ok(())
    }
}
