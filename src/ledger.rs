//! The conversion engine
//!
//! `Ledger` keeps one balance per account readable two ways: as a divisible
//! amount and as a set of whole units. Each unit is worth exactly `unit_size`,
//! so an account's total is `loose + units * unit_size`. Every operation first
//! validates everything it will touch, then mutates; an error therefore never
//! leaves a partial change behind.

use crate::approvals::ApprovalStore;
use crate::balances::BalanceLedger;
use crate::collaborators::{AdminGate, PaymentSink, ReceiverRegistry, UnitReceiver};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::events::{self, JournalVerification, LedgerEvent, LedgerObserver, Receipt};
use crate::id::AccountId;
use crate::ledger_traits::{DiscreteUnitLedger, FungibleLedger};
use crate::queue::ReuseQueue;
use crate::registry::UnitRegistry;
use crate::units::{self, Amount, UnitId};
use log::{debug, error, info, warn};

/// Everything a rolled-back batch must restore
#[derive(Debug, Clone, Default)]
struct LedgerState {
    config: LedgerConfig,
    issued_count: u128,
    registry: UnitRegistry,
    queue: ReuseQueue,
    balances: BalanceLedger,
    approvals: ApprovalStore,
}

/// How a debit will be covered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DebitPlan {
    units_to_free: u128,
}

/// Which ids an issuance will hand out
#[derive(Debug, Clone, PartialEq, Eq)]
struct IssuePlan {
    ids: Vec<UnitId>,
    recycled: usize,
    issued_after: u128,
}

/// Hybrid fungible/discrete-unit ledger
pub struct Ledger {
    state: LedgerState,
    journal: Vec<Receipt>,
    admin: Box<dyn AdminGate>,
    payments: Option<Box<dyn PaymentSink>>,
    receivers: ReceiverRegistry,
    observers: Vec<Box<dyn LedgerObserver>>,
    staging: bool,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.state.config)
            .field("issued_count", &self.state.issued_count)
            .field("queue_len", &self.state.queue.len())
            .field("journal_len", &self.journal.len())
            .field("receivers", &self.receivers)
            .finish()
    }
}

impl Ledger {
    /// Create an empty ledger
    ///
    /// # Parameters
    /// * `config` - Unit size, issuance limit and optional caps
    /// * `admin` - Gate consulted for every configuration change and mint
    pub fn new(config: LedgerConfig, admin: impl AdminGate + 'static) -> LedgerResult<Self> {
        config.validate()?;
        info!(
            "Creating ledger with unit size {} and issuance limit {}",
            config.unit_size, config.max_issuable
        );
        Ok(Self {
            state: LedgerState {
                config,
                ..LedgerState::default()
            },
            journal: Vec::new(),
            admin: Box::new(admin),
            payments: None,
            receivers: ReceiverRegistry::new(),
            observers: Vec::new(),
            staging: false,
        })
    }

    /// Attach the treasury that receives paid-issuance payments
    pub fn with_payment_sink(mut self, sink: impl PaymentSink + 'static) -> Self {
        self.payments = Some(Box::new(sink));
        self
    }

    pub fn add_observer(&mut self, observer: impl LedgerObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Register the acknowledgement callback of a program account
    pub fn register_receiver(&mut self, account: AccountId, receiver: impl UnitReceiver + 'static) {
        self.receivers.register(account, Box::new(receiver));
    }

    pub fn unregister_receiver(&mut self, account: &AccountId) -> bool {
        self.receivers.unregister(account)
    }


    pub fn config(&self) -> &LedgerConfig {
        &self.state.config
    }

    pub fn unit_size(&self) -> Amount {
        self.state.config.unit_size
    }

    pub fn max_issuable(&self) -> u128 {
        self.state.config.max_issuable
    }

    pub fn issued_count(&self) -> u128 {
        self.state.issued_count
    }

    /// Units that can still be handed out: fresh ordinals plus banked units
    pub fn remaining_issuance(&self) -> u128 {
        self.max_issuable()
            .saturating_sub(self.state.issued_count)
            .saturating_add(self.state.queue.len() as u128)
    }

    pub fn loose_balance(&self, account: &AccountId) -> Amount {
        self.state.balances.loose(account)
    }

    pub fn locked_balance(&self, account: &AccountId) -> Amount {
        (self.state.registry.owned_count(account) as u128).saturating_mul(self.unit_size())
    }

    /// Whether `value` would be treated as a unit id
    pub fn is_valid_unit_id(&self, value: u128) -> bool {
        units::is_valid_unit_id(value, self.max_issuable())
    }

    pub fn queue_len(&self) -> usize {
        self.state.queue.len()
    }

    /// Banked unit at `index`, counted from the most recently withdrawn
    pub fn queued_unit(&self, index: usize) -> Option<UnitId> {
        self.state.queue.at(index)
    }

    /// Up to `count` banked units starting at `start`
    pub fn queued_units(&self, start: usize, count: usize) -> Vec<UnitId> {
        self.state.queue.iter().skip(start).take(count).collect()
    }

    pub fn journal(&self) -> &[Receipt] {
        &self.journal
    }

    pub fn verify_journal(&self) -> LedgerResult<JournalVerification> {
        events::verify_journal(&self.journal)
    }

    /// Check every structural invariant of the ledger
    ///
    /// # Returns
    /// Ok(()) when consistent, Err describing the first violation otherwise
    pub fn check_invariants(&self) -> Result<(), String> {
        let state = &self.state;
        if !state.registry.is_consistent() {
            return Err("unit registry records disagree with owned-sets".to_string());
        }

        for ordinal in 1..=state.issued_count {
            let id = units::unit_id(ordinal);
            let assigned = state.registry.exists_assigned(id);
            let queued = state.queue.iter().filter(|queued| *queued == id).count();
            match (assigned, queued) {
                (true, 0) | (false, 1) => {}
                _ => {
                    return Err(format!(
                        "unit {:#x} is assigned={} and queued {} times",
                        id, assigned, queued
                    ))
                }
            }
        }
        if state.registry.assigned_count() + state.queue.len() != state.issued_count as usize {
            return Err("units exist outside the issued range".to_string());
        }

        let locked = (state.registry.assigned_count() as u128)
            .checked_mul(state.config.unit_size)
            .ok_or("locked value overflows")?;
        let held = state
            .balances
            .total_loose()
            .checked_add(locked)
            .ok_or("held value overflows")?;
        if held != state.balances.total_supply() {
            return Err(format!(
                "accounts hold {} but total supply is {}",
                held,
                state.balances.total_supply()
            ));
        }
        Ok(())
    }


    /// Approve either a single unit or a fungible allowance
    ///
    /// A value inside the valid unit id range is always a unit approval; any
    /// other value, including the bare id prefix, sets a fungible allowance.
    pub fn approve(
        &mut self,
        caller: &AccountId,
        spender: &AccountId,
        value_or_id: u128,
    ) -> LedgerResult<Receipt> {
        if self.is_valid_unit_id(value_or_id) {
            self.approve_unit(caller, spender, value_or_id)
        } else {
            self.set_allowance(caller, spender, value_or_id)
        }
    }

    /// Delegated transfer of either a single unit or a fungible amount
    pub fn transfer_from(
        &mut self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        value_or_id: u128,
    ) -> LedgerResult<Receipt> {
        if self.is_valid_unit_id(value_or_id) {
            self.transfer_unit_from(caller, from, to, value_or_id)
        } else {
            self.transfer_from_amount(caller, from, to, value_or_id)
        }
    }


    /// Convert as much of the account's loose balance into units as issuance allows
    ///
    /// # Returns
    /// The receipt, or `IssuanceLimitReached` when not even one unit can be issued
    pub fn promote_to_units(&mut self, account: &AccountId) -> LedgerResult<Receipt> {
        if account.is_null() {
            return Err(LedgerError::InvalidRecipient(*account));
        }
        let eligible = self.loose_balance(account) / self.unit_size();
        let available = self.remaining_issuance();
        let count = eligible.min(available);
        if count == 0 {
            return Err(LedgerError::IssuanceLimitReached {
                requested: eligible,
                available,
            });
        }

        let plan = self.plan_issue(count)?;
        self.check_issue_recipient(account, account, &plan)?;
        let cost = count * self.unit_size();

        let mut emitted = Vec::new();
        self.state.balances.debit(account, cost)?;
        self.apply_issue(account, plan, &mut emitted);
        self.commit(emitted)
    }

    /// Issue exactly `count` units to the caller, paid from its loose balance
    pub fn issue_units(&mut self, caller: &AccountId, count: u128) -> LedgerResult<Receipt> {
        if caller.is_null() {
            return Err(LedgerError::InvalidRecipient(*caller));
        }
        if count == 0 {
            return Err(LedgerError::IssuanceLimitReached {
                requested: 0,
                available: self.remaining_issuance(),
            });
        }
        let cost = count
            .checked_mul(self.unit_size())
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let loose = self.loose_balance(caller);
        if loose < cost {
            return Err(LedgerError::InsufficientBalance {
                who: *caller,
                have: loose,
                need: cost,
            });
        }
        let plan = self.plan_issue(count)?;
        self.check_issue_recipient(caller, caller, &plan)?;

        let mut emitted = Vec::new();
        self.state.balances.debit(caller, cost)?;
        self.apply_issue(caller, plan, &mut emitted);
        self.commit(emitted)
    }

    /// Buy `count` units with an external payment
    ///
    /// `payment` must equal `count * unit_price` exactly. It is forwarded to the
    /// treasury before anything is minted; `count * unit_size` of new value is
    /// minted straight into `count` units owned by the caller.
    pub fn issue_paid(
        &mut self,
        caller: &AccountId,
        count: u128,
        payment: Amount,
    ) -> LedgerResult<Receipt> {
        if caller.is_null() {
            return Err(LedgerError::InvalidRecipient(*caller));
        }
        let price = self
            .state
            .config
            .unit_price
            .ok_or_else(|| LedgerError::Config("paid issuance is not enabled".to_string()))?;
        if count == 0 {
            return Err(LedgerError::IssuanceLimitReached {
                requested: 0,
                available: self.remaining_issuance(),
            });
        }
        let expected = count
            .checked_mul(price)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        if payment != expected {
            return Err(LedgerError::IncorrectPaymentValue {
                expected,
                actual: payment,
            });
        }
        let value = count
            .checked_mul(self.unit_size())
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.check_supply_cap(value)?;
        let plan = self.plan_issue(count)?;
        self.check_issue_recipient(caller, caller, &plan)?;

        let sink = self
            .payments
            .as_mut()
            .ok_or_else(|| LedgerError::Config("no treasury configured".to_string()))?;
        sink.forward(caller, payment).map_err(|reason| {
            warn!("Treasury rejected payment of {} from {}: {}", payment, caller, reason);
            LedgerError::PaymentForwardingFailed(reason)
        })?;

        let mut emitted = vec![LedgerEvent::Transfer {
            from: None,
            to: Some(*caller),
            amount: value,
        }];
        self.state.balances.increase_supply(value)?;
        self.apply_issue(caller, plan, &mut emitted);
        self.commit(emitted)
    }


    /// Credit new fungible value to `to` without creating units
    pub fn mint(&mut self, caller: &AccountId, to: &AccountId, amount: Amount) -> LedgerResult<Receipt> {
        self.require_admin(caller, "mint")?;
        if to.is_null() {
            return Err(LedgerError::InvalidRecipient(*to));
        }
        self.check_supply_cap(amount)?;

        let mut emitted = Vec::new();
        self.apply_mint(to, amount, &mut emitted)?;
        self.commit(emitted)
    }

    /// Credit new fungible value to `to` and promote every whole unit of its loose balance
    ///
    /// Promotion is capped by the remaining issuance; an amount smaller than one
    /// unit simply stays loose.
    pub fn mint_with_units(
        &mut self,
        caller: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> LedgerResult<Receipt> {
        self.require_admin(caller, "mint")?;
        if to.is_null() {
            return Err(LedgerError::InvalidRecipient(*to));
        }
        self.check_supply_cap(amount)?;
        let loose_after = self
            .loose_balance(to)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let count = (loose_after / self.unit_size()).min(self.remaining_issuance());
        let plan = self.plan_issue(count)?;
        self.check_issue_recipient(caller, to, &plan)?;

        let mut emitted = Vec::new();
        self.apply_mint(to, amount, &mut emitted)?;
        if count > 0 {
            self.state.balances.debit(to, count * self.unit_size())?;
            self.apply_issue(to, plan, &mut emitted);
        }
        self.commit(emitted)
    }

    /// Change the value one unit represents
    ///
    /// Existing units are not reconciled: each assigned unit is worth the new
    /// size from now on, and the total supply moves accordingly.
    pub fn set_unit_size(&mut self, caller: &AccountId, unit_size: Amount) -> LedgerResult<Receipt> {
        self.require_admin(caller, "set the unit size")?;
        if unit_size == 0 {
            return Err(LedgerError::InvalidUnitSize(unit_size));
        }
        let previous = self.unit_size();
        let assigned = self.state.registry.assigned_count() as u128;
        let old_locked = assigned
            .checked_mul(previous)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let new_locked = assigned
            .checked_mul(unit_size)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let supply = self
            .state
            .balances
            .total_supply()
            .checked_sub(old_locked)
            .and_then(|rest| rest.checked_add(new_locked))
            .ok_or(LedgerError::ArithmeticOverflow)?;
        if let Some(cap) = self.state.config.max_supply {
            if supply > cap {
                return Err(LedgerError::SupplyCapExceeded {
                    cap,
                    requested: supply,
                });
            }
        }
        if assigned > 0 {
            warn!(
                "Unit size changed from {} to {} with {} units outstanding",
                previous, unit_size, assigned
            );
        }

        if new_locked >= old_locked {
            self.state.balances.increase_supply(new_locked - old_locked)?;
        } else {
            self.state.balances.decrease_supply(old_locked - new_locked)?;
        }
        debug_assert_eq!(self.state.balances.total_supply(), supply);
        self.state.config.unit_size = unit_size;
        info!("Unit size set to {}", unit_size);
        self.commit(vec![LedgerEvent::UnitSizeChanged {
            previous,
            current: unit_size,
        }])
    }

    /// Change the cap on fresh issuance
    ///
    /// It can never drop below `issued_count` or exceed the largest ordinal
    /// representable under the unit id prefix.
    pub fn set_max_issuable(&mut self, caller: &AccountId, max_issuable: u128) -> LedgerResult<Receipt> {
        self.require_admin(caller, "set the issuance limit")?;
        if max_issuable < self.state.issued_count || max_issuable > units::MAX_ORDINAL {
            return Err(LedgerError::InvalidIssuanceLimit {
                requested: max_issuable,
                issued: self.state.issued_count,
            });
        }
        let previous = self.max_issuable();
        self.state.config.max_issuable = max_issuable;
        info!("Issuance limit set to {}", max_issuable);
        self.commit(vec![LedgerEvent::IssuanceLimitChanged {
            previous,
            current: max_issuable,
        }])
    }

    pub fn set_unit_price(&mut self, caller: &AccountId, unit_price: Option<Amount>) -> LedgerResult<Receipt> {
        self.require_admin(caller, "set the unit price")?;
        let previous = self.state.config.unit_price;
        self.state.config.unit_price = unit_price;
        self.commit(vec![LedgerEvent::UnitPriceChanged {
            previous,
            current: unit_price,
        }])
    }

    /// Change the supply cap; it can never drop below the current supply
    pub fn set_max_supply(&mut self, caller: &AccountId, max_supply: Option<Amount>) -> LedgerResult<Receipt> {
        self.require_admin(caller, "set the supply cap")?;
        let supply = self.state.balances.total_supply();
        if let Some(cap) = max_supply {
            if cap < supply {
                return Err(LedgerError::SupplyCapExceeded {
                    cap,
                    requested: supply,
                });
            }
        }
        let previous = self.state.config.max_supply;
        self.state.config.max_supply = max_supply;
        self.commit(vec![LedgerEvent::SupplyCapChanged {
            previous,
            current: max_supply,
        }])
    }

    /// Replace the treasury receiving paid-issuance payments
    pub fn set_payment_sink(
        &mut self,
        caller: &AccountId,
        sink: impl PaymentSink + 'static,
    ) -> LedgerResult<()> {
        self.require_admin(caller, "set the treasury")?;
        self.payments = Some(Box::new(sink));
        info!("Treasury replaced by {}", caller);
        Ok(())
    }


    /// Run several operations as one all-or-nothing unit
    ///
    /// The batch runs against the live state; if it returns an error the state
    /// and journal are restored to what they were before it started, and
    /// observers never see its receipts. Payments already forwarded to the
    /// treasury are external and are not recalled. Nested calls join the
    /// outer batch.
    pub fn transact<T>(
        &mut self,
        batch: impl FnOnce(&mut Ledger) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        if self.staging {
            return batch(self);
        }

        let snapshot = self.state.clone();
        let committed = self.journal.len();
        self.staging = true;
        let result = batch(self);
        self.staging = false;

        match result {
            Ok(value) => {
                for receipt in &self.journal[committed..] {
                    for observer in self.observers.iter_mut() {
                        observer.on_commit(receipt);
                    }
                }
                Ok(value)
            }
            Err(err) => {
                debug!(
                    "Rolling back batch of {} operations: {}",
                    self.journal.len() - committed,
                    err
                );
                self.state = snapshot;
                self.journal.truncate(committed);
                Err(err)
            }
        }
    }


    fn require_admin(&self, caller: &AccountId, action: &str) -> LedgerResult<()> {
        if self.admin.is_admin(caller) {
            Ok(())
        } else {
            warn!("{} is not allowed to {}", caller, action);
            Err(LedgerError::unauthorized(caller, format!("cannot {}", action)))
        }
    }

    fn check_supply_cap(&self, minted: Amount) -> LedgerResult<()> {
        let requested = self
            .state
            .balances
            .total_supply()
            .checked_add(minted)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        match self.state.config.max_supply {
            Some(cap) if requested > cap => Err(LedgerError::SupplyCapExceeded { cap, requested }),
            _ => Ok(()),
        }
    }

    fn total_of(&self, account: &AccountId) -> LedgerResult<Amount> {
        let locked = (self.state.registry.owned_count(account) as u128)
            .checked_mul(self.unit_size())
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.loose_balance(account)
            .checked_add(locked)
            .ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Work out how many units a debit must free, without touching state
    fn plan_debit(&self, from: &AccountId, amount: Amount) -> LedgerResult<DebitPlan> {
        let total = self.total_of(from)?;
        if total < amount {
            return Err(LedgerError::InsufficientBalance {
                who: *from,
                have: total,
                need: amount,
            });
        }
        let loose = self.loose_balance(from);
        let units_to_free = if loose >= amount {
            0
        } else {
            units::units_to_cover(amount - loose, self.unit_size())
        };
        Ok(DebitPlan { units_to_free })
    }

    /// Debit `amount` from `from`, withdrawing its most recent units to the bank as needed
    fn apply_debit(
        &mut self,
        from: &AccountId,
        amount: Amount,
        plan: DebitPlan,
        emitted: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<()> {
        for _ in 0..plan.units_to_free {
            let id = self
                .state
                .registry
                .last_owned(from)
                .ok_or_else(|| LedgerError::Other(format!("{} ran out of units mid-debit", from)))?;
            self.withdraw_to_bank(from, id, emitted);
        }
        if plan.units_to_free > 0 {
            self.state
                .balances
                .credit(from, plan.units_to_free * self.unit_size())?;
        }
        self.state.balances.debit(from, amount)
    }

    fn withdraw_to_bank(&mut self, from: &AccountId, id: UnitId, emitted: &mut Vec<LedgerEvent>) {
        self.state.registry.transfer_unit(Some(*from), None, id);
        self.state.queue.push_front(id);
        debug!("Withdrew unit {:#x} from {} to the bank", id, from);
        emitted.push(LedgerEvent::UnitTransfer {
            from: Some(*from),
            to: None,
            id,
        });
    }

    /// Pick the ids an issuance of `count` units will hand out, banked units first
    fn plan_issue(&self, count: u128) -> LedgerResult<IssuePlan> {
        let available = self.remaining_issuance();
        if count > available {
            return Err(LedgerError::IssuanceLimitReached {
                requested: count,
                available,
            });
        }
        let count = usize::try_from(count).map_err(|_| LedgerError::ArithmeticOverflow)?;

        let mut ids: Vec<UnitId> = self.state.queue.next_out(count).collect();
        let recycled = ids.len();
        let fresh = (count - recycled) as u128;
        let issued_after = self.state.issued_count + fresh;
        ids.extend((self.state.issued_count + 1..=issued_after).map(units::unit_id));

        for id in &ids {
            if self.state.registry.exists_assigned(*id) {
                error!("Refusing to issue unit {:#x}: it is already owned", id);
                return Err(LedgerError::AlreadyExists(*id));
            }
        }

        Ok(IssuePlan {
            ids,
            recycled,
            issued_after,
        })
    }

    /// Every unit an issuance hands to a program account must be acknowledged
    fn check_issue_recipient(
        &self,
        operator: &AccountId,
        to: &AccountId,
        plan: &IssuePlan,
    ) -> LedgerResult<()> {
        for id in &plan.ids {
            if !self.receivers.accepts(operator, &AccountId::NULL, to, *id, &[]) {
                warn!("{} did not acknowledge issued unit {:#x}", to, id);
                return Err(LedgerError::UnsafeRecipient(*to));
            }
        }
        Ok(())
    }

    fn apply_issue(&mut self, to: &AccountId, plan: IssuePlan, emitted: &mut Vec<LedgerEvent>) {
        for _ in 0..plan.recycled {
            self.state.queue.pop_back();
        }
        self.state.issued_count = plan.issued_after;
        for id in plan.ids {
            self.state.registry.transfer_unit(None, Some(*to), id);
            debug!("Issued unit {:#x} to {}", id, to);
            emitted.push(LedgerEvent::UnitTransfer {
                from: None,
                to: Some(*to),
                id,
            });
        }
    }

    fn apply_mint(
        &mut self,
        to: &AccountId,
        amount: Amount,
        emitted: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<()> {
        self.state.balances.credit(to, amount)?;
        self.state.balances.increase_supply(amount)?;
        emitted.push(LedgerEvent::Transfer {
            from: None,
            to: Some(*to),
            amount,
        });
        Ok(())
    }

    /// Seal the emitted events into a receipt and append it to the journal
    fn commit(&mut self, emitted: Vec<LedgerEvent>) -> LedgerResult<Receipt> {
        let sequence = self.journal.len() as u64;
        let prev_digest = self.journal.last().map(|receipt| receipt.digest).unwrap_or([0; 32]);
        let receipt = Receipt::seal(sequence, emitted, prev_digest)?;
        info!(
            "Committed operation #{} with {} events",
            receipt.sequence,
            receipt.events.len()
        );

        if !self.staging {
            for observer in self.observers.iter_mut() {
                observer.on_commit(&receipt);
            }
        }
        self.journal.push(receipt.clone());
        Ok(receipt)
    }
}

impl FungibleLedger for Ledger {
    fn balance_of(&self, account: &AccountId) -> Amount {
        self.loose_balance(account)
            .saturating_add(self.locked_balance(account))
    }

    fn total_supply(&self) -> Amount {
        self.state.balances.total_supply()
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.state.approvals.allowance(owner, spender)
    }

    fn transfer(&mut self, caller: &AccountId, to: &AccountId, amount: Amount) -> LedgerResult<Receipt> {
        if caller.is_null() {
            return Err(LedgerError::InvalidSender(*caller));
        }
        if to.is_null() {
            return Err(LedgerError::InvalidRecipient(*to));
        }
        let plan = self.plan_debit(caller, amount)?;

        let mut emitted = Vec::new();
        self.apply_debit(caller, amount, plan, &mut emitted)?;
        self.state.balances.credit(to, amount)?;
        emitted.push(LedgerEvent::Transfer {
            from: Some(*caller),
            to: Some(*to),
            amount,
        });
        self.commit(emitted)
    }

    fn transfer_from_amount(
        &mut self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> LedgerResult<Receipt> {
        if from.is_null() {
            return Err(LedgerError::InvalidSender(*from));
        }
        if to.is_null() {
            return Err(LedgerError::InvalidRecipient(*to));
        }
        self.state.approvals.check_allowance(from, caller, amount)?;
        let plan = self.plan_debit(from, amount)?;

        let mut emitted = Vec::new();
        self.state.approvals.spend_allowance(from, caller, amount)?;
        self.apply_debit(from, amount, plan, &mut emitted)?;
        self.state.balances.credit(to, amount)?;
        emitted.push(LedgerEvent::Transfer {
            from: Some(*from),
            to: Some(*to),
            amount,
        });
        self.commit(emitted)
    }

    fn set_allowance(&mut self, caller: &AccountId, spender: &AccountId, value: Amount) -> LedgerResult<Receipt> {
        if caller.is_null() {
            return Err(LedgerError::InvalidSender(*caller));
        }
        self.state.approvals.set_allowance(caller, spender, value)?;
        self.commit(vec![LedgerEvent::Approval {
            owner: *caller,
            spender: *spender,
            value,
        }])
    }

    fn burn(&mut self, caller: &AccountId, amount: Amount) -> LedgerResult<Receipt> {
        if caller.is_null() {
            return Err(LedgerError::InvalidSender(*caller));
        }
        let plan = self.plan_debit(caller, amount)?;

        let mut emitted = Vec::new();
        self.apply_debit(caller, amount, plan, &mut emitted)?;
        self.state.balances.decrease_supply(amount)?;
        emitted.push(LedgerEvent::Transfer {
            from: Some(*caller),
            to: None,
            amount,
        });
        self.commit(emitted)
    }
}

impl DiscreteUnitLedger for Ledger {
    fn owner_of(&self, id: UnitId) -> LedgerResult<AccountId> {
        if !self.is_valid_unit_id(id) {
            return Err(LedgerError::InvalidUnitId(id));
        }
        self.state
            .registry
            .owner_of(id)
            .ok_or(LedgerError::NotFound(id))
    }

    fn exists(&self, id: UnitId) -> bool {
        self.is_valid_unit_id(id) && self.state.registry.exists_assigned(id)
    }

    fn units_of(&self, account: &AccountId) -> &[UnitId] {
        self.state.registry.owned(account)
    }

    fn unit_count(&self, account: &AccountId) -> usize {
        self.state.registry.owned_count(account)
    }

    fn get_approved(&self, id: UnitId) -> LedgerResult<Option<AccountId>> {
        self.owner_of(id)?;
        Ok(self.state.registry.record(id).and_then(|record| record.approved))
    }

    fn is_approved_for_all(&self, owner: &AccountId, operator: &AccountId) -> bool {
        self.state.approvals.is_approved_for_all(owner, operator)
    }

    fn approve_unit(&mut self, caller: &AccountId, spender: &AccountId, id: UnitId) -> LedgerResult<Receipt> {
        let owner = self.owner_of(id)?;
        if *caller != owner && !self.is_approved_for_all(&owner, caller) {
            return Err(LedgerError::unauthorized(
                caller,
                format!("cannot approve unit {:#x}", id),
            ));
        }

        let approved = if spender.is_null() { None } else { Some(*spender) };
        self.state.registry.set_approved(id, approved);
        self.commit(vec![LedgerEvent::UnitApproval {
            owner,
            spender: *spender,
            id,
        }])
    }

    fn set_approval_for_all(
        &mut self,
        caller: &AccountId,
        operator: &AccountId,
        approved: bool,
    ) -> LedgerResult<Receipt> {
        self.state
            .approvals
            .set_approval_for_all(caller, operator, approved)?;
        self.commit(vec![LedgerEvent::ApprovalForAll {
            owner: *caller,
            operator: *operator,
            approved,
        }])
    }

    fn safe_transfer_unit_from(
        &mut self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        id: UnitId,
        data: &[u8],
    ) -> LedgerResult<Receipt> {
        if !self.is_valid_unit_id(id) {
            return Err(LedgerError::InvalidUnitId(id));
        }
        if from.is_null() {
            return Err(LedgerError::InvalidSender(*from));
        }
        if to.is_null() {
            return Err(LedgerError::InvalidRecipient(*to));
        }
        let record = self
            .state
            .registry
            .record(id)
            .copied()
            .ok_or(LedgerError::NotFound(id))?;
        if record.owner != *from {
            return Err(LedgerError::unauthorized(
                caller,
                format!("unit {:#x} is not owned by {}", id, from),
            ));
        }
        let authorized = caller == from
            || self.is_approved_for_all(from, caller)
            || record.approved == Some(*caller);
        if !authorized {
            return Err(LedgerError::unauthorized(
                caller,
                format!("cannot move unit {:#x}", id),
            ));
        }
        if !self.receivers.accepts(caller, from, to, id, data) {
            warn!("{} did not acknowledge unit {:#x}", to, id);
            return Err(LedgerError::UnsafeRecipient(*to));
        }

        self.state.registry.transfer_unit(Some(*from), Some(*to), id);
        debug!("Moved unit {:#x} from {} to {}", id, from, to);
        self.commit(vec![
            LedgerEvent::Transfer {
                from: Some(*from),
                to: Some(*to),
                amount: self.unit_size(),
            },
            LedgerEvent::UnitTransfer {
                from: Some(*from),
                to: Some(*to),
                id,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approvals::UNLIMITED_ALLOWANCE;
    use crate::collaborators::{SingleAdmin, Treasury, UNIT_RECEIVED_MAGIC};
    use crate::id::tests::{program, user};
    use crate::units::{unit_id, UNIT_ID_PREFIX};
    use std::sync::{Arc, Mutex};

    const UNIT: Amount = 1_000_000;

    fn admin() -> AccountId {
        user("admin")
    }

    fn new_ledger(max_issuable: u128) -> Ledger {
        let config = LedgerConfig::default()
            .with_unit_size(UNIT)
            .with_max_issuable(max_issuable);
        Ledger::new(config, SingleAdmin(admin())).unwrap()
    }

    /// Ledger where `holder` owns `units` units and nothing loose
    fn ledger_with_units(holder: &AccountId, units: u128) -> Ledger {
        let mut ledger = new_ledger(100);
        ledger
            .mint_with_units(&admin(), holder, units * UNIT)
            .unwrap();
        ledger
    }

    fn accept_all(_: &AccountId, _: &AccountId, _: UnitId, _: &[u8]) -> Result<[u8; 4], String> {
        Ok(UNIT_RECEIVED_MAGIC)
    }

    fn wrong_magic(_: &AccountId, _: &AccountId, _: UnitId, _: &[u8]) -> Result<[u8; 4], String> {
        Ok([0xde, 0xad, 0xbe, 0xef])
    }

    fn failing(_: &AccountId, _: &AccountId, _: UnitId, _: &[u8]) -> Result<[u8; 4], String> {
        Err("receiver exploded".to_string())
    }

    #[test]
    fn test_mint_with_units_promotes_whole_units() {
        let alice = user("alice");
        let mut ledger = new_ledger(100);

        let receipt = ledger
            .mint_with_units(&admin(), &alice, 10 * UNIT + 250)
            .unwrap();

        assert_eq!(ledger.unit_count(&alice), 10);
        assert_eq!(ledger.loose_balance(&alice), 250);
        assert_eq!(ledger.locked_balance(&alice), 10 * UNIT);
        assert_eq!(ledger.balance_of(&alice), 10 * UNIT + 250);
        assert_eq!(ledger.issued_count(), 10);
        assert_eq!(receipt.units_received_by(&alice).len(), 10);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_self_transfer_preserves_total() {
        let alice = user("alice");
        let mut ledger = ledger_with_units(&alice, 10);

        let receipt = ledger.transfer(&alice, &alice, 4_007_777).unwrap();

        assert_eq!(receipt.units_withdrawn().len(), 5);
        assert_eq!(ledger.loose_balance(&alice), 5_000_000);
        assert_eq!(ledger.unit_count(&alice), 5);
        assert_eq!(ledger.balance_of(&alice), 10_000_000);
        assert_eq!(ledger.queue_len(), 5);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_exact_unit_multiple_leaves_no_remainder() {
        let alice = user("alice");
        let bob = user("bob");
        let mut ledger = ledger_with_units(&alice, 10);

        let receipt = ledger.transfer(&alice, &bob, 3 * UNIT).unwrap();

        assert_eq!(receipt.units_withdrawn().len(), 3);
        assert_eq!(ledger.loose_balance(&alice), 0);
        assert_eq!(ledger.unit_count(&alice), 7);
        assert_eq!(ledger.loose_balance(&bob), 3 * UNIT);
        assert_eq!(ledger.unit_count(&bob), 0);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_partial_unit_remainder_stays_loose() {
        let alice = user("alice");
        let bob = user("bob");
        let mut ledger = ledger_with_units(&alice, 4);

        ledger.transfer(&alice, &bob, 1_500_000).unwrap();

        // Two units freed, half a unit left over
        assert_eq!(ledger.unit_count(&alice), 2);
        assert_eq!(ledger.loose_balance(&alice), 500_000);
        assert!(ledger.loose_balance(&alice) < UNIT);
        assert_eq!(ledger.balance_of(&alice), 2_500_000);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_debit_below_loose_touches_no_units() {
        let alice = user("alice");
        let bob = user("bob");
        let mut ledger = new_ledger(100);
        ledger
            .mint_with_units(&admin(), &alice, 10 * UNIT + 500_000)
            .unwrap();

        let receipt = ledger.transfer(&alice, &bob, 400_000).unwrap();

        assert!(receipt.units_withdrawn().is_empty());
        assert_eq!(ledger.unit_count(&alice), 10);
        assert_eq!(ledger.loose_balance(&alice), 100_000);
        assert_eq!(ledger.queue_len(), 0);
    }

    #[test]
    fn test_withdrawal_takes_most_recent_unit() {
        let alice = user("alice");
        let bob = user("bob");
        let mut ledger = ledger_with_units(&alice, 3);

        let receipt = ledger.transfer(&alice, &bob, 1).unwrap();

        assert_eq!(receipt.units_withdrawn(), vec![unit_id(3)]);
        assert_eq!(ledger.units_of(&alice), &[unit_id(1), unit_id(2)]);
        assert_eq!(ledger.queued_unit(0), Some(unit_id(3)));
        assert!(matches!(
            ledger.owner_of(unit_id(3)),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_bulk_issue_to_self() {
        let alice = user("alice");
        let mut ledger = new_ledger(10_000);
        ledger.mint(&admin(), &alice, 10_000_000_000).unwrap();
        assert_eq!(ledger.unit_count(&alice), 0);

        ledger.issue_units(&alice, 10_000).unwrap();

        assert_eq!(ledger.issued_count(), 10_000);
        assert_eq!(ledger.unit_count(&alice), 10_000);
        assert_eq!(ledger.loose_balance(&alice), 0);
        let mut owned = ledger.units_of(&alice).to_vec();
        owned.sort_unstable();
        let expected: Vec<UnitId> = (1..=10_000).map(unit_id).collect();
        assert_eq!(owned, expected);
        for ordinal in [1, 5_000, 10_000] {
            assert_eq!(ledger.owner_of(unit_id(ordinal)).unwrap(), alice);
        }
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_banked_units_recycled_before_new_ordinals() {
        let alice = user("alice");
        let bob = user("bob");
        let carol = user("carol");
        let dave = user("dave");
        let mut ledger = ledger_with_units(&alice, 3);

        ledger.transfer(&alice, &bob, UNIT / 2).unwrap();
        assert_eq!(ledger.queue_len(), 1);

        ledger.mint(&admin(), &carol, UNIT).unwrap();
        let receipt = ledger.promote_to_units(&carol).unwrap();
        assert_eq!(receipt.units_received_by(&carol), vec![unit_id(3)]);
        assert_eq!(ledger.issued_count(), 3);
        assert_eq!(ledger.queue_len(), 0);

        ledger.mint(&admin(), &dave, UNIT).unwrap();
        let receipt = ledger.promote_to_units(&dave).unwrap();
        assert_eq!(receipt.units_received_by(&dave), vec![unit_id(4)]);
        assert_eq!(ledger.issued_count(), 4);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_oldest_banked_unit_reused_first() {
        let alice = user("alice");
        let bob = user("bob");
        let mut ledger = ledger_with_units(&alice, 3);

        // Withdraws 3, then 2
        ledger.transfer(&alice, &bob, 1).unwrap();
        ledger.transfer(&alice, &bob, UNIT).unwrap();
        assert_eq!(ledger.queued_units(0, 10), vec![unit_id(2), unit_id(3)]);

        ledger.mint(&admin(), &bob, UNIT).unwrap();
        let receipt = ledger.promote_to_units(&bob).unwrap();
        assert_eq!(receipt.units_received_by(&bob), vec![unit_id(3), unit_id(2)]);
    }

    #[test]
    fn test_unsafe_recipient_rolls_back() {
        let alice = user("alice");
        let vault = program("vault");
        let liar = program("liar");
        let broken = program("broken");
        let mut ledger = ledger_with_units(&alice, 1);
        ledger.register_receiver(liar, wrong_magic);
        ledger.register_receiver(broken, failing);
        let journal_len = ledger.journal().len();

        for target in [vault, liar, broken] {
            let result = ledger.transfer_unit_from(&alice, &alice, &target, unit_id(1));
            assert!(matches!(result, Err(LedgerError::UnsafeRecipient(to)) if to == target));
            assert_eq!(ledger.owner_of(unit_id(1)).unwrap(), alice);
            assert_eq!(ledger.unit_count(&alice), 1);
        }
        assert_eq!(ledger.journal().len(), journal_len);

        ledger.register_receiver(vault, accept_all);
        ledger
            .transfer_unit_from(&alice, &alice, &vault, unit_id(1))
            .unwrap();
        assert_eq!(ledger.owner_of(unit_id(1)).unwrap(), vault);
        assert_eq!(ledger.balance_of(&vault), UNIT);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_receiver_sees_transfer_data() {
        let alice = user("alice");
        let vault = program("vault");
        let seen: Arc<Mutex<Vec<(UnitId, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let mut ledger = ledger_with_units(&alice, 2);
        ledger.register_receiver(
            vault,
            move |_: &AccountId, _: &AccountId, id: UnitId, data: &[u8]| -> Result<[u8; 4], String> {
                log.lock().unwrap().push((id, data.to_vec()));
                Ok(UNIT_RECEIVED_MAGIC)
            },
        );

        ledger
            .safe_transfer_unit_from(&alice, &alice, &vault, unit_id(2), b"hello")
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(unit_id(2), b"hello".to_vec())]);
    }

    #[test]
    fn test_fungible_transfer_to_program_needs_no_receiver() {
        let alice = user("alice");
        let vault = program("vault");
        let mut ledger = ledger_with_units(&alice, 2);

        ledger.transfer(&alice, &vault, UNIT).unwrap();
        assert_eq!(ledger.loose_balance(&vault), UNIT);
    }

    #[test]
    fn test_issuance_to_program_requires_acknowledgement() {
        let vault = program("vault");
        let mut ledger = new_ledger(100);

        assert!(matches!(
            ledger.mint_with_units(&admin(), &vault, 3 * UNIT),
            Err(LedgerError::UnsafeRecipient(to)) if to == vault
        ));
        assert_eq!(ledger.balance_of(&vault), 0);
        assert_eq!(ledger.total_supply(), 0);
        assert_eq!(ledger.issued_count(), 0);
        assert!(ledger.journal().is_empty());

        // Loose value needs no acknowledgement, promoting it does
        ledger.mint(&admin(), &vault, 3 * UNIT).unwrap();
        assert!(matches!(
            ledger.promote_to_units(&vault),
            Err(LedgerError::UnsafeRecipient(_))
        ));
        ledger.register_receiver(vault, wrong_magic);
        assert!(matches!(
            ledger.issue_units(&vault, 1),
            Err(LedgerError::UnsafeRecipient(_))
        ));
        assert_eq!(ledger.loose_balance(&vault), 3 * UNIT);
        assert_eq!(ledger.unit_count(&vault), 0);

        let seen: Arc<Mutex<Vec<(AccountId, AccountId, UnitId)>>> = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        ledger.register_receiver(
            vault,
            move |operator: &AccountId, from: &AccountId, id: UnitId, _: &[u8]| -> Result<[u8; 4], String> {
                log.lock().unwrap().push((*operator, *from, id));
                Ok(UNIT_RECEIVED_MAGIC)
            },
        );
        ledger.promote_to_units(&vault).unwrap();

        assert_eq!(ledger.unit_count(&vault), 3);
        assert_eq!(ledger.loose_balance(&vault), 0);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen
            .iter()
            .all(|(operator, from, _)| *operator == vault && from.is_null()));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_paid_issuance_to_program_checked_before_payment() {
        let vault = program("vault");
        let treasury = Treasury::new();
        let config = LedgerConfig::default()
            .with_unit_size(UNIT)
            .with_max_issuable(10)
            .with_unit_price(5);
        let mut ledger = Ledger::new(config, SingleAdmin(admin()))
            .unwrap()
            .with_payment_sink(treasury.clone());

        assert!(matches!(
            ledger.issue_paid(&vault, 2, 10),
            Err(LedgerError::UnsafeRecipient(_))
        ));
        assert!(treasury.payments().is_empty());
        assert_eq!(ledger.total_supply(), 0);

        ledger.register_receiver(vault, accept_all);
        ledger.issue_paid(&vault, 2, 10).unwrap();
        assert_eq!(ledger.unit_count(&vault), 2);
        assert_eq!(treasury.total_received(), 10);
    }

    #[test]
    fn test_zero_amounts() {
        let alice = user("alice");
        let bob = user("bob");
        let carol = user("carol");
        let mut ledger = ledger_with_units(&alice, 2);

        let receipt = ledger.transfer(&alice, &bob, 0).unwrap();
        assert_eq!(
            receipt.events,
            vec![LedgerEvent::Transfer {
                from: Some(alice),
                to: Some(bob),
                amount: 0
            }]
        );
        assert_eq!(ledger.unit_count(&alice), 2);
        assert_eq!(ledger.loose_balance(&alice), 0);
        assert_eq!(ledger.balance_of(&bob), 0);
        assert_eq!(ledger.queue_len(), 0);

        // No allowance is needed to move nothing
        let receipt = ledger.transfer_from_amount(&bob, &alice, &carol, 0).unwrap();
        assert!(receipt.units_withdrawn().is_empty());
        assert_eq!(receipt.events.len(), 1);
        assert_eq!(ledger.allowance(&alice, &bob), 0);
        assert_eq!(ledger.balance_of(&carol), 0);

        let receipt = ledger.burn(&alice, 0).unwrap();
        assert!(receipt.units_withdrawn().is_empty());
        assert_eq!(ledger.total_supply(), 2 * UNIT);
        assert_eq!(ledger.balance_of(&alice), 2 * UNIT);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_insufficient_allowance_is_reported_exactly() {
        let alice = user("alice");
        let bob = user("bob");
        let carol = user("carol");
        let mut ledger = new_ledger(100);
        ledger.mint(&admin(), &alice, 5 * UNIT).unwrap();

        match ledger.transfer_from(&bob, &alice, &carol, 10) {
            Err(LedgerError::InsufficientAllowance { spender, have, need }) => {
                assert_eq!(spender, bob);
                assert_eq!(have, 0);
                assert_eq!(need, 10);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // Allowance is checked before balance
        match ledger.transfer_from_amount(&bob, &alice, &carol, 100 * UNIT) {
            Err(LedgerError::InsufficientAllowance { have: 0, .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_transfer_from_spends_allowance() {
        let alice = user("alice");
        let bob = user("bob");
        let carol = user("carol");
        let mut ledger = ledger_with_units(&alice, 5);

        ledger.approve(&alice, &bob, 2 * UNIT).unwrap();
        ledger.transfer_from(&bob, &alice, &carol, UNIT + 1).unwrap();

        assert_eq!(ledger.allowance(&alice, &bob), UNIT - 1);
        assert_eq!(ledger.balance_of(&carol), UNIT + 1);
        assert_eq!(ledger.unit_count(&alice), 3);

        ledger
            .set_allowance(&alice, &bob, UNLIMITED_ALLOWANCE)
            .unwrap();
        ledger.transfer_from(&bob, &alice, &carol, UNIT).unwrap();
        assert_eq!(ledger.allowance(&alice, &bob), UNLIMITED_ALLOWANCE);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_insufficient_balance_leaves_state_untouched() {
        let alice = user("alice");
        let bob = user("bob");
        let mut ledger = ledger_with_units(&alice, 2);

        match ledger.transfer(&alice, &bob, 2 * UNIT + 1) {
            Err(LedgerError::InsufficientBalance { who, have, need }) => {
                assert_eq!(who, alice);
                assert_eq!(have, 2 * UNIT);
                assert_eq!(need, 2 * UNIT + 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(ledger.unit_count(&alice), 2);
        assert_eq!(ledger.queue_len(), 0);
        assert_eq!(ledger.balance_of(&bob), 0);
    }

    #[test]
    fn test_null_accounts_rejected() {
        let alice = user("alice");
        let mut ledger = ledger_with_units(&alice, 2);
        let null = AccountId::NULL;

        assert!(matches!(
            ledger.transfer(&alice, &null, 1),
            Err(LedgerError::InvalidRecipient(_))
        ));
        assert!(matches!(
            ledger.transfer(&null, &alice, 1),
            Err(LedgerError::InvalidSender(_))
        ));
        assert!(matches!(
            ledger.transfer_unit_from(&alice, &alice, &null, unit_id(1)),
            Err(LedgerError::InvalidRecipient(_))
        ));
        assert!(matches!(
            ledger.approve(&alice, &null, 5),
            Err(LedgerError::InvalidSpender(_))
        ));
        assert!(matches!(
            ledger.set_approval_for_all(&alice, &null, true),
            Err(LedgerError::InvalidOperator(_))
        ));
        assert_eq!(ledger.unit_count(&alice), 2);
    }

    #[test]
    fn test_unit_round_trip() {
        let alice = user("alice");
        let bob = user("bob");
        let mut ledger = new_ledger(100);
        ledger.mint_with_units(&admin(), &alice, 2 * UNIT + 7).unwrap();
        ledger.mint_with_units(&admin(), &bob, UNIT + 3).unwrap();

        ledger
            .transfer_unit_from(&alice, &alice, &bob, unit_id(1))
            .unwrap();
        assert!(ledger.units_of(&bob).contains(&unit_id(1)));
        assert_eq!(ledger.balance_of(&bob), 2 * UNIT + 3);

        ledger
            .transfer_unit_from(&bob, &bob, &alice, unit_id(1))
            .unwrap();

        assert!(ledger.units_of(&alice).contains(&unit_id(1)));
        assert!(!ledger.units_of(&bob).contains(&unit_id(1)));
        assert_eq!(ledger.loose_balance(&alice), 7);
        assert_eq!(ledger.loose_balance(&bob), 3);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_unit_transfer_authorization() {
        let alice = user("alice");
        let bob = user("bob");
        let carol = user("carol");
        let dave = user("dave");
        let mut ledger = ledger_with_units(&alice, 3);

        assert!(matches!(
            ledger.transfer_unit_from(&carol, &alice, &carol, unit_id(1)),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert!(matches!(
            ledger.transfer_unit_from(&bob, &bob, &carol, unit_id(1)),
            Err(LedgerError::Unauthorized { .. })
        ));

        // Single-unit approval is consumed by the move
        ledger.approve(&alice, &carol, unit_id(1)).unwrap();
        assert_eq!(ledger.get_approved(unit_id(1)).unwrap(), Some(carol));
        assert_eq!(ledger.allowance(&alice, &carol), 0);
        ledger
            .transfer_from(&carol, &alice, &bob, unit_id(1))
            .unwrap();
        assert_eq!(ledger.owner_of(unit_id(1)).unwrap(), bob);
        assert_eq!(ledger.get_approved(unit_id(1)).unwrap(), None);

        // Blanket operator
        ledger.set_approval_for_all(&alice, &dave, true).unwrap();
        ledger
            .transfer_unit_from(&dave, &alice, &dave, unit_id(2))
            .unwrap();
        ledger.approve(&dave, &bob, unit_id(3)).unwrap();
        assert_eq!(ledger.get_approved(unit_id(3)).unwrap(), Some(bob));

        ledger.set_approval_for_all(&alice, &dave, false).unwrap();
        assert!(matches!(
            ledger.transfer_unit_from(&dave, &alice, &dave, unit_id(3)),
            Err(LedgerError::Unauthorized { .. })
        ));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_unit_self_transfer_consumes_approval() {
        let alice = user("alice");
        let bob = user("bob");
        let mut ledger = ledger_with_units(&alice, 2);
        ledger.approve(&alice, &bob, unit_id(1)).unwrap();

        let receipt = ledger
            .transfer_unit_from(&bob, &alice, &alice, unit_id(1))
            .unwrap();

        assert_eq!(receipt.units_received_by(&alice), vec![unit_id(1)]);
        assert_eq!(ledger.unit_count(&alice), 2);
        assert_eq!(ledger.balance_of(&alice), 2 * UNIT);
        assert_eq!(ledger.get_approved(unit_id(1)).unwrap(), None);
    }

    #[test]
    fn test_unit_id_queries() {
        let alice = user("alice");
        let mut ledger = ledger_with_units(&alice, 1);

        assert!(matches!(
            ledger.owner_of(unit_id(101)),
            Err(LedgerError::InvalidUnitId(_))
        ));
        assert!(matches!(
            ledger.owner_of(UNIT_ID_PREFIX),
            Err(LedgerError::InvalidUnitId(_))
        ));
        assert!(matches!(
            ledger.owner_of(unit_id(2)),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            ledger.transfer_unit_from(&alice, &alice, &user("bob"), 42),
            Err(LedgerError::InvalidUnitId(42))
        ));
        assert!(ledger.exists(unit_id(1)));
        assert!(!ledger.exists(unit_id(2)));
        assert!(!ledger.exists(UNIT_ID_PREFIX));

        ledger.transfer(&alice, &user("bob"), 1).unwrap();
        assert!(!ledger.exists(unit_id(1)));
        assert!(matches!(
            ledger.get_approved(unit_id(1)),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_approve_dispatch() {
        let alice = user("alice");
        let bob = user("bob");
        let mut ledger = ledger_with_units(&alice, 1);

        // Bare prefix is ordinal 0: a fungible allowance
        ledger.approve(&alice, &bob, UNIT_ID_PREFIX).unwrap();
        assert_eq!(ledger.allowance(&alice, &bob), UNIT_ID_PREFIX);

        // Above the issuance range: also fungible
        ledger.approve(&alice, &bob, unit_id(101)).unwrap();
        assert_eq!(ledger.allowance(&alice, &bob), unit_id(101));

        // Inside the range but unowned
        assert!(matches!(
            ledger.approve(&alice, &bob, unit_id(50)),
            Err(LedgerError::NotFound(_))
        ));

        // Inside the range and owned by someone else
        assert!(matches!(
            ledger.approve(&bob, &bob, unit_id(1)),
            Err(LedgerError::Unauthorized { .. })
        ));

        let receipt = ledger.approve(&alice, &bob, unit_id(1)).unwrap();
        assert_eq!(
            receipt.events,
            vec![LedgerEvent::UnitApproval {
                owner: alice,
                spender: bob,
                id: unit_id(1)
            }]
        );

        ledger.approve(&alice, &AccountId::NULL, unit_id(1)).unwrap();
        assert_eq!(ledger.get_approved(unit_id(1)).unwrap(), None);
    }

    #[test]
    fn test_promote_respects_issuance_limit() {
        let alice = user("alice");
        let bob = user("bob");
        let mut ledger = new_ledger(3);
        ledger.mint(&admin(), &alice, 5 * UNIT).unwrap();

        ledger.promote_to_units(&alice).unwrap();
        assert_eq!(ledger.unit_count(&alice), 3);
        assert_eq!(ledger.loose_balance(&alice), 2 * UNIT);
        assert_eq!(ledger.remaining_issuance(), 0);

        assert!(matches!(
            ledger.promote_to_units(&alice),
            Err(LedgerError::IssuanceLimitReached { available: 0, .. })
        ));

        ledger.mint(&admin(), &bob, UNIT - 1).unwrap();
        assert!(matches!(
            ledger.promote_to_units(&bob),
            Err(LedgerError::IssuanceLimitReached { requested: 0, .. })
        ));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_issue_units_validates_before_mutating() {
        let alice = user("alice");
        let mut ledger = new_ledger(5);
        ledger.mint(&admin(), &alice, 10 * UNIT).unwrap();

        assert!(matches!(
            ledger.issue_units(&alice, 6),
            Err(LedgerError::IssuanceLimitReached { requested: 6, available: 5 })
        ));
        assert!(matches!(
            ledger.issue_units(&alice, 11),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            ledger.issue_units(&alice, 0),
            Err(LedgerError::IssuanceLimitReached { requested: 0, .. })
        ));
        assert_eq!(ledger.loose_balance(&alice), 10 * UNIT);
        assert_eq!(ledger.issued_count(), 0);

        ledger.issue_units(&alice, 5).unwrap();
        assert_eq!(ledger.loose_balance(&alice), 5 * UNIT);
        assert_eq!(ledger.unit_count(&alice), 5);
    }

    #[test]
    fn test_paid_issuance() {
        let alice = user("alice");
        let treasury = Treasury::new();
        let config = LedgerConfig::default()
            .with_unit_size(UNIT)
            .with_max_issuable(10)
            .with_unit_price(5);
        let mut ledger = Ledger::new(config, SingleAdmin(admin()))
            .unwrap()
            .with_payment_sink(treasury.clone());

        assert!(matches!(
            ledger.issue_paid(&alice, 2, 9),
            Err(LedgerError::IncorrectPaymentValue { expected: 10, actual: 9 })
        ));

        ledger.issue_paid(&alice, 2, 10).unwrap();
        assert_eq!(treasury.payments(), vec![(alice, 10)]);
        assert_eq!(ledger.unit_count(&alice), 2);
        assert_eq!(ledger.loose_balance(&alice), 0);
        assert_eq!(ledger.total_supply(), 2 * UNIT);

        treasury.set_rejecting(true);
        assert!(matches!(
            ledger.issue_paid(&alice, 1, 5),
            Err(LedgerError::PaymentForwardingFailed(_))
        ));
        assert_eq!(ledger.unit_count(&alice), 2);
        assert_eq!(ledger.total_supply(), 2 * UNIT);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_paid_issuance_requires_price() {
        let alice = user("alice");
        let mut ledger = new_ledger(10).with_payment_sink(Treasury::new());
        assert!(matches!(
            ledger.issue_paid(&alice, 1, 0),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn test_burn_frees_units() {
        let alice = user("alice");
        let mut ledger = ledger_with_units(&alice, 3);

        let receipt = ledger.burn(&alice, 1_500_000).unwrap();

        assert_eq!(receipt.units_withdrawn().len(), 2);
        assert_eq!(ledger.unit_count(&alice), 1);
        assert_eq!(ledger.loose_balance(&alice), 500_000);
        assert_eq!(ledger.total_supply(), 1_500_000);
        assert_eq!(
            receipt.events.last(),
            Some(&LedgerEvent::Transfer {
                from: Some(alice),
                to: None,
                amount: 1_500_000
            })
        );
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_admin_operations_are_gated() {
        let alice = user("alice");
        let mut ledger = ledger_with_units(&alice, 4);

        assert!(matches!(
            ledger.mint(&alice, &alice, 1),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert!(matches!(
            ledger.set_max_issuable(&alice, 1_000),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert!(matches!(
            ledger.set_max_issuable(&admin(), 3),
            Err(LedgerError::InvalidIssuanceLimit { requested: 3, issued: 4 })
        ));
        ledger.set_max_issuable(&admin(), 4).unwrap();
        assert_eq!(ledger.remaining_issuance(), 0);
        ledger.set_max_issuable(&admin(), 1_000).unwrap();
        assert_eq!(ledger.max_issuable(), 1_000);

        assert!(matches!(
            ledger.set_unit_size(&admin(), 0),
            Err(LedgerError::InvalidUnitSize(0))
        ));
        assert!(matches!(
            ledger.set_payment_sink(&alice, Treasury::new()),
            Err(LedgerError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_unit_size_change_is_not_reconciled() {
        let alice = user("alice");
        let mut ledger = ledger_with_units(&alice, 4);
        ledger.mint(&admin(), &alice, 10).unwrap();

        ledger.set_unit_size(&admin(), 2 * UNIT).unwrap();

        assert_eq!(ledger.unit_count(&alice), 4);
        assert_eq!(ledger.balance_of(&alice), 8 * UNIT + 10);
        assert_eq!(ledger.total_supply(), 8 * UNIT + 10);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_unit_size_change_respects_supply_cap() {
        let alice = user("alice");
        let config = LedgerConfig::default()
            .with_unit_size(100)
            .with_max_issuable(100)
            .with_max_supply(1_000);
        let mut ledger = Ledger::new(config, SingleAdmin(admin())).unwrap();
        ledger.mint_with_units(&admin(), &alice, 1_000).unwrap();
        let journal_len = ledger.journal().len();

        assert!(matches!(
            ledger.set_unit_size(&admin(), 1_000),
            Err(LedgerError::SupplyCapExceeded { cap: 1_000, requested: 10_000 })
        ));
        assert_eq!(ledger.unit_size(), 100);
        assert_eq!(ledger.total_supply(), 1_000);
        assert_eq!(ledger.balance_of(&alice), 1_000);
        assert_eq!(ledger.journal().len(), journal_len);

        ledger.set_unit_size(&admin(), 50).unwrap();
        assert_eq!(ledger.total_supply(), 500);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_issuance_limit_bounded_by_id_space() {
        let mut ledger = new_ledger(100);

        assert!(matches!(
            ledger.set_max_issuable(&admin(), units::MAX_ORDINAL + 1),
            Err(LedgerError::InvalidIssuanceLimit { issued: 0, .. })
        ));
        assert_eq!(ledger.max_issuable(), 100);

        ledger.set_max_issuable(&admin(), units::MAX_ORDINAL).unwrap();
        assert!(ledger.is_valid_unit_id(unit_id(units::MAX_ORDINAL)));
        assert!(!ledger.is_valid_unit_id(UNIT_ID_PREFIX));
    }

    #[test]
    fn test_supply_cap() {
        let alice = user("alice");
        let config = LedgerConfig::default()
            .with_unit_size(UNIT)
            .with_max_supply(5 * UNIT);
        let mut ledger = Ledger::new(config, SingleAdmin(admin())).unwrap();

        ledger.mint(&admin(), &alice, 4 * UNIT).unwrap();
        assert!(matches!(
            ledger.mint(&admin(), &alice, UNIT + 1),
            Err(LedgerError::SupplyCapExceeded { .. })
        ));
        assert!(matches!(
            ledger.set_max_supply(&admin(), Some(3 * UNIT)),
            Err(LedgerError::SupplyCapExceeded { .. })
        ));
        ledger.set_max_supply(&admin(), None).unwrap();
        ledger.mint(&admin(), &alice, 10 * UNIT).unwrap();
        assert_eq!(ledger.total_supply(), 14 * UNIT);
    }

    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<u64>>>,
    }

    impl LedgerObserver for Recorder {
        fn on_commit(&mut self, receipt: &Receipt) {
            self.seen.lock().unwrap().push(receipt.sequence);
        }
    }

    #[test]
    fn test_observers_and_journal() {
        let alice = user("alice");
        let bob = user("bob");
        let recorder = Recorder::default();
        let mut ledger = new_ledger(100);
        ledger.add_observer(recorder.clone());

        ledger.mint_with_units(&admin(), &alice, 3 * UNIT).unwrap();
        ledger.transfer(&alice, &bob, UNIT).unwrap();
        let failed = ledger.transact(|l| {
            l.transfer(&alice, &bob, UNIT)?;
            l.transfer(&bob, &alice, 100 * UNIT)
        });
        assert!(failed.is_err());
        ledger
            .transact(|l| l.transfer(&bob, &alice, UNIT))
            .unwrap();

        assert_eq!(*recorder.seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(ledger.journal().len(), 3);
        assert_eq!(ledger.verify_journal().unwrap(), JournalVerification::Valid);
        assert_eq!(ledger.balance_of(&alice), 3 * UNIT);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_invariants_hold_across_mixed_operations() {
        let accounts: Vec<AccountId> = ["a", "b", "c", "d"].iter().map(|l| user(l)).collect();
        let mut ledger = new_ledger(40);
        for account in &accounts {
            ledger.mint_with_units(&admin(), account, 7 * UNIT + 123_456).unwrap();
        }

        // Deterministic linear congruential sequence
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            seed >> 33
        };

        for _ in 0..400 {
            let from = accounts[(next() % 4) as usize];
            let to = accounts[(next() % 4) as usize];
            let amount = u128::from(next() % (3 * UNIT as u64));
            let before = ledger.balance_of(&from) + if from == to { 0 } else { ledger.balance_of(&to) };

            let _ = match next() % 5 {
                0 | 1 => ledger.transfer(&from, &to, amount),
                2 => ledger.promote_to_units(&from),
                3 => match ledger.units_of(&from).first().copied() {
                    Some(id) => ledger.transfer_unit_from(&from, &from, &to, id),
                    None => ledger.burn(&from, amount / 10),
                },
                _ => ledger.burn(&from, amount / 10),
            };

            let after = ledger.balance_of(&from) + if from == to { 0 } else { ledger.balance_of(&to) };
            assert!(after <= before);
            for account in &accounts {
                assert_eq!(
                    ledger.balance_of(account),
                    ledger.loose_balance(account) + ledger.unit_count(account) as u128 * UNIT
                );
            }
            ledger.check_invariants().unwrap();
        }
    }
}
