use std::collections::BTreeMap;

use super::error::LedgerError;
use super::ledger::{AccountKind, AccountLedger, ContributionTax, Withdrawal, WithdrawalTax};
use super::types::{ContributionAllocation, WithdrawalOrder};

const CASH_EPSILON: f64 = 1e-9;
const PRO_RATA_ROUNDS: usize = 4;

const TAX_EFFICIENT_SEQUENCE: [AccountKind; 6] = [
    AccountKind::Taxable,
    AccountKind::Traditional401k,
    AccountKind::TraditionalIra,
    AccountKind::Roth401k,
    AccountKind::RothIra,
    AccountKind::Hsa,
];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WithdrawalPurpose {
    General,
    Medical,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WithdrawalRequest {
    pub amount: f64,
    pub purpose: WithdrawalPurpose,
}

impl WithdrawalRequest {
    pub fn general(amount: f64) -> Self {
        Self {
            amount,
            purpose: WithdrawalPurpose::General,
        }
    }

    pub fn medical(amount: f64) -> Self {
        Self {
            amount,
            purpose: WithdrawalPurpose::Medical,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settlement {
    pub withdrawn: BTreeMap<AccountKind, f64>,
    pub rmd_withdrawn: f64,
    pub rmd_reinvested: f64,
    pub gross_withdrawn: f64,
    pub cash_delivered: f64,
    pub ordinary_income: f64,
    pub realized_gains: f64,
    pub tax_free: f64,
    pub shortfall: f64,
}

impl Settlement {
    fn record(&mut self, kind: AccountKind, withdrawal: Withdrawal, purpose: WithdrawalPurpose) {
        if withdrawal.amount <= 0.0 {
            return;
        }
        *self.withdrawn.entry(kind).or_insert(0.0) += withdrawal.amount;
        self.gross_withdrawn += withdrawal.amount;

        match kind.treatment().withdrawal {
            WithdrawalTax::Ordinary => self.ordinary_income += withdrawal.amount,
            WithdrawalTax::TaxFree => self.tax_free += withdrawal.amount,
            WithdrawalTax::GainsOnly => {
                self.realized_gains += withdrawal.realized_gain;
                self.tax_free += withdrawal.return_of_basis;
            }
            WithdrawalTax::TaxFreeIfMedical => match purpose {
                WithdrawalPurpose::Medical => self.tax_free += withdrawal.amount,
                WithdrawalPurpose::General => self.ordinary_income += withdrawal.amount,
            },
        }
    }

    pub fn withdrawn_from(&self, kind: AccountKind) -> f64 {
        self.withdrawn.get(&kind).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContributionOutcome {
    pub total: f64,
    pub pre_tax: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WithdrawalStrategist {
    order: WithdrawalOrder,
}

impl WithdrawalStrategist {
    pub fn new(order: WithdrawalOrder) -> Self {
        Self { order }
    }

    // Takes forced RMDs, then funds `requests`. `owner_ages` is indexed by
    // account owner. Running out of money is reported as shortfall, never as
    // an error.
    pub fn execute(
        &self,
        ledger: &mut AccountLedger,
        owner_ages: &[u32],
        requests: &[WithdrawalRequest],
    ) -> Result<Settlement, LedgerError> {
        let mut settlement = Settlement::default();

        let mut general = 0.0;
        let mut medical = 0.0;
        for request in requests {
            let amount = if request.amount.is_finite() {
                request.amount.max(0.0)
            } else {
                return Err(LedgerError::InvalidAmount(request.amount));
            };
            match request.purpose {
                WithdrawalPurpose::General => general += amount,
                WithdrawalPurpose::Medical => medical += amount,
            }
        }

        let mut pool = take_required_distributions(ledger, owner_ages, &mut settlement)?;
        let covered = pool.min(general);
        general -= covered;
        pool -= covered;
        let covered = pool.min(medical);
        medical -= covered;
        pool -= covered;

        if medical > CASH_EPSILON {
            let withdrawal = draw(ledger, AccountKind::Hsa, medical)?;
            medical -= withdrawal.amount;
            settlement.record(AccountKind::Hsa, withdrawal, WithdrawalPurpose::Medical);
        }

        // The HSA is empty whenever medical need is still open here, so the
        // remainder is funded like any other spending.
        let remaining = general + medical.max(0.0);
        let unfunded = match self.order {
            WithdrawalOrder::TaxEfficient => {
                draw_in_sequence(ledger, &TAX_EFFICIENT_SEQUENCE, remaining, &mut settlement)?
            }
            WithdrawalOrder::ProRata => draw_pro_rata(ledger, remaining, &mut settlement)?,
        };

        if pool > CASH_EPSILON {
            ledger.deposit(AccountKind::Taxable, pool)?;
            settlement.rmd_reinvested = pool;
        }
        settlement.cash_delivered = settlement.gross_withdrawn - settlement.rmd_reinvested;
        settlement.shortfall = if unfunded > CASH_EPSILON {
            unfunded
        } else {
            0.0
        };

        tracing::trace!(
            gross = settlement.gross_withdrawn,
            rmd = settlement.rmd_withdrawn,
            shortfall = settlement.shortfall,
            "withdrawals settled"
        );
        Ok(settlement)
    }

    pub fn preview(
        &self,
        ledger: &AccountLedger,
        owner_ages: &[u32],
        requests: &[WithdrawalRequest],
    ) -> Result<Settlement, LedgerError> {
        let mut scratch = ledger.clone();
        self.execute(&mut scratch, owner_ages, requests)
    }
}

pub fn contribute(
    ledger: &mut AccountLedger,
    amount: f64,
    allocation: &ContributionAllocation,
) -> Result<ContributionOutcome, LedgerError> {
    let mut outcome = ContributionOutcome::default();
    if amount <= 0.0 {
        return Ok(outcome);
    }

    let total_weight = allocation.total();
    if total_weight <= 0.0 {
        return Err(LedgerError::InvalidAmount(total_weight));
    }

    for (kind, weight) in allocation.weights() {
        let share = amount * weight / total_weight;
        if share <= 0.0 {
            continue;
        }
        ledger.deposit(kind, share)?;
        outcome.total += share;
        if kind.treatment().contribution == ContributionTax::PreTax {
            outcome.pre_tax += share;
        }
    }
    Ok(outcome)
}

fn take_required_distributions(
    ledger: &mut AccountLedger,
    owner_ages: &[u32],
    settlement: &mut Settlement,
) -> Result<f64, LedgerError> {
    let due: Vec<(AccountKind, f64)> = ledger
        .accounts()
        .iter()
        .filter(|account| account.kind().is_traditional())
        .filter_map(|account| {
            let age = owner_ages.get(account.owner()).copied()?;
            let rmd = ledger.required_minimum_distribution(account.kind(), age);
            (rmd > 0.0).then_some((account.kind(), rmd))
        })
        .collect();

    let mut total = 0.0;
    for (kind, rmd) in due {
        let withdrawal = draw(ledger, kind, rmd)?;
        settlement.record(kind, withdrawal, WithdrawalPurpose::General);
        total += withdrawal.amount;
    }
    settlement.rmd_withdrawn = total;
    Ok(total)
}

fn draw(ledger: &mut AccountLedger, kind: AccountKind, amount: f64) -> Result<Withdrawal, LedgerError> {
    match ledger.withdraw(kind, amount) {
        Err(LedgerError::InsufficientFunds { available, .. }) => ledger.withdraw(kind, available),
        other => other,
    }
}

fn draw_in_sequence(
    ledger: &mut AccountLedger,
    sequence: &[AccountKind],
    amount: f64,
    settlement: &mut Settlement,
) -> Result<f64, LedgerError> {
    let mut remaining = amount;
    for kind in sequence {
        if remaining <= CASH_EPSILON {
            break;
        }
        let withdrawal = draw(ledger, *kind, remaining)?;
        remaining -= withdrawal.amount;
        settlement.record(*kind, withdrawal, WithdrawalPurpose::General);
    }
    Ok(remaining.max(0.0))
}

fn draw_pro_rata(
    ledger: &mut AccountLedger,
    amount: f64,
    settlement: &mut Settlement,
) -> Result<f64, LedgerError> {
    let mut remaining = amount;

    for _ in 0..PRO_RATA_ROUNDS {
        if remaining <= CASH_EPSILON {
            break;
        }
        let capacity = ledger.total();
        if capacity <= CASH_EPSILON {
            break;
        }

        let targets: Vec<(AccountKind, f64)> = ledger
            .accounts()
            .iter()
            .map(|account| (account.kind(), remaining * account.balance() / capacity))
            .collect();

        let mut round = 0.0;
        for (kind, target) in targets {
            let withdrawal = draw(ledger, kind, target)?;
            round += withdrawal.amount;
            settlement.record(kind, withdrawal, WithdrawalPurpose::General);
        }
        remaining -= round;
        if round <= CASH_EPSILON {
            break;
        }
    }

    draw_in_sequence(ledger, &TAX_EFFICIENT_SEQUENCE, remaining, settlement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tax::{
        FilingStatus, SocialSecurityTaxation, StateOfResidence, TaxProfile, TaxableIncome, assess,
    };
    use proptest::prelude::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn mixed_ledger() -> AccountLedger {
        let mut ledger = AccountLedger::new();
        ledger
            .open(AccountKind::Taxable, 0, 100_000.0, 80_000.0)
            .expect("taxable");
        ledger
            .open(AccountKind::Traditional401k, 0, 200_000.0, 0.0)
            .expect("401k");
        ledger.open(AccountKind::RothIra, 0, 50_000.0, 0.0).expect("roth");
        ledger.open(AccountKind::Hsa, 0, 20_000.0, 0.0).expect("hsa");
        ledger
    }

    fn tax_efficient() -> WithdrawalStrategist {
        WithdrawalStrategist::new(WithdrawalOrder::TaxEfficient)
    }

    #[test]
    fn tax_efficient_order_falls_through_to_traditional() {
        let mut ledger = mixed_ledger();
        let settlement = tax_efficient()
            .execute(&mut ledger, &[60], &[WithdrawalRequest::general(130_000.0)])
            .expect("execute");

        assert_approx(settlement.withdrawn_from(AccountKind::Taxable), 100_000.0);
        assert_approx(settlement.withdrawn_from(AccountKind::Traditional401k), 30_000.0);
        assert_approx(settlement.realized_gains, 20_000.0);
        assert_approx(settlement.ordinary_income, 30_000.0);
        assert_approx(settlement.tax_free, 80_000.0);
        assert_approx(ledger.balance(AccountKind::Taxable), 0.0);
        assert_approx(ledger.balance(AccountKind::RothIra), 50_000.0);
        assert_approx(settlement.shortfall, 0.0);
    }

    #[test]
    fn medical_request_uses_hsa_tax_free() {
        let mut ledger = mixed_ledger();
        let settlement = tax_efficient()
            .execute(
                &mut ledger,
                &[60],
                &[
                    WithdrawalRequest::medical(5_000.0),
                    WithdrawalRequest::general(10_000.0),
                ],
            )
            .expect("execute");

        assert_approx(settlement.withdrawn_from(AccountKind::Hsa), 5_000.0);
        assert_approx(settlement.withdrawn_from(AccountKind::Taxable), 10_000.0);
        assert_approx(settlement.ordinary_income, 0.0);
        assert_approx(ledger.balance(AccountKind::Hsa), 15_000.0);
    }

    #[test]
    fn non_medical_hsa_draw_is_last_and_ordinary() {
        let mut ledger = AccountLedger::new();
        ledger.open(AccountKind::RothIra, 0, 1_000.0, 0.0).expect("roth");
        ledger.open(AccountKind::Hsa, 0, 5_000.0, 0.0).expect("hsa");

        let settlement = tax_efficient()
            .execute(&mut ledger, &[50], &[WithdrawalRequest::general(3_000.0)])
            .expect("execute");

        assert_approx(settlement.withdrawn_from(AccountKind::RothIra), 1_000.0);
        assert_approx(settlement.withdrawn_from(AccountKind::Hsa), 2_000.0);
        assert_approx(settlement.ordinary_income, 2_000.0);
        assert_approx(settlement.tax_free, 1_000.0);
    }

    #[test]
    fn rmd_is_forced_and_surplus_reinvested() {
        let mut ledger = AccountLedger::new();
        ledger
            .open(AccountKind::Traditional401k, 0, 500_000.0, 0.0)
            .expect("open");

        let settlement = tax_efficient()
            .execute(&mut ledger, &[80], &[WithdrawalRequest::general(10_000.0)])
            .expect("execute");

        let rmd = 500_000.0 / 20.2;
        assert_approx(settlement.rmd_withdrawn, rmd);
        assert_approx(settlement.withdrawn_from(AccountKind::Traditional401k), rmd);
        assert_approx(settlement.ordinary_income, rmd);
        assert_approx(settlement.cash_delivered, 10_000.0);
        assert_approx(settlement.rmd_reinvested, rmd - 10_000.0);
        assert_approx(ledger.balance(AccountKind::Taxable), rmd - 10_000.0);
        assert_approx(ledger.cost_basis(AccountKind::Taxable), rmd - 10_000.0);
    }

    #[test]
    fn rmd_skipped_below_start_age() {
        let mut ledger = AccountLedger::new();
        ledger
            .open(AccountKind::TraditionalIra, 0, 500_000.0, 0.0)
            .expect("open");
        let settlement = tax_efficient()
            .execute(&mut ledger, &[72], &[])
            .expect("execute");
        assert_approx(settlement.rmd_withdrawn, 0.0);
        assert_approx(ledger.balance(AccountKind::TraditionalIra), 500_000.0);
    }

    #[test]
    fn rmd_uses_the_owners_age() {
        let mut ledger = AccountLedger::new();
        ledger
            .open(AccountKind::TraditionalIra, 1, 100_000.0, 0.0)
            .expect("open");
        let settlement = tax_efficient()
            .execute(&mut ledger, &[80, 65], &[])
            .expect("execute");
        assert_approx(settlement.rmd_withdrawn, 0.0);
    }

    #[test]
    fn exhausted_accounts_report_shortfall() {
        let mut ledger = mixed_ledger();
        let settlement = tax_efficient()
            .execute(&mut ledger, &[60], &[WithdrawalRequest::general(400_000.0)])
            .expect("execute");
        assert_approx(settlement.gross_withdrawn, 370_000.0);
        assert_approx(settlement.shortfall, 30_000.0);
        assert_approx(ledger.total(), 0.0);
    }

    #[test]
    fn pro_rata_draws_in_proportion_to_balances() {
        let mut ledger = mixed_ledger();
        let settlement = WithdrawalStrategist::new(WithdrawalOrder::ProRata)
            .execute(&mut ledger, &[60], &[WithdrawalRequest::general(37_000.0)])
            .expect("execute");

        assert_approx(settlement.withdrawn_from(AccountKind::Taxable), 10_000.0);
        assert_approx(settlement.withdrawn_from(AccountKind::Traditional401k), 20_000.0);
        assert_approx(settlement.withdrawn_from(AccountKind::RothIra), 5_000.0);
        assert_approx(settlement.withdrawn_from(AccountKind::Hsa), 2_000.0);
        assert_approx(settlement.cash_delivered, 37_000.0);
    }

    #[test]
    fn preview_leaves_ledger_untouched() {
        let ledger = mixed_ledger();
        let before = ledger.clone();
        let settlement = tax_efficient()
            .preview(&ledger, &[60], &[WithdrawalRequest::general(50_000.0)])
            .expect("preview");
        assert_approx(settlement.gross_withdrawn, 50_000.0);
        assert_eq!(ledger, before);
    }

    #[test]
    fn fifty_thousand_from_taxable_is_untaxed_but_costs_tax_from_traditional() {
        let profile = TaxProfile {
            filing_status: FilingStatus::Single,
            state: StateOfResidence::Texas,
            social_security_taxation: SocialSecurityTaxation::FullyTaxable,
        };
        let tax_on = |kind: AccountKind, basis: f64| {
            let mut ledger = AccountLedger::new();
            ledger.open(kind, 0, 500_000.0, basis).expect("open");
            let settlement = tax_efficient()
                .execute(&mut ledger, &[65], &[WithdrawalRequest::general(50_000.0)])
                .expect("execute");
            let income = TaxableIncome {
                ordinary: settlement.ordinary_income,
                long_term_gains: settlement.realized_gains,
                ..Default::default()
            };
            assess(&income, &profile).total
        };

        assert_approx(tax_on(AccountKind::Taxable, 400_000.0), 0.0);
        assert_approx(tax_on(AccountKind::RothIra, 0.0), 0.0);
        assert_approx(tax_on(AccountKind::TraditionalIra, 0.0), 4_016.0);
    }

    #[test]
    fn contribution_follows_allocation_weights() {
        let mut ledger = AccountLedger::new();
        let allocation =
            ContributionAllocation::from([(AccountKind::Traditional401k, 0.6), (AccountKind::Taxable, 0.4)]);
        let outcome = contribute(&mut ledger, 10_000.0, &allocation).expect("contribute");

        assert_approx(outcome.total, 10_000.0);
        assert_approx(outcome.pre_tax, 6_000.0);
        assert_approx(ledger.balance(AccountKind::Traditional401k), 6_000.0);
        assert_approx(ledger.balance(AccountKind::Taxable), 4_000.0);
        assert_approx(ledger.cost_basis(AccountKind::Taxable), 4_000.0);
    }

    proptest! {
        #[test]
        fn prop_taxable_covers_need_alone(pct in 0u32..=100) {
            let mut ledger = mixed_ledger();
            let need = 100_000.0 * pct as f64 / 100.0;
            let settlement = tax_efficient()
                .execute(&mut ledger, &[60], &[WithdrawalRequest::general(need)])
                .expect("execute");

            prop_assert!((settlement.withdrawn_from(AccountKind::Taxable) - need).abs() <= EPS);
            prop_assert_eq!(ledger.balance(AccountKind::Traditional401k), 200_000.0);
            prop_assert_eq!(ledger.balance(AccountKind::RothIra), 50_000.0);
            prop_assert_eq!(ledger.balance(AccountKind::Hsa), 20_000.0);
        }

        #[test]
        fn prop_withdrawals_conserve_value(
            need in 0u32..500_000,
            medical in 0u32..30_000,
            age in 55u32..95,
            pro_rata in any::<bool>()
        ) {
            let order = if pro_rata { WithdrawalOrder::ProRata } else { WithdrawalOrder::TaxEfficient };
            let mut ledger = mixed_ledger();
            let before = ledger.total();
            let settlement = WithdrawalStrategist::new(order)
                .execute(
                    &mut ledger,
                    &[age],
                    &[
                        WithdrawalRequest::general(need as f64),
                        WithdrawalRequest::medical(medical as f64),
                    ],
                )
                .expect("execute");

            let after = ledger.total();
            prop_assert!((before - settlement.gross_withdrawn + settlement.rmd_reinvested - after).abs() <= 1e-4);
            let requested = need as f64 + medical as f64;
            prop_assert!((settlement.cash_delivered + settlement.shortfall - requested).abs() <= 1e-4);
            let split = settlement.ordinary_income + settlement.realized_gains + settlement.tax_free;
            prop_assert!((split - settlement.gross_withdrawn).abs() <= 1e-4);
        }
    }
}
