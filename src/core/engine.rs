use super::config;
use super::error::ProjectionError;
use super::ledger::{AccountKind, AccountLedger};
use super::strategist::{self, Settlement, WithdrawalRequest, WithdrawalStrategist};
use super::tax::{self, FilingStatus, TaxBreakdown, TaxProfile, TaxableIncome};
use super::types::{
    AccountSeed, AccountSnapshot, ContributionAllocation, Household, IncomeBreakdown,
    ModelAssumptions, Person, ProjectionResult, ProjectionSummary, Scenario, TaxesPaid,
    YearRecord,
};

const GROSS_UP_ITERATIONS: usize = 60;
const CASH_EPSILON: f64 = 1e-6;
// Half a cent; anything at or below counts as no money.
const DEPLETION_THRESHOLD: f64 = 0.005;

#[derive(Debug, Clone, PartialEq)]
struct YearState {
    year_index: u32,
    ages: Vec<u32>,
    expenses: f64,
    medical_expenses: f64,
    ledger: AccountLedger,
}

#[derive(Debug, Clone, Copy)]
struct PersonIncome {
    cash: f64,
    equity_vesting: f64,
    retirement: f64,
    social_security: f64,
    working: bool,
}

impl PersonIncome {
    fn earned(self) -> f64 {
        self.cash + self.equity_vesting
    }
}

struct YearContext<'a> {
    household: &'a Household,
    allocation: &'a ContributionAllocation,
    profile: TaxProfile,
    strategist: WithdrawalStrategist,
}

impl Scenario {
    pub fn project(&self) -> Result<ProjectionResult, ProjectionError> {
        project(
            &self.household,
            &self.accounts,
            &self.contribution_allocation,
            self.household.horizon_years,
        )
    }
}

pub fn project(
    household: &Household,
    accounts: &[AccountSeed],
    allocation: &ContributionAllocation,
    horizon_years: u32,
) -> Result<ProjectionResult, ProjectionError> {
    config::validate(household, accounts, allocation, horizon_years)?;
    let ledger = config::build_ledger(household, accounts)?;

    let ctx = YearContext {
        household,
        allocation,
        profile: TaxProfile {
            filing_status: FilingStatus::for_household_size(household.persons.len()),
            state: household.state,
            social_security_taxation: household.social_security_taxation,
        },
        strategist: WithdrawalStrategist::new(household.withdrawal_order),
    };

    let mut state = YearState::initial(household, ledger);
    let mut records = Vec::with_capacity(horizon_years as usize);
    for _ in 0..horizon_years {
        let (next, record) = state.advance(&ctx)?;
        tracing::debug!(
            year = record.year,
            assets = record.nominal_assets,
            taxes = record.taxes.total,
            shortfall = record.shortfall,
            "projected year"
        );
        records.push(record);
        state = next;
    }

    let summary = summarize(&records);
    if let Some(year) = summary.depletion_year {
        tracing::warn!(year, shortfall = summary.total_shortfall, "assets depleted");
    }

    Ok(ProjectionResult {
        records,
        summary,
        assumptions: ModelAssumptions {
            social_security_taxation: household.social_security_taxation,
            social_security_cola: household.social_security_cola,
            withdrawal_order: household.withdrawal_order,
            non_medical_hsa_taxed_as_ordinary: true,
        },
    })
}

impl YearState {
    fn initial(household: &Household, ledger: AccountLedger) -> Self {
        Self {
            year_index: 0,
            ages: household.persons.iter().map(|p| p.age).collect(),
            expenses: household.annual_expenses,
            medical_expenses: household.annual_medical_expenses,
            ledger,
        }
    }

    fn advance(&self, ctx: &YearContext<'_>) -> Result<(YearState, YearRecord), ProjectionError> {
        let household = ctx.household;
        let t = self.year_index;

        let incomes: Vec<PersonIncome> = household
            .persons
            .iter()
            .zip(&self.ages)
            .map(|(person, age)| person_income(person, *age, t, household))
            .collect();
        let working = incomes.iter().any(|income| income.working);
        let income = IncomeBreakdown {
            cash: incomes.iter().map(|i| i.cash).sum(),
            equity_vesting: incomes.iter().map(|i| i.equity_vesting).sum(),
            retirement: incomes.iter().map(|i| i.retirement).sum(),
            social_security: incomes.iter().map(|i| i.social_security).sum(),
            total: incomes
                .iter()
                .map(|i| i.earned() + i.retirement + i.social_security)
                .sum(),
        };
        let earned: Vec<f64> = incomes.iter().map(|i| i.earned()).collect();
        let base_income = TaxableIncome {
            ordinary: income.cash + income.equity_vesting + income.retirement,
            earned: &earned,
            social_security: income.social_security,
            long_term_gains: 0.0,
        };

        let mut ledger = self.ledger.clone();
        let before_growth = ledger.total();
        ledger.grow(household.return_rate)?;
        let investment_growth = ledger.total() - before_growth;

        let income_tax = tax::assess(&base_income, &ctx.profile);
        let savings = if working { household.annual_savings } else { 0.0 };
        let need = self.expenses + income_tax.total - income.total - savings;

        let gross = gross_withdrawal(
            ctx,
            &ledger,
            &self.ages,
            &base_income,
            &income_tax,
            need,
            self.medical_expenses,
        )?;
        let settlement = ctx.strategist.execute(
            &mut ledger,
            &self.ages,
            &requests_for(gross, self.medical_expenses),
        )?;
        let total_tax = tax::assess(&with_withdrawals(&base_income, &settlement), &ctx.profile);
        let withdrawal_tax = total_tax.total - income_tax.total;

        let available = settlement.cash_delivered - withdrawal_tax;
        let surplus = available - need;
        let mut contributions = 0.0;
        let mut contribution_tax_benefit = 0.0;
        if surplus > CASH_EPSILON {
            let outcome = strategist::contribute(&mut ledger, surplus, ctx.allocation)?;
            contributions = outcome.total;
            contribution_tax_benefit = tax::contribution_tax_benefit(
                outcome.pre_tax,
                base_income.ordinary + settlement.ordinary_income,
                ctx.profile.filing_status,
            );
        }
        let shortfall = if need - available > DEPLETION_THRESHOLD {
            need - available
        } else {
            0.0
        };

        let nominal_assets = ledger.total();
        let deflator = (1.0 + household.inflation_rate).powi(t as i32);
        let record = YearRecord {
            year_index: t,
            year: household.start_year + t as i32,
            ages: self.ages.clone(),
            working,
            income,
            expenses: self.expenses,
            medical_expenses: self.medical_expenses,
            taxes: TaxesPaid {
                ordinary: total_tax.ordinary(),
                capital_gains: total_tax.capital_gains,
                total: total_tax.total,
                on_withdrawals: withdrawal_tax,
                breakdown: total_tax,
            },
            investment_growth,
            withdrawals: settlement.gross_withdrawn,
            contributions,
            rmd_withdrawn: settlement.rmd_withdrawn,
            rmd_reinvested: settlement.rmd_reinvested,
            realized_gains: settlement.realized_gains,
            contribution_tax_benefit,
            net_cash_flow: -need,
            shortfall,
            balances: snapshot(&ledger),
            nominal_assets,
            real_assets: nominal_assets / deflator,
        };

        let next = YearState {
            year_index: t + 1,
            ages: self.ages.iter().map(|age| age + 1).collect(),
            expenses: self.expenses * (1.0 + household.expense_growth_rate),
            medical_expenses: self.medical_expenses * (1.0 + household.expense_growth_rate),
            ledger,
        };
        Ok((next, record))
    }
}

fn person_income(person: &Person, age: u32, year_index: u32, household: &Household) -> PersonIncome {
    let working = age < person.retirement_age;
    let raise = (1.0 + person.income_growth_rate).powi(year_index as i32);
    let social_security = match &person.social_security {
        Some(ss) if age >= ss.start_age => {
            if household.social_security_cola {
                ss.annual_benefit * (1.0 + household.inflation_rate).powi(year_index as i32)
            } else {
                ss.annual_benefit
            }
        }
        _ => 0.0,
    };

    PersonIncome {
        cash: if working { person.salary * raise } else { 0.0 },
        equity_vesting: if working {
            person.equity_vesting() * raise
        } else {
            0.0
        },
        retirement: if working {
            0.0
        } else {
            person.retirement_income()
        },
        social_security,
        working,
    }
}

fn with_withdrawals<'a>(base: &TaxableIncome<'a>, settlement: &Settlement) -> TaxableIncome<'a> {
    TaxableIncome {
        ordinary: base.ordinary + settlement.ordinary_income,
        long_term_gains: base.long_term_gains + settlement.realized_gains,
        ..*base
    }
}

fn requests_for(gross: f64, medical_expenses: f64) -> Vec<WithdrawalRequest> {
    let medical = medical_expenses.min(gross).max(0.0);
    vec![
        WithdrawalRequest::medical(medical),
        WithdrawalRequest::general(gross - medical),
    ]
}

fn net_after_withdrawal_tax(
    ctx: &YearContext<'_>,
    ledger: &AccountLedger,
    ages: &[u32],
    base: &TaxableIncome<'_>,
    income_tax: &TaxBreakdown,
    gross: f64,
    medical_expenses: f64,
) -> Result<f64, ProjectionError> {
    let settlement = ctx
        .strategist
        .preview(ledger, ages, &requests_for(gross, medical_expenses))?;
    let total = tax::assess(&with_withdrawals(base, &settlement), &ctx.profile);
    Ok(settlement.cash_delivered - (total.total - income_tax.total))
}

// Bisects the gross withdrawal whose after-tax cash covers `need`. When even
// a full liquidation falls short, returns the full liquidation.
fn gross_withdrawal(
    ctx: &YearContext<'_>,
    ledger: &AccountLedger,
    ages: &[u32],
    base: &TaxableIncome<'_>,
    income_tax: &TaxBreakdown,
    need: f64,
    medical_expenses: f64,
) -> Result<f64, ProjectionError> {
    let net = |gross: f64| {
        net_after_withdrawal_tax(ctx, ledger, ages, base, income_tax, gross, medical_expenses)
    };

    let capacity = ledger.total();
    if net(0.0)? >= need {
        return Ok(0.0);
    }
    if net(capacity)? < need {
        return Ok(capacity);
    }

    let mut lo = 0.0;
    let mut hi = capacity;
    for _ in 0..GROSS_UP_ITERATIONS {
        let mid = (lo + hi) * 0.5;
        if net(mid)? < need {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(hi)
}

fn snapshot(ledger: &AccountLedger) -> AccountSnapshot {
    AccountSnapshot {
        traditional_401k: ledger.balance(AccountKind::Traditional401k),
        traditional_ira: ledger.balance(AccountKind::TraditionalIra),
        roth_401k: ledger.balance(AccountKind::Roth401k),
        roth_ira: ledger.balance(AccountKind::RothIra),
        taxable: ledger.balance(AccountKind::Taxable),
        taxable_cost_basis: ledger.cost_basis(AccountKind::Taxable),
        hsa: ledger.balance(AccountKind::Hsa),
    }
}

pub fn summarize(records: &[YearRecord]) -> ProjectionSummary {
    let retirement = records.iter().find(|r| !r.working);

    let mut peak_assets = f64::NEG_INFINITY;
    let mut peak_year = 0;
    for record in records {
        if record.nominal_assets > peak_assets {
            peak_assets = record.nominal_assets;
            peak_year = record.year;
        }
    }
    if records.is_empty() {
        peak_assets = 0.0;
    }

    ProjectionSummary {
        retirement_year: retirement.map(|r| r.year),
        assets_at_retirement: retirement.map(|r| r.nominal_assets),
        peak_assets,
        peak_year,
        final_assets: records.last().map_or(0.0, |r| r.nominal_assets),
        final_year: records.last().map_or(0, |r| r.year),
        total_taxes: records.iter().map(|r| r.taxes.total).sum(),
        total_investment_growth: records.iter().map(|r| r.investment_growth).sum(),
        total_shortfall: records.iter().map(|r| r.shortfall).sum(),
        depletion_year: records
            .iter()
            .find(|r| r.nominal_assets <= DEPLETION_THRESHOLD)
            .map(|r| r.year),
    }
}
