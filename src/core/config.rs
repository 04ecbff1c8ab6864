use std::collections::BTreeSet;

use super::error::{ConfigurationError, ProjectionError};
use super::ledger::{AccountKind, AccountLedger};
use super::types::{
    AccountSeed, ContributionAllocation, DEFAULT_TAXABLE_BASIS_FRACTION, Household, MAX_AGE,
    MAX_HORIZON_YEARS, MAX_PERSONS,
};

const ALLOCATION_TOLERANCE: f64 = 1e-3;
const STARTING_ASSETS_TOLERANCE: f64 = 0.01;

pub fn validate_household(household: &Household) -> Result<(), ConfigurationError> {
    let count = household.persons.len();
    if count == 0 || count > MAX_PERSONS {
        return Err(ConfigurationError::PersonCount {
            count,
            max: MAX_PERSONS,
        });
    }

    for person in &household.persons {
        age(&format!("{}.age", person.name), person.age)?;
        age(&format!("{}.retirementAge", person.name), person.retirement_age)?;
        if person.retirement_age < person.age {
            return Err(ConfigurationError::RetirementBeforeCurrentAge {
                person: person.name.clone(),
                current_age: person.age,
                retirement_age: person.retirement_age,
            });
        }
        amount(&format!("{}.salary", person.name), person.salary)?;
        if let Some(vesting) = person.equity_vesting {
            amount(&format!("{}.equityVesting", person.name), vesting)?;
        }
        if let Some(income) = person.retirement_income {
            amount(&format!("{}.retirementIncome", person.name), income)?;
        }
        if let Some(social_security) = &person.social_security {
            age(
                &format!("{}.socialSecurity.startAge", person.name),
                social_security.start_age,
            )?;
            amount(
                &format!("{}.socialSecurity.annualBenefit", person.name),
                social_security.annual_benefit,
            )?;
        }
        growth_rate(
            &format!("{}.incomeGrowthRate", person.name),
            person.income_growth_rate,
        )?;
    }

    amount("startingAssets", household.starting_assets)?;
    amount("annualExpenses", household.annual_expenses)?;
    amount("annualMedicalExpenses", household.annual_medical_expenses)?;
    amount("annualSavings", household.annual_savings)?;
    if household.annual_medical_expenses > household.annual_expenses {
        return Err(ConfigurationError::InvalidAmount {
            field: "annualMedicalExpenses".to_string(),
            value: household.annual_medical_expenses,
        });
    }

    if !household.return_rate.is_finite() || !(0.0..=1.0).contains(&household.return_rate) {
        return Err(ConfigurationError::InvalidRate {
            field: "returnRate".to_string(),
            value: household.return_rate,
            min: 0.0,
            max: 1.0,
        });
    }
    growth_rate("expenseGrowthRate", household.expense_growth_rate)?;
    growth_rate("inflationRate", household.inflation_rate)?;

    Ok(())
}

pub fn validate_horizon(years: u32) -> Result<(), ConfigurationError> {
    if years == 0 || years > MAX_HORIZON_YEARS {
        return Err(ConfigurationError::InvalidHorizon {
            years,
            max: MAX_HORIZON_YEARS,
        });
    }
    Ok(())
}

pub fn validate_allocation(allocation: &ContributionAllocation) -> Result<(), ConfigurationError> {
    if allocation.0.is_empty() {
        return Err(ConfigurationError::EmptyAllocation);
    }
    for (kind, weight) in allocation.weights() {
        if !weight.is_finite() || weight < 0.0 {
            return Err(ConfigurationError::NegativeAllocationWeight { kind, weight });
        }
    }
    let total = allocation.total();
    if (total - 1.0).abs() > ALLOCATION_TOLERANCE {
        return Err(ConfigurationError::AllocationSum { total });
    }
    Ok(())
}

pub fn validate_accounts(
    household: &Household,
    accounts: &[AccountSeed],
) -> Result<(), ConfigurationError> {
    let mut seen = BTreeSet::new();
    let mut sum = 0.0;
    for seed in accounts {
        if !seen.insert(seed.kind) {
            return Err(ConfigurationError::DuplicateAccount(seed.kind));
        }
        if seed.owner >= household.persons.len() {
            return Err(ConfigurationError::UnknownAccountOwner {
                kind: seed.kind,
                owner: seed.owner,
            });
        }
        amount(&format!("{}.balance", seed.kind), seed.balance)?;
        if let Some(basis) = seed.cost_basis {
            if !seed.kind.tracks_basis() {
                return Err(ConfigurationError::BasisNotApplicable(seed.kind));
            }
            amount(&format!("{}.costBasis", seed.kind), basis)?;
            if basis > seed.balance {
                return Err(ConfigurationError::BasisExceedsBalance {
                    kind: seed.kind,
                    basis,
                    balance: seed.balance,
                });
            }
        }
        sum += seed.balance;
    }

    let declared = household.starting_assets;
    if !accounts.is_empty() && declared != 0.0 && (declared - sum).abs() > STARTING_ASSETS_TOLERANCE {
        return Err(ConfigurationError::StartingAssetsMismatch {
            declared,
            accounts: sum,
        });
    }
    Ok(())
}

pub fn validate(
    household: &Household,
    accounts: &[AccountSeed],
    allocation: &ContributionAllocation,
    horizon_years: u32,
) -> Result<(), ConfigurationError> {
    validate_household(household)?;
    validate_horizon(horizon_years)?;
    validate_accounts(household, accounts)?;
    validate_allocation(allocation)
}

pub fn build_ledger(
    household: &Household,
    accounts: &[AccountSeed],
) -> Result<AccountLedger, ProjectionError> {
    validate_accounts(household, accounts)?;

    let mut ledger = AccountLedger::new();
    if accounts.is_empty() {
        let balance = household.starting_assets;
        ledger.open(
            AccountKind::Taxable,
            0,
            balance,
            balance * DEFAULT_TAXABLE_BASIS_FRACTION,
        )?;
        return Ok(ledger);
    }

    for seed in accounts {
        ledger.open(seed.kind, seed.owner, seed.balance, seed.resolved_cost_basis())?;
    }
    Ok(ledger)
}

fn age(field: &str, value: u32) -> Result<(), ConfigurationError> {
    if value <= MAX_AGE {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidAge {
            field: field.to_string(),
            age: value,
            max: MAX_AGE,
        })
    }
}

fn amount(field: &str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidAmount {
            field: field.to_string(),
            value,
        })
    }
}

fn growth_rate(field: &str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && value > -1.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidRate {
            field: field.to_string(),
            value,
            min: -1.0,
            max: 1.0,
        })
    }
}
