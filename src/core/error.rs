use thiserror::Error;

use super::ledger::AccountKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("household must have between 1 and {max} persons, got {count}")]
    PersonCount { count: usize, max: usize },

    #[error("{person}: retirement age {retirement_age} is before current age {current_age}")]
    RetirementBeforeCurrentAge {
        person: String,
        current_age: u32,
        retirement_age: u32,
    },

    #[error("{field} must be at most {max}, got {age}")]
    InvalidAge { field: String, age: u32, max: u32 },

    #[error("{field} must be a finite amount >= 0, got {value}")]
    InvalidAmount { field: String, value: f64 },

    #[error("{field} must be a finite rate in {min}..={max}, got {value}")]
    InvalidRate {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("forecast horizon must be 1..={max} years, got {years}")]
    InvalidHorizon { years: u32, max: u32 },

    #[error("unsupported state of residence: {0}")]
    UnsupportedState(String),

    #[error("contribution allocation is empty")]
    EmptyAllocation,

    #[error("contribution weight for {kind} must be >= 0, got {weight}")]
    NegativeAllocationWeight { kind: AccountKind, weight: f64 },

    #[error("contribution weights must sum to 100%, got {:.4}%", total * 100.0)]
    AllocationSum { total: f64 },

    #[error("more than one {0} account configured")]
    DuplicateAccount(AccountKind),

    #[error("{kind} account owner #{owner} is not a household member")]
    UnknownAccountOwner { kind: AccountKind, owner: usize },

    #[error("cost basis only applies to taxable accounts, not {0}")]
    BasisNotApplicable(AccountKind),

    #[error("{kind} cost basis {basis} exceeds balance {balance}")]
    BasisExceedsBalance {
        kind: AccountKind,
        basis: f64,
        balance: f64,
    },

    #[error("starting assets {declared} do not match account balances {accounts}")]
    StartingAssetsMismatch { declared: f64, accounts: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("insufficient funds in {kind}: requested {requested}, available {available}")]
    InsufficientFunds {
        kind: AccountKind,
        requested: f64,
        available: f64,
    },

    #[error("amount must be finite and >= 0, got {0}")]
    InvalidAmount(f64),

    #[error("{kind} cost basis {basis} exceeds balance {balance}")]
    BasisExceedsBalance {
        kind: AccountKind,
        basis: f64,
        balance: f64,
    },

    #[error("growth rate must be finite and >= 0, got {0}")]
    InvalidRate(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("ledger invariant violated: {0}")]
    Ledger(#[from] LedgerError),
}
