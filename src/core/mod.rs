mod compare;
mod config;
mod engine;
mod error;
mod ledger;
mod strategist;
mod tax;
mod types;

pub use compare::{ScenarioComparison, compare_scenarios};
pub use config::{build_ledger, validate};
pub use engine::{project, summarize};
pub use error::{ConfigurationError, LedgerError, ProjectionError};
pub use ledger::{
    Account, AccountKind, AccountLedger, ContributionTax, GrowthTax, RMD_START_AGE, TaxTreatment,
    Withdrawal, WithdrawalTax, rmd_divisor,
};
pub use strategist::{
    ContributionOutcome, Settlement, WithdrawalPurpose, WithdrawalRequest, WithdrawalStrategist,
    contribute,
};
pub use tax::{
    FilingStatus, SocialSecurityTaxation, StateOfResidence, TaxBreakdown, TaxProfile,
    TaxableIncome, assess, capital_gains_tax, contribution_tax_benefit, federal_income_tax,
    federal_marginal_rate, fica_tax, state_tax, taxable_social_security,
};
pub use types::{
    AccountSeed, AccountSnapshot, ContributionAllocation, Household, IncomeBreakdown,
    ModelAssumptions, Person, ProjectionResult, ProjectionSummary, Scenario, SocialSecurity,
    TaxesPaid, WithdrawalOrder, YearRecord,
};
