use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ledger::AccountKind;
use super::tax::{SocialSecurityTaxation, StateOfResidence, TaxBreakdown};

pub const MAX_PERSONS: usize = 4;
pub const MAX_AGE: u32 = 120;
pub const MAX_HORIZON_YEARS: u32 = 100;
pub const DEFAULT_START_YEAR: i32 = 2024;
pub const DEFAULT_TAXABLE_BASIS_FRACTION: f64 = 0.8;
pub const SCENARIO_VERSION: &str = "2.1";

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawalOrder {
    #[default]
    TaxEfficient,
    ProRata,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialSecurity {
    pub start_age: u32,
    pub annual_benefit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub name: String,
    pub age: u32,
    pub retirement_age: u32,
    pub salary: f64,
    pub income_growth_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_vesting: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retirement_income: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_security: Option<SocialSecurity>,
}

impl Person {
    pub fn equity_vesting(&self) -> f64 {
        self.equity_vesting.unwrap_or(0.0)
    }

    pub fn retirement_income(&self) -> f64 {
        self.retirement_income.unwrap_or(0.0)
    }
}

fn default_start_year() -> i32 {
    DEFAULT_START_YEAR
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Household {
    pub persons: Vec<Person>,
    pub starting_assets: f64,
    pub annual_expenses: f64,
    #[serde(default)]
    pub annual_medical_expenses: f64,
    pub annual_savings: f64,
    pub return_rate: f64,
    pub expense_growth_rate: f64,
    pub inflation_rate: f64,
    pub state: StateOfResidence,
    pub horizon_years: u32,
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    #[serde(default)]
    pub social_security_taxation: SocialSecurityTaxation,
    #[serde(default)]
    pub social_security_cola: bool,
    #[serde(default)]
    pub withdrawal_order: WithdrawalOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSeed {
    pub kind: AccountKind,
    pub balance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_basis: Option<f64>,
    #[serde(default)]
    pub owner: usize,
}

impl AccountSeed {
    pub fn new(kind: AccountKind, balance: f64) -> Self {
        Self {
            kind,
            balance,
            cost_basis: None,
            owner: 0,
        }
    }

    pub fn resolved_cost_basis(&self) -> f64 {
        if !self.kind.tracks_basis() {
            return 0.0;
        }
        self.cost_basis
            .unwrap_or(self.balance * DEFAULT_TAXABLE_BASIS_FRACTION)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContributionAllocation(pub BTreeMap<AccountKind, f64>);

impl ContributionAllocation {
    pub fn single(kind: AccountKind) -> Self {
        Self(BTreeMap::from([(kind, 1.0)]))
    }

    pub fn weights(&self) -> impl Iterator<Item = (AccountKind, f64)> + '_ {
        self.0.iter().map(|(kind, weight)| (*kind, *weight))
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }
}

impl Default for ContributionAllocation {
    fn default() -> Self {
        Self::single(AccountKind::Taxable)
    }
}

impl<const N: usize> From<[(AccountKind, f64); N]> for ContributionAllocation {
    fn from(weights: [(AccountKind, f64); N]) -> Self {
        Self(BTreeMap::from(weights))
    }
}

fn default_version() -> String {
    SCENARIO_VERSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub household: Household,
    #[serde(default)]
    pub accounts: Vec<AccountSeed>,
    #[serde(default)]
    pub contribution_allocation: ContributionAllocation,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeBreakdown {
    pub cash: f64,
    pub equity_vesting: f64,
    pub retirement: f64,
    pub social_security: f64,
    pub total: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxesPaid {
    pub ordinary: f64,
    pub capital_gains: f64,
    pub total: f64,
    pub on_withdrawals: f64,
    pub breakdown: TaxBreakdown,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub traditional_401k: f64,
    pub traditional_ira: f64,
    pub roth_401k: f64,
    pub roth_ira: f64,
    pub taxable: f64,
    pub taxable_cost_basis: f64,
    pub hsa: f64,
}

impl AccountSnapshot {
    pub fn get(&self, kind: AccountKind) -> f64 {
        match kind {
            AccountKind::Traditional401k => self.traditional_401k,
            AccountKind::TraditionalIra => self.traditional_ira,
            AccountKind::Roth401k => self.roth_401k,
            AccountKind::RothIra => self.roth_ira,
            AccountKind::Taxable => self.taxable,
            AccountKind::Hsa => self.hsa,
        }
    }

    pub fn total(&self) -> f64 {
        AccountKind::ALL.into_iter().map(|kind| self.get(kind)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRecord {
    pub year_index: u32,
    pub year: i32,
    pub ages: Vec<u32>,
    pub working: bool,
    pub income: IncomeBreakdown,
    pub expenses: f64,
    pub medical_expenses: f64,
    pub taxes: TaxesPaid,
    pub investment_growth: f64,
    pub withdrawals: f64,
    pub contributions: f64,
    pub rmd_withdrawn: f64,
    pub rmd_reinvested: f64,
    pub realized_gains: f64,
    pub contribution_tax_benefit: f64,
    pub net_cash_flow: f64,
    pub shortfall: f64,
    pub balances: AccountSnapshot,
    pub nominal_assets: f64,
    pub real_assets: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub retirement_year: Option<i32>,
    pub assets_at_retirement: Option<f64>,
    pub peak_assets: f64,
    pub peak_year: i32,
    pub final_assets: f64,
    pub final_year: i32,
    pub total_taxes: f64,
    pub total_investment_growth: f64,
    pub total_shortfall: f64,
    pub depletion_year: Option<i32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAssumptions {
    pub social_security_taxation: SocialSecurityTaxation,
    pub social_security_cola: bool,
    pub withdrawal_order: WithdrawalOrder,
    pub non_medical_hsa_taxed_as_ordinary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub records: Vec<YearRecord>,
    pub summary: ProjectionSummary,
    pub assumptions: ModelAssumptions,
}
