use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::LedgerError;

// Withdrawals up to this much above the balance are floating-point noise.
const BALANCE_EPSILON: f64 = 1e-7;

pub const RMD_START_AGE: u32 = 73;

// IRS Uniform Lifetime Table, ages 73..=100.
const UNIFORM_LIFETIME_DIVISORS: [f64; 28] = [
    26.5, 25.5, 24.6, 23.7, 22.9, 22.0, 21.1, 20.2, 19.4, 18.5, 17.7, 16.8, 16.0, 15.2, 14.4,
    13.7, 12.9, 12.2, 11.5, 10.8, 10.1, 9.5, 8.9, 8.4, 7.8, 7.3, 6.8, 6.4,
];

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    #[serde(rename = "traditional_401k")]
    Traditional401k,
    #[serde(rename = "traditional_ira")]
    TraditionalIra,
    #[serde(rename = "roth_401k")]
    Roth401k,
    #[serde(rename = "roth_ira")]
    RothIra,
    #[serde(rename = "taxable")]
    Taxable,
    #[serde(rename = "hsa")]
    Hsa,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ContributionTax {
    PreTax,
    AfterTax,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GrowthTax {
    Deferred,
    TaxFree,
    Unrealized,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WithdrawalTax {
    Ordinary,
    TaxFree,
    GainsOnly,
    TaxFreeIfMedical,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TaxTreatment {
    pub contribution: ContributionTax,
    pub growth: GrowthTax,
    pub withdrawal: WithdrawalTax,
}

const DEFERRED: TaxTreatment = TaxTreatment {
    contribution: ContributionTax::PreTax,
    growth: GrowthTax::Deferred,
    withdrawal: WithdrawalTax::Ordinary,
};

const ROTH: TaxTreatment = TaxTreatment {
    contribution: ContributionTax::AfterTax,
    growth: GrowthTax::TaxFree,
    withdrawal: WithdrawalTax::TaxFree,
};

const BROKERAGE: TaxTreatment = TaxTreatment {
    contribution: ContributionTax::AfterTax,
    growth: GrowthTax::Unrealized,
    withdrawal: WithdrawalTax::GainsOnly,
};

const HEALTH_SAVINGS: TaxTreatment = TaxTreatment {
    contribution: ContributionTax::PreTax,
    growth: GrowthTax::TaxFree,
    withdrawal: WithdrawalTax::TaxFreeIfMedical,
};

impl AccountKind {
    pub const ALL: [AccountKind; 6] = [
        AccountKind::Traditional401k,
        AccountKind::TraditionalIra,
        AccountKind::Roth401k,
        AccountKind::RothIra,
        AccountKind::Taxable,
        AccountKind::Hsa,
    ];

    pub fn treatment(self) -> TaxTreatment {
        match self {
            AccountKind::Traditional401k | AccountKind::TraditionalIra => DEFERRED,
            AccountKind::Roth401k | AccountKind::RothIra => ROTH,
            AccountKind::Taxable => BROKERAGE,
            AccountKind::Hsa => HEALTH_SAVINGS,
        }
    }

    pub fn is_traditional(self) -> bool {
        matches!(
            self,
            AccountKind::Traditional401k | AccountKind::TraditionalIra
        )
    }

    pub fn tracks_basis(self) -> bool {
        self.treatment().withdrawal == WithdrawalTax::GainsOnly
    }

    pub fn label(self) -> &'static str {
        match self {
            AccountKind::Traditional401k => "traditional_401k",
            AccountKind::TraditionalIra => "traditional_ira",
            AccountKind::Roth401k => "roth_401k",
            AccountKind::RothIra => "roth_ira",
            AccountKind::Taxable => "taxable",
            AccountKind::Hsa => "hsa",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn rmd_divisor(age: u32) -> Option<f64> {
    if age < RMD_START_AGE {
        return None;
    }
    let index = ((age - RMD_START_AGE) as usize).min(UNIFORM_LIFETIME_DIVISORS.len() - 1);
    Some(UNIFORM_LIFETIME_DIVISORS[index])
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    kind: AccountKind,
    owner: usize,
    balance: f64,
    cost_basis: f64,
}

impl Account {
    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn owner(&self) -> usize {
        self.owner
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn cost_basis(&self) -> f64 {
        self.cost_basis
    }

    pub fn unrealized_gain(&self) -> f64 {
        (self.balance - self.cost_basis).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Withdrawal {
    pub amount: f64,
    pub realized_gain: f64,
    pub return_of_basis: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountLedger {
    accounts: Vec<Account>,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(
        &mut self,
        kind: AccountKind,
        owner: usize,
        balance: f64,
        cost_basis: f64,
    ) -> Result<(), LedgerError> {
        check_amount(balance)?;
        check_amount(cost_basis)?;
        let cost_basis = if kind.tracks_basis() {
            if cost_basis > balance + BALANCE_EPSILON {
                return Err(LedgerError::BasisExceedsBalance {
                    kind,
                    basis: cost_basis,
                    balance,
                });
            }
            cost_basis.min(balance)
        } else {
            0.0
        };

        let account = Account {
            kind,
            owner,
            balance,
            cost_basis,
        };
        match self.accounts.iter_mut().find(|a| a.kind == kind) {
            Some(existing) => *existing = account,
            None => {
                self.accounts.push(account);
                self.accounts.sort_by_key(|a| a.kind);
            }
        }
        Ok(())
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn account(&self, kind: AccountKind) -> Option<&Account> {
        self.accounts.iter().find(|a| a.kind == kind)
    }

    pub fn balance(&self, kind: AccountKind) -> f64 {
        self.account(kind).map_or(0.0, Account::balance)
    }

    pub fn cost_basis(&self, kind: AccountKind) -> f64 {
        self.account(kind).map_or(0.0, Account::cost_basis)
    }

    pub fn total(&self) -> f64 {
        self.accounts.iter().map(|a| a.balance).sum()
    }

    pub fn deposit(&mut self, kind: AccountKind, amount: f64) -> Result<(), LedgerError> {
        check_amount(amount)?;
        if amount == 0.0 {
            return Ok(());
        }
        if self.account(kind).is_none() {
            self.open(kind, 0, 0.0, 0.0)?;
        }
        let account = self.account_mut(kind)?;
        account.balance += amount;
        if kind.tracks_basis() {
            account.cost_basis += amount;
        }
        Ok(())
    }

    // One year of growth on every account. Basis is untouched, so growth is
    // unrealized gain.
    pub fn grow(&mut self, rate: f64) -> Result<(), LedgerError> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(LedgerError::InvalidRate(rate));
        }
        for account in &mut self.accounts {
            account.balance += account.balance * rate;
        }
        Ok(())
    }

    pub fn withdraw(&mut self, kind: AccountKind, amount: f64) -> Result<Withdrawal, LedgerError> {
        check_amount(amount)?;
        let available = self.balance(kind);
        if amount > available + BALANCE_EPSILON {
            return Err(LedgerError::InsufficientFunds {
                kind,
                requested: amount,
                available,
            });
        }
        if amount == 0.0 {
            return Ok(Withdrawal::default());
        }

        let account = self.account_mut(kind)?;
        let amount = amount.min(account.balance);
        let basis_fraction = if account.balance > 0.0 {
            (account.cost_basis / account.balance).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let return_of_basis = amount * basis_fraction;

        account.balance -= amount;
        account.cost_basis = (account.cost_basis - return_of_basis).clamp(0.0, account.balance);
        if account.balance <= BALANCE_EPSILON {
            account.balance = 0.0;
            account.cost_basis = 0.0;
        }

        Ok(Withdrawal {
            amount,
            realized_gain: if kind.tracks_basis() {
                amount - return_of_basis
            } else {
                0.0
            },
            return_of_basis,
        })
    }

    pub fn required_minimum_distribution(&self, kind: AccountKind, age: u32) -> f64 {
        if !kind.is_traditional() {
            return 0.0;
        }
        match rmd_divisor(age) {
            Some(divisor) => self.balance(kind) / divisor,
            None => 0.0,
        }
    }

    fn account_mut(&mut self, kind: AccountKind) -> Result<&mut Account, LedgerError> {
        self.accounts
            .iter_mut()
            .find(|a| a.kind == kind)
            .ok_or(LedgerError::InsufficientFunds {
                kind,
                requested: 0.0,
                available: 0.0,
            })
    }
}

fn check_amount(amount: f64) -> Result<(), LedgerError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(amount))
    }
}
