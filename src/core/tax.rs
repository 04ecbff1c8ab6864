use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ConfigurationError;

#[derive(Copy, Clone, Debug)]
struct Bracket {
    upper: f64,
    rate: f64,
}

const fn bracket(upper: f64, rate: f64) -> Bracket {
    Bracket { upper, rate }
}

// 2024 tables.
const FEDERAL_SINGLE: [Bracket; 7] = [
    bracket(11_600.0, 0.10),
    bracket(47_150.0, 0.12),
    bracket(100_525.0, 0.22),
    bracket(191_950.0, 0.24),
    bracket(243_725.0, 0.32),
    bracket(609_350.0, 0.35),
    bracket(f64::INFINITY, 0.37),
];

const FEDERAL_JOINT: [Bracket; 7] = [
    bracket(23_200.0, 0.10),
    bracket(94_300.0, 0.12),
    bracket(201_050.0, 0.22),
    bracket(383_900.0, 0.24),
    bracket(487_450.0, 0.32),
    bracket(731_200.0, 0.35),
    bracket(f64::INFINITY, 0.37),
];

const CAPITAL_GAINS_SINGLE: [Bracket; 3] = [
    bracket(47_025.0, 0.0),
    bracket(518_900.0, 0.15),
    bracket(f64::INFINITY, 0.20),
];

const CAPITAL_GAINS_JOINT: [Bracket; 3] = [
    bracket(94_050.0, 0.0),
    bracket(583_750.0, 0.15),
    bracket(f64::INFINITY, 0.20),
];

pub const TOP_CAPITAL_GAINS_RATE: f64 = 0.20;

const SOCIAL_SECURITY_WAGE_BASE: f64 = 168_600.0;
const SOCIAL_SECURITY_RATE: f64 = 0.062;
const MEDICARE_RATE: f64 = 0.0145;
const ADDITIONAL_MEDICARE_RATE: f64 = 0.009;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilingStatus {
    Single,
    Joint,
}

impl FilingStatus {
    pub fn for_household_size(persons: usize) -> Self {
        if persons > 1 {
            FilingStatus::Joint
        } else {
            FilingStatus::Single
        }
    }

    pub fn standard_deduction(self) -> f64 {
        match self {
            FilingStatus::Single => 14_600.0,
            FilingStatus::Joint => 29_200.0,
        }
    }

    fn federal_brackets(self) -> &'static [Bracket] {
        match self {
            FilingStatus::Single => &FEDERAL_SINGLE,
            FilingStatus::Joint => &FEDERAL_JOINT,
        }
    }

    fn capital_gains_brackets(self) -> &'static [Bracket] {
        match self {
            FilingStatus::Single => &CAPITAL_GAINS_SINGLE,
            FilingStatus::Joint => &CAPITAL_GAINS_JOINT,
        }
    }

    fn additional_medicare_threshold(self) -> f64 {
        match self {
            FilingStatus::Single => 200_000.0,
            FilingStatus::Joint => 250_000.0,
        }
    }

    fn social_security_thresholds(self) -> (f64, f64) {
        match self {
            FilingStatus::Single => (25_000.0, 34_000.0),
            FilingStatus::Joint => (32_000.0, 44_000.0),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StateOfResidence {
    California,
    NewYork,
    Texas,
    Florida,
    Illinois,
    Massachusetts,
    Washington,
    Colorado,
    Oregon,
    NewJersey,
    NoStateTax,
}

impl StateOfResidence {
    pub const ALL: [StateOfResidence; 11] = [
        StateOfResidence::California,
        StateOfResidence::NewYork,
        StateOfResidence::Texas,
        StateOfResidence::Florida,
        StateOfResidence::Illinois,
        StateOfResidence::Massachusetts,
        StateOfResidence::Washington,
        StateOfResidence::Colorado,
        StateOfResidence::Oregon,
        StateOfResidence::NewJersey,
        StateOfResidence::NoStateTax,
    ];

    pub fn flat_rate(self) -> f64 {
        match self {
            StateOfResidence::California => 0.093,
            StateOfResidence::NewYork => 0.0685,
            StateOfResidence::Illinois => 0.0495,
            StateOfResidence::Massachusetts => 0.05,
            StateOfResidence::Colorado => 0.044,
            StateOfResidence::Oregon => 0.099,
            StateOfResidence::NewJersey => 0.0637,
            StateOfResidence::Texas
            | StateOfResidence::Florida
            | StateOfResidence::Washington
            | StateOfResidence::NoStateTax => 0.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StateOfResidence::California => "California",
            StateOfResidence::NewYork => "New York",
            StateOfResidence::Texas => "Texas",
            StateOfResidence::Florida => "Florida",
            StateOfResidence::Illinois => "Illinois",
            StateOfResidence::Massachusetts => "Massachusetts",
            StateOfResidence::Washington => "Washington",
            StateOfResidence::Colorado => "Colorado",
            StateOfResidence::Oregon => "Oregon",
            StateOfResidence::NewJersey => "New Jersey",
            StateOfResidence::NoStateTax => "None",
        }
    }

    fn code(self) -> &'static str {
        match self {
            StateOfResidence::California => "CA",
            StateOfResidence::NewYork => "NY",
            StateOfResidence::Texas => "TX",
            StateOfResidence::Florida => "FL",
            StateOfResidence::Illinois => "IL",
            StateOfResidence::Massachusetts => "MA",
            StateOfResidence::Washington => "WA",
            StateOfResidence::Colorado => "CO",
            StateOfResidence::Oregon => "OR",
            StateOfResidence::NewJersey => "NJ",
            StateOfResidence::NoStateTax => "NONE",
        }
    }
}

impl fmt::Display for StateOfResidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StateOfResidence {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        StateOfResidence::ALL
            .into_iter()
            .find(|state| {
                state.name().eq_ignore_ascii_case(wanted) || state.code().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ConfigurationError::UnsupportedState(wanted.to_string()))
    }
}

impl TryFrom<String> for StateOfResidence {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StateOfResidence> for String {
    fn from(value: StateOfResidence) -> Self {
        value.name().to_string()
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SocialSecurityTaxation {
    #[default]
    FullyTaxable,
    Provisional,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TaxProfile {
    pub filing_status: FilingStatus,
    pub state: StateOfResidence,
    pub social_security_taxation: SocialSecurityTaxation,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct TaxableIncome<'a> {
    pub ordinary: f64,
    pub earned: &'a [f64],
    pub social_security: f64,
    pub long_term_gains: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBreakdown {
    pub federal: f64,
    pub state: f64,
    pub fica: f64,
    pub capital_gains: f64,
    pub total: f64,
}

impl TaxBreakdown {
    pub fn ordinary(&self) -> f64 {
        self.federal + self.state + self.fica
    }

    pub fn increment_over(&self, other: &TaxBreakdown) -> TaxBreakdown {
        let federal = (self.federal - other.federal).max(0.0);
        let state = (self.state - other.state).max(0.0);
        let fica = (self.fica - other.fica).max(0.0);
        let capital_gains = (self.capital_gains - other.capital_gains).max(0.0);
        TaxBreakdown {
            federal,
            state,
            fica,
            capital_gains,
            total: federal + state + fica + capital_gains,
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn progressive_tax(taxable: f64, brackets: &[Bracket]) -> f64 {
    let mut tax = 0.0;
    let mut lower = 0.0;
    for band in brackets {
        if taxable <= lower {
            break;
        }
        tax += (taxable.min(band.upper) - lower) * band.rate;
        lower = band.upper;
    }
    tax
}

pub fn federal_income_tax(ordinary_income: f64, status: FilingStatus) -> f64 {
    let taxable = (non_negative(ordinary_income) - status.standard_deduction()).max(0.0);
    progressive_tax(taxable, status.federal_brackets())
}

pub fn federal_marginal_rate(ordinary_income: f64, status: FilingStatus) -> f64 {
    let taxable = non_negative(ordinary_income) - status.standard_deduction();
    if taxable < 0.0 {
        return 0.0;
    }
    status
        .federal_brackets()
        .iter()
        .find(|band| taxable < band.upper)
        .map(|band| band.rate)
        .unwrap_or(0.37)
}

// Long-term gains stacked on top of taxable ordinary income. Standard
// deduction left unused by ordinary income shelters gains first.
pub fn capital_gains_tax(gains: f64, ordinary_income: f64, status: FilingStatus) -> f64 {
    let gains = non_negative(gains);
    if gains == 0.0 {
        return 0.0;
    }

    let ordinary = non_negative(ordinary_income);
    let deduction = status.standard_deduction();
    let mut remaining = (gains - (deduction - ordinary).max(0.0)).max(0.0);
    let mut stacked = (ordinary - deduction).max(0.0);
    let mut tax = 0.0;

    for band in status.capital_gains_brackets() {
        if remaining <= 0.0 {
            break;
        }
        if stacked >= band.upper {
            continue;
        }
        let portion = remaining.min(band.upper - stacked);
        tax += portion * band.rate;
        remaining -= portion;
        stacked += portion;
    }
    tax
}

pub fn state_tax(income: f64, state: StateOfResidence) -> f64 {
    non_negative(income) * state.flat_rate()
}

pub fn fica_tax(earned_by_person: &[f64], status: FilingStatus) -> f64 {
    let mut social_security = 0.0;
    let mut medicare = 0.0;
    let mut household_wages = 0.0;
    for wages in earned_by_person.iter().copied().map(non_negative) {
        social_security += wages.min(SOCIAL_SECURITY_WAGE_BASE) * SOCIAL_SECURITY_RATE;
        medicare += wages * MEDICARE_RATE;
        household_wages += wages;
    }
    let surtax_base = (household_wages - status.additional_medicare_threshold()).max(0.0);
    social_security + medicare + surtax_base * ADDITIONAL_MEDICARE_RATE
}

pub fn taxable_social_security(
    benefits: f64,
    other_income: f64,
    status: FilingStatus,
    mode: SocialSecurityTaxation,
) -> f64 {
    let benefits = non_negative(benefits);
    if mode == SocialSecurityTaxation::FullyTaxable || benefits == 0.0 {
        return benefits;
    }

    let (base, adjusted_base) = status.social_security_thresholds();
    let provisional = non_negative(other_income) + 0.5 * benefits;
    if provisional <= base {
        return 0.0;
    }
    if provisional <= adjusted_base {
        return (0.5 * (provisional - base)).min(0.5 * benefits);
    }
    let first_tier = (0.5 * (adjusted_base - base)).min(0.5 * benefits);
    (0.85 * (provisional - adjusted_base) + first_tier).min(0.85 * benefits)
}

pub fn assess(income: &TaxableIncome<'_>, profile: &TaxProfile) -> TaxBreakdown {
    let status = profile.filing_status;
    let ordinary = non_negative(income.ordinary);
    let gains = non_negative(income.long_term_gains);
    let included_benefits = taxable_social_security(
        income.social_security,
        ordinary + gains,
        status,
        profile.social_security_taxation,
    );
    let taxable_ordinary = ordinary + included_benefits;

    let federal = federal_income_tax(taxable_ordinary, status);
    let capital_gains = capital_gains_tax(gains, taxable_ordinary, status);
    let state = state_tax(taxable_ordinary + gains, profile.state);
    let fica = fica_tax(income.earned, status);

    TaxBreakdown {
        federal,
        state,
        fica,
        capital_gains,
        total: federal + state + fica + capital_gains,
    }
}

pub fn contribution_tax_benefit(
    pre_tax_amount: f64,
    ordinary_income: f64,
    status: FilingStatus,
) -> f64 {
    let ordinary = non_negative(ordinary_income);
    let deferred = non_negative(pre_tax_amount).min(ordinary);
    federal_income_tax(ordinary, status) - federal_income_tax(ordinary - deferred, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn texas_single() -> TaxProfile {
        TaxProfile {
            filing_status: FilingStatus::Single,
            state: StateOfResidence::Texas,
            social_security_taxation: SocialSecurityTaxation::FullyTaxable,
        }
    }

    #[test]
    fn non_positive_income_owes_nothing() {
        for income in [0.0, -10_000.0, f64::NAN] {
            assert_approx(federal_income_tax(income, FilingStatus::Single), 0.0);
            assert_approx(capital_gains_tax(income, 50_000.0, FilingStatus::Joint), 0.0);
            assert_approx(state_tax(income, StateOfResidence::California), 0.0);
            assert_approx(fica_tax(&[income], FilingStatus::Single), 0.0);
        }
    }

    #[test]
    fn federal_brackets_apply_after_standard_deduction() {
        assert_approx(federal_income_tax(14_600.0, FilingStatus::Single), 0.0);
        // 35,400 taxable: 11,600 at 10% + 23,800 at 12%.
        assert_approx(federal_income_tax(50_000.0, FilingStatus::Single), 4_016.0);
        // 70,800 taxable: 23,200 at 10% + 47,600 at 12%.
        assert_approx(federal_income_tax(100_000.0, FilingStatus::Joint), 8_032.0);
        // 30,800 taxable: 23,200 at 10% + 7,600 at 12%.
        assert_approx(federal_income_tax(60_000.0, FilingStatus::Joint), 3_232.0);
    }

    #[test]
    fn federal_marginal_rate_tracks_active_bracket() {
        assert_approx(federal_marginal_rate(10_000.0, FilingStatus::Single), 0.0);
        assert_approx(federal_marginal_rate(50_000.0, FilingStatus::Single), 0.12);
        assert_approx(federal_marginal_rate(14_600.0 + 11_600.0, FilingStatus::Single), 0.12);
        assert_approx(federal_marginal_rate(2_000_000.0, FilingStatus::Joint), 0.37);
    }

    #[test]
    fn capital_gains_fill_zero_rate_band_before_fifteen_percent() {
        // 35,400 taxable ordinary leaves 11,625 of room in the 0% band.
        assert_approx(capital_gains_tax(10_000.0, 50_000.0, FilingStatus::Single), 0.0);
        assert_approx(
            capital_gains_tax(20_000.0, 50_000.0, FilingStatus::Single),
            (20_000.0 - 11_625.0) * 0.15,
        );
        assert_approx(capital_gains_tax(10_000.0, 100_000.0, FilingStatus::Single), 1_500.0);
    }

    #[test]
    fn unused_deduction_shelters_gains() {
        assert_approx(capital_gains_tax(14_600.0, 0.0, FilingStatus::Single), 0.0);
        assert_approx(
            capital_gains_tax(70_000.0, 0.0, FilingStatus::Single),
            (70_000.0 - 14_600.0 - 47_025.0) * 0.15,
        );
    }

    #[test]
    fn top_gains_rate_applies_above_upper_threshold() {
        let tax = capital_gains_tax(100_000.0, 1_000_000.0, FilingStatus::Single);
        assert_approx(tax, 20_000.0);
    }

    #[test]
    fn state_tax_is_flat() {
        assert_approx(state_tax(100_000.0, StateOfResidence::California), 9_300.0);
        assert_approx(state_tax(100_000.0, StateOfResidence::Washington), 0.0);
        assert_approx(state_tax(100_000.0, StateOfResidence::NoStateTax), 0.0);
    }

    #[test]
    fn states_parse_from_names_and_codes() {
        assert_eq!("CA".parse::<StateOfResidence>(), Ok(StateOfResidence::California));
        assert_eq!("new york".parse::<StateOfResidence>(), Ok(StateOfResidence::NewYork));
        assert_eq!(" None ".parse::<StateOfResidence>(), Ok(StateOfResidence::NoStateTax));
        assert_eq!(
            "Nevada".parse::<StateOfResidence>(),
            Err(ConfigurationError::UnsupportedState("Nevada".to_string()))
        );
    }

    #[test]
    fn state_serializes_as_display_name() {
        let json = serde_json::to_string(&StateOfResidence::NewJersey).expect("serialize");
        assert_eq!(json, "\"New Jersey\"");
        let parsed: StateOfResidence = serde_json::from_str("\"OR\"").expect("deserialize");
        assert_eq!(parsed, StateOfResidence::Oregon);
        assert!(serde_json::from_str::<StateOfResidence>("\"Atlantis\"").is_err());
    }

    #[test]
    fn fica_caps_social_security_per_earner() {
        assert_approx(fica_tax(&[100_000.0], FilingStatus::Single), 7_650.0);
        assert_approx(
            fica_tax(&[300_000.0], FilingStatus::Single),
            168_600.0 * 0.062 + 300_000.0 * 0.0145 + 100_000.0 * 0.009,
        );
    }

    #[test]
    fn additional_medicare_threshold_depends_on_filing_status() {
        let joint = fica_tax(&[150_000.0, 150_000.0], FilingStatus::Joint);
        assert_approx(
            joint,
            2.0 * 150_000.0 * 0.062 + 300_000.0 * 0.0145 + 50_000.0 * 0.009,
        );
    }

    #[test]
    fn provisional_income_limits_benefit_inclusion() {
        let mode = SocialSecurityTaxation::Provisional;
        assert_approx(
            taxable_social_security(30_000.0, 10_000.0, FilingStatus::Single, mode),
            0.0,
        );
        assert_approx(
            taxable_social_security(30_000.0, 15_000.0, FilingStatus::Single, mode),
            2_500.0,
        );
        assert_approx(
            taxable_social_security(30_000.0, 20_000.0, FilingStatus::Single, mode),
            850.0 + 4_500.0,
        );
        assert_approx(
            taxable_social_security(30_000.0, 500_000.0, FilingStatus::Single, mode),
            25_500.0,
        );
        assert_approx(
            taxable_social_security(
                30_000.0,
                0.0,
                FilingStatus::Single,
                SocialSecurityTaxation::FullyTaxable,
            ),
            30_000.0,
        );
    }

    #[test]
    fn assess_combines_components() {
        let earned = [50_000.0];
        let income = TaxableIncome {
            ordinary: 50_000.0,
            earned: &earned,
            social_security: 0.0,
            long_term_gains: 0.0,
        };
        let breakdown = assess(&income, &texas_single());
        assert_approx(breakdown.federal, 4_016.0);
        assert_approx(breakdown.state, 0.0);
        assert_approx(breakdown.fica, 3_825.0);
        assert_approx(breakdown.capital_gains, 0.0);
        assert_approx(breakdown.total, 7_841.0);
        assert_approx(breakdown.ordinary(), 7_841.0);
    }

    #[test]
    fn increment_over_isolates_added_tax() {
        let profile = TaxProfile {
            state: StateOfResidence::California,
            ..texas_single()
        };
        let base = assess(
            &TaxableIncome {
                ordinary: 40_000.0,
                ..TaxableIncome::default()
            },
            &profile,
        );
        let with_withdrawal = assess(
            &TaxableIncome {
                ordinary: 60_000.0,
                ..TaxableIncome::default()
            },
            &profile,
        );
        let delta = with_withdrawal.increment_over(&base);
        assert_approx(delta.state, 20_000.0 * 0.093);
        assert_approx(delta.total, with_withdrawal.total - base.total);
    }

    #[test]
    fn contribution_benefit_is_federal_tax_avoided() {
        let benefit = contribution_tax_benefit(10_000.0, 100_000.0, FilingStatus::Single);
        assert_approx(benefit, 2_200.0);
        assert_approx(contribution_tax_benefit(10_000.0, 5_000.0, FilingStatus::Single), 0.0);
    }

    proptest! {
        #[test]
        fn prop_federal_tax_is_non_negative_monotone_and_piecewise_linear(
            income in 0u32..2_000_000,
            step in 1u32..5_000,
            joint in any::<bool>()
        ) {
            let status = if joint { FilingStatus::Joint } else { FilingStatus::Single };
            let low = income as f64;
            let high = low + step as f64;
            let tax_low = federal_income_tax(low, status);
            let tax_high = federal_income_tax(high, status);

            prop_assert!(tax_low >= 0.0);
            prop_assert!(tax_high + 1e-9 >= tax_low);

            let rate = federal_marginal_rate(low, status);
            if rate == federal_marginal_rate(high - 1e-6, status) {
                let slope = (tax_high - tax_low) / (high - low);
                prop_assert!((slope - rate).abs() <= 1e-6);
            }
        }

        #[test]
        fn prop_capital_gains_tax_never_exceeds_top_rate(
            gains in 0u32..5_000_000,
            ordinary in 0u32..5_000_000,
            joint in any::<bool>()
        ) {
            let status = if joint { FilingStatus::Joint } else { FilingStatus::Single };
            let tax = capital_gains_tax(gains as f64, ordinary as f64, status);
            prop_assert!(tax >= 0.0);
            prop_assert!(tax <= gains as f64 * TOP_CAPITAL_GAINS_RATE + 1e-6);
        }
    }
}
