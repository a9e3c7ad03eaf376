// Scenario Requirements Derivation
//
// Concept: an intake scenario says how many years of which returns a deal
// must collect; this module turns that into concrete tax years relative to
// an "as of" date. Pure: same scenario and date, same requirements.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

/// Filing deadline; through this date the prior year's returns may not be
/// filed yet, so the latest complete year is one further back
const FILING_DEADLINE_MONTH: u32 = 4;
const FILING_DEADLINE_DAY: u32 = 15;

fn default_return_years() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

/// The consumed surface of an intake scenario
///
/// Produced by an external subsystem; only the fields the readiness engine
/// needs are modeled here. Deserializes from query parameters with
/// conventional defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeScenario {
    /// Business return years to collect, counting back from the latest
    /// complete year
    #[serde(default = "default_return_years")]
    pub business_return_years: u32,
    /// Personal return years to collect
    #[serde(default = "default_return_years")]
    pub personal_return_years: u32,
    #[serde(default = "default_true")]
    pub requires_financial_statements: bool,
    #[serde(default = "default_true")]
    pub requires_pfs: bool,
}

impl Default for IntakeScenario {
    fn default() -> Self {
        Self {
            business_return_years: default_return_years(),
            personal_return_years: default_return_years(),
            requires_financial_statements: true,
            requires_pfs: true,
        }
    }
}

/// Concrete requirements for one deal at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRequirements {
    /// Required business-return tax years, most recent first
    pub business_tax_years: Vec<i32>,
    /// Required personal-return tax years, most recent first
    pub personal_tax_years: Vec<i32>,
    pub requires_financial_statements: bool,
    pub requires_pfs: bool,
}

/// The most recent tax year whose returns can be expected to exist
///
/// Strictly after the filing deadline the prior calendar year is complete;
/// on or before it, only the year before that is.
pub fn latest_complete_tax_year(as_of: NaiveDate) -> i32 {
    let past_deadline = (as_of.month(), as_of.day()) > (FILING_DEADLINE_MONTH, FILING_DEADLINE_DAY);
    if past_deadline {
        as_of.year() - 1
    } else {
        as_of.year() - 2
    }
}

/// Derive concrete requirements from a scenario and an as-of date
pub fn derive_requirements(scenario: &IntakeScenario, as_of: NaiveDate) -> ScenarioRequirements {
    let latest = latest_complete_tax_year(as_of);

    ScenarioRequirements {
        business_tax_years: lookback(latest, scenario.business_return_years),
        personal_tax_years: lookback(latest, scenario.personal_return_years),
        requires_financial_statements: scenario.requires_financial_statements,
        requires_pfs: scenario.requires_pfs,
    }
}

fn lookback(latest: i32, count: u32) -> Vec<i32> {
    (0..count as i32).map(|offset| latest - offset).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_latest_complete_year_after_deadline() {
        assert_eq!(latest_complete_tax_year(date(2025, 6, 1)), 2024);
        assert_eq!(latest_complete_tax_year(date(2025, 4, 16)), 2024);
        assert_eq!(latest_complete_tax_year(date(2025, 12, 31)), 2024);
    }

    #[test]
    fn test_latest_complete_year_on_or_before_deadline() {
        assert_eq!(latest_complete_tax_year(date(2025, 4, 15)), 2023);
        assert_eq!(latest_complete_tax_year(date(2025, 1, 10)), 2023);
        assert_eq!(latest_complete_tax_year(date(2025, 3, 31)), 2023);
    }

    #[test]
    fn test_lookback_years_most_recent_first() {
        let scenario = IntakeScenario {
            business_return_years: 3,
            personal_return_years: 2,
            requires_financial_statements: false,
            requires_pfs: false,
        };

        let requirements = derive_requirements(&scenario, date(2025, 7, 1));

        assert_eq!(requirements.business_tax_years, vec![2024, 2023, 2022]);
        assert_eq!(requirements.personal_tax_years, vec![2024, 2023]);
    }

    #[test]
    fn test_zero_counts_require_nothing() {
        let scenario = IntakeScenario {
            business_return_years: 0,
            personal_return_years: 0,
            requires_financial_statements: false,
            requires_pfs: false,
        };

        let requirements = derive_requirements(&scenario, date(2025, 7, 1));

        assert!(requirements.business_tax_years.is_empty());
        assert!(requirements.personal_tax_years.is_empty());
    }

    #[test]
    fn test_presence_flags_carry_through() {
        let requirements = derive_requirements(&IntakeScenario::default(), date(2025, 7, 1));

        assert!(requirements.requires_financial_statements);
        assert!(requirements.requires_pfs);
    }

    #[test]
    fn test_scenario_deserializes_with_defaults() {
        let scenario: IntakeScenario = serde_json::from_str("{}").unwrap();
        assert_eq!(scenario.business_return_years, 3);
        assert_eq!(scenario.personal_return_years, 3);
        assert!(scenario.requires_pfs);

        let scenario: IntakeScenario =
            serde_json::from_str(r#"{"business_return_years": 2, "requires_pfs": false}"#).unwrap();
        assert_eq!(scenario.business_return_years, 2);
        assert!(!scenario.requires_pfs);
    }
}
