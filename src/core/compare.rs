use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::ProjectionError;
use super::types::{ProjectionSummary, Scenario};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioComparison {
    pub name: String,
    pub summary: ProjectionSummary,
    pub final_assets_delta: f64,
    pub lifetime_taxes_delta: f64,
}

pub fn compare_scenarios(scenarios: &[Scenario]) -> Result<Vec<ScenarioComparison>, ProjectionError> {
    let summaries = scenarios
        .par_iter()
        .map(|scenario| scenario.project().map(|result| result.summary))
        .collect::<Result<Vec<_>, _>>()?;

    let Some(baseline) = summaries.first().cloned() else {
        return Ok(Vec::new());
    };

    Ok(scenarios
        .iter()
        .zip(summaries)
        .map(|(scenario, summary)| ScenarioComparison {
            name: scenario.name.clone(),
            final_assets_delta: summary.final_assets - baseline.final_assets,
            lifetime_taxes_delta: summary.total_taxes - baseline.total_taxes,
            summary,
        })
        .collect())
}
