//! Prompt for the narrative pass.

use crate::analysis::DeviationReport;
use crate::error::Result;

pub fn build_prompt(report: &DeviationReport) -> Result<String> {
    let structured = serde_json::to_string_pretty(&report.as_json_map())?;
    Ok(format!(
        "Below is a human-readable report of financial transactions flagged as anomalous:\n\n\
         {summary}\n\
         Additionally, here is a JSON object containing structured anomaly details:\n\n\
         {structured}\n\n\
         Please analyze these transactions and return a JSON object explaining why each \
         transaction might be suspicious. Use the transaction ID as the key and a short \
         explanation as the value, for example:\n\n\
         {{\"transaction Id1\": \"Explanation for anomaly 1\", \
         \"transaction Id2\": \"Explanation for anomaly 2\"}}\n\n\
         Return only the JSON object.",
        summary = report.summary,
        structured = structured,
    ))
}
