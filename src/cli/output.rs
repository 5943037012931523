//! Output formatting for CLI commands.
//!
//! Supports text and JSON output formats.

use serde::Serialize;
use std::fmt::Write;

use crate::error::Error;
use crate::theme::RoutingResult;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Validation report for the `validate` command.
#[derive(Debug, Serialize)]
pub struct ValidateReport {
    /// Whether the configuration passed validation.
    pub config_valid: bool,
    /// Validation error detail, when invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_errors: Option<String>,
    /// Number of themes loaded from the catalog.
    pub themes_loaded: usize,
    /// Problem loading the catalog, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub themes_error: Option<String>,
    /// Non-fatal warnings for the operator.
    pub warnings: Vec<String>,
}

/// Shaping plan for the `plan` command.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    /// Query text after normalization.
    pub normalized_text: String,
    /// Recognized domain entities.
    pub entities: Vec<String>,
    /// Derived page-type boosts.
    pub page_type_boosts: std::collections::HashMap<String, f64>,
    /// Sub-queries from conjunction decomposition.
    pub subqueries: Vec<String>,
    /// Complexity class (simple, medium, complex).
    pub complexity: String,
    /// Documents the optimizer would keep at this complexity.
    pub target_documents: usize,
    /// Whether the list-intent rule matches.
    pub list_intent: bool,
}

/// Formats a validation report.
#[must_use]
pub fn format_validate(report: &ValidateReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_validate_text(report),
        OutputFormat::Json => format_json(report),
    }
}

fn format_validate_text(report: &ValidateReport) -> String {
    let mut output = String::new();
    output.push_str("ragcore-rs configuration\n");
    output.push_str("========================\n\n");
    let _ = writeln!(
        output,
        "  Config:   {}",
        if report.config_valid { "ok" } else { "INVALID" }
    );
    if let Some(errors) = &report.config_errors {
        let _ = writeln!(output, "  Errors:   {errors}");
    }
    match &report.themes_error {
        Some(error) => {
            let _ = writeln!(output, "  Themes:   failed to load ({error})");
        }
        None => {
            let _ = writeln!(output, "  Themes:   {} loaded", report.themes_loaded);
        }
    }
    if !report.warnings.is_empty() {
        output.push('\n');
        output.push_str("Warnings:\n");
        for warning in &report.warnings {
            let _ = writeln!(output, "  - {warning}");
        }
    }
    output
}

/// Formats a routing result.
#[must_use]
pub fn format_routing(result: &RoutingResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_routing_text(result),
        OutputFormat::Json => format_json(result),
    }
}

fn format_routing_text(result: &RoutingResult) -> String {
    let mut output = String::new();
    output.push_str("Theme routing\n");
    output.push_str("=============\n\n");
    let _ = writeln!(
        output,
        "  Primary:         {}",
        result.primary_theme.as_deref().unwrap_or("-")
    );
    let _ = writeln!(output, "  Router:          {:?}", result.router);
    let _ = writeln!(output, "  Top score:       {:.2}", result.top_score);
    let _ = writeln!(output, "  Second score:    {:.2}", result.second_score);
    let _ = writeln!(
        output,
        "  Disambiguation:  {}",
        if result.requires_disambiguation {
            "needed"
        } else {
            "no"
        }
    );
    let _ = writeln!(
        output,
        "  Filter eligible: {}",
        if result.filter_eligible() { "yes" } else { "no" }
    );

    if !result.themes.is_empty() {
        output.push('\n');
        output.push_str("Ranking:\n");
        for theme_id in &result.themes {
            let score = result.scores.get(theme_id).copied().unwrap_or(0.0);
            let _ = writeln!(output, "  {score:>6.2}  {theme_id}");
        }
    }
    output
}

/// Formats a shaping plan.
#[must_use]
pub fn format_plan(report: &PlanReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_plan_text(report),
        OutputFormat::Json => format_json(report),
    }
}

fn format_plan_text(report: &PlanReport) -> String {
    let mut output = String::new();
    output.push_str("Context plan\n");
    output.push_str("============\n\n");
    let _ = writeln!(output, "  Normalized:   {}", report.normalized_text);
    let _ = writeln!(output, "  Complexity:   {}", report.complexity);
    let _ = writeln!(output, "  Target docs:  {}", report.target_documents);
    let _ = writeln!(
        output,
        "  List intent:  {}",
        if report.list_intent { "yes" } else { "no" }
    );
    if !report.entities.is_empty() {
        let _ = writeln!(output, "  Entities:     {}", report.entities.join(", "));
    }
    if !report.page_type_boosts.is_empty() {
        let mut boosts: Vec<String> = report
            .page_type_boosts
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        boosts.sort();
        let _ = writeln!(output, "  Boosts:       {}", boosts.join(", "));
    }
    if report.subqueries.len() > 1 {
        let _ = writeln!(output, "  Sub-queries:  {}", report.subqueries.join(" | "));
    }
    output
}

/// Formats an error for the selected output format.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => {
            format!("{{\"error\": {}}}", serde_json::json!(error.to_string()))
        }
    }
}

fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("anything"), OutputFormat::Text);
    }

    #[test]
    fn test_format_validate_text() {
        let report = ValidateReport {
            config_valid: true,
            config_errors: None,
            themes_loaded: 4,
            themes_error: None,
            warnings: vec!["something to note".to_string()],
        };
        let text = format_validate(&report, OutputFormat::Text);
        assert!(text.contains("ok"));
        assert!(text.contains("4 loaded"));
        assert!(text.contains("something to note"));
    }

    #[test]
    fn test_format_validate_json() {
        let report = ValidateReport {
            config_valid: false,
            config_errors: Some("rrf_k must be positive".to_string()),
            themes_loaded: 0,
            themes_error: None,
            warnings: Vec::new(),
        };
        let json = format_validate(&report, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["config_valid"], false);
        assert!(value["config_errors"].as_str().unwrap().contains("rrf_k"));
    }

    #[test]
    fn test_format_plan_text() {
        let report = PlanReport {
            normalized_text: "какие каналы".to_string(),
            entities: vec![],
            page_type_boosts: std::collections::HashMap::new(),
            subqueries: vec!["какие каналы".to_string()],
            complexity: "simple".to_string(),
            target_documents: 2,
            list_intent: true,
        };
        let text = format_plan(&report, OutputFormat::Text);
        assert!(text.contains("simple"));
        assert!(text.contains("List intent:  yes"));
    }
}
