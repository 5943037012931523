//! CLI command implementations.
//!
//! All commands are offline: they read configuration and the theme
//! catalog, never the vector index.

use std::sync::Arc;

use crate::cli::output::{
    OutputFormat, PlanReport, ValidateReport, format_plan, format_routing, format_validate,
};
use crate::cli::parser::{Cli, Commands};
use crate::config::RetrievalConfig;
use crate::context::QueryComplexity;
use crate::core::{Query, UserMetadata};
use crate::error::Result;
use crate::pipeline::process_query;
use crate::theme::{ThemeCatalog, ThemeRouter};

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let mut config = RetrievalConfig::from_env();
    if let Some(path) = &cli.themes {
        config.themes_config_path = Some(path.clone());
    }

    match &cli.command {
        Commands::Validate => cmd_validate(&config, format),
        Commands::Route {
            query,
            role,
            platform,
        } => cmd_route(
            &config,
            query,
            role.as_deref(),
            platform.as_deref(),
            format,
        ),
        Commands::Plan { query } => cmd_plan(&config, query, format),
    }
}

fn load_catalog(
    config: &RetrievalConfig,
) -> (ThemeCatalog, Option<crate::error::ConfigError>) {
    match &config.themes_config_path {
        Some(path) => match ThemeCatalog::load(path) {
            Ok(catalog) => (catalog, None),
            Err(e) => (ThemeCatalog::default(), Some(e)),
        },
        None => (ThemeCatalog::default(), None),
    }
}

fn cmd_validate(config: &RetrievalConfig, format: OutputFormat) -> Result<String> {
    let (config_valid, config_errors) = match config.validate() {
        Ok(()) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };
    let (catalog, themes_error) = load_catalog(config);
    let mut warnings = config.validation_warnings();
    if config.themes_config_path.is_none() {
        warnings.push(
            "no themes_config_path configured; theme routing runs over an empty catalog"
                .to_string(),
        );
    }

    let report = ValidateReport {
        config_valid,
        config_errors,
        themes_loaded: catalog.len(),
        themes_error: themes_error.map(|e| e.to_string()),
        warnings,
    };
    Ok(format_validate(&report, format))
}

fn cmd_route(
    config: &RetrievalConfig,
    query_text: &str,
    role: Option<&str>,
    platform: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    let (catalog, themes_error) = load_catalog(config);
    if let Some(error) = themes_error {
        return Err(error.into());
    }

    let mut query = Query::new(query_text);
    if role.is_some() || platform.is_some() {
        query = query.with_metadata(UserMetadata {
            role: role.map(ToString::to_string),
            platform: platform.map(ToString::to_string),
        });
    }

    let router = ThemeRouter::new(Arc::new(catalog));
    let result = router.heuristic_route(&query);
    Ok(format_routing(&result, format))
}

fn cmd_plan(config: &RetrievalConfig, query_text: &str, format: OutputFormat) -> Result<String> {
    let processed = process_query(query_text);
    let complexity = QueryComplexity::classify(&processed.normalized_text);

    let optimizer =
        crate::context::ContextOptimizer::new(Arc::new(config.clone())).map_err(crate::error::Error::Config)?;

    let report = PlanReport {
        complexity: match complexity {
            QueryComplexity::Simple => "simple".to_string(),
            QueryComplexity::Medium => "medium".to_string(),
            QueryComplexity::Complex => "complex".to_string(),
        },
        target_documents: complexity.target_documents(usize::MAX),
        list_intent: optimizer.is_list_intent(&processed.normalized_text),
        normalized_text: processed.normalized_text,
        entities: processed.entities,
        page_type_boosts: processed.page_type_boosts,
        subqueries: processed.subqueries,
    };
    Ok(format_plan(&report, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli_for(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn test_validate_with_default_config() {
        let cli = cli_for(&["ragcore-rs", "validate"]);
        let output = execute(&cli).unwrap();
        assert!(output.contains("ok"));
        assert!(output.contains("canonical_url"));
    }

    #[test]
    fn test_route_without_catalog() {
        let cli = cli_for(&["ragcore-rs", "route", "как подключить sdk android"]);
        let output = execute(&cli).unwrap();
        // Empty catalog: no primary theme, disambiguation needed.
        assert!(output.contains("Primary"));
        assert!(output.contains("needed"));
    }

    #[test]
    fn test_route_with_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("themes.yaml");
        std::fs::write(
            &path,
            "themes:\n  sdk_android:\n    display_name: SDK Android\n    domain: sdk_docs\n    platform: android\n",
        )
        .unwrap();

        let cli = cli_for(&[
            "ragcore-rs",
            "--themes",
            path.to_str().unwrap(),
            "route",
            "как подключить sdk android",
        ]);
        let output = execute(&cli).unwrap();
        assert!(output.contains("sdk_android"));
    }

    #[test]
    fn test_plan_simple_list_query() {
        let cli = cli_for(&["ragcore-rs", "--format", "json", "plan", "какие каналы можно подключить"]);
        let output = execute(&cli).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["complexity"], "simple");
        assert_eq!(value["target_documents"], 2);
        assert_eq!(value["list_intent"], true);
    }

    #[test]
    fn test_plan_rewrites_abbreviations() {
        let cli = cli_for(&["ragcore-rs", "--format", "json", "plan", "где найти РН"]);
        let output = execute(&cli).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert!(
            value["normalized_text"]
                .as_str()
                .unwrap()
                .contains("Release Notes")
        );
    }
}
