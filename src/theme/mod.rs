//! Theme catalog and query-to-theme routing.
//!
//! Themes are a closed enumeration loaded from a YAML catalog at startup;
//! each theme names up to four facet constraints (domain, section,
//! platform, role). The router classifies a query into ranked themes to
//! drive search-time filtering and post-search boosting.

mod router;

pub use router::{RouterKind, RoutingResult, ThemeRouter};

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::ChunkPayload;
use crate::error::ConfigError;

/// One theme definition from the catalog.
///
/// Immutable after load. A facet left as `None` matches any value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    /// Stable theme id (catalog key).
    pub theme_id: String,
    /// Human-readable name used in labels and instructions.
    pub display_name: String,
    /// Documentation domain facet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Section facet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Platform facet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Role facet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Free-text description shown to the LLM router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Raw per-theme YAML entry; the id comes from the mapping key.
#[derive(Debug, Deserialize)]
struct ThemeSpec {
    display_name: Option<String>,
    domain: Option<String>,
    section: Option<String>,
    platform: Option<String>,
    role: Option<String>,
    description: Option<String>,
}

/// Top-level catalog file shape.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    themes: serde_yaml::Mapping,
}

/// Immutable theme table, loaded once at startup.
///
/// Malformed entries are skipped with a warning; the rest of the catalog
/// keeps working.
#[derive(Debug, Clone, Default)]
pub struct ThemeCatalog {
    themes: Vec<Theme>,
    by_id: HashMap<String, usize>,
}

impl ThemeCatalog {
    /// Builds a catalog from already-constructed themes (tests, embedding
    /// in a host application).
    #[must_use]
    pub fn from_themes(themes: Vec<Theme>) -> Self {
        let by_id = themes
            .iter()
            .enumerate()
            .map(|(i, t)| (t.theme_id.clone(), i))
            .collect();
        Self { themes, by_id }
    }

    /// Loads the catalog from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing or not YAML at all.
    /// Individual malformed theme entries are skipped, not fatal.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ThemesNotFound {
                path: path.display().to_string(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&raw)
    }

    /// Parses catalog YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ThemesParse`] when the document itself is
    /// malformed.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let file: CatalogFile = serde_yaml::from_str(raw)?;
        let mut themes = Vec::new();

        for (key, value) in file.themes {
            let Some(theme_id) = key.as_str().map(ToString::to_string) else {
                warn!(?key, "skipping theme with non-string id");
                continue;
            };
            match serde_yaml::from_value::<ThemeSpec>(value) {
                Ok(spec) => themes.push(Theme {
                    display_name: spec.display_name.unwrap_or_else(|| theme_id.clone()),
                    theme_id,
                    domain: spec.domain,
                    section: spec.section,
                    platform: spec.platform,
                    role: spec.role,
                    description: spec.description,
                }),
                Err(e) => {
                    warn!(theme_id = %theme_id, error = %e, "skipping malformed theme entry");
                }
            }
        }

        Ok(Self::from_themes(themes))
    }

    /// All themes, in catalog order.
    #[must_use]
    pub fn list(&self) -> &[Theme] {
        &self.themes
    }

    /// Looks up a theme by id.
    #[must_use]
    pub fn get(&self, theme_id: &str) -> Option<&Theme> {
        self.by_id.get(theme_id).map(|&i| &self.themes[i])
    }

    /// Returns true when the catalog has no themes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    /// Number of themes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.themes.len()
    }

    /// Finds the first theme whose facet constraints are compatible with
    /// the payload's facets.
    ///
    /// A constraint only disqualifies when both sides are set and differ,
    /// so sparsely-faceted payloads still resolve to a theme.
    #[must_use]
    pub fn infer_theme(&self, payload: &ChunkPayload) -> Option<&Theme> {
        let domain = payload.domain.as_deref().map(str::to_lowercase);
        let section = payload.section.as_deref().map(str::to_lowercase);
        let platform = payload.platform.as_deref().map(str::to_lowercase);
        let role = payload.role.as_deref().map(str::to_lowercase);

        self.themes.iter().find(|theme| {
            facet_compatible(theme.domain.as_deref(), domain.as_deref())
                && facet_compatible(theme.section.as_deref(), section.as_deref())
                && facet_compatible(theme.platform.as_deref(), platform.as_deref())
                && facet_compatible(theme.role.as_deref(), role.as_deref())
        })
    }
}

fn facet_compatible(theme_facet: Option<&str>, payload_facet: Option<&str>) -> bool {
    match (theme_facet, payload_facet) {
        (Some(t), Some(p)) => t.eq_ignore_ascii_case(p),
        _ => true,
    }
}

/// Static keyword map keyed by `platform`/`section` facet values.
///
/// Platform hits weigh 1.0 in heuristic scoring, section hits 0.7.
pub(crate) const KEYWORD_MAP: &[(&str, &[&str])] = &[
    ("android", &["android", "gradle", "apk", "kotlin", "java"]),
    ("ios", &["ios", "swift", "xcode", "cocoapods"]),
    ("web", &["javascript", "widget", "web", "iframe"]),
    (
        "admin",
        &[
            "админ",
            "администратор",
            "тег",
            "теги",
            "тегирование",
            "label",
            "tag",
        ],
    ),
    ("agent", &["агент", "оператор"]),
    ("supervisor", &["супервайзер", "supervisor"]),
    ("api", &["api", "swagger", "rest", "webhook", "интеграция"]),
];

pub(crate) fn keywords_for(facet: &str) -> Option<&'static [&'static str]> {
    KEYWORD_MAP
        .iter()
        .find(|(key, _)| *key == facet)
        .map(|(_, words)| *words)
}
