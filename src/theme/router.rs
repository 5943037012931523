//! Query-to-theme routing.
//!
//! Two paths: a keyword heuristic that always works, and an optional
//! LLM classification that falls back to the heuristic on any failure.
//! The router never fails a request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Theme, ThemeCatalog, keywords_for};
use crate::core::Query;
use crate::llm::{CompletionRequest, LlmProvider};

/// Score gap below which the heuristic asks for disambiguation.
const DISAMBIGUATION_GAP: f64 = 0.2;
/// LLM confidence below which routing asks for disambiguation.
const LLM_DISAMBIGUATION_TOP: f64 = 0.5;
/// Minimum LLM confidence to emit a metadata filter.
const LLM_FILTER_TOP: f64 = 0.9;
/// Minimum heuristic top score to emit a metadata filter.
const HEURISTIC_FILTER_TOP: f64 = 0.85;
/// Minimum heuristic top-1/top-2 gap to emit a metadata filter.
const HEURISTIC_FILTER_GAP: f64 = 0.35;
/// Keyword weight for platform facet hits.
const PLATFORM_KEYWORD_WEIGHT: f64 = 1.0;
/// Keyword weight for section facet hits.
const SECTION_KEYWORD_WEIGHT: f64 = 0.7;
/// Bonus for domain cue words and user-metadata matches.
const METADATA_MATCH_WEIGHT: f64 = 0.5;
/// Maximum theme guesses accepted from the LLM.
const LLM_MAX_THEMES: usize = 3;

/// Which routing path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterKind {
    /// Keyword heuristic.
    Heuristic,
    /// LLM classification.
    Llm,
}

/// Result of routing one query across the theme catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    /// Theme ids by descending confidence.
    pub themes: Vec<String>,
    /// Most confident theme, when any scored above zero.
    ///
    /// Invariant: when `Some`, equals `themes[0]`.
    pub primary_theme: Option<String>,
    /// Per-theme confidence in `[0, 1]` (heuristic scores are raw sums).
    pub scores: HashMap<String, f64>,
    /// Which path produced this result.
    pub router: RouterKind,
    /// Highest score.
    pub top_score: f64,
    /// Second-highest score (0 when fewer than two themes).
    pub second_score: f64,
    /// True when the query should be clarified before filtering hard.
    pub requires_disambiguation: bool,
    /// Section hints from the primary theme.
    pub preferred_sections: Vec<String>,
    /// Platform hints from the primary theme.
    pub preferred_platforms: Vec<String>,
    /// Domain hints from the primary theme.
    pub preferred_domains: Vec<String>,
}

impl RoutingResult {
    /// Whether this result is confident enough to constrain search with a
    /// metadata filter.
    ///
    /// LLM results qualify at `top >= 0.9`; heuristic results at
    /// `top >= 0.85` with a top-1/top-2 gap of at least `0.35`. Anything
    /// below only influences boosts and instructions.
    #[must_use]
    pub fn filter_eligible(&self) -> bool {
        match self.router {
            RouterKind::Llm => self.top_score >= LLM_FILTER_TOP,
            RouterKind::Heuristic => {
                self.top_score >= HEURISTIC_FILTER_TOP
                    && (self.top_score - self.second_score) >= HEURISTIC_FILTER_GAP
            }
        }
    }

    /// Secondary theme ids (positions 1 and 2 of the ranking).
    #[must_use]
    pub fn secondary_themes(&self) -> &[String] {
        let end = self.themes.len().min(3);
        if self.themes.len() <= 1 {
            &[]
        } else {
            &self.themes[1..end]
        }
    }

    fn empty(router: RouterKind) -> Self {
        Self {
            themes: Vec::new(),
            primary_theme: None,
            scores: HashMap::new(),
            router,
            top_score: 0.0,
            second_score: 0.0,
            requires_disambiguation: true,
            preferred_sections: Vec::new(),
            preferred_platforms: Vec::new(),
            preferred_domains: Vec::new(),
        }
    }
}

/// One `{theme_id, score}` object from the LLM's JSON answer.
#[derive(Debug, Deserialize)]
struct LlmThemeScore {
    theme_id: String,
    #[serde(default)]
    score: f64,
}

/// Routes queries to themes.
///
/// Holds a shared reference to the immutable catalog; safe to share across
/// requests.
pub struct ThemeRouter {
    catalog: Arc<ThemeCatalog>,
    providers: Vec<Arc<dyn LlmProvider>>,
    use_llm: bool,
    llm_timeout: Duration,
}

impl ThemeRouter {
    /// Creates a heuristic-only router.
    #[must_use]
    pub fn new(catalog: Arc<ThemeCatalog>) -> Self {
        Self {
            catalog,
            providers: Vec::new(),
            use_llm: false,
            llm_timeout: Duration::from_secs(3),
        }
    }

    /// Enables the LLM path with the given provider order and deadline.
    #[must_use]
    pub fn with_llm(mut self, providers: Vec<Arc<dyn LlmProvider>>, timeout: Duration) -> Self {
        self.use_llm = !providers.is_empty();
        self.providers = providers;
        self.llm_timeout = timeout;
        self
    }

    /// The catalog this router consults.
    #[must_use]
    pub fn catalog(&self) -> &ThemeCatalog {
        &self.catalog
    }

    /// Routes a query. Always returns a result; on any LLM or catalog
    /// problem it falls back to the heuristic path.
    pub async fn route(&self, query: &Query) -> RoutingResult {
        if self.use_llm {
            if let Some(result) = self.try_llm_route(query).await {
                return result;
            }
        }
        self.heuristic_route(query)
    }

    /// Keyword-heuristic routing; infallible and synchronous.
    #[must_use]
    pub fn heuristic_route(&self, query: &Query) -> RoutingResult {
        let query_lower = query.text_lower();
        let mut scores: HashMap<String, f64> = HashMap::new();
        let mut ranked: Vec<(&Theme, f64)> = Vec::with_capacity(self.catalog.len());

        for theme in self.catalog.list() {
            let score = score_by_keywords(&query_lower, theme)
                + score_by_user_metadata(query, theme);
            scores.insert(theme.theme_id.clone(), score);
            ranked.push((theme, score));
        }

        // Stable sort keeps catalog order on ties.
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let top_score = ranked.first().map_or(0.0, |(_, s)| *s);
        let second_score = ranked.get(1).map_or(0.0, |(_, s)| *s);
        let primary = if top_score > 0.0 {
            ranked.first().map(|(t, _)| (*t).clone())
        } else {
            None
        };
        let requires_disambiguation =
            top_score == 0.0 || (top_score - second_score) < DISAMBIGUATION_GAP;

        let (sections, platforms, domains) = hints(primary.as_ref());

        RoutingResult {
            themes: ranked.iter().map(|(t, _)| t.theme_id.clone()).collect(),
            primary_theme: primary.map(|t| t.theme_id),
            scores,
            router: RouterKind::Heuristic,
            top_score,
            second_score,
            requires_disambiguation,
            preferred_sections: sections,
            preferred_platforms: platforms,
            preferred_domains: domains,
        }
    }

    /// Attempts LLM classification; `None` means "fall back to heuristic".
    async fn try_llm_route(&self, query: &Query) -> Option<RoutingResult> {
        if self.catalog.is_empty() {
            return None;
        }

        let request = self.build_llm_request(query);
        let mut raw_answer: Option<(String, String)> = None;

        for provider in &self.providers {
            let name = provider.name().to_string();
            match tokio::time::timeout(self.llm_timeout, provider.complete(&request)).await {
                Ok(Ok(answer)) if !answer.trim().is_empty() => {
                    raw_answer = Some((name, answer));
                    break;
                }
                Ok(Ok(_)) => {
                    warn!(provider = %name, "theme router got an empty LLM response");
                }
                Ok(Err(e)) => {
                    warn!(provider = %name, error = %e, "theme router LLM provider failed");
                }
                Err(_) => {
                    warn!(provider = %name, "theme router LLM provider timed out");
                }
            }
        }

        let (provider, answer) = raw_answer?;
        match self.parse_llm_answer(&answer) {
            Some(result) => Some(result),
            None => {
                warn!(provider = %provider, "theme router could not use LLM answer, falling back");
                None
            }
        }
    }

    fn build_llm_request(&self, query: &Query) -> CompletionRequest {
        let themes_desc: String = self
            .catalog
            .list()
            .iter()
            .map(|t| {
                format!(
                    "- {}: {} (domain={}, section={}, platform={}, role={})\n",
                    t.theme_id,
                    t.display_name,
                    t.domain.as_deref().unwrap_or("-"),
                    t.section.as_deref().unwrap_or("-"),
                    t.platform.as_deref().unwrap_or("-"),
                    t.role.as_deref().unwrap_or("-"),
                )
            })
            .collect();

        let user_meta_desc = query.metadata.as_ref().map_or_else(String::new, |m| {
            format!(
                "User metadata: role={}, platform={}\n",
                m.role.as_deref().unwrap_or("-"),
                m.platform.as_deref().unwrap_or("-"),
            )
        });

        CompletionRequest {
            system_prompt: "Ты классифицируешь пользовательские запросы по предопределённым \
                            тематикам документации. Возвращай JSON массив объектов \
                            {\"theme_id\": \"...\", \"score\": 0..1}. score должен отражать \
                            уверенность. От 1 до 3 объектов."
                .to_string(),
            user_prompt: format!(
                "{user_meta_desc}Темы:\n{themes_desc}\nЗапрос: {}\n\n\
                 Ответь JSON списком вида [{{\"theme_id\": \"...\", \"score\": 0.0-1.0}}].",
                query.text
            ),
            max_tokens: 400,
            temperature: 0.0,
        }
    }

    fn parse_llm_answer(&self, answer: &str) -> Option<RoutingResult> {
        let cleaned = strip_code_fence(answer);
        if cleaned.is_empty() {
            return None;
        }
        let parsed: Vec<LlmThemeScore> = match serde_json::from_str(cleaned) {
            Ok(list) => list,
            Err(e) => {
                debug!(error = %e, "theme router LLM JSON decode error");
                return None;
            }
        };
        if parsed.is_empty() {
            return None;
        }
        // An unknown theme id invalidates the whole answer.
        if parsed.iter().any(|s| self.catalog.get(&s.theme_id).is_none()) {
            debug!("theme router LLM answer names an unknown theme id");
            return None;
        }

        let mut ranked: Vec<(String, f64)> = parsed
            .into_iter()
            .map(|s| (s.theme_id, s.score.clamp(0.0, 1.0)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(LLM_MAX_THEMES);

        let top_score = ranked.first().map_or(0.0, |(_, s)| *s);
        let second_score = ranked.get(1).map_or(0.0, |(_, s)| *s);
        let primary = ranked
            .first()
            .and_then(|(id, _)| self.catalog.get(id))
            .cloned();
        let (sections, platforms, domains) = hints(primary.as_ref());

        let mut result = RoutingResult::empty(RouterKind::Llm);
        result.scores = ranked.iter().cloned().collect();
        result.themes = ranked.into_iter().map(|(id, _)| id).collect();
        result.primary_theme = primary.map(|t| t.theme_id);
        result.top_score = top_score;
        result.second_score = second_score;
        result.requires_disambiguation = top_score < LLM_DISAMBIGUATION_TOP;
        result.preferred_sections = sections;
        result.preferred_platforms = platforms;
        result.preferred_domains = domains;
        Some(result)
    }
}

fn score_by_keywords(query_lower: &str, theme: &Theme) -> f64 {
    let mut score = 0.0;

    if let Some(platform) = theme.platform.as_deref()
        && let Some(words) = keywords_for(platform)
        && words.iter().any(|w| query_lower.contains(w))
    {
        score += PLATFORM_KEYWORD_WEIGHT;
    }
    if let Some(section) = theme.section.as_deref()
        && let Some(words) = keywords_for(section)
        && words.iter().any(|w| query_lower.contains(w))
    {
        score += SECTION_KEYWORD_WEIGHT;
    }
    if theme.domain.as_deref() == Some("sdk_docs") && query_lower.contains("sdk") {
        score += METADATA_MATCH_WEIGHT;
    }
    if theme.domain.as_deref() == Some("chatcenter_user_docs")
        && ["арм", "рабочее место", "интерфейс"]
            .iter()
            .any(|w| query_lower.contains(w))
    {
        score += METADATA_MATCH_WEIGHT;
    }

    score
}

fn score_by_user_metadata(query: &Query, theme: &Theme) -> f64 {
    let Some(metadata) = query.metadata.as_ref() else {
        return 0.0;
    };
    let mut score = 0.0;

    if let (Some(user_role), Some(theme_role)) = (metadata.role.as_deref(), theme.role.as_deref())
        && user_role.eq_ignore_ascii_case(theme_role)
    {
        score += METADATA_MATCH_WEIGHT;
    }
    if let (Some(user_platform), Some(theme_platform)) =
        (metadata.platform.as_deref(), theme.platform.as_deref())
        && user_platform.eq_ignore_ascii_case(theme_platform)
    {
        score += METADATA_MATCH_WEIGHT;
    }

    score
}

fn hints(primary: Option<&Theme>) -> (Vec<String>, Vec<String>, Vec<String>) {
    primary.map_or_else(
        || (Vec::new(), Vec::new(), Vec::new()),
        |theme| {
            (
                theme.section.clone().into_iter().collect(),
                theme.platform.clone().into_iter().collect(),
                theme.domain.clone().into_iter().collect(),
            )
        },
    )
}

/// Strips ```` ```json ```` fences and a leading `JSON` tag from an LLM
/// answer so `serde_json` can parse it.
fn strip_code_fence(answer: &str) -> &str {
    let mut cleaned = answer.trim();
    cleaned = cleaned
        .strip_prefix("```json")
        .or_else(|| cleaned.strip_prefix("```"))
        .unwrap_or(cleaned);
    cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned);
    cleaned = cleaned.trim();
    cleaned = cleaned
        .strip_prefix("JSON")
        .or_else(|| cleaned.strip_prefix("json"))
        .unwrap_or(cleaned);
    cleaned.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UserMetadata;
    use crate::error::LlmError;
    use async_trait::async_trait;

    fn catalog() -> Arc<ThemeCatalog> {
        Arc::new(ThemeCatalog::from_themes(vec![
            Theme {
                theme_id: "sdk_android".to_string(),
                display_name: "SDK Android".to_string(),
                domain: Some("sdk_docs".to_string()),
                section: None,
                platform: Some("android".to_string()),
                role: None,
                description: None,
            },
            Theme {
                theme_id: "user_admin".to_string(),
                display_name: "Администрирование".to_string(),
                domain: Some("chatcenter_user_docs".to_string()),
                section: Some("admin".to_string()),
                platform: None,
                role: Some("admin".to_string()),
                description: None,
            },
        ]))
    }

    struct CannedProvider {
        answer: Result<String, ()>,
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
            self.answer.clone().map_err(|()| LlmError::Provider {
                provider: "canned".to_string(),
                message: "boom".to_string(),
            })
        }
    }

    #[test]
    fn test_heuristic_routes_sdk_android() {
        let router = ThemeRouter::new(catalog());
        let result = router.heuristic_route(&Query::new("как подключить sdk android"));

        assert_eq!(result.primary_theme.as_deref(), Some("sdk_android"));
        assert_eq!(result.themes[0], "sdk_android");
        assert!(!result.requires_disambiguation);
        // platform keyword (1.0) + sdk domain bonus (0.5)
        assert!((result.top_score - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_heuristic_primary_is_first_theme() {
        let router = ThemeRouter::new(catalog());
        let result = router.heuristic_route(&Query::new("настройка тегов"));
        if let Some(primary) = &result.primary_theme {
            assert_eq!(primary, &result.themes[0]);
        }
    }

    #[test]
    fn test_heuristic_zero_scores_require_disambiguation() {
        let router = ThemeRouter::new(catalog());
        let result = router.heuristic_route(&Query::new("совершенно посторонний вопрос"));
        assert!(result.primary_theme.is_none());
        assert!(result.requires_disambiguation);
        assert!(!result.filter_eligible());
    }

    #[test]
    fn test_heuristic_small_gap_requires_disambiguation() {
        // Role metadata matches user_admin (+0.5) while "api" hits nothing
        // for either theme; craft a near-tie via platform metadata.
        let router = ThemeRouter::new(catalog());
        let query = Query::new("вопрос про теги").with_metadata(UserMetadata {
            role: Some("admin".to_string()),
            platform: Some("android".to_string()),
        });
        let result = router.heuristic_route(&query);
        // user_admin: section keyword 0.7 + role 0.5 = 1.2;
        // sdk_android: platform metadata 0.5. Gap 0.7 >= 0.2.
        assert!(!result.requires_disambiguation);
        assert_eq!(result.primary_theme.as_deref(), Some("user_admin"));
    }

    #[test]
    fn test_filter_eligibility_heuristic_thresholds() {
        let mut result = RoutingResult::empty(RouterKind::Heuristic);
        result.top_score = 0.9;
        result.second_score = 0.2;
        assert!(result.filter_eligible());

        result.second_score = 0.7; // gap 0.2 < 0.35
        assert!(!result.filter_eligible());

        result.top_score = 0.8; // below 0.85
        result.second_score = 0.0;
        assert!(!result.filter_eligible());
    }

    #[test]
    fn test_filter_eligibility_llm_threshold() {
        let mut result = RoutingResult::empty(RouterKind::Llm);
        result.top_score = 0.95;
        assert!(result.filter_eligible());
        result.top_score = 0.85;
        assert!(!result.filter_eligible());
    }

    #[test]
    fn test_hints_follow_primary_theme() {
        let router = ThemeRouter::new(catalog());
        let result = router.heuristic_route(&Query::new("android sdk"));
        assert_eq!(result.preferred_platforms, vec!["android"]);
        assert_eq!(result.preferred_domains, vec!["sdk_docs"]);
        assert!(result.preferred_sections.is_empty());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("JSON [1]"), "[1]");
        assert_eq!(strip_code_fence("[1]"), "[1]");
    }

    #[tokio::test]
    async fn test_llm_route_success() {
        let provider: Arc<dyn LlmProvider> = Arc::new(CannedProvider {
            answer: Ok(r#"[{"theme_id": "user_admin", "score": 0.92}]"#.to_string()),
        });
        let router = ThemeRouter::new(catalog()).with_llm(vec![provider], Duration::from_secs(3));

        let result = router.route(&Query::new("как настроить теги")).await;
        assert_eq!(result.router, RouterKind::Llm);
        assert_eq!(result.primary_theme.as_deref(), Some("user_admin"));
        assert!(!result.requires_disambiguation);
        assert!(result.filter_eligible());
    }

    #[tokio::test]
    async fn test_llm_route_unknown_theme_falls_back() {
        let provider: Arc<dyn LlmProvider> = Arc::new(CannedProvider {
            answer: Ok(r#"[{"theme_id": "made_up", "score": 0.99}]"#.to_string()),
        });
        let router = ThemeRouter::new(catalog()).with_llm(vec![provider], Duration::from_secs(3));

        let result = router.route(&Query::new("android sdk")).await;
        assert_eq!(result.router, RouterKind::Heuristic);
    }

    #[tokio::test]
    async fn test_llm_route_provider_order_fallthrough() {
        let failing: Arc<dyn LlmProvider> = Arc::new(CannedProvider { answer: Err(()) });
        let working: Arc<dyn LlmProvider> = Arc::new(CannedProvider {
            answer: Ok(r#"[{"theme_id": "sdk_android", "score": 0.4}]"#.to_string()),
        });
        let router = ThemeRouter::new(catalog())
            .with_llm(vec![failing, working], Duration::from_secs(3));

        let result = router.route(&Query::new("any")).await;
        assert_eq!(result.router, RouterKind::Llm);
        // Low confidence: no filter, needs disambiguation.
        assert!(result.requires_disambiguation);
        assert!(!result.filter_eligible());
    }

    #[tokio::test]
    async fn test_llm_route_malformed_json_falls_back() {
        let provider: Arc<dyn LlmProvider> = Arc::new(CannedProvider {
            answer: Ok("not json at all".to_string()),
        });
        let router = ThemeRouter::new(catalog()).with_llm(vec![provider], Duration::from_secs(3));

        let result = router.route(&Query::new("android sdk")).await;
        assert_eq!(result.router, RouterKind::Heuristic);
        assert_eq!(result.primary_theme.as_deref(), Some("sdk_android"));
    }

    #[tokio::test]
    async fn test_llm_route_empty_catalog_falls_back() {
        let provider: Arc<dyn LlmProvider> = Arc::new(CannedProvider {
            answer: Ok(r#"[{"theme_id": "x", "score": 1.0}]"#.to_string()),
        });
        let router = ThemeRouter::new(Arc::new(ThemeCatalog::default()))
            .with_llm(vec![provider], Duration::from_secs(3));

        let result = router.route(&Query::new("whatever")).await;
        assert_eq!(result.router, RouterKind::Heuristic);
        assert!(result.themes.is_empty());
    }

    #[test]
    fn test_secondary_themes() {
        let mut result = RoutingResult::empty(RouterKind::Heuristic);
        result.themes = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
        assert_eq!(result.secondary_themes(), &["b".to_string(), "c".to_string()]);

        result.themes = vec!["a".to_string()];
        assert!(result.secondary_themes().is_empty());
    }
}
