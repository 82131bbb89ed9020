//! Rules deciding which applications and window titles are never recorded.
//! The active [ExclusionPolicy] is an immutable snapshot, replaced wholesale
//! when the config document changes.

pub mod pattern;

use std::{collections::HashSet, io::ErrorKind, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use pattern::PatternCache;

/// Entry of the `excludedApps` list in the config document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedApp {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Entry of the `excludedWindows` list. `app_match` is either a concrete app
/// id or `"*"` for every app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRule {
    pub app_match: String,
    pub title_pattern: String,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn default_case_sensitive() -> bool {
    true
}

/// On-disk form of the exclusion rules. Every field is optional so users can
/// write the smallest document that says what they mean.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyDocument {
    pub excluded_apps: Vec<ExcludedApp>,
    pub excluded_windows: Vec<WindowRule>,
}

impl PolicyDocument {
    /// Writes the default document to `path`, pretty-printed so it doubles as
    /// a template for users to edit.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&PolicyDocument::default())
            .expect("Default policy document is always serializable");
        std::fs::write(path, bytes)
    }
}

/// Immutable snapshot of exclusion rules. Holds a shared [PatternCache] so
/// compiled title patterns survive policy reloads.
pub struct ExclusionPolicy {
    excluded_app_ids: HashSet<String>,
    window_rules: Vec<WindowRule>,
    patterns: Arc<PatternCache>,
}

impl ExclusionPolicy {
    pub fn new(document: PolicyDocument, patterns: Arc<PatternCache>) -> Self {
        let excluded_app_ids = document
            .excluded_apps
            .into_iter()
            .map(|app| app.id)
            .collect();
        Self {
            excluded_app_ids,
            window_rules: document.excluded_windows,
            patterns,
        }
    }

    /// The built-in policy excludes nothing. Tracking must keep working with
    /// no config document at all.
    pub fn default_policy(patterns: Arc<PatternCache>) -> Self {
        Self::new(PolicyDocument::default(), patterns)
    }

    /// Loads the policy from `path`. An absent file means the default policy;
    /// an unreadable or malformed document is logged and also falls back to
    /// the default, it never stops the caller.
    pub fn load(path: &Path, patterns: Arc<PatternCache>) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config document at {path:?}, using default policy");
                return Self::default_policy(patterns);
            }
            Err(e) => {
                error!("Failed to read config document {path:?}: {e}");
                return Self::default_policy(patterns);
            }
        };

        match serde_json::from_slice::<PolicyDocument>(&bytes) {
            Ok(document) => Self::new(document, patterns),
            Err(e) => {
                error!("Failed to parse config document {path:?}: {e}");
                Self::default_policy(patterns)
            }
        }
    }

    pub fn should_exclude_app(&self, app_id: &str) -> bool {
        self.excluded_app_ids.contains(app_id)
    }

    /// Any applicable rule that matches excludes the window; evaluation stops
    /// at the first hit.
    pub fn should_exclude_window(&self, app_id: &str, title: &str) -> bool {
        self.window_rules.iter().any(|rule| {
            let app_matches = rule.app_match == "*" || rule.app_match == app_id;
            app_matches
                && self
                    .patterns
                    .compile(&rule.title_pattern, rule.case_sensitive)
                    .matches(title)
        })
    }

    /// (excluded apps, window rules) counts, for reload log lines.
    pub fn rule_counts(&self) -> (usize, usize) {
        (self.excluded_app_ids.len(), self.window_rules.len())
    }
}

impl std::fmt::Debug for ExclusionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusionPolicy")
            .field("excluded_apps", &self.excluded_app_ids.len())
            .field("window_rules", &self.window_rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(document: PolicyDocument) -> ExclusionPolicy {
        ExclusionPolicy::new(document, Arc::new(PatternCache::default()))
    }

    fn window_rule(app_match: &str, pattern: &str, case_sensitive: bool) -> WindowRule {
        WindowRule {
            app_match: app_match.into(),
            title_pattern: pattern.into(),
            case_sensitive,
            comment: None,
        }
    }

    #[test]
    fn excludes_listed_apps_only() {
        let p = policy(PolicyDocument {
            excluded_apps: vec![ExcludedApp {
                id: "com.example.vault".into(),
                comment: None,
            }],
            excluded_windows: vec![],
        });
        assert!(p.should_exclude_app("com.example.vault"));
        assert!(!p.should_exclude_app("com.example.editor"));
    }

    #[test]
    fn window_rule_scoped_to_app() {
        let p = policy(PolicyDocument {
            excluded_apps: vec![],
            excluded_windows: vec![window_rule("com.example.browser", "*bank*", true)],
        });
        assert!(p.should_exclude_window("com.example.browser", "my bank account"));
        assert!(!p.should_exclude_window("com.example.editor", "my bank account"));
        assert!(!p.should_exclude_window("com.example.browser", "news"));
    }

    #[test]
    fn wildcard_app_match_applies_everywhere() {
        let p = policy(PolicyDocument {
            excluded_apps: vec![],
            excluded_windows: vec![window_rule("*", "*secret*", false)],
        });
        assert!(p.should_exclude_window("com.example.a", "My Secret doc"));
        assert!(p.should_exclude_window("com.example.b", "top secret"));
        assert!(!p.should_exclude_window("com.example.a", "plain doc"));
    }

    #[test]
    fn document_fields_default_when_absent() {
        let document: PolicyDocument = serde_json::from_str("{}").unwrap();
        assert!(document.excluded_apps.is_empty());
        assert!(document.excluded_windows.is_empty());

        let document: PolicyDocument = serde_json::from_str(
            r#"{"excludedWindows": [{"appMatch": "*", "titlePattern": "*a*"}]}"#,
        )
        .unwrap();
        assert!(document.excluded_windows[0].case_sensitive);
    }

    #[test]
    fn load_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let p = ExclusionPolicy::load(
            &dir.path().join("nope.json"),
            Arc::new(PatternCache::default()),
        );
        assert_eq!(p.rule_counts(), (0, 0));
    }

    #[test]
    fn load_malformed_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, b"{not json").unwrap();
        let p = ExclusionPolicy::load(&path, Arc::new(PatternCache::default()));
        assert_eq!(p.rule_counts(), (0, 0));
    }

    #[test]
    fn load_round_trips_written_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        PolicyDocument::write_default(&path).unwrap();
        let p = ExclusionPolicy::load(&path, Arc::new(PatternCache::default()));
        assert_eq!(p.rule_counts(), (0, 0));
    }
}
