use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use lru::LruCache;
use regex::RegexBuilder;
use tracing::warn;

/// How many compiled patterns are kept around. Policies are expected to hold a
/// handful of rules, the bound only matters for misconfigured ones.
const DEFAULT_CAPACITY: usize = 100;

/// A title pattern compiled to a matchable form. Supports `*` (any run of
/// characters) and `?` (exactly one character); everything else is literal and
/// the whole string must match.
pub struct TitleMatcher {
    regex: Option<regex::Regex>,
}

impl TitleMatcher {
    fn compile(pattern: &str, case_sensitive: bool) -> Self {
        let regex = RegexBuilder::new(&glob_to_regex(pattern))
            .case_insensitive(!case_sensitive)
            .build()
            .inspect_err(|e| warn!("Invalid title pattern {pattern:?}: {e}"))
            .ok();
        Self { regex }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(text))
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut translated = String::with_capacity(pattern.len() + 2);
    translated.push('^');
    for c in pattern.chars() {
        match c {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            c => translated.push_str(&regex::escape(&c.to_string())),
        }
    }
    translated.push('$');
    translated
}

/// Bounded cache of compiled matchers keyed by `(case_sensitive, pattern)`.
pub struct PatternCache {
    matchers: Mutex<LruCache<(bool, String), Arc<TitleMatcher>>>,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl PatternCache {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            matchers: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the compiled matcher for `pattern`, compiling on first use.
    /// Compilation failures are cached too, as never-matching entries.
    pub fn compile(&self, pattern: &str, case_sensitive: bool) -> Arc<TitleMatcher> {
        let mut matchers = self.matchers.lock().unwrap();
        if let Some(found) = matchers.get(&(case_sensitive, pattern.to_owned())) {
            return found.clone();
        }
        let compiled = Arc::new(TitleMatcher::compile(pattern, case_sensitive));
        matchers.put((case_sensitive, pattern.to_owned()), compiled.clone());
        compiled
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.matchers.lock().unwrap().len()
    }
}
