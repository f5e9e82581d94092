use crate::job::work::Parser;
use anyhow::{Context, Result};
use regex::Regex;
use std::sync::Arc;
use url::Url;

/// Ordered registry mapping URL patterns to the parser responsible for them.
///
/// Resolution walks the rules in registration order and returns the first
/// match, so more specific patterns should be registered first. The registry
/// doubles as the scope filter for discovered links: anything no rule matches
/// is out of scope and dropped.
pub struct UrlPatterns {
    rules: Vec<(Regex, Arc<dyn Parser>)>,
}

impl UrlPatterns {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Registers a pattern/parser pair. The pattern is an anchored-as-written
    /// regular expression over the full URL string.
    pub fn register(mut self, pattern: &str, parser: Arc<dyn Parser>) -> Result<Self> {
        let regex = Regex::new(pattern)
            .with_context(|| format!("invalid url pattern {pattern:?}"))?;
        self.rules.push((regex, parser));
        Ok(self)
    }

    /// Resolves the parser responsible for `url`, if any rule matches.
    pub fn parser_for(&self, url: &str) -> Option<Arc<dyn Parser>> {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(url))
            .map(|(_, parser)| Arc::clone(parser))
    }

    pub fn is_match(&self, url: &str) -> bool {
        self.rules.iter().any(|(regex, _)| regex.is_match(url))
    }

    /// Filters discovered URLs down to the in-scope, well-formed ones,
    /// preserving discovery order.
    pub fn matches<I>(&self, urls: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        urls.into_iter()
            .filter(|url| Url::parse(url).is_ok())
            .filter(|url| self.is_match(url))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

impl Default for UrlPatterns {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UrlPatterns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlPatterns")
            .field("rules", &self.rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::opener::Opener;
    use crate::job::work::{ParseFuture, ParseResult};

    struct NoopParser;

    impl Parser for NoopParser {
        fn parse<'a>(&'a self, _opener: Arc<dyn Opener>, _url: &'a str) -> ParseFuture<'a> {
            Box::pin(async { Ok(ParseResult::empty()) })
        }
    }

    fn registry() -> UrlPatterns {
        UrlPatterns::new()
            .register(r"^http://site\.test/list/", Arc::new(NoopParser))
            .and_then(|p| p.register(r"^http://site\.test/item/", Arc::new(NoopParser)))
            .expect("patterns should compile")
    }

    #[test]
    fn resolves_first_matching_rule() {
        let patterns = registry();
        assert!(patterns.parser_for("http://site.test/list/1").is_some());
        assert!(patterns.parser_for("http://site.test/item/2").is_some());
        assert!(patterns.parser_for("http://other.test/").is_none());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = UrlPatterns::new()
            .register("(unclosed", Arc::new(NoopParser))
            .expect_err("invalid regex should fail");
        assert!(format!("{err}").contains("invalid url pattern"));
    }

    #[test]
    fn matches_filters_scope_and_malformed_urls_in_order() {
        let patterns = registry();
        let filtered = patterns.matches(vec![
            "http://site.test/item/1".to_string(),
            "not a url".to_string(),
            "http://elsewhere.test/item/1".to_string(),
            "http://site.test/list/9".to_string(),
        ]);
        assert_eq!(
            filtered,
            vec![
                "http://site.test/item/1".to_string(),
                "http://site.test/list/9".to_string(),
            ]
        );
    }
}
