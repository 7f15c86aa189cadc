//! URL → category classification.
//!
//! Categories are assigned from an ordered list of `(pattern, category)`
//! rules evaluated first-match-wins against the lowercased URL path.
//! The rule list is plain data: the built-in table can be replaced from
//! configuration without touching this module.
//!
//! URLs that match no rule are `homepage` when their last path segment is
//! empty, `index`, or `home`, and `other` otherwise.
//!
//! # Example
//!
//! ```rust
//! use sitesage_core::category::CategoryRules;
//!
//! let rules = CategoryRules::default();
//! assert_eq!(rules.categorize("https://acme.com/tax-credits/overview"), "services/tax-credits");
//! assert_eq!(rules.categorize("https://acme.com/"), "homepage");
//! assert_eq!(rules.categorize("https://acme.com/press"), "other");
//! ```

use serde::{Deserialize, Serialize};

pub const HOMEPAGE: &str = "homepage";
pub const OTHER: &str = "other";

const HOMEPAGE_SEGMENTS: &[&str] = &["", "index", "index.html", "home"];

const BUILTIN_RULES: &[(&str, &str)] = &[
    // corporate
    ("/about", "about"),
    ("/our-team", "about"),
    ("/contact", "contact"),
    ("/career", "careers"),
    ("/award", "awards"),
    ("/testimonials", "social_proof"),
    // resources
    ("/blog", "blog"),
    ("/faq", "faq"),
    ("questions", "faq"),
    ("/insights", "insights"),
    ("/related-employee-retention", "services/erc"),
    // services
    ("/tax", "services/tax-credits"),
    ("/research", "services/tax-credits"),
    ("/employee-retention", "services/tax-credits"),
    ("/business", "services/bsgi"),
    ("/incubation", "services/bsgi"),
    ("/technology", "services/ftps"),
    ("/payment", "services/ftps"),
    ("/fintech", "services/ftps"),
    ("/capital", "services/cmib"),
    ("/investment", "services/cmib"),
    ("/ma", "services/cmib"),
];

/// One `(pattern, category)` entry. `pattern` is matched as a substring
/// of the lowercased URL path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub pattern: String,
    pub category: String,
}

/// Ordered, first-match-wins rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRules {
    rules: Vec<CategoryRule>,
}

impl CategoryRules {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| CategoryRule {
                pattern: r.pattern.to_lowercase(),
                category: r.category,
            })
            .collect();
        Self { rules }
    }

    /// Classify a URL. Deterministic for a given rule table.
    pub fn categorize(&self, url: &str) -> String {
        let lowered = url.to_lowercase();
        let path = url_path(&lowered);

        if let Some(rule) = self.rules.iter().find(|r| path.contains(&r.pattern)) {
            return rule.category.clone();
        }

        let last_segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
        if HOMEPAGE_SEGMENTS.contains(&last_segment) {
            return HOMEPAGE.to_string();
        }

        OTHER.to_string()
    }
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self::new(
            BUILTIN_RULES
                .iter()
                .map(|(pattern, category)| CategoryRule {
                    pattern: pattern.to_string(),
                    category: category.to_string(),
                })
                .collect(),
        )
    }
}

/// Path portion of a URL: scheme and host removed, query and fragment
/// dropped. Relative paths are returned as-is.
fn url_path(url: &str) -> &str {
    let without_scheme = match url.find("://") {
        Some(pos) => {
            let rest = &url[pos + 3..];
            match rest.find('/') {
                Some(slash) => &rest[slash..],
                None => "",
            }
        }
        None => url,
    };
    let end = without_scheme
        .find(['?', '#'])
        .unwrap_or(without_scheme.len());
    &without_scheme[..end]
}
