//! Keyword-based categorization
//!
//! Each rule scores one point per keyword found as a substring of the
//! lower-cased text. The highest score wins; rules are visited in configured
//! order and only a strictly greater score replaces the current best, so the
//! first rule reaching the maximum wins a tie. No hits means the default
//! category.

use crate::infrastructure::config::CategoryRule;
use crate::infrastructure::config::defaults::DEFAULT_CATEGORY;

struct PreparedRule {
    name: String,
    keywords: Vec<String>,
}

pub struct Categorizer {
    rules: Vec<PreparedRule>,
}

impl Categorizer {
    pub fn new(rules: &[CategoryRule]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| {
                let mut keywords: Vec<String> = Vec::new();
                for keyword in &rule.keywords {
                    let keyword = keyword.trim().to_lowercase();
                    if !keyword.is_empty() && !keywords.contains(&keyword) {
                        keywords.push(keyword);
                    }
                }
                PreparedRule {
                    name: rule.name.clone(),
                    keywords,
                }
            })
            .collect();

        Self { rules }
    }

    pub fn categorize(&self, text: &str) -> &str {
        let text = text.to_lowercase();
        let mut best: Option<(&str, usize)> = None;

        for rule in &self.rules {
            let score = rule
                .keywords
                .iter()
                .filter(|keyword| text.contains(keyword.as_str()))
                .count();

            if score > 0 && best.is_none_or(|(_, top)| score > top) {
                best = Some((rule.name.as_str(), score));
            }
        }

        best.map(|(name, _)| name).unwrap_or(DEFAULT_CATEGORY)
    }

    /// An explicit, non-blank category always wins over scoring
    pub fn assign<'a>(&'a self, explicit: Option<&'a str>, text: &str) -> &'a str {
        match explicit.map(str::trim).filter(|c| !c.is_empty()) {
            Some(category) => category,
            None => self.categorize(text),
        }
    }
}

/// One-shot categorization against an ordered rule list
pub fn categorize(text: &str, rules: &[CategoryRule]) -> String {
    Categorizer::new(rules).categorize(text).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<CategoryRule> {
        vec![
            CategoryRule::new("Tools", &["drill"]),
            CategoryRule::new("Toys", &["drill", "car"]),
        ]
    }

    #[test]
    fn test_more_hits_wins() {
        assert_eq!(categorize("Drill CAR", &rules()), "Toys");
    }

    #[test]
    fn test_first_rule_wins_ties() {
        assert_eq!(categorize("cordless drill", &rules()), "Tools");

        let reversed: Vec<_> = rules().into_iter().rev().collect();
        assert_eq!(categorize("cordless drill", &reversed), "Toys");
    }

    #[test]
    fn test_no_hits_or_no_rules_is_default() {
        assert_eq!(categorize("garden hose", &rules()), DEFAULT_CATEGORY);
        assert_eq!(categorize("drill", &[]), DEFAULT_CATEGORY);
    }

    #[test]
    fn test_blank_and_duplicate_keywords_do_not_score() {
        let rules = vec![
            CategoryRule::new("Noise", &["", "  ", "lamp", "LAMP"]),
            CategoryRule::new("Home", &["lamp", "desk"]),
        ];
        assert_eq!(categorize("desk lamp", &rules), "Home");
    }

    #[test]
    fn test_explicit_category_overrides() {
        let categorizer = Categorizer::new(&rules());
        assert_eq!(categorizer.assign(Some("Garden"), "drill car"), "Garden");
        assert_eq!(categorizer.assign(Some("  "), "drill car"), "Toys");
        assert_eq!(categorizer.assign(None, "drill"), "Tools");
    }
}
