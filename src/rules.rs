/* Category rules: case-insensitive name-substring patterns grouped by
   intent, evaluated in insertion order so reports reproduce run to run. */

use crate::types::{ClassificationResult, DesiredOutcome, MethodRecord};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// How a category's matches are turned into patch outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PatchPolicy {
    /// Root/debug/emulator/tamper/pinning/license/authentication checks:
    /// booleans forced by name polarity, counters to zero, reference
    /// returns nulled.
    SecurityCheck,
    /// Premium and billing gates: booleans forced true, numeric getters to
    /// the maximum representable value.
    Entitlement,
    /// A caller-pinned outcome, still validated against the return kind.
    Fixed(DesiredOutcome),
}

/// One category with its match patterns and patch policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: String,
    /// Substrings matched case-insensitively against method names.
    pub patterns: Vec<String>,
    pub policy: PatchPolicy,
}

impl CategoryRule {
    pub fn new(category: &str, patterns: &[&str], policy: PatchPolicy) -> CategoryRule {
        CategoryRule {
            category: category.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            policy,
        }
    }

    /// True when any pattern occurs, case-insensitively, within `name`.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.patterns.iter().any(|p| name.contains(&p.to_lowercase()))
    }
}

/// Ordered, immutable rule table. An explicitly constructed configuration
/// object: no ambient state, and category evaluation order is exactly the
/// insertion order.
///
/// # Examples
///
/// ```
///  use smalipatch::rules::RuleSet;
///
///  let rules = RuleSet::default();
///  assert!(rules.rule("root-detection").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<CategoryRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<CategoryRule>) -> RuleSet {
        RuleSet { rules }
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn rule(&self, category: &str) -> Option<&CategoryRule> {
        self.rules.iter().find(|r| r.category == category)
    }

    /// All matching categories for one method, in table order. Every match
    /// is retained; there is no first-match-wins cut.
    pub fn classify(&self, record: &MethodRecord) -> ClassificationResult {
        let categories = self
            .rules
            .iter()
            .filter(|r| r.matches(&record.name))
            .map(|r| r.category.clone())
            .collect();
        ClassificationResult {
            method: record.clone(),
            categories,
        }
    }
}

impl Default for RuleSet {
    fn default() -> RuleSet {
        DEFAULT_RULES.clone()
    }
}

/* Patterns are deliberately multi-token substrings; short fragments like
   "su" or "pro" over-match obfuscated identifiers. */
static DEFAULT_RULES: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::new(vec![
        CategoryRule::new(
            "root-detection",
            &["isrooted", "checkroot", "rootcheck", "detectroot", "isjailbroken", "rootbeer", "checksu"],
            PatchPolicy::SecurityCheck,
        ),
        CategoryRule::new(
            "debug-detection",
            &["isdebug", "checkdebug", "detectdebug", "debuggable", "antidebug"],
            PatchPolicy::SecurityCheck,
        ),
        CategoryRule::new(
            "emulator-detection",
            &["isemulator", "checkemulator", "detectemulator", "isgenymotion"],
            PatchPolicy::SecurityCheck,
        ),
        CategoryRule::new(
            "tamper-detection",
            &["istampered", "checktamper", "checkintegrity", "verifysignature", "checksignature", "ishooked"],
            PatchPolicy::SecurityCheck,
        ),
        CategoryRule::new(
            "certificate-pinning",
            &["certificatepinner", "checkservertrusted", "checkclienttrusted", "getacceptedissuers", "pincertificate", "verifyhostname", "checkpin"],
            PatchPolicy::SecurityCheck,
        ),
        CategoryRule::new(
            "license-check",
            &["checklicense", "verifylicense", "islicensed", "licensevalid", "checkactivation"],
            PatchPolicy::SecurityCheck,
        ),
        CategoryRule::new(
            "authentication",
            &["isauthenticated", "isauthorized", "verifypassword", "checkcredential", "isloggedin"],
            PatchPolicy::SecurityCheck,
        ),
        CategoryRule::new(
            "entitlement",
            &["ispremium", "isvip", "hassubscription", "issubscribed", "isunlocked", "ispurchased", "hasfeature", "getcredits", "getcoins"],
            PatchPolicy::Entitlement,
        ),
        CategoryRule::new(
            "billing",
            &["isbillingsupported", "purchasestate", "isbillingavailable"],
            PatchPolicy::Entitlement,
        ),
    ])
});
