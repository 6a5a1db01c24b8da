//! Property coverage of a module by its unit tests
//!
//! Compares the property names a module declares against the names its test
//! file exercises. Some properties (by default `tokens`) are excluded from
//! both sides: token lists are matched by identity elsewhere and are not part
//! of this check.

use crate::analysis::ResultMap;
use crate::catalog::ModuleExtractInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Property excluded from coverage comparison unless configured otherwise
pub const DEFAULT_EXCLUDED_PROPERTY: &str = "tokens";

/// Property names ignored on both sides of the comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRule {
    excluded: BTreeSet<String>,
}

impl ExclusionRule {
    #[must_use]
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExclusionRule {
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_excluded(&self, property: &str) -> bool {
        self.excluded.contains(property)
    }

    #[must_use]
    pub fn excluded(&self) -> &BTreeSet<String> {
        &self.excluded
    }
}

impl Default for ExclusionRule {
    fn default() -> Self {
        Self::new([DEFAULT_EXCLUDED_PROPERTY])
    }
}

/// Coverage of one module's declared properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub module: String,
    /// Declared properties, declaration order, exclusions removed
    pub declared: Vec<String>,
    /// Properties set by at least one test case, exclusions removed
    pub exercised: Vec<String>,
    /// Declared but never set by any test case
    pub untested: Vec<String>,
    /// Set by a test case but not declared by the module
    pub undeclared: Vec<String>,
    pub excluded: Vec<String>,
    pub test_cases: usize,
    /// Test cases that only exercise defaults
    pub default_only_tests: Vec<String>,
}

impl CoverageReport {
    #[must_use]
    pub fn compute(module: &ModuleExtractInfo, results: &ResultMap, rule: &ExclusionRule) -> Self {
        let declared: Vec<String> = module
            .property_names()
            .into_iter()
            .filter(|name| !rule.is_excluded(name))
            .collect();
        let exercised: BTreeSet<String> = results
            .property_names()
            .into_iter()
            .filter(|name| !rule.is_excluded(name))
            .collect();
        let declared_set: BTreeSet<&str> = declared.iter().map(String::as_str).collect();

        let untested = declared
            .iter()
            .filter(|name| !exercised.contains(*name))
            .cloned()
            .collect();
        let undeclared = exercised
            .iter()
            .filter(|name| !declared_set.contains(name.as_str()))
            .cloned()
            .collect();

        CoverageReport {
            module: module.identifier().to_string(),
            declared,
            exercised: exercised.into_iter().collect(),
            untested,
            undeclared,
            excluded: rule.excluded().iter().cloned().collect(),
            test_cases: results.len(),
            default_only_tests: results.default_only_tests(),
        }
    }

    /// Every declared property is exercised by some test case
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.untested.is_empty()
    }

    /// Export as JSON
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// One summary line, plus one line per untested or undeclared property
    #[must_use]
    pub fn to_text(&self) -> String {
        let status = if self.is_complete() { "ok" } else { "MISSING" };
        let mut text = format!(
            "{status} {}: {}/{} properties exercised by {} test cases\n",
            self.module,
            self.declared.len() - self.untested.len(),
            self.declared.len(),
            self.test_cases
        );
        for name in &self.untested {
            let _ = writeln!(text, "  untested: {name}");
        }
        for name in &self.undeclared {
            let _ = writeln!(text, "  undeclared: {name}");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Property;

    fn results() -> ResultMap {
        let mut results = ResultMap::new();
        results.insert("testDefault".into(), BTreeSet::new());
        results.insert("testFormat".into(), BTreeSet::from([Property::new("format", "^$")]));
        results.insert("testLambdas".into(), BTreeSet::from([Property::new("tokens", "LAMBDA")]));
        results.insert(
            "testMaxForVoid".into(),
            BTreeSet::from([Property::new("max", "2"), Property::new("maxForVoid", "0")]),
        );
        results
    }

    #[test]
    fn complete_when_every_declared_property_is_exercised() {
        let module = ModuleExtractInfo::new(
            "com.example.ReturnCountCheck",
            ["max", "maxForVoid", "format", "tokens"],
        );
        let report = CoverageReport::compute(&module, &results(), &ExclusionRule::default());

        assert!(report.is_complete());
        assert_eq!(report.declared, vec!["max", "maxForVoid", "format"]);
        assert_eq!(report.exercised, vec!["format", "max", "maxForVoid"]);
        assert_eq!(report.excluded, vec!["tokens"]);
        assert_eq!(report.test_cases, 4);
        assert_eq!(report.default_only_tests, vec!["testDefault"]);
    }

    #[test]
    fn reports_untested_and_undeclared() {
        let module = ModuleExtractInfo::new("ReturnCountCheck", ["max", "limit", "tokens"]);
        let rule = ExclusionRule::new(Vec::<String>::new());
        let report = CoverageReport::compute(&module, &results(), &rule);

        assert!(!report.is_complete());
        assert_eq!(report.untested, vec!["limit"]);
        assert_eq!(report.undeclared, vec!["format", "maxForVoid"]);

        let text = report.to_text();
        assert!(text.starts_with("MISSING ReturnCountCheck: 2/3"));
        assert!(text.contains("untested: limit"));
        assert!(text.contains("undeclared: format"));
    }

    #[test]
    fn json_export_contains_fields() {
        let module = ModuleExtractInfo::new("ReturnCountCheck", ["max"]);
        let report = CoverageReport::compute(&module, &ResultMap::new(), &ExclusionRule::default());
        let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(json["module"], "ReturnCountCheck");
        assert_eq!(json["untested"][0], "max");
        assert_eq!(json["test_cases"], 0);
    }
}
