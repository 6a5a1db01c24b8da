//! Optional TOML configuration for the driver
//!
//! ```toml
//! [analysis]
//! test_markers = ["Test", "ParameterizedTest"]
//! test_name_pattern = "^test"
//! setter_prefix = "set"
//!
//! [coverage]
//! exclude_properties = ["tokens"]
//! skip_modules = ["Checker"]
//! test_root = "src/test/java"
//! ```

use crate::analysis::{
    AnalysisContext, TestCaseMatcher, DEFAULT_TEST_MARKER, DEFAULT_TEST_NAME_PATTERN,
};
use crate::coverage::{ExclusionRule, DEFAULT_EXCLUDED_PROPERTY};
use crate::error::{PropcovError, Result};
use crate::extract::SetterPrefix;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default location of test sources relative to a repository root
pub const DEFAULT_TEST_ROOT: &str = "src/test/java";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisSettings,
    pub coverage: CoverageSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub test_markers: Vec<String>,
    /// Regex on method names; empty string disables name matching
    pub test_name_pattern: String,
    pub setter_prefix: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            test_markers: vec![DEFAULT_TEST_MARKER.to_string()],
            test_name_pattern: DEFAULT_TEST_NAME_PATTERN.to_string(),
            setter_prefix: "set".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageSettings {
    pub exclude_properties: Vec<String>,
    pub skip_modules: Vec<String>,
    pub test_root: String,
}

impl Default for CoverageSettings {
    fn default() -> Self {
        CoverageSettings {
            exclude_properties: vec![DEFAULT_EXCLUDED_PROPERTY.to_string()],
            skip_modules: Vec::new(),
            test_root: DEFAULT_TEST_ROOT.to_string(),
        }
    }
}

impl Config {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML for this schema.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load from a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| {
            PropcovError::Configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Test-case policy described by `[analysis]`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name pattern is not a valid regex.
    pub fn test_case_matcher(&self) -> Result<TestCaseMatcher> {
        let pattern = self.analysis.test_name_pattern.trim();
        TestCaseMatcher::new(
            self.analysis.test_markers.iter().cloned(),
            (!pattern.is_empty()).then_some(pattern),
        )
    }

    /// Fresh analysis context carrying these settings, without a module
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings.
    pub fn analysis_context(&self) -> Result<AnalysisContext> {
        if self.analysis.setter_prefix.is_empty() {
            return Err(PropcovError::Configuration(
                "setter_prefix must not be empty".into(),
            ));
        }
        Ok(AnalysisContext::new()
            .with_policy(self.test_case_matcher()?)
            .with_naming(SetterPrefix::new(self.analysis.setter_prefix.clone())))
    }

    #[must_use]
    pub fn exclusion_rule(&self) -> ExclusionRule {
        ExclusionRule::new(self.coverage.exclude_properties.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::MethodDef;
    use crate::analysis::TestCasePolicy;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.coverage.test_root, "src/test/java");
        assert!(config.exclusion_rule().is_excluded("tokens"));
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let config = Config::from_toml(
            r#"
[analysis]
test_markers = ["Test", "ParameterizedTest"]

[coverage]
skip_modules = ["Checker"]
"#,
        )
        .unwrap();

        assert_eq!(config.analysis.test_name_pattern, "^test");
        assert_eq!(config.coverage.skip_modules, vec!["Checker"]);
        assert_eq!(config.coverage.exclude_properties, vec!["tokens"]);

        let matcher = config.test_case_matcher().unwrap();
        assert!(matcher.is_test_case(&MethodDef::new("cases", vec![]).with_marker("ParameterizedTest")));
    }

    #[test]
    fn empty_pattern_disables_name_matching() {
        let config = Config::from_toml("[analysis]\ntest_name_pattern = \"\"\n").unwrap();
        let matcher = config.test_case_matcher().unwrap();
        assert!(!matcher.is_test_case(&MethodDef::new("testFoo", vec![])));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let bad_regex = Config::from_toml("[analysis]\ntest_name_pattern = \"(\"\n").unwrap();
        assert!(matches!(
            bad_regex.analysis_context(),
            Err(PropcovError::Configuration(_))
        ));

        let bad_prefix = Config::from_toml("[analysis]\nsetter_prefix = \"\"\n").unwrap();
        assert!(bad_prefix.analysis_context().is_err());

        assert!(matches!(
            Config::from_toml("[analysis]\ntest_markers = 3\n"),
            Err(PropcovError::TomlError(_))
        ));
    }
}
