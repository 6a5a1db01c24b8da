//! Per-file orchestration: test-case discovery and the result-map lifecycle
//!
//! An [`AnalysisContext`] is owned by the caller and holds everything one
//! analysis run needs: the configured module identifier, the test-case policy,
//! the setter naming rule, and the result map of the last completed file.
//! Nothing is shared between contexts, so parallel drivers give each file its
//! own context.

use crate::ast::{self, MethodDef, SourceFile, Stmt};
use crate::binding::{track, ModuleTypes};
use crate::error::{PropcovError, Result};
use crate::extract::{extract, Property, PropertyNaming, SetterPrefix};
use crate::frontend::SourceLanguage;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// Default annotation/decorator that marks a test case
pub const DEFAULT_TEST_MARKER: &str = "Test";

/// Default test-case name pattern
pub const DEFAULT_TEST_NAME_PATTERN: &str = "^test";

/// Decides which methods are test cases
pub trait TestCasePolicy: Send + Sync {
    fn is_test_case(&self, method: &MethodDef) -> bool;
}

/// Marker- and name-based test-case policy.
///
/// A method is a test case if it carries one of `markers`, or if its name
/// matches `name_pattern`.
#[derive(Debug, Clone)]
pub struct TestCaseMatcher {
    markers: BTreeSet<String>,
    name_pattern: Option<Regex>,
}

impl TestCaseMatcher {
    /// # Errors
    ///
    /// Returns a configuration error if `name_pattern` is not a valid regex.
    pub fn new<I, S>(markers: I, name_pattern: Option<&str>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name_pattern = name_pattern
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| {
                    PropcovError::Configuration(format!(
                        "invalid test name pattern {pattern:?}: {err}"
                    ))
                })
            })
            .transpose()?;

        Ok(TestCaseMatcher {
            markers: markers.into_iter().map(Into::into).collect(),
            name_pattern,
        })
    }

    /// Only methods carrying one of `markers` count
    #[must_use]
    pub fn markers_only<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TestCaseMatcher {
            markers: markers.into_iter().map(Into::into).collect(),
            name_pattern: None,
        }
    }
}

impl Default for TestCaseMatcher {
    fn default() -> Self {
        TestCaseMatcher {
            markers: BTreeSet::from([DEFAULT_TEST_MARKER.to_string()]),
            name_pattern: Regex::new(DEFAULT_TEST_NAME_PATTERN).ok(),
        }
    }
}

impl TestCasePolicy for TestCaseMatcher {
    fn is_test_case(&self, method: &MethodDef) -> bool {
        method
            .markers
            .iter()
            .any(|marker| self.markers.contains(marker))
            || self
                .name_pattern
                .as_ref()
                .is_some_and(|pattern| pattern.is_match(&method.name))
    }
}

/// Properties exercised by each test case of one file, keyed by method name.
///
/// A test case that sets nothing maps to an empty set: it tests the module
/// defaults, which is different from the test case not existing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultMap {
    tests: BTreeMap<String, BTreeSet<Property>>,
}

impl ResultMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a test case; repeated names merge their property sets
    pub fn insert(&mut self, test_case: String, properties: BTreeSet<Property>) {
        match self.tests.entry(test_case) {
            Entry::Vacant(slot) => {
                slot.insert(properties);
            }
            Entry::Occupied(mut slot) => {
                tracing::debug!("duplicate test case {}, merging properties", slot.key());
                slot.get_mut().extend(properties);
            }
        }
    }

    #[must_use]
    pub fn get(&self, test_case: &str) -> Option<&BTreeSet<Property>> {
        self.tests.get(test_case)
    }

    #[must_use]
    pub fn contains(&self, test_case: &str) -> bool {
        self.tests.contains_key(test_case)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<Property>)> {
        self.tests.iter()
    }

    /// Names of every property exercised by any test case
    #[must_use]
    pub fn property_names(&self) -> BTreeSet<String> {
        self.tests
            .values()
            .flatten()
            .map(|property| property.name.clone())
            .collect()
    }

    /// Test cases that set no property at all
    #[must_use]
    pub fn default_only_tests(&self) -> Vec<String> {
        self.tests
            .iter()
            .filter(|(_, properties)| properties.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Export as JSON
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Caller-owned state for analyzing test files one at a time
pub struct AnalysisContext {
    module: Option<ModuleTypes>,
    policy: Box<dyn TestCasePolicy>,
    naming: Box<dyn PropertyNaming>,
    results: ResultMap,
}

impl AnalysisContext {
    /// Context with the default test-case policy and setter rule and no module
    #[must_use]
    pub fn new() -> Self {
        AnalysisContext {
            module: None,
            policy: Box::new(TestCaseMatcher::default()),
            naming: Box::new(SetterPrefix::default()),
            results: ResultMap::new(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: impl TestCasePolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    #[must_use]
    pub fn with_naming(mut self, naming: impl PropertyNaming + 'static) -> Self {
        self.naming = Box::new(naming);
        self
    }

    /// Configure the module whose instances count as "module under test"
    pub fn set_module(&mut self, identifier: impl Into<String>) {
        self.module = Some(ModuleTypes::new(identifier));
    }

    pub fn clear_module(&mut self) {
        self.module = None;
    }

    #[must_use]
    pub fn module(&self) -> Option<&str> {
        self.module.as_ref().map(ModuleTypes::identifier)
    }

    /// Drop the result map of the previous file
    pub fn reset(&mut self) {
        self.results = ResultMap::new();
    }

    /// Result map of the last successfully processed file
    #[must_use]
    pub fn results(&self) -> &ResultMap {
        &self.results
    }

    pub fn take_results(&mut self) -> ResultMap {
        std::mem::take(&mut self.results)
    }

    /// Analyze one file and store its result map.
    ///
    /// The map is built from scratch; on failure the stored map is cleared so
    /// no partial result survives.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no module is configured, or a
    /// malformed-input error if the file is structurally invalid.
    pub fn process(&mut self, file: &SourceFile) -> Result<&ResultMap> {
        self.reset();
        let module = self.module.as_ref().ok_or_else(|| {
            PropcovError::Configuration("no module identifier configured".into())
        })?;
        validate(file)?;

        let mut results = ResultMap::new();
        for method in &file.methods {
            if !self.policy.is_test_case(method) {
                continue;
            }
            let properties = analyze_test_case(method, module, self.naming.as_ref());
            tracing::debug!(
                "test case {} exercises {} properties",
                method.name,
                properties.len()
            );
            results.insert(method.name.clone(), properties);
        }

        tracing::info!(
            "{}: {} test cases for {}",
            file.name,
            results.len(),
            module.identifier()
        );
        self.results = results;
        Ok(&self.results)
    }

    /// Parse `source` with the front-end for `language`, then [`Self::process`] it
    ///
    /// # Errors
    ///
    /// Returns a malformed-input error if the source cannot be parsed, plus
    /// any error from [`Self::process`].
    pub fn process_source(
        &mut self,
        language: SourceLanguage,
        source: &str,
        file_name: &str,
    ) -> Result<&ResultMap> {
        if self.module.is_none() {
            self.reset();
            return Err(PropcovError::Configuration(
                "no module identifier configured".into(),
            ));
        }
        let file = match language.parse(source, file_name) {
            Ok(file) => file,
            Err(err) => {
                self.reset();
                return Err(err);
            }
        };
        self.process(&file)
    }
}

impl Default for AnalysisContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Analyze `file` for `module_identifier` with a throw-away default context
///
/// # Errors
///
/// Same as [`AnalysisContext::process`].
pub fn process(file: &SourceFile, module_identifier: &str) -> Result<ResultMap> {
    let mut context = AnalysisContext::new();
    context.set_module(module_identifier);
    context.process(file)?;
    Ok(context.take_results())
}

/// Run tracking then extraction over one test body
#[must_use]
pub fn analyze_test_case(
    method: &MethodDef,
    module: &ModuleTypes,
    naming: &dyn PropertyNaming,
) -> BTreeSet<Property> {
    let statements: Vec<&Stmt> = ast::flatten(&method.body);
    let bindings = track(&statements, module);
    if let Some(last) = bindings.last() {
        tracing::debug!(
            "{}: module instances bound at exit: {:?}",
            method.name,
            last.module_names()
        );
    }
    extract(&statements, &bindings, naming)
}

fn validate(file: &SourceFile) -> Result<()> {
    if let Some(method) = file.methods.iter().find(|m| m.name.trim().is_empty()) {
        return Err(PropcovError::MalformedInput(format!(
            "{}: method without a name at line {}",
            file.name, method.line
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    fn check() -> Expr {
        Expr::new_instance("ReturnCountCheck", vec![])
    }

    fn setter(method: &str, value: Expr) -> Stmt {
        Stmt::Expr(Expr::method_call(Expr::name("check"), method, vec![value]))
    }

    fn test_method(name: &str, body: Vec<Stmt>) -> MethodDef {
        MethodDef::new(name, body).with_marker("Test")
    }

    #[test]
    fn matcher_accepts_markers_and_name_pattern() {
        let matcher = TestCaseMatcher::default();
        assert!(matcher.is_test_case(&MethodDef::new("anything", vec![]).with_marker("Test")));
        assert!(matcher.is_test_case(&MethodDef::new("testFormat", vec![])));
        assert!(!matcher.is_test_case(&MethodDef::new("getPath", vec![])));

        let markers_only = TestCaseMatcher::markers_only(["Test"]);
        assert!(!markers_only.is_test_case(&MethodDef::new("testFormat", vec![])));
    }

    #[test]
    fn matcher_rejects_invalid_pattern() {
        let err = TestCaseMatcher::new(["Test"], Some("(")).unwrap_err();
        assert!(matches!(err, PropcovError::Configuration(_)));
    }

    #[test]
    fn empty_test_case_is_present_with_empty_set() {
        let file = SourceFile::new("Sample.java")
            .with_method(test_method("testDefault", vec![Stmt::local("check", None, Some(check()))]))
            .with_method(MethodDef::new("helper", vec![]));

        let results = process(&file, "ReturnCountCheck").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results.get("testDefault"), Some(&BTreeSet::new()));
        assert!(!results.contains("helper"));
        assert_eq!(results.default_only_tests(), vec!["testDefault".to_string()]);
    }

    #[test]
    fn bindings_do_not_leak_between_test_cases() {
        let file = SourceFile::new("Sample.java")
            .with_method(test_method(
                "testFirst",
                vec![
                    Stmt::local("check", None, Some(check())),
                    setter("setMax", Expr::number("1")),
                ],
            ))
            .with_method(test_method(
                "testSecond",
                vec![setter("setMax", Expr::number("2"))],
            ));

        let results = process(&file, "ReturnCountCheck").unwrap();
        assert_eq!(results.get("testFirst").map(BTreeSet::len), Some(1));
        assert_eq!(results.get("testSecond"), Some(&BTreeSet::new()));
    }

    #[test]
    fn setter_inside_branch_counts() {
        let file = SourceFile::new("Sample.java").with_method(test_method(
            "testBranch",
            vec![
                Stmt::local("check", None, Some(check())),
                Stmt::Block(vec![setter("setFormat", Expr::string("^$"))]),
            ],
        ));

        let results = process(&file, "ReturnCountCheck").unwrap();
        assert_eq!(
            results.get("testBranch"),
            Some(&BTreeSet::from([Property::new("format", "^$")]))
        );
    }

    #[test]
    fn missing_module_is_a_configuration_error() {
        let mut context = AnalysisContext::new();
        let err = context.process(&SourceFile::new("Sample.java")).unwrap_err();
        assert!(matches!(err, PropcovError::Configuration(_)));

        context.set_module("ReturnCountCheck");
        assert_eq!(context.module(), Some("ReturnCountCheck"));
        context.clear_module();
        assert!(context.module().is_none());
    }

    #[test]
    fn malformed_file_leaves_no_partial_result() {
        let mut context = AnalysisContext::new();
        context.set_module("ReturnCountCheck");
        let good = SourceFile::new("Good.java").with_method(test_method("testDefault", vec![]));
        context.process(&good).unwrap();
        assert_eq!(context.results().len(), 1);

        let bad = SourceFile::new("Bad.java")
            .with_method(test_method("testDefault", vec![]))
            .with_method(MethodDef::new("", vec![]));
        let err = context.process(&bad).unwrap_err();
        assert!(matches!(err, PropcovError::MalformedInput(_)));
        assert!(context.results().is_empty());
    }

    #[test]
    fn reset_then_rerun_is_idempotent() {
        let file = SourceFile::new("Sample.java").with_method(test_method(
            "testMax",
            vec![
                Stmt::local("check", None, Some(check())),
                setter("setMax", Expr::number("2")),
            ],
        ));
        let mut context = AnalysisContext::new();
        context.set_module("ReturnCountCheck");
        let first = context.process(&file).unwrap().clone();
        context.reset();
        assert!(context.results().is_empty());
        let second = context.process(&file).unwrap().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn duplicate_test_names_merge() {
        let mut results = ResultMap::new();
        results.insert("testA".into(), BTreeSet::from([Property::new("max", "1")]));
        results.insert("testA".into(), BTreeSet::from([Property::new("format", "x")]));
        assert_eq!(results.len(), 1);
        assert_eq!(results.get("testA").map(BTreeSet::len), Some(2));
        assert_eq!(
            results.property_names(),
            BTreeSet::from(["format".to_string(), "max".to_string()])
        );
    }

    #[test]
    fn result_map_serializes_as_plain_map() {
        let mut results = ResultMap::new();
        results.insert("testMax".into(), BTreeSet::from([Property::new("max", "1")]));
        results.insert("testDefault".into(), BTreeSet::new());
        let json: serde_json::Value = serde_json::from_str(&results.to_json()).unwrap();
        assert_eq!(json["testDefault"], serde_json::json!([]));
        assert_eq!(json["testMax"][0]["name"], "max");
        assert_eq!(json["testMax"][0]["value"], "1");
    }
}
