//! Catalog of known modules and the properties they declare
//!
//! The catalog is ground truth for coverage checks. It is read-only input:
//! the analysis never consults it, only the coverage comparison does.

use crate::error::{PropcovError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One declared property of a module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleProperty {
    pub name: String,
}

/// A module and its declared properties, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleExtractInfo {
    /// Simple name (`ReturnCountCheck`)
    pub name: String,
    /// Fully qualified name (`com.example.checks.ReturnCountCheck`)
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub properties: Vec<ModuleProperty>,
}

impl ModuleExtractInfo {
    #[must_use]
    pub fn new<I, S>(full_name: &str, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ModuleExtractInfo {
            name: crate::binding::simple_type_name(full_name).to_string(),
            full_name: full_name.to_string(),
            properties: properties
                .into_iter()
                .map(|name| ModuleProperty { name: name.into() })
                .collect(),
        }
    }

    /// Identifier to configure the analysis with: full name when known
    #[must_use]
    pub fn identifier(&self) -> &str {
        if self.full_name.is_empty() {
            &self.name
        } else {
            &self.full_name
        }
    }

    /// Declared property names, first occurrence wins
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.properties
            .iter()
            .filter(|property| seen.insert(property.name.as_str()))
            .map(|property| property.name.clone())
            .collect()
    }
}

/// All modules known to a catalog source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    modules: Vec<ModuleExtractInfo>,
}

impl Catalog {
    #[must_use]
    pub fn new(modules: Vec<ModuleExtractInfo>) -> Self {
        Catalog { modules }
    }

    /// Parse the JSON array format
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is not a list of modules.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn modules(&self) -> &[ModuleExtractInfo] {
        &self.modules
    }

    /// Look up a module by simple or fully qualified name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModuleExtractInfo> {
        self.modules
            .iter()
            .find(|module| module.full_name == name)
            .or_else(|| self.modules.iter().find(|module| module.name == name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Where the catalog comes from
pub trait CatalogSource {
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded.
    fn fetch_catalog(&self) -> Result<Catalog>;
}

/// Catalog held in memory, for fixtures and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog(pub Catalog);

impl CatalogSource for StaticCatalog {
    fn fetch_catalog(&self) -> Result<Catalog> {
        Ok(self.0.clone())
    }
}

/// Catalog stored as a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonFileCatalog {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CatalogSource for JsonFileCatalog {
    fn fetch_catalog(&self) -> Result<Catalog> {
        let json = std::fs::read_to_string(&self.path).map_err(|err| {
            PropcovError::Configuration(format!(
                "cannot read catalog {}: {err}",
                self.path.display()
            ))
        })?;
        let catalog = Catalog::from_json(&json)?;
        tracing::info!(
            "Loaded {} modules from {}",
            catalog.len(),
            self.path.display()
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_JSON: &str = r#"[
        {
            "name": "ReturnCountCheck",
            "fullName": "com.example.checks.ReturnCountCheck",
            "properties": [
                {"name": "max"},
                {"name": "maxForVoid"},
                {"name": "format"},
                {"name": "tokens"},
                {"name": "max"}
            ]
        },
        {"name": "Checker"}
    ]"#;

    #[test]
    fn parses_catalog_json() {
        let catalog = Catalog::from_json(CATALOG_JSON).unwrap();
        assert_eq!(catalog.len(), 2);

        let module = catalog.get("ReturnCountCheck").unwrap();
        assert_eq!(module.identifier(), "com.example.checks.ReturnCountCheck");
        assert_eq!(
            module.property_names(),
            vec!["max", "maxForVoid", "format", "tokens"]
        );

        let checker = catalog.get("Checker").unwrap();
        assert_eq!(checker.identifier(), "Checker");
        assert!(checker.property_names().is_empty());
    }

    #[test]
    fn lookup_by_full_name() {
        let catalog = Catalog::from_json(CATALOG_JSON).unwrap();
        assert!(catalog.get("com.example.checks.ReturnCountCheck").is_some());
        assert!(catalog.get("Missing").is_none());
    }

    #[test]
    fn static_catalog_returns_fixture() {
        let module = ModuleExtractInfo::new("a.b.FooCheck", ["max"]);
        assert_eq!(module.name, "FooCheck");
        let source = StaticCatalog(Catalog::new(vec![module.clone()]));
        assert_eq!(source.fetch_catalog().unwrap().modules(), &[module]);
    }

    #[test]
    fn json_file_catalog_reports_missing_file() {
        let err = JsonFileCatalog::new("/nonexistent/catalog.json")
            .fetch_catalog()
            .unwrap_err();
        assert!(matches!(err, PropcovError::Configuration(_)));
    }

    #[test]
    fn malformed_catalog_is_json_error() {
        assert!(matches!(
            Catalog::from_json("{\"not\": \"a list\"}"),
            Err(PropcovError::JsonError(_))
        ));
    }
}
