//! Source-language front-ends
//!
//! Each front-end parses one file and lowers it into the generic
//! [`SourceFile`](crate::ast::SourceFile) tree. The analysis itself never
//! touches a concrete parser.

pub mod java;
pub mod python;

use crate::ast::SourceFile;
use crate::error::{PropcovError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub use java::JavaFrontend;
pub use python::PythonFrontend;

/// Parses source text into the generic syntax tree
pub trait Frontend {
    /// # Errors
    ///
    /// Returns [`PropcovError::MalformedInput`] if the source cannot be parsed.
    fn parse(&self, source: &str, file_name: &str) -> Result<SourceFile>;

    /// File extensions handled, without the leading dot
    fn extensions(&self) -> &'static [&'static str];
}

/// Languages with a bundled front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    Java,
    Python,
}

impl SourceLanguage {
    /// Detect the language from a file extension
    ///
    /// # Errors
    ///
    /// Returns [`PropcovError::UnsupportedLanguage`] for unknown extensions.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        if JavaFrontend.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            Ok(SourceLanguage::Java)
        } else if PythonFrontend
            .extensions()
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
        {
            Ok(SourceLanguage::Python)
        } else {
            Err(PropcovError::UnsupportedLanguage(path.display().to_string()))
        }
    }

    /// Extension test files of this language use
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            SourceLanguage::Java => "java",
            SourceLanguage::Python => "py",
        }
    }

    /// Parse with this language's front-end
    ///
    /// # Errors
    ///
    /// Returns [`PropcovError::MalformedInput`] if the source cannot be parsed.
    pub fn parse(self, source: &str, file_name: &str) -> Result<SourceFile> {
        match self {
            SourceLanguage::Java => JavaFrontend.parse(source, file_name),
            SourceLanguage::Python => PythonFrontend.parse(source, file_name),
        }
    }
}

impl fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLanguage::Java => write!(f, "java"),
            SourceLanguage::Python => write!(f, "python"),
        }
    }
}

/// Last segment of a dotted name (`org.junit.Test` -> `Test`)
pub(crate) fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name).trim()
}
