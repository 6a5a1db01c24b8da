pub mod analysis;
pub mod ast;
pub mod binding;
pub mod canonical;
pub mod catalog;
pub mod config;
pub mod coverage;
pub mod error;
pub mod extract;
pub mod frontend;

pub use analysis::{
    analyze_test_case, process, AnalysisContext, ResultMap, TestCaseMatcher, TestCasePolicy,
};
pub use ast::{Expr, Literal, LiteralKind, MethodDef, SourceFile, Stmt};
pub use binding::{BindingState, Bindings, ModuleTypes};
pub use canonical::canonicalize;
pub use catalog::{Catalog, CatalogSource, JsonFileCatalog, ModuleExtractInfo, StaticCatalog};
pub use config::Config;
pub use coverage::{CoverageReport, ExclusionRule};
pub use error::{PropcovError, Result};
pub use extract::{Property, PropertyNaming, SetterPrefix};
pub use frontend::{Frontend, JavaFrontend, PythonFrontend, SourceLanguage};
