//! CLI for per-test property extraction and coverage checks
#![allow(
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::too_many_arguments,
    clippy::fn_params_excessive_bools
)]

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use dunce::canonicalize as dunce_canonicalize;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use propcov::{
    AnalysisContext, Catalog, CatalogSource, Config, CoverageReport, ExclusionRule,
    JsonFileCatalog, ModuleExtractInfo, Property, ResultMap, SourceLanguage,
};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, info, warn};
use tracing_subscriber::filter::EnvFilter;

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/build/**"];
const DEFAULT_INCLUDES: &[&str] = &["**/*Test.java", "**/test_*.py", "**/*_test.py"];

#[derive(Parser)]
#[command(name = "propcov")]
#[command(about = "Per-test configuration properties of a module under test", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(global = true, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Reduce logging to warnings and errors
    #[arg(global = true, short = 'q', long = "quiet")]
    quiet: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the properties each test case of one file sets on the module
    Analyze {
        /// Path to the test source file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Module under test (simple or fully qualified type name)
        #[arg(long, value_name = "ID")]
        module: String,

        /// Print the result map as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze every test file in a directory tree for one module
    Scan {
        /// Directory containing test sources
        #[arg(value_name = "INPUT_DIR")]
        input_dir: PathBuf,

        /// Module under test (simple or fully qualified type name)
        #[arg(long, value_name = "ID")]
        module: String,

        /// Glob pattern to include (repeatable). Defaults to common test file names
        #[arg(long, value_name = "GLOB")]
        include: Vec<String>,

        /// Glob pattern to exclude (repeatable)
        #[arg(long, value_name = "GLOB")]
        exclude: Vec<String>,

        /// Limit parallel workers
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,

        /// Include hidden files and directories
        #[arg(long)]
        include_hidden: bool,

        /// Follow symlinks when traversing directories
        #[arg(long)]
        follow_symlinks: bool,

        /// Maximum directory depth to traverse (root depth = 1)
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,

        /// Respect .gitignore files when scanning
        #[arg(long)]
        respect_gitignore: bool,

        /// Print the aggregated results as JSON
        #[arg(long)]
        json: bool,

        /// Write the aggregated results as JSON to this path
        #[arg(long, value_name = "FILE")]
        output_json: Option<PathBuf>,

        /// Exit with status 1 when any file fails to analyze
        #[arg(long)]
        fail_on_error: bool,
    },

    /// Compare each catalog module's declared properties with its unit test
    Coverage {
        /// Catalog JSON listing modules and their properties
        #[arg(long, value_name = "JSON")]
        catalog: PathBuf,

        /// Repository root that contains the test sources
        #[arg(long, value_name = "DIR")]
        repo: PathBuf,

        /// Test source root relative to the repository (overrides config)
        #[arg(long, value_name = "DIR")]
        test_root: Option<String>,

        /// Check only this module, by simple or full name (repeatable)
        #[arg(long = "module", value_name = "NAME")]
        only: Vec<String>,

        /// Module to skip, by simple or full name (repeatable)
        #[arg(long, value_name = "NAME")]
        skip: Vec<String>,

        /// Property to leave out of the comparison (repeatable)
        #[arg(long, value_name = "NAME")]
        exclude_property: Vec<String>,

        /// Limit parallel workers
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,

        /// Print the reports as JSON
        #[arg(long)]
        json: bool,

        /// Write the reports as JSON to this path
        #[arg(long, value_name = "FILE")]
        output_json: Option<PathBuf>,

        /// Exit with status 2 when a module has untested properties
        #[arg(long)]
        fail_on_untested: bool,

        /// Exit with status 1 when a module's test cannot be found or analyzed
        #[arg(long)]
        fail_on_error: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.quiet {
        "warn"
    } else if cli.verbose >= 2 {
        "debug"
    } else {
        "info"
    };
    let env_filter = EnvFilter::new(level);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    // Fail early on invalid analysis settings, before any file is read
    config.analysis_context()?;

    match cli.command {
        Commands::Analyze { file, module, json } => {
            analyze(&config, &file, &module, json)?;
        }
        Commands::Scan {
            input_dir,
            module,
            include,
            exclude,
            jobs,
            include_hidden,
            follow_symlinks,
            max_depth,
            respect_gitignore,
            json,
            output_json,
            fail_on_error,
        } => {
            let code = scan(
                &config,
                &input_dir,
                &module,
                &include,
                &exclude,
                jobs,
                WalkOptions {
                    include_hidden,
                    follow_symlinks,
                    max_depth,
                    respect_gitignore,
                },
                json,
                output_json.as_deref(),
                fail_on_error,
                cli.quiet,
            )?;
            if code != 0 {
                process::exit(code);
            }
        }
        Commands::Coverage {
            catalog,
            repo,
            test_root,
            only,
            skip,
            exclude_property,
            jobs,
            json,
            output_json,
            fail_on_untested,
            fail_on_error,
        } => {
            let mut config = config;
            if let Some(test_root) = test_root {
                config.coverage.test_root = test_root;
            }
            config.coverage.skip_modules.extend(skip);
            config.coverage.exclude_properties.extend(exclude_property);

            let summary = coverage(&config, &JsonFileCatalog::new(&catalog), &repo, &only, jobs)?;
            print_coverage(&summary, json, output_json.as_deref(), cli.quiet)?;

            let code = summary.exit_code(fail_on_untested, fail_on_error);
            if code != 0 {
                process::exit(code);
            }
        }
    }

    Ok(())
}

fn analyze(config: &Config, file: &Path, module: &str, json: bool) -> anyhow::Result<()> {
    let results = analyze_file(config, file, module)?;
    if json {
        println!("{}", results.to_json());
    } else {
        print_result_map(&results, "");
    }
    Ok(())
}

/// Read, parse and analyze one test file with a fresh context
fn analyze_file(config: &Config, path: &Path, module: &str) -> anyhow::Result<ResultMap> {
    let language = SourceLanguage::from_path(path)?;
    let source = read_source(path)?;

    let mut context: AnalysisContext = config.analysis_context()?;
    context.set_module(module);
    context
        .process_source(language, &source, &path.display().to_string())
        .with_context(|| format!("failed to analyze {}", path.display()))?;
    Ok(context.take_results())
}

fn print_result_map(results: &ResultMap, indent: &str) {
    for (test_case, properties) in results.iter() {
        println!("{}{}: {}", indent, test_case, format_properties(properties));
    }
}

fn format_properties(properties: &BTreeSet<Property>) -> String {
    if properties.is_empty() {
        return "(defaults)".to_string();
    }
    properties
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Clone, Copy)]
struct WalkOptions {
    include_hidden: bool,
    follow_symlinks: bool,
    max_depth: Option<usize>,
    respect_gitignore: bool,
}

#[derive(Clone)]
struct Candidate {
    abs_path: PathBuf,
    rel_norm: String,
}

#[derive(Debug, Default, Serialize)]
struct ScanStats {
    processed: usize,
    analyzed: usize,
    errors: usize,
    test_cases: usize,
    files: BTreeMap<String, ResultMap>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    failures: BTreeMap<String, String>,
}

fn scan(
    config: &Config,
    input_dir: &Path,
    module: &str,
    includes: &[String],
    excludes: &[String],
    jobs: Option<usize>,
    walk: WalkOptions,
    json: bool,
    output_json: Option<&Path>,
    fail_on_error: bool,
    quiet: bool,
) -> anyhow::Result<i32> {
    let input_dir = canonicalize_directory(input_dir)?;
    if !input_dir.is_dir() {
        anyhow::bail!("Input '{}' is not a directory", input_dir.display());
    }

    let include_patterns = if includes.is_empty() {
        DEFAULT_INCLUDES.iter().map(|p| p.to_string()).collect()
    } else {
        includes.to_vec()
    };
    let case_insensitive = cfg!(windows);
    let include_glob = build_globset(&include_patterns, case_insensitive)?;
    let exclude_glob = build_globset(&merged_exclude_patterns(excludes), case_insensitive)?;

    let mut stats = ScanStats::default();
    let mut candidates = collect_candidates(&input_dir, walk, &include_glob, &exclude_glob, &mut stats);
    candidates.sort_by(|a, b| a.rel_norm.cmp(&b.rel_norm));

    let jobs = resolve_jobs(jobs)?;
    let outcomes = execute_parallel(&candidates, jobs, |candidate| {
        analyze_file(config, &candidate.abs_path, module).map_err(|err| format!("{:#}", err))
    })?;

    for (candidate, outcome) in candidates.iter().zip(outcomes) {
        stats.processed += 1;
        match outcome {
            Ok(results) => {
                stats.analyzed += 1;
                stats.test_cases += results.len();
                if !quiet && !json {
                    println!("• {} → {} test cases", candidate.rel_norm, results.len());
                    print_result_map(&results, "    ");
                }
                stats.files.insert(candidate.rel_norm.clone(), results);
            }
            Err(message) => {
                stats.errors += 1;
                warn!("{}: {}", candidate.rel_norm, message);
                stats.failures.insert(candidate.rel_norm.clone(), message);
            }
        }
    }

    let message = format!(
        "Scanned {} files → {} analyzed, {} errors, {} test cases",
        stats.processed, stats.analyzed, stats.errors, stats.test_cases
    );
    info!("{}", message);
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else if !quiet {
        println!("{}", message);
    }
    if let Some(path) = output_json {
        write_json(path, &stats)?;
    }

    Ok(if fail_on_error && stats.errors > 0 { 1 } else { 0 })
}

fn collect_candidates(
    root: &Path,
    walk: WalkOptions,
    include_glob: &GlobSet,
    exclude_glob: &GlobSet,
    stats: &mut ScanStats,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for entry in build_walker(root, walk) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                stats.errors += 1;
                warn!("walk error: {}", err);
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            continue;
        }
        if !walk.follow_symlinks && entry.path_is_symlink() {
            continue;
        }

        let path = entry.path();
        let Ok(rel_path) = path.strip_prefix(root) else {
            continue;
        };
        let rel_norm = normalize_rel_path(rel_path);

        if !include_glob.is_match(rel_norm.as_str()) {
            debug!("• {} → skipped (not included)", rel_norm);
            continue;
        }
        if exclude_glob.is_match(rel_norm.as_str()) {
            debug!("• {} → skipped (excluded)", rel_norm);
            continue;
        }
        if SourceLanguage::from_path(path).is_err() {
            debug!("• {} → skipped (unsupported language)", rel_norm);
            continue;
        }

        candidates.push(Candidate {
            abs_path: path.to_path_buf(),
            rel_norm,
        });
    }

    candidates
}

#[derive(Debug, Serialize)]
struct ModuleError {
    module: String,
    message: String,
}

#[derive(Debug, Default, Serialize)]
struct CoverageSummary {
    complete: usize,
    incomplete: usize,
    skipped: Vec<String>,
    reports: Vec<CoverageReport>,
    errors: Vec<ModuleError>,
}

impl CoverageSummary {
    fn exit_code(&self, fail_on_untested: bool, fail_on_error: bool) -> i32 {
        let mut code = 0;
        if fail_on_error && !self.errors.is_empty() {
            code |= 1;
        }
        if fail_on_untested && self.incomplete > 0 {
            code |= 2;
        }
        code
    }
}

fn coverage(
    config: &Config,
    source: &dyn CatalogSource,
    repo: &Path,
    only: &[String],
    jobs: Option<usize>,
) -> anyhow::Result<CoverageSummary> {
    let repo = canonicalize_directory(repo)?;
    let catalog: Catalog = source.fetch_catalog()?;
    let rule = config.exclusion_rule();
    let test_root = repo.join(&config.coverage.test_root);

    let mut summary = CoverageSummary::default();
    let selected: Vec<&ModuleExtractInfo> = if only.is_empty() {
        catalog.modules().iter().collect()
    } else {
        only.iter()
            .map(|name| {
                catalog
                    .get(name)
                    .with_context(|| format!("module {} is not in the catalog", name))
            })
            .collect::<anyhow::Result<_>>()?
    };

    let mut modules: Vec<&ModuleExtractInfo> = Vec::new();
    for module in selected {
        if is_skipped(module, &config.coverage.skip_modules) {
            debug!("• {} → skipped", module.identifier());
            summary.skipped.push(module.identifier().to_string());
        } else {
            modules.push(module);
        }
    }

    let jobs = resolve_jobs(jobs)?;
    let outcomes = execute_parallel(&modules, jobs, |module| {
        module_coverage(config, module, &test_root, &rule)
    })?;

    for (module, outcome) in modules.iter().zip(outcomes) {
        match outcome {
            Ok(report) => {
                if report.is_complete() {
                    summary.complete += 1;
                } else {
                    summary.incomplete += 1;
                }
                summary.reports.push(report);
            }
            Err(message) => {
                warn!("{}: {}", module.identifier(), message);
                summary.errors.push(ModuleError {
                    module: module.identifier().to_string(),
                    message,
                });
            }
        }
    }

    info!(
        "Checked {} modules → {} complete, {} incomplete, {} errors, {} skipped",
        modules.len(),
        summary.complete,
        summary.incomplete,
        summary.errors.len(),
        summary.skipped.len()
    );
    Ok(summary)
}

fn module_coverage(
    config: &Config,
    module: &ModuleExtractInfo,
    test_root: &Path,
    rule: &ExclusionRule,
) -> Result<CoverageReport, String> {
    let Some(path) = locate_test_file(test_root, module) else {
        return Err(format!(
            "no test file under {} (expected {}Test.java)",
            test_root.display(),
            module_path(module)
        ));
    };
    let results = analyze_file(config, &path, module.identifier())
        .map_err(|err| format!("{:#}", err))?;
    Ok(CoverageReport::compute(module, &results, rule))
}

fn is_skipped(module: &ModuleExtractInfo, skip: &[String]) -> bool {
    skip.iter()
        .any(|name| *name == module.name || *name == module.full_name)
}

/// `com.example.FooCheck` -> `com/example/FooCheck`
fn module_path(module: &ModuleExtractInfo) -> String {
    module.identifier().replace('.', "/")
}

fn locate_test_file(test_root: &Path, module: &ModuleExtractInfo) -> Option<PathBuf> {
    let stem = format!("{}Test", module_path(module));
    [SourceLanguage::Java, SourceLanguage::Python]
        .into_iter()
        .map(|language| test_root.join(format!("{}.{}", stem, language.extension())))
        .find(|candidate| candidate.is_file())
}

fn print_coverage(
    summary: &CoverageSummary,
    json: bool,
    output_json: Option<&Path>,
    quiet: bool,
) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        for report in &summary.reports {
            if quiet && report.is_complete() {
                continue;
            }
            print!("{}", report.to_text());
        }
        for error in &summary.errors {
            println!("ERROR {}: {}", error.module, error.message);
        }
        if !quiet {
            println!(
                "{} complete, {} incomplete, {} errors, {} skipped",
                summary.complete,
                summary.incomplete,
                summary.errors.len(),
                summary.skipped.len()
            );
        }
    }

    if let Some(path) = output_json {
        write_json(path, summary)?;
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

fn canonicalize_directory(path: &Path) -> anyhow::Result<PathBuf> {
    dunce_canonicalize(path).with_context(|| format!("failed to canonicalize {}", path.display()))
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    decode_source_bytes(&bytes, &path.display().to_string())
}

/// Decode with BOM sniffing (UTF-8 otherwise) and normalize CRLF to LF
fn decode_source_bytes(bytes: &[u8], label: &str) -> anyhow::Result<String> {
    let encoding: &'static Encoding = if bytes.starts_with(&[0xFF, 0xFE]) {
        UTF_16LE
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        UTF_16BE
    } else {
        UTF_8
    };

    let (decoded, had_errors) = encoding.decode_with_bom_removal(bytes);
    if had_errors {
        anyhow::bail!("failed to decode {} using {}", label, encoding.name());
    }

    let content = decoded.into_owned();
    if content.contains('\r') {
        Ok(content.replace("\r\n", "\n"))
    } else {
        Ok(content)
    }
}

fn build_walker(root: &Path, walk: WalkOptions) -> ignore::Walk {
    let mut builder = WalkBuilder::new(root);
    builder.follow_links(walk.follow_symlinks);
    builder.standard_filters(false);
    builder.hidden(!walk.include_hidden);
    builder.max_depth(walk.max_depth);
    builder.require_git(false);

    if walk.respect_gitignore {
        builder
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .ignore(true);
    }

    builder.build()
}

fn merged_exclude_patterns(extras: &[String]) -> Vec<String> {
    let mut patterns: Vec<String> = DEFAULT_EXCLUDES
        .iter()
        .map(|pattern| pattern.to_string())
        .collect();
    patterns.extend(extras.iter().cloned());
    patterns
}

fn build_globset(patterns: &[String], case_insensitive: bool) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let mut glob_builder = GlobBuilder::new(pattern);
        glob_builder.case_insensitive(case_insensitive);
        builder.add(glob_builder.build()?);
    }
    Ok(builder.build()?)
}

fn normalize_rel_path(rel_path: &Path) -> String {
    rel_path
        .iter()
        .map(|component| component.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn resolve_jobs(jobs: Option<usize>) -> anyhow::Result<usize> {
    match jobs {
        Some(0) => anyhow::bail!("--jobs must be at least 1"),
        Some(value) => Ok(value),
        None => Ok(std::cmp::max(1, num_cpus::get())),
    }
}

/// Map `processor` over `items`, on a dedicated pool when `jobs > 1`.
/// Output order matches input order.
fn execute_parallel<T, R, F>(items: &[T], jobs: usize, processor: F) -> anyhow::Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    if jobs <= 1 {
        Ok(items.iter().map(&processor).collect())
    } else {
        let pool = ThreadPoolBuilder::new().num_threads(jobs).build()?;
        Ok(pool.install(|| items.par_iter().map(&processor).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bom_and_crlf() {
        let bytes = b"\xEF\xBB\xBFclass A {}\r\n";
        assert_eq!(decode_source_bytes(bytes, "a").unwrap(), "class A {}\n");

        let utf16: Vec<u8> = [0xFF, 0xFE]
            .into_iter()
            .chain("x\r\n".encode_utf16().flat_map(u16::to_le_bytes))
            .collect();
        assert_eq!(decode_source_bytes(&utf16, "b").unwrap(), "x\n");
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert!(decode_source_bytes(&[0x66, 0xFF, 0x6F], "bad").is_err());
    }

    #[test]
    fn jobs_must_be_positive() {
        assert!(resolve_jobs(Some(0)).is_err());
        assert_eq!(resolve_jobs(Some(3)).unwrap(), 3);
        assert!(resolve_jobs(None).unwrap() >= 1);
    }

    #[test]
    fn module_test_file_path() {
        let module = ModuleExtractInfo::new("com.example.checks.ReturnCountCheck", ["max"]);
        assert_eq!(module_path(&module), "com/example/checks/ReturnCountCheck");
        assert!(is_skipped(&module, &["ReturnCountCheck".to_string()]));
        assert!(!is_skipped(&module, &["Checker".to_string()]));
    }

    #[test]
    fn parallel_map_keeps_order() {
        let items: Vec<usize> = (0..64).collect();
        let doubled = execute_parallel(&items, 4, |value| value * 2).unwrap();
        assert_eq!(doubled, items.iter().map(|v| v * 2).collect::<Vec<_>>());
    }
}
