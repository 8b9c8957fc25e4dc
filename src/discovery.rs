//! Parsing Coordinator
//!
//! Scans each parse path for headers and runs them through the front end on
//! a fixed pool of workers. Workers share one mutex over the work queue and
//! the result map; parsing itself happens outside the lock.

use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use walkdir::WalkDir;

use crate::ast::TranslationUnit;
use crate::error::{GeneratorError, Result};
use crate::frontend::{CompileConfig, DeclarationIndex, FrontendFactory};
use crate::rules::{NamespaceRules, ParsePath};

/// Number of parse workers when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Recursively list files below `root` as `/`-separated paths relative to it,
/// sorted.
pub fn scan_directory(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Err(GeneratorError::Scan {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(relative);
        }
    }

    files.sort();
    Ok(files)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARALLEL PARSING
// ═══════════════════════════════════════════════════════════════════════════════

struct WorkState {
    queue: Vec<String>,
    report: ParseReport,
}

/// Outcome of parsing one parse path.
#[derive(Debug, Default)]
pub struct ParseReport {
    pub parsed: BTreeMap<PathBuf, TranslationUnit>,
    /// One [`GeneratorError::Parse`] per header the front end failed on,
    /// ordered by path.
    pub failed: Vec<GeneratorError>,
}

/// Parse `files` (relative to `parse_path.path`) on `workers` threads.
///
/// Files rejected by the path's checker are dropped without parsing; files the
/// front end fails on are logged and left out of the result.
pub fn parse_files(
    parse_path: &ParsePath,
    files: Vec<String>,
    config: &CompileConfig,
    factory: &dyn FrontendFactory,
    index: &DeclarationIndex,
    workers: usize,
) -> Result<BTreeMap<PathBuf, TranslationUnit>> {
    let report = parse_report(parse_path, files, config, factory, index, workers)?;
    for failure in &report.failed {
        error!("{}", failure);
    }
    Ok(report.parsed)
}

/// Like [`parse_files`], but hands the failures back instead of logging them.
pub fn parse_report(
    parse_path: &ParsePath,
    files: Vec<String>,
    config: &CompileConfig,
    factory: &dyn FrontendFactory,
    index: &DeclarationIndex,
    workers: usize,
) -> Result<ParseReport> {
    let workers = workers.max(1);
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("bridgegen-parse-{}", i))
        .build()
        .map_err(|e| GeneratorError::WorkerPool(e.to_string()))?;

    let state = Mutex::new(WorkState {
        queue: files,
        report: ParseReport::default(),
    });

    {
        let state = &state;
        pool.scope(|scope| {
            for _ in 0..workers {
                scope.spawn(move |_| parse_worker(state, parse_path, config, factory, index));
            }
        });
    }

    let mut report = state.into_inner().report;
    report.failed.sort_by(|a, b| failure_path(a).cmp(&failure_path(b)));
    Ok(report)
}

fn failure_path(err: &GeneratorError) -> Option<&Path> {
    match err {
        GeneratorError::Parse { path, .. } => Some(path.as_path()),
        _ => None,
    }
}

fn parse_worker(
    state: &Mutex<WorkState>,
    parse_path: &ParsePath,
    config: &CompileConfig,
    factory: &dyn FrontendFactory,
    index: &DeclarationIndex,
) {
    let mut frontend = factory.create(index);

    loop {
        let relative = {
            let mut state = state.lock();
            let mut next = None;
            while let Some(candidate) = state.queue.pop() {
                if parse_path.checker.is_included(&candidate) {
                    next = Some(candidate);
                    break;
                }
            }
            match next {
                Some(path) => path,
                None => return,
            }
        };

        let absolute = parse_path.path.join(&relative);
        debug!("Parse: {}", relative);

        match frontend.parse(&absolute, config) {
            Ok(unit) => {
                state.lock().report.parsed.insert(absolute, unit);
            }
            Err(e) => {
                let failure = GeneratorError::Parse {
                    path: absolute,
                    reason: e.to_string(),
                };
                state.lock().report.failed.push(failure);
            }
        }
    }
}

/// Fill `rules.parsed` from every parse path of the namespace.
///
/// A parse path whose directory cannot be scanned is logged and skipped.
/// Returns the number of headers parsed.
pub fn parse_namespace(
    rules: &mut NamespaceRules,
    config: &CompileConfig,
    factory: &dyn FrontendFactory,
    index: &DeclarationIndex,
    workers: usize,
) -> Result<usize> {
    let NamespaceRules {
        parse_paths,
        parsed,
        ..
    } = rules;

    let before = parsed.len();
    for parse_path in parse_paths.iter() {
        let files = match scan_directory(&parse_path.path) {
            Ok(files) => files,
            Err(e) => {
                error!("Failed to scan directory {}: {}", parse_path.path.display(), e);
                continue;
            }
        };
        let result = parse_files(parse_path, files, config, factory, index, workers)?;
        parsed.extend(result);
    }

    Ok(parsed.len() - before)
}
