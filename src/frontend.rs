//! Front-end seam.
//!
//! A front end turns one header path plus compile flags into a
//! [`TranslationUnit`]. Each parse worker owns its own front-end instance;
//! only the [`DeclarationIndex`] is shared between them.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::ast::TranslationUnit;

#[derive(Error, Debug)]
pub enum FrontendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {message}")]
    Syntax { line: u32, message: String },
}

/// Include directories, preprocessor defines and raw options for the front end.
#[derive(Debug, Clone, Default)]
pub struct CompileConfig {
    pub include_dirs: Vec<String>,
    /// `(name, value)`; `NAME` without `=` defines an empty macro.
    pub defines: Vec<(String, String)>,
    pub options: Vec<String>,
}

impl CompileConfig {
    pub fn load(includes: &[String], defines: &[String], options: &[String]) -> Self {
        let defines = defines
            .iter()
            .map(|item| match item.split_once('=') {
                Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
                None => (item.trim().to_string(), String::new()),
            })
            .collect();

        CompileConfig {
            include_dirs: includes.to_vec(),
            defines,
            options: options.to_vec(),
        }
    }

    pub fn define(&self, name: &str) -> Option<&str> {
        self.defines
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Type definitions seen by any worker, keyed by fully-qualified name.
///
/// Headers are parsed independently, so the same class can be reached from
/// several translation units. Each name is owned by the smallest path that
/// defines it; the raw passes take members only from the owning unit. The
/// owner does not depend on the order workers finish in.
#[derive(Debug, Clone, Default)]
pub struct DeclarationIndex {
    owners: Arc<RwLock<HashMap<String, PathBuf>>>,
}

impl DeclarationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a definition of `name` in `path`. Returns true when `path`
    /// became the owner.
    pub fn record(&self, name: &str, path: &Path) -> bool {
        if let Some(owner) = self.owners.read().get(name) {
            if owner.as_path() <= path {
                return false;
            }
        }
        let mut owners = self.owners.write();
        match owners.get(name) {
            Some(owner) if owner.as_path() <= path => false,
            _ => {
                owners.insert(name.to_string(), path.to_path_buf());
                true
            }
        }
    }

    pub fn owner(&self, name: &str) -> Option<PathBuf> {
        self.owners.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.owners.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.owners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait Frontend {
    fn parse(
        &mut self,
        path: &Path,
        config: &CompileConfig,
    ) -> Result<TranslationUnit, FrontendError>;
}

/// Creates the per-worker front-end instances.
pub trait FrontendFactory: Sync {
    fn create(&self, index: &DeclarationIndex) -> Box<dyn Frontend>;
}

impl<F> FrontendFactory for F
where
    F: Fn(&DeclarationIndex) -> Box<dyn Frontend> + Sync,
{
    fn create(&self, index: &DeclarationIndex) -> Box<dyn Frontend> {
        self(index)
    }
}
