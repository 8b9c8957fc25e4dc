//! Generator Context
//!
//! Owns the configuration, the per-namespace rules, the symbol table and the
//! two pass pipelines, and drives a run:
//!
//! 1. `start` on every pass.
//! 2. Per namespace: parse its headers in parallel, run each raw pass over
//!    every parsed file, then each overlay pass over the overlay tree.
//! 3. `stop` on every pass.
//!
//! A pass finishes a namespace completely before the next pass begins.

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::api_passes::{BridgeNamingPass, MoveGlobalsPass};
use crate::discovery::{default_workers, parse_namespace};
use crate::error::Result;
use crate::frontend::{CompileConfig, DeclarationIndex, FrontendFactory};
use crate::generate_bridge::GenerateBridgePass;
use crate::generate_managed::GenerateManagedPass;
use crate::header_parser::HeaderFrontend;
use crate::overlay::count_nodes;
use crate::pass::{ApiPass, CppPass, PassContext};
use crate::raw_passes::{BuildOverlayPass, ExportMembersPass};
use crate::rules::{load_rules, GeneratorSettings, NamespaceRules};
use crate::symbols::SymbolTable;
use crate::visitor::{walk_overlay, walk_translation_unit};

pub struct GeneratorContext {
    settings: GeneratorSettings,
    namespaces: Vec<NamespaceRules>,
    symbols: SymbolTable,
    config: CompileConfig,
    /// Definition owners of the namespace being generated.
    index: DeclarationIndex,
    frontend: Box<dyn FrontendFactory>,
    workers: usize,
    cpp_passes: Vec<Box<dyn CppPass>>,
    api_passes: Vec<Box<dyn ApiPass>>,
}

impl GeneratorContext {
    /// A context reading headers below `source_dir` with the built-in front
    /// end and no passes registered.
    pub fn new(source_dir: &Path, output_dir: &Path) -> Self {
        GeneratorContext {
            settings: GeneratorSettings {
                source_dir: source_dir.to_path_buf(),
                output_dir: output_dir.to_path_buf(),
                ..GeneratorSettings::default()
            },
            namespaces: Vec::new(),
            symbols: SymbolTable::new(),
            config: CompileConfig::default(),
            index: DeclarationIndex::new(),
            frontend: Box::new(HeaderFrontend::factory),
            workers: default_workers(),
            cpp_passes: Vec::new(),
            api_passes: Vec::new(),
        }
    }

    /// Register the passes shipped with the crate, in pipeline order.
    pub fn with_default_passes(mut self) -> Self {
        self.add_cpp_pass(BuildOverlayPass::new());
        self.add_cpp_pass(ExportMembersPass::new());
        self.add_api_pass(MoveGlobalsPass::new());
        self.add_api_pass(BridgeNamingPass::new());
        self.add_api_pass(GenerateBridgePass::new());
        self.add_api_pass(GenerateManagedPass::new());
        self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIGURATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Load a rules document from JSON text. Replaces previously loaded rules.
    pub fn load_rules(&mut self, text: &str) -> Result<()> {
        let document: Value = serde_json::from_str(text)?;
        self.load_rules_value(&document)
    }

    pub fn load_rules_value(&mut self, document: &Value) -> Result<()> {
        let (mut settings, namespaces) = load_rules(document, &self.settings.source_dir)?;
        settings.output_dir = self.settings.output_dir.clone();
        self.settings = settings;
        self.namespaces = namespaces;
        Ok(())
    }

    pub fn load_compile_config(&mut self, includes: &[String], defines: &[String], options: &[String]) {
        self.config = CompileConfig::load(includes, defines, options);
    }

    pub fn set_output_dir(&mut self, output_dir: &Path) {
        self.settings.output_dir = output_dir.to_path_buf();
    }

    pub fn set_workers(&mut self, workers: usize) {
        self.workers = workers.max(1);
    }

    /// Replace the front end used to parse headers.
    pub fn set_frontend<F: FrontendFactory + 'static>(&mut self, frontend: F) {
        self.frontend = Box::new(frontend);
    }

    pub fn add_cpp_pass<P: CppPass + 'static>(&mut self, pass: P) {
        self.cpp_passes.push(Box::new(pass));
    }

    pub fn add_api_pass<P: ApiPass + 'static>(&mut self, pass: P) {
        self.api_passes.push(Box::new(pass));
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn namespaces(&self) -> &[NamespaceRules] {
        &self.namespaces
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn output_dir(&self) -> PathBuf {
        self.settings.output_dir.clone()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RUN
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn generate(&mut self) -> Result<()> {
        for pass in self.cpp_passes.iter_mut() {
            pass.start(&self.settings);
        }
        for pass in self.api_passes.iter_mut() {
            pass.start(&self.settings);
        }

        for rules in self.namespaces.iter_mut() {
            info!("Namespace: {}", rules.default_namespace);
            rules.parsed.clear();
            rules.reset_overlay();
            self.symbols.prune_expired();
            self.index = DeclarationIndex::new();

            let parsed = parse_namespace(
                rules,
                &self.config,
                self.frontend.as_ref(),
                &self.index,
                self.workers,
            )?;
            info!("Parsed {} headers", parsed);

            let rules: &NamespaceRules = rules;
            let mut ctx =
                PassContext::new(&self.settings, rules, &mut self.symbols).with_index(&self.index);

            for pass in self.cpp_passes.iter_mut() {
                pass.namespace_start(&mut ctx);
            }
            for pass in self.cpp_passes.iter_mut() {
                info!("Run pass: {}", pass.name());
                for (path, unit) in &rules.parsed {
                    pass.start_file(&mut ctx, path);
                    walk_translation_unit(pass.as_mut(), &mut ctx, unit);
                    pass.stop_file(&mut ctx, path);
                }
            }
            for pass in self.cpp_passes.iter_mut() {
                pass.namespace_stop(&mut ctx)?;
            }

            for pass in self.api_passes.iter_mut() {
                pass.namespace_start(&mut ctx);
            }
            for pass in self.api_passes.iter_mut() {
                info!("Run pass: {}", pass.name());
                walk_overlay(pass.as_mut(), &mut ctx, &rules.api_root);
            }
            for pass in self.api_passes.iter_mut() {
                pass.namespace_stop(&mut ctx)?;
            }

            info!(
                "Namespace {} exported {} entities",
                rules.default_namespace,
                count_nodes(&rules.api_root)
            );
        }

        for pass in self.cpp_passes.iter_mut() {
            pass.stop(&self.settings)?;
        }
        for pass in self.api_passes.iter_mut() {
            pass.stop(&self.settings)?;
        }
        Ok(())
    }
}
