//! Pass Contracts
//!
//! Both pipelines share one lifecycle: `start` once, `namespace_start` and
//! `namespace_stop` around each namespace, `visit` per node, `stop` once.
//! Raw passes additionally see `start_file`/`stop_file` around each header.

use std::path::Path;

use crate::ast::{Access, AstEntity};
use crate::error::Result;
use crate::frontend::DeclarationIndex;
use crate::overlay::MetaEntityRef;
use crate::rules::{GeneratorSettings, NamespaceRules};
use crate::symbols::SymbolTable;
use crate::typemap::TypeMapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitEvent {
    ContainerEnter,
    ContainerExit,
    Leaf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitorInfo {
    pub event: VisitEvent,
    pub access: Access,
}

impl VisitorInfo {
    pub fn new(event: VisitEvent, access: Access) -> Self {
        VisitorInfo { event, access }
    }
}

/// The namespace currently being generated, handed to every hook that needs it.
pub struct PassContext<'a> {
    pub settings: &'a GeneratorSettings,
    pub rules: &'a NamespaceRules,
    pub symbols: &'a mut SymbolTable,
    pub index: Option<&'a DeclarationIndex>,
}

impl<'a> PassContext<'a> {
    pub fn new(
        settings: &'a GeneratorSettings,
        rules: &'a NamespaceRules,
        symbols: &'a mut SymbolTable,
    ) -> Self {
        PassContext {
            settings,
            rules,
            symbols,
            index: None,
        }
    }

    pub fn with_index(mut self, index: &'a DeclarationIndex) -> Self {
        self.index = Some(index);
        self
    }

    /// Whether `path` supplies the definition of the type `symbol`: it is the
    /// owner recorded by the front end, or the owner is not parsed here.
    pub fn owns_definition(&self, symbol: &str, path: &Path) -> bool {
        match self.index.and_then(|index| index.owner(symbol)) {
            Some(owner) if self.rules.parsed.contains_key(&owner) => owner.as_path() == path,
            _ => true,
        }
    }

    pub fn type_mapper(&self) -> TypeMapper<'_> {
        TypeMapper::new(self.rules, &*self.symbols)
    }
}

/// A pass over each parsed header's native AST.
pub trait CppPass {
    fn name(&self) -> &'static str;

    fn start(&mut self, _settings: &GeneratorSettings) {}

    fn namespace_start(&mut self, _ctx: &mut PassContext<'_>) {}

    fn start_file(&mut self, _ctx: &mut PassContext<'_>, _path: &Path) {}

    /// Return false on a container enter to skip its children.
    fn visit(&mut self, ctx: &mut PassContext<'_>, entity: &AstEntity, info: VisitorInfo) -> bool;

    fn stop_file(&mut self, _ctx: &mut PassContext<'_>, _path: &Path) {}

    fn namespace_stop(&mut self, _ctx: &mut PassContext<'_>) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self, _settings: &GeneratorSettings) -> Result<()> {
        Ok(())
    }
}

/// A pass over a namespace's overlay tree.
pub trait ApiPass {
    fn name(&self) -> &'static str;

    fn start(&mut self, _settings: &GeneratorSettings) {}

    fn namespace_start(&mut self, _ctx: &mut PassContext<'_>) {}

    /// Return false on a container enter to skip its children and exit event.
    fn visit(
        &mut self,
        ctx: &mut PassContext<'_>,
        entity: &MetaEntityRef,
        info: VisitorInfo,
    ) -> bool;

    fn namespace_stop(&mut self, _ctx: &mut PassContext<'_>) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self, _settings: &GeneratorSettings) -> Result<()> {
        Ok(())
    }
}
