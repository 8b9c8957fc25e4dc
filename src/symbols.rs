//! Symbol Table
//!
//! Maps fully qualified native names to overlay entities. Entries are weak:
//! once the owning tree is dropped a lookup reports "not found".

use std::collections::HashMap;
use std::rc::Rc;

use crate::overlay::{MetaEntityRef, MetaEntityWeak};

#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: HashMap<String, MetaEntityWeak>,
}

/// Where a resolved default value came from.
#[derive(Debug, Clone)]
pub enum ConstantSource {
    /// An operator-supplied remap; the value is used verbatim.
    Remap,
    /// A live overlay entity; the value is its symbol name.
    Symbol(MetaEntityRef),
}

#[derive(Debug, Clone)]
pub struct ResolvedConstant {
    pub value: String,
    pub source: ConstantSource,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entity` under `name`. A later registration replaces the
    /// earlier one.
    pub fn insert(&mut self, name: &str, entity: &MetaEntityRef) {
        self.entries.insert(name.to_string(), Rc::downgrade(entity));
    }

    pub fn get(&self, name: &str) -> Option<MetaEntityRef> {
        self.entries.get(name).and_then(|weak| weak.upgrade())
    }

    /// True when `name` maps to an entity that is still alive.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose entity no longer exists.
    pub fn prune_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        before - self.entries.len()
    }

    /// Resolve a default-value expression used inside `user`.
    ///
    /// Each candidate is checked against the remap table first and the
    /// symbol table second. When both miss, the next candidate is built as
    /// `<user symbol>::<constant>` and `user` moves to its parent. The root
    /// has an empty symbol name, so the last candidate is `::<constant>`.
    pub fn resolve_constant(
        &self,
        remaps: &HashMap<String, String>,
        user: Option<&MetaEntityRef>,
        constant: &str,
    ) -> Option<ResolvedConstant> {
        let mut symbol = constant.to_string();
        let mut user = user.cloned();

        loop {
            if let Some(value) = remaps.get(&symbol) {
                return Some(ResolvedConstant {
                    value: value.clone(),
                    source: ConstantSource::Remap,
                });
            }

            if let Some(entity) = self.get(&symbol) {
                let value = entity.borrow().symbol_name.clone();
                return Some(ResolvedConstant {
                    value,
                    source: ConstantSource::Symbol(entity),
                });
            }

            let next = user.take()?;
            let next = next.borrow();
            symbol = format!("{}::{}", next.symbol_name, constant);
            user = next.parent();
        }
    }
}
