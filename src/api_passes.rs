//! Overlay Transformations
//!
//! `MoveGlobalsPass` gives namespace-level functions and variables a home
//! class, since the managed side has no free functions. `BridgeNamingPass`
//! names every bridge function and turns native default values into managed
//! ones where it can.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::ast::{CppType, DeclFlags, EntityKind};
use crate::overlay::{add_child, ancestors, detach, MetaEntity, MetaEntityRef};
use crate::pass::{ApiPass, PassContext, VisitEvent, VisitorInfo};
use crate::rules::STRING_TYPE;
use crate::symbols::ConstantSource;

/// Name of the class that receives namespace-level functions and variables.
pub const GLOBALS_CLASS: &str = "Globals";

lazy_static! {
    static ref NUMBER_RE: Regex =
        Regex::new(r"^[-+]?(0[xX][0-9a-fA-F]+|[0-9]+\.?[0-9]*([eE][-+]?[0-9]+)?)([fFuUlL]*)$")
            .unwrap();
    static ref IDENT_RE: Regex = Regex::new(r"^(::)?[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$").unwrap();
}

/// Flatten a native symbol into a C identifier: `Urho3D::Node::GetName`
/// becomes `Urho3D_Node_GetName`.
pub fn sanitize(symbol: &str) -> String {
    symbol
        .trim_start_matches("::")
        .replace("::", "_")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Dotted managed path of an entity below its namespace: enclosing classes
/// and enums, then the entity itself.
pub fn managed_path(entity: &MetaEntityRef) -> String {
    let mut parts: Vec<String> = ancestors(entity)
        .iter()
        .filter(|a| matches!(a.borrow().kind, EntityKind::Class | EntityKind::Enum))
        .map(|a| a.borrow().name.clone())
        .collect();
    parts.push(entity.borrow().name.clone());
    parts.join(".")
}

// ═══════════════════════════════════════════════════════════════════════════════
// MOVE GLOBALS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct MoveGlobalsPass;

impl MoveGlobalsPass {
    pub fn new() -> Self {
        MoveGlobalsPass
    }

    fn globals_of(ctx: &mut PassContext<'_>, scope: &MetaEntityRef) -> MetaEntityRef {
        let existing = scope.borrow().children.iter().find(|c| {
            let c = c.borrow();
            c.kind == EntityKind::Class && c.name == GLOBALS_CLASS
        }).cloned();
        if let Some(globals) = existing {
            return globals;
        }

        let symbol = {
            let scope = scope.borrow();
            if scope.symbol_name.is_empty() {
                GLOBALS_CLASS.to_string()
            } else {
                format!("{}::{}", scope.symbol_name, GLOBALS_CLASS)
            }
        };
        let mut globals = MetaEntity::new(EntityKind::Class, GLOBALS_CLASS, &symbol);
        globals.flags = DeclFlags::STATIC;
        let globals = globals.into_ref();
        add_child(scope, globals.clone());
        ctx.symbols.insert(&symbol, &globals);
        globals
    }
}

impl ApiPass for MoveGlobalsPass {
    fn name(&self) -> &'static str {
        "MoveGlobalsPass"
    }

    fn visit(&mut self, ctx: &mut PassContext<'_>, entity: &MetaEntityRef, info: VisitorInfo) -> bool {
        let kind = entity.borrow().kind;
        if !matches!(kind, EntityKind::File | EntityKind::Namespace) {
            return false;
        }

        match info.event {
            VisitEvent::ContainerEnter => {
                let globals: Vec<MetaEntityRef> = entity
                    .borrow()
                    .children
                    .iter()
                    .filter(|c| {
                        let c = c.borrow();
                        c.kind == EntityKind::Function || c.kind.is_variable_like()
                    })
                    .cloned()
                    .collect();
                if !globals.is_empty() {
                    let class = Self::globals_of(ctx, entity);
                    for member in globals {
                        add_child(&class, member);
                    }
                }
            }
            VisitEvent::ContainerExit => {
                if kind == EntityKind::Namespace && entity.borrow().children.is_empty() {
                    detach(entity);
                }
            }
            VisitEvent::Leaf => {}
        }
        true
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BRIDGE NAMING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct BridgeNamingPass {
    used: HashMap<String, usize>,
}

/// Managed spelling of a native literal, or `None` when `value` is not one.
fn managed_literal(value: &str) -> Option<String> {
    match value {
        "true" | "false" => return Some(value.to_string()),
        "nullptr" | "NULL" => return Some("null".to_string()),
        _ => {}
    }
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return Some(value.to_string());
    }
    if value.len() >= 3 && value.starts_with('\'') && value.ends_with('\'') {
        return Some(value.to_string());
    }

    let caps = NUMBER_RE.captures(value)?;
    let number = &value[..value.len() - caps[3].len()];
    let suffix = caps[3].to_ascii_lowercase();
    let number = if number.ends_with('.') {
        format!("{}0", number)
    } else {
        number.to_string()
    };

    let suffix = if suffix.contains('f') {
        "f"
    } else {
        match (suffix.contains('u'), suffix.contains('l')) {
            (true, true) => "UL",
            (true, false) => "U",
            (false, true) => "L",
            (false, false) => "",
        }
    };
    Some(format!("{}{}", number, suffix))
}

fn is_string_or_builtin(ty: &CppType) -> bool {
    ty.unqualified().is_builtin() || ty.to_string() == STRING_TYPE
}

impl BridgeNamingPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn unique_name(&mut self, symbol: &str) -> String {
        let base = sanitize(symbol);
        let count = self.used.entry(base.clone()).or_insert(0);
        let name = if *count == 0 {
            base
        } else {
            format!("{}_{}", base, count)
        };
        *count += 1;
        name
    }

    /// Managed default for a native default-value expression used inside
    /// `user`, or `None` when it has no compile-time managed equivalent.
    fn resolve_default(
        &self,
        ctx: &PassContext<'_>,
        user: &MetaEntityRef,
        native: &str,
    ) -> Option<String> {
        let native = native.trim();
        if let Some(value) = ctx.settings.default_value_remaps.get(native) {
            return Some(value.clone());
        }
        if let Some(literal) = managed_literal(native) {
            return Some(literal);
        }
        if !IDENT_RE.is_match(native) {
            return None;
        }

        let resolved = ctx.symbols.resolve_constant(
            &ctx.settings.default_value_remaps,
            Some(user),
            native.trim_start_matches("::"),
        )?;
        match resolved.source {
            ConstantSource::Remap => Some(resolved.value),
            ConstantSource::Symbol(entity) => {
                let usable = {
                    let e = entity.borrow();
                    e.kind == EntityKind::EnumValue || self.is_managed_constant(ctx, &e)
                };
                usable.then(|| managed_path(&entity))
            }
        }
    }

    /// A variable that is, or will be once named, emitted as a managed `const`.
    fn is_managed_constant(&self, ctx: &PassContext<'_>, e: &MetaEntity) -> bool {
        if !e.kind.is_variable_like() || !e.is_constant {
            return false;
        }
        if !e.ty.as_ref().map_or(false, is_string_or_builtin) {
            return false;
        }
        e.default_value.is_some()
            || e.native_value.as_deref().map_or(false, |v| {
                ctx.settings.default_value_remaps.contains_key(v.trim())
                    || managed_literal(v.trim()).is_some()
            })
    }

    fn name_function(&mut self, ctx: &PassContext<'_>, entity: &MetaEntityRef) {
        let symbol = entity.borrow().symbol_name.clone();
        let bridge = self.unique_name(&symbol);

        let defaults: Vec<Option<String>> = entity
            .borrow()
            .parameters
            .iter()
            .map(|p| {
                p.native_default
                    .as_deref()
                    .and_then(|d| self.resolve_default(ctx, entity, d))
            })
            .collect();

        let mut e = entity.borrow_mut();
        e.bridge_name = bridge;
        // Managed optional parameters must all trail the required ones.
        let mut trailing = true;
        for (param, default) in e.parameters.iter_mut().zip(defaults).rev() {
            trailing = trailing && default.is_some();
            param.default_value = if trailing { default } else { None };
        }
    }

    fn name_variable(&mut self, ctx: &PassContext<'_>, entity: &MetaEntityRef) {
        let parent = entity.borrow().parent();
        let stem = match &parent {
            Some(parent) => sanitize(&parent.borrow().symbol_name),
            None => String::new(),
        };

        let native = entity.borrow().native_value.clone();
        let resolved = native
            .as_deref()
            .and_then(|value| self.resolve_default(ctx, entity, value));

        let mut e = entity.borrow_mut();
        e.bridge_name = if stem.is_empty() {
            e.name.clone()
        } else {
            format!("{}_{}", stem, e.name)
        };

        if let Some(value) = resolved {
            if ctx.settings.is_forced_constant(&value) {
                e.is_constant = true;
            }
            let simple = e.ty.as_ref().map_or(false, is_string_or_builtin);
            if e.is_constant && simple {
                e.default_value = Some(value);
            }
        }
    }
}

impl ApiPass for BridgeNamingPass {
    fn name(&self) -> &'static str {
        "BridgeNamingPass"
    }

    fn namespace_start(&mut self, _ctx: &mut PassContext<'_>) {
        self.used.clear();
    }

    fn visit(&mut self, ctx: &mut PassContext<'_>, entity: &MetaEntityRef, info: VisitorInfo) -> bool {
        if info.event == VisitEvent::ContainerExit {
            return true;
        }

        let kind = entity.borrow().kind;
        match kind {
            EntityKind::Class => {
                let symbol = entity.borrow().symbol_name.clone();
                entity.borrow_mut().bridge_name = sanitize(&symbol);
            }
            EntityKind::Constructor | EntityKind::MemberFunction | EntityKind::Function => {
                self.name_function(ctx, entity);
            }
            EntityKind::Variable | EntityKind::MemberVariable | EntityKind::Bitfield => {
                self.name_variable(ctx, entity);
            }
            EntityKind::EnumValue => {
                let native = entity.borrow().native_value.clone();
                let value = native
                    .as_deref()
                    .and_then(|v| self.resolve_default(ctx, entity, v));
                entity.borrow_mut().default_value = value;
            }
            _ => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Urho3D::Node::GetName"), "Urho3D_Node_GetName");
        assert_eq!(sanitize("::Foo"), "Foo");
        assert_eq!(sanitize("Vector<int>"), "Vector_int_");
    }

    #[test]
    fn test_managed_literal() {
        assert_eq!(managed_literal("42").as_deref(), Some("42"));
        assert_eq!(managed_literal("1.f").as_deref(), Some("1.0f"));
        assert_eq!(managed_literal("0.5f").as_deref(), Some("0.5f"));
        assert_eq!(managed_literal("10ull").as_deref(), Some("10UL"));
        assert_eq!(managed_literal("0xFFu").as_deref(), Some("0xFFU"));
        assert_eq!(managed_literal("-1").as_deref(), Some("-1"));
        assert_eq!(managed_literal("nullptr").as_deref(), Some("null"));
        assert_eq!(managed_literal("\"abc\"").as_deref(), Some("\"abc\""));
        assert_eq!(managed_literal("true").as_deref(), Some("true"));
        assert!(managed_literal("Foo::kDefault").is_none());
        assert!(managed_literal("a + b").is_none());
    }

    #[test]
    fn test_managed_path_skips_namespaces() {
        let root = MetaEntity::root();
        let ns = MetaEntity::new(EntityKind::Namespace, "Urho3D", "Urho3D").into_ref();
        let class = MetaEntity::new(EntityKind::Class, "Node", "Urho3D::Node").into_ref();
        let en = MetaEntity::new(EntityKind::Enum, "Mode", "Urho3D::Node::Mode").into_ref();
        let value = MetaEntity::new(EntityKind::EnumValue, "M_A", "Urho3D::Node::Mode::M_A").into_ref();
        add_child(&root, ns.clone());
        add_child(&ns, class.clone());
        add_child(&class, en.clone());
        add_child(&en, value.clone());

        assert_eq!(managed_path(&value), "Node.Mode.M_A");
        assert_eq!(managed_path(&class), "Node");
    }
}
