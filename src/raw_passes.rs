//! Raw-AST Passes
//!
//! `BuildOverlayPass` materializes the containers (namespaces, classes,
//! enums) and registers their symbols. `ExportMembersPass` runs once every
//! container of the namespace is known and attaches the functions, variables
//! and base-class edges whose types can cross the bridge, registering the
//! functions and variables as it goes. A type defined in several headers
//! takes its contents from the header that owns it in the declaration index.

use std::path::{Path, PathBuf};

use crate::ast::{Access, AstEntity, CppType, DeclFlags, EntityKind};
use crate::overlay::{add_child, MetaEntity, MetaEntityRef, MetaParameter};
use crate::pass::{CppPass, PassContext, VisitEvent, VisitorInfo};
use crate::typemap::TypeMapper;

fn qualify(parent: &MetaEntityRef, name: &str) -> String {
    let parent = parent.borrow();
    if parent.symbol_name.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", parent.symbol_name, name)
    }
}

fn is_abstract(class: &AstEntity) -> bool {
    class
        .children
        .iter()
        .any(|c| c.kind == EntityKind::MemberFunction && c.has(DeclFlags::PURE))
}

/// Container frames pushed on enter and popped on exit; `None` marks a
/// container that is not exported.
#[derive(Debug, Default)]
struct ScopeStack {
    frames: Vec<Option<MetaEntityRef>>,
}

impl ScopeStack {
    fn reset(&mut self, root: &MetaEntityRef) {
        self.frames.clear();
        self.frames.push(Some(root.clone()));
    }

    fn top(&self) -> Option<MetaEntityRef> {
        self.frames.last().cloned().flatten()
    }

    fn push(&mut self, frame: Option<MetaEntityRef>) -> bool {
        let descend = frame.is_some();
        self.frames.push(frame);
        descend
    }

    fn pop(&mut self) {
        self.frames.pop();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILD OVERLAY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct BuildOverlayPass {
    scopes: ScopeStack,
    current_file: Option<PathBuf>,
}

impl BuildOverlayPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter_namespace(&mut self, ctx: &mut PassContext<'_>, entity: &AstEntity) -> bool {
        let Some(parent) = self.scopes.top() else {
            return self.scopes.push(None);
        };
        // Anonymous namespaces have internal linkage.
        if entity.name.is_empty() {
            return self.scopes.push(None);
        }

        let existing = parent.borrow().children.iter().find(|c| {
            let c = c.borrow();
            c.kind == EntityKind::Namespace && c.name == entity.name
        }).cloned();

        let ns = match existing {
            Some(ns) => ns,
            None => {
                let symbol = qualify(&parent, &entity.name);
                let ns = MetaEntity::new(EntityKind::Namespace, &entity.name, &symbol).into_ref();
                add_child(&parent, ns.clone());
                ctx.symbols.insert(&symbol, &ns);
                ns
            }
        };
        self.scopes.push(Some(ns))
    }

    fn enter_type(
        &mut self,
        ctx: &mut PassContext<'_>,
        entity: &AstEntity,
        info: VisitorInfo,
    ) -> bool {
        let Some(parent) = self.scopes.top() else {
            return self.scopes.push(None);
        };
        if entity.name.is_empty()
            || info.access != Access::Public
            || !entity.has(DeclFlags::DEFINITION)
        {
            return self.scopes.push(None);
        }

        let symbol = qualify(&parent, &entity.name);
        if !ctx.rules.symbol_checker.is_included(&symbol) {
            return self.scopes.push(None);
        }

        // Repeated definitions in other headers contribute nothing.
        let owned = self
            .current_file
            .as_deref()
            .map_or(true, |path| ctx.owns_definition(&symbol, path));
        if let Some(existing) = ctx.symbols.get(&symbol) {
            if existing.borrow().kind == entity.kind {
                return self.scopes.push(owned.then_some(existing));
            }
        }
        if !owned {
            return self.scopes.push(None);
        }

        let mut meta = MetaEntity::new(entity.kind, &entity.name, &symbol);
        meta.access = info.access;
        meta.flags = entity.flags;
        meta.ty = entity.ty.clone();
        meta.source_file = self.current_file.clone();
        if entity.kind == EntityKind::Class && is_abstract(entity) {
            meta.flags |= DeclFlags::PURE;
        }

        let meta = meta.into_ref();
        add_child(&parent, meta.clone());
        ctx.symbols.insert(&symbol, &meta);
        self.scopes.push(Some(meta))
    }

    fn add_enum_value(&mut self, ctx: &mut PassContext<'_>, entity: &AstEntity) {
        let Some(parent) = self.scopes.top() else {
            return;
        };
        if parent.borrow().kind != EntityKind::Enum {
            return;
        }

        let symbol = qualify(&parent, &entity.name);
        let mut value = MetaEntity::new(EntityKind::EnumValue, &entity.name, &symbol);
        value.native_value = entity.value.clone();
        value.is_constant = true;
        let value = value.into_ref();
        add_child(&parent, value.clone());
        ctx.symbols.insert(&symbol, &value);

        // Unscoped enumerators are also visible in the enclosing scope.
        let (scoped, enclosing) = {
            let parent = parent.borrow();
            (parent.flags.contains(DeclFlags::SCOPED), parent.parent())
        };
        if !scoped {
            if let Some(enclosing) = enclosing {
                ctx.symbols.insert(&qualify(&enclosing, &entity.name), &value);
            }
        }
    }
}

impl CppPass for BuildOverlayPass {
    fn name(&self) -> &'static str {
        "BuildOverlayPass"
    }

    fn namespace_start(&mut self, ctx: &mut PassContext<'_>) {
        self.scopes.reset(&ctx.rules.api_root);
    }

    fn start_file(&mut self, ctx: &mut PassContext<'_>, path: &Path) {
        self.scopes.reset(&ctx.rules.api_root);
        self.current_file = Some(path.to_path_buf());
    }

    fn visit(&mut self, ctx: &mut PassContext<'_>, entity: &AstEntity, info: VisitorInfo) -> bool {
        match info.event {
            VisitEvent::ContainerExit => {
                self.scopes.pop();
                true
            }
            VisitEvent::ContainerEnter => match entity.kind {
                EntityKind::LanguageLinkage => {
                    let top = self.scopes.top();
                    self.scopes.push(top)
                }
                EntityKind::Namespace => self.enter_namespace(ctx, entity),
                EntityKind::Class | EntityKind::Enum => self.enter_type(ctx, entity, info),
                _ => self.scopes.push(None),
            },
            VisitEvent::Leaf => {
                if entity.kind == EntityKind::EnumValue {
                    self.add_enum_value(ctx, entity);
                }
                true
            }
        }
    }

    fn stop_file(&mut self, _ctx: &mut PassContext<'_>, _path: &Path) {
        self.current_file = None;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPORT MEMBERS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct ExportMembersPass {
    scopes: ScopeStack,
    current_file: Option<PathBuf>,
}

fn is_exportable(mapper: &TypeMapper<'_>, ty: &CppType) -> bool {
    mapper.is_acceptable_type(ty) && mapper.resolve(ty).is_some()
}

fn signature(params: &[MetaParameter]) -> Vec<String> {
    params
        .iter()
        .map(|p| p.ty.as_ref().map(|t| t.to_string()).unwrap_or_default())
        .collect()
}

/// Symbol table keys for a freshly exported member.
///
/// Variables use their qualified name. Functions are keyed by name plus
/// parameter types, `Urho3D::Node::Scale(float)`; the bare name refers to the
/// first overload exported. Base-class edges carry the base's symbol and are
/// not registered.
fn symbol_keys(meta: &MetaEntity) -> Vec<String> {
    if meta.kind.is_variable_like() {
        return vec![meta.symbol_name.clone()];
    }
    if !meta.kind.is_function_like() {
        return Vec::new();
    }
    vec![
        meta.symbol_name.clone(),
        format!("{}({})", meta.symbol_name, signature(&meta.parameters).join(", ")),
    ]
}

impl ExportMembersPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter_container(&mut self, ctx: &mut PassContext<'_>, entity: &AstEntity) -> bool {
        let Some(parent) = self.scopes.top() else {
            return self.scopes.push(None);
        };
        let symbol = qualify(&parent, &entity.name);
        let owned = entity.kind != EntityKind::Class
            || self
                .current_file
                .as_deref()
                .map_or(true, |path| ctx.owns_definition(&symbol, path));
        let frame = ctx
            .symbols
            .get(&symbol)
            .filter(|e| owned && e.borrow().kind == entity.kind);
        self.scopes.push(frame)
    }

    fn parameters(&self, mapper: &TypeMapper<'_>, entity: &AstEntity) -> Option<Vec<MetaParameter>> {
        entity
            .parameters
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if !is_exportable(mapper, &p.ty) {
                    return None;
                }
                let name = if p.name.is_empty() {
                    format!("param{}", i)
                } else {
                    p.name.clone()
                };
                Some(MetaParameter {
                    name,
                    ty: Some(p.ty.clone()),
                    native_default: p.default_value.clone(),
                    default_value: None,
                })
            })
            .collect()
    }

    fn export_function(
        &self,
        ctx: &PassContext<'_>,
        parent: &MetaEntityRef,
        entity: &AstEntity,
    ) -> Option<MetaEntity> {
        let parent_kind = parent.borrow().kind;
        if entity.has(DeclFlags::DELETED) || entity.name.starts_with("operator") {
            return None;
        }

        let scope = parent.borrow().symbol_name.clone();
        let mapper = ctx.type_mapper().in_scope(&scope);

        let (kind, symbol) = match entity.kind {
            EntityKind::Constructor => {
                if parent_kind != EntityKind::Class || parent.borrow().flags.contains(DeclFlags::PURE)
                {
                    return None;
                }
                let name = parent.borrow().name.clone();
                (EntityKind::Constructor, qualify(parent, &name))
            }
            EntityKind::MemberFunction if parent_kind == EntityKind::Class => {
                (EntityKind::MemberFunction, qualify(parent, &entity.name))
            }
            EntityKind::Function => (EntityKind::Function, qualify(parent, &entity.name)),
            _ => return None,
        };

        let return_type = match entity.kind {
            EntityKind::Constructor => None,
            _ => {
                let ty = entity
                    .return_type
                    .clone()
                    .unwrap_or_else(|| CppType::builtin(crate::ast::BuiltinKind::Void));
                if !is_exportable(&mapper, &ty) {
                    return None;
                }
                Some(ty)
            }
        };
        let parameters = self.parameters(&mapper, entity)?;

        // Same overload reached through another header.
        let sig = signature(&parameters);
        let duplicate = parent.borrow().children.iter().any(|c| {
            let c = c.borrow();
            c.kind == kind && c.symbol_name == symbol && signature(&c.parameters) == sig
        });
        if duplicate {
            return None;
        }

        let mut meta = MetaEntity::new(kind, &entity.name, &symbol);
        if kind == EntityKind::Constructor {
            meta.name = parent.borrow().name.clone();
        }
        meta.access = entity.access;
        meta.flags = entity.flags;
        meta.return_type = return_type;
        meta.parameters = parameters;
        meta.source_file = self.current_file.clone();
        Some(meta)
    }

    fn export_variable(
        &self,
        ctx: &PassContext<'_>,
        parent: &MetaEntityRef,
        entity: &AstEntity,
    ) -> Option<MetaEntity> {
        let ty = entity.ty.as_ref()?;
        let scope = parent.borrow().symbol_name.clone();
        let mapper = ctx.type_mapper().in_scope(&scope);
        if !is_exportable(&mapper, ty) {
            return None;
        }

        let symbol = qualify(parent, &entity.name);
        if ctx.symbols.contains(&symbol) {
            return None;
        }

        let is_const = matches!(ty, CppType::CvQualified { is_const: true, .. });
        let mut meta = MetaEntity::new(entity.kind, &entity.name, &symbol);
        meta.access = entity.access;
        meta.flags = entity.flags;
        meta.is_constant = is_const || entity.has(DeclFlags::CONSTEXPR);
        meta.ty = Some(ty.clone());
        meta.native_value = entity.value.clone();
        meta.source_file = self.current_file.clone();
        Some(meta)
    }

    fn export_base(
        &self,
        ctx: &PassContext<'_>,
        parent: &MetaEntityRef,
        entity: &AstEntity,
    ) -> Option<MetaEntity> {
        if parent.borrow().kind != EntityKind::Class {
            return None;
        }
        let ty = entity.ty.as_ref()?;
        let scope = parent.borrow().symbol_name.clone();
        let base = ctx
            .type_mapper()
            .in_scope(&scope)
            .find_symbol(&ty.type_name())?;
        let base = base.borrow();
        if base.kind != EntityKind::Class {
            return None;
        }

        let mut meta = MetaEntity::new(EntityKind::BaseClass, &base.name, &base.symbol_name);
        meta.access = entity.access;
        Some(meta)
    }
}

impl CppPass for ExportMembersPass {
    fn name(&self) -> &'static str {
        "ExportMembersPass"
    }

    fn namespace_start(&mut self, ctx: &mut PassContext<'_>) {
        self.scopes.reset(&ctx.rules.api_root);
    }

    fn start_file(&mut self, ctx: &mut PassContext<'_>, path: &Path) {
        self.scopes.reset(&ctx.rules.api_root);
        self.current_file = Some(path.to_path_buf());
    }

    fn visit(&mut self, ctx: &mut PassContext<'_>, entity: &AstEntity, info: VisitorInfo) -> bool {
        match info.event {
            VisitEvent::ContainerExit => {
                self.scopes.pop();
                return true;
            }
            VisitEvent::ContainerEnter => {
                return match entity.kind {
                    EntityKind::LanguageLinkage => {
                        let top = self.scopes.top();
                        self.scopes.push(top)
                    }
                    EntityKind::Namespace | EntityKind::Class => self.enter_container(ctx, entity),
                    _ => self.scopes.push(None),
                };
            }
            VisitEvent::Leaf => {}
        }

        let Some(parent) = self.scopes.top() else {
            return true;
        };
        if info.access != Access::Public {
            return true;
        }
        if !ctx.rules.symbol_checker.is_included(&qualify(&parent, &entity.name)) {
            return true;
        }

        let meta = match entity.kind {
            EntityKind::Constructor | EntityKind::MemberFunction | EntityKind::Function => {
                self.export_function(ctx, &parent, entity)
            }
            EntityKind::Variable | EntityKind::MemberVariable | EntityKind::Bitfield => {
                self.export_variable(ctx, &parent, entity)
            }
            EntityKind::BaseClass => self.export_base(ctx, &parent, entity),
            _ => None,
        };

        if let Some(meta) = meta {
            let keys = symbol_keys(&meta);
            let meta = meta.into_ref();
            add_child(&parent, meta.clone());
            for key in keys {
                if !ctx.symbols.contains(&key) {
                    ctx.symbols.insert(&key, &meta);
                }
            }
        }
        true
    }

    fn stop_file(&mut self, _ctx: &mut PassContext<'_>, _path: &Path) {
        self.current_file = None;
    }
}
