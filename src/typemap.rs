//! Type Mapping Registry
//!
//! Decides whether a native type can cross the bridge and, if it can, how it
//! is spelled and converted on each side.

use crate::ast::{BuiltinKind, CppType, EntityKind, RefKind};
use crate::overlay::{managed_namespace, MetaEntityRef};
use crate::rules::{NamespaceRules, TypeMap};
use crate::symbols::SymbolTable;

/// Placeholder substituted by conversion templates.
pub const VALUE_PLACEHOLDER: &str = "{value}";

/// Substitute `value` into a conversion template.
pub fn render(template: &str, value: &str) -> String {
    template.replace(VALUE_PLACEHOLDER, value)
}

/// Everything an emitter needs to move one value across the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct MarshalInfo {
    /// Type on the managed API surface.
    pub managed: String,
    /// Type in managed extern declarations.
    pub marshal: String,
    /// Type in bridge function signatures.
    pub bridge: String,
    /// Managed value to extern argument.
    pub to_marshal: String,
    /// Extern result to managed value.
    pub from_marshal: String,
    /// Bridge argument to native value.
    pub to_native: String,
    /// Native value to bridge result.
    pub from_native: String,
    pub attribute: Option<String>,
    pub is_value_type: bool,
}

impl MarshalInfo {
    fn direct(managed: &str, bridge: &str) -> Self {
        MarshalInfo {
            managed: managed.to_string(),
            marshal: managed.to_string(),
            bridge: bridge.to_string(),
            to_marshal: VALUE_PLACEHOLDER.to_string(),
            from_marshal: VALUE_PLACEHOLDER.to_string(),
            to_native: VALUE_PLACEHOLDER.to_string(),
            from_native: VALUE_PLACEHOLDER.to_string(),
            attribute: None,
            is_value_type: true,
        }
    }

    fn from_type_map(map: &TypeMap) -> Self {
        let template = |t: &Option<String>| {
            t.clone()
                .unwrap_or_else(|| VALUE_PLACEHOLDER.to_string())
        };
        MarshalInfo {
            managed: map.cs_type.clone(),
            marshal: map.pinvoke_type.clone(),
            bridge: map.c_type.clone(),
            to_marshal: template(&map.cs_to_pinvoke),
            from_marshal: template(&map.pinvoke_to_cs),
            to_native: template(&map.c_to_cpp),
            from_native: template(&map.cpp_to_c),
            attribute: map.marshal_attribute.clone(),
            is_value_type: map.is_value_type,
        }
    }

    pub fn managed_to_marshal(&self, expr: &str) -> String {
        render(&self.to_marshal, expr)
    }

    pub fn marshal_to_managed(&self, expr: &str) -> String {
        render(&self.from_marshal, expr)
    }

    pub fn bridge_to_native(&self, expr: &str) -> String {
        render(&self.to_native, expr)
    }

    pub fn native_to_bridge(&self, expr: &str) -> String {
        render(&self.from_native, expr)
    }
}

/// Managed spelling of a builtin scalar.
pub fn builtin_managed(kind: BuiltinKind) -> &'static str {
    match kind {
        BuiltinKind::Void => "void",
        BuiltinKind::Bool => "bool",
        BuiltinKind::Char | BuiltinKind::SChar => "sbyte",
        BuiltinKind::UChar => "byte",
        BuiltinKind::WChar | BuiltinKind::Char16 => "char",
        BuiltinKind::Char32 => "uint",
        BuiltinKind::Short => "short",
        BuiltinKind::UShort => "ushort",
        BuiltinKind::Int => "int",
        BuiltinKind::UInt => "uint",
        BuiltinKind::Long | BuiltinKind::LongLong => "long",
        BuiltinKind::ULong | BuiltinKind::ULongLong => "ulong",
        BuiltinKind::Float => "float",
        BuiltinKind::Double | BuiltinKind::LongDouble => "double",
        BuiltinKind::Nullptr => "IntPtr",
    }
}

/// Builtins with a fixed-size representation on both sides.
fn is_pinvokable_builtin(kind: BuiltinKind) -> bool {
    !matches!(
        kind,
        BuiltinKind::WChar | BuiltinKind::Char16 | BuiltinKind::Char32 | BuiltinKind::LongDouble
    )
}

/// A builtin, or cv/pointer/reference/alias wrappers around one.
pub fn is_pinvokable(ty: &CppType) -> bool {
    match ty {
        CppType::Builtin { builtin } => is_pinvokable_builtin(*builtin),
        CppType::CvQualified { inner, .. } => is_pinvokable(inner),
        CppType::Pointer { pointee } => is_pinvokable(pointee),
        CppType::Reference { referee, .. } => is_pinvokable(referee),
        CppType::UserDefined {
            canonical: Some(target),
            ..
        } => is_pinvokable(target),
        _ => false,
    }
}

/// Type mapping for one namespace, looking up names relative to `scope`.
pub struct TypeMapper<'a> {
    rules: &'a NamespaceRules,
    symbols: &'a SymbolTable,
    scope: String,
}

impl<'a> TypeMapper<'a> {
    pub fn new(rules: &'a NamespaceRules, symbols: &'a SymbolTable) -> Self {
        TypeMapper {
            rules,
            symbols,
            scope: String::new(),
        }
    }

    /// Resolve unqualified type names as if written inside `scope`
    /// (`Urho3D::Node`).
    pub fn in_scope(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }

    /// Look up the exact spelling, then (unless `strict`) the base spelling
    /// with qualifiers, indirections and aliases stripped.
    pub fn get_type_map(&self, ty: &CppType, strict: bool) -> Option<&'a TypeMap> {
        let rules = self.rules;
        if let Some(map) = rules.type_map(&ty.to_string()) {
            return Some(map);
        }
        if !strict {
            return rules.type_map(&ty.base_type().to_string());
        }
        None
    }

    /// Find the exported type a name refers to, trying the enclosing scopes
    /// from the innermost out before the name as written. Functions and
    /// variables sharing the name are passed over.
    pub fn find_symbol(&self, name: &str) -> Option<MetaEntityRef> {
        let name = name.trim_start_matches("::");
        let lookup = |symbol: &str| {
            self.symbols
                .get(symbol)
                .filter(|e| matches!(e.borrow().kind, EntityKind::Class | EntityKind::Enum))
        };
        let mut scope = self.scope.as_str();
        loop {
            if scope.is_empty() {
                return lookup(name);
            }
            if let Some(entity) = lookup(&format!("{}::{}", scope, name)) {
                return Some(entity);
            }
            scope = scope.rsplit_once("::").map_or("", |(outer, _)| outer);
        }
    }

    /// The single gate deciding whether a declaration using `ty` may be exported.
    pub fn is_acceptable_type(&self, ty: &CppType) -> bool {
        if ty.is_builtin() {
            return true;
        }
        if self.get_type_map(ty, false).is_some() {
            return true;
        }
        if let CppType::TemplateInstantiation { .. } = ty {
            return ty
                .template_subtype()
                .map_or(false, |sub| self.find_symbol(&sub).is_some());
        }
        if is_pinvokable(ty) {
            return true;
        }
        self.find_symbol(&ty.type_name()).is_some()
    }

    /// Managed type for `ty`, or `None` when it cannot be marshalled.
    pub fn to_managed_type(&self, ty: &CppType) -> Option<String> {
        self.resolve(ty).map(|info| info.managed)
    }

    /// Full marshalling description of `ty`.
    pub fn resolve(&self, ty: &CppType) -> Option<MarshalInfo> {
        if let Some(map) = self.get_type_map(ty, false) {
            return Some(MarshalInfo::from_type_map(map));
        }

        match ty {
            CppType::Builtin { builtin } => {
                let managed = builtin_managed(*builtin);
                Some(MarshalInfo::direct(managed, builtin.spelling()))
            }
            CppType::CvQualified { inner, .. } => self.resolve(inner),
            CppType::UserDefined {
                canonical: Some(target),
                name,
            } => self.find_symbol(name).map_or_else(
                || self.resolve(target),
                |entity| self.resolve_entity(&entity, Indirection::Value),
            ),
            CppType::UserDefined { name, .. } => self
                .find_symbol(name)
                .and_then(|entity| self.resolve_entity(&entity, Indirection::Value)),
            CppType::Pointer { pointee } => {
                if is_pinvokable(ty) {
                    return Some(MarshalInfo::direct("IntPtr", &ty.to_string()));
                }
                let entity = self.find_symbol(&pointee.type_name())?;
                self.resolve_entity(&entity, Indirection::Pointer)
            }
            CppType::Reference { referee, ref_kind } => {
                // References to scalars cross by value.
                if let CppType::Builtin { .. } = referee.unqualified() {
                    return self.resolve(referee.unqualified());
                }
                if let Some(map) = self.get_type_map(referee, false) {
                    return Some(MarshalInfo::from_type_map(map));
                }
                if let CppType::TemplateInstantiation { .. } = referee.unqualified() {
                    return self.resolve(referee.unqualified());
                }
                let entity = self.find_symbol(&referee.type_name())?;
                let indirection = match ref_kind {
                    RefKind::LValue => Indirection::Reference,
                    RefKind::RValue => Indirection::Value,
                };
                self.resolve_entity(&entity, indirection)
            }
            CppType::TemplateInstantiation { template, .. } => {
                let subtype = ty.template_subtype()?;
                let entity = self.find_symbol(&subtype)?;
                let mut info = self.resolve_entity(&entity, Indirection::Pointer)?;
                let native = entity.borrow().symbol_name.clone();
                info.to_native = format!("{}<{}>({})", template, native, VALUE_PLACEHOLDER);
                info.from_native = format!("{}.Get()", VALUE_PLACEHOLDER);
                Some(info)
            }
            CppType::Array { .. } | CppType::Unexposed { .. } => None,
        }
    }

    fn resolve_entity(&self, entity: &MetaEntityRef, indirection: Indirection) -> Option<MarshalInfo> {
        // Types in nested namespaces are named relative to the module namespace.
        let mut path = managed_namespace(entity, &self.rules.default_namespace);
        let entity = entity.borrow();
        path.push(entity.name.clone());
        let managed = path.join(".");
        let native = entity.symbol_name.as_str();
        match entity.kind {
            EntityKind::Class => {
                let name = managed.as_str();
                let (to_native, from_native) = match indirection {
                    Indirection::Pointer => ("{value}".to_string(), "{value}".to_string()),
                    Indirection::Reference => ("*{value}".to_string(), "&{value}".to_string()),
                    Indirection::Value => ("*{value}".to_string(), format!("new {}({{value}})", native)),
                };
                Some(MarshalInfo {
                    managed: name.to_string(),
                    marshal: "IntPtr".to_string(),
                    bridge: format!("{}*", native),
                    to_marshal: "({value} == null ? IntPtr.Zero : {value}.instance_)".to_string(),
                    from_marshal: format!("{}.GetManagedInstance({{value}})", name),
                    to_native,
                    from_native,
                    attribute: None,
                    is_value_type: false,
                })
            }
            EntityKind::Enum => match indirection {
                Indirection::Pointer => Some(MarshalInfo::direct("IntPtr", &format!("{}*", native))),
                _ => Some(MarshalInfo::direct(&managed, native)),
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Indirection {
    Value,
    Pointer,
    Reference,
}
