//! Native AST Model
//!
//! The translation-unit tree a front end hands back for one header. Entity
//! kinds form a closed set; every kind is either a container whose children
//! may contribute to the API surface, or a leaf.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// ENTITY KINDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    File,
    MacroDefinition,
    IncludeDirective,
    LanguageLinkage,
    Namespace,
    NamespaceAlias,
    UsingDirective,
    UsingDeclaration,
    TypeAlias,
    Enum,
    EnumValue,
    Class,
    AccessSpecifier,
    BaseClass,
    Variable,
    MemberVariable,
    Bitfield,
    FunctionParameter,
    Function,
    MemberFunction,
    ConversionOp,
    Constructor,
    Destructor,
    Friend,
    TemplateTypeParameter,
    NonTypeTemplateParameter,
    TemplateTemplateParameter,
    AliasTemplate,
    VariableTemplate,
    FunctionTemplate,
    FunctionTemplateSpecialization,
    ClassTemplate,
    ClassTemplateSpecialization,
    StaticAssert,
    Unexposed,
}

impl EntityKind {
    /// Kinds whose children can contribute to the API surface.
    pub fn is_container(self) -> bool {
        match self {
            EntityKind::File
            | EntityKind::LanguageLinkage
            | EntityKind::Namespace
            | EntityKind::Enum
            | EntityKind::Class
            | EntityKind::FunctionTemplate
            | EntityKind::ClassTemplate => true,
            EntityKind::MacroDefinition
            | EntityKind::IncludeDirective
            | EntityKind::NamespaceAlias
            | EntityKind::UsingDirective
            | EntityKind::UsingDeclaration
            | EntityKind::TypeAlias
            | EntityKind::EnumValue
            | EntityKind::AccessSpecifier
            | EntityKind::BaseClass
            | EntityKind::Variable
            | EntityKind::MemberVariable
            | EntityKind::Bitfield
            | EntityKind::FunctionParameter
            | EntityKind::Function
            | EntityKind::MemberFunction
            | EntityKind::ConversionOp
            | EntityKind::Constructor
            | EntityKind::Destructor
            | EntityKind::Friend
            | EntityKind::TemplateTypeParameter
            | EntityKind::NonTypeTemplateParameter
            | EntityKind::TemplateTemplateParameter
            | EntityKind::AliasTemplate
            | EntityKind::VariableTemplate
            | EntityKind::FunctionTemplateSpecialization
            | EntityKind::ClassTemplateSpecialization
            | EntityKind::StaticAssert
            | EntityKind::Unexposed => false,
        }
    }

    pub fn is_function_like(self) -> bool {
        matches!(
            self,
            EntityKind::Function
                | EntityKind::MemberFunction
                | EntityKind::Constructor
                | EntityKind::Destructor
                | EntityKind::ConversionOp
        )
    }

    pub fn is_variable_like(self) -> bool {
        matches!(
            self,
            EntityKind::Variable | EntityKind::MemberVariable | EntityKind::Bitfield
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    Public,
    Protected,
    Private,
}

impl Access {
    pub fn as_str(self) -> &'static str {
        match self {
            Access::Public => "public",
            Access::Protected => "protected",
            Access::Private => "private",
        }
    }
}

bitflags::bitflags! {
    /// Declaration specifiers the passes care about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeclFlags: u16 {
        const STATIC    = 1 << 0;
        const VIRTUAL   = 1 << 1;
        const PURE      = 1 << 2;
        /// Trailing `const` on a member function.
        const CONST     = 1 << 3;
        const CONSTEXPR = 1 << 4;
        const EXPLICIT  = 1 << 5;
        const DELETED   = 1 << 6;
        const DEFAULTED = 1 << 7;
        const INLINE    = 1 << 8;
        /// A class or enum with a body, not a forward declaration.
        const DEFINITION = 1 << 9;
        const SCOPED    = 1 << 10;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinKind {
    Void,
    Bool,
    Char,
    SChar,
    UChar,
    WChar,
    Char16,
    Char32,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    LongDouble,
    Nullptr,
}

impl BuiltinKind {
    pub fn spelling(self) -> &'static str {
        match self {
            BuiltinKind::Void => "void",
            BuiltinKind::Bool => "bool",
            BuiltinKind::Char => "char",
            BuiltinKind::SChar => "signed char",
            BuiltinKind::UChar => "unsigned char",
            BuiltinKind::WChar => "wchar_t",
            BuiltinKind::Char16 => "char16_t",
            BuiltinKind::Char32 => "char32_t",
            BuiltinKind::Short => "short",
            BuiltinKind::UShort => "unsigned short",
            BuiltinKind::Int => "int",
            BuiltinKind::UInt => "unsigned int",
            BuiltinKind::Long => "long",
            BuiltinKind::ULong => "unsigned long",
            BuiltinKind::LongLong => "long long",
            BuiltinKind::ULongLong => "unsigned long long",
            BuiltinKind::Float => "float",
            BuiltinKind::Double => "double",
            BuiltinKind::LongDouble => "long double",
            BuiltinKind::Nullptr => "std::nullptr_t",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    LValue,
    RValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CppType {
    Builtin {
        builtin: BuiltinKind,
    },
    /// A class, enum or alias referenced by name. `canonical` is the alias
    /// target when the front end resolved one.
    UserDefined {
        name: String,
        #[serde(default)]
        canonical: Option<Box<CppType>>,
    },
    CvQualified {
        inner: Box<CppType>,
        is_const: bool,
        is_volatile: bool,
    },
    Pointer {
        pointee: Box<CppType>,
    },
    Reference {
        referee: Box<CppType>,
        ref_kind: RefKind,
    },
    Array {
        element: Box<CppType>,
        size: Option<String>,
    },
    TemplateInstantiation {
        template: String,
        arguments: Vec<CppType>,
    },
    Unexposed {
        spelling: String,
    },
}

impl CppType {
    pub fn builtin(builtin: BuiltinKind) -> Self {
        CppType::Builtin { builtin }
    }

    pub fn named(name: &str) -> Self {
        CppType::UserDefined {
            name: name.to_string(),
            canonical: None,
        }
    }

    pub fn constant(inner: CppType) -> Self {
        CppType::CvQualified {
            inner: Box::new(inner),
            is_const: true,
            is_volatile: false,
        }
    }

    pub fn pointer(pointee: CppType) -> Self {
        CppType::Pointer {
            pointee: Box::new(pointee),
        }
    }

    pub fn reference(referee: CppType) -> Self {
        CppType::Reference {
            referee: Box::new(referee),
            ref_kind: RefKind::LValue,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, CppType::Builtin { .. })
    }

    pub fn is_void(&self) -> bool {
        matches!(
            self,
            CppType::Builtin {
                builtin: BuiltinKind::Void
            }
        )
    }

    /// Strip cv-qualifiers, pointers, references, arrays and aliases down to the
    /// innermost named or builtin type.
    pub fn base_type(&self) -> &CppType {
        match self {
            CppType::CvQualified { inner, .. } => inner.base_type(),
            CppType::Pointer { pointee } => pointee.base_type(),
            CppType::Reference { referee, .. } => referee.base_type(),
            CppType::Array { element, .. } => element.base_type(),
            CppType::UserDefined {
                canonical: Some(target),
                ..
            } => target.base_type(),
            other => other,
        }
    }

    /// Strip cv-qualifiers only.
    pub fn unqualified(&self) -> &CppType {
        match self {
            CppType::CvQualified { inner, .. } => inner.unqualified(),
            other => other,
        }
    }

    /// Plain name of a type with qualifiers, indirections and aliases kept
    /// out of it: `Foo const&` becomes `Foo`.
    pub fn type_name(&self) -> String {
        match self {
            CppType::CvQualified { inner, .. } => inner.type_name(),
            CppType::Pointer { pointee } => pointee.type_name(),
            CppType::Reference { referee, .. } => referee.type_name(),
            CppType::Array { element, .. } => element.type_name(),
            CppType::UserDefined { name, .. } => name.clone(),
            other => other.to_string(),
        }
    }

    /// First template argument of an instantiation, looking through
    /// qualifiers and indirections.
    pub fn template_subtype(&self) -> Option<String> {
        match self.unqualified() {
            CppType::TemplateInstantiation { arguments, .. } => {
                arguments.first().map(|arg| arg.type_name())
            }
            CppType::Pointer { pointee } => pointee.template_subtype(),
            CppType::Reference { referee, .. } => referee.template_subtype(),
            _ => None,
        }
    }
}

impl fmt::Display for CppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CppType::Builtin { builtin } => write!(f, "{}", builtin.spelling()),
            CppType::UserDefined { name, .. } => write!(f, "{}", name),
            CppType::CvQualified {
                inner,
                is_const,
                is_volatile,
            } => {
                write!(f, "{}", inner)?;
                if *is_const {
                    write!(f, " const")?;
                }
                if *is_volatile {
                    write!(f, " volatile")?;
                }
                Ok(())
            }
            CppType::Pointer { pointee } => write!(f, "{}*", pointee),
            CppType::Reference { referee, ref_kind } => match ref_kind {
                RefKind::LValue => write!(f, "{}&", referee),
                RefKind::RValue => write!(f, "{}&&", referee),
            },
            CppType::Array { element, size } => {
                write!(f, "{}[{}]", element, size.as_deref().unwrap_or(""))
            }
            CppType::TemplateInstantiation {
                template,
                arguments,
            } => {
                let args = arguments
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{}<{}>", template, args)
            }
            CppType::Unexposed { spelling } => write!(f, "{}", spelling),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTITIES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstParameter {
    pub name: String,
    pub ty: CppType,
    #[serde(default)]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstEntity {
    pub kind: EntityKind,
    pub name: String,
    #[serde(default)]
    pub access: Access,
    /// The entity is the templated declaration inside a template entity.
    #[serde(default)]
    pub templated: bool,
    /// The entity is the declaration inside a friend entity.
    #[serde(default)]
    pub friended: bool,
    #[serde(skip)]
    pub flags: DeclFlags,
    /// Variable type, alias target, base class, enum underlying type.
    #[serde(default)]
    pub ty: Option<CppType>,
    #[serde(default)]
    pub return_type: Option<CppType>,
    #[serde(default)]
    pub parameters: Vec<AstParameter>,
    /// Initializer of a variable or explicit value of an enumerator.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub children: Vec<AstEntity>,
}

impl AstEntity {
    pub fn new(kind: EntityKind, name: &str) -> Self {
        AstEntity {
            kind,
            name: name.to_string(),
            access: Access::Public,
            templated: false,
            friended: false,
            flags: DeclFlags::empty(),
            ty: None,
            return_type: None,
            parameters: Vec::new(),
            value: None,
            line: 0,
            children: Vec::new(),
        }
    }

    /// Template and friend wrappers contribute no identity of their own.
    pub fn is_proxy(&self) -> bool {
        self.templated || self.friended
    }

    pub fn has(&self, flag: DeclFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn find_child(&self, name: &str) -> Option<&AstEntity> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// One parsed header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationUnit {
    pub path: PathBuf,
    pub root: AstEntity,
}

impl TranslationUnit {
    pub fn new(path: PathBuf, children: Vec<AstEntity>) -> Self {
        let mut root = AstEntity::new(EntityKind::File, &path.to_string_lossy());
        root.children = children;
        TranslationUnit { path, root }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spelling_matches_front_end_order() {
        let ty = CppType::pointer(CppType::constant(CppType::builtin(BuiltinKind::Char)));
        assert_eq!(ty.to_string(), "char const*");

        let ty = CppType::reference(CppType::constant(CppType::named("Urho3D::String")));
        assert_eq!(ty.to_string(), "Urho3D::String const&");
    }

    #[test]
    fn test_base_type_strips_wrappers_and_aliases() {
        let alias = CppType::UserDefined {
            name: "StringHash".to_string(),
            canonical: Some(Box::new(CppType::builtin(BuiltinKind::UInt))),
        };
        let ty = CppType::reference(CppType::constant(alias));
        assert_eq!(ty.base_type().to_string(), "unsigned int");
        assert_eq!(ty.type_name(), "StringHash");
    }

    #[test]
    fn test_template_subtype() {
        let ty = CppType::TemplateInstantiation {
            template: "SharedPtr".to_string(),
            arguments: vec![CppType::named("Node")],
        };
        assert_eq!(ty.to_string(), "SharedPtr<Node>");
        assert_eq!(ty.template_subtype().as_deref(), Some("Node"));
        assert_eq!(
            CppType::constant(ty).template_subtype().as_deref(),
            Some("Node")
        );
    }

    #[test]
    fn test_container_kinds() {
        assert!(EntityKind::Class.is_container());
        assert!(EntityKind::LanguageLinkage.is_container());
        assert!(!EntityKind::MemberFunction.is_container());
        assert!(!EntityKind::BaseClass.is_container());
    }
}
