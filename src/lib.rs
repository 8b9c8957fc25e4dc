//! # bridgegen
//!
//! Generates managed-language bindings for a native C++ library from its
//! headers.
//!
//! ## Pipeline
//!
//! 1. **Rules**: a JSON document names the export namespaces, the header
//!    directories to parse for each, include/exclude filters, type maps and
//!    default-value remaps.
//! 2. **Parsing**: headers are parsed on a worker pool into a native AST,
//!    one translation unit per file.
//! 3. **Raw passes**: each pass walks every parsed file of the namespace
//!    and builds the overlay tree of exportable declarations.
//! 4. **Overlay passes**: each pass walks the overlay tree, reshaping it and
//!    finally emitting `<namespace>Bridge.cpp` and `<namespace>.cs`.
//!
//! ## Export Gate
//!
//! A declaration is exported only when every type it uses is acceptable: a
//! builtin, a type with an explicit type map, a pointer/reference/qualified
//! wrapper of a builtin, an exported class or enum, or a template instance
//! over an exported class. Anything else is silently left out.

mod api_passes;
mod ast;
mod checker;
mod context;
mod discovery;
mod error;
mod frontend;
mod generate_bridge;
mod generate_managed;
mod header_parser;
mod output;
mod overlay;
mod pass;
mod printer;
mod raw_passes;
mod rules;
mod symbols;
mod typemap;
mod visitor;

#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
mod symbols_tests;
#[cfg(test)]
mod typemap_tests;

pub use api_passes::{managed_path, sanitize, BridgeNamingPass, MoveGlobalsPass, GLOBALS_CLASS};
pub use ast::{
    Access, AstEntity, AstParameter, BuiltinKind, CppType, DeclFlags, EntityKind, RefKind,
    TranslationUnit,
};
pub use checker::IncludedChecker;
pub use context::GeneratorContext;
pub use discovery::{
    default_workers, parse_files, parse_namespace, parse_report, scan_directory, ParseReport,
};
pub use error::{GeneratorError, Result};
pub use frontend::{CompileConfig, DeclarationIndex, Frontend, FrontendError, FrontendFactory};
pub use generate_bridge::GenerateBridgePass;
pub use generate_managed::{ensure_not_keyword, GenerateManagedPass};
pub use header_parser::{parse_source, HeaderFrontend};
pub use output::{ArtifactWriter, WriteStatus};
pub use overlay::{
    add_child, ancestors, class_path, count_nodes, detach, managed_namespace, MetaEntity,
    MetaEntityRef, MetaEntityWeak, MetaParameter,
};
pub use pass::{ApiPass, CppPass, PassContext, VisitEvent, VisitorInfo};
pub use printer::CodePrinter;
pub use raw_passes::{BuildOverlayPass, ExportMembersPass};
pub use rules::{
    load_rules, GeneratorSettings, NamespaceRules, ParsePath, TypeMap, TypeMapSpec, STRING_TYPE,
};
pub use symbols::{ConstantSource, ResolvedConstant, SymbolTable};
pub use typemap::{builtin_managed, is_pinvokable, render, MarshalInfo, TypeMapper};
pub use visitor::{walk_children, walk_entity, walk_overlay, walk_translation_unit};
