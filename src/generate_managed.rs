//! Managed API Emitter
//!
//! Writes `<namespace>.cs`: one partial class per exported class, wrapping a
//! native instance handle and calling the bridge through internal-call
//! externs. Native instances are wrapped at most once through a per-class
//! handle cache.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::ast::{CppType, EntityKind};
use crate::error::Result;
use crate::output::{ArtifactWriter, WriteStatus};
use crate::overlay::{ancestors, MetaEntity, MetaEntityRef};
use crate::pass::{ApiPass, PassContext, VisitEvent, VisitorInfo};
use crate::printer::CodePrinter;
use crate::typemap::{builtin_managed, MarshalInfo, TypeMapper};

const CSHARP_KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked", "class",
    "const", "continue", "decimal", "default", "delegate", "do", "double", "else", "enum", "event",
    "explicit", "extern", "false", "finally", "fixed", "float", "for", "foreach", "goto", "if",
    "implicit", "in", "int", "interface", "internal", "is", "lock", "long", "namespace", "new",
    "null", "object", "operator", "out", "override", "params", "private", "protected", "public",
    "readonly", "ref", "return", "sbyte", "sealed", "short", "sizeof", "stackalloc", "static",
    "string", "struct", "switch", "this", "throw", "true", "try", "typeof", "uint", "ulong",
    "unchecked", "unsafe", "ushort", "using", "virtual", "void", "volatile", "while",
];

/// Escape identifiers that collide with managed keywords.
pub fn ensure_not_keyword(name: &str) -> String {
    if CSHARP_KEYWORDS.contains(&name) {
        format!("@{}", name)
    } else {
        name.to_string()
    }
}

#[derive(Debug)]
struct ClassFrame {
    name: String,
    is_static: bool,
    derived: bool,
    inheritable: bool,
    externs: Vec<String>,
    signatures: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct GenerateManagedPass {
    printer: CodePrinter,
    classes: Vec<ClassFrame>,
    /// One entry per open native namespace; true when it printed a block.
    namespaces: Vec<bool>,
}

struct ManagedParam {
    declaration: String,
    extern_declaration: String,
    argument: String,
    managed_type: String,
}

fn with_attribute(info: &MarshalInfo, declaration: String) -> String {
    match &info.attribute {
        Some(attribute) => format!("[{}] {}", attribute, declaration),
        None => declaration,
    }
}

fn managed_params(mapper: &TypeMapper<'_>, entity: &MetaEntity) -> Option<Vec<ManagedParam>> {
    entity
        .parameters
        .iter()
        .map(|p| {
            let info = mapper.resolve(p.ty.as_ref()?)?;
            let name = ensure_not_keyword(&p.name);
            let declaration = match &p.default_value {
                Some(value) => format!("{} {} = {}", info.managed, name, value),
                None => format!("{} {}", info.managed, name),
            };
            Some(ManagedParam {
                declaration,
                extern_declaration: with_attribute(&info, format!("{} {}", info.marshal, name)),
                argument: info.managed_to_marshal(&name),
                managed_type: info.managed.clone(),
            })
        })
        .collect()
}

fn join<F: Fn(&ManagedParam) -> &str>(params: &[ManagedParam], f: F) -> String {
    params.iter().map(f).collect::<Vec<_>>().join(", ")
}

/// First exported base class the managed side may derive from.
fn managed_base(ctx: &PassContext<'_>, class: &MetaEntity) -> Option<String> {
    class
        .children
        .iter()
        .filter(|c| c.borrow().kind == EntityKind::BaseClass)
        .find_map(|base| {
            let base = base.borrow();
            let target = ctx.symbols.get(&base.symbol_name)?;
            let target = target.borrow();
            (target.kind == EntityKind::Class && ctx.rules.is_inheritable(&target.symbol_name))
                .then(|| target.name.clone())
        })
}

impl GenerateManagedPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn external(&mut self, declaration: String) {
        if let Some(frame) = self.classes.last_mut() {
            frame.externs.push(declaration);
        }
    }

    /// Record a managed signature; false when the class already has it.
    fn claim_signature(&mut self, signature: String) -> bool {
        self.classes
            .last_mut()
            .map_or(false, |frame| frame.signatures.insert(signature))
    }

    fn enter_class(&mut self, ctx: &PassContext<'_>, entity: &MetaEntityRef) {
        let e = entity.borrow();
        let p = &mut self.printer;

        if e.is_static() {
            p.line(&format!("public static partial class {}", e.name)).indent();
            self.classes.push(ClassFrame {
                name: e.name.clone(),
                is_static: true,
                derived: false,
                inheritable: false,
                externs: Vec::new(),
                signatures: HashSet::new(),
            });
            return;
        }

        let base = managed_base(ctx, &e);
        let hide = if base.is_some() { "new " } else { "" };
        let bases = match &base {
            Some(base) => format!("{}, ", base),
            None => String::new(),
        };
        let name = e.name.as_str();

        p.line(&format!("public partial class {} : {}IDisposable", name, bases)).indent();
        if base.is_none() {
            p.line("internal IntPtr instance_;");
        }
        p.line(&format!(
            "internal static {}Dictionary<IntPtr, {}> cache_ = new Dictionary<IntPtr, {}>();",
            hide, name, name
        ));
        p.blank();

        p.line(&format!(
            "internal {}(IntPtr instance){}",
            name,
            if base.is_some() { " : base(IntPtr.Zero)" } else { "" }
        ))
        .indent();
        p.line("instance_ = instance;");
        p.line("if (instance != IntPtr.Zero)").indent();
        p.line("cache_[instance] = this;");
        p.dedent().dedent().blank();

        p.line(&format!(
            "internal static {}{} GetManagedInstance(IntPtr instance)",
            hide, name
        ))
        .indent();
        p.line("if (instance == IntPtr.Zero)").indent();
        p.line("return null;");
        p.dedent();
        p.line(&format!("{} value;", name));
        p.line("if (cache_.TryGetValue(instance, out value))").indent();
        p.line("return value;");
        p.dedent();
        p.line(&format!("return new {}(instance);", name));
        p.dedent().blank();

        let destructor = format!("{}_destructor", e.bridge_name);
        p.line(&format!(
            "public {} void Dispose()",
            if base.is_some() { "override" } else { "virtual" }
        ))
        .indent();
        p.line("if (instance_ != IntPtr.Zero)").indent();
        p.line("cache_.Remove(instance_);");
        p.line(&format!("{}(instance_);", destructor));
        p.line("instance_ = IntPtr.Zero;");
        p.dedent().dedent().blank();

        self.classes.push(ClassFrame {
            name: e.name.clone(),
            is_static: false,
            derived: base.is_some(),
            inheritable: ctx.rules.is_inheritable(&e.symbol_name),
            externs: vec![format!("internal static extern void {}(IntPtr instance);", destructor)],
            signatures: HashSet::new(),
        });
    }

    /// Nested native namespaces become nested managed namespace blocks.
    fn enter_namespace(&mut self, ctx: &PassContext<'_>, entity: &MetaEntityRef) {
        let name = entity.borrow().name.clone();
        let is_module = ancestors(entity).is_empty() && name == ctx.rules.default_namespace;
        if !is_module {
            self.printer.line(&format!("namespace {}", name)).indent();
            self.printer.blank();
        }
        self.namespaces.push(!is_module);
    }

    fn exit_namespace(&mut self) {
        if self.namespaces.pop() == Some(true) {
            self.printer.dedent().blank();
        }
    }

    fn exit_class(&mut self) {
        let Some(frame) = self.classes.pop() else {
            return;
        };
        let p = &mut self.printer;
        for declaration in &frame.externs {
            p.line("[MethodImpl(MethodImplOptions.InternalCall)]");
            p.line(declaration);
            p.blank();
        }
        p.dedent().blank();
    }

    fn emit_constructor(&mut self, ctx: &PassContext<'_>, class_symbol: &str, entity: &MetaEntity) {
        let mapper = ctx.type_mapper().in_scope(class_symbol);
        let Some(params) = managed_params(&mapper, entity) else {
            return;
        };
        let Some((class_name, derived)) = self.classes.last().map(|f| (f.name.clone(), f.derived))
        else {
            return;
        };
        if !self.claim_signature(format!(".ctor({})", join(&params, |m| m.managed_type.as_str()))) {
            return;
        }

        let p = &mut self.printer;
        p.line(&format!(
            "public {}({}){}",
            class_name,
            join(&params, |m| m.declaration.as_str()),
            if derived { " : base(IntPtr.Zero)" } else { "" }
        ))
        .indent();
        p.line(&format!(
            "instance_ = {}({});",
            entity.bridge_name,
            join(&params, |m| m.argument.as_str())
        ));
        p.line(&format!("{}.cache_[instance_] = this;", class_name));
        p.dedent().blank();

        self.external(format!(
            "internal static extern IntPtr {}({});",
            entity.bridge_name,
            join(&params, |m| m.extern_declaration.as_str())
        ));
    }

    fn emit_method(&mut self, ctx: &PassContext<'_>, class_symbol: &str, entity: &MetaEntity) {
        let mapper = ctx.type_mapper().in_scope(class_symbol);
        let Some(params) = managed_params(&mapper, entity) else {
            return;
        };
        let ret = match &entity.return_type {
            Some(ty) if !ty.is_void() => match mapper.resolve(ty) {
                Some(info) => Some(info),
                None => return,
            },
            _ => None,
        };
        let Some((class_static, inheritable)) = self.classes.last().map(|f| (f.is_static, f.inheritable))
        else {
            return;
        };

        let name = ensure_not_keyword(&entity.name);
        if !self.claim_signature(format!("{}({})", name, join(&params, |m| m.managed_type.as_str()))) {
            return;
        }

        let is_static = class_static || entity.is_static();
        let modifier = if is_static {
            "static "
        } else if inheritable && entity.is_virtual() {
            "virtual "
        } else {
            ""
        };
        let managed_ret = ret.as_ref().map_or("void", |info| info.managed.as_str());

        let mut arguments: Vec<String> = Vec::new();
        let mut extern_params: Vec<String> = Vec::new();
        if !is_static {
            arguments.push("instance_".to_string());
            extern_params.push("IntPtr instance".to_string());
        }
        arguments.extend(params.iter().map(|p| p.argument.clone()));
        extern_params.extend(params.iter().map(|p| p.extern_declaration.clone()));
        let call = format!("{}({})", entity.bridge_name, arguments.join(", "));

        let p = &mut self.printer;
        p.line(&format!(
            "public {}{} {}({})",
            modifier,
            managed_ret,
            name,
            join(&params, |m| m.declaration.as_str())
        ))
        .indent();
        match &ret {
            None => p.line(&format!("{};", call)),
            Some(info) => p.line(&format!("return {};", info.marshal_to_managed(&call))),
        };
        p.dedent().blank();

        let (extern_ret, ret_attribute) = match &ret {
            Some(info) => (
                info.marshal.clone(),
                info.attribute
                    .as_ref()
                    .map(|a| format!("[return: {}] ", a))
                    .unwrap_or_default(),
            ),
            None => ("void".to_string(), String::new()),
        };
        self.external(format!(
            "{}internal static extern {} {}({});",
            ret_attribute,
            extern_ret,
            entity.bridge_name,
            extern_params.join(", ")
        ));
    }

    fn emit_variable(&mut self, ctx: &PassContext<'_>, class_symbol: &str, entity: &MetaEntity) {
        let Some(ty) = entity.ty.as_ref() else {
            return;
        };
        let Some(info) = ctx.type_mapper().in_scope(class_symbol).resolve(ty) else {
            return;
        };
        let Some(class_static) = self.classes.last().map(|f| f.is_static) else {
            return;
        };

        let name = ensure_not_keyword(&entity.name);
        if !self.claim_signature(name.clone()) {
            return;
        }

        let p = &mut self.printer;
        if let (true, Some(value)) = (entity.is_constant, &entity.default_value) {
            // Managed constants are implicitly static.
            p.line(&format!("public const {} {} = {};", info.managed, name, value));
            p.blank();
            return;
        }

        let is_static = class_static || entity.is_static();
        p.line(&format!(
            "public {}{} {}",
            if is_static { "static " } else { "" },
            info.managed,
            name
        ))
        .indent();
        let instance = if is_static { "" } else { "instance_" };
        let getter = format!("get_{}({})", entity.bridge_name, instance);
        p.line(&format!("get {{ return {}; }}", info.marshal_to_managed(&getter)));
        if !entity.is_constant {
            let value = info.managed_to_marshal("value");
            let args = if is_static {
                value
            } else {
                format!("instance_, {}", value)
            };
            p.line(&format!("set {{ set_{}({}); }}", entity.bridge_name, args));
        }
        p.dedent().blank();

        let instance_param = if is_static { "" } else { "IntPtr instance" };
        let ret_attribute = info
            .attribute
            .as_ref()
            .map(|a| format!("[return: {}] ", a))
            .unwrap_or_default();
        self.external(format!(
            "{}internal static extern {} get_{}({});",
            ret_attribute, info.marshal, entity.bridge_name, instance_param
        ));
        if !entity.is_constant {
            let value_param = with_attribute(&info, format!("{} value", info.marshal));
            let params = if is_static {
                value_param
            } else {
                format!("{}, {}", instance_param, value_param)
            };
            self.external(format!(
                "internal static extern void set_{}({});",
                entity.bridge_name, params
            ));
        }
    }

    fn emit_enum(&mut self, entity: &MetaEntity) {
        let underlying = match entity.ty.as_ref().map(CppType::unqualified) {
            Some(CppType::Builtin { builtin }) => format!(" : {}", builtin_managed(*builtin)),
            _ => String::new(),
        };
        let p = &mut self.printer;
        p.line(&format!("public enum {}{}", entity.name, underlying)).indent();
        for value in &entity.children {
            let value = value.borrow();
            if value.kind != EntityKind::EnumValue {
                continue;
            }
            let initializer = value
                .default_value
                .clone()
                .or_else(|| value.native_value.as_ref().map(|v| v.replace("::", ".")));
            match initializer {
                Some(init) => p.line(&format!("{} = {},", value.name, init)),
                None => p.line(&format!("{},", value.name)),
            };
        }
        p.dedent().blank();
    }
}

impl ApiPass for GenerateManagedPass {
    fn name(&self) -> &'static str {
        "GenerateManagedPass"
    }

    fn namespace_start(&mut self, ctx: &mut PassContext<'_>) {
        self.classes.clear();
        self.namespaces.clear();
        let p = &mut self.printer;
        p.take();
        p.line("using System;");
        p.line("using System.Collections.Generic;");
        p.line("using System.Runtime.CompilerServices;");
        p.blank();
        p.line(&format!("namespace {}", ctx.rules.default_namespace)).indent();
        p.blank();
    }

    fn visit(&mut self, ctx: &mut PassContext<'_>, entity: &MetaEntityRef, info: VisitorInfo) -> bool {
        let kind = entity.borrow().kind;
        match (kind, info.event) {
            (EntityKind::Class, VisitEvent::ContainerEnter) => {
                self.enter_class(ctx, entity);
                true
            }
            (EntityKind::Class, VisitEvent::ContainerExit) => {
                self.exit_class();
                true
            }
            (EntityKind::Namespace, VisitEvent::ContainerEnter) => {
                self.enter_namespace(ctx, entity);
                true
            }
            (EntityKind::Namespace, VisitEvent::ContainerExit) => {
                self.exit_namespace();
                true
            }
            (EntityKind::Enum, VisitEvent::ContainerEnter) => {
                self.emit_enum(&entity.borrow());
                false
            }
            (_, VisitEvent::Leaf) => {
                let parent = entity.borrow().parent();
                let Some(class) = parent else {
                    return true;
                };
                let class_symbol = {
                    let c = class.borrow();
                    if c.kind != EntityKind::Class {
                        return true;
                    }
                    c.symbol_name.clone()
                };
                let e = entity.borrow();
                match kind {
                    EntityKind::Constructor => self.emit_constructor(ctx, &class_symbol, &e),
                    EntityKind::MemberFunction | EntityKind::Function => {
                        self.emit_method(ctx, &class_symbol, &e)
                    }
                    EntityKind::Variable | EntityKind::MemberVariable | EntityKind::Bitfield => {
                        self.emit_variable(ctx, &class_symbol, &e)
                    }
                    _ => {}
                }
                true
            }
            _ => true,
        }
    }

    fn namespace_stop(&mut self, ctx: &mut PassContext<'_>) -> Result<()> {
        self.printer.dedent();
        let content = self.printer.take();
        let file_name = format!("{}.cs", ctx.rules.default_namespace);

        match ArtifactWriter::new(&ctx.settings.output_dir).write(&file_name, &content) {
            Ok(WriteStatus::Written) => {
                info!("Wrote {}", file_name);
                Ok(())
            }
            Ok(WriteStatus::Unchanged) => Ok(()),
            Err(e) => {
                warn!("Failed to write {}: {}", file_name, e);
                Err(e)
            }
        }
    }
}
