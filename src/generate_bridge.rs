//! Native Bridge Emitter
//!
//! Writes `<namespace>Bridge.cpp`: one flat `extern "C"` function per
//! exported constructor, method, function, accessor and destructor, and a
//! registration function binding each of them as a runtime internal call.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::api_passes::{managed_path, sanitize};
use crate::ast::EntityKind;
use crate::error::Result;
use crate::output::{ArtifactWriter, WriteStatus};
use crate::overlay::{managed_namespace, MetaEntity, MetaEntityRef};
use crate::pass::{ApiPass, PassContext, VisitEvent, VisitorInfo};
use crate::printer::CodePrinter;
use crate::rules::GeneratorSettings;
use crate::typemap::{MarshalInfo, TypeMapper};

/// Header declaring `EXPORT_API` and the string converters.
pub const BRIDGE_RUNTIME_HEADER: &str = "CSharp.h";

#[derive(Debug, Default)]
pub struct GenerateBridgePass {
    printer: CodePrinter,
    /// `(internal call name, bridge function)` in emission order.
    registrations: Vec<(String, String)>,
    includes: BTreeSet<PathBuf>,
}

struct Argument {
    bridge: String,
    name: String,
    native: String,
}

fn arguments(mapper: &TypeMapper<'_>, entity: &MetaEntity) -> Option<Vec<Argument>> {
    entity
        .parameters
        .iter()
        .map(|p| {
            let info = mapper.resolve(p.ty.as_ref()?)?;
            Some(Argument {
                bridge: info.bridge.clone(),
                name: p.name.clone(),
                native: info.bridge_to_native(&p.name),
            })
        })
        .collect()
}

fn return_info(mapper: &TypeMapper<'_>, entity: &MetaEntity) -> Option<Option<MarshalInfo>> {
    match &entity.return_type {
        None => Some(None),
        Some(ty) if ty.is_void() => Some(None),
        Some(ty) => mapper.resolve(ty).map(Some),
    }
}

fn include_path(settings: &GeneratorSettings, path: &Path) -> String {
    let relative = path.strip_prefix(&settings.source_dir).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl GenerateBridgePass {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, ctx: &PassContext<'_>, class: &MetaEntityRef, function: &str) {
        let module = ctx.rules.default_namespace.as_str();
        let mut namespace = vec![module.to_string()];
        namespace.extend(managed_namespace(class, module));
        let class_path = managed_path(class).replace('.', "/");
        self.registrations.push((
            format!("{}.{}::{}", namespace.join("."), class_path, function),
            function.to_string(),
        ));
    }

    fn function(&mut self, signature: String, body: String) {
        self.printer.line(&signature).indent();
        self.printer.line(&body);
        self.printer.dedent().blank();
    }

    fn emit_callable(&mut self, ctx: &PassContext<'_>, class: &MetaEntityRef, entity: &MetaEntityRef) {
        let (class_symbol, class_static) = {
            let c = class.borrow();
            (c.symbol_name.clone(), c.is_static())
        };
        let mapper = ctx.type_mapper().in_scope(&class_symbol);
        let e = entity.borrow();

        let Some(args) = arguments(&mapper, &e) else {
            return;
        };
        let Some(ret) = return_info(&mapper, &e) else {
            return;
        };

        let mut params: Vec<String> = Vec::new();
        let callee = match e.kind {
            EntityKind::Constructor => format!("new {}", class_symbol),
            EntityKind::MemberFunction if !e.is_static() && !class_static => {
                params.push(format!("{}* instance", class_symbol));
                format!("instance->{}", e.name)
            }
            EntityKind::MemberFunction => format!("{}::{}", class_symbol, e.name),
            _ => e.symbol_name.clone(),
        };
        params.extend(args.iter().map(|a| format!("{} {}", a.bridge, a.name)));
        let call = format!(
            "{}({})",
            callee,
            args.iter().map(|a| a.native.as_str()).collect::<Vec<_>>().join(", ")
        );

        let (ret_type, body) = match (e.kind, &ret) {
            (EntityKind::Constructor, _) => (format!("{}*", class_symbol), format!("return {};", call)),
            (_, None) => ("void".to_string(), format!("{};", call)),
            (_, Some(info)) => (info.bridge.clone(), format!("return {};", info.native_to_bridge(&call))),
        };

        let bridge_name = e.bridge_name.clone();
        drop(e);
        self.function(
            format!("EXPORT_API {} {}({})", ret_type, bridge_name, params.join(", ")),
            body,
        );
        self.register(ctx, class, &bridge_name);
    }

    fn emit_accessors(&mut self, ctx: &PassContext<'_>, class: &MetaEntityRef, entity: &MetaEntityRef) {
        let (class_symbol, class_static) = {
            let c = class.borrow();
            (c.symbol_name.clone(), c.is_static())
        };
        let e = entity.borrow();
        // Managed constants carry their value and need no accessor.
        if e.default_value.is_some() {
            return;
        }
        let Some(ty) = e.ty.as_ref() else {
            return;
        };
        let Some(info) = ctx.type_mapper().in_scope(&class_symbol).resolve(ty) else {
            return;
        };

        let is_static = e.is_static() || class_static;
        let (target, instance) = if class_static && e.kind != EntityKind::MemberVariable {
            (e.symbol_name.clone(), None)
        } else if is_static {
            (format!("{}::{}", class_symbol, e.name), None)
        } else {
            (
                format!("instance->{}", e.name),
                Some(format!("{}* instance", class_symbol)),
            )
        };

        let getter = format!("get_{}", e.bridge_name);
        let setter = format!("set_{}", e.bridge_name);
        let writable = !e.is_constant;
        drop(e);

        self.function(
            format!(
                "EXPORT_API {} {}({})",
                info.bridge,
                getter,
                instance.clone().unwrap_or_default()
            ),
            format!("return {};", info.native_to_bridge(&target)),
        );
        self.register(ctx, class, &getter);

        if writable {
            let params = match &instance {
                Some(instance) => format!("{}, {} value", instance, info.bridge),
                None => format!("{} value", info.bridge),
            };
            self.function(
                format!("EXPORT_API void {}({})", setter, params),
                format!("{} = {};", target, info.bridge_to_native("value")),
            );
            self.register(ctx, class, &setter);
        }
    }

    fn emit_destructor(&mut self, ctx: &PassContext<'_>, class: &MetaEntityRef) {
        let (symbol, bridge) = {
            let c = class.borrow();
            (c.symbol_name.clone(), c.bridge_name.clone())
        };
        let name = format!("{}_destructor", bridge);
        self.function(
            format!("EXPORT_API void {}({}* instance)", name, symbol),
            "delete instance;".to_string(),
        );
        self.register(ctx, class, &name);
    }

    fn render(&mut self, settings: &GeneratorSettings, namespace: &str) -> String {
        let mut out = CodePrinter::new();
        out.line("// Generated by bridgegen. Do not edit.");
        out.line(&format!("#include \"{}\"", BRIDGE_RUNTIME_HEADER));
        for include in &self.includes {
            out.line(&format!("#include \"{}\"", include_path(settings, include)));
        }
        out.blank();
        out.line("extern \"C\"").indent();
        out.blank();
        let body = self.printer.take();
        for line in body.lines() {
            out.line(line);
        }
        out.dedent().blank();

        out.line(&format!("void Register{}InternalCalls()", sanitize(namespace)));
        out.indent();
        for (name, function) in &self.registrations {
            out.line(&format!(
                "mono_add_internal_call(\"{}\", (void*)&{});",
                name, function
            ));
        }
        for call in &settings.mono_calls {
            out.line(&format!("{}();", call));
        }
        out.dedent();
        out.take()
    }
}

impl ApiPass for GenerateBridgePass {
    fn name(&self) -> &'static str {
        "GenerateBridgePass"
    }

    fn namespace_start(&mut self, _ctx: &mut PassContext<'_>) {
        self.printer = CodePrinter::new();
        self.registrations.clear();
        self.includes.clear();
    }

    fn visit(&mut self, ctx: &mut PassContext<'_>, entity: &MetaEntityRef, info: VisitorInfo) -> bool {
        if info.event == VisitEvent::ContainerExit {
            return true;
        }

        let (kind, source, is_static) = {
            let e = entity.borrow();
            (e.kind, e.source_file.clone(), e.is_static())
        };
        if let Some(source) = source {
            self.includes.insert(source);
        }

        match kind {
            EntityKind::Class => {
                if !is_static {
                    self.emit_destructor(ctx, entity);
                }
                true
            }
            EntityKind::Enum => false,
            _ if kind.is_container() => true,
            _ => {
                let parent = entity.borrow().parent();
                let Some(class) = parent else {
                    return true;
                };
                if class.borrow().kind != EntityKind::Class {
                    return true;
                }
                match kind {
                    EntityKind::Constructor | EntityKind::MemberFunction | EntityKind::Function => {
                        self.emit_callable(ctx, &class, entity)
                    }
                    EntityKind::Variable | EntityKind::MemberVariable | EntityKind::Bitfield => {
                        self.emit_accessors(ctx, &class, entity)
                    }
                    _ => {}
                }
                true
            }
        }
    }

    fn namespace_stop(&mut self, ctx: &mut PassContext<'_>) -> Result<()> {
        let namespace = ctx.rules.default_namespace.clone();
        let content = self.render(ctx.settings, &namespace);
        let file_name = format!("{}Bridge.cpp", namespace);

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
