#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;
    use tempfile::TempDir;

    use crate::ast::EntityKind;
    use crate::context::GeneratorContext;
    use crate::error::GeneratorError;
    use crate::overlay::{add_child, MetaEntity, MetaEntityRef};
    use crate::pass::{ApiPass, PassContext, VisitEvent, VisitorInfo};
    use crate::rules::{GeneratorSettings, NamespaceRules};
    use crate::symbols::SymbolTable;
    use crate::visitor::walk_overlay;

    const FOO_HEADER: &str = r#"#pragma once

namespace Urho3D
{

class URHO3D_API Foo
{
public:
    static const int kDefault = 7;
    Foo(const char* name);
    void Bar(int value);
    int Scale(int factor = Foo::kDefault) const;
    virtual ~Foo();

private:
    int secret_;
};

class URHO3D_API Derived : public Foo
{
public:
    Derived(const char* name, int extra);
    float weight;
};

enum Mode
{
    M_A,
    M_B = 4
};

int Add(int a, int b);

}
"#;

    const RULES: &str = r#"{
        "module": "Urho3D",
        "initialization": { "mono-calls": ["RegisterCustomCalls"] },
        "default-values": {
            "Foo::kDefault": { "value": "42", "const": true }
        },
        "namespaces": {
            "Urho3D": {
                "inheritable": ["Urho3D::Foo"],
                "parse": { "Urho3D": ["*.h"] }
            }
        }
    }"#;

    struct Workspace {
        _dir: TempDir,
        source: std::path::PathBuf,
        output: std::path::PathBuf,
    }

    fn workspace() -> Workspace {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("Source");
        let output = dir.path().join("Generated");
        fs::create_dir_all(source.join("Urho3D")).unwrap();
        fs::write(source.join("Urho3D/Foo.h"), FOO_HEADER).unwrap();
        Workspace {
            _dir: dir,
            source,
            output,
        }
    }

    fn workspace_with(headers: &[(&str, &str)]) -> Workspace {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("Source");
        let output = dir.path().join("Generated");
        fs::create_dir_all(source.join("Urho3D")).unwrap();
        for (name, content) in headers {
            fs::write(source.join("Urho3D").join(name), content).unwrap();
        }
        Workspace {
            _dir: dir,
            source,
            output,
        }
    }

    fn context(ws: &Workspace, rules: &str) -> GeneratorContext {
        let mut ctx = GeneratorContext::new(&ws.source, &ws.output).with_default_passes();
        ctx.set_workers(2);
        ctx.load_rules(rules).unwrap();
        ctx
    }

    fn read(dir: &Path, name: &str) -> String {
        fs::read_to_string(dir.join(name)).unwrap()
    }

    fn assert_lines(text: &str, expected: &[&str]) {
        for line in expected {
            assert!(
                text.lines().any(|l| l == *line),
                "missing line {:?} in:\n{}",
                line,
                text
            );
        }
    }

    #[test]
    fn test_managed_output() {
        let ws = workspace();
        let mut ctx = context(&ws, RULES);
        ctx.generate().unwrap();

        let cs = read(&ws.output, "Urho3D.cs");
        assert!(cs.starts_with("using System;\n"));
        assert_lines(
            &cs,
            &[
                "namespace Urho3D",
                "    public partial class Foo : IDisposable",
                "        internal IntPtr instance_;",
                "        public const int kDefault = 7;",
                "        public Foo(string name)",
                "            instance_ = Urho3D_Foo_Foo(name);",
                "            Foo.cache_[instance_] = this;",
                "        public void Bar(int value)",
                "            Urho3D_Foo_Bar(instance_, value);",
                "        public int Scale(int factor = 42)",
                "            return Urho3D_Foo_Scale(instance_, factor);",
                "        public virtual void Dispose()",
                "        internal static extern IntPtr Urho3D_Foo_Foo(string name);",
                "        internal static extern void Urho3D_Foo_Bar(IntPtr instance, int value);",
                "        internal static extern void Urho3D_Foo_destructor(IntPtr instance);",
                "        [MethodImpl(MethodImplOptions.InternalCall)]",
            ],
        );

        assert_lines(
            &cs,
            &[
                "    public partial class Derived : Foo, IDisposable",
                "        internal static new Dictionary<IntPtr, Derived> cache_ = new Dictionary<IntPtr, Derived>();",
                "        public Derived(string name, int extra) : base(IntPtr.Zero)",
                "            instance_ = Urho3D_Derived_Derived(name, extra);",
                "        public override void Dispose()",
                "        public float weight",
                "            get { return get_Urho3D_Derived_weight(instance_); }",
                "            set { set_Urho3D_Derived_weight(instance_, value); }",
            ],
        );

        assert_lines(
            &cs,
            &[
                "    public enum Mode",
                "        M_A,",
                "        M_B = 4,",
                "    public static partial class Globals",
                "        public static int Add(int a, int b)",
                "            return Urho3D_Add(a, b);",
                "        internal static extern int Urho3D_Add(int a, int b);",
            ],
        );

        assert!(!cs.contains("secret_"));
        assert!(!cs.contains("~Foo"));
        assert_eq!(cs.matches("internal IntPtr instance_;").count(), 1);
    }

    #[test]
    fn test_bridge_output() {
        let ws = workspace();
        let mut ctx = context(&ws, RULES);
        ctx.generate().unwrap();

        let cpp = read(&ws.output, "Urho3DBridge.cpp");
        assert_lines(
            &cpp,
            &[
                "#include \"CSharp.h\"",
                "#include \"Urho3D/Foo.h\"",
                "extern \"C\"",
                "    EXPORT_API Urho3D::Foo* Urho3D_Foo_Foo(MonoString* name)",
                "        return new Urho3D::Foo(CSharpConverter<MonoString>::FromCSharp<MonoStringHolder>(name));",
                "    EXPORT_API void Urho3D_Foo_Bar(Urho3D::Foo* instance, int value)",
                "        instance->Bar(value);",
                "    EXPORT_API int Urho3D_Foo_Scale(Urho3D::Foo* instance, int factor)",
                "        return instance->Scale(factor);",
                "    EXPORT_API void Urho3D_Foo_destructor(Urho3D::Foo* instance)",
                "        delete instance;",
                "    EXPORT_API float get_Urho3D_Derived_weight(Urho3D::Derived* instance)",
                "        return instance->weight;",
                "    EXPORT_API void set_Urho3D_Derived_weight(Urho3D::Derived* instance, float value)",
                "        instance->weight = value;",
                "    EXPORT_API int Urho3D_Add(int a, int b)",
                "        return Urho3D::Add(a, b);",
                "void RegisterUrho3DInternalCalls()",
                "    mono_add_internal_call(\"Urho3D.Foo::Urho3D_Foo_Bar\", (void*)&Urho3D_Foo_Bar);",
                "    mono_add_internal_call(\"Urho3D.Globals::Urho3D_Add\", (void*)&Urho3D_Add);",
                "    RegisterCustomCalls();",
            ],
        );

        // Constants carry their value on the managed side and get no accessor.
        assert!(!cpp.contains("kDefault"));
        assert!(!cpp.contains("secret_"));
        assert!(!cpp.contains("Globals_destructor"));
    }

    #[test]
    fn test_forced_constants_are_recorded() {
        let ws = workspace();
        let ctx = context(&ws, RULES);
        assert!(ctx.settings().is_forced_constant("42"));
        assert_eq!(ctx.settings().module_name, "Urho3D");
        assert_eq!(ctx.output_dir(), ws.output);
    }

    #[test]
    fn test_second_run_is_identical() {
        let ws = workspace();
        let mut ctx = context(&ws, RULES);
        ctx.generate().unwrap();
        let cs = read(&ws.output, "Urho3D.cs");
        let cpp = read(&ws.output, "Urho3DBridge.cpp");

        ctx.generate().unwrap();
        assert_eq!(read(&ws.output, "Urho3D.cs"), cs);
        assert_eq!(read(&ws.output, "Urho3DBridge.cpp"), cpp);

        let mut fresh = context(&ws, RULES);
        fresh.set_workers(1);
        fresh.generate().unwrap();
        assert_eq!(read(&ws.output, "Urho3D.cs"), cs);
    }

    #[test]
    fn test_symbol_filter_removes_class() {
        let ws = workspace();
        let rules = RULES.replace(
            r#""inheritable": ["Urho3D::Foo"],"#,
            r#""inheritable": ["Urho3D::Foo"], "symbols": ["-Urho3D::Derived"],"#,
        );
        let mut ctx = context(&ws, &rules);
        ctx.generate().unwrap();

        let cs = read(&ws.output, "Urho3D.cs");
        assert!(cs.contains("public partial class Foo"));
        assert!(!cs.contains("Derived"));
        assert!(ctx.symbols().contains("Urho3D::Foo"));
        assert!(!ctx.symbols().contains("Urho3D::Derived"));
    }

    #[test]
    fn test_overlay_is_kept_after_run() {
        let ws = workspace();
        let mut ctx = context(&ws, RULES);
        ctx.generate().unwrap();

        let rules = &ctx.namespaces()[0];
        let ns = rules.api_root.borrow().find_child("Urho3D").unwrap();
        let names: Vec<String> = ns
            .borrow()
            .children
            .iter()
            .map(|c| c.borrow().name.clone())
            .collect();
        assert_eq!(names, vec!["Foo", "Derived", "Mode", "Globals"]);

        let foo = ns.borrow().find_child("Foo").unwrap();
        let scale = foo.borrow().find_child("Scale").unwrap();
        let scale = scale.borrow();
        assert_eq!(scale.bridge_name, "Urho3D_Foo_Scale");
        assert_eq!(scale.parameters[0].native_default.as_deref(), Some("Foo::kDefault"));
        assert_eq!(scale.parameters[0].default_value.as_deref(), Some("42"));
    }

    #[test]
    fn test_exported_members_are_registered() {
        let ws = workspace();
        let mut ctx = context(&ws, RULES);
        ctx.generate().unwrap();

        let symbols = ctx.symbols();
        let kind = |name: &str| symbols.get(name).map(|e| e.borrow().kind);
        assert_eq!(kind("Urho3D::Foo"), Some(EntityKind::Class));
        assert_eq!(kind("Urho3D::Foo::Foo"), Some(EntityKind::Constructor));
        assert_eq!(kind("Urho3D::Foo::Bar"), Some(EntityKind::MemberFunction));
        assert_eq!(kind("Urho3D::Foo::Bar(int)"), Some(EntityKind::MemberFunction));
        assert_eq!(kind("Urho3D::Add"), Some(EntityKind::Function));
        assert_eq!(kind("Urho3D::Add(int, int)"), Some(EntityKind::Function));
        assert_eq!(kind("Urho3D::Derived::weight"), Some(EntityKind::MemberVariable));
        assert!(!symbols.contains("Urho3D::Foo::secret_"));
    }

    #[test]
    fn test_overloads_keep_the_first_bare_name() {
        let ws = workspace_with(&[(
            "Math.h",
            "namespace Urho3D { int Clamp(int v); float Clamp(float v); }",
        )]);
        let mut ctx = context(&ws, RULES);
        ctx.generate().unwrap();

        let symbols = ctx.symbols();
        let bare = symbols.get("Urho3D::Clamp").unwrap();
        let by_int = symbols.get("Urho3D::Clamp(int)").unwrap();
        let by_float = symbols.get("Urho3D::Clamp(float)").unwrap();
        assert!(Rc::ptr_eq(&bare, &by_int));
        assert!(!Rc::ptr_eq(&by_int, &by_float));
    }

    #[test]
    fn test_shared_definition_is_exported_once() {
        let ws = workspace_with(&[
            (
                "A.h",
                "namespace Urho3D { class Shared { public: int value; void Run(); }; enum Mode { M_A, M_B }; }",
            ),
            (
                "B.h",
                "namespace Urho3D { class Shared { public: int value; int extra; void Run(); }; enum Mode { M_A, M_B }; }",
            ),
        ]);
        let mut ctx = context(&ws, RULES);
        ctx.generate().unwrap();

        let rules = &ctx.namespaces()[0];
        let ns = rules.api_root.borrow().find_child("Urho3D").unwrap();
        let names = |entity: &MetaEntityRef| -> Vec<String> {
            entity
                .borrow()
                .children
                .iter()
                .map(|c| c.borrow().name.clone())
                .collect()
        };
        assert_eq!(names(&ns), vec!["Shared", "Mode"]);

        // Members come from the owning header only.
        let shared = ns.borrow().find_child("Shared").unwrap();
        assert_eq!(names(&shared), vec!["value", "Run"]);
        assert_eq!(
            shared.borrow().source_file.as_deref(),
            Some(ws.source.join("Urho3D/A.h").as_path())
        );
        let mode = ns.borrow().find_child("Mode").unwrap();
        assert_eq!(names(&mode), vec!["M_A", "M_B"]);

        let cs = read(&ws.output, "Urho3D.cs");
        assert_eq!(cs.matches("public partial class Shared").count(), 1);
        assert!(!cs.contains("extra"));
    }

    #[test]
    fn test_nested_namespaces_stay_separate() {
        let ws = workspace_with(&[(
            "Math.h",
            r#"namespace Urho3D
{
int Add(int a, int b);

namespace Detail
{
int Add(int a, int b);

class Pool
{
public:
    Pool();
    int Size() const;
};
}
}
"#,
        )]);
        let mut ctx = context(&ws, RULES);
        ctx.generate().unwrap();

        let cs = read(&ws.output, "Urho3D.cs");
        assert_lines(
            &cs,
            &[
                "namespace Urho3D",
                "    public static partial class Globals",
                "        public static int Add(int a, int b)",
                "    namespace Detail",
                "        public static partial class Globals",
                "            public static int Add(int a, int b)",
                "                return Urho3D_Detail_Add(a, b);",
                "        public partial class Pool : IDisposable",
            ],
        );
        assert_eq!(cs.matches("namespace Detail").count(), 1);
        assert_eq!(cs.matches("public static int Add(int a, int b)").count(), 2);
        assert_eq!(cs.matches("namespace Urho3D").count(), 1);

        let cpp = read(&ws.output, "Urho3DBridge.cpp");
        assert_lines(
            &cpp,
            &[
                "    mono_add_internal_call(\"Urho3D.Globals::Urho3D_Add\", (void*)&Urho3D_Add);",
                "    mono_add_internal_call(\"Urho3D.Detail.Globals::Urho3D_Detail_Add\", (void*)&Urho3D_Detail_Add);",
                "    mono_add_internal_call(\"Urho3D.Detail.Pool::Urho3D_Detail_Pool_Size\", (void*)&Urho3D_Detail_Pool_Size);",
            ],
        );
    }

    #[test]
    fn test_invalid_rules_are_rejected() {
        let ws = workspace();
        let mut ctx = GeneratorContext::new(&ws.source, &ws.output);
        assert!(matches!(ctx.load_rules("[1, 2]"), Err(GeneratorError::Config(_))));
        assert!(matches!(ctx.load_rules("{ not json"), Err(GeneratorError::Json(_))));
        assert!(matches!(
            ctx.load_rules(r#"{ "namespaces": { "A": { "parse": [] } } }"#),
            Err(GeneratorError::Config(_))
        ));
    }

    #[test]
    fn test_unwritable_output_fails_the_run() {
        let ws = workspace();
        let blocker = ws.source.join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let mut ctx = context(&ws, RULES);
        ctx.set_output_dir(&blocker);
        let err = ctx.generate().unwrap_err();
        assert!(matches!(err, GeneratorError::Output { .. }));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PASS LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl ApiPass for Recorder {
        fn name(&self) -> &'static str {
            "Recorder"
        }

        fn start(&mut self, _settings: &GeneratorSettings) {
            self.log.borrow_mut().push("start".to_string());
        }

        fn namespace_start(&mut self, ctx: &mut PassContext<'_>) {
            self.log
                .borrow_mut()
                .push(format!("namespace {}", ctx.rules.default_namespace));
        }

        fn visit(
            &mut self,
            _ctx: &mut PassContext<'_>,
            entity: &MetaEntityRef,
            info: VisitorInfo,
        ) -> bool {
            let tag = match info.event {
                VisitEvent::ContainerEnter => "enter",
                VisitEvent::ContainerExit => "exit",
                VisitEvent::Leaf => "leaf",
            };
            self.log
                .borrow_mut()
                .push(format!("{} {}", tag, entity.borrow().name));
            true
        }

        fn stop(&mut self, _settings: &GeneratorSettings) -> crate::error::Result<()> {
            self.log.borrow_mut().push("stop".to_string());
            Ok(())
        }
    }

    #[test]
    fn test_custom_pass_sees_lifecycle() {
        let ws = workspace();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut ctx = context(&ws, RULES);
        ctx.add_api_pass(Recorder { log: log.clone() });
        ctx.generate().unwrap();

        let log = log.borrow();
        assert_eq!(log.first().map(String::as_str), Some("start"));
        assert_eq!(log.last().map(String::as_str), Some("stop"));
        assert_eq!(log.iter().filter(|l| l.starts_with("namespace")).count(), 1);
        assert!(log.contains(&"enter Globals".to_string()));
        assert!(log.contains(&"leaf Add".to_string()));
        assert!(log.contains(&"exit Foo".to_string()));
    }

    fn any_proxy(entity: &MetaEntityRef) -> bool {
        let e = entity.borrow();
        e.is_proxy || e.children.iter().any(any_proxy)
    }

    #[test]
    fn test_template_wrappers_are_not_exported() {
        let ws = workspace_with(&[(
            "Vector.h",
            r#"namespace Urho3D
{
template <typename T> class Vector
{
public:
    T* data_;
    friend void Touch(Vector& v);
};

class Holder
{
public:
    friend class Tracker;
    int count;
};
}
"#,
        )]);
        let mut ctx = context(&ws, RULES);
        ctx.generate().unwrap();

        let rules = &ctx.namespaces()[0];
        let ns = rules.api_root.borrow().find_child("Urho3D").unwrap();
        assert!(ns.borrow().find_child("Vector").is_none());
        assert!(ns.borrow().find_child("Holder").is_some());
        assert!(!any_proxy(&rules.api_root));
    }

    #[test]
    fn test_overlay_walk_skips_proxies() {
        let rules = NamespaceRules::new("Urho3D");
        let settings = GeneratorSettings::default();
        let mut symbols = SymbolTable::new();

        let ns = MetaEntity::new(EntityKind::Namespace, "Urho3D", "Urho3D").into_ref();
        add_child(&rules.api_root, ns.clone());
        let mut proxy = MetaEntity::new(EntityKind::Class, "Vector", "Urho3D::Vector");
        proxy.is_proxy = true;
        let proxy = proxy.into_ref();
        add_child(&ns, proxy.clone());
        let size = MetaEntity::new(EntityKind::MemberFunction, "Size", "Urho3D::Vector::Size").into_ref();
        add_child(&proxy, size);

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut recorder = Recorder { log: log.clone() };
        let mut ctx = PassContext::new(&settings, &rules, &mut symbols);
        walk_overlay(&mut recorder, &mut ctx, &rules.api_root);

        assert_eq!(
            *log.borrow(),
            vec!["enter ", "enter Urho3D", "leaf Size", "exit Urho3D", "exit "]
        );
    }
}
