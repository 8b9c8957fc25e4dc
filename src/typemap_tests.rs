#[cfg(test)]
mod tests {
    use crate::ast::{BuiltinKind, CppType, EntityKind, RefKind};
    use crate::overlay::{add_child, MetaEntity, MetaEntityRef};
    use crate::rules::{NamespaceRules, TypeMap, TypeMapSpec};
    use crate::symbols::SymbolTable;
    use crate::typemap::TypeMapper;

    fn string_hash_map() -> TypeMap {
        TypeMap::from(TypeMapSpec {
            cpp_type: "Urho3D::StringHash".to_string(),
            ctype: Some("unsigned".to_string()),
            cstype: None,
            ptype: "uint".to_string(),
            cpp_to_c: Some("{value}.Value()".to_string()),
            c_to_cpp: Some("Urho3D::StringHash({value})".to_string()),
            pinvoke_to_cs: None,
            cs_to_pinvoke: None,
            marshal_attribute: None,
            is_value_type: true,
        })
    }

    fn declare(
        rules: &NamespaceRules,
        symbols: &mut SymbolTable,
        kind: EntityKind,
        name: &str,
    ) -> MetaEntityRef {
        let existing = rules.api_root.borrow().find_child("Urho3D");
        let ns = match existing {
            Some(ns) => ns,
            None => {
                let ns = MetaEntity::new(EntityKind::Namespace, "Urho3D", "Urho3D").into_ref();
                add_child(&rules.api_root, ns.clone());
                symbols.insert("Urho3D", &ns);
                ns
            }
        };
        let symbol = format!("Urho3D::{}", name);
        let entity = MetaEntity::new(kind, name, &symbol).into_ref();
        add_child(&ns, entity.clone());
        symbols.insert(&symbol, &entity);
        entity
    }

    fn fixture() -> (NamespaceRules, SymbolTable) {
        let mut rules = NamespaceRules::new("Urho3D");
        rules.add_type_map(string_hash_map());
        let mut symbols = SymbolTable::new();
        declare(&rules, &mut symbols, EntityKind::Class, "Node");
        declare(&rules, &mut symbols, EntityKind::Enum, "BlendMode");
        (rules, symbols)
    }

    #[test]
    fn test_strict_lookup_needs_exact_spelling() {
        let (rules, symbols) = fixture();
        let mapper = TypeMapper::new(&rules, &symbols);

        let exact = CppType::named("Urho3D::StringHash");
        let wrapped = CppType::reference(CppType::constant(CppType::named("Urho3D::StringHash")));

        assert!(mapper.get_type_map(&exact, true).is_some());
        assert!(mapper.get_type_map(&wrapped, true).is_none());
        let map = mapper.get_type_map(&wrapped, false).expect("base lookup");
        assert_eq!(map.cs_type, "uint");
        assert!(mapper.get_type_map(&CppType::named("Urho3D::Unknown"), false).is_none());
    }

    #[test]
    fn test_every_builtin_is_acceptable() {
        let (rules, symbols) = fixture();
        let mapper = TypeMapper::new(&rules, &symbols);
        let all = [
            BuiltinKind::Void,
            BuiltinKind::Bool,
            BuiltinKind::Char,
            BuiltinKind::SChar,
            BuiltinKind::UChar,
            BuiltinKind::WChar,
            BuiltinKind::Char16,
            BuiltinKind::Char32,
            BuiltinKind::Short,
            BuiltinKind::UShort,
            BuiltinKind::Int,
            BuiltinKind::UInt,
            BuiltinKind::Long,
            BuiltinKind::ULong,
            BuiltinKind::LongLong,
            BuiltinKind::ULongLong,
            BuiltinKind::Float,
            BuiltinKind::Double,
            BuiltinKind::LongDouble,
            BuiltinKind::Nullptr,
        ];
        for kind in all {
            assert!(mapper.is_acceptable_type(&CppType::builtin(kind)), "{:?}", kind);
        }
    }

    #[test]
    fn test_string_pointer_uses_implicit_map() {
        let (rules, symbols) = fixture();
        let mapper = TypeMapper::new(&rules, &symbols);
        let ty = CppType::pointer(CppType::constant(CppType::builtin(BuiltinKind::Char)));

        let info = mapper.resolve(&ty).expect("string map");
        assert_eq!(info.managed, "string");
        assert_eq!(info.bridge, "MonoString*");
        assert_eq!(
            info.bridge_to_native("name"),
            "CSharpConverter<MonoString>::FromCSharp<MonoStringHolder>(name)"
        );
        assert_eq!(info.managed_to_marshal("name"), "name");
    }

    #[test]
    fn test_scalars_cross_unchanged() {
        let (rules, symbols) = fixture();
        let mapper = TypeMapper::new(&rules, &symbols);

        let int = mapper.resolve(&CppType::builtin(BuiltinKind::Int)).unwrap();
        assert_eq!(int.managed, "int");
        assert_eq!(int.managed_to_marshal("value"), "value");
        assert_eq!(int.bridge_to_native("value"), "value");

        let uint = mapper.resolve(&CppType::builtin(BuiltinKind::UInt)).unwrap();
        assert_eq!(uint.managed, "uint");
        assert_eq!(uint.bridge, "unsigned int");

        let by_ref = CppType::reference(CppType::constant(CppType::builtin(BuiltinKind::Float)));
        assert_eq!(mapper.to_managed_type(&by_ref).as_deref(), Some("float"));

        let pointer = CppType::pointer(CppType::builtin(BuiltinKind::Int));
        let info = mapper.resolve(&pointer).unwrap();
        assert_eq!(info.managed, "IntPtr");
        assert_eq!(info.bridge, "int*");
    }

    #[test]
    fn test_class_marshalling_by_indirection() {
        let (rules, symbols) = fixture();
        let mapper = TypeMapper::new(&rules, &symbols).in_scope("Urho3D");

        let pointer = mapper.resolve(&CppType::pointer(CppType::named("Node"))).unwrap();
        assert_eq!(pointer.managed, "Node");
        assert_eq!(pointer.marshal, "IntPtr");
        assert_eq!(pointer.bridge, "Urho3D::Node*");
        assert_eq!(pointer.bridge_to_native("node"), "node");
        assert_eq!(pointer.native_to_bridge("node"), "node");
        assert_eq!(pointer.marshal_to_managed("ptr"), "Node.GetManagedInstance(ptr)");
        assert_eq!(
            pointer.managed_to_marshal("node"),
            "(node == null ? IntPtr.Zero : node.instance_)"
        );

        let reference = mapper
            .resolve(&CppType::reference(CppType::constant(CppType::named("Node"))))
            .unwrap();
        assert_eq!(reference.bridge_to_native("node"), "*node");
        assert_eq!(reference.native_to_bridge("node"), "&node");

        let value = mapper.resolve(&CppType::named("Node")).unwrap();
        assert_eq!(value.bridge_to_native("node"), "*node");
        assert_eq!(value.native_to_bridge("node"), "new Urho3D::Node(node)");

        let moved = mapper
            .resolve(&CppType::Reference {
                referee: Box::new(CppType::named("Node")),
                ref_kind: RefKind::RValue,
            })
            .unwrap();
        assert_eq!(moved.native_to_bridge("node"), "new Urho3D::Node(node)");
    }

    #[test]
    fn test_names_resolve_from_the_innermost_scope() {
        let (rules, symbols) = fixture();

        let unscoped = TypeMapper::new(&rules, &symbols);
        assert!(!unscoped.is_acceptable_type(&CppType::named("Node")));
        assert!(unscoped.is_acceptable_type(&CppType::named("Urho3D::Node")));

        let scoped = TypeMapper::new(&rules, &symbols).in_scope("Urho3D::Scene");
        assert!(scoped.is_acceptable_type(&CppType::named("Node")));
        assert!(scoped.find_symbol("::Urho3D::Node").is_some());
    }

    #[test]
    fn test_members_do_not_shadow_types() {
        let (rules, mut symbols) = fixture();
        let node = symbols.get("Urho3D::Node").unwrap();
        let ctor =
            MetaEntity::new(EntityKind::Constructor, "Node", "Urho3D::Node::Node").into_ref();
        add_child(&node, ctor.clone());
        symbols.insert("Urho3D::Node::Node", &ctor);

        let mapper = TypeMapper::new(&rules, &symbols).in_scope("Urho3D::Node");
        let found = mapper.find_symbol("Node").unwrap();
        assert_eq!(found.borrow().kind, EntityKind::Class);
        let pointer = mapper.resolve(&CppType::pointer(CppType::named("Node"))).unwrap();
        assert_eq!(pointer.bridge, "Urho3D::Node*");
    }

    #[test]
    fn test_smart_pointer_over_exported_class() {
        let (rules, symbols) = fixture();
        let mapper = TypeMapper::new(&rules, &symbols).in_scope("Urho3D");
        let ty = CppType::TemplateInstantiation {
            template: "SharedPtr".to_string(),
            arguments: vec![CppType::named("Node")],
        };

        assert!(mapper.is_acceptable_type(&ty));
        let info = mapper.resolve(&ty).unwrap();
        assert_eq!(info.managed, "Node");
        assert_eq!(info.bridge_to_native("node"), "SharedPtr<Urho3D::Node>(node)");
        assert_eq!(info.native_to_bridge("result"), "result.Get()");

        let unknown = CppType::TemplateInstantiation {
            template: "SharedPtr".to_string(),
            arguments: vec![CppType::named("Texture")],
        };
        assert!(!mapper.is_acceptable_type(&unknown));
    }

    #[test]
    fn test_enums_by_value_and_pointer() {
        let (rules, symbols) = fixture();
        let mapper = TypeMapper::new(&rules, &symbols).in_scope("Urho3D");

        let value = mapper.resolve(&CppType::named("BlendMode")).unwrap();
        assert_eq!(value.managed, "BlendMode");
        assert_eq!(value.bridge, "Urho3D::BlendMode");

        let pointer = mapper
            .resolve(&CppType::pointer(CppType::named("BlendMode")))
            .unwrap();
        assert_eq!(pointer.managed, "IntPtr");
    }

    #[test]
    fn test_unmappable_types_are_rejected() {
        let (rules, symbols) = fixture();
        let mapper = TypeMapper::new(&rules, &symbols).in_scope("Urho3D");

        let unknown = CppType::named("Texture");
        assert!(!mapper.is_acceptable_type(&unknown));
        assert!(mapper.resolve(&unknown).is_none());

        let auto = CppType::Unexposed {
            spelling: "auto".to_string(),
        };
        assert!(!mapper.is_acceptable_type(&auto));
    }

    #[test]
    fn test_alias_of_builtin_is_pinvokable() {
        let (rules, symbols) = fixture();
        let mapper = TypeMapper::new(&rules, &symbols);
        let alias = CppType::UserDefined {
            name: "uint".to_string(),
            canonical: Some(Box::new(CppType::builtin(BuiltinKind::UInt))),
        };

        assert!(mapper.is_acceptable_type(&alias));
        assert_eq!(mapper.to_managed_type(&alias).as_deref(), Some("uint"));
    }

    #[test]
    fn test_expired_symbols_stop_mapping() {
        let mut rules = NamespaceRules::new("Urho3D");
        let mut symbols = SymbolTable::new();
        declare(&rules, &mut symbols, EntityKind::Class, "Node");
        {
            let mapper = TypeMapper::new(&rules, &symbols).in_scope("Urho3D");
            assert!(mapper.is_acceptable_type(&CppType::named("Node")));
        }

        rules.reset_overlay();
        let mapper = TypeMapper::new(&rules, &symbols).in_scope("Urho3D");
        assert!(!mapper.is_acceptable_type(&CppType::named("Node")));
    }
}
