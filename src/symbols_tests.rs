#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::rc::Rc;

    use crate::ast::EntityKind;
    use crate::overlay::{add_child, MetaEntity, MetaEntityRef};
    use crate::symbols::{ConstantSource, SymbolTable};

    fn node(parent: &MetaEntityRef, kind: EntityKind, name: &str) -> MetaEntityRef {
        let symbol = {
            let p = parent.borrow();
            if p.symbol_name.is_empty() {
                name.to_string()
            } else {
                format!("{}::{}", p.symbol_name, name)
            }
        };
        let entity = MetaEntity::new(kind, name, &symbol).into_ref();
        add_child(parent, entity.clone());
        entity
    }

    #[test]
    fn test_lookup_is_weak() {
        let mut symbols = SymbolTable::new();
        {
            let root = MetaEntity::root();
            let class = node(&root, EntityKind::Class, "Node");
            symbols.insert("Node", &class);
            assert!(symbols.contains("Node"));
        }
        assert!(!symbols.contains("Node"));
        assert!(symbols.get("Node").is_none());
        assert_eq!(symbols.len(), 1);
    }

    #[test]
    fn test_prune_expired_drops_dead_entries() {
        let mut symbols = SymbolTable::new();
        let root = MetaEntity::root();
        let kept = node(&root, EntityKind::Class, "Kept");
        symbols.insert("Kept", &kept);
        {
            let gone = MetaEntity::new(EntityKind::Class, "Gone", "Gone").into_ref();
            symbols.insert("Gone", &gone);
        }

        assert_eq!(symbols.prune_expired(), 1);
        assert_eq!(symbols.len(), 1);
        assert!(symbols.contains("Kept"));
        assert_eq!(symbols.prune_expired(), 0);
    }

    #[test]
    fn test_later_insert_replaces_earlier() {
        let mut symbols = SymbolTable::new();
        let root = MetaEntity::root();
        let first = node(&root, EntityKind::Class, "A");
        let second = node(&root, EntityKind::Enum, "A");
        symbols.insert("A", &first);
        symbols.insert("A", &second);

        let found = symbols.get("A").unwrap();
        assert!(Rc::ptr_eq(&found, &second));
    }

    #[test]
    fn test_remap_wins_over_symbol() {
        let mut symbols = SymbolTable::new();
        let root = MetaEntity::root();
        let ns = node(&root, EntityKind::Namespace, "Urho3D");
        let value = node(&ns, EntityKind::EnumValue, "M_MAX");
        symbols.insert("Urho3D::M_MAX", &value);

        let mut remaps = HashMap::new();
        remaps.insert("Urho3D::M_MAX".to_string(), "int.MaxValue".to_string());

        let resolved = symbols
            .resolve_constant(&remaps, Some(&ns), "M_MAX")
            .unwrap();
        assert_eq!(resolved.value, "int.MaxValue");
        assert!(matches!(resolved.source, ConstantSource::Remap));
    }

    #[test]
    fn test_walks_enclosing_scopes_outwards() {
        let mut symbols = SymbolTable::new();
        let root = MetaEntity::root();
        let ns = node(&root, EntityKind::Namespace, "Urho3D");
        let class = node(&ns, EntityKind::Class, "Foo");
        let method = node(&class, EntityKind::MemberFunction, "Scale");
        let constant = node(&class, EntityKind::MemberVariable, "kX");
        symbols.insert("Urho3D::Foo::kX", &constant);

        let resolved = symbols
            .resolve_constant(&HashMap::new(), Some(&method), "kX")
            .unwrap();
        assert_eq!(resolved.value, "Urho3D::Foo::kX");
        match resolved.source {
            ConstantSource::Symbol(entity) => assert!(Rc::ptr_eq(&entity, &constant)),
            ConstantSource::Remap => panic!("expected a symbol"),
        }
    }

    #[test]
    fn test_qualified_name_found_directly() {
        let mut symbols = SymbolTable::new();
        let root = MetaEntity::root();
        let ns = node(&root, EntityKind::Namespace, "Urho3D");
        let class = node(&ns, EntityKind::Class, "Foo");
        let constant = node(&class, EntityKind::MemberVariable, "kDefault");
        symbols.insert("Urho3D::Foo::kDefault", &constant);

        let resolved = symbols
            .resolve_constant(&HashMap::new(), Some(&ns), "Foo::kDefault")
            .unwrap();
        assert_eq!(resolved.value, "Urho3D::Foo::kDefault");
    }

    #[test]
    fn test_root_candidate_is_global_qualified() {
        let root = MetaEntity::root();
        let ns = node(&root, EntityKind::Namespace, "Urho3D");

        let mut remaps = HashMap::new();
        remaps.insert("::PI".to_string(), "3.14f".to_string());

        let symbols = SymbolTable::new();
        let resolved = symbols
            .resolve_constant(&remaps, Some(&ns), "PI")
            .unwrap();
        assert_eq!(resolved.value, "3.14f");
    }

    #[test]
    fn test_unresolved_constant_reports_none() {
        let root = MetaEntity::root();
        let ns = node(&root, EntityKind::Namespace, "Urho3D");
        let symbols = SymbolTable::new();

        assert!(symbols
            .resolve_constant(&HashMap::new(), Some(&ns), "Missing")
            .is_none());
        assert!(symbols
            .resolve_constant(&HashMap::new(), None, "Missing")
            .is_none());
    }
}
