//! Overlay Tree
//!
//! `MetaEntity` nodes describe the exported API surface. Parents own their
//! children; the back-link to the parent is weak so the tree never forms an
//! ownership cycle.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use crate::ast::{Access, CppType, DeclFlags, EntityKind};

pub type MetaEntityRef = Rc<RefCell<MetaEntity>>;
pub type MetaEntityWeak = Weak<RefCell<MetaEntity>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaParameter {
    pub name: String,
    pub ty: Option<CppType>,
    /// Default value as written in the header.
    pub native_default: Option<String>,
    /// Default value usable on the managed side, once resolved.
    pub default_value: Option<String>,
}

#[derive(Debug)]
pub struct MetaEntity {
    pub kind: EntityKind,
    pub name: String,
    /// Fully qualified native name, `Urho3D::Node::GetName`.
    pub symbol_name: String,
    pub access: Access,
    /// Wrapper node skipped by overlay walks; its children are still visited.
    /// The built-in raw passes never export template or friend wrappers, so
    /// only custom passes that build their own wrapper nodes set this.
    pub is_proxy: bool,
    pub flags: DeclFlags,
    pub is_constant: bool,
    pub ty: Option<CppType>,
    pub return_type: Option<CppType>,
    pub parameters: Vec<MetaParameter>,
    /// Initializer or enumerator value as written in the header.
    pub native_value: Option<String>,
    /// Compile-time value usable on the managed side.
    pub default_value: Option<String>,
    /// Name of the flat bridge function (accessor stem for variables).
    pub bridge_name: String,
    pub source_file: Option<PathBuf>,
    pub children: Vec<MetaEntityRef>,
    parent: MetaEntityWeak,
}

impl MetaEntity {
    pub fn new(kind: EntityKind, name: &str, symbol_name: &str) -> Self {
        MetaEntity {
            kind,
            name: name.to_string(),
            symbol_name: symbol_name.to_string(),
            access: Access::Public,
            is_proxy: false,
            flags: DeclFlags::empty(),
            is_constant: false,
            ty: None,
            return_type: None,
            parameters: Vec::new(),
            native_value: None,
            default_value: None,
            bridge_name: String::new(),
            source_file: None,
            children: Vec::new(),
            parent: Weak::new(),
        }
    }

    /// Root of a namespace's overlay tree.
    pub fn root() -> MetaEntityRef {
        MetaEntity::new(EntityKind::File, "", "").into_ref()
    }

    pub fn into_ref(self) -> MetaEntityRef {
        Rc::new(RefCell::new(self))
    }

    pub fn parent(&self) -> Option<MetaEntityRef> {
        self.parent.upgrade()
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(DeclFlags::STATIC)
    }

    pub fn is_virtual(&self) -> bool {
        self.flags.contains(DeclFlags::VIRTUAL)
    }

    pub fn find_child(&self, name: &str) -> Option<MetaEntityRef> {
        self.children
            .iter()
            .find(|c| c.borrow().name == name)
            .cloned()
    }

    pub fn children_of_kind(&self, kind: EntityKind) -> Vec<MetaEntityRef> {
        self.children
            .iter()
            .filter(|c| c.borrow().kind == kind)
            .cloned()
            .collect()
    }
}

/// Append `child` to `parent`, detaching it from any previous parent first.
pub fn add_child(parent: &MetaEntityRef, child: MetaEntityRef) {
    detach(&child);
    child.borrow_mut().parent = Rc::downgrade(parent);
    parent.borrow_mut().children.push(child);
}

/// Remove `child` from its parent's child list. Returns false for a root.
pub fn detach(child: &MetaEntityRef) -> bool {
    let parent = child.borrow().parent();
    let Some(parent) = parent else {
        return false;
    };
    parent
        .borrow_mut()
        .children
        .retain(|c| !Rc::ptr_eq(c, child));
    child.borrow_mut().parent = Weak::new();
    true
}

/// Enclosing entities from the outermost down, excluding the root.
pub fn ancestors(entity: &MetaEntityRef) -> Vec<MetaEntityRef> {
    let mut chain = Vec::new();
    let mut current = entity.borrow().parent();
    while let Some(node) = current {
        current = node.borrow().parent();
        if current.is_some() {
            chain.push(node);
        }
    }
    chain.reverse();
    chain
}

/// Names of the enclosing classes, outermost first, ending with `entity` itself
/// when it is a class.
pub fn class_path(entity: &MetaEntityRef) -> Vec<String> {
    let mut path: Vec<String> = ancestors(entity)
        .iter()
        .filter(|a| a.borrow().kind == EntityKind::Class)
        .map(|a| a.borrow().name.clone())
        .collect();
    if entity.borrow().kind == EntityKind::Class {
        path.push(entity.borrow().name.clone());
    }
    path
}

/// Native namespaces enclosing `entity` below the module namespace,
/// outermost first. A top-level namespace named like the module is the module
/// namespace itself.
pub fn managed_namespace(entity: &MetaEntityRef, module: &str) -> Vec<String> {
    let chain = ancestors(entity);
    let mut names: Vec<String> = chain
        .iter()
        .filter(|a| a.borrow().kind == EntityKind::Namespace)
        .map(|a| a.borrow().name.clone())
        .collect();
    let top_is_module = chain.first().map_or(false, |top| {
        let top = top.borrow();
        top.kind == EntityKind::Namespace && top.name == module
    });
    if top_is_module {
        names.remove(0);
    }
    names
}

/// Count every node below `root`, for diagnostics.
pub fn count_nodes(root: &MetaEntityRef) -> usize {
    root.borrow()
        .children
        .iter()
        .map(|c| 1 + count_nodes(c))
        .sum()
}
