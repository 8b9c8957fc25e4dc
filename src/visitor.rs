use crate::ast::{AstEntity, EntityKind, TranslationUnit};
use crate::overlay::MetaEntityRef;
use crate::pass::{ApiPass, CppPass, PassContext, VisitEvent, VisitorInfo};

/// Walks the native AST of one translation unit.
///
/// Rules:
/// 1. Pre-order, children in declaration order.
/// 2. The file root and template/friend proxies never reach the pass, but
///    their children are still walked.
/// 3. A container's exit event follows its enter event even when the pass
///    declined to descend.
pub fn walk_translation_unit<P: CppPass + ?Sized>(
    pass: &mut P,
    ctx: &mut PassContext<'_>,
    unit: &TranslationUnit,
) {
    walk_entity(pass, ctx, &unit.root);
}

pub fn walk_entity<P: CppPass + ?Sized>(
    pass: &mut P,
    ctx: &mut PassContext<'_>,
    entity: &AstEntity,
) {
    if entity.kind == EntityKind::File || entity.is_proxy() {
        walk_children(pass, ctx, &entity.children);
        return;
    }

    if entity.kind.is_container() {
        let enter = VisitorInfo::new(VisitEvent::ContainerEnter, entity.access);
        if pass.visit(ctx, entity, enter) {
            walk_children(pass, ctx, &entity.children);
        }
        let exit = VisitorInfo::new(VisitEvent::ContainerExit, entity.access);
        pass.visit(ctx, entity, exit);
    } else {
        pass.visit(ctx, entity, VisitorInfo::new(VisitEvent::Leaf, entity.access));
    }
}

pub fn walk_children<P: CppPass + ?Sized>(
    pass: &mut P,
    ctx: &mut PassContext<'_>,
    children: &[AstEntity],
) {
    for child in children {
        walk_entity(pass, ctx, child);
    }
}

/// Walks an overlay tree.
///
/// Rules:
/// 1. Containers get an enter event; if the pass returns true their children
///    are walked, followed by an exit event.
/// 2. Children are walked from a snapshot taken after the enter event, so a
///    pass may add, move or remove children of the node it is visiting.
/// 3. Proxy nodes are never visited; their children are.
pub fn walk_overlay<P: ApiPass + ?Sized>(
    pass: &mut P,
    ctx: &mut PassContext<'_>,
    entity: &MetaEntityRef,
) {
    let (kind, access, is_proxy) = {
        let e = entity.borrow();
        (e.kind, e.access, e.is_proxy)
    };

    if is_proxy {
        walk_overlay_children(pass, ctx, entity);
        return;
    }

    if kind.is_container() {
        let enter = VisitorInfo::new(VisitEvent::ContainerEnter, access);
        if pass.visit(ctx, entity, enter) {
            walk_overlay_children(pass, ctx, entity);
            let exit = VisitorInfo::new(VisitEvent::ContainerExit, access);
            pass.visit(ctx, entity, exit);
        }
    } else {
        pass.visit(ctx, entity, VisitorInfo::new(VisitEvent::Leaf, access));
    }
}

fn walk_overlay_children<P: ApiPass + ?Sized>(
    pass: &mut P,
    ctx: &mut PassContext<'_>,
    entity: &MetaEntityRef,
) {
    let snapshot = entity.borrow().children.clone();
    for child in &snapshot {
        walk_overlay(pass, ctx, child);
    }
}
