//! Traversal of element trees and the summaries derived from it.
//!
//! [`apply`] walks an element and everything reachable from it in pre-order,
//! handing each element to a [`FormVisitor`]. The register/variable and
//! side-effect summaries used to legalise folds are all built on top of it.

use std::collections::BTreeSet;

use crate::{
    forms::{ElementId, FormElement, FormId, FormPool, GenericOperator},
    ir::{RegSet, Register, SimpleAtom, Variable},
};

/// Receives every element reached by [`apply`].
pub trait FormVisitor {
    /// Called once per element, parents before children.
    fn visit(&mut self, pool: &FormPool, id: ElementId);
}

impl<F> FormVisitor for F
where
    F: FnMut(&FormPool, ElementId),
{
    fn visit(&mut self, pool: &FormPool, id: ElementId) {
        self(pool, id);
    }
}

/// Visits `id` and every element reachable from it, in pre-order.
pub fn apply<V: FormVisitor + ?Sized>(pool: &FormPool, id: ElementId, visitor: &mut V) {
    let mut pending = vec![id];
    while let Some(current) = pending.pop() {
        visitor.visit(pool, current);
        let children = pool.element(current).child_forms();
        // reversed so the first child form is visited first
        for form in children.into_iter().rev() {
            pending.extend(pool.elements_of(form).iter().rev().copied());
        }
    }
}

/// Visits every element reachable from the form `id`, in pre-order.
pub fn apply_form<V: FormVisitor + ?Sized>(pool: &FormPool, id: FormId, visitor: &mut V) {
    for elt in pool.elements_of(id) {
        apply(pool, *elt, visitor);
    }
}

fn atom_var(atom: &SimpleAtom, out: &mut BTreeSet<Variable>) {
    if let SimpleAtom::Var(v) = atom {
        out.insert(*v);
    }
}

fn local_vars(element: &FormElement, out: &mut BTreeSet<Variable>) {
    match element {
        FormElement::Atom(atom) => atom_var(atom, out),
        FormElement::SimpleExpression(e) => out.extend(e.expr.vars().copied()),
        FormElement::ConditionalMoveFalse(e) => {
            out.insert(e.source);
        }
        _ => {}
    }
}

/// Returns every variable read by `id` or its descendants.
#[must_use]
pub fn read_vars(pool: &FormPool, id: ElementId) -> BTreeSet<Variable> {
    let mut out = BTreeSet::new();
    apply(pool, id, &mut |pool: &FormPool, elt: ElementId| {
        local_vars(pool.element(elt), &mut out);
    });
    out
}

/// Returns every variable read inside the form `id`.
#[must_use]
pub fn read_vars_form(pool: &FormPool, id: FormId) -> BTreeSet<Variable> {
    let mut out = BTreeSet::new();
    for elt in pool.elements_of(id) {
        out.extend(read_vars(pool, *elt));
    }
    out
}

/// Returns the registers read by `id` or its descendants.
#[must_use]
pub fn read_regs(pool: &FormPool, id: ElementId) -> RegSet {
    read_vars(pool, id).iter().map(|v| v.reg).collect()
}

/// Returns the registers read inside the form `id`.
#[must_use]
pub fn read_regs_form(pool: &FormPool, id: FormId) -> RegSet {
    read_vars_form(pool, id).iter().map(|v| v.reg).collect()
}

fn local_writes(element: &FormElement) -> RegSet {
    match element {
        FormElement::SetVar(e) => RegSet::of(e.dst.reg),
        FormElement::AtomicOp(e) => e.writes,
        FormElement::FunctionCall(e) => e.writes,
        FormElement::Branch(e) => e.writes,
        FormElement::Divide(_) => [Register::HI, Register::LO].into_iter().collect(),
        FormElement::ConditionalMoveFalse(e) => RegSet::of(e.dest.reg),
        FormElement::CondNoElse(e) => e.final_destination.map(|v| RegSet::of(v.reg)).unwrap_or_default(),
        FormElement::ShortCircuit(e) => e.final_result.map(|v| RegSet::of(v.reg)).unwrap_or_default(),
        _ => RegSet::new(),
    }
}

/// Returns the registers written by `id` or its descendants.
#[must_use]
pub fn modified_regs(pool: &FormPool, id: ElementId) -> RegSet {
    let mut out = RegSet::new();
    apply(pool, id, &mut |pool: &FormPool, elt: ElementId| {
        out.union_with(&local_writes(pool.element(elt)));
    });
    out
}

/// Returns the registers written inside the form `id`.
#[must_use]
pub fn modified_regs_form(pool: &FormPool, id: FormId) -> RegSet {
    pool.elements_of(id)
        .iter()
        .fold(RegSet::new(), |acc, elt| acc.union(modified_regs(pool, *elt)))
}

fn local_side_effect(element: &FormElement) -> bool {
    match element {
        FormElement::SetVar(_)
        | FormElement::SetFormForm(_)
        | FormElement::Store(_)
        | FormElement::FunctionCall(_)
        | FormElement::AtomicOp(_)
        | FormElement::Branch(_)
        | FormElement::Divide(_)
        | FormElement::Return(_)
        | FormElement::Break(_)
        | FormElement::ConditionalMoveFalse(_) => true,
        FormElement::Generic(e) => matches!(e.op, GenericOperator::Function(_)),
        _ => false,
    }
}

/// Returns `true` if `id` or any descendant has an observable effect.
///
/// Constants, arithmetic, casts, comparisons and loads are pure; assignments,
/// stores, calls and opaque operations are not.
#[must_use]
pub fn has_side_effects(pool: &FormPool, id: ElementId) -> bool {
    let mut found = false;
    apply(pool, id, &mut |pool: &FormPool, elt: ElementId| {
        found |= local_side_effect(pool.element(elt));
    });
    found
}

/// Returns `true` if any element of the form `id` has an observable effect.
#[must_use]
pub fn form_has_side_effects(pool: &FormPool, id: FormId) -> bool {
    pool.elements_of(id)
        .iter()
        .any(|elt| has_side_effects(pool, *elt))
}

/// Returns the registers still held open by conditions and idioms under `id`.
#[must_use]
pub fn consumed_regs(pool: &FormPool, id: ElementId) -> RegSet {
    let mut out = RegSet::new();
    apply(pool, id, &mut |pool: &FormPool, elt: ElementId| match pool.element(elt) {
        FormElement::Condition(e) => out.union_with(&e.consumed),
        FormElement::Abs(e) => out.union_with(&e.consumed),
        FormElement::Ash(e) => out.union_with(&e.consumed),
        _ => {}
    });
    out
}

/// Returns the number of elements reachable from the form `id`.
#[must_use]
pub fn count_elements(pool: &FormPool, id: FormId) -> usize {
    let mut count = 0;
    apply_form(pool, id, &mut |_: &FormPool, _: ElementId| count += 1);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        forms::{FixedOperatorKind, GenericElement, SetVarElement, SetVarInfo},
        ir::Register,
    };

    fn add(pool: &mut FormPool, a: Variable, b: i64) -> FormId {
        let a = pool.alloc_single_element_form(FormElement::Atom(a.into()));
        let b = pool.alloc_single_element_form(FormElement::Atom(SimpleAtom::Int(b)));
        pool.alloc_single_element_form(FormElement::Generic(GenericElement {
            op: GenericOperator::Fixed(FixedOperatorKind::Add),
            args: vec![a, b],
        }))
    }

    #[test]
    fn pure_arithmetic_has_no_side_effects() {
        let mut pool = FormPool::new();
        let sum = add(&mut pool, Variable::read(Register::A0, 0), 1);
        let elt = pool.elements_of(sum)[0];

        assert!(!has_side_effects(&pool, elt));
        assert_eq!(read_regs(&pool, elt), RegSet::of(Register::A0));
        assert!(modified_regs(&pool, elt).is_empty());
        assert_eq!(count_elements(&pool, sum), 3);
    }

    #[test]
    fn assignment_is_a_side_effect() {
        let mut pool = FormPool::new();
        let sum = add(&mut pool, Variable::read(Register::A0, 1), 4);
        let set = pool.alloc_element(FormElement::SetVar(SetVarElement {
            dst: Variable::write(Register::V0, 1),
            src: sum,
            sequence_point: false,
            info: SetVarInfo::empty(),
        }));

        assert!(has_side_effects(&pool, set));
        assert_eq!(modified_regs(&pool, set), RegSet::of(Register::V0));
        assert_eq!(
            read_vars(&pool, set).into_iter().collect::<Vec<_>>(),
            vec![Variable::read(Register::A0, 1)]
        );
    }

    #[test]
    fn preorder_visits_parent_first() {
        let mut pool = FormPool::new();
        let sum = add(&mut pool, Variable::read(Register::A1, 0), 2);
        let mut seen = Vec::new();
        apply_form(&pool, sum, &mut |pool: &FormPool, elt: ElementId| {
            seen.push(matches!(pool.element(elt), FormElement::Generic(_)));
        });
        assert_eq!(seen, vec![true, false, false]);
    }
}
