//! Reconstructed expression and statement trees.
//!
//! This module holds the node model the engine builds:
//!
//! - [`FormPool`] - the per-function arena, with [`ElementId`] / [`FormId`] handles
//! - [`FormElement`] - one expression or statement, a tagged sum type
//! - [`Form`] - an ordered sequence of elements, the implicit `begin`
//! - [`GenericOperator`] / [`OperatorTable`] - operators of n-ary elements and their names
//! - [`visit`] - pre-order traversal and the derived register/side-effect summaries
//! - [`Renderer`] / [`Sexp`] - textual rendering in value and condition context
//!
//! # Ownership
//!
//! Elements never own each other. Children are [`FormId`]s into the same pool
//! and parents are reachable through back links, so a tree is simply a set of
//! pool slots. The whole pool is released when the reconstruction is dropped.
//!
//! # Example
//!
//! ```rust
//! use formscope::forms::{FixedOperatorKind, FormElement, FormPool, GenericElement, GenericOperator};
//! use formscope::ir::SimpleAtom;
//!
//! let mut pool = FormPool::new();
//! let a = pool.alloc_single_element_form(FormElement::Atom(SimpleAtom::Int(1)));
//! let b = pool.alloc_single_element_form(FormElement::Atom(SimpleAtom::Int(2)));
//! let sum = pool.alloc_single_element_form(FormElement::Generic(GenericElement {
//!     op: GenericOperator::Fixed(FixedOperatorKind::Add),
//!     args: vec![a, b],
//! }));
//! assert_eq!(pool.parent_element(a), pool.try_as_single_element(sum));
//! ```

mod arena;
mod element;
mod form;
mod operator;
mod render;
pub mod visit;

pub use arena::{ElementId, FormId, FormPool};
pub use element::{
    AbsElement, AshElement, AtomicOpElement, BranchElement, CastElement, CondEntry,
    CondNoElseElement, CondNoElseEntry, CondWithElseElement, ConditionElement,
    ConditionalMoveFalseElement, DerefElement, DerefToken, DivideElement, ExitElement,
    FormElement, FunctionCallElement, GenericElement, LoadSourceElement, LoopElement,
    SetFormFormElement, SetVarElement, SetVarInfo, ShortCircuitElement, ShortCircuitEntry,
    ShortCircuitKind, SimpleExpressionElement, StoreElement, TypeOfElement,
};
pub use form::Form;
pub use operator::{FixedOperatorKind, GenericOperator, OperatorTable};
pub use render::{load_name, store_name, Renderer, Sexp};
