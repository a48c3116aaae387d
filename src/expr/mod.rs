//! Expression folding: the push/fold protocol over a symbolic operand stack.
//!
//! A [`Folder`] owns the node arena of one function and turns atomic
//! operations into elements, one at a time and in program order. Each
//! operation first tries to pop the values of the registers it consumes from a
//! [`FormStack`], splicing them into its own element, and then pushes its
//! result. Whatever cannot move stays on the stack and becomes an explicit
//! `set!` when the region is rewritten.
//!
//! # Architecture
//!
//! - [`stack`] - the operand stack and its legality rules
//! - `push` - per-operator fold rules, tried in a fixed order
//! - `coerce` - operand types and cast insertion
//!
//! Fold rules never fail on a non-match: an operation without a rule is kept
//! as an opaque wrapper of itself. The only fold errors are bookkeeping
//! inconsistencies, reported as [`Error::FoldInvariant`](crate::Error::FoldInvariant).
//!
//! # Example
//!
//! ```rust
//! use formscope::engine::{EngineConfig, EventLog};
//! use formscope::expr::{Folder, FormStack};
//! use formscope::ir::{ExprKind, FunctionBuilder, Register};
//! use formscope::types::StaticTypeEnv;
//!
//! let mut b = FunctionBuilder::new("add");
//! b.set(Register::V0, ExprKind::Add, [Register::A0.into(), Register::A1.into()]);
//! let function = b.finish()?;
//! let env = StaticTypeEnv::new(&function);
//! let config = EngineConfig::default();
//! let events = EventLog::new();
//!
//! let mut folder = Folder::new(&function, &env, &config, &events);
//! let mut stack = FormStack::new();
//! folder.push_instruction(0, &mut stack)?;
//! assert_eq!(stack.len(), 1);
//! # Ok::<(), formscope::Error>(())
//! ```

mod coerce;
mod push;
pub mod stack;

pub use stack::{Checkpoint, FormStack};

use std::slice;

use crate::{
    engine::{EngineConfig, EventKind, EventLog},
    forms::{
        ElementId, FixedOperatorKind, FormElement, FormId, FormPool, GenericElement,
        GenericOperator, Renderer,
    },
    ir::{Function, RegSet, Register, SimpleAtom},
    types::TypeEnv,
};

/// Builds the elements of one function.
pub struct Folder<'a> {
    pool: FormPool,
    function: &'a Function,
    env: &'a dyn TypeEnv,
    config: &'a EngineConfig,
    events: &'a EventLog,
    live_after: Vec<RegSet>,
    verbatim: bool,
}

impl<'a> Folder<'a> {
    /// Creates a folder for `function` with an empty arena.
    #[must_use]
    pub fn new(
        function: &'a Function,
        env: &'a dyn TypeEnv,
        config: &'a EngineConfig,
        events: &'a EventLog,
    ) -> Self {
        Folder {
            pool: FormPool::new(),
            function,
            env,
            config,
            events,
            live_after: crate::ir::liveness::live_after(function),
            verbatim: false,
        }
    }

    /// The arena holding everything built so far.
    #[must_use]
    pub fn pool(&self) -> &FormPool {
        &self.pool
    }

    /// Mutable access to the arena.
    pub fn pool_mut(&mut self) -> &mut FormPool {
        &mut self.pool
    }

    /// Consumes the folder, returning its arena.
    #[must_use]
    pub fn into_pool(self) -> FormPool {
        self.pool
    }

    /// The function being reconstructed.
    #[must_use]
    pub fn function(&self) -> &'a Function {
        self.function
    }

    /// The type environment.
    #[must_use]
    pub fn env(&self) -> &'a dyn TypeEnv {
        self.env
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    /// Switches verbatim mode, returning the previous setting.
    ///
    /// In verbatim mode nothing is popped and every operation becomes the
    /// unfolded element of itself. Used for unreachable code.
    pub fn set_verbatim(&mut self, verbatim: bool) -> bool {
        std::mem::replace(&mut self.verbatim, verbatim)
    }

    /// Returns `true` while in verbatim mode.
    #[must_use]
    pub fn is_verbatim(&self) -> bool {
        self.verbatim
    }

    /// Registers instruction `idx` reads for the last time.
    #[must_use]
    pub fn consumed(&self, idx: usize) -> RegSet {
        if self.verbatim {
            return RegSet::new();
        }
        self.function
            .instructions
            .get(idx)
            .map(|instr| instr.consumed)
            .unwrap_or_default()
    }

    pub(crate) fn is_live_after(&self, idx: usize, reg: Register) -> bool {
        self.live_after
            .get(idx)
            .map_or(true, |live| live.contains(reg))
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub(crate) fn note(&self, kind: EventKind, idx: usize, message: impl Into<String>) {
        self.events
            .record(kind)
            .function(&self.function.name)
            .at(idx)
            .message(message);
    }

    pub(crate) fn warn(&self, idx: usize, message: impl Into<String>) {
        self.note(EventKind::Warning, idx, message);
    }

    /// Renders `form` flat, for event messages.
    pub(crate) fn describe(&self, form: FormId) -> String {
        Renderer::new(&self.pool, self.function, self.env, &self.config.operators)
            .render_form(form)
            .to_string()
    }

    /// Renders the element `elt` flat, for event messages and tests.
    pub(crate) fn describe_element(&self, elt: ElementId) -> String {
        Renderer::new(&self.pool, self.function, self.env, &self.config.operators)
            .render_element(elt)
            .to_string()
    }

    // ========================================================================
    // Allocation helpers
    // ========================================================================

    pub(crate) fn element_form(&mut self, element: FormElement) -> FormId {
        self.pool.alloc_single_element_form(element)
    }

    /// Allocates an atom, turning labels with known string content into strings.
    pub(crate) fn atom_form(&mut self, atom: &SimpleAtom) -> FormId {
        if let SimpleAtom::Label(label) = atom {
            if let Some(text) = self.env.label_string(label) {
                return self.element_form(FormElement::StringConstant(text));
            }
        }
        self.element_form(FormElement::Atom(atom.clone()))
    }

    pub(crate) fn fixed(&mut self, kind: FixedOperatorKind, args: Vec<FormId>) -> FormId {
        self.element_form(FormElement::Generic(GenericElement {
            op: GenericOperator::Fixed(kind),
            args,
        }))
    }

    /// The element of a single-element form.
    pub(crate) fn single(&self, form: FormId) -> Option<(ElementId, &FormElement)> {
        self.pool
            .try_as_single_element(form)
            .map(|elt| (elt, self.pool.element(elt)))
    }

    // ========================================================================
    // Popping operands
    // ========================================================================

    /// Pops the values of the consumed registers among `atoms`.
    ///
    /// Returns one form per atom and whether it came off the stack. Atoms are
    /// popped last to first so the stack unwinds in order. A register named by
    /// two atoms is never popped, and a popped value may not modify the
    /// register of another atom.
    pub(crate) fn pop_atoms_marked(
        &mut self,
        idx: usize,
        atoms: &[SimpleAtom],
        stack: &mut FormStack,
        allow_side_effects: bool,
    ) -> Vec<(FormId, bool)> {
        let consumed = self.consumed(idx);
        self.pop_atoms_consumed(idx, atoms, consumed, stack, allow_side_effects)
    }

    /// Like [`Folder::pop_atoms_marked`], for operands whose last reads are
    /// spread over several instructions. `consumed` replaces the consumed set
    /// of `idx`.
    pub(crate) fn pop_atoms_consumed(
        &mut self,
        idx: usize,
        atoms: &[SimpleAtom],
        consumed: RegSet,
        stack: &mut FormStack,
        allow_side_effects: bool,
    ) -> Vec<(FormId, bool)> {
        if self.verbatim {
            return atoms.iter().map(|atom| (self.atom_form(atom), false)).collect();
        }
        let regs: Vec<Option<Register>> = atoms.iter().map(|a| a.as_var().map(|v| v.reg)).collect();
        let mut popped: Vec<Option<FormId>> = vec![None; atoms.len()];

        for i in (0..atoms.len()).rev() {
            let Some(reg) = regs[i] else {
                continue;
            };
            if !consumed.contains(reg) || regs.iter().filter(|r| **r == Some(reg)).count() > 1 {
                continue;
            }
            let barrier: RegSet = regs
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .filter_map(|(_, r)| *r)
                .collect();
            popped[i] = stack.pop_reg(&self.pool, reg, &barrier, allow_side_effects);
            if let Some(form) = popped[i] {
                let message = format!("{reg} <- {}", self.describe(form));
                self.note(EventKind::ExpressionFolded, idx, message);
            }
        }

        atoms
            .iter()
            .zip(popped)
            .map(|(atom, form)| match form {
                Some(form) => (form, true),
                None => (self.atom_form(atom), false),
            })
            .collect()
    }

    /// Pops the values of the consumed registers among `atoms`, see
    /// [`Folder::pop_atoms_marked`].
    pub(crate) fn pop_atoms(
        &mut self,
        idx: usize,
        atoms: &[SimpleAtom],
        stack: &mut FormStack,
        allow_side_effects: bool,
    ) -> Vec<FormId> {
        self.pop_atoms_marked(idx, atoms, stack, allow_side_effects)
            .into_iter()
            .map(|(form, _)| form)
            .collect()
    }

    /// Pops the value of a single atom.
    pub(crate) fn pop_atom(
        &mut self,
        idx: usize,
        atom: &SimpleAtom,
        stack: &mut FormStack,
        allow_side_effects: bool,
    ) -> FormId {
        let forms = self.pop_atoms(idx, slice::from_ref(atom), stack, allow_side_effects);
        forms[0]
    }
}
