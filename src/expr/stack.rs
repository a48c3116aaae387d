//! The symbolic operand stack of one region.
//!
//! Entries are pending results in program order: register assignments whose
//! consumer has not been seen yet, and statements that already had their full
//! effect. Folding pops an assignment and splices its value into the consumer;
//! whatever is still on the stack when the region ends is rewritten into
//! explicit statements.
//!
//! Popped entries are only deactivated, never removed, so a failed match can
//! be rolled back to a [`Checkpoint`].

use crate::{
    forms::{
        visit::{form_has_side_effects, modified_regs, modified_regs_form, read_regs, read_regs_form},
        ElementId, FormElement, FormId, FormPool, SetVarElement, SetVarInfo,
    },
    ir::{RegSet, Register, Variable},
};

#[derive(Debug, Clone)]
struct StackEntry {
    active: bool,
    destination: Option<Variable>,
    source: Option<FormId>,
    // existing element to reuse when the entry is rewritten
    element: Option<ElementId>,
    sequence_point: bool,
    info: SetVarInfo,
    divide: bool,
}

impl StackEntry {
    fn writes(&self, pool: &FormPool) -> RegSet {
        let mut out = RegSet::new();
        if let Some(dst) = self.destination {
            out.insert(dst.reg);
        }
        if let Some(source) = self.source {
            out.union_with(&modified_regs_form(pool, source));
        } else if let Some(elt) = self.element {
            out.union_with(&modified_regs(pool, elt));
        }
        out
    }

    fn reads(&self, pool: &FormPool) -> RegSet {
        match (self.source, self.element) {
            (Some(source), _) => read_regs_form(pool, source),
            (None, Some(elt)) => read_regs(pool, elt),
            (None, None) => RegSet::new(),
        }
    }
}

/// Saved stack state, see [`FormStack::checkpoint`].
#[derive(Debug, Clone)]
pub struct Checkpoint {
    len: usize,
    active: Vec<bool>,
}

/// Pending results of a region, in program order.
#[derive(Debug, Clone, Default)]
pub struct FormStack {
    entries: Vec<StackEntry>,
}

impl FormStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        FormStack::default()
    }

    /// Returns `true` if no entry is left to rewrite.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.entries.iter().any(|e| e.active)
    }

    /// Returns the number of entries left to rewrite.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.active).count()
    }

    /// Pushes `dst = value`.
    pub fn push_value_to_reg(
        &mut self,
        dst: Variable,
        value: FormId,
        sequence_point: bool,
        info: SetVarInfo,
    ) {
        self.entries.push(StackEntry {
            active: true,
            destination: Some(dst),
            source: Some(value),
            element: None,
            sequence_point,
            info,
            divide: false,
        });
    }

    /// Pushes an existing `set!` element; its value stays poppable.
    ///
    /// Rewriting an untouched entry yields `elt` itself, which is what makes
    /// folding an already folded region a no-op.
    pub fn push_set_var(&mut self, pool: &FormPool, elt: ElementId) {
        match pool.element(elt) {
            FormElement::SetVar(set) => self.entries.push(StackEntry {
                active: true,
                destination: Some(set.dst),
                source: Some(set.src),
                element: Some(elt),
                sequence_point: set.sequence_point,
                info: set.info,
                divide: false,
            }),
            other => {
                let sequence_point = other.is_sequence_point();
                self.push_form_element(elt, sequence_point);
            }
        }
    }

    /// Pushes a statement that writes no poppable value.
    pub fn push_form_element(&mut self, elt: ElementId, sequence_point: bool) {
        self.entries.push(StackEntry {
            active: true,
            destination: None,
            source: None,
            element: Some(elt),
            sequence_point,
            info: SetVarInfo::empty(),
            divide: false,
        });
    }

    /// Pushes a division waiting for its `hi`/`lo` read.
    pub fn push_divide(&mut self, elt: ElementId) {
        self.entries.push(StackEntry {
            active: true,
            destination: None,
            source: None,
            element: Some(elt),
            sequence_point: false,
            info: SetVarInfo::empty(),
            divide: true,
        });
    }

    /// Saves the stack state so a speculative match can be undone.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.entries.len(),
            active: self.entries.iter().map(|e| e.active).collect(),
        }
    }

    /// Restores the state saved by [`FormStack::checkpoint`].
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.entries.truncate(checkpoint.len);
        for (entry, active) in self.entries.iter_mut().zip(checkpoint.active) {
            entry.active = active;
        }
    }

    /// Pops the value last assigned to `reg`.
    ///
    /// Walks down from the top. Entries above the match may only be skipped
    /// when `allow_side_effects` is set and none of them is a sequence point,
    /// and only if the popped value neither reads a register they write nor
    /// writes a register they read. The popped value must not modify a
    /// register of `barrier`.
    ///
    /// Returns `None` when the value cannot legally move; the stack is left
    /// unchanged in that case.
    pub fn pop_reg(
        &mut self,
        pool: &FormPool,
        reg: Register,
        barrier: &RegSet,
        allow_side_effects: bool,
    ) -> Option<FormId> {
        let mut skipped_writes = RegSet::new();
        let mut skipped_reads = RegSet::new();

        for i in (0..self.entries.len()).rev() {
            let entry = &self.entries[i];
            if !entry.active {
                continue;
            }

            if entry.destination.map(|d| d.reg) == Some(reg) {
                let source = entry.source?;
                if !allow_side_effects && form_has_side_effects(pool, source) {
                    return None;
                }
                let modified = modified_regs_form(pool, source);
                if modified.intersects(barrier) || modified.intersects(&skipped_reads) {
                    return None;
                }
                if read_regs_form(pool, source).intersects(&skipped_writes) {
                    return None;
                }
                if skipped_reads.contains(reg) {
                    return None;
                }
                self.entries[i].active = false;
                return Some(source);
            }

            if entry.sequence_point || !allow_side_effects {
                return None;
            }
            skipped_writes.union_with(&entry.writes(pool));
            skipped_reads.union_with(&entry.reads(pool));
        }

        None
    }

    /// Pops the closest pending division, under the same rules as [`FormStack::pop_reg`].
    pub fn pop_divide(&mut self, pool: &FormPool) -> Option<ElementId> {
        let mut skipped_writes = RegSet::new();

        for i in (0..self.entries.len()).rev() {
            let entry = &self.entries[i];
            if !entry.active {
                continue;
            }

            if entry.divide {
                let elt = entry.element?;
                if read_regs(pool, elt).intersects(&skipped_writes) {
                    return None;
                }
                self.entries[i].active = false;
                return Some(elt);
            }

            if entry.sequence_point {
                return None;
            }
            skipped_writes.union_with(&entry.writes(pool));
        }

        None
    }

    /// Pops the top entry if it assigns `reg`.
    ///
    /// Unlike [`FormStack::pop_reg`] nothing is skipped: the assignment must be
    /// the most recent entry.
    pub fn pop_top_if(&mut self, reg: Register) -> Option<FormId> {
        let top = self.entries.iter().rposition(|e| e.active)?;
        let entry = &self.entries[top];
        if entry.destination.map(|d| d.reg) != Some(reg) {
            return None;
        }
        let source = entry.source?;
        self.entries[top].active = false;
        Some(source)
    }

    /// Rewrites the remaining entries into statements, in program order.
    pub fn rewrite(self, pool: &mut FormPool) -> Vec<ElementId> {
        let mut out = Vec::new();
        for entry in self.entries.into_iter().filter(|e| e.active) {
            match (entry.element, entry.destination, entry.source) {
                (Some(elt), _, _) => out.push(elt),
                (None, Some(dst), Some(src)) => {
                    out.push(pool.alloc_element(FormElement::SetVar(SetVarElement {
                        dst,
                        src,
                        sequence_point: entry.sequence_point,
                        info: entry.info,
                    })));
                }
                _ => {}
            }
        }
        out
    }

    /// Rewrites the remaining entries into a new form; an empty stack gives `(empty)`.
    pub fn rewrite_to_form(self, pool: &mut FormPool) -> FormId {
        let elements = self.rewrite(pool);
        if elements.is_empty() {
            pool.alloc_empty_form()
        } else {
            pool.alloc_sequence_form(elements)
        }
    }
}
