//! Per-operator fold rules.
//!
//! [`Folder::push_instruction`] dispatches on the operation kind. Within one
//! kind the rules are tried in a fixed order and the first match wins:
//!
//! 1. exact shapes (constant arithmetic, label addresses, `hi`/`lo` reads,
//!    sign extension, boolean and min/max conditional moves)
//! 2. the generic rule for the kind, popping consumed operands
//! 3. an opaque wrapper of the operation itself

use std::slice;

use crate::{
    engine::{EventKind, IdiomSet},
    expr::{Folder, FormStack},
    forms::{
        AtomicOpElement, BranchElement, CastElement, ConditionElement,
        ConditionalMoveFalseElement, DerefElement, DerefToken, DivideElement, ElementId,
        FixedOperatorKind, FormElement, FormId, FunctionCallElement, GenericElement,
        GenericOperator, LoadSourceElement, SetFormFormElement, SetVarElement, SetVarInfo,
        SimpleExpressionElement, StoreElement,
    },
    ir::{
        AtomicOp, ConditionKind, ExprKind, LoadKind, RegSet, Register, SimpleAtom,
        SimpleExpression, StoreKind, Variable,
    },
    types::TypeSpec,
    Error, Result,
};

impl Folder<'_> {
    /// Folds instruction `idx` into `stack`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for an out of range index,
    /// [`Error::MalformedInput`] for an operation with the wrong operand count,
    /// and [`Error::FoldInvariant`] when a fold matched but the consumed
    /// registers disagree with it.
    pub fn push_instruction(&mut self, idx: usize, stack: &mut FormStack) -> Result<()> {
        let function = self.function;
        let op = &function.instruction(idx)?.op;
        self.push_op(idx, op, stack)
    }

    /// Folds `op`, attributed to instruction `idx`, into `stack`.
    ///
    /// Delay-slot operations are pushed through here with the index of their
    /// branch.
    ///
    /// # Errors
    ///
    /// See [`Folder::push_instruction`].
    pub fn push_op(&mut self, idx: usize, op: &AtomicOp, stack: &mut FormStack) -> Result<()> {
        if op.is_nop() {
            return Ok(());
        }
        if self.verbatim {
            self.push_verbatim(idx, op, stack);
            return Ok(());
        }

        match op {
            AtomicOp::SetVar { dst, src } => {
                let value = self.fold_expression(idx, src, stack)?;
                let info = self.set_info(idx, *dst, Some(src));
                self.push_value(*dst, value, info, stack);
            }
            AtomicOp::SetCondition { dst, condition } => {
                let value = self.build_condition(idx, condition.kind, &condition.args, false, stack, true);
                let info = self.set_info(idx, *dst, None);
                self.push_value(*dst, value, info, stack);
            }
            AtomicOp::Load {
                dst,
                base,
                offset,
                size,
                kind,
            } => {
                let value = self.fold_load(idx, base, *offset, *size, *kind, stack);
                let info = self.set_info(idx, *dst, None);
                self.push_value(*dst, value, info, stack);
            }
            AtomicOp::Store {
                base,
                offset,
                value,
                size,
                kind,
            } => self.push_store(idx, base, *offset, value, *size, *kind, stack),
            AtomicOp::Divide { a, b, signed } => {
                let args = self.pop_atoms(idx, &[a.clone(), b.clone()], stack, true);
                let elt = self.pool.alloc_element(FormElement::Divide(DivideElement {
                    a: args[0],
                    b: args[1],
                    signed: *signed,
                    idx,
                }));
                if self.config.allows(IdiomSet::DIVISION) {
                    stack.push_divide(elt);
                } else {
                    stack.push_form_element(elt, true);
                }
            }
            AtomicOp::FloatCompare { kind, a, b } => {
                if self.config.allows(IdiomSet::FLOAT_COMPARE) {
                    let cond = self.build_condition(idx, *kind, &[a.clone(), b.clone()], false, stack, true);
                    stack.push_value_to_reg(
                        Variable::write(Register::FCC, idx),
                        cond,
                        false,
                        SetVarInfo::empty(),
                    );
                } else {
                    self.push_opaque(idx, op, stack);
                }
            }
            AtomicOp::Call {
                function,
                args,
                result,
            } => self.push_call(idx, *function, args, *result, stack),
            AtomicOp::ConditionalMove {
                dst,
                src,
                test,
                on_zero,
            } => self.push_cmove(idx, op, *dst, src, *test, *on_zero, stack)?,
            AtomicOp::Branch(_) => {
                let elt = self.pool.alloc_element(FormElement::Branch(BranchElement {
                    idx,
                    writes: op.writes(),
                }));
                stack.push_form_element(elt, true);
                self.note(EventKind::OpaqueOperation, idx, op.to_string());
            }
            AtomicOp::Special(_) | AtomicOp::Asm { .. } => self.push_opaque(idx, op, stack),
        }
        Ok(())
    }

    /// Pushes `dst = value`; the entry is a sequence point if `value` has effects.
    pub(crate) fn push_value(&mut self, dst: Variable, value: FormId, info: SetVarInfo, stack: &mut FormStack) {
        let sequence_point = crate::forms::visit::form_has_side_effects(&self.pool, value);
        stack.push_value_to_reg(dst, value, sequence_point, info);
    }

    fn set_info(&self, idx: usize, dst: Variable, src: Option<&SimpleExpression>) -> SetVarInfo {
        let mut info = SetVarInfo::empty();
        let identity = src.and_then(SimpleExpression::as_identity);
        if !self.is_live_after(idx, dst.reg) {
            info |= SetVarInfo::DEAD_SET;
            if identity.is_some_and(SimpleAtom::is_false) {
                info |= SetVarInfo::DEAD_FALSE;
            }
        }
        if let Some(SimpleAtom::Var(var)) = identity {
            if var.reg == dst.reg {
                info |= SetVarInfo::ELIMINATED_COLORING_MOVE;
            }
        }
        info
    }

    fn push_opaque(&mut self, idx: usize, op: &AtomicOp, stack: &mut FormStack) {
        let elt = self.pool.alloc_element(FormElement::AtomicOp(AtomicOpElement {
            idx,
            writes: op.writes(),
        }));
        stack.push_form_element(elt, true);
        self.note(EventKind::OpaqueOperation, idx, op.to_string());
    }

    fn push_verbatim(&mut self, idx: usize, op: &AtomicOp, stack: &mut FormStack) {
        let element = match op {
            AtomicOp::SetVar { dst, src } => {
                let value = self.element_form(FormElement::SimpleExpression(SimpleExpressionElement {
                    expr: src.clone(),
                    idx,
                }));
                FormElement::SetVar(SetVarElement {
                    dst: *dst,
                    src: value,
                    sequence_point: true,
                    info: SetVarInfo::empty(),
                })
            }
            AtomicOp::Call { .. } => FormElement::FunctionCall(FunctionCallElement {
                idx,
                writes: op.writes(),
            }),
            AtomicOp::Store { .. } => FormElement::Store(StoreElement { idx }),
            AtomicOp::Branch(_) => FormElement::Branch(BranchElement {
                idx,
                writes: op.writes(),
            }),
            _ => FormElement::AtomicOp(AtomicOpElement {
                idx,
                writes: op.writes(),
            }),
        };
        let elt = self.pool.alloc_element(element);
        stack.push_form_element(elt, true);
    }

    // ========================================================================
    // Register transfers
    // ========================================================================

    fn fold_expression(&mut self, idx: usize, expr: &SimpleExpression, stack: &mut FormStack) -> Result<FormId> {
        if expr.args.len() != expr.kind.arg_count() {
            return Err(Error::MalformedInput(format!(
                "{}: instruction {idx}: {} takes {} operands, got {}",
                self.function.name,
                expr.kind,
                expr.kind.arg_count(),
                expr.args.len()
            )));
        }
        if let Some(atom) = expr.as_identity() {
            return Ok(self.fold_identity(idx, atom, stack));
        }
        if let Some(form) = self.fold_constant(idx, expr) {
            return Ok(form);
        }

        let args = self.pop_atoms(idx, &expr.args, stack, true);
        let form = match expr.kind {
            ExprKind::Identity => args[0],
            ExprKind::GprToFpr | ExprKind::FprToGpr => {
                if self.form_type(args[0]).is_some_and(|t| t.is_float()) {
                    args[0]
                } else {
                    let marker = if expr.kind == ExprKind::GprToFpr {
                        FixedOperatorKind::GprToFpr
                    } else {
                        FixedOperatorKind::FprToGpr
                    };
                    self.fixed(marker, args)
                }
            }
            ExprKind::Add => self.binary_matching(idx, FixedOperatorKind::Add, args),
            ExprKind::Sub => {
                if expr.args[0].as_int() == Some(0) {
                    self.fixed(FixedOperatorKind::Sub, vec![args[1]])
                } else {
                    self.binary_matching(idx, FixedOperatorKind::Sub, args)
                }
            }
            ExprKind::And => self.binary_matching(idx, FixedOperatorKind::LogAnd, args),
            ExprKind::Or => self.binary_matching(idx, FixedOperatorKind::LogIor, args),
            ExprKind::Xor => self.binary_matching(idx, FixedOperatorKind::LogXor, args),
            ExprKind::Nor => {
                if expr.args[1].as_int() == Some(0) {
                    self.fixed(FixedOperatorKind::LogNot, vec![args[0]])
                } else {
                    self.binary_matching(idx, FixedOperatorKind::LogNor, args)
                }
            }
            ExprKind::MulSigned => {
                let args = self.force_integer(idx, args, true);
                self.fixed(FixedOperatorKind::Mul, args)
            }
            ExprKind::MulUnsigned => {
                let args = self.force_integer(idx, args, false);
                self.fixed(FixedOperatorKind::Mul, args)
            }
            ExprKind::Neg | ExprKind::NegFloat => self.fixed(FixedOperatorKind::Sub, args),
            ExprKind::AddFloat => self.fixed(FixedOperatorKind::Add, args),
            ExprKind::SubFloat => self.fixed(FixedOperatorKind::Sub, args),
            ExprKind::MulFloat => self.fixed(FixedOperatorKind::Mul, args),
            ExprKind::DivFloat => self.fixed(FixedOperatorKind::Div, args),
            ExprKind::MinFloat => self.fixed(FixedOperatorKind::FloatMin, args),
            ExprKind::MaxFloat => self.fixed(FixedOperatorKind::FloatMax, args),
            ExprKind::AbsFloat => self.fixed(FixedOperatorKind::FloatAbs, args),
            ExprKind::SqrtFloat => self.fixed(FixedOperatorKind::Sqrt, args),
            ExprKind::IntToFloat => self.numeric_cast(TypeSpec::Float, args[0]),
            ExprKind::FloatToInt => self.numeric_cast(TypeSpec::Int, args[0]),
            ExprKind::LogNot => self.fixed(FixedOperatorKind::LogNot, args),
            ExprKind::LeftShift => self.fixed(FixedOperatorKind::Shl, args),
            ExprKind::RightShiftArith => self
                .fold_extension(idx, &expr.args[1], args[0], true)
                .unwrap_or_else(|| self.fixed(FixedOperatorKind::Sar, args)),
            ExprKind::RightShiftLogic => self
                .fold_extension(idx, &expr.args[1], args[0], false)
                .unwrap_or_else(|| self.fixed(FixedOperatorKind::Shr, args)),
            ExprKind::LessThanSigned => self.binary_matching(idx, FixedOperatorKind::SetOnLessThan, args),
            ExprKind::LessThanUnsigned => {
                self.binary_matching(idx, FixedOperatorKind::SetOnLessThanUnsigned, args)
            }
        };
        Ok(form)
    }

    fn binary_matching(&mut self, idx: usize, kind: FixedOperatorKind, mut args: Vec<FormId>) -> FormId {
        if args.len() == 2 {
            args[1] = self.match_signedness(idx, args[0], args[1]);
        }
        self.fixed(kind, args)
    }

    fn numeric_cast(&mut self, ty: TypeSpec, source: FormId) -> FormId {
        self.element_form(FormElement::Cast(CastElement {
            ty,
            source,
            numeric: true,
        }))
    }

    /// Reads of registers and constants.
    fn fold_identity(&mut self, idx: usize, atom: &SimpleAtom, stack: &mut FormStack) -> FormId {
        match atom {
            SimpleAtom::Var(var) if var.reg == Register::HI || var.reg == Register::LO => {
                if self.config.allows(IdiomSet::DIVISION) {
                    if let Some(elt) = stack.pop_divide(&self.pool) {
                        return self.fold_division(idx, elt, var.reg == Register::HI);
                    }
                    self.warn(idx, format!("{} read without a pending division", var.reg));
                }
                self.atom_form(atom)
            }
            _ => self.pop_atom(idx, atom, stack, true),
        }
    }

    /// `lo` is the quotient, `hi` the remainder.
    fn fold_division(&mut self, idx: usize, elt: ElementId, remainder: bool) -> FormId {
        let FormElement::Divide(div) = self.pool.element(elt).clone() else {
            return self.pool.alloc_single_form(elt);
        };
        let args = self.force_integer(div.idx, vec![div.a, div.b], div.signed);
        let op = if remainder {
            FixedOperatorKind::Mod
        } else {
            FixedOperatorKind::Div
        };
        self.pool.replace_element(
            elt,
            FormElement::Generic(GenericElement {
                op: GenericOperator::Fixed(op),
                args,
            }),
        );
        let form = self.pool.alloc_single_form(elt);
        let message = self.describe(form);
        self.note(EventKind::ExpressionFolded, idx, message);
        form
    }

    /// Constant arithmetic and label addresses.
    fn fold_constant(&mut self, idx: usize, expr: &SimpleExpression) -> Option<FormId> {
        let value = match (expr.kind, expr.args.as_slice()) {
            (ExprKind::Add, [SimpleAtom::Int(a), SimpleAtom::Int(b)]) => a.wrapping_add(*b),
            (ExprKind::Sub, [SimpleAtom::Int(a), SimpleAtom::Int(b)]) => a.wrapping_sub(*b),
            (ExprKind::Add, [SimpleAtom::Var(base), label @ SimpleAtom::Label(_)])
            | (ExprKind::Add, [label @ SimpleAtom::Label(_), SimpleAtom::Var(base)])
                if base.reg == Register::FP =>
            {
                let form = self.atom_form(label);
                let message = self.describe(form);
                self.note(EventKind::ExpressionFolded, idx, message);
                return Some(form);
            }
            _ => return None,
        };
        let form = self.atom_form(&SimpleAtom::Int(value));
        self.note(EventKind::ExpressionFolded, idx, value.to_string());
        Some(form)
    }

    /// `(sra (sll x k) k)` for the widths the compiler sign or zero extends with.
    fn fold_extension(&mut self, idx: usize, amount: &SimpleAtom, value: FormId, signed: bool) -> Option<FormId> {
        let k = amount.as_int()?;
        let bits = match k {
            32 => 32,
            48 => 16,
            56 => 8,
            _ => return None,
        };
        let (_, element) = self.single(value)?;
        let FormElement::Generic(shift) = element else {
            return None;
        };
        if shift.op != GenericOperator::Fixed(FixedOperatorKind::Shl) || shift.args.len() != 2 {
            return None;
        }
        let (_, left) = self.single(shift.args[1])?;
        if left.as_atom().and_then(SimpleAtom::as_int) != Some(k) {
            return None;
        }
        let source = shift.args[0];

        let ty = if signed {
            format!("int{bits}")
        } else {
            format!("uint{bits}")
        };
        let form = self.element_form(FormElement::Cast(CastElement {
            ty: TypeSpec::named(&ty),
            source,
            numeric: true,
        }));
        let message = self.describe(form);
        self.note(EventKind::ExpressionFolded, idx, message);
        Some(form)
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    /// Builds the condition element of a comparison or branch test.
    ///
    /// Float-flag tests pop the pending float compare. `flipped` requests the
    /// inverse of `kind`.
    pub(crate) fn build_condition(
        &mut self,
        idx: usize,
        kind: ConditionKind,
        args: &[SimpleAtom],
        flipped: bool,
        stack: &mut FormStack,
        allow_side_effects: bool,
    ) -> FormId {
        if matches!(kind, ConditionKind::FloatFlagTrue | ConditionKind::FloatFlagFalse)
            && self.config.allows(IdiomSet::FLOAT_COMPARE)
        {
            if let Some(form) = self.pop_float_flag(idx, kind, flipped, stack, allow_side_effects) {
                return form;
            }
        }

        let popped = self.pop_atoms_marked(idx, args, stack, allow_side_effects);
        let mut consumed = self.consumed(idx);
        let tested: RegSet = args.iter().filter_map(|a| a.as_var().map(|v| v.reg)).collect();
        consumed = consumed.intersection(tested);
        let mut src = Vec::with_capacity(popped.len());
        for (atom, (form, was_popped)) in args.iter().zip(popped) {
            if was_popped {
                if let Some(var) = atom.as_var() {
                    consumed.remove(var.reg);
                }
            }
            src.push(form);
        }
        if src.len() == 2 && !kind.is_float() {
            src[1] = self.match_signedness(idx, src[0], src[1]);
        }

        self.element_form(FormElement::Condition(ConditionElement {
            kind,
            src,
            consumed,
            flipped,
            idx,
        }))
    }

    fn pop_float_flag(
        &mut self,
        idx: usize,
        kind: ConditionKind,
        flipped: bool,
        stack: &mut FormStack,
        allow_side_effects: bool,
    ) -> Option<FormId> {
        let saved = stack.checkpoint();
        let form = stack.pop_reg(&self.pool, Register::FCC, &RegSet::new(), allow_side_effects)?;
        let Some((elt, FormElement::Condition(compare))) = self.single(form) else {
            stack.restore(saved);
            return None;
        };
        let mut compare = compare.clone();
        compare.flipped ^= (kind == ConditionKind::FloatFlagFalse) ^ flipped;
        self.pool.replace_element(elt, FormElement::Condition(compare));
        let message = self.describe(form);
        self.note(EventKind::ExpressionFolded, idx, message);
        Some(form)
    }

    // ========================================================================
    // Memory
    // ========================================================================

    fn field_path(&self, base: FormId, offset: i64, size: u8) -> Option<Vec<DerefToken>> {
        if !self.config.allows(IdiomSet::FIELD_ACCESS) {
            return None;
        }
        let ty = self.form_type(base)?;
        let access = self.env.field_access(&ty, offset, size)?;
        Some(access.path.into_iter().map(DerefToken::Field).collect())
    }

    fn memory_location(&mut self, idx: usize, base: FormId, offset: i64, size: u8, kind: LoadKind) -> FormId {
        match self.field_path(base, offset, size) {
            Some(tokens) => {
                let form = self.element_form(FormElement::Deref(DerefElement {
                    base,
                    addr_of: false,
                    tokens,
                }));
                let message = self.describe(form);
                self.note(EventKind::ExpressionFolded, idx, message);
                form
            }
            None => self.element_form(FormElement::LoadSource(LoadSourceElement {
                base,
                offset,
                size,
                kind,
                idx,
            })),
        }
    }

    fn fold_load(
        &mut self,
        idx: usize,
        base: &SimpleAtom,
        offset: i64,
        size: u8,
        kind: LoadKind,
        stack: &mut FormStack,
    ) -> FormId {
        let base = self.pop_atom(idx, base, stack, true);
        self.memory_location(idx, base, offset, size, kind)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_store(
        &mut self,
        idx: usize,
        base: &SimpleAtom,
        offset: i64,
        value: &SimpleAtom,
        size: u8,
        kind: StoreKind,
        stack: &mut FormStack,
    ) {
        if base.as_var().is_none() {
            let elt = self.pool.alloc_element(FormElement::Store(StoreElement { idx }));
            stack.push_form_element(elt, true);
            self.note(EventKind::OpaqueOperation, idx, "store to a constant address");
            return;
        }

        let forms = self.pop_atoms(idx, &[base.clone(), value.clone()], stack, true);
        let load_kind = match kind {
            StoreKind::Integer => LoadKind::Signed,
            StoreKind::Float => LoadKind::Float,
        };
        let location = self.memory_location(idx, forms[0], offset, size, load_kind);
        let elt = self.pool.alloc_element(FormElement::SetFormForm(SetFormFormElement {
            dst: location,
            src: forms[1],
        }));
        stack.push_form_element(elt, true);
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn push_call(
        &mut self,
        idx: usize,
        function: Variable,
        args: &[Variable],
        result: Option<Variable>,
        stack: &mut FormStack,
    ) {
        let mut atoms = Vec::with_capacity(args.len() + 1);
        atoms.push(SimpleAtom::Var(function));
        atoms.extend(args.iter().map(|v| SimpleAtom::Var(*v)));

        let mut forms = self.pop_atoms(idx, &atoms, stack, true);
        let head = forms.remove(0);
        let call = FormElement::Generic(GenericElement {
            op: GenericOperator::Function(head),
            args: forms,
        });

        match result {
            Some(dst) if self.is_live_after(idx, dst.reg) => {
                let value = self.element_form(call);
                stack.push_value_to_reg(dst, value, true, SetVarInfo::empty());
            }
            _ => {
                let elt = self.pool.alloc_element(call);
                stack.push_form_element(elt, true);
            }
        }
    }

    // ========================================================================
    // Conditional moves
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    fn push_cmove(
        &mut self,
        idx: usize,
        op: &AtomicOp,
        dst: Variable,
        src: &SimpleAtom,
        test: Variable,
        on_zero: bool,
        stack: &mut FormStack,
    ) -> Result<()> {
        if src.is_false() {
            if self.config.allows(IdiomSet::BOOLEAN_CMOVE) {
                if let Some(cond) = self.fold_boolean_cmove(idx, dst, test, on_zero, stack)? {
                    let info = self.set_info(idx, dst, None);
                    self.push_value(dst, cond, info, stack);
                    return Ok(());
                }
            }
            let elt = self
                .pool
                .alloc_element(FormElement::ConditionalMoveFalse(ConditionalMoveFalseElement {
                    dest: dst,
                    source: test,
                    on_zero,
                    idx,
                }));
            stack.push_form_element(elt, true);
            self.warn(idx, format!("conditional move of #f into {} left unpaired", dst.reg));
            return Ok(());
        }

        if let SimpleAtom::Var(source) = src {
            if self.config.allows(IdiomSet::MIN_MAX) {
                if let Some(form) = self.fold_min_max(idx, dst, *source, test, on_zero, stack)? {
                    let info = self.set_info(idx, dst, None);
                    self.push_value(dst, form, info, stack);
                    return Ok(());
                }
            }
        }

        self.push_opaque(idx, op, stack);
        Ok(())
    }

    /// The comparison and operands of a set-on-less-than value.
    fn as_set_on_less_than(&self, form: FormId) -> Option<(ConditionKind, Vec<FormId>)> {
        let (_, FormElement::Generic(generic)) = self.single(form)? else {
            return None;
        };
        let kind = match generic.op {
            GenericOperator::Fixed(FixedOperatorKind::SetOnLessThan) => ConditionKind::LessThanSigned,
            GenericOperator::Fixed(FixedOperatorKind::SetOnLessThanUnsigned) => {
                ConditionKind::LessThanUnsigned
            }
            _ => return None,
        };
        (generic.args.len() == 2).then(|| (kind, generic.args.clone()))
    }

    /// `t = (slt a b); d = #t; cmove d #f t` becomes `d = (< a b)` or its inverse.
    fn fold_boolean_cmove(
        &mut self,
        idx: usize,
        dst: Variable,
        test: Variable,
        on_zero: bool,
        stack: &mut FormStack,
    ) -> Result<Option<FormId>> {
        let saved = stack.checkpoint();

        let is_true = stack
            .pop_top_if(dst.reg)
            .and_then(|form| self.single(form))
            .is_some_and(|(_, e)| e.as_atom().is_some_and(SimpleAtom::is_true));
        if !is_true {
            stack.restore(saved);
            return Ok(None);
        }

        let compare = stack
            .pop_reg(&self.pool, test.reg, &RegSet::of(dst.reg), true)
            .and_then(|form| self.as_set_on_less_than(form));
        let Some((kind, src)) = compare else {
            stack.restore(saved);
            return Ok(None);
        };

        if !self.consumed(idx).contains(test.reg) {
            return Err(invariant_error!(
                idx,
                "boolean conditional move folds {} but does not consume it",
                test.reg
            ));
        }

        let form = self.element_form(FormElement::Condition(ConditionElement {
            kind,
            src,
            consumed: RegSet::new(),
            flipped: !on_zero,
            idx,
        }));
        let message = self.describe(form);
        self.note(EventKind::IdiomRecognized, idx, message);
        Ok(Some(form))
    }

    /// `t = (slt a b); cmove a b t` becomes `a = (min a b)` or `(max a b)`.
    fn fold_min_max(
        &mut self,
        idx: usize,
        dst: Variable,
        source: Variable,
        test: Variable,
        on_zero: bool,
        stack: &mut FormStack,
    ) -> Result<Option<FormId>> {
        let saved = stack.checkpoint();
        let compare = stack
            .pop_reg(&self.pool, test.reg, &RegSet::new(), true)
            .and_then(|form| self.as_set_on_less_than(form));
        let Some((_, args)) = compare else {
            stack.restore(saved);
            return Ok(None);
        };

        let reg_of = |form: FormId| {
            self.single(form)
                .and_then(|(_, e)| e.as_atom().and_then(SimpleAtom::as_var).map(|v| v.reg))
        };
        let swapped = match (reg_of(args[0]), reg_of(args[1])) {
            (Some(a), Some(b)) if a == dst.reg && b == source.reg => false,
            (Some(a), Some(b)) if a == source.reg && b == dst.reg => true,
            _ => {
                stack.restore(saved);
                return Ok(None);
            }
        };

        if !self.consumed(idx).contains(test.reg) {
            return Err(invariant_error!(
                idx,
                "min/max conditional move folds {} but does not consume it",
                test.reg
            ));
        }

        let op = if on_zero != swapped {
            FixedOperatorKind::Min
        } else {
            FixedOperatorKind::Max
        };
        let operands = if swapped {
            vec![args[1], args[0]]
        } else {
            args
        };
        let form = self.fixed(op, operands);
        let message = self.describe(form);
        self.note(EventKind::IdiomRecognized, idx, message);
        Ok(Some(form))
    }
}
