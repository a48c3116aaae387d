//! Multi-block compiler idioms.
//!
//! Each recognizer looks at a fixed number of consecutive blocks at the start
//! of a sequence. Shapes are matched completely before anything is folded, so
//! a recognizer either consumes its whole window or leaves the stack alone.
//! Windows are tried longest first: `rtype-of` (three blocks), `ash` (two),
//! `abs` (one).

use crate::{
    engine::{EventKind, IdiomSet},
    expr::FormStack,
    forms::{AbsElement, AshElement, FormElement, SetVarInfo, TypeOfElement},
    ir::{
        AtomicOp, BlockId, BranchOp, ConditionKind, ExprKind, LoadKind, RegSet, Register,
        SimpleAtom, SimpleExpression, Variable,
    },
    structure::{Region, Structurer},
    Result,
};

struct AbsShape {
    idx: usize,
    value: Variable,
}

struct AshShape {
    branch: usize,
    shift: usize,
    shift_amount: Variable,
    value: Variable,
    clobber: Variable,
    dst: Register,
    signed: bool,
}

struct TypeOfShape {
    /// Instruction computing the tag test
    tag: usize,
    second_branch: usize,
    load: usize,
    base: SimpleAtom,
    clobber: Variable,
    dst: Register,
}

/// The register `atom` reads, if it is a variable.
fn reg_of(atom: &SimpleAtom) -> Option<Register> {
    atom.as_var().map(|v| v.reg)
}

/// `dst = -src` written either as a negation or as a subtraction from zero.
fn negation_of(expr: &SimpleExpression) -> Option<&Variable> {
    match (expr.kind, expr.args.as_slice()) {
        (ExprKind::Neg, [SimpleAtom::Var(v)]) => Some(v),
        (ExprKind::Sub, [SimpleAtom::Int(0), SimpleAtom::Var(v)]) => Some(v),
        _ => None,
    }
}

fn delay_set(branch: &BranchOp) -> Option<(&Variable, &SimpleExpression)> {
    match branch.delay_op()? {
        AtomicOp::SetVar { dst, src } => Some((dst, src)),
        _ => None,
    }
}

/// `dst = 'symbol` in the delay slot of a likely branch to `target`.
fn tag_branch<'b>(branch: &'b BranchOp, target: BlockId, symbol: &str) -> Option<&'b Variable> {
    if !branch.likely || branch.target != target {
        return None;
    }
    let (dst, src) = delay_set(branch)?;
    match src.as_identity()? {
        SimpleAtom::SymbolVal(name) if name == symbol => Some(dst),
        _ => None,
    }
}

impl Structurer<'_, '_> {
    /// Tries the idioms at the start of `window`, returning how many regions were consumed.
    pub(crate) fn try_idioms(&mut self, window: &[Region], stack: &mut FormStack) -> Result<usize> {
        let blocks: Vec<BlockId> = window
            .iter()
            .take(3)
            .map_while(|r| match r {
                Region::Block(id) => Some(*id),
                _ => None,
            })
            .collect();
        // the window must be consecutive blocks
        if blocks.windows(2).any(|w| w[1] != w[0].next()) {
            return Ok(0);
        }

        let config = self.folder.config();
        if blocks.len() >= 3 && config.allows(IdiomSet::TYPE_OF) {
            if let Some(shape) = self.match_type_of(blocks[0])? {
                self.apply_type_of(blocks[0], &shape, stack)?;
                return Ok(3);
            }
        }
        if blocks.len() >= 2 && config.allows(IdiomSet::ASH) {
            if let Some(shape) = self.match_ash(blocks[0])? {
                self.apply_ash(blocks[0], &shape, stack)?;
                return Ok(2);
            }
        }
        if !blocks.is_empty() && config.allows(IdiomSet::ABS) {
            if let Some(shape) = self.match_abs(blocks[0])? {
                self.apply_abs(blocks[0], &shape, stack)?;
                return Ok(1);
            }
        }
        Ok(0)
    }

    // ========================================================================
    // abs
    // ========================================================================

    /// `bltzl v, next; v = -v`
    fn match_abs(&self, block: BlockId) -> Result<Option<AbsShape>> {
        let Some((idx, branch)) = self.function().terminator(block)? else {
            return Ok(None);
        };
        if !branch.likely
            || branch.target != block.next()
            || branch.condition.kind != ConditionKind::LessThanZero
        {
            return Ok(None);
        }
        let Some(SimpleAtom::Var(value)) = branch.condition.args.first() else {
            return Ok(None);
        };
        let Some((dst, src)) = delay_set(branch) else {
            return Ok(None);
        };
        match negation_of(src) {
            Some(neg) if neg.reg == value.reg && dst.reg == value.reg => {
                Ok(Some(AbsShape { idx, value: *value }))
            }
            _ => Ok(None),
        }
    }

    fn apply_abs(&mut self, block: BlockId, shape: &AbsShape, stack: &mut FormStack) -> Result<()> {
        self.push_block_body(block, stack)?;

        let popped = self
            .folder
            .pop_atoms_marked(shape.idx, &[SimpleAtom::Var(shape.value)], stack, true);
        let (source, was_popped) = popped[0];
        let consumed = if was_popped {
            RegSet::new()
        } else {
            self.folder.consumed(shape.idx).intersection(RegSet::of(shape.value.reg))
        };

        let form = self.folder.element_form(FormElement::Abs(AbsElement {
            source,
            consumed,
            idx: shape.idx,
        }));
        let message = self.folder.describe(form);
        self.folder.note(EventKind::IdiomRecognized, shape.idx, message);
        self.folder.push_value(
            Variable::write(shape.value.reg, shape.idx),
            form,
            SetVarInfo::empty(),
            stack,
        );
        Ok(())
    }

    // ========================================================================
    // ash
    // ========================================================================

    /// `bgezl sa, end; v = x << sa` then `c = -sa; v = x >> c`
    fn match_ash(&self, block: BlockId) -> Result<Option<AshShape>> {
        let function = self.function();
        let Some((branch_idx, branch)) = function.terminator(block)? else {
            return Ok(None);
        };
        let right = function.block(block.next())?;
        if !branch.likely
            || branch.condition.kind != ConditionKind::GreaterOrEqualZero
            || branch.target != block.next().next()
            || right.len() != 2
        {
            return Ok(None);
        }
        let Some(SimpleAtom::Var(shift_amount)) = branch.condition.args.first() else {
            return Ok(None);
        };
        let Some((dst, left)) = delay_set(branch) else {
            return Ok(None);
        };
        let value = match (left.kind, left.args.as_slice()) {
            (ExprKind::LeftShift, [SimpleAtom::Var(x), sa]) if reg_of(sa) == Some(shift_amount.reg) => *x,
            _ => return Ok(None),
        };

        let (negate, shift) = (right.start, right.start + 1);
        let AtomicOp::SetVar { dst: clobber, src } = &function.instruction(negate)?.op else {
            return Ok(None);
        };
        if negation_of(src).map(|v| v.reg) != Some(shift_amount.reg) {
            return Ok(None);
        }
        let AtomicOp::SetVar { dst: out, src } = &function.instruction(shift)?.op else {
            return Ok(None);
        };
        let signed = match src.kind {
            ExprKind::RightShiftArith => true,
            ExprKind::RightShiftLogic => false,
            _ => return Ok(None),
        };
        let operands_match = matches!(
            src.args.as_slice(),
            [x, c] if reg_of(x) == Some(value.reg) && reg_of(c) == Some(clobber.reg)
        );
        if !operands_match || out.reg != dst.reg {
            return Ok(None);
        }

        Ok(Some(AshShape {
            branch: branch_idx,
            shift,
            shift_amount: *shift_amount,
            value,
            clobber: *clobber,
            dst: dst.reg,
            signed,
        }))
    }

    fn apply_ash(&mut self, block: BlockId, shape: &AshShape, stack: &mut FormStack) -> Result<()> {
        let clobbered = shape.clobber.reg != shape.dst;
        if clobbered && !self.folder.consumed(shape.shift).contains(shape.clobber.reg) {
            return Err(invariant_error!(
                shape.shift,
                "ash clobbers {} but it is still live",
                shape.clobber.reg
            ));
        }
        self.push_block_body(block, stack)?;

        // the amount is last read by the negation, the value by the shift
        let consumed = self
            .folder
            .consumed(shape.branch)
            .union(self.folder.consumed(shape.shift - 1))
            .union(self.folder.consumed(shape.shift));
        let popped = self.folder.pop_atoms_consumed(
            shape.shift,
            &[SimpleAtom::Var(shape.value), SimpleAtom::Var(shape.shift_amount)],
            consumed,
            stack,
            true,
        );
        let (value, value_popped) = popped[0];
        let (shift_amount, amount_popped) = popped[1];

        let mut open = RegSet::new();
        if !value_popped {
            open.insert(shape.value.reg);
        }
        if !amount_popped {
            open.insert(shape.shift_amount.reg);
        }
        let form = self.folder.element_form(FormElement::Ash(AshElement {
            value,
            shift_amount,
            clobber: clobbered.then_some(shape.clobber),
            signed: shape.signed,
            consumed: consumed.intersection(open),
            idx: shape.branch,
        }));
        let message = self.folder.describe(form);
        self.folder.note(EventKind::IdiomRecognized, shape.branch, message);
        self.folder.push_value(
            Variable::write(shape.dst, shape.shift),
            form,
            SetVarInfo::empty(),
            stack,
        );
        Ok(())
    }

    // ========================================================================
    // rtype-of
    // ========================================================================

    /// Tag test of a boxed value: fixnums, pairs, then the type word.
    ///
    /// ```text
    ///     c = x << 61
    ///     beql c, 0, end ; d = binteger
    ///     bgtzl c, end   ; d = pair
    ///     d = (l.wu (+ x -4))
    /// end:
    /// ```
    fn match_type_of(&self, block: BlockId) -> Result<Option<TypeOfShape>> {
        let function = self.function();
        let end = block.next().next().next();
        let first = function.block(block)?;
        let second = function.block(block.next())?;
        let third = function.block(block.next().next())?;
        if first.len() < 2 || second.len() != 1 || third.len() != 1 {
            return Ok(None);
        }

        let Some((_, zero_test)) = function.terminator(block)? else {
            return Ok(None);
        };
        let tested = match (zero_test.condition.kind, zero_test.condition.args.as_slice()) {
            (ConditionKind::Zero, [SimpleAtom::Var(c)])
            | (ConditionKind::Equal, [SimpleAtom::Var(c), SimpleAtom::Int(0)]) => c.reg,
            _ => return Ok(None),
        };
        let Some(dst) = tag_branch(zero_test, end, "binteger") else {
            return Ok(None);
        };

        let tag = first.end - 2;
        let AtomicOp::SetVar { dst: clobber, src } = &function.instruction(tag)?.op else {
            return Ok(None);
        };
        let base_reg = match (src.kind, src.args.as_slice()) {
            (ExprKind::LeftShift, [SimpleAtom::Var(x), SimpleAtom::Int(61)]) if clobber.reg == tested => x.reg,
            _ => return Ok(None),
        };

        let Some((second_branch, pair_test)) = function.terminator(block.next())? else {
            return Ok(None);
        };
        let positive = matches!(
            (pair_test.condition.kind, pair_test.condition.args.as_slice()),
            (ConditionKind::GreaterThanZero, [SimpleAtom::Var(c)]) if c.reg == tested
        );
        if !positive || tag_branch(pair_test, end, "pair").map(|v| v.reg) != Some(dst.reg) {
            return Ok(None);
        }

        let load = third.start;
        let AtomicOp::Load {
            dst: loaded,
            base,
            offset: -4,
            size: 4,
            kind: LoadKind::Unsigned,
        } = &function.instruction(load)?.op
        else {
            return Ok(None);
        };
        if loaded.reg != dst.reg || reg_of(base) != Some(base_reg) {
            return Ok(None);
        }

        Ok(Some(TypeOfShape {
            tag,
            second_branch,
            load,
            base: base.clone(),
            clobber: *clobber,
            dst: dst.reg,
        }))
    }

    fn apply_type_of(&mut self, block: BlockId, shape: &TypeOfShape, stack: &mut FormStack) -> Result<()> {
        let clobbered = shape.clobber.reg != shape.dst;
        if clobbered && !self.folder.consumed(shape.second_branch).contains(shape.clobber.reg) {
            return Err(invariant_error!(
                shape.second_branch,
                "rtype-of clobbers {} but it is still live",
                shape.clobber.reg
            ));
        }

        let start = self.function().block(block)?.start;
        self.push_range(start..shape.tag, stack)?;
        let value = self.folder.pop_atom(shape.load, &shape.base, stack, true);

        let form = self.folder.element_form(FormElement::TypeOf(TypeOfElement {
            value,
            clobber: clobbered.then_some(shape.clobber),
            idx: shape.tag,
        }));
        let message = self.folder.describe(form);
        self.folder.note(EventKind::IdiomRecognized, shape.tag, message);
        self.folder.push_value(
            Variable::write(shape.dst, shape.load),
            form,
            SetVarInfo::empty(),
            stack,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        engine::{EngineConfig, EventKind, EventLog, IdiomSet},
        expr::Folder,
        ir::{ConditionKind, Delay, ExprKind, Function, FunctionBuilder, LoadKind, Operand, Register},
        structure::{Region, Structurer},
        types::StaticTypeEnv,
        DiagnosticTag, Result,
    };

    fn run(function: &Function, config: &EngineConfig) -> Result<(String, EventLog)> {
        let env = StaticTypeEnv::new(function);
        let events = EventLog::new();
        let mut folder = Folder::new(function, &env, config, &events);
        let form = Structurer::new(&mut folder).build(&Region::linear(function))?;
        let text = folder.describe(form);
        Ok((text, events))
    }

    fn abs_function() -> Function {
        let mut b = FunctionBuilder::new("abs");
        b.mov(Register::V0, Register::A0)
            .branch_likely(
                ConditionKind::LessThanZero,
                [Register::V0.into()],
                "done",
                Delay::new(Register::V0, ExprKind::Neg, [Register::V0.into()]),
            )
            .label("done");
        b.finish().unwrap()
    }

    #[test]
    fn abs_of_argument() {
        let (text, events) = run(&abs_function(), &EngineConfig::default()).unwrap();
        assert_eq!(text, "(set! v0-1 (abs arg0))");
        assert_eq!(events.count_kind(EventKind::IdiomRecognized), 1);
    }

    #[test]
    fn abs_disabled_keeps_the_branch() {
        let config = EngineConfig::default().with_idioms(IdiomSet::all() - IdiomSet::ABS);
        let (text, events) = run(&abs_function(), &config).unwrap();
        assert!(text.contains("bl!"), "{text}");
        assert!(!events.has(EventKind::IdiomRecognized));
    }

    fn ash_function(clobber: Register) -> Function {
        let mut b = FunctionBuilder::new("ash");
        b.branch_likely(
            ConditionKind::GreaterOrEqualZero,
            [Register::A1.into()],
            "done",
            Delay::new(Register::V0, ExprKind::LeftShift, [Register::A0.into(), Register::A1.into()]),
        )
        .set(clobber, ExprKind::Sub, [Operand::Int(0), Register::A1.into()])
        .set(Register::V0, ExprKind::RightShiftArith, [Register::A0.into(), clobber.into()])
        .label("done");
        b.finish().unwrap()
    }

    #[test]
    fn ash_with_temporary() {
        let (text, events) = run(&ash_function(Register::V1), &EngineConfig::default()).unwrap();
        assert_eq!(text, "(set! v0-1 (ash arg0 arg1))");
        assert_eq!(events.count_kind(EventKind::IdiomRecognized), 1);
    }

    #[test]
    fn ash_folds_a_computed_value() {
        let mut b = FunctionBuilder::new("ash-of-sum");
        b.set(Register::A3, ExprKind::Add, [Register::A2.into(), Operand::Int(1)])
            .branch_likely(
                ConditionKind::GreaterOrEqualZero,
                [Register::A1.into()],
                "done",
                Delay::new(Register::V0, ExprKind::LeftShift, [Register::A3.into(), Register::A1.into()]),
            )
            .set(Register::V1, ExprKind::Sub, [Operand::Int(0), Register::A1.into()])
            .set(Register::V0, ExprKind::RightShiftArith, [Register::A3.into(), Register::V1.into()])
            .label("done");
        let function = b.finish().unwrap();

        let (text, events) = run(&function, &EngineConfig::default()).unwrap();
        assert_eq!(text, "(set! v0-1 (ash (+ arg2 1) arg1))");
        assert_eq!(events.count_kind(EventKind::IdiomRecognized), 1);
    }

    #[test]
    fn ash_clobbering_a_live_register_is_an_invariant_violation() {
        // the return register is live at the epilogue, so negating into it is inconsistent
        let mut b = FunctionBuilder::new("ash-live");
        b.return_register(Register::V1)
            .branch_likely(
                ConditionKind::GreaterOrEqualZero,
                [Register::A1.into()],
                "done",
                Delay::new(Register::V0, ExprKind::LeftShift, [Register::A0.into(), Register::A1.into()]),
            )
            .set(Register::V1, ExprKind::Sub, [Operand::Int(0), Register::A1.into()])
            .set(Register::V0, ExprKind::RightShiftArith, [Register::A0.into(), Register::V1.into()])
            .label("done");
        let function = b.finish().unwrap();
        let err = run(&function, &EngineConfig::default()).unwrap_err();
        assert_eq!(err.tag(), DiagnosticTag::FoldInvariantViolation);
    }

    #[test]
    fn type_of_three_way_dispatch() {
        let mut b = FunctionBuilder::new("type-of");
        b.set(Register::V1, ExprKind::LeftShift, [Register::A0.into(), Operand::Int(61)])
            .branch_likely(
                ConditionKind::Zero,
                [Register::V1.into()],
                "done",
                Delay::mov(Register::V1, Operand::symbol_value("binteger")),
            )
            .branch_likely(
                ConditionKind::GreaterThanZero,
                [Register::V1.into()],
                "done",
                Delay::mov(Register::V1, Operand::symbol_value("pair")),
            )
            .load(Register::V1, Register::A0, -4, 4, LoadKind::Unsigned)
            .label("done")
            .mov(Register::V0, Register::V1);
        let function = b.finish().unwrap();

        let (text, events) = run(&function, &EngineConfig::default()).unwrap();
        assert_eq!(text, "(set! v0-0 (rtype-of arg0))");
        assert_eq!(events.count_kind(EventKind::IdiomRecognized), 1);
    }
}
