//! Control-structure recognizers.
//!
//! The structuring pass has already decided which blocks belong together; the
//! code here checks that the branches inside a region have the layout its kind
//! requires, builds the parts on fresh stacks and pushes one control element
//! onto the enclosing stack. A region whose branches do not fit is an
//! [`Error::UnrecognizedBranchShape`].
//!
//! Conditions are captured greedily: everything a test region computes before
//! its branch ends up in the condition form. Such entries are marked as not
//! cleaned and left for a later narrowing pass.

use crate::{
    engine::EventKind,
    expr::FormStack,
    forms::{
        CondEntry, CondNoElseElement, CondNoElseEntry, CondWithElseElement, ConditionElement,
        ElementId, ExitElement, FormElement, FormId, LoopElement, SetVarInfo, ShortCircuitElement,
        ShortCircuitEntry, ShortCircuitKind,
    },
    ir::{AtomicOp, BlockId, BranchOp, ConditionKind, Function, RegSet, Register, SimpleAtom, Variable},
    structure::{CondArm, Region, Structurer},
    Error, Result,
};

/// A captured branch test.
struct Test<'a> {
    form: FormId,
    idx: usize,
    branch: &'a BranchOp,
    cleaned: bool,
}

/// What to do with the delay slot of a tested branch.
#[derive(Clone, Copy, PartialEq, Eq)]
enum DelaySlot {
    /// Fold it in front of the test
    Emit,
    /// Drop it, its effect is carried by the control element
    Absorb,
}

fn shape_error(function: &Function, region: &Region, instruction: Option<usize>, message: impl Into<String>) -> Error {
    let block = region.last_block().unwrap_or(BlockId::new(0));
    let instruction = instruction
        .or_else(|| function.block(block).ok().map(|b| b.start))
        .unwrap_or(0);
    Error::UnrecognizedBranchShape {
        block,
        instruction,
        message: message.into(),
    }
}

/// The destination of a `dst = #f` delay slot.
fn false_default(branch: &BranchOp) -> Option<Variable> {
    match branch.delay_op()? {
        AtomicOp::SetVar { dst, src } if src.as_identity().is_some_and(SimpleAtom::is_false) => Some(*dst),
        _ => None,
    }
}

fn condition_regs(branch: &BranchOp) -> RegSet {
    branch
        .condition
        .args
        .iter()
        .filter_map(|a| a.as_var().map(|v| v.reg))
        .collect()
}

impl<'a> Structurer<'_, 'a> {
    /// The branch ending `region`, without folding anything.
    ///
    /// Only blocks and sequences ending in a block have one; the branches of
    /// nested control regions belong to those regions.
    fn region_terminator(&self, region: &Region) -> Result<Option<(usize, &'a BranchOp)>> {
        match region {
            Region::Block(id) => self.function().terminator(*id),
            Region::Sequence(items) => match items.last() {
                Some(last) => self.region_terminator(last),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn expect_branch(&self, region: &Region, conditional: bool) -> Result<(usize, &'a BranchOp)> {
        match self.region_terminator(region)? {
            Some((idx, branch)) if branch.is_unconditional() != conditional => Ok((idx, branch)),
            Some((idx, _)) => Err(shape_error(
                self.function(),
                region,
                Some(idx),
                if conditional {
                    "expected a conditional branch"
                } else {
                    "expected an unconditional jump"
                },
            )),
            None => Err(shape_error(self.function(), region, None, "region does not end in a branch")),
        }
    }

    /// The single value-producing element of a form ending in `set! reg`.
    fn trailing_set(&self, form: FormId, reg: Register) -> Option<(ElementId, Variable)> {
        let pool = self.folder.pool();
        let last = *pool.elements_of(form).last()?;
        match pool.element(last) {
            FormElement::SetVar(set) if set.dst.reg == reg => Some((last, set.dst)),
            _ => None,
        }
    }

    /// Replaces a trailing `(set! reg x)` of `form` with `x`.
    fn splice_trailing_value(&mut self, form: FormId) {
        let pool = self.folder.pool_mut();
        let mut elements = pool.elements_of(form).to_vec();
        let Some(last) = elements.pop() else {
            return;
        };
        let src = match pool.element(last) {
            FormElement::SetVar(set) => set.src,
            _ => return,
        };
        elements.extend_from_slice(pool.elements_of(src));
        pool.set_elements(form, elements);
    }

    fn build_items(&mut self, items: &[Region], depth: usize) -> Result<FormId> {
        let mut stack = FormStack::new();
        self.push_sequence(items, &mut stack, depth + 1)?;
        Ok(stack.rewrite_to_form(self.folder.pool_mut()))
    }

    /// Builds a body whose final jump to `end` is dropped.
    ///
    /// With `jump_required` the body must end in that jump.
    fn build_jumping_body(&mut self, body: &Region, end: BlockId, jump_required: bool, depth: usize) -> Result<FormId> {
        let jump = match self.region_terminator(body)? {
            Some((idx, branch)) if branch.is_unconditional() && branch.target == end => Some((idx, branch)),
            Some((idx, _)) if jump_required => {
                return Err(shape_error(self.function(), body, Some(idx), format!("arm does not jump to {end}")));
            }
            None if jump_required => {
                return Err(shape_error(self.function(), body, None, format!("arm does not jump to {end}")));
            }
            _ => None,
        };
        let Some((idx, branch)) = jump else {
            return self.build_form(body, depth + 1);
        };
        let mut stack = FormStack::new();
        self.push_region_except_terminator(body, &mut stack, depth + 1)?;
        self.push_delay(idx, branch, &mut stack)?;
        Ok(stack.rewrite_to_form(self.folder.pool_mut()))
    }

    /// Folds `region` up to its conditional branch and builds the test.
    ///
    /// `result` names a register holding the value of a short-circuit chain; a
    /// test of that register takes its pending value instead of consuming it.
    fn capture_test(
        &mut self,
        region: &Region,
        flipped: bool,
        delay: DelaySlot,
        result: Option<Register>,
        depth: usize,
    ) -> Result<Test<'a>> {
        let (idx, branch) = self.expect_branch(region, true)?;
        let mut stack = FormStack::new();
        self.push_region_except_terminator(region, &mut stack, depth + 1)?;

        if delay == DelaySlot::Emit {
            if let Some(op) = branch.delay_op() {
                if branch.likely {
                    return Err(shape_error(
                        self.function(),
                        region,
                        Some(idx),
                        "likely branch with a delay slot in a test",
                    ));
                }
                if op.writes().intersects(&condition_regs(branch)) {
                    return Err(shape_error(
                        self.function(),
                        region,
                        Some(idx),
                        "delay slot overwrites the tested register",
                    ));
                }
                self.folder.push_op(idx, op, &mut stack)?;
            }
        }

        let condition = match (result, branch.condition.args.as_slice()) {
            (Some(reg), [SimpleAtom::Var(var)]) if var.reg == reg => {
                let src = match stack.pop_reg(self.folder.pool(), reg, &RegSet::new(), true) {
                    Some(form) => form,
                    None => self.folder.atom_form(&SimpleAtom::Var(*var)),
                };
                self.folder.element_form(FormElement::Condition(ConditionElement {
                    kind: branch.condition.kind,
                    src: vec![src],
                    consumed: RegSet::new(),
                    flipped,
                    idx,
                }))
            }
            (_, args) => self
                .folder
                .build_condition(idx, branch.condition.kind, args, flipped, &mut stack, true),
        };

        let pool = self.folder.pool_mut();
        let mut elements = stack.rewrite(pool);
        let cleaned = elements.is_empty();
        elements.extend_from_slice(pool.elements_of(condition));
        pool.set_elements(condition, elements);
        if !cleaned {
            let message = format!("test at {idx} captures {}", self.folder.describe(condition));
            self.folder.note(EventKind::Info, idx, message);
        }

        Ok(Test {
            form: condition,
            idx,
            branch,
            cleaned,
        })
    }

    fn recognized(&mut self, idx: usize, elt: ElementId) {
        let message = self.folder.describe_element(elt);
        self.folder.note(EventKind::ControlStructureRecognized, idx, message);
    }

    /// Pushes a finished value-producing control element as `(set! dst element)`.
    fn push_control_value(&mut self, idx: usize, dst: Variable, element: FormElement, stack: &mut FormStack) {
        let form = self.folder.element_form(element);
        if let Some(elt) = self.folder.pool().try_as_single_element(form) {
            self.recognized(idx, elt);
        }
        self.folder.push_value(dst, form, SetVarInfo::empty(), stack);
    }

    fn push_control_statement(&mut self, idx: usize, element: FormElement, stack: &mut FormStack) {
        let elt = self.push_statement(element, stack);
        self.recognized(idx, elt);
    }

    // ========================================================================
    // Loops
    // ========================================================================

    /// Recognizes `while` and `until` loops.
    ///
    /// Three layouts are accepted:
    ///
    /// ```text
    ///     b test            top:                   top:
    /// body:                     b<!cond> end           body
    ///     body                  body                   b<cond> top
    /// test:                     b top
    ///     b<cond> body      end:
    /// ```
    ///
    /// The first two test before the body and become `while`; the last becomes
    /// `until`.
    pub(crate) fn push_loop(&mut self, items: &[Region], stack: &mut FormStack, depth: usize) -> Result<()> {
        let function = self.function();
        let (Some(first), Some(last)) = (items.first(), items.last()) else {
            return Err(Error::MalformedInput(format!("{}: empty loop region", function.name)));
        };
        let head = first.first_block();

        // jump to a trailing test
        if items.len() >= 2 {
            if let Some((jump_idx, jump)) = self.region_terminator(first)? {
                if jump.is_unconditional() && Some(jump.target) == last.first_block() {
                    let (_, back) = self.expect_branch(last, true)?;
                    if Some(back.target) != items[1].first_block() {
                        return Err(shape_error(function, last, None, "loop test does not branch to the body"));
                    }
                    self.push_region_except_terminator(first, stack, depth + 1)?;
                    self.push_delay(jump_idx, jump, stack)?;

                    let body = self.build_items(&items[1..items.len() - 1], depth)?;
                    let test = self.capture_test(last, false, DelaySlot::Emit, None, depth)?;
                    let element = FormElement::While(LoopElement {
                        condition: test.form,
                        body,
                        cleaned: test.cleaned,
                    });
                    self.push_control_statement(test.idx, element, stack);
                    return Ok(());
                }
            }
        }

        // test at the bottom, branching back to the top
        if let Some((_, back)) = self.region_terminator(last)? {
            if !back.is_unconditional() && Some(back.target) == head {
                let body = self.build_items(&items[..items.len() - 1], depth)?;
                let test = self.capture_test(last, true, DelaySlot::Emit, None, depth)?;
                let element = FormElement::Until(LoopElement {
                    condition: test.form,
                    body,
                    cleaned: test.cleaned,
                });
                self.push_control_statement(test.idx, element, stack);
                return Ok(());
            }
        }

        // test at the top, jump back at the bottom
        if items.len() < 2 {
            return Err(shape_error(function, last, None, "loop has no back edge"));
        }
        let exit = last.last_block().map(BlockId::next);
        let (exit_idx, leave) = self.expect_branch(first, true)?;
        if Some(leave.target) != exit {
            return Err(shape_error(function, first, Some(exit_idx), "loop test does not leave the loop"));
        }
        let (back_idx, back) = self.expect_branch(last, false)?;
        if Some(back.target) != head {
            return Err(shape_error(function, last, Some(back_idx), "loop does not jump back to its test"));
        }

        let test = self.capture_test(first, true, DelaySlot::Emit, None, depth)?;
        let mut body_stack = FormStack::new();
        let (body, tail) = items[1..].split_at(items.len() - 2);
        self.push_sequence(body, &mut body_stack, depth + 1)?;
        self.push_region_except_terminator(&tail[0], &mut body_stack, depth + 1)?;
        self.push_delay(back_idx, back, &mut body_stack)?;
        let body = body_stack.rewrite_to_form(self.folder.pool_mut());

        let element = FormElement::While(LoopElement {
            condition: test.form,
            body,
            cleaned: test.cleaned,
        });
        self.push_control_statement(test.idx, element, stack);
        Ok(())
    }

    // ========================================================================
    // Conditionals
    // ========================================================================

    /// Recognizes `if`/`cond` chains.
    ///
    /// Every test ends in a branch skipping its body, to the next test or to
    /// the end. Every body but the last ends in a jump to the end. A chain
    /// without an else arm whose tests all default the same register to `#f`
    /// in their delay slot, and whose bodies all end by setting it, is the
    /// value of that register.
    pub(crate) fn push_conditional(
        &mut self,
        arms: &[CondArm],
        else_arm: Option<&Region>,
        stack: &mut FormStack,
        depth: usize,
    ) -> Result<()> {
        let function = self.function();
        let Some(last_arm) = arms.last() else {
            return Err(Error::MalformedInput(format!("{}: conditional without arms", function.name)));
        };
        let last_region = else_arm.unwrap_or(&last_arm.body);
        let Some(end) = last_region.last_block().map(BlockId::next) else {
            return Err(shape_error(function, last_region, None, "conditional has no blocks"));
        };

        let mut branches = Vec::with_capacity(arms.len());
        for (i, arm) in arms.iter().enumerate() {
            let (idx, branch) = self.expect_branch(&arm.test, true)?;
            let skip_to = match arms.get(i + 1) {
                Some(next) => next.test.first_block(),
                None => else_arm.and_then(Region::first_block).or(Some(end)),
            };
            if Some(branch.target) != skip_to {
                return Err(shape_error(function, &arm.test, Some(idx), "test does not skip its arm"));
            }
            branches.push((idx, branch));
        }

        let mut bodies = Vec::with_capacity(arms.len());
        for (i, arm) in arms.iter().enumerate() {
            let jump_required = i + 1 < arms.len() || else_arm.is_some();
            bodies.push(self.build_jumping_body(&arm.body, end, jump_required, depth)?);
        }
        let else_form = match else_arm {
            Some(region) => Some(self.build_form(region, depth + 1)?),
            None => None,
        };

        // the register every arm ends by setting
        let defaults: Option<Vec<Variable>> = match else_arm {
            Some(_) => None,
            None => branches.iter().map(|(_, b)| false_default(b)).collect(),
        };
        let value_reg = match (&defaults, else_arm) {
            (Some(vars), None) => vars.first().map(|v| v.reg).filter(|r| vars.iter().all(|v| v.reg == *r)),
            (None, Some(_)) => self.folder.pool().elements_of(bodies[0]).last().and_then(|elt| {
                match self.folder.pool().element(*elt) {
                    FormElement::SetVar(set) => Some(set.dst.reg),
                    _ => None,
                }
            }),
            _ => None,
        };
        let value = value_reg.and_then(|reg| {
            let mut last = None;
            for form in bodies.iter().chain(else_form.iter()) {
                last = Some(self.trailing_set(*form, reg)?.1);
            }
            last
        });

        let delay = if value.is_some() && else_arm.is_none() {
            DelaySlot::Absorb
        } else {
            DelaySlot::Emit
        };
        let mut tests = Vec::with_capacity(arms.len());
        for arm in arms {
            tests.push(self.capture_test(&arm.test, true, delay, None, depth)?);
        }

        if value.is_some() {
            for form in bodies.iter().chain(else_form.iter()) {
                self.splice_trailing_value(*form);
            }
        }

        let idx = tests[0].idx;
        let element = match else_form {
            Some(else_form) => FormElement::CondWithElse(CondWithElseElement {
                entries: tests
                    .iter()
                    .zip(&bodies)
                    .map(|(test, body)| CondEntry {
                        condition: test.form,
                        body: *body,
                        cleaned: test.cleaned,
                    })
                    .collect(),
                else_form,
                already_rewritten: value.is_some(),
            }),
            None => FormElement::CondNoElse(CondNoElseElement {
                entries: tests
                    .iter()
                    .zip(&bodies)
                    .map(|(test, body)| CondNoElseEntry {
                        condition: test.form,
                        body: *body,
                        false_destination: value.and_then(|_| false_default(test.branch)),
                        original_condition_branch: test.idx,
                        cleaned: test.cleaned,
                    })
                    .collect(),
                final_destination: value,
                used_as_value: value.is_some(),
                already_rewritten: value.is_some(),
            }),
        };

        match value {
            Some(dst) => self.push_control_value(idx, dst, element, stack),
            None => self.push_control_statement(idx, element, stack),
        }
        Ok(())
    }

    // ========================================================================
    // Short-circuit chains
    // ========================================================================

    /// Recognizes `and`/`or` chains.
    ///
    /// Every entry but the last ends in a branch to the end of the chain. A
    /// branch taken on `#f`, or one that writes `#f` to the result in its delay
    /// slot, short-circuits to false; a branch taken on a truthy value
    /// short-circuits to true. All entries must agree.
    pub(crate) fn push_short_circuit(&mut self, items: &[Region], stack: &mut FormStack, depth: usize) -> Result<()> {
        let function = self.function();
        let Some((last, entries)) = items.split_last() else {
            return Err(Error::MalformedInput(format!("{}: empty short-circuit region", function.name)));
        };
        if entries.is_empty() {
            return Err(shape_error(function, last, None, "short-circuit chain with a single entry"));
        }
        let Some(end) = last.last_block().map(BlockId::next) else {
            return Err(shape_error(function, last, None, "short-circuit chain has no blocks"));
        };

        let mut to_false = Vec::with_capacity(entries.len());
        let mut tricks = Vec::with_capacity(entries.len());
        for entry in entries {
            let (idx, branch) = self.expect_branch(entry, true)?;
            if branch.target != end {
                return Err(shape_error(function, entry, Some(idx), "entry does not branch to the end of the chain"));
            }
            let trick = false_default(branch);
            let shorts_to_false = match (trick, branch.condition.kind) {
                (Some(_), _) | (None, ConditionKind::False) => true,
                (None, ConditionKind::Truthy) => false,
                (None, kind) => {
                    return Err(shape_error(
                        function,
                        entry,
                        Some(idx),
                        format!("{} test without a result in the delay slot", kind.operator()),
                    ));
                }
            };
            to_false.push(shorts_to_false);
            tricks.push(trick);
        }
        let kind = if to_false.iter().all(|f| *f) {
            ShortCircuitKind::And
        } else if to_false.iter().all(|f| !*f) {
            ShortCircuitKind::Or
        } else {
            return Err(shape_error(function, last, None, "short-circuit chain mixes and with or"));
        };

        // register carrying the value of the chain
        let result = match tricks.iter().flatten().next() {
            Some(var) => Some(var.reg),
            None => {
                let tested: Vec<Option<Register>> = entries
                    .iter()
                    .map(|entry| -> Result<Option<Register>> {
                        Ok(match self.region_terminator(entry)? {
                            Some((_, branch)) => match branch.condition.args.as_slice() {
                                [SimpleAtom::Var(var)] => Some(var.reg),
                                _ => None,
                            },
                            None => None,
                        })
                    })
                    .collect::<Result<_>>()?;
                tested[0].filter(|reg| tested.iter().all(|t| *t == Some(*reg)))
            }
        };
        let used_as_value = match (result, last.last_block()) {
            (Some(reg), Some(block)) if matches!(last, Region::Block(_) | Region::Sequence(_)) => {
                let block = function.block(block)?;
                function.terminator(block.id)?.is_none()
                    && !block.is_empty()
                    && function
                        .instruction(block.end - 1)?
                        .op
                        .dst()
                        .is_some_and(|dst| dst.reg == reg)
            }
            _ => false,
        };
        let result = result.filter(|_| used_as_value);
        if let Some(reg) = tricks.iter().flatten().map(|v| v.reg).find(|r| Some(*r) != result) {
            return Err(shape_error(
                function,
                last,
                None,
                format!("short-circuit result {reg} is not the value of the chain"),
            ));
        }

        let mut built = Vec::with_capacity(items.len());
        for (entry, trick) in entries.iter().zip(&tricks) {
            let delay = if trick.is_some() {
                DelaySlot::Absorb
            } else {
                DelaySlot::Emit
            };
            let test = self.capture_test(entry, kind == ShortCircuitKind::And, delay, result, depth)?;
            built.push(ShortCircuitEntry {
                condition: test.form,
                branch: Some(test.idx),
                is_output_trick: trick.is_some(),
                cleaned: test.cleaned,
            });
        }
        let tail = self.build_form(last, depth + 1)?;
        let final_result = match result {
            Some(reg) => {
                let Some((_, dst)) = self.trailing_set(tail, reg) else {
                    let at = function.block(last.last_block().unwrap_or(end))?.start;
                    return Err(invariant_error!(at, "short-circuit result {} was not set last", reg));
                };
                self.splice_trailing_value(tail);
                Some(dst)
            }
            None => None,
        };
        built.push(ShortCircuitEntry {
            condition: tail,
            branch: None,
            is_output_trick: false,
            cleaned: true,
        });

        let idx = built[0].branch.unwrap_or(0);
        let element = FormElement::ShortCircuit(ShortCircuitElement {
            kind,
            entries: built,
            final_result,
            used_as_value,
            already_rewritten: used_as_value,
        });
        match final_result {
            Some(dst) => self.push_control_value(idx, dst, element, stack),
            None => self.push_control_statement(idx, element, stack),
        }
        Ok(())
    }

    // ========================================================================
    // Exits
    // ========================================================================

    /// Recognizes `return` (a jump to the epilogue) and `break` (any other
    /// jump out), keeping the unreachable code after the jump verbatim.
    pub(crate) fn push_exit(
        &mut self,
        body: &Region,
        dead: Option<&Region>,
        stack: &mut FormStack,
        depth: usize,
    ) -> Result<()> {
        let function = self.function();
        let (idx, jump) = self.expect_branch(body, false)?;
        let is_return = Some(jump.target) == function.epilogue;

        let mut code_stack = FormStack::new();
        self.push_region_except_terminator(body, &mut code_stack, depth + 1)?;
        self.push_delay(idx, jump, &mut code_stack)?;

        let value = if is_return && self.folder.config().strip_return_value {
            code_stack.pop_top_if(function.return_register).map(|value| {
                match self.folder.env().return_type() {
                    Some(ty) => self.folder.cast_to(idx, value, &ty),
                    None => value,
                }
            })
        } else {
            None
        };
        let pool = self.folder.pool_mut();
        let mut elements = code_stack.rewrite(pool);
        if let Some(value) = value {
            elements.extend_from_slice(pool.elements_of(value));
        }
        let code = if elements.is_empty() {
            pool.alloc_empty_form()
        } else {
            pool.alloc_sequence_form(elements)
        };

        let dead_code = match dead {
            Some(region) => Some(self.build_verbatim(region)?),
            None => None,
        };
        let exit = ExitElement { code, dead_code, idx };
        let element = if is_return {
            FormElement::Return(exit)
        } else {
            FormElement::Break(exit)
        };
        self.push_control_statement(idx, element, stack);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        engine::{EngineConfig, EventKind, EventLog},
        expr::Folder,
        forms::{ElementId, FormElement, FormPool},
        ir::{ConditionKind, Delay, ExprKind, Function, FunctionBuilder, Operand, Register},
        structure::{CondArm, Region, Structurer},
        types::StaticTypeEnv,
        DiagnosticTag, Result,
    };

    struct Built {
        text: String,
        pool: FormPool,
        events: EventLog,
    }

    fn build(function: &Function, region: &Region) -> Result<Built> {
        let env = StaticTypeEnv::new(function);
        let config = EngineConfig::default();
        let events = EventLog::new();
        let mut folder = Folder::new(function, &env, &config, &events);
        let form = Structurer::new(&mut folder).build(region)?;
        let text = folder.describe(form);
        Ok(Built {
            text,
            pool: folder.into_pool(),
            events,
        })
    }

    fn find(pool: &FormPool, pick: impl Fn(&FormElement) -> bool) -> Vec<&FormElement> {
        (0..pool.element_count())
            .map(|i| pool.element(ElementId::new(i)))
            .filter(|e| pick(e))
            .collect()
    }

    #[test]
    fn while_with_test_at_the_bottom() {
        let mut b = FunctionBuilder::new("count-down");
        b.jump("test")
            .label("body")
            .set(Register::A0, ExprKind::Sub, [Register::A0.into(), Operand::Int(1)])
            .label("test")
            .branch(ConditionKind::NonZero, [Register::A0.into()], "body");
        let function = b.finish().unwrap();

        let region = Region::Loop(vec![Region::block(0), Region::block(1), Region::block(2)]);
        let built = build(&function, &region).unwrap();
        assert_eq!(built.text, "(while (nonzero? a0-0) (set! a0-0 (- arg0 1)))");
        assert_eq!(built.events.count_kind(EventKind::ControlStructureRecognized), 1);
    }

    #[test]
    fn while_with_test_at_the_top() {
        let mut b = FunctionBuilder::new("count-down");
        b.label("top")
            .branch(ConditionKind::Zero, [Register::A0.into()], "done")
            .set(Register::A0, ExprKind::Sub, [Register::A0.into(), Operand::Int(1)])
            .jump("top")
            .label("done");
        let function = b.finish().unwrap();

        let region = Region::Loop(vec![Region::block(0), Region::block(1)]);
        let built = build(&function, &region).unwrap();
        assert_eq!(built.text, "(while (nonzero? arg0) (set! a0-0 (- arg0 1)))");
    }

    #[test]
    fn until_with_test_after_the_body() {
        let mut b = FunctionBuilder::new("count-down");
        b.label("top")
            .set(Register::A0, ExprKind::Sub, [Register::A0.into(), Operand::Int(1)])
            .label("test")
            .branch(ConditionKind::NonZero, [Register::A0.into()], "top");
        let function = b.finish().unwrap();

        let region = Region::Loop(vec![Region::block(0), Region::block(1)]);
        let built = build(&function, &region).unwrap();
        assert_eq!(built.text, "(until (zero? a0-0) (set! a0-0 (- arg0 1)))");
        let loops = find(&built.pool, |e| matches!(e, FormElement::Until(l) if l.cleaned));
        assert_eq!(loops.len(), 1);
    }

    #[test]
    fn greedy_condition_is_not_cleaned() {
        let mut b = FunctionBuilder::new("spin");
        b.label("top")
            .set(Register::A0, ExprKind::Sub, [Register::A0.into(), Operand::Int(1)])
            .branch(ConditionKind::NonZero, [Register::A0.into()], "top");
        let function = b.finish().unwrap();

        let built = build(&function, &Region::Loop(vec![Region::block(0)])).unwrap();
        assert_eq!(
            built.text,
            "(until (begin (set! a0-0 (- arg0 1)) (zero? a0-0)) (empty))"
        );
        let loops = find(&built.pool, |e| matches!(e, FormElement::Until(l) if !l.cleaned));
        assert_eq!(loops.len(), 1);
        assert!(built.events.has(EventKind::Info));
    }

    fn three_way(with_else: bool) -> (Function, Region) {
        let mut b = FunctionBuilder::new("pick");
        if with_else {
            b.branch(ConditionKind::NonZero, [Register::A0.into()], "second")
                .mov(Register::V0, Operand::Int(1))
                .jump("end")
                .label("second")
                .branch(ConditionKind::NonZero, [Register::A1.into()], "third")
                .mov(Register::V0, Operand::Int(2))
                .jump("end")
                .label("third")
                .mov(Register::V0, Operand::Int(3))
                .label("end");
        } else {
            b.branch_with_delay(
                ConditionKind::NonZero,
                [Register::A0.into()],
                "second",
                Delay::set_false(Register::V0),
            )
            .mov(Register::V0, Operand::Int(1))
            .jump("end")
            .label("second")
            .branch_with_delay(
                ConditionKind::NonZero,
                [Register::A1.into()],
                "end",
                Delay::set_false(Register::V0),
            )
            .mov(Register::V0, Operand::Int(2))
            .label("end");
        }
        let function = b.finish().unwrap();
        let arms = vec![
            CondArm::new(Region::block(0), Region::block(1)),
            CondArm::new(Region::block(2), Region::block(3)),
        ];
        let region = Region::conditional(arms, with_else.then(|| Region::block(4)));
        (function, region)
    }

    #[test]
    fn cond_with_else_used_as_value() {
        let (function, region) = three_way(true);
        let built = build(&function, &region).unwrap();
        assert_eq!(
            built.text,
            "(set! v0-2 (cond ((zero? arg0) 1) ((zero? arg1) 2) (else 3)))"
        );
    }

    #[test]
    fn cond_without_else_from_false_default() {
        let (function, region) = three_way(false);
        let built = build(&function, &region).unwrap();
        assert_eq!(built.text, "(set! v0-3 (cond ((zero? arg0) 1) ((zero? arg1) 2)))");
        let conds = find(&built.pool, |e| {
            matches!(e, FormElement::CondNoElse(c) if c.used_as_value
                && c.entries.iter().all(|x| x.false_destination.is_some()))
        });
        assert_eq!(conds.len(), 1);
    }

    #[test]
    fn statement_if_keeps_its_body() {
        let mut b = FunctionBuilder::new("maybe-call");
        b.branch(ConditionKind::Zero, [Register::A0.into()], "end")
            .call(Register::T9, &[Register::A0])
            .label("end");
        let function = b.finish().unwrap();

        let region = Region::conditional(vec![CondArm::new(Region::block(0), Region::block(1))], None);
        let built = build(&function, &region).unwrap();
        assert!(built.text.starts_with("(if (nonzero? "), "{}", built.text);
        let conds = find(&built.pool, |e| matches!(e, FormElement::CondNoElse(c) if !c.used_as_value));
        assert_eq!(conds.len(), 1);
    }

    #[test]
    fn arm_without_jump_is_rejected() {
        let mut b = FunctionBuilder::new("broken");
        b.branch(ConditionKind::NonZero, [Register::A0.into()], "else")
            .mov(Register::V0, Operand::Int(1))
            .label("else")
            .mov(Register::V0, Operand::Int(2));
        let function = b.finish().unwrap();

        let region = Region::conditional(
            vec![CondArm::new(Region::block(0), Region::block(1))],
            Some(Region::block(2)),
        );
        let err = build(&function, &region).err().unwrap();
        assert_eq!(err.tag(), DiagnosticTag::UnrecognizedBranchShape);
    }

    #[test]
    fn and_chain_as_value() {
        let mut b = FunctionBuilder::new("both");
        b.mov(Register::V0, Register::A0)
            .branch(ConditionKind::False, [Register::V0.into()], "end")
            .mov(Register::V0, Register::A1)
            .label("end");
        let function = b.finish().unwrap();

        let region = Region::ShortCircuit(vec![Region::block(0), Region::block(1)]);
        let built = build(&function, &region).unwrap();
        assert_eq!(built.text, "(set! v0-1 (and arg0 arg1))");
    }

    #[test]
    fn or_chain_as_value() {
        let mut b = FunctionBuilder::new("either");
        b.mov(Register::V0, Register::A0)
            .branch(ConditionKind::Truthy, [Register::V0.into()], "end")
            .mov(Register::V0, Register::A1)
            .label("end");
        let function = b.finish().unwrap();

        let region = Region::ShortCircuit(vec![Region::block(0), Region::block(1)]);
        let built = build(&function, &region).unwrap();
        assert_eq!(built.text, "(set! v0-1 (or arg0 arg1))");
    }

    #[test]
    fn and_chain_with_output_trick() {
        let mut b = FunctionBuilder::new("ordered");
        b.branch_with_delay(
            ConditionKind::GreaterOrEqualSigned,
            [Register::A0.into(), Register::A1.into()],
            "end",
            Delay::set_false(Register::V0),
        )
        .set_condition(
            Register::V0,
            ConditionKind::LessThanSigned,
            [Register::A1.into(), Register::A2.into()],
        )
        .label("end");
        let function = b.finish().unwrap();

        let region = Region::ShortCircuit(vec![Region::block(0), Region::block(1)]);
        let built = build(&function, &region).unwrap();
        assert_eq!(built.text, "(set! v0-1 (and (< arg0 arg1) (< arg1 arg2)))");
        let chains = find(&built.pool, |e| {
            matches!(e, FormElement::ShortCircuit(s) if s.entries[0].is_output_trick)
        });
        assert_eq!(chains.len(), 1);
    }

    #[test]
    fn return_with_dead_code() {
        let mut b = FunctionBuilder::new("early");
        b.mov(Register::V0, Operand::Int(1))
            .ret()
            .mov(Register::V1, Operand::Int(2));
        let function = b.finish().unwrap();

        let region = Region::exit(Region::block(0), Some(Region::block(1)));
        let built = build(&function, &region).unwrap();
        assert_eq!(built.text, "(begin (return 1) (set! v1-0 2))");
    }

    #[test]
    fn break_out_of_a_region() {
        let mut b = FunctionBuilder::new("leave");
        b.jump("out")
            .mov(Register::V1, Operand::Int(2))
            .label("out")
            .mov(Register::V0, Operand::Int(3));
        let function = b.finish().unwrap();

        let region = Region::Sequence(vec![
            Region::exit(Region::block(0), Some(Region::block(1))),
            Region::block(2),
        ]);
        let built = build(&function, &region).unwrap();
        assert_eq!(built.text, "(begin (break) (set! v1-0 2) (set! v0-0 3))");
        let exits = find(&built.pool, |e| matches!(e, FormElement::Break(x) if x.dead_code.is_some()));
        assert_eq!(exits.len(), 1);
    }
}
