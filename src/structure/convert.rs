//! Region traversal and the conversion of plain blocks.

use std::{ops::Range, slice};

use crate::{
    expr::{Folder, FormStack},
    forms::{ElementId, FormElement, FormId},
    ir::{BlockId, BranchOp, Function},
    structure::Region,
    Error, Result,
};

/// Builds the element tree of a region.
///
/// Regions are converted innermost first: a control region builds its parts
/// on fresh stacks and pushes the finished control element onto the stack of
/// the enclosing sequence, where it acts as a sequence point.
pub struct Structurer<'f, 'a> {
    pub(crate) folder: &'f mut Folder<'a>,
    max_depth: usize,
}

impl<'f, 'a> Structurer<'f, 'a> {
    /// Creates a structurer building into `folder`'s arena.
    pub fn new(folder: &'f mut Folder<'a>) -> Self {
        let max_depth = folder.config().max_region_depth;
        Structurer { folder, max_depth }
    }

    /// Builds `region` into a new form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecursionLimit`] when regions nest deeper than the
    /// configured limit, [`Error::UnrecognizedBranchShape`] for a control
    /// region whose branches do not fit its kind, and any fold error.
    pub fn build(&mut self, region: &Region) -> Result<FormId> {
        self.build_form(region, 0)
    }

    pub(crate) fn function(&self) -> &'a Function {
        self.folder.function()
    }

    pub(crate) fn build_form(&mut self, region: &Region, depth: usize) -> Result<FormId> {
        let mut stack = FormStack::new();
        self.push_region(region, &mut stack, depth)?;
        Ok(stack.rewrite_to_form(self.folder.pool_mut()))
    }

    /// Folds `region` into `stack`.
    pub(crate) fn push_region(&mut self, region: &Region, stack: &mut FormStack, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(Error::RecursionLimit(self.max_depth));
        }
        match region {
            Region::Block(_) => self.push_sequence(slice::from_ref(region), stack, depth),
            Region::Sequence(items) => self.push_sequence(items, stack, depth),
            Region::Loop(items) => self.push_loop(items, stack, depth),
            Region::Conditional { arms, else_arm } => {
                self.push_conditional(arms, else_arm.as_deref(), stack, depth)
            }
            Region::ShortCircuit(items) => self.push_short_circuit(items, stack, depth),
            Region::Exit { body, dead } => self.push_exit(body, dead.as_deref(), stack, depth),
        }
    }

    /// Folds consecutive regions, trying idioms at every position first.
    pub(crate) fn push_sequence(&mut self, items: &[Region], stack: &mut FormStack, depth: usize) -> Result<()> {
        let mut i = 0;
        while i < items.len() {
            let used = self.try_idioms(&items[i..], stack)?;
            if used > 0 {
                i += used;
                continue;
            }
            match &items[i] {
                Region::Block(id) => self.push_block(*id, stack)?,
                other => self.push_region(other, stack, depth + 1)?,
            }
            i += 1;
        }
        Ok(())
    }

    /// Folds a block outside of any recognized control structure.
    fn push_block(&mut self, id: BlockId, stack: &mut FormStack) -> Result<()> {
        if let Some((idx, branch)) = self.push_block_body(id, stack)? {
            if branch.is_unconditional() && branch.target == id.next() {
                // jump to the next block is a fall through
                self.push_delay(idx, branch, stack)?;
            } else {
                self.folder.push_instruction(idx, stack)?;
            }
        }
        Ok(())
    }

    /// Folds every instruction of `id` except a terminating branch, which is returned.
    pub(crate) fn push_block_body(
        &mut self,
        id: BlockId,
        stack: &mut FormStack,
    ) -> Result<Option<(usize, &'a BranchOp)>> {
        let function = self.function();
        let block = function.block(id)?;
        let terminator = function.terminator(id)?;
        let end = match terminator {
            Some((idx, _)) => idx,
            None => block.end,
        };
        self.push_range(block.start..end, stack)?;
        Ok(terminator)
    }

    pub(crate) fn push_range(&mut self, range: Range<usize>, stack: &mut FormStack) -> Result<()> {
        for idx in range {
            self.folder.push_instruction(idx, stack)?;
        }
        Ok(())
    }

    /// Folds `region` up to the branch ending its last block, which is returned.
    pub(crate) fn push_region_except_terminator(
        &mut self,
        region: &Region,
        stack: &mut FormStack,
        depth: usize,
    ) -> Result<Option<(usize, &'a BranchOp)>> {
        match region {
            Region::Block(id) => self.push_block_body(*id, stack),
            Region::Sequence(items) => match items.split_last() {
                Some((last, rest)) => {
                    self.push_sequence(rest, stack, depth)?;
                    self.push_region_except_terminator(last, stack, depth + 1)
                }
                None => Ok(None),
            },
            other => {
                self.push_region(other, stack, depth)?;
                Ok(None)
            }
        }
    }

    /// Folds the delay slot of `branch`.
    pub(crate) fn push_delay(&mut self, idx: usize, branch: &BranchOp, stack: &mut FormStack) -> Result<()> {
        match branch.delay_op() {
            Some(op) => self.folder.push_op(idx, op, stack),
            None => Ok(()),
        }
    }

    /// Pushes a finished control element as a statement.
    pub(crate) fn push_statement(&mut self, element: FormElement, stack: &mut FormStack) -> ElementId {
        let elt = self.folder.pool_mut().alloc_element(element);
        stack.push_form_element(elt, true);
        elt
    }

    /// Folds the blocks of `region` in layout order without structuring or folding.
    pub(crate) fn build_verbatim(&mut self, region: &Region) -> Result<FormId> {
        let previous = self.folder.set_verbatim(true);
        let mut stack = FormStack::new();
        let result = self.push_blocks_linear(region, &mut stack);
        self.folder.set_verbatim(previous);
        result?;
        Ok(stack.rewrite_to_form(self.folder.pool_mut()))
    }

    fn push_blocks_linear(&mut self, region: &Region, stack: &mut FormStack) -> Result<()> {
        for id in region.block_ids() {
            let range = self.function().block(id)?.range();
            self.push_range(range, stack)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        engine::{EngineConfig, EventLog},
        expr::Folder,
        ir::{ConditionKind, FunctionBuilder, Operand, Register},
        structure::{Region, Structurer},
        types::StaticTypeEnv,
        Error,
    };

    #[test]
    fn fall_through_jump_is_dropped() {
        let mut b = FunctionBuilder::new("jump");
        b.mov(Register::V0, Register::A0).jump("next").label("next").mov(Register::V1, Operand::Int(1));
        let function = b.finish().unwrap();
        let env = StaticTypeEnv::new(&function);
        let config = EngineConfig::default();
        let events = EventLog::new();
        let mut folder = Folder::new(&function, &env, &config, &events);

        let form = Structurer::new(&mut folder).build(&Region::linear(&function)).unwrap();
        assert_eq!(
            folder.describe(form),
            "(begin (set! v0-0 arg0) (set! v1-0 1))"
        );
    }

    #[test]
    fn stray_branch_is_kept() {
        let mut b = FunctionBuilder::new("stray");
        b.branch(ConditionKind::Zero, [Register::A0.into()], "end")
            .mov(Register::V0, Operand::Int(1))
            .label("end");
        let function = b.finish().unwrap();
        let env = StaticTypeEnv::new(&function);
        let config = EngineConfig::default();
        let events = EventLog::new();
        let mut folder = Folder::new(&function, &env, &config, &events);

        let form = Structurer::new(&mut folder).build(&Region::linear(&function)).unwrap();
        assert_eq!(
            folder.describe(form),
            "(begin (b! (zero? arg0) end) (set! v0-0 1))"
        );
    }

    #[test]
    fn unvalidated_block_past_the_end_is_an_error() {
        let mut b = FunctionBuilder::new("overrun");
        b.mov(Register::V0, Operand::Int(1));
        let mut function = b.finish().unwrap();
        function.blocks[0].end = 4;
        let env = StaticTypeEnv::new(&function);
        let config = EngineConfig::default();
        let events = EventLog::new();
        let mut folder = Folder::new(&function, &env, &config, &events);

        assert!(Structurer::new(&mut folder).build(&Region::block(0)).is_err());
    }

    #[test]
    fn depth_limit() {
        let mut b = FunctionBuilder::new("deep");
        b.mov(Register::V0, Operand::Int(1));
        let function = b.finish().unwrap();
        let env = StaticTypeEnv::new(&function);
        let config = EngineConfig::default().with_max_region_depth(2);
        let events = EventLog::new();
        let mut folder = Folder::new(&function, &env, &config, &events);

        let mut region = Region::block(0);
        for _ in 0..4 {
            region = Region::Sequence(vec![region]);
        }
        let err = Structurer::new(&mut folder).build(&region).unwrap_err();
        assert_eq!(err, Error::RecursionLimit(2));
    }
}
