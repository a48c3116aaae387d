//! A lifted function: instructions, blocks and labels.

use std::collections::BTreeMap;

use crate::{
    ir::{BasicBlock, BlockId, BranchOp, Instruction, Register},
    Error, Result,
};

/// One function as handed over by the lifter.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Function name, used for diagnostics and batch reports
    pub name: String,
    /// Instructions in program order
    pub instructions: Vec<Instruction>,
    /// Basic blocks in layout order, covering `instructions` contiguously
    pub blocks: Vec<BasicBlock>,
    /// Named labels
    pub labels: BTreeMap<String, BlockId>,
    /// The single epilogue block jumped to by returns
    pub epilogue: Option<BlockId>,
    /// Register holding the return value
    pub return_register: Register,
}

impl Function {
    /// Creates an empty function named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            instructions: Vec::new(),
            blocks: Vec::new(),
            labels: BTreeMap::new(),
            epilogue: None,
            return_register: Register::V0,
        }
    }

    /// Returns the block with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the block does not exist.
    pub fn block(&self, id: BlockId) -> Result<&BasicBlock> {
        self.blocks
            .get(id.index())
            .ok_or_else(|| Error::InvalidHandle(format!("block {id} in {}", self.name)))
    }

    /// Returns the instruction at `idx`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the index is out of range.
    pub fn instruction(&self, idx: usize) -> Result<&Instruction> {
        self.instructions
            .get(idx)
            .ok_or_else(|| Error::InvalidHandle(format!("instruction {idx} in {}", self.name)))
    }

    /// Returns the block a label names.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<BlockId> {
        self.labels.get(name).copied()
    }

    /// Returns the first label naming `block`, if any.
    #[must_use]
    pub fn label_of(&self, block: BlockId) -> Option<&str> {
        self.labels
            .iter()
            .find(|(_, b)| **b == block)
            .map(|(name, _)| name.as_str())
    }

    /// Returns the branch ending `block`, with its instruction index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the block does not exist.
    pub fn terminator(&self, block: BlockId) -> Result<Option<(usize, &BranchOp)>> {
        let block = self.block(block)?;
        if block.is_empty() {
            return Ok(None);
        }
        let idx = block.end - 1;
        Ok(self.instruction(idx)?.op.as_branch().map(|b| (idx, b)))
    }

    /// Checks that blocks tile the instruction list and every branch target exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] describing the first inconsistency.
    pub fn validate(&self) -> Result<()> {
        let mut expected_start = 0;
        for (position, block) in self.blocks.iter().enumerate() {
            if block.id.index() != position {
                return Err(Error::MalformedInput(format!(
                    "{}: block at position {position} has id {}",
                    self.name, block.id
                )));
            }
            if block.start != expected_start
                || block.end < block.start
                || block.end > self.instructions.len()
            {
                return Err(Error::MalformedInput(format!(
                    "{}: block {} covers {}..{}, expected to start at {expected_start}",
                    self.name, block.id, block.start, block.end
                )));
            }
            for succ in &block.successors {
                if succ.index() >= self.blocks.len() {
                    return Err(Error::MalformedInput(format!(
                        "{}: block {} has unknown successor {succ}",
                        self.name, block.id
                    )));
                }
            }
            // branches may only end a block
            for idx in block.range() {
                let is_last = idx + 1 == block.end;
                if let Some(branch) = self.instructions[idx].op.as_branch() {
                    if !is_last {
                        return Err(Error::MalformedInput(format!(
                            "{}: branch at {idx} is not the last instruction of {}",
                            self.name, block.id
                        )));
                    }
                    if branch.target.index() >= self.blocks.len() {
                        return Err(Error::MalformedInput(format!(
                            "{}: branch at {idx} targets unknown block {}",
                            self.name, branch.target
                        )));
                    }
                }
            }
            expected_start = block.end;
        }

        if expected_start != self.instructions.len() {
            return Err(Error::MalformedInput(format!(
                "{}: blocks cover {expected_start} of {} instructions",
                self.name,
                self.instructions.len()
            )));
        }

        if let Some(epilogue) = self.epilogue {
            self.block(epilogue)
                .map_err(|_| Error::MalformedInput(format!("{}: missing epilogue", self.name)))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AtomicOp, SimpleAtom, SimpleExpression, Variable};

    fn set(idx: usize) -> Instruction {
        Instruction::new(AtomicOp::set_var(
            Variable::write(Register::V0, idx),
            SimpleExpression::identity(SimpleAtom::Int(1)),
        ))
    }

    #[test]
    fn validate_rejects_gaps() {
        let mut function = Function::new("gap");
        function.instructions = vec![set(0), set(1)];
        function.blocks = vec![BasicBlock {
            id: BlockId::new(0),
            start: 0,
            end: 1,
            successors: vec![],
        }];
        assert!(matches!(
            function.validate(),
            Err(Error::MalformedInput(_))
        ));

        function.blocks[0].end = 2;
        assert!(function.validate().is_ok());
    }

    #[test]
    fn validate_rejects_block_past_the_end() {
        let mut function = Function::new("overrun");
        function.instructions = vec![set(0)];
        function.blocks = vec![BasicBlock {
            id: BlockId::new(0),
            start: 0,
            end: 5,
            successors: vec![],
        }];
        assert!(matches!(
            function.validate(),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_successor() {
        let mut function = Function::new("succ");
        function.instructions = vec![set(0)];
        function.blocks = vec![BasicBlock {
            id: BlockId::new(0),
            start: 0,
            end: 1,
            successors: vec![BlockId::new(3)],
        }];
        assert!(function.validate().is_err());
    }
}
