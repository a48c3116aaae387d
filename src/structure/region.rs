//! Block groupings handed over by the control-flow structuring pass.

use crate::{
    ir::{BlockId, Function},
    Error, Result,
};

/// One test and body of a [`Region::Conditional`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondArm {
    /// Region ending in the branch that skips `body`
    pub test: Region,
    /// Region executed when the test holds
    pub body: Region,
}

impl CondArm {
    /// Creates an arm.
    #[must_use]
    pub fn new(test: Region, body: Region) -> Self {
        CondArm { test, body }
    }
}

/// A grouping of basic blocks, in layout order.
///
/// The structuring pass decides which blocks form a loop, a conditional or a
/// short-circuit chain; the reconstruction engine only checks that the
/// branches inside a region have the layout its kind requires and builds the
/// matching control element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Region {
    /// A single basic block
    Block(BlockId),
    /// Regions executed one after another
    Sequence(Vec<Region>),
    /// A single-entry loop; `while` or `until` is decided by where the test is
    Loop(Vec<Region>),
    /// A chain of tested arms with an optional else arm
    Conditional {
        /// Tested arms, in layout order
        arms: Vec<CondArm>,
        /// Alternative executed when no test holds
        else_arm: Option<Box<Region>>,
    },
    /// Tests sharing one exit, all but the last ending in a branch to it
    ShortCircuit(Vec<Region>),
    /// A region ending in an unconditional jump out, followed by unreachable code
    Exit {
        /// Code up to and including the jump
        body: Box<Region>,
        /// Unreachable code up to the next label
        dead: Option<Box<Region>>,
    },
}

impl Region {
    /// Every block of `function` except the epilogue, as one sequence.
    ///
    /// Suitable for straight-line functions and as a fallback when no
    /// structuring information is available: branches stay unstructured.
    #[must_use]
    pub fn linear(function: &Function) -> Region {
        Region::Sequence(
            function
                .blocks
                .iter()
                .map(|b| b.id)
                .filter(|id| Some(*id) != function.epilogue)
                .map(Region::Block)
                .collect(),
        )
    }

    /// Shorthand for [`Region::Block`] from a raw block index.
    #[must_use]
    pub fn block(index: usize) -> Region {
        Region::Block(BlockId::new(index))
    }

    /// Shorthand for a [`Region::Sequence`] of consecutive blocks.
    #[must_use]
    pub fn blocks(range: std::ops::Range<usize>) -> Region {
        Region::Sequence(range.map(Region::block).collect())
    }

    /// Shorthand for an [`Region::Exit`].
    #[must_use]
    pub fn exit(body: Region, dead: Option<Region>) -> Region {
        Region::Exit {
            body: Box::new(body),
            dead: dead.map(Box::new),
        }
    }

    /// Shorthand for a [`Region::Conditional`].
    #[must_use]
    pub fn conditional(arms: Vec<CondArm>, else_arm: Option<Region>) -> Region {
        Region::Conditional {
            arms,
            else_arm: else_arm.map(Box::new),
        }
    }

    /// The direct sub-regions in layout order.
    #[must_use]
    pub fn children(&self) -> Vec<&Region> {
        match self {
            Region::Block(_) => Vec::new(),
            Region::Sequence(items) | Region::Loop(items) | Region::ShortCircuit(items) => {
                items.iter().collect()
            }
            Region::Conditional { arms, else_arm } => {
                let mut out: Vec<&Region> = arms.iter().flat_map(|a| [&a.test, &a.body]).collect();
                out.extend(else_arm.as_deref());
                out
            }
            Region::Exit { body, dead } => {
                let mut out = vec![body.as_ref()];
                out.extend(dead.as_deref());
                out
            }
        }
    }

    /// The first block in layout order.
    #[must_use]
    pub fn first_block(&self) -> Option<BlockId> {
        match self {
            Region::Block(id) => Some(*id),
            _ => self.children().into_iter().find_map(Region::first_block),
        }
    }

    /// The last block in layout order.
    #[must_use]
    pub fn last_block(&self) -> Option<BlockId> {
        match self {
            Region::Block(id) => Some(*id),
            _ => self.children().into_iter().rev().find_map(Region::last_block),
        }
    }

    /// Every block of the region in layout order.
    #[must_use]
    pub fn block_ids(&self) -> Vec<BlockId> {
        let mut out = Vec::new();
        self.collect_blocks(&mut out);
        out
    }

    fn collect_blocks(&self, out: &mut Vec<BlockId>) {
        match self {
            Region::Block(id) => out.push(*id),
            _ => {
                for child in self.children() {
                    child.collect_blocks(out);
                }
            }
        }
    }

    /// Nesting depth; a block has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(Region::depth)
            .max()
            .unwrap_or(0)
    }

    /// Checks that every block exists and that regions are not empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for an unknown block,
    /// [`Error::MalformedInput`] for an empty grouping and
    /// [`Error::RecursionLimit`] when the nesting exceeds `max_depth`.
    pub fn validate(&self, function: &Function, max_depth: usize) -> Result<()> {
        self.validate_at(function, 1, max_depth)
    }

    fn validate_at(&self, function: &Function, depth: usize, max_depth: usize) -> Result<()> {
        if depth > max_depth {
            return Err(Error::RecursionLimit(max_depth));
        }
        match self {
            Region::Block(id) => {
                function.block(*id)?;
            }
            Region::Loop(items) | Region::ShortCircuit(items) if items.is_empty() => {
                return Err(Error::MalformedInput(format!(
                    "{}: empty loop or short-circuit region",
                    function.name
                )));
            }
            Region::Conditional { arms, .. } if arms.is_empty() => {
                return Err(Error::MalformedInput(format!(
                    "{}: conditional region without arms",
                    function.name
                )));
            }
            _ => {}
        }
        for child in self.children() {
            child.validate_at(function, depth + 1, max_depth)?;
        }
        Ok(())
    }
}

impl From<BlockId> for Region {
    fn from(id: BlockId) -> Self {
        Region::Block(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConditionKind, FunctionBuilder, Operand, Register};

    fn diamond() -> Function {
        let mut b = FunctionBuilder::new("diamond");
        b.branch(ConditionKind::Zero, [Register::A0.into()], "else")
            .mov(Register::V0, Operand::Int(1))
            .jump("end")
            .label("else")
            .mov(Register::V0, Operand::Int(2))
            .label("end");
        b.finish().unwrap()
    }

    #[test]
    fn linear_skips_epilogue() {
        let function = diamond();
        let region = Region::linear(&function);
        assert_eq!(
            region.block_ids(),
            vec![BlockId::new(0), BlockId::new(1), BlockId::new(2)]
        );
        assert_eq!(region.depth(), 2);
    }

    #[test]
    fn first_and_last_blocks() {
        let region = Region::conditional(
            vec![CondArm::new(Region::block(0), Region::block(1))],
            Some(Region::block(2)),
        );
        assert_eq!(region.first_block(), Some(BlockId::new(0)));
        assert_eq!(region.last_block(), Some(BlockId::new(2)));
        assert!(region.validate(&diamond(), 8).is_ok());
    }

    #[test]
    fn validation_errors() {
        let function = diamond();
        assert!(matches!(
            Region::block(9).validate(&function, 8),
            Err(Error::InvalidHandle(_))
        ));
        assert!(matches!(
            Region::Loop(vec![]).validate(&function, 8),
            Err(Error::MalformedInput(_))
        ));
        let nested = Region::Sequence(vec![Region::Sequence(vec![Region::block(0)])]);
        assert!(matches!(
            nested.validate(&function, 2),
            Err(Error::RecursionLimit(2))
        ));
    }
}
