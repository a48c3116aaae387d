//! Basic blocks of a lifted function.

use std::{fmt, ops::Range};

/// A strongly-typed identifier for a basic block within one function.
///
/// Block IDs are assigned sequentially in layout order, so comparing two IDs
/// compares their position in the function.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Creates a new `BlockId` from a raw index value.
    ///
    /// # Arguments
    ///
    /// * `index` - The raw block index (0-based, layout order)
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        BlockId(index)
    }

    /// Returns the raw index value of this block identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }

    /// Returns the block laid out directly after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        BlockId(self.0 + 1)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl From<usize> for BlockId {
    fn from(index: usize) -> Self {
        BlockId(index)
    }
}

/// A maximal straight-line run of instructions.
///
/// A block ends at a branch (the branch belongs to the block) or right before a
/// label. Instruction indices refer to [`Function::instructions`](crate::ir::Function).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Identifier, equal to the block's layout position
    pub id: BlockId,
    /// First instruction index
    pub start: usize,
    /// One past the last instruction index
    pub end: usize,
    /// Successor blocks (fall-through first, then the branch target)
    pub successors: Vec<BlockId>,
}

impl BasicBlock {
    /// Returns the instruction index range covered by this block.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Returns `true` if the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns the number of instructions in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}
