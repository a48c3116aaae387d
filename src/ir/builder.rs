//! Fluent, label-based construction of [`Function`]s.
//!
//! The builder plays the role of a small assembler for the lifted IR: every
//! method appends one atomic operation, labels start new blocks, and branches
//! end them. Operands are given at register level; the builder turns them into
//! [`Variable`]s numbered by instruction index, reads of `r0` into the constant
//! zero, and computes consumed-register sets when the function is finished.
//!
//! # Usage
//!
//! ```rust
//! use formscope::ir::{ConditionKind, Delay, ExprKind, FunctionBuilder, Register};
//!
//! // (abs arg0)
//! let mut b = FunctionBuilder::new("abs");
//! b.mov(Register::V0, Register::A0)
//!     .branch_likely(
//!         ConditionKind::LessThanZero,
//!         [Register::V0.into()],
//!         "epilogue",
//!         Delay::new(Register::V0, ExprKind::Neg, [Register::V0.into()]),
//!     );
//! let function = b.finish()?;
//! assert_eq!(function.blocks.len(), 2);
//! # Ok::<(), formscope::Error>(())
//! ```

use std::collections::BTreeMap;

use crate::{
    ir::{
        liveness, AtomicOp, BasicBlock, BlockId, BranchOp, Condition, ConditionKind, ExprKind,
        Function, Instruction, LoadKind, Register, SimpleAtom, SimpleExpression, SpecialKind,
        StoreKind, Variable,
    },
    Error, Result,
};

/// Name of the label the builder attaches to the epilogue block.
pub const EPILOGUE_LABEL: &str = "epilogue";

/// A register-level operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A register, read at the instruction being built
    Reg(Register),
    /// Integer constant
    Int(i64),
    /// Float constant
    Float(f32),
    /// Pointer to a symbol (`'#t`)
    Symbol(String),
    /// Value of a global symbol
    SymbolValue(String),
    /// Address of a static label
    Label(String),
    /// The empty list
    EmptyList,
}

impl Operand {
    /// Shorthand for a quoted symbol operand.
    #[must_use]
    pub fn symbol(name: &str) -> Self {
        Operand::Symbol(name.to_string())
    }

    /// Shorthand for a symbol value operand.
    #[must_use]
    pub fn symbol_value(name: &str) -> Self {
        Operand::SymbolValue(name.to_string())
    }

    /// Shorthand for a label address operand.
    #[must_use]
    pub fn label(name: &str) -> Self {
        Operand::Label(name.to_string())
    }

    fn to_atom(&self, idx: usize) -> SimpleAtom {
        match self {
            Operand::Reg(Register::R0) => SimpleAtom::Int(0),
            Operand::Reg(reg) => SimpleAtom::Var(Variable::read(*reg, idx)),
            Operand::Int(v) => SimpleAtom::Int(*v),
            Operand::Float(v) => SimpleAtom::Float(*v),
            Operand::Symbol(s) => SimpleAtom::SymbolPtr(s.clone()),
            Operand::SymbolValue(s) => SimpleAtom::SymbolVal(s.clone()),
            Operand::Label(s) => SimpleAtom::Label(s.clone()),
            Operand::EmptyList => SimpleAtom::EmptyList,
        }
    }
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Reg(reg)
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Int(v)
    }
}

/// A delay-slot assignment `dst = (kind args...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delay {
    dst: Register,
    kind: ExprKind,
    args: Vec<Operand>,
}

impl Delay {
    /// Creates a delay-slot assignment.
    #[must_use]
    pub fn new(dst: Register, kind: ExprKind, args: impl IntoIterator<Item = Operand>) -> Self {
        Delay {
            dst,
            kind,
            args: args.into_iter().collect(),
        }
    }

    /// Delay slot copying `src` into `dst`.
    #[must_use]
    pub fn mov(dst: Register, src: impl Into<Operand>) -> Self {
        Delay::new(dst, ExprKind::Identity, [src.into()])
    }

    /// Delay slot writing `'#f` into `dst`, the short-circuit output trick.
    #[must_use]
    pub fn set_false(dst: Register) -> Self {
        Delay::mov(dst, Operand::symbol("#f"))
    }

    fn to_op(&self, idx: usize) -> AtomicOp {
        AtomicOp::SetVar {
            dst: Variable::write(self.dst, idx),
            src: SimpleExpression::new(self.kind, self.args.iter().map(|a| a.to_atom(idx)).collect()),
        }
    }
}

enum Pending {
    Ready(AtomicOp),
    Branch {
        condition: Condition,
        likely: bool,
        target: String,
        delay: Option<AtomicOp>,
    },
}

/// Builds a [`Function`] one atomic operation at a time.
pub struct FunctionBuilder {
    name: String,
    ops: Vec<Pending>,
    // label name -> instruction index the labelled block starts at
    labels: Vec<(String, usize)>,
    return_register: Register,
}

impl FunctionBuilder {
    /// Starts a new function named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        FunctionBuilder {
            name: name.into(),
            ops: Vec::new(),
            labels: Vec::new(),
            return_register: Register::V0,
        }
    }

    fn next_idx(&self) -> usize {
        self.ops.len()
    }

    fn atoms(&self, args: impl IntoIterator<Item = Operand>) -> Vec<SimpleAtom> {
        let idx = self.next_idx();
        args.into_iter().map(|a| a.to_atom(idx)).collect()
    }

    /// Overrides the return register (default `v0`).
    pub fn return_register(&mut self, reg: Register) -> &mut Self {
        self.return_register = reg;
        self
    }

    /// Starts a new block named `name` at the next instruction.
    pub fn label(&mut self, name: &str) -> &mut Self {
        self.labels.push((name.to_string(), self.next_idx()));
        self
    }

    /// Appends an already constructed operation.
    pub fn op(&mut self, op: AtomicOp) -> &mut Self {
        self.ops.push(Pending::Ready(op));
        self
    }

    /// `dst = (kind args...)`
    pub fn set(
        &mut self,
        dst: Register,
        kind: ExprKind,
        args: impl IntoIterator<Item = Operand>,
    ) -> &mut Self {
        let idx = self.next_idx();
        let src = SimpleExpression::new(kind, self.atoms(args));
        self.op(AtomicOp::SetVar {
            dst: Variable::write(dst, idx),
            src,
        })
    }

    /// `dst = src`
    pub fn mov(&mut self, dst: Register, src: impl Into<Operand>) -> &mut Self {
        self.set(dst, ExprKind::Identity, [src.into()])
    }

    /// `dst = (kind a b)` materialized as a boolean.
    pub fn set_condition(
        &mut self,
        dst: Register,
        kind: ConditionKind,
        args: impl IntoIterator<Item = Operand>,
    ) -> &mut Self {
        let idx = self.next_idx();
        let condition = Condition::new(kind, self.atoms(args));
        self.op(AtomicOp::SetCondition {
            dst: Variable::write(dst, idx),
            condition,
        })
    }

    /// `dst = memory[base + offset]`
    pub fn load(
        &mut self,
        dst: Register,
        base: impl Into<Operand>,
        offset: i64,
        size: u8,
        kind: LoadKind,
    ) -> &mut Self {
        let idx = self.next_idx();
        let base = base.into().to_atom(idx);
        self.op(AtomicOp::Load {
            dst: Variable::write(dst, idx),
            base,
            offset,
            size,
            kind,
        })
    }

    /// `memory[base + offset] = value`
    pub fn store(
        &mut self,
        base: impl Into<Operand>,
        offset: i64,
        value: impl Into<Operand>,
        size: u8,
        kind: StoreKind,
    ) -> &mut Self {
        let idx = self.next_idx();
        let base = base.into().to_atom(idx);
        let value = value.into().to_atom(idx);
        self.op(AtomicOp::Store {
            base,
            offset,
            value,
            size,
            kind,
        })
    }

    /// `lo = a / b; hi = a % b`
    pub fn divide(&mut self, a: Register, b: Register, signed: bool) -> &mut Self {
        let idx = self.next_idx();
        self.op(AtomicOp::Divide {
            a: Operand::Reg(a).to_atom(idx),
            b: Operand::Reg(b).to_atom(idx),
            signed,
        })
    }

    /// `fcc = (kind a b)`
    pub fn float_compare(&mut self, kind: ConditionKind, a: Register, b: Register) -> &mut Self {
        let idx = self.next_idx();
        self.op(AtomicOp::FloatCompare {
            kind,
            a: Operand::Reg(a).to_atom(idx),
            b: Operand::Reg(b).to_atom(idx),
        })
    }

    /// Calls the function in `function` with `args`, result in the return register.
    pub fn call(&mut self, function: Register, args: &[Register]) -> &mut Self {
        let idx = self.next_idx();
        let result = Some(Variable::write(self.return_register, idx));
        self.op(AtomicOp::Call {
            function: Variable::read(function, idx),
            args: args.iter().map(|r| Variable::read(*r, idx)).collect(),
            result,
        })
    }

    /// `if (test == 0) == on_zero { dst = src }`
    pub fn cmove(
        &mut self,
        dst: Register,
        src: impl Into<Operand>,
        test: Register,
        on_zero: bool,
    ) -> &mut Self {
        let idx = self.next_idx();
        let src = src.into().to_atom(idx);
        self.op(AtomicOp::ConditionalMove {
            dst: Variable::write(dst, idx),
            src,
            test: Variable::read(test, idx),
            on_zero,
        })
    }

    /// An operand-less special instruction.
    pub fn special(&mut self, kind: SpecialKind) -> &mut Self {
        self.op(AtomicOp::Special(kind))
    }

    /// An opaque instruction.
    pub fn asm(
        &mut self,
        mnemonic: &str,
        dst: Option<Register>,
        srcs: impl IntoIterator<Item = Operand>,
    ) -> &mut Self {
        let idx = self.next_idx();
        let srcs = self.atoms(srcs);
        self.op(AtomicOp::Asm {
            mnemonic: mnemonic.to_string(),
            dst: dst.map(|r| Variable::write(r, idx)),
            srcs,
        })
    }

    fn push_branch(
        &mut self,
        kind: ConditionKind,
        args: Vec<Operand>,
        target: &str,
        likely: bool,
        delay: Option<Delay>,
    ) -> &mut Self {
        let idx = self.next_idx();
        let condition = Condition::new(kind, self.atoms(args));
        self.ops.push(Pending::Branch {
            condition,
            likely,
            target: target.to_string(),
            delay: delay.map(|d| d.to_op(idx)),
        });
        self
    }

    /// Conditional branch to `target` with a nop delay slot.
    pub fn branch(
        &mut self,
        kind: ConditionKind,
        args: impl IntoIterator<Item = Operand>,
        target: &str,
    ) -> &mut Self {
        self.push_branch(kind, args.into_iter().collect(), target, false, None)
    }

    /// Conditional branch to `target` with `delay` in the delay slot.
    pub fn branch_with_delay(
        &mut self,
        kind: ConditionKind,
        args: impl IntoIterator<Item = Operand>,
        target: &str,
        delay: Delay,
    ) -> &mut Self {
        self.push_branch(kind, args.into_iter().collect(), target, false, Some(delay))
    }

    /// Branch-likely to `target`: `delay` only executes when the branch is taken.
    pub fn branch_likely(
        &mut self,
        kind: ConditionKind,
        args: impl IntoIterator<Item = Operand>,
        target: &str,
        delay: Delay,
    ) -> &mut Self {
        self.push_branch(kind, args.into_iter().collect(), target, true, Some(delay))
    }

    /// Unconditional jump to `target`.
    pub fn jump(&mut self, target: &str) -> &mut Self {
        self.push_branch(ConditionKind::Always, Vec::new(), target, false, None)
    }

    /// Unconditional jump to `target` with `delay` in the delay slot.
    pub fn jump_with_delay(&mut self, target: &str, delay: Delay) -> &mut Self {
        self.push_branch(ConditionKind::Always, Vec::new(), target, false, Some(delay))
    }

    /// Jump to the epilogue.
    pub fn ret(&mut self) -> &mut Self {
        self.jump(EPILOGUE_LABEL)
    }

    /// Resolves labels, splits blocks and computes consumed-register sets.
    ///
    /// An empty epilogue block is always appended; labels placed after the
    /// last instruction name it, and it also answers to [`EPILOGUE_LABEL`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if a branch names an unknown label or
    /// a label is defined twice.
    pub fn finish(self) -> Result<Function> {
        let count = self.ops.len();

        // block starts: 0, every label, every instruction after a branch
        let mut points: Vec<usize> = vec![0, count];
        points.extend(self.labels.iter().map(|(_, idx)| *idx));
        for (idx, op) in self.ops.iter().enumerate() {
            if matches!(op, Pending::Branch { .. }) {
                points.push(idx + 1);
            }
        }
        points.sort_unstable();
        points.dedup();

        let mut ranges: Vec<(usize, usize)> = points.windows(2).map(|w| (w[0], w[1])).collect();
        // the epilogue is always the final, empty block
        ranges.push((count, count));

        let block_at = |idx: usize| -> Option<BlockId> {
            ranges.iter().position(|(s, _)| *s == idx).map(BlockId::new)
        };

        let epilogue = BlockId::new(ranges.len() - 1);
        let mut labels = BTreeMap::new();
        for (name, idx) in &self.labels {
            let block = if *idx == count {
                Some(epilogue)
            } else {
                block_at(*idx)
            };
            let block = block.ok_or_else(|| {
                Error::MalformedInput(format!("{}: label {name} has no block", self.name))
            })?;
            if labels.insert(name.clone(), block).is_some() {
                return Err(Error::MalformedInput(format!(
                    "{}: label {name} defined twice",
                    self.name
                )));
            }
        }
        labels.entry(EPILOGUE_LABEL.to_string()).or_insert(epilogue);

        let mut instructions = Vec::with_capacity(count);
        for op in self.ops {
            let op = match op {
                Pending::Ready(op) => op,
                Pending::Branch {
                    condition,
                    likely,
                    target,
                    delay,
                } => {
                    let target = labels.get(&target).copied().ok_or_else(|| {
                        Error::MalformedInput(format!("{}: unknown label {target}", self.name))
                    })?;
                    AtomicOp::Branch(BranchOp {
                        condition,
                        likely,
                        target,
                        delay: delay.map(Box::new),
                    })
                }
            };
            instructions.push(Instruction::new(op));
        }

        let mut blocks = Vec::with_capacity(ranges.len());
        for (i, (start, end)) in ranges.iter().enumerate() {
            let id = BlockId::new(i);
            let mut successors = Vec::new();
            let terminator = if end > start {
                instructions[end - 1].op.as_branch()
            } else {
                None
            };
            match terminator {
                Some(branch) if branch.is_unconditional() => successors.push(branch.target),
                Some(branch) => {
                    if i + 1 < ranges.len() {
                        successors.push(id.next());
                    }
                    if !successors.contains(&branch.target) {
                        successors.push(branch.target);
                    }
                }
                None => {
                    if i + 1 < ranges.len() {
                        successors.push(id.next());
                    }
                }
            }
            blocks.push(BasicBlock {
                id,
                start: *start,
                end: *end,
                successors,
            });
        }

        let mut function = Function {
            name: self.name,
            instructions,
            blocks,
            labels,
            epilogue: Some(epilogue),
            return_register: self.return_register,
        };
        function.validate()?;
        liveness::annotate(&mut function);
        Ok(function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_blocks_at_labels_and_branches() {
        let mut b = FunctionBuilder::new("split");
        b.mov(Register::V1, Register::A0)
            .branch(ConditionKind::Zero, [Register::V1.into()], "skip")
            .mov(Register::V0, Operand::Int(1))
            .label("skip")
            .mov(Register::V0, Operand::Int(2));
        let function = b.finish().unwrap();

        assert_eq!(function.blocks.len(), 4);
        assert_eq!(function.blocks[0].range(), 0..2);
        assert_eq!(function.blocks[1].range(), 2..3);
        assert_eq!(function.blocks[2].range(), 3..4);
        assert!(function.blocks[3].is_empty());
        assert_eq!(function.label("skip"), Some(BlockId::new(2)));
        assert_eq!(function.epilogue, Some(BlockId::new(3)));
        assert_eq!(
            function.blocks[0].successors,
            vec![BlockId::new(1), BlockId::new(2)]
        );
    }

    #[test]
    fn trailing_label_is_the_epilogue() {
        let mut b = FunctionBuilder::new("tail");
        b.mov(Register::V0, Register::A0)
            .branch(ConditionKind::Zero, [Register::V0.into()], "end")
            .mov(Register::V0, Operand::Int(0))
            .label("end");
        let function = b.finish().unwrap();

        assert_eq!(function.label("end"), function.epilogue);
        assert_eq!(function.label(EPILOGUE_LABEL), function.epilogue);
        assert_eq!(function.blocks.len(), 3);
    }

    #[test]
    fn r0_reads_become_zero() {
        let mut b = FunctionBuilder::new("neg");
        b.set(Register::V0, ExprKind::Sub, [Register::R0.into(), Register::A0.into()]);
        let function = b.finish().unwrap();
        match &function.instructions[0].op {
            AtomicOp::SetVar { src, .. } => assert_eq!(src.args[0], SimpleAtom::Int(0)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        let mut b = FunctionBuilder::new("bad");
        b.jump("nowhere");
        assert!(matches!(b.finish(), Err(Error::MalformedInput(_))));
    }
}
