//! Atomic operations, the unit of input handed over by the lifter.
//!
//! Each [`Instruction`] wraps one [`AtomicOp`] together with its consumed
//! register set: the registers whose values are read here for the last time.
//! Folding an operand into a consumer is only legal when the consumer consumes
//! the operand's register, which is how the engine keeps reconstructed
//! expressions equivalent to the instruction stream.

use std::fmt;

use strum::{Display, IntoStaticStr};

use crate::ir::{BlockId, Condition, ConditionKind, RegSet, Register, SimpleAtom, SimpleExpression, Variable};

/// Signedness / domain of a memory load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum LoadKind {
    /// Sign extending integer load
    #[strum(serialize = "signed")]
    Signed,
    /// Zero extending integer load
    #[strum(serialize = "unsigned")]
    Unsigned,
    /// Load into a float register
    #[strum(serialize = "float")]
    Float,
}

/// Domain of a memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum StoreKind {
    /// Integer store
    #[strum(serialize = "integer")]
    Integer,
    /// Store of a float register
    #[strum(serialize = "float")]
    Float,
}

/// Operations without operands that the engine never folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum SpecialKind {
    /// No operation; dropped during conversion
    #[strum(serialize = "nop")]
    Nop,
    /// Breakpoint trap
    #[strum(serialize = "break!")]
    Break,
    /// Yield to the scheduler
    #[strum(serialize = "suspend")]
    Suspend,
}

/// A conditional branch, possibly with a delay slot.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchOp {
    /// The branch is taken when this condition holds
    pub condition: Condition,
    /// Branch-likely: the delay slot only executes when the branch is taken
    pub likely: bool,
    /// Block the branch jumps to
    pub target: BlockId,
    /// Operation in the delay slot, `None` for a nop
    pub delay: Option<Box<AtomicOp>>,
}

impl BranchOp {
    /// Returns `true` for an unconditional jump.
    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        self.condition.is_always()
    }

    /// Returns the delay-slot operation when it is a real operation.
    #[must_use]
    pub fn delay_op(&self) -> Option<&AtomicOp> {
        self.delay
            .as_deref()
            .filter(|op| !matches!(op, AtomicOp::Special(SpecialKind::Nop)))
    }
}

/// One indivisible low-level effect.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicOp {
    /// `dst = src`
    SetVar {
        /// Destination
        dst: Variable,
        /// Value
        src: SimpleExpression,
    },
    /// `dst = (condition)` as a boolean, for comparisons the lifter already merged
    SetCondition {
        /// Destination
        dst: Variable,
        /// Comparison producing `'#t` or `'#f`
        condition: Condition,
    },
    /// `dst = memory[base + offset]`
    Load {
        /// Destination
        dst: Variable,
        /// Base address
        base: SimpleAtom,
        /// Constant byte offset
        offset: i64,
        /// Access width in bytes
        size: u8,
        /// Signedness or float domain
        kind: LoadKind,
    },
    /// `memory[base + offset] = value`
    Store {
        /// Base address
        base: SimpleAtom,
        /// Constant byte offset
        offset: i64,
        /// Stored value
        value: SimpleAtom,
        /// Access width in bytes
        size: u8,
        /// Integer or float store
        kind: StoreKind,
    },
    /// `lo = a / b; hi = a % b`
    Divide {
        /// Dividend
        a: SimpleAtom,
        /// Divisor
        b: SimpleAtom,
        /// Signed division
        signed: bool,
    },
    /// `fcc = (kind a b)`
    FloatCompare {
        /// Float comparison kind
        kind: ConditionKind,
        /// Left operand
        a: SimpleAtom,
        /// Right operand
        b: SimpleAtom,
    },
    /// Call through a register, result in the return register
    Call {
        /// Register holding the function
        function: Variable,
        /// Argument registers read by the call, in order
        args: Vec<Variable>,
        /// Written return register, if the call produces a value
        result: Option<Variable>,
    },
    /// Conditional or unconditional branch
    Branch(BranchOp),
    /// `if (test == 0) == on_zero { dst = src }`
    ConditionalMove {
        /// Destination, left unchanged when the move does not happen
        dst: Variable,
        /// Value moved
        src: SimpleAtom,
        /// Tested register
        test: Variable,
        /// Move when `test` is zero (`movz`) rather than non-zero (`movn`)
        on_zero: bool,
    },
    /// Operand-less special instruction
    Special(SpecialKind),
    /// Any instruction the lifter could not model, kept opaque
    Asm {
        /// Mnemonic as disassembled
        mnemonic: String,
        /// Written register, if any
        dst: Option<Variable>,
        /// Operands read
        srcs: Vec<SimpleAtom>,
    },
}

impl AtomicOp {
    /// Creates a `dst = src` operation.
    #[must_use]
    pub fn set_var(dst: Variable, src: impl Into<SimpleExpression>) -> Self {
        AtomicOp::SetVar {
            dst,
            src: src.into(),
        }
    }

    /// Returns the branch payload if this is a branch.
    #[must_use]
    pub fn as_branch(&self) -> Option<&BranchOp> {
        match self {
            AtomicOp::Branch(b) => Some(b),
            _ => None,
        }
    }

    /// Returns `true` for a nop.
    #[must_use]
    pub fn is_nop(&self) -> bool {
        matches!(self, AtomicOp::Special(SpecialKind::Nop))
    }

    /// Returns the single variable this operation defines, if any.
    #[must_use]
    pub fn dst(&self) -> Option<Variable> {
        match self {
            AtomicOp::SetVar { dst, .. }
            | AtomicOp::SetCondition { dst, .. }
            | AtomicOp::Load { dst, .. }
            | AtomicOp::ConditionalMove { dst, .. } => Some(*dst),
            AtomicOp::Call { result, .. } => *result,
            AtomicOp::Asm { dst, .. } => *dst,
            _ => None,
        }
    }

    /// Returns the registers read by this operation, delay slot included.
    #[must_use]
    pub fn reads(&self) -> RegSet {
        fn atom(set: &mut RegSet, a: &SimpleAtom) {
            if let SimpleAtom::Var(v) = a {
                set.insert(v.reg);
            }
        }

        let mut set = RegSet::new();
        match self {
            AtomicOp::SetVar { src, .. } => set = src.reads(),
            AtomicOp::SetCondition { condition, .. } => set = condition.reads(),
            AtomicOp::Load { base, .. } => atom(&mut set, base),
            AtomicOp::Store { base, value, .. } => {
                atom(&mut set, base);
                atom(&mut set, value);
            }
            AtomicOp::Divide { a, b, .. } | AtomicOp::FloatCompare { a, b, .. } => {
                atom(&mut set, a);
                atom(&mut set, b);
            }
            AtomicOp::Call { function, args, .. } => {
                set.insert(function.reg);
                set.extend(args.iter().map(|v| v.reg));
            }
            AtomicOp::Branch(branch) => {
                set = branch.condition.reads();
                if let Some(delay) = branch.delay_op() {
                    set.union_with(&delay.reads());
                }
            }
            AtomicOp::ConditionalMove { dst, src, test, .. } => {
                // the destination keeps its old value when the move is skipped
                set.insert(dst.reg);
                set.insert(test.reg);
                atom(&mut set, src);
            }
            AtomicOp::Special(_) => {}
            AtomicOp::Asm { srcs, .. } => {
                for src in srcs {
                    atom(&mut set, src);
                }
            }
        }
        set
    }

    /// Returns the registers written by this operation, delay slot included.
    #[must_use]
    pub fn writes(&self) -> RegSet {
        match self {
            AtomicOp::Divide { .. } => [Register::HI, Register::LO].into_iter().collect(),
            AtomicOp::FloatCompare { .. } => RegSet::of(Register::FCC),
            AtomicOp::Branch(branch) => branch
                .delay_op()
                .map(AtomicOp::writes)
                .unwrap_or_default(),
            AtomicOp::Call { result, .. } => {
                // calls clobber every temporary, only the result is modelled
                result.map(|v| RegSet::of(v.reg)).unwrap_or_default()
            }
            other => other.dst().map(|v| RegSet::of(v.reg)).unwrap_or_default(),
        }
    }
}

impl fmt::Display for AtomicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomicOp::Special(kind) => write!(f, "{kind}"),
            AtomicOp::Asm { mnemonic, .. } => f.write_str(mnemonic),
            AtomicOp::SetVar { dst, src } => write!(f, "set {:?} {}", dst, src.kind),
            AtomicOp::Branch(b) => write!(f, "branch {:?} -> {}", b.condition.kind, b.target),
            other => write!(f, "{other:?}"),
        }
    }
}

/// An atomic operation as it appears in a function, with liveness bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation
    pub op: AtomicOp,
    /// Registers whose value is read for the last time by this operation
    pub consumed: RegSet,
}

impl Instruction {
    /// Wraps `op` with an empty consumed set.
    #[must_use]
    pub fn new(op: AtomicOp) -> Self {
        Instruction {
            op,
            consumed: RegSet::new(),
        }
    }

    /// Wraps `op` with the given consumed set.
    #[must_use]
    pub fn with_consumed(op: AtomicOp, consumed: RegSet) -> Self {
        Instruction { op, consumed }
    }
}
