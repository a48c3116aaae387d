//! Lifted input model.
//!
//! This module defines what the instruction lifter hands to the reconstruction
//! engine for one function: an ordered list of atomic operations, each with its
//! consumed-register set, partitioned into basic blocks with resolved branch
//! targets.
//!
//! # Architecture
//!
//! - [`Register`] / [`RegSet`] - machine registers and compact register sets
//! - [`Variable`] / [`SimpleAtom`] / [`SimpleExpression`] - operands and
//!   register-transfer expressions
//! - [`Condition`] / [`ConditionKind`] - branch and comparison tests
//! - [`AtomicOp`] / [`Instruction`] - one low-level effect and its liveness data
//! - [`BasicBlock`] / [`Function`] - the block partition of a function
//! - [`FunctionBuilder`] - label-based construction, mainly for tests and tools
//! - [`liveness`] - derives consumed sets with a backward data flow analysis
//!
//! Instruction decoding and block discovery are not part of this crate.

mod atom;
mod block;
mod builder;
mod condition;
mod function;
pub mod liveness;
mod op;
mod register;

pub use atom::{AccessMode, ExprKind, SimpleAtom, SimpleExpression, Variable};
pub use block::{BasicBlock, BlockId};
pub use builder::{Delay, FunctionBuilder, Operand, EPILOGUE_LABEL};
pub use condition::{Condition, ConditionKind};
pub use function::Function;
pub use op::{AtomicOp, BranchOp, Instruction, LoadKind, SpecialKind, StoreKind};
pub use register::{RegClass, RegSet, Register};
