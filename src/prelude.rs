//! # formscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits of the formscope library: building lifted functions, describing
//! their regions and types, and running the reconstruction engine.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all formscope operations
pub use crate::Error;

/// The result type used throughout formscope
pub use crate::Result;

/// Short classification of a failure
pub use crate::DiagnosticTag;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Engine, configuration and batch driver
pub use crate::engine::{
    BatchReport, EngineConfig, FunctionJob, IdiomSet, Reconstruction, Reconstructor,
};

/// Structured diagnostics
pub use crate::engine::{Event, EventKind, EventLog};

// ================================================================================================
// Input Model
// ================================================================================================

/// Lifted functions and their construction
pub use crate::ir::{
    AtomicOp, BasicBlock, BlockId, Condition, ConditionKind, Delay, ExprKind, Function,
    FunctionBuilder, LoadKind, Operand, RegSet, Register, SimpleAtom, StoreKind, Variable,
};

/// Block groupings from the structuring pass
pub use crate::structure::{CondArm, Region, Structurer};

/// Type service
pub use crate::types::{Coercion, StaticTypeEnv, TypeEnv, TypeSpec};

// ================================================================================================
// Output
// ================================================================================================

/// Element trees and rendering
pub use crate::forms::{ElementId, FormElement, FormId, FormPool, Renderer, Sexp};

/// Lower-level folding access
pub use crate::expr::{Folder, FormStack};
