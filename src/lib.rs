// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # formscope
//!
//! Expression and control-structure reconstruction for a decompiler.
//!
//! `formscope` takes functions that an instruction lifter has already turned
//! into atomic register-transfer operations, plus the block grouping found by
//! a control-flow structuring pass, and rebuilds nested expression and
//! statement trees out of them: `(set! v0-0 (+ arg0 arg1))` instead of two
//! moves and an add, `(while (nonzero? a0-0) ...)` instead of two branches.
//!
//! ## Features
//!
//! - **Push/fold protocol** - a symbolic operand stack folds each operation
//!   into the values of the registers it consumes, never across an observable
//!   effect
//! - **Idioms** - compare-and-negate `abs`, sign-tested `ash`, the three-way
//!   `rtype-of` tag dispatch, `min`/`max`, boolean materialization, float
//!   compares, division and field access
//! - **Control structures** - `while`, `until`, `cond` with and without else,
//!   `and`/`or` chains, `return` and `break` with their unreachable code kept
//! - **Type-directed casts** - through a pluggable [`types::TypeEnv`]
//! - **Parallel batches** - functions are independent and processed with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use formscope::prelude::*;
//!
//! let mut b = FunctionBuilder::new("sum");
//! b.mov(Register::V1, Register::A0)
//!     .set(Register::V0, ExprKind::Add, [Register::V1.into(), Register::A1.into()]);
//! let function = b.finish()?;
//! let env = StaticTypeEnv::new(&function);
//!
//! let engine = Reconstructor::new(EngineConfig::default());
//! let out = engine.reconstruct(&function, &Region::linear(&function), &env)?;
//! let text = out.render(&function, &env, &engine.config().operators).to_string();
//! assert_eq!(text, "(+ arg0 arg1)");
//! # Ok::<(), formscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - the lifter's input model and the [`ir::FunctionBuilder`]
//! - [`types`] - the type and naming service
//! - [`forms`] - the node arena, the element sum type and rendering
//! - [`expr`] - the operand stack and per-operator fold rules
//! - [`structure`] - regions, idioms and control-structure recognizers
//! - [`engine`] - configuration, the event log and the drivers
//! - [`Error`] and [`Result`] - function-scoped error handling
//!
//! ## Error Handling
//!
//! Recognizers that find nothing to do are not errors; the operations involved
//! are simply kept in a more literal form. Real failures (inconsistent
//! register bookkeeping, a region whose branches do not fit its kind, a
//! malformed function) abort the current function only and are reported as
//! [`Error::Reconstruction`] with the function name, the instruction index and
//! a short [`DiagnosticTag`].

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use formscope::prelude::*;
///
/// let mut b = FunctionBuilder::new("nop");
/// b.mov(Register::V0, Operand::Int(0));
/// let function = b.finish()?;
/// assert_eq!(function.instructions.len(), 1);
/// # Ok::<(), formscope::Error>(())
/// ```
pub mod prelude;

/// The input model supplied by the instruction lifter.
///
/// Registers, variables, atoms, simple expressions, conditions and atomic
/// operations, grouped into basic blocks and functions. Every instruction
/// carries the set of registers it reads for the last time, which is what
/// makes a fold legal.
pub mod ir;

/// Types of variables and values, and the coercions between them.
pub mod types;

/// Reconstructed expression and statement trees.
pub mod forms;

/// The push/fold protocol over a symbolic operand stack.
pub mod expr;

/// Regions, multi-block idioms and control-structure recognizers.
pub mod structure;

/// Configuration, structured events and the reconstruction drivers.
pub mod engine;

/// `formscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `formscope` Error type
///
/// # Examples
///
/// ```rust
/// use formscope::prelude::*;
///
/// let function = FunctionBuilder::new("empty").finish()?;
/// let env = StaticTypeEnv::new(&function);
/// let engine = Reconstructor::new(EngineConfig::default());
///
/// match engine.reconstruct(&function, &Region::block(7), &env) {
///     Err(Error::Reconstruction { tag, .. }) => assert_eq!(tag, DiagnosticTag::InvalidHandle),
///     other => panic!("unexpected {other:?}"),
/// }
/// # Ok::<(), formscope::Error>(())
/// ```
pub use error::{DiagnosticTag, Error};
