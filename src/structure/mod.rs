//! Structuring of regions into statements and control elements.
//!
//! The input is a [`Region`] tree produced by an external control-flow
//! structuring pass. [`Structurer`] walks it innermost first:
//!
//! - plain blocks are folded instruction by instruction through the
//!   [`crate::expr::Folder`], with jumps to the next block treated as fall through
//! - at every position of a sequence the multi-block idioms (`abs`, `ash`,
//!   `rtype-of`) are tried first, longest window first
//! - loops, conditionals, short-circuit chains and exits are checked against
//!   the branch layout their kind requires and built into one control element
//!
//! A region whose branches do not fit its kind fails with
//! [`crate::Error::UnrecognizedBranchShape`]; an idiom that does not match is
//! not an error and leaves the blocks to the generic path.
//!
//! # Example
//!
//! ```rust,no_run
//! use formscope::prelude::*;
//!
//! let mut b = FunctionBuilder::new("abs");
//! b.branch(ConditionKind::NonZero, [Register::A0.into()], "done")
//!     .mov(Register::V0, Operand::Int(1))
//!     .label("done");
//! let function = b.finish()?;
//! let env = StaticTypeEnv::new(&function);
//! let config = EngineConfig::default();
//! let events = EventLog::new();
//! let mut folder = Folder::new(&function, &env, &config, &events);
//!
//! let region = Region::conditional(vec![CondArm::new(Region::block(0), Region::block(1))], None);
//! let _form = Structurer::new(&mut folder).build(&region)?;
//! # Ok::<(), formscope::Error>(())
//! ```

mod control;
mod convert;
mod idioms;
mod region;

pub use convert::Structurer;
pub use region::{CondArm, Region};
