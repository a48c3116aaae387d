//! The reconstruction engine: configuration, diagnostics and the drivers.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     Reconstructor                             │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  EngineConfig              Immutable, shared by all functions │
//! │    ├─ IdiomSet              (enabled idiom families)          │
//! │    ├─ OperatorTable         (fixed operator names)            │
//! │    └─ limits / switches     (region depth, casts, return)     │
//! │                                                               │
//! │  reconstruct()             One function                       │
//! │    ├─ validate function and region                            │
//! │    ├─ Folder + Structurer   (push/fold, idioms, control)      │
//! │    ├─ return value finalisation                               │
//! │    └─ link check of the finished tree                         │
//! │                                                               │
//! │  reconstruct_batch()       rayon over FunctionJobs,           │
//! │                            results in a DashMap               │
//! │                                                               │
//! │  EventLog                  Folds, idioms, casts, failures     │
//! │                                                               │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures are always scoped to one function. In a batch the failing
//! function's error is stored in the [`BatchReport`] and the remaining
//! functions are processed normally; whether to skip it or retry with
//! [`EngineConfig::reduced`] is up to the caller.
//!
//! # Example
//!
//! ```rust
//! use formscope::prelude::*;
//!
//! let mut b = FunctionBuilder::new("inc");
//! b.set(Register::V0, ExprKind::Add, [Register::A0.into(), Operand::Int(1)]);
//! let jobs = vec![FunctionJob::linear(b.finish()?)];
//!
//! let engine = Reconstructor::new(EngineConfig::default());
//! let report = engine.reconstruct_batch(&jobs);
//! assert_eq!(report.succeeded(), vec!["inc".to_string()]);
//! # Ok::<(), formscope::Error>(())
//! ```

mod config;
mod events;
mod reconstruct;

pub use config::{EngineConfig, IdiomSet};
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use reconstruct::{BatchReport, FunctionJob, Reconstruction, Reconstructor};
