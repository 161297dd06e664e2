//! UNWIND Engine - Reversible SQL Execution
//!
//! The pipeline layer: pre-state capture, inverse synthesis, and the
//! orchestrator that sequences forward operations (classify, confirm,
//! capture, execute, record) and reverts (lookup, synthesize, execute).
//! Works entirely against the [`unwind_store::SqlStore`],
//! [`unwind_store::HistoryLedger`], and [`unwind_oracle::QueryTranslator`]
//! trait seams, so every piece is testable without a live database or a
//! network.

pub mod capture;
pub mod inverse;
pub mod orchestrator;
pub mod testing;

pub use capture::CaptureEngine;
pub use inverse::{synthesize, InversePlan, InverseStatement, Synthesis};
pub use orchestrator::{Disposition, ExecutionReport, Orchestrator, RevertReport};
