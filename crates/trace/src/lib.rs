//! Trace & progress bus (spec §3, §4.10): per-session progress events and
//! the process-wide trace collector. The only two pieces of shared
//! mutable in-process state in the workspace (Design Notes §9) besides the
//! filesystem; both are explicitly constructed at process start, never
//! reached via module-scope globals.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod collector;
pub mod progress;

pub use collector::{TraceCollector, TraceStats};
pub use progress::ProgressBus;
