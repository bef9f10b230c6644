//! Background analysis jobs.
//!
//! - [`store`]: in-memory job registry polled by the status endpoint
//! - [`allocator`]: per-day sequential task numbers
//! - [`runner`]: the resolve -> fetch -> compute -> export pipeline

pub mod allocator;
pub mod runner;
pub mod store;

pub use allocator::{Allocation, TaskNumberAllocator};
pub use runner::{AnalysisError, AnalysisRunner};
pub use store::{Job, JobStore, OverallStatus, Task, TaskStatus, TaskUpdate};
