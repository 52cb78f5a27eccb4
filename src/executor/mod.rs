//! Test execution engine
//!
//! Process control, output comparison and the per-test lifecycle.

mod case;
mod compare;
mod process;

pub use case::{InputDelivery, StagedFile, StagingMode, TestCase};
pub use compare::Verifier;
