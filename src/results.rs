//! Record sets, per-step results and the name-keyed aggregate of a chain.

mod record_set;
mod row;
mod step_result;

pub use record_set::RecordSet;
pub use row::Row;
pub use step_result::{StepData, StepResult, StepResults};
