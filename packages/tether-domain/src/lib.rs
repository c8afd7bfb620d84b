pub mod extraction;
pub mod grounded;
pub mod projection;
pub mod record;

pub use extraction::{ExtractionResult, SchemaViolation};
pub use grounded::GroundedResult;
pub use projection::project;
pub use record::{Candidate, Record, RecordId};
