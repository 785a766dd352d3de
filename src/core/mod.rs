mod aggregation;
mod decision;
mod finding;
mod report;
mod review;
mod severity;
mod summary;

pub use aggregation::{AggregationResult, ImageFindings};
pub use decision::{API_VERSION, Decision, DecisionStatus, KIND};
pub use finding::Finding;
pub use report::{ResultGroup, ScanReport};
pub use review::{Container, ImageReview, ReviewSpec};
pub use severity::Severity;
pub use summary::{SCHEMA_VERSION, ScanSummary};
