//! HTTP API handlers for shelf-ingest
//!
//! Authentication happens upstream; the caller's identity arrives in the
//! `x-user-id` header and scopes every job and review lookup.

pub mod health;
pub mod jobs;
pub mod review;
pub mod scans;

mod user;

pub use health::health_routes;
pub use jobs::job_routes;
pub use review::review_routes;
pub use scans::scan_routes;
pub use user::{UserId, USER_ID_HEADER};
