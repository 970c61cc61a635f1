//! Ledger Store: every SQL statement against jobs, applicants and applications.
//!
//! Functions return `sqlx::Error` untouched; callers translate it into their
//! own error kinds (`PolicyError::Persistence`, `RatingError::Persistence`).

pub mod applications;
pub mod jobs;

pub use applications::*;
pub use jobs::*;
