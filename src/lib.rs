//! Spaced repetition scheduling for drill items.
//!
//! - SM2, SM5 and Simple8 interval algorithms behind one [`Scheduler`]
//! - The SM5 optimal factor matrix, passed in explicitly by the host
//! - Due-status classification and session building
//!
//! Persistence lives with the host; the `db` and `api` modules are the
//! reference host used by the `spaced-drill` binary.

pub mod api;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod matrix;
pub mod models;
pub mod session;
pub mod srs;

pub use classify::classify;
pub use config::{AlgorithmKind, DrillConfig, LeechMethod};
pub use error::{DrillError, Result};
pub use matrix::{FactorUpdate, OptimalFactorMatrix};
pub use models::{Classification, DrillItem, DueStatus, ItemState, Quality};
pub use session::{DrillSession, EndReason, Presentation, RatedItem, SessionReport};
pub use srs::{format_interval, round_float, Review, Scheduler};
