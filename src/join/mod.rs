//! Primary/secondary join engine
//!
//! - `outer` - left-outer join of a primary stream against named secondaries
//! - `combine` - field-level fold of same-shaped records sharing a key
//! - `clinical` - donor-centric clinical join
//! - `observation` - mutation occurrence join with consequence aggregation
//!
//! Joins assume their inputs are already colocated by key: every record that
//! can match lives in the same partition.

pub mod clinical;
pub mod combine;
pub mod observation;
pub mod outer;

pub use clinical::{donor_samples, join_clinical, ClinicalCollections};
pub use combine::{combine, merge_records, CombineFields};
pub use observation::{join_observations, ObservationCollections, ObservationJoin};
pub use outer::{join, Secondary};
