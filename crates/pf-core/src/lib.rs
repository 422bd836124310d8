//! pf-core: shared foundation for pipeflow.
//!
//! Contains:
//! - units (uom SI types, engineering-unit conversions)
//! - numeric (finite/positive checks, bounded steps)
//! - ids (compact IDs for topology objects)
//! - error (`PfError` for the numeric checks)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod units;

pub use error::{PfError, PfResult};
pub use ids::*;
pub use numeric::*;
