//! Statement parsing: the driver, the incremental reducer and its grammar,
//! error localisation and query fingerprints.

pub mod diagnostic;
pub mod driver;
mod grammar;
pub mod hash;
pub mod reducer;

pub use diagnostic::{parse_error_location, UNKNOWN_LOCATION};
pub use driver::{DriverState, FirewallParser, ParsedQuery};
pub use hash::QueryHash;
pub use reducer::{Failure, ParseContext, Reducer};
