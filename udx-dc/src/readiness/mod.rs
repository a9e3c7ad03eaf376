//! Deal readiness: required-document derivation and fact matching
//!
//! Two halves. `requirements` turns an intake scenario into the concrete
//! facts a deal must supply (which tax years, which statements), anchored to
//! the filing deadline. `engine` matches those facts against the deal's
//! classified documents and scores completeness.

pub mod engine;
pub mod requirements;
