// switch-common - Shared types and wire formats for the SwitchDB client
//
// Everything here is transport-independent: profiles, the error taxonomy,
// the query encoder, the credential signer, and the mail envelope.

pub mod error;
pub mod mail;
pub mod query;
pub mod signer;
pub mod types;

// Re-export for convenience
pub use error::*;
pub use mail::*;
pub use query::{Combinator, Filter, FilterOp, Query, Sort, SortDirection, UNLIMITED};
pub use signer::*;
pub use types::*;
