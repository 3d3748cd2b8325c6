//! # verdict-resolve
//!
//! Where rules come from and how they are merged.
//!
//! - [`resolver::RuleResolver`] dereferences `http(s)://` and `ipfs://` rule
//!   documents, checks them against a pinned SHA-256 of the fetched bytes,
//!   and validates their structure before deserializing.
//! - [`transport::HttpTransport`] is the blocking HTTP transport behind it.
//! - [`combine::combine`] and [`combine::combine_session_policies`] AND an
//!   authority rule set with session rules.

pub mod combine;
pub mod resolver;
pub mod schema;
pub mod settings;
pub mod transport;

pub use combine::{combine, combine_session_policies};
pub use resolver::{resolve_inline, RuleReference, RuleResolver, RuleSource};
pub use settings::ResolverSettings;
pub use transport::HttpTransport;
