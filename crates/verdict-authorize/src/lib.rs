//! # verdict-authorize
//!
//! The end-to-end authorization runtime.
//!
//! [`authorizer::Authorizer`] resolves the authoritative rules, verifies and
//! ANDs in session policies, runs the fail-closed decision engine and, on
//! ALLOW only, issues a signed decision proof. [`config::RuntimeConfig`]
//! holds the TOML-configurable parts: proof lifetime and domain, sandbox
//! limits, resolver settings and the session lifetime cap.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = RuntimeConfig::from_file(Path::new("verdict.toml"))?;
//! let authorizer = Authorizer::from_config(&config, Box::new(NativeInterpreter::new()), Arc::new(SystemClock))?;
//! let outcome = authorizer.authorize(&request, &TrustMode::attested(issuers), &signer)?;
//! ```

pub mod authorizer;
pub mod config;

pub use authorizer::{Authorization, AuthorizationRequest, Authorizer};
pub use config::RuntimeConfig;
