//! jwt-warden Library
//!
//! Multi-token-type JWT authentication engine for HTTP services.
//!
//! # Features
//!
//! - **Token Types**: Independent `access`, `refresh`, `service`, ... profiles,
//!   each with its own header, lifetime, algorithm, issuer and header claims
//! - **Key Rotation**: Tokens carry the `kid` that signed them; old keys keep
//!   verifying while they stay registered
//! - **Route Requirements**: Mandatory and per-route token types resolved and
//!   verified per request, failing fast on the first rejection
//! - **Typed Errors**: Every verification step reports its own error kind
//!
//! # Example
//!
//! ```no_run
//! use jwt_warden::{config::Config, guard::{AuthRequest, RouteRequirement}};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("warden.yaml")?;
//!     let resolver = config.build_resolver()?;
//!
//!     let request = AuthRequest::new("GET", "/me")
//!         .with_header("Authorization", "Bearer eyJ...");
//!     let outcome = resolver.evaluate(&RouteRequirement::explicit(["access"]), &request)?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod docs;
pub mod guard;
pub mod metrics;

// Re-export commonly used types
pub use auth::{AuthError, JwtService, Payload};
pub use config::Config;
pub use guard::{RequirementResolver, RouteRequirement, VerificationOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
