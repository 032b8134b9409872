//! jwt-warden - multi-token-type JWT tool
//!
//! Issues, verifies and authorizes tokens using a jwt-warden configuration
//! file.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use jwt_warden::{config::Config, docs, guard::RouteRequirement, Payload};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// jwt-warden - multi-token-type JWT authentication with key rotation
#[derive(Parser, Debug)]
#[command(name = "jwt-warden")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "warden.yaml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign claims as a token of the given type
    Issue {
        /// Token type name
        #[arg(short = 't', long = "type")]
        token_type: String,

        /// Claims as a JSON object
        #[arg(long, default_value = "{}")]
        claims: String,
    },

    /// Verify a token and print its claims
    Verify {
        /// Token type name
        #[arg(short = 't', long = "type")]
        token_type: String,

        token: String,
    },

    /// List configured token types
    Types,

    /// Resolve and check the token requirements of a request
    Authorize {
        /// Route-declared token type (repeatable)
        #[arg(short = 'r', long = "require")]
        require: Vec<String>,

        /// Route has verification disabled
        #[arg(long, conflicts_with = "require")]
        public: bool,

        /// Request header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting jwt-warden v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    match args.command {
        Command::Issue { token_type, claims } => {
            let payload: Payload =
                serde_json::from_str(&claims).context("--claims must be a JSON object")?;
            let token = config.build_service()?.generate_token(&token_type, &payload)?;
            println!("{}", token);
        }
        Command::Verify { token_type, token } => {
            let payload = config.build_service()?.verify_token(&token_type, &token)?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Command::Types => {
            let registry = config.build_registry()?;
            let schemes = docs::security_schemes(&registry);
            let types: BTreeMap<&str, Value> = registry
                .iter()
                .map(|(name, token_type)| {
                    (
                        name,
                        json!({
                            "header_name": token_type.header_name,
                            "expires_in": token_type.expires_in.as_secs(),
                            "algorithm": token_type.algorithm,
                            "issuer": token_type.issuer,
                            "mandatory": config.mandatory_types.iter().any(|m| m == name),
                            "security_scheme": schemes.get(name),
                        }),
                    )
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&types)?);
        }
        Command::Authorize {
            require,
            public,
            headers,
        } => {
            let headers = headers
                .iter()
                .map(|raw| parse_header(raw))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let route = if public {
                RouteRequirement::Disabled
            } else if require.is_empty() {
                RouteRequirement::Implicit
            } else {
                RouteRequirement::Explicit(require)
            };

            let resolver = config.build_resolver()?;
            let outcome = resolver.evaluate(&route, &headers)?;
            let payloads = outcome.map(|o| o.into_inner()).unwrap_or_default();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "authorized": true,
                    "payloads": payloads,
                }))?
            );
        }
    }

    Ok(())
}

fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("Header '{}' must look like 'Name: value'", raw),
    }
}
