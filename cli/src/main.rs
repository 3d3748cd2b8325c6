//! Verdict command-line interface.
//!
//! Thin wrapper over the Verdict crates for operators and scripts. Documents
//! are read from files, or from stdin when the path is `-`. Results go to
//! stdout as JSON; logs go to stderr.
//!
//! Usage:
//!   verdict canonicalize rules.json --rules
//!   verdict canonicalize context.json
//!   verdict hash --kind context context.json
//!   verdict evaluate --rules rules.json --context context.json --trust 0xIssuer
//!   verdict --config verdict.toml authorize request.json --legacy
//!   verdict session-create --rules overlay.json --expires-in 600
//!   verdict session-verify <encoded-policy>
//!
//! Signing commands read the key from `VERDICT_PRIVATE_KEY`.
//!
//! Exit status: 0 on success or ALLOW, 2 on REJECT, 1 on error.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::Address;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use verdict_core::traits::SigningCapability;

use verdict_attest::SignatureAttestationVerifier;
use verdict_authorize::{AuthorizationRequest, Authorizer, RuntimeConfig};
use verdict_contracts::{
    context::Context,
    error::{EngineError, EngineResult},
    rule::RuleSet,
    trust::TrustMode,
};
use verdict_core::{
    canonical::{canonicalize, canonicalize_value, rule_set_canonical_form},
    hashing::{context_hash, hash_bytes, rule_set_hash, to_hex},
    traits::{Clock, RuleInterpreter, SystemClock},
    DecisionEngine, LocalKeySigner,
};
use verdict_proof::{
    decode_session_policy, decode_session_policy_str, encode_session_policy, SessionPolicyEngine,
};
use verdict_sandbox::{NativeInterpreter, WasmInterpreter};

/// Environment variable holding the hex private key for signing commands.
const PRIVATE_KEY_ENV: &str = "VERDICT_PRIVATE_KEY";

// ── CLI definition ────────────────────────────────────────────────────────────

/// Verdict: deterministic, fail-closed authorization decisions.
#[derive(Parser)]
#[command(
    name = "verdict",
    about = "Verdict policy decision engine",
    long_about = "Canonicalizes and hashes rule sets and contexts, evaluates rules in a\n\
                  sandbox, issues signed decision proofs and manages session policies."
)]
struct Cli {
    /// Runtime configuration (TOML). Defaults apply when omitted.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the canonical JSON form of a document.
    Canonicalize {
        /// JSON document, or `-` for stdin.
        input: PathBuf,
        /// Treat the document as a rule set (sort sibling rules by id).
        #[arg(long)]
        rules: bool,
    },
    /// Print the content hash of a rule set, a context or raw bytes.
    Hash {
        /// Document, or `-` for stdin.
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = HashKind::Rules)]
        kind: HashKind,
    },
    /// Evaluate a rule set against a context and print the decision.
    Evaluate {
        #[arg(long, value_name = "FILE")]
        rules: PathBuf,
        #[arg(long, value_name = "FILE")]
        context: PathBuf,
        #[command(flatten)]
        trust: TrustArgs,
        #[command(flatten)]
        interpreter: InterpreterArgs,
    },
    /// Run a full authorization request and print the outcome.
    Authorize {
        /// Authorization request JSON, or `-` for stdin.
        request: PathBuf,
        #[command(flatten)]
        trust: TrustArgs,
        #[command(flatten)]
        interpreter: InterpreterArgs,
    },
    /// Sign a session policy as the receiver and print its transport form.
    SessionCreate {
        #[arg(long, value_name = "FILE")]
        rules: PathBuf,
        /// Policy lifetime.
        #[arg(long, value_name = "SECONDS")]
        expires_in: u64,
    },
    /// Verify a session policy and print its receiver and rules.
    SessionVerify {
        /// Encoded policy, raw JSON, or `@FILE`.
        policy: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum HashKind {
    /// Canonical rule set.
    Rules,
    /// Normalized, canonical context.
    Context,
    /// Exact input bytes, as pinned for remote rule documents.
    Raw,
}

#[derive(Args)]
struct TrustArgs {
    /// Trusted attestation issuer address. Repeat for several issuers.
    #[arg(long = "trust", value_name = "ADDRESS")]
    trusted: Vec<String>,
    /// Do not verify attestations at all (lower trust).
    #[arg(long, conflicts_with = "trusted")]
    legacy: bool,
}

impl TrustArgs {
    /// Without `--trust` or `--legacy` the trusted set is empty, so any
    /// attested document rejects.
    fn mode(&self) -> EngineResult<TrustMode> {
        if self.legacy {
            return Ok(TrustMode::LegacyUnverified);
        }
        let issuers = self
            .trusted
            .iter()
            .map(|text| {
                Address::from_str(text.trim()).map_err(|e| EngineError::Config {
                    reason: format!("invalid trusted issuer '{text}': {e}"),
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(TrustMode::attested(issuers))
    }
}

#[derive(Args)]
struct InterpreterArgs {
    /// WASM interpreter module. The built-in interpreter is used otherwise.
    #[arg(long, value_name = "MODULE")]
    wasm: Option<PathBuf>,
}

impl InterpreterArgs {
    fn build(&self, config: &RuntimeConfig) -> EngineResult<Box<dyn RuleInterpreter>> {
        match &self.wasm {
            Some(path) => Ok(Box::new(WasmInterpreter::from_file(path, config.sandbox.clone())?)),
            None => Ok(Box::new(NativeInterpreter::new())),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for pipeline detail.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(outcome) => {
            println!("{}", outcome.output);
            if !outcome.allow {
                std::process::exit(2);
            }
        }
        Err(e) => {
            eprintln!("verdict: {} [{}]", e, e.code());
            std::process::exit(1);
        }
    }
}

/// What a command prints, and whether it ends in success (or ALLOW).
#[derive(Debug)]
struct Outcome {
    output: String,
    allow: bool,
}

impl Outcome {
    fn ok(output: String) -> Self {
        Self { output, allow: true }
    }

    fn json<T: Serialize>(value: &T, allow: bool) -> EngineResult<Self> {
        let output = serde_json::to_string_pretty(value).map_err(|e| EngineError::Config {
            reason: format!("failed to encode output: {e}"),
        })?;
        Ok(Self { output, allow })
    }
}

/// Run one command.
fn run(cli: Cli) -> EngineResult<Outcome> {
    let config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    debug!(config = ?cli.config, "configuration loaded");

    match cli.command {
        Command::Canonicalize { input, rules } => canonicalize_cmd(&input, rules),
        Command::Hash { input, kind } => hash_cmd(&input, kind),
        Command::Evaluate {
            rules,
            context,
            trust,
            interpreter,
        } => evaluate_cmd(&config, &rules, &context, &trust, &interpreter),
        Command::Authorize {
            request,
            trust,
            interpreter,
        } => authorize_cmd(&config, &request, &trust, &interpreter),
        Command::SessionCreate { rules, expires_in } => {
            session_create_cmd(&config, &rules, expires_in)
        }
        Command::SessionVerify { policy } => session_verify_cmd(&policy),
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn canonicalize_cmd(input: &Path, rules: bool) -> EngineResult<Outcome> {
    let bytes = read_input(input)?;
    let form = if rules {
        rule_set_canonical_form(&parse_rules(&bytes)?)?
    } else {
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| EngineError::Canonicalization {
            reason: format!("input is not JSON: {e}"),
        })?;
        canonicalize_value(value)?
    };
    Ok(Outcome::ok(form.as_str().to_string()))
}

fn hash_cmd(input: &Path, kind: HashKind) -> EngineResult<Outcome> {
    let bytes = read_input(input)?;
    let digest = match kind {
        HashKind::Rules => rule_set_hash(&parse_rules(&bytes)?)?,
        HashKind::Context => context_hash(&parse_context(&bytes)?)?,
        HashKind::Raw => hash_bytes(&bytes),
    };
    Ok(Outcome::ok(to_hex(&digest)))
}

fn evaluate_cmd(
    config: &RuntimeConfig,
    rules: &Path,
    context: &Path,
    trust: &TrustArgs,
    interpreter: &InterpreterArgs,
) -> EngineResult<Outcome> {
    let engine = DecisionEngine::new(
        interpreter.build(config)?,
        Box::new(SignatureAttestationVerifier::new()),
        Arc::new(SystemClock),
    );
    let decision = engine.evaluate_json(&read_input(rules)?, &read_input(context)?, &trust.mode()?);
    Outcome::json(&decision, decision.is_allow())
}

fn authorize_cmd(
    config: &RuntimeConfig,
    request: &Path,
    trust: &TrustArgs,
    interpreter: &InterpreterArgs,
) -> EngineResult<Outcome> {
    let request: AuthorizationRequest =
        serde_json::from_slice(&read_input(request)?).map_err(|e| EngineError::InvalidContext {
            reason: format!("invalid authorization request: {e}"),
        })?;
    let authorizer =
        Authorizer::from_config(config, interpreter.build(config)?, Arc::new(SystemClock))?;
    let signer = signer_from_env()?;

    let outcome = authorizer.authorize(&request, &trust.mode()?, &signer)?;
    Outcome::json(&outcome, outcome.decision().is_allow())
}

fn session_create_cmd(config: &RuntimeConfig, rules: &Path, expires_in: u64) -> EngineResult<Outcome> {
    let rules = parse_rules(&read_input(rules)?)?;
    let signer = signer_from_env()?;

    let clock = Arc::new(SystemClock);
    let expires_at = clock
        .now()
        .checked_add(expires_in)
        .ok_or_else(|| EngineError::MalformedSessionPolicy {
            reason: format!("lifetime {expires_in}s overflows"),
        })?;
    let mut engine = SessionPolicyEngine::new(clock);
    if let Some(max) = config.session.max_ttl_seconds {
        engine = engine.with_max_ttl(max);
    }

    let payload = engine.create(signer.address(), &rules, expires_at, &signer)?;
    Ok(Outcome::ok(encode_session_policy(&payload)?))
}

fn session_verify_cmd(policy: &str) -> EngineResult<Outcome> {
    let text = match policy.strip_prefix('@') {
        Some(path) => String::from_utf8_lossy(&read_input(Path::new(path))?).into_owned(),
        None => policy.to_string(),
    };
    let payload = decode_session_policy_str(&text)?;
    let rule = decode_session_policy(&payload, SystemClock.now())?;

    Outcome::json(
        &json!({
            "receiver": payload.receiver,
            "expiresAt": payload.expires_at,
            "rule": canonicalize(&rule)?.as_value(),
        }),
        true,
    )
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn read_input(path: &Path) -> EngineResult<Vec<u8>> {
    let mut bytes = Vec::new();
    if path == Path::new("-") {
        std::io::stdin()
            .read_to_end(&mut bytes)
            .map_err(|e| EngineError::Config {
                reason: format!("failed to read stdin: {e}"),
            })?;
        return Ok(bytes);
    }
    std::fs::read(path).map_err(|e| EngineError::Config {
        reason: format!("failed to read '{}': {}", path.display(), e),
    })
}

fn parse_rules(bytes: &[u8]) -> EngineResult<RuleSet> {
    serde_json::from_slice(bytes).map_err(|e| EngineError::InvalidRuleDocument {
        reason: e.to_string(),
    })
}

fn parse_context(bytes: &[u8]) -> EngineResult<Context> {
    serde_json::from_slice(bytes).map_err(|e| EngineError::InvalidContext {
        reason: e.to_string(),
    })
}

fn signer_from_env() -> EngineResult<LocalKeySigner> {
    let key = std::env::var(PRIVATE_KEY_ENV).map_err(|_| EngineError::Config {
        reason: format!("{PRIVATE_KEY_ENV} is not set"),
    })?;
    LocalKeySigner::from_private_key_hex(&key)
}
