//! # verdict-sandbox
//!
//! Rule interpreter back ends for the Verdict decision engine.
//!
//! Both implement [`verdict_core::traits::RuleInterpreter`] over the same
//! byte contract: canonical rules JSON and canonical context JSON in,
//! `{"decision", "code", "reason"?}` JSON out.
//!
//! - [`wasm::WasmInterpreter`] runs an externally supplied interpreter module
//!   under wasmtime with fuel, memory limits and an instance pool.
//! - [`native::NativeInterpreter`] evaluates rules in-process.

pub mod limits;
pub mod native;
pub mod wasm;

pub use limits::SandboxLimits;
pub use native::NativeInterpreter;
pub use wasm::WasmInterpreter;
