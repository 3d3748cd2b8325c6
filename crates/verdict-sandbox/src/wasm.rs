//! WASM sandbox for an externally supplied rule interpreter module.
//!
//! The module must import nothing and export:
//!
//! - `memory`
//! - `alloc(len: i32) -> i32`, returning a pointer or a negative value on failure
//! - `free(ptr: i32, len: i32)`
//! - `evaluate(ctx_ptr, ctx_len, rules_ptr, rules_len, out_ptr, out_cap) -> i32`,
//!   returning the number of output bytes written, or a negative error code
//!
//! Each evaluation runs with a fresh fuel budget inside a store with memory
//! limits. NaN canonicalization is on and SIMD is off so the same bytes give
//! the same answer on every host. Every region handed out by `alloc` is
//! returned through `free` when the evaluation scope ends, on success and on
//! failure alike. Instances that trapped or failed are never reused.

use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, info, warn};
use wasmtime::{
    Config, Engine, ExternType, Linker, Memory, Module, Store, StoreLimits, StoreLimitsBuilder,
    TypedFunc, ValType,
};

use verdict_contracts::error::{EngineError, EngineResult};
use verdict_core::traits::RuleInterpreter;

use crate::limits::SandboxLimits;

/// Fuel granted to each `free` call during release, so regions are returned
/// even after the evaluation ran out of fuel.
const RELEASE_FUEL: u64 = 1_000_000;

type EvaluateFn = TypedFunc<(i32, i32, i32, i32, i32, i32), i32>;

#[derive(Debug)]
struct SandboxState {
    limits: StoreLimits,
}

/// One instantiated module with its store and typed exports.
struct PooledInstance {
    store: Store<SandboxState>,
    instance: wasmtime::Instance,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    free: TypedFunc<(i32, i32), ()>,
    evaluate: EvaluateFn,
    /// Set when a region could not be released; the instance is then dropped
    /// instead of returned to the pool.
    poisoned: bool,
}

/// Runs a WASM rule interpreter module in an isolated, metered store.
pub struct WasmInterpreter {
    engine: Engine,
    module: Module,
    limits: SandboxLimits,
    pool: Mutex<Vec<PooledInstance>>,
}

impl WasmInterpreter {
    /// Compile and validate a module from its binary (or text) form.
    pub fn from_bytes(wasm: &[u8], limits: SandboxLimits) -> EngineResult<Self> {
        let engine = Engine::new(&sandbox_config()).map_err(|e| sandbox_error("engine setup", e))?;
        let module = Module::new(&engine, wasm).map_err(|e| sandbox_error("module compilation", e))?;
        validate_module_exports(&module)?;

        info!(
            max_fuel = limits.max_fuel,
            max_memory_bytes = limits.max_memory_bytes,
            pool_size = limits.pool_size,
            "loaded interpreter module"
        );

        Ok(Self {
            engine,
            module,
            limits,
            pool: Mutex::new(Vec::new()),
        })
    }

    /// Read, compile and validate a module from disk.
    pub fn from_file(path: &Path, limits: SandboxLimits) -> EngineResult<Self> {
        let wasm = std::fs::read(path).map_err(|e| EngineError::Config {
            reason: format!("cannot read interpreter module '{}': {e}", path.display()),
        })?;
        Self::from_bytes(&wasm, limits)
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Number of idle instances ready for reuse.
    pub fn idle_instances(&self) -> usize {
        self.pool.lock().map(|pool| pool.len()).unwrap_or(0)
    }

    fn instantiate(&self) -> EngineResult<PooledInstance> {
        let memory_limit = usize::try_from(self.limits.max_memory_bytes).unwrap_or(usize::MAX);
        let limits = StoreLimitsBuilder::new()
            .memory_size(memory_limit)
            .memories(1)
            .tables(1)
            .table_elements(100_000)
            .instances(1)
            .build();
        let mut store = Store::new(&self.engine, SandboxState { limits });
        store.limiter(|state| &mut state.limits);

        let linker = Linker::<SandboxState>::new(&self.engine);
        let instance = linker
            .instantiate(&mut store, &self.module)
            .map_err(|e| sandbox_error("instantiation", e))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| EngineError::Sandbox {
                reason: "module does not export memory".to_string(),
            })?;
        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, "alloc")
            .map_err(|e| sandbox_error("alloc export", e))?;
        let free = instance
            .get_typed_func::<(i32, i32), ()>(&mut store, "free")
            .map_err(|e| sandbox_error("free export", e))?;
        let evaluate = instance
            .get_typed_func::<(i32, i32, i32, i32, i32, i32), i32>(&mut store, "evaluate")
            .map_err(|e| sandbox_error("evaluate export", e))?;

        debug!("instantiated interpreter module");
        Ok(PooledInstance {
            store,
            instance,
            memory,
            alloc,
            free,
            evaluate,
            poisoned: false,
        })
    }

    fn checkout(&self) -> EngineResult<PooledInstance> {
        let idle = self
            .pool
            .lock()
            .map_err(|_| EngineError::Sandbox {
                reason: "instance pool lock poisoned".to_string(),
            })?
            .pop();
        match idle {
            Some(instance) => Ok(instance),
            None => self.instantiate(),
        }
    }

    fn checkin(&self, instance: PooledInstance) {
        if instance.poisoned {
            return;
        }
        if let Ok(mut pool) = self.pool.lock() {
            if pool.len() < self.limits.pool_size {
                pool.push(instance);
            }
        }
    }
}

impl RuleInterpreter for WasmInterpreter {
    fn evaluate(&self, rules: &[u8], context: &[u8]) -> EngineResult<Vec<u8>> {
        let max_input = self.limits.max_input_bytes as usize;
        if rules.len() > max_input || context.len() > max_input {
            return Err(EngineError::Sandbox {
                reason: format!(
                    "input exceeds {max_input} bytes (rules {}, context {})",
                    rules.len(),
                    context.len()
                ),
            });
        }

        let mut instance = self.checkout()?;
        let result = instance.run(rules, context, &self.limits);
        match &result {
            Ok(output) => {
                debug!(output_bytes = output.len(), "sandbox evaluation finished");
                self.checkin(instance);
            }
            Err(err) => {
                warn!(error = %err, "sandbox evaluation failed; discarding instance");
            }
        }
        result
    }
}

impl PooledInstance {
    fn run(&mut self, rules: &[u8], context: &[u8], limits: &SandboxLimits) -> EngineResult<Vec<u8>> {
        self.store
            .set_fuel(limits.max_fuel)
            .map_err(|e| sandbox_error("fuel setup", e))?;

        let mut regions = ScopedRegions::new(self);
        let (ctx_ptr, ctx_len) = regions.place(context)?;
        let (rules_ptr, rules_len) = regions.place(rules)?;
        let out_cap = i32::try_from(limits.max_output_bytes).map_err(|_| EngineError::Sandbox {
            reason: "output capacity exceeds i32".to_string(),
        })?;
        let out_ptr = regions.reserve(out_cap)?;

        let written = regions.call_evaluate((ctx_ptr, ctx_len, rules_ptr, rules_len, out_ptr, out_cap))?;
        if written < 0 {
            return Err(EngineError::Sandbox {
                reason: format!("interpreter returned error code {written}"),
            });
        }
        if written > out_cap {
            return Err(EngineError::Sandbox {
                reason: format!("interpreter reported {written} output bytes, capacity is {out_cap}"),
            });
        }
        regions.read(out_ptr, written)
    }
}

/// Guard over the regions allocated during one evaluation. Dropping it
/// frees every region in reverse allocation order.
struct ScopedRegions<'a> {
    instance: &'a mut PooledInstance,
    regions: Vec<(i32, i32)>,
}

impl<'a> ScopedRegions<'a> {
    fn new(instance: &'a mut PooledInstance) -> Self {
        Self {
            instance,
            regions: Vec::new(),
        }
    }

    /// Allocate `len` bytes inside the sandbox.
    fn reserve(&mut self, len: i32) -> EngineResult<i32> {
        let ptr = self
            .instance
            .alloc
            .call(&mut self.instance.store, len)
            .map_err(|e| sandbox_error("alloc", e))?;
        if ptr < 0 {
            return Err(EngineError::Sandbox {
                reason: format!("alloc of {len} bytes failed with {ptr}"),
            });
        }
        self.regions.push((ptr, len));
        Ok(ptr)
    }

    /// Allocate a region and copy `bytes` into it.
    fn place(&mut self, bytes: &[u8]) -> EngineResult<(i32, i32)> {
        let len = i32::try_from(bytes.len()).map_err(|_| EngineError::Sandbox {
            reason: format!("buffer of {} bytes exceeds i32", bytes.len()),
        })?;
        let ptr = self.reserve(len)?;
        let offset = checked_offset(ptr)?;
        self.instance
            .memory
            .write(&mut self.instance.store, offset, bytes)
            .map_err(|e| sandbox_error("memory write", e))?;
        Ok((ptr, len))
    }

    fn call_evaluate(&mut self, args: (i32, i32, i32, i32, i32, i32)) -> EngineResult<i32> {
        self.instance
            .evaluate
            .call(&mut self.instance.store, args)
            .map_err(|e| sandbox_error("evaluate", e))
    }

    fn read(&mut self, ptr: i32, len: i32) -> EngineResult<Vec<u8>> {
        let offset = checked_offset(ptr)?;
        let mut buf = vec![0u8; checked_offset(len)?];
        self.instance
            .memory
            .read(&self.instance.store, offset, &mut buf)
            .map_err(|e| sandbox_error("memory read", e))?;
        Ok(buf)
    }
}

impl Drop for ScopedRegions<'_> {
    fn drop(&mut self) {
        while let Some((ptr, len)) = self.regions.pop() {
            if let Err(e) = self.instance.store.set_fuel(RELEASE_FUEL) {
                warn!(error = %e, "could not refuel sandbox for release");
            }
            if let Err(e) = self.instance.free.call(&mut self.instance.store, (ptr, len)) {
                warn!(ptr, len, error = %e, "failed to release sandbox region");
                self.instance.poisoned = true;
            }
        }
    }
}

fn checked_offset(value: i32) -> EngineResult<usize> {
    usize::try_from(value).map_err(|_| EngineError::Sandbox {
        reason: format!("negative offset {value}"),
    })
}

fn sandbox_error(stage: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::Sandbox {
        reason: format!("{stage}: {err}"),
    }
}

fn sandbox_config() -> Config {
    let mut cfg = Config::new();
    cfg.consume_fuel(true);
    cfg.cranelift_nan_canonicalization(true);
    cfg.wasm_simd(false);
    cfg.wasm_relaxed_simd(false);
    cfg.wasm_multi_memory(false);
    cfg.wasm_memory64(false);
    cfg
}

fn validate_module_exports(module: &Module) -> EngineResult<()> {
    if let Some(import) = module.imports().next() {
        return Err(EngineError::Sandbox {
            reason: format!(
                "interpreter module must not import anything, found '{}::{}'",
                import.module(),
                import.name()
            ),
        });
    }

    let expect = |name: &str, ok: fn(&ExternType) -> bool| -> EngineResult<()> {
        match module.get_export(name) {
            Some(export) if ok(&export) => Ok(()),
            Some(_) => Err(EngineError::Sandbox {
                reason: format!("export '{name}' has the wrong type"),
            }),
            None => Err(EngineError::Sandbox {
                reason: format!("module does not export '{name}'"),
            }),
        }
    };

    expect("memory", |e| matches!(e, ExternType::Memory(_)))?;
    expect("alloc", |e| is_i32_func(e, 1, 1))?;
    expect("free", |e| is_i32_func(e, 2, 0))?;
    expect("evaluate", |e| is_i32_func(e, 6, 1))?;
    Ok(())
}

fn is_i32_func(export: &ExternType, params: usize, results: usize) -> bool {
    match export {
        ExternType::Func(func) => {
            let p: Vec<_> = func.params().collect();
            let r: Vec<_> = func.results().collect();
            p.len() == params
                && r.len() == results
                && p.iter().chain(r.iter()).all(|t| matches!(t, ValType::I32))
        }
        _ => false,
    }
}
