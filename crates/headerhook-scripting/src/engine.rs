//! Script engine: resource limits, capabilities and host globals

use crate::error::LoadError;
use crate::sandbox::CapabilityTable;
use headerhook_config::{Config, ScriptLimits};
use rhai::{Dynamic, Engine, EvalAltResult, Module, Scope, AST};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Chunk name the init script is compiled under
const INIT_CHUNK: &str = "init_script";

/// Read-only names every sandbox falls back to
///
/// Made of the configured globals, the variables exported by the init
/// script and the functions it defines.
#[derive(Debug, Clone, Default)]
pub struct HostGlobals {
    values: HashMap<String, Dynamic>,
    functions: Vec<String>,
}

impl HostGlobals {
    /// Value of a global variable
    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.values.get(name)
    }

    /// Whether a global variable exists
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Names of the global variables, sorted
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Names of functions defined by the init script
    pub fn functions(&self) -> &[String] {
        &self.functions
    }
}

enum InitScript {
    Inline(String),
    File(PathBuf),
}

/// Builder for [`ScriptEngine`]
#[derive(Default)]
pub struct ScriptEngineBuilder {
    limits: ScriptLimits,
    globals: BTreeMap<String, serde_json::Value>,
    init_script: Option<InitScript>,
}

impl fmt::Debug for ScriptEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEngineBuilder")
            .field("limits", &self.limits)
            .field("globals", &self.globals.keys().collect::<Vec<_>>())
            .field("init_script", &self.init_script.is_some())
            .finish()
    }
}

impl ScriptEngineBuilder {
    /// Create a builder with default limits and no globals
    pub fn new() -> Self {
        Self::default()
    }

    /// Set engine limits
    pub fn limits(mut self, limits: ScriptLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Add a read-only global
    pub fn global(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    /// Add read-only globals
    pub fn globals(mut self, globals: BTreeMap<String, serde_json::Value>) -> Self {
        self.globals.extend(globals);
        self
    }

    /// Run `code` once at build time; its functions and exports become globals
    pub fn init_script(mut self, code: impl Into<String>) -> Self {
        self.init_script = Some(InitScript::Inline(code.into()));
        self
    }

    /// Like [`init_script`](Self::init_script), reading the code from a file
    pub fn init_script_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.init_script = Some(InitScript::File(path.into()));
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<ScriptEngine, LoadError> {
        let mut engine = Engine::new();
        apply_limits(&mut engine, &self.limits);

        let capabilities = CapabilityTable::standard();
        capabilities.install(&mut engine);

        let mut host = HostGlobals::default();
        for (name, value) in &self.globals {
            let value = rhai::serde::to_dynamic(value).map_err(|e| {
                LoadError::invalid_source(format!("global '{name}': {e}"))
            })?;
            host.values.insert(name.clone(), value);
        }

        if let Some(init) = &self.init_script {
            let (code, chunk) = match init {
                InitScript::Inline(code) => (code.clone(), INIT_CHUNK.to_string()),
                InitScript::File(path) => (
                    std::fs::read_to_string(path).map_err(|e| LoadError::io(path, &e))?,
                    path.display().to_string(),
                ),
            };
            let module = run_init_script(&mut engine, &code, &chunk, &mut host)?;
            engine.register_global_module(module.into());
        }

        debug!(
            globals = host.values.len(),
            functions = host.functions.len(),
            capabilities = capabilities.len(),
            "Script engine ready"
        );

        // Fallback for names the invocation scope does not define.
        // Values handed out here are constants to the script.
        let globals = Arc::new(host);
        let resolver = Arc::clone(&globals);
        engine.on_var(move |name, index, context| {
            if index > 0 || context.scope().contains(name) {
                return Ok(None);
            }
            Ok(resolver.get(name).cloned())
        });

        Ok(ScriptEngine {
            engine,
            capabilities,
            globals,
            limits: self.limits,
        })
    }
}

fn apply_limits(engine: &mut Engine, limits: &ScriptLimits) {
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_function_expr_depth);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
}

fn run_init_script(
    engine: &mut Engine,
    code: &str,
    chunk: &str,
    host: &mut HostGlobals,
) -> Result<Module, LoadError> {
    let mut ast = engine
        .compile(code)
        .map_err(|e| LoadError::compile(chunk, &e))?;
    ast.set_source(chunk);

    host.functions = ast.iter_functions().map(|f| f.name.to_string()).collect();

    let module = Module::eval_ast_as_new(Scope::new(), &ast, engine)
        .map_err(|e| LoadError::invalid_source(format!("{chunk}: {e}")))?;

    for (name, value) in module.iter_var() {
        if host.values.contains_key(name) {
            warn!(global = name, "Init script export overrides configured global");
        }
        host.values.insert(name.to_string(), value.clone());
    }

    Ok(module)
}

/// Configured Rhai engine shared by every invocation
pub struct ScriptEngine {
    engine: Engine,
    capabilities: CapabilityTable,
    globals: Arc<HostGlobals>,
    limits: ScriptLimits,
}

impl ScriptEngine {
    /// Engine with default limits, no globals and no init script
    pub fn new() -> Self {
        let mut engine = Engine::new();
        let limits = ScriptLimits::default();
        apply_limits(&mut engine, &limits);
        let capabilities = CapabilityTable::standard();
        capabilities.install(&mut engine);

        Self {
            engine,
            capabilities,
            globals: Arc::new(HostGlobals::default()),
            limits,
        }
    }

    /// Builder for a customized engine
    pub fn builder() -> ScriptEngineBuilder {
        ScriptEngineBuilder::new()
    }

    /// Engine for a loaded configuration
    ///
    /// A relative `init_script_file` resolves against `script_prefix`.
    pub fn from_config(config: &Config) -> Result<Self, LoadError> {
        let mut builder = ScriptEngineBuilder::new()
            .limits(config.limits.clone())
            .globals(config.globals.clone());

        if let Some(code) = &config.init_script {
            builder = builder.init_script(code.clone());
        } else if let Some(path) = &config.init_script_file {
            let path = match &config.script_prefix {
                Some(prefix) if path.is_relative() => prefix.join(path),
                _ => path.clone(),
            };
            builder = builder.init_script_file(path);
        }

        builder.build()
    }

    /// Compile `code`, naming the chunk `chunk` in error messages
    pub fn compile(&self, code: &str, chunk: &str) -> Result<AST, LoadError> {
        let mut ast = self
            .engine
            .compile(code)
            .map_err(|e| LoadError::compile(chunk, &e))?;
        ast.set_source(chunk);
        Ok(ast)
    }

    pub(crate) fn eval(
        &self,
        scope: &mut Scope<'_>,
        ast: &AST,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        self.engine.eval_ast_with_scope::<Dynamic>(scope, ast)
    }

    /// Host globals visible to every sandbox
    pub fn globals(&self) -> &HostGlobals {
        &self.globals
    }

    /// Capabilities registered with the engine
    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    /// Active limits
    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("capabilities", &self.capabilities.len())
            .field("globals", self.globals())
            .field("limits", &self.limits)
            .finish()
    }
}
