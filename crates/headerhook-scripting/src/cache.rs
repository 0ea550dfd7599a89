//! Compiled script cache

use crate::engine::ScriptEngine;
use crate::error::LoadError;
use headerhook_config::CacheKey;
use rhai::AST;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Chunk name used for inline handlers
pub const INLINE_CHUNK: &str = "header_filter_by_script";

/// What to load: a cache key plus where its code lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptIdentity {
    /// Code carried in configuration
    Inline {
        /// Cache key
        key: CacheKey,
        /// Script code
        code: Arc<str>,
    },
    /// Code read from a file
    File {
        /// Cache key
        key: CacheKey,
        /// Resolved file path
        path: PathBuf,
    },
}

impl ScriptIdentity {
    /// Cache key
    pub fn key(&self) -> &CacheKey {
        match self {
            Self::Inline { key, .. } | Self::File { key, .. } => key,
        }
    }

    /// Chunk name for error messages
    pub fn chunk_name(&self) -> String {
        match self {
            Self::Inline { .. } => INLINE_CHUNK.to_string(),
            Self::File { path, .. } => path.display().to_string(),
        }
    }

    async fn read_code(&self) -> Result<Arc<str>, LoadError> {
        match self {
            Self::Inline { code, .. } => Ok(Arc::clone(code)),
            Self::File { path, .. } => tokio::fs::read_to_string(path)
                .await
                .map(Arc::from)
                .map_err(|e| LoadError::io(path, &e)),
        }
    }
}

/// A compiled script, immutable once created
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    key: CacheKey,
    chunk: Arc<str>,
    ast: Arc<AST>,
}

impl CompiledUnit {
    /// Compile `code` for `identity`
    pub fn compile(
        engine: &ScriptEngine,
        identity: &ScriptIdentity,
        code: &str,
    ) -> Result<Self, LoadError> {
        let chunk = identity.chunk_name();
        let ast = engine.compile(code, &chunk)?;
        Ok(Self {
            key: identity.key().clone(),
            chunk: chunk.into(),
            ast: Arc::new(ast),
        })
    }

    /// Cache key the unit was compiled for
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Chunk name
    pub fn chunk_name(&self) -> &str {
        &self.chunk
    }

    /// Compiled AST
    pub fn ast(&self) -> &AST {
        &self.ast
    }

    /// Whether both units come from the same compilation
    pub fn same_compilation(&self, other: &CompiledUnit) -> bool {
        Arc::ptr_eq(&self.ast, &other.ast)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of compiled scripts in cache
    pub cached_scripts: usize,
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
    /// Compilations performed, cached or not
    pub compiles: u64,
}

impl CacheStats {
    /// Get cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Key-to-unit store shared by all invocations
///
/// Two tasks missing on the same key may both compile; the last insert
/// wins and each task runs the unit it compiled.
#[derive(Debug)]
pub struct ArtifactCache {
    engine: Arc<ScriptEngine>,
    units: RwLock<HashMap<CacheKey, CompiledUnit>>,
    hits: AtomicU64,
    misses: AtomicU64,
    compiles: AtomicU64,
}

impl ArtifactCache {
    /// Create an empty cache compiling with `engine`
    pub fn new(engine: Arc<ScriptEngine>) -> Self {
        Self {
            engine,
            units: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            compiles: AtomicU64::new(0),
        }
    }

    /// Load a compiled unit for `identity`
    ///
    /// With `caching` enabled a stored unit is returned without touching the
    /// source, otherwise the code is compiled and stored. With `caching`
    /// disabled the code is compiled every time and the store is left alone.
    pub async fn load(
        &self,
        identity: &ScriptIdentity,
        caching: bool,
    ) -> Result<CompiledUnit, LoadError> {
        let key = identity.key();

        if caching {
            let units = self.units.read().await;
            if let Some(unit) = units.get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "Script cache hit");
                return Ok(unit.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(key = %key, caching, "Script cache miss");

        let code = identity.read_code().await?;
        let unit = CompiledUnit::compile(&self.engine, identity, &code)?;
        self.compiles.fetch_add(1, Ordering::Relaxed);

        if caching {
            self.units.write().await.insert(key.clone(), unit.clone());
            debug!(key = %key, chunk = unit.chunk_name(), "Script compiled and cached");
        } else {
            debug!(key = %key, chunk = unit.chunk_name(), "Script compiled");
        }

        Ok(unit)
    }

    /// Whether a unit is stored under `key`
    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.units.read().await.contains_key(key)
    }

    /// Number of stored units
    pub async fn len(&self) -> usize {
        self.units.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.units.read().await.is_empty()
    }

    /// Drop every stored unit
    pub async fn clear(&self) {
        let mut units = self.units.write().await;
        let count = units.len();
        units.clear();
        debug!(count, "Script cache cleared");
    }

    /// Current statistics
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            cached_scripts: self.len().await,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compiles: self.compiles.load(Ordering::Relaxed),
        }
    }

    /// Engine units are compiled with
    pub fn engine(&self) -> &Arc<ScriptEngine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn inline(code: &str) -> ScriptIdentity {
        ScriptIdentity::Inline {
            key: CacheKey::inline(code),
            code: Arc::from(code),
        }
    }

    fn cache() -> ArtifactCache {
        ArtifactCache::new(Arc::new(ScriptEngine::new()))
    }

    #[tokio::test]
    async fn test_cached_load_reuses_unit() {
        let cache = cache();
        let id = inline("1 + 1");

        let first = cache.load(&id, true).await.unwrap();
        let second = cache.load(&id, true).await.unwrap();

        assert!(first.same_compilation(&second));
        let stats = cache.stats().await;
        assert_eq!(stats.compiles, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.cached_scripts, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_uncached_load_compiles_every_time() {
        let cache = cache();
        let id = inline("1 + 1");

        let first = cache.load(&id, false).await.unwrap();
        let second = cache.load(&id, false).await.unwrap();

        assert!(!first.same_compilation(&second));
        assert_eq!(cache.stats().await.compiles, 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_compile_failure_not_stored() {
        let cache = cache();
        let id = inline("let = ;");

        let err = cache.load(&id, true).await.unwrap_err();
        assert!(matches!(err, LoadError::Compile { .. }));
        assert!(!cache.contains(id.key()).await);
    }

    #[tokio::test]
    async fn test_file_load_and_missing_file() {
        let mut file = tempfile::Builder::new().suffix(".rhai").tempfile().unwrap();
        write!(file, "40 + 2").unwrap();
        let path = file.path().to_path_buf();
        let id = ScriptIdentity::File {
            key: CacheKey::file(&path.display().to_string()),
            path: path.clone(),
        };

        let cache = cache();
        let unit = cache.load(&id, true).await.unwrap();
        assert_eq!(unit.chunk_name(), path.display().to_string());

        let missing = ScriptIdentity::File {
            key: CacheKey::file("/nonexistent.rhai"),
            path: PathBuf::from("/nonexistent.rhai"),
        };
        let err = cache.load(&missing, true).await.unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = cache();
        cache.load(&inline("1"), true).await.unwrap();
        cache.load(&inline("2"), true).await.unwrap();
        assert_eq!(cache.len().await, 2);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
