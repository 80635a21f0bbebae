//! Cache orchestration
//!
//! [`Cache`] wraps callables so repeated invocations with equivalent
//! arguments are served from storage instead of re-executing. Wrapping is a
//! static choice between two entry points: [`Cache::function`] for free
//! functions and [`Cache::method`] for instance-bound methods (per-instance
//! scoping by default, shared across instances on request).
//!
//! [`NoCache`] keeps the identical wrapping and calling contract but always
//! executes and never touches storage, so call sites stay unchanged when
//! caching is turned off.
//!
//! Per invocation: derive key, look up subject to the TTL deadline, return
//! the hit or execute the callable and persist its result. `NotFound` and
//! `Expired` are the only intercepted errors; everything else propagates.

use crate::error::{CacheError, CacheResult};
use crate::key::{derive_key, entry_path, CallArgs, InstanceToken, Scope};
use crate::serializer::{MessagePackSerializer, Serializer};
use crate::storage::{LocalFileStorage, Storage};
use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// A persistent memoization cache
///
/// Owns the default serializer and storage; wrapped callables may override
/// either. The cache itself holds no entry state, all durability lives in
/// the storage.
#[derive(Debug, Clone)]
pub struct Cache {
    serializer: Arc<dyn Serializer>,
    storage: Arc<dyn Storage>,
}

impl Cache {
    /// Cache with the default serializer (MessagePack) and storage
    /// (`.cache` directory)
    pub fn new() -> Self {
        Self::with(MessagePackSerializer, LocalFileStorage::default())
    }

    /// Cache with an explicit serializer and storage
    pub fn with(serializer: impl Serializer + 'static, storage: impl Storage + 'static) -> Self {
        Self {
            serializer: Arc::new(serializer),
            storage: Arc::new(storage),
        }
    }

    /// The default storage, e.g. for bulk `clear`
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Start wrapping a free function
    pub fn function(&self, name: &str) -> FunctionBuilder {
        FunctionBuilder {
            options: Options::enabled(
                Scope::Function {
                    name: name.to_string(),
                },
                self.serializer.clone(),
                self.storage.clone(),
            ),
        }
    }

    /// Start wrapping an instance method of `class`
    ///
    /// Each live instance gets its own cache scope unless the builder's
    /// `shared()` is used.
    pub fn method(&self, class: &str, name: &str) -> MethodBuilder {
        MethodBuilder {
            options: Options::enabled(
                Scope::Method {
                    class: class.to_string(),
                    name: name.to_string(),
                },
                self.serializer.clone(),
                self.storage.clone(),
            ),
            per_instance: true,
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

/// A cache stand-in that never caches
///
/// Offers the same wrapping surface as [`Cache`], but every call executes
/// the wrapped callable and storage is never touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl NoCache {
    pub fn new() -> Self {
        Self
    }

    /// Start wrapping a free function (passthrough)
    pub fn function(&self, name: &str) -> FunctionBuilder {
        FunctionBuilder {
            options: Options::passthrough(Scope::Function {
                name: name.to_string(),
            }),
        }
    }

    /// Start wrapping an instance method (passthrough)
    pub fn method(&self, class: &str, name: &str) -> MethodBuilder {
        MethodBuilder {
            options: Options::passthrough(Scope::Method {
                class: class.to_string(),
                name: name.to_string(),
            }),
            per_instance: true,
        }
    }
}

/// Shared wrap-time configuration behind both builders
#[derive(Debug)]
struct Options {
    scope: Scope,
    code: Option<String>,
    ignore: BTreeSet<String>,
    ttl: Option<Duration>,
    // None = passthrough (NoCache)
    backend: Option<Backend>,
}

impl Options {
    fn enabled(scope: Scope, serializer: Arc<dyn Serializer>, storage: Arc<dyn Storage>) -> Self {
        Self {
            scope,
            code: None,
            ignore: BTreeSet::new(),
            ttl: None,
            backend: Some(Backend {
                serializer,
                storage,
            }),
        }
    }

    fn passthrough(scope: Scope) -> Self {
        Self {
            scope,
            code: None,
            ignore: BTreeSet::new(),
            ttl: None,
            backend: None,
        }
    }

    fn validate(self) -> CacheResult<Wrapped> {
        let code = self.code.ok_or_else(|| {
            CacheError::config("a code tag is required; supply it with .code(..)")
        })?;

        if let Some(ttl) = self.ttl {
            if ttl <= Duration::zero() {
                return Err(CacheError::config(format!(
                    "ttl must be a positive duration, got {ttl}"
                )));
            }
        }

        Ok(Wrapped {
            scope: self.scope,
            code,
            ignore: self.ignore,
            ttl: self.ttl,
            backend: self.backend,
        })
    }
}

/// Builder for a wrapped free function
#[derive(Debug)]
pub struct FunctionBuilder {
    options: Options,
}

impl FunctionBuilder {
    /// Stable content identity of the wrapped behavior; changing it
    /// invalidates existing entries. Required.
    pub fn code(mut self, tag: impl Into<String>) -> Self {
        self.options.code = Some(tag.into());
        self
    }

    /// Parameter names excluded from key derivation
    pub fn ignore<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options
            .ignore
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Exclude a single parameter name from key derivation
    pub fn ignore_arg(mut self, name: impl Into<String>) -> Self {
        self.options.ignore.insert(name.into());
        self
    }

    /// Override the cache's serializer for this callable
    pub fn serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        if let Some(backend) = self.options.backend.as_mut() {
            backend.serializer = Arc::new(serializer);
        }
        self
    }

    /// Override the cache's storage for this callable
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        if let Some(backend) = self.options.backend.as_mut() {
            backend.storage = Arc::new(storage);
        }
        self
    }

    /// Entries older than this duration count as expired. Must be positive.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = Some(ttl);
        self
    }

    /// Validate the configuration and produce the wrapped callable
    pub fn build(self) -> CacheResult<CachedFunction> {
        Ok(CachedFunction {
            inner: self.options.validate()?,
        })
    }
}

/// Builder for a wrapped instance method
#[derive(Debug)]
pub struct MethodBuilder {
    options: Options,
    per_instance: bool,
}

impl MethodBuilder {
    /// Stable content identity of the wrapped behavior. Required.
    pub fn code(mut self, tag: impl Into<String>) -> Self {
        self.options.code = Some(tag.into());
        self
    }

    /// Parameter names excluded from key derivation
    pub fn ignore<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options
            .ignore
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Exclude a single parameter name from key derivation
    pub fn ignore_arg(mut self, name: impl Into<String>) -> Self {
        self.options.ignore.insert(name.into());
        self
    }

    /// Override the cache's serializer for this method
    pub fn serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        if let Some(backend) = self.options.backend.as_mut() {
            backend.serializer = Arc::new(serializer);
        }
        self
    }

    /// Override the cache's storage for this method
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        if let Some(backend) = self.options.backend.as_mut() {
            backend.storage = Arc::new(storage);
        }
        self
    }

    /// Entries older than this duration count as expired. Must be positive.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = Some(ttl);
        self
    }

    /// Share one cache scope across all instances of the class
    ///
    /// The default is a separate scope per living instance.
    pub fn shared(mut self) -> Self {
        self.per_instance = false;
        self
    }

    /// Validate the configuration and produce the wrapped method
    pub fn build(self) -> CacheResult<CachedMethod> {
        Ok(CachedMethod {
            inner: self.options.validate()?,
            per_instance: self.per_instance,
        })
    }
}

/// The serializer and storage pair behind a persistent wrapper
#[derive(Debug)]
struct Backend {
    serializer: Arc<dyn Serializer>,
    storage: Arc<dyn Storage>,
}

/// Validated wrap-time state shared by functions and methods
#[derive(Debug)]
struct Wrapped {
    scope: Scope,
    code: String,
    ignore: BTreeSet<String>,
    ttl: Option<Duration>,
    backend: Option<Backend>,
}

impl Wrapped {
    /// Derive the storage path for one invocation
    fn path(
        &self,
        backend: &Backend,
        instance: Option<&InstanceToken>,
        args: &CallArgs,
    ) -> CacheResult<String> {
        let key = derive_key(
            &self.code,
            backend.serializer.as_ref(),
            instance,
            args,
            &self.ignore,
        )?;
        Ok(entry_path(&self.scope, &key, backend.serializer.extension()))
    }

    fn fetch<T: DeserializeOwned>(&self, backend: &Backend, path: &str) -> CacheResult<T> {
        let deadline = self.ttl.map(|ttl| Utc::now() - ttl);
        let data = backend.storage.read(path, deadline)?;
        let value = backend.serializer.loads(&data)?;
        Ok(serde_json::from_value(value)?)
    }

    fn store<T: Serialize>(&self, backend: &Backend, path: &str, value: &T) -> CacheResult<()> {
        let data = backend.serializer.dumps(&serde_json::to_value(value)?)?;
        backend.storage.write(path, &data)
    }

    fn try_call<T, F>(
        &self,
        instance: Option<&InstanceToken>,
        args: &CallArgs,
        compute: F,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> CacheResult<T>,
    {
        let Some(backend) = self.backend.as_ref() else {
            return compute();
        };

        let path = self.path(backend, instance, args)?;
        match self.fetch(backend, &path) {
            Ok(value) => {
                debug!("Cache hit for {}", path);
                Ok(value)
            }
            Err(e) if e.is_miss() => {
                debug!("Cache miss for {}", path);
                let value = compute()?;
                self.store(backend, &path, &value)?;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    async fn try_call_async<T, F, Fut>(
        &self,
        instance: Option<&InstanceToken>,
        args: &CallArgs,
        compute: F,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let Some(backend) = self.backend.as_ref() else {
            return compute().await;
        };

        // Key derivation, lookup and store stay synchronous; the only
        // suspension point is the wrapped callable itself. The write-back
        // runs after the future completes, so a cancelled or failed
        // computation never leaves a partial entry.
        let path = self.path(backend, instance, args)?;
        match self.fetch(backend, &path) {
            Ok(value) => {
                debug!("Cache hit for {}", path);
                Ok(value)
            }
            Err(e) if e.is_miss() => {
                debug!("Cache miss for {}", path);
                let value = compute().await?;
                self.store(backend, &path, &value)?;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }
}

/// A wrapped free function
#[derive(Debug)]
pub struct CachedFunction {
    inner: Wrapped,
}

impl CachedFunction {
    /// Memoized call with an infallible computation
    pub fn call<T, F>(&self, args: &CallArgs, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        self.inner.try_call(None, args, || Ok(compute()))
    }

    /// Memoized call with a fallible computation
    ///
    /// A failing computation writes nothing and its error propagates.
    pub fn try_call<T, F>(&self, args: &CallArgs, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> CacheResult<T>,
    {
        self.inner.try_call(None, args, compute)
    }

    /// Memoized call around an asynchronous computation
    pub async fn call_async<T, F, Fut>(&self, args: &CallArgs, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.inner
            .try_call_async(None, args, || async move { Ok(compute().await) })
            .await
    }

    /// Memoized call around a fallible asynchronous computation
    pub async fn try_call_async<T, F, Fut>(&self, args: &CallArgs, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        self.inner.try_call_async(None, args, compute).await
    }
}

/// A wrapped instance method
///
/// Calls carry the [`InstanceToken`] of the receiving instance. With
/// per-instance scoping (the default) the token is part of the key; with
/// `shared()` scoping it is accepted but not hashed, so all instances see
/// one cache.
#[derive(Debug)]
pub struct CachedMethod {
    inner: Wrapped,
    per_instance: bool,
}

impl CachedMethod {
    fn scope_token<'a>(&self, instance: &'a InstanceToken) -> Option<&'a InstanceToken> {
        self.per_instance.then_some(instance)
    }

    /// Memoized method call with an infallible computation
    pub fn call<T, F>(&self, instance: &InstanceToken, args: &CallArgs, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        self.inner
            .try_call(self.scope_token(instance), args, || Ok(compute()))
    }

    /// Memoized method call with a fallible computation
    pub fn try_call<T, F>(
        &self,
        instance: &InstanceToken,
        args: &CallArgs,
        compute: F,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> CacheResult<T>,
    {
        self.inner.try_call(self.scope_token(instance), args, compute)
    }

    /// Memoized method call around an asynchronous computation
    pub async fn call_async<T, F, Fut>(
        &self,
        instance: &InstanceToken,
        args: &CallArgs,
        compute: F,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.inner
            .try_call_async(self.scope_token(instance), args, || async move {
                Ok(compute().await)
            })
            .await
    }

    /// Memoized method call around a fallible asynchronous computation
    pub async fn try_call_async<T, F, Fut>(
        &self,
        instance: &InstanceToken,
        args: &CallArgs,
        compute: F,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        self.inner
            .try_call_async(self.scope_token(instance), args, compute)
            .await
    }
}
