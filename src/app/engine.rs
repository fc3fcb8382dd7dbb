//! Transactional state engine.
//!
//! [`StateEngine`] owns the [`ApplicationState`] and is the only way to change
//! it. Every change runs as a transaction:
//!
//! ```text
//! write lock ─► pre-image ─► mutator(working copy) ─► validators ─┬─► commit ─► unlock ─► hooks
//!                                                                └─► discard ─► unlock ─► Err
//! ```
//!
//! The lock is released before hooks run, so a hook may call back into the
//! engine. A panicking hook is caught and logged; the commit stands and the
//! remaining hooks still run.
//!
//! # Example
//!
//! ```
//! use esview::app::{ApplicationState, StateEngine};
//! use esview::{Config, EsviewError};
//!
//! let engine = StateEngine::builder(Config::default())
//!     .validator(|_op: &str, s: &ApplicationState| {
//!         if s.data.filters.len() > 8 {
//!             return Err(EsviewError::validation("filters", "too many filters"));
//!         }
//!         Ok(())
//!     })
//!     .hook(|op: &str, _old: &ApplicationState, _new: &ApplicationState| {
//!         tracing::debug!(op, "state changed");
//!     })
//!     .build();
//!
//! engine.update_state("add_filter", |s| {
//!     s.data.filters.push("status=500".into());
//!     Ok(())
//! })?;
//! assert_eq!(engine.read_state(|s| s.data.filters.len()), 1);
//! # Ok::<(), EsviewError>(())
//! ```

use super::state::ApplicationState;
use crate::cache::FieldCache;
use crate::config::Config;
use crate::domain::{EsviewError, Result};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Pre-commit rule checked against every proposed state.
pub trait StateValidator: Send + Sync {
    /// Returns an error to reject the proposed state.
    ///
    /// # Errors
    ///
    /// Any error; it is returned unchanged from `update_state`.
    fn validate(&self, operation: &str, proposed: &ApplicationState) -> Result<()>;
}

impl<F> StateValidator for F
where
    F: Fn(&str, &ApplicationState) -> Result<()> + Send + Sync,
{
    fn validate(&self, operation: &str, proposed: &ApplicationState) -> Result<()> {
        self(operation, proposed)
    }
}

/// Post-commit observer.
pub trait UpdateHook: Send + Sync {
    fn on_update(&self, operation: &str, old: &ApplicationState, new: &ApplicationState);
}

impl<F> UpdateHook for F
where
    F: Fn(&str, &ApplicationState, &ApplicationState) + Send + Sync,
{
    fn on_update(&self, operation: &str, old: &ApplicationState, new: &ApplicationState) {
        self(operation, old, new);
    }
}

/// Invariants every committed state satisfies.
///
/// Registered first by [`StateEngineBuilder::build`] unless disabled.
///
/// # Errors
///
/// [`EsviewError::Validation`] naming the broken invariant.
pub fn core_invariants(operation: &str, state: &ApplicationState) -> Result<()> {
    let p = &state.pagination;
    if p.page_size == 0 {
        return Err(EsviewError::validation(operation, "page size must be at least 1"));
    }
    if p.current_page < 1 {
        return Err(EsviewError::validation(operation, "current page must be >= 1"));
    }
    if p.current_page > p.total_pages {
        return Err(EsviewError::validation(
            operation,
            format!("current page {} exceeds total pages {}", p.current_page, p.total_pages),
        ));
    }
    if state.search.current_index.trim().is_empty() {
        return Err(EsviewError::validation(operation, "current index cannot be empty"));
    }
    Ok(())
}

/// Builder for [`StateEngine`]; validators and hooks run in registration order.
pub struct StateEngineBuilder {
    config: Config,
    cache: Option<Arc<FieldCache>>,
    validators: Vec<Box<dyn StateValidator>>,
    hooks: Vec<Box<dyn UpdateHook>>,
    core_invariants: bool,
}

impl StateEngineBuilder {
    /// Shares an existing field cache instead of creating one.
    #[must_use]
    pub fn field_cache(mut self, cache: Arc<FieldCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: impl StateValidator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    #[must_use]
    pub fn hook(mut self, hook: impl UpdateHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Leaves out [`core_invariants`].
    #[must_use]
    pub const fn without_core_invariants(mut self) -> Self {
        self.core_invariants = false;
        self
    }

    #[must_use]
    pub fn build(self) -> StateEngine {
        let mut validators: Vec<Box<dyn StateValidator>> = Vec::with_capacity(self.validators.len() + 1);
        if self.core_invariants {
            validators.push(Box::new(core_invariants));
        }
        validators.extend(self.validators);

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(FieldCache::new(self.config.cache.field_cache_size)));

        StateEngine {
            state: RwLock::new(ApplicationState::new(&self.config)),
            config: self.config,
            cache,
            validators,
            hooks: self.hooks,
        }
    }
}

/// Owner of the application state.
pub struct StateEngine {
    state: RwLock<ApplicationState>,
    config: Config,
    cache: Arc<FieldCache>,
    validators: Vec<Box<dyn StateValidator>>,
    hooks: Vec<Box<dyn UpdateHook>>,
}

impl std::fmt::Debug for StateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateEngine")
            .field("validators", &self.validators.len())
            .field("hooks", &self.hooks.len())
            .field("fields_cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl StateEngine {
    /// Starts a builder with [`core_invariants`] enabled.
    #[must_use]
    pub fn builder(config: Config) -> StateEngineBuilder {
        StateEngineBuilder {
            config,
            cache: None,
            validators: Vec::new(),
            hooks: Vec::new(),
            core_invariants: true,
        }
    }

    /// An engine with only [`core_invariants`].
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::builder(config).build()
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn field_cache(&self) -> &Arc<FieldCache> {
        &self.cache
    }

    /// Applies `mutator` as one all-or-nothing transaction.
    ///
    /// # Parameters
    ///
    /// * `operation` - Name passed to validators, hooks and logs
    /// * `mutator` - Edits a working copy of the latest committed state
    ///
    /// # Errors
    ///
    /// The mutator's error, or the first validator error. In both cases the
    /// committed state is unchanged and no hook runs.
    pub fn update_state<F>(&self, operation: &str, mutator: F) -> Result<()>
    where
        F: FnOnce(&mut ApplicationState) -> Result<()>,
    {
        self.update_state_and_sync(operation, mutator, |(), _| ())
    }

    /// Like [`StateEngine::update_state`], and brings the field cache in line
    /// with the committed state before the write lock is released.
    ///
    /// The mutator's output is handed to `sync`, which runs only if the
    /// transaction commits. Cache writes made from `sync` are ordered exactly
    /// like the commits, so the cache never reflects an older state than the
    /// one readers see.
    ///
    /// # Returns
    ///
    /// Whatever `sync` returns.
    ///
    /// # Errors
    ///
    /// As [`StateEngine::update_state`]; `sync` is not called then.
    pub fn update_state_and_sync<T, R, F, S>(&self, operation: &str, mutator: F, sync: S) -> Result<R>
    where
        F: FnOnce(&mut ApplicationState) -> Result<T>,
        S: FnOnce(T, &FieldCache) -> R,
    {
        let _span = tracing::debug_span!("update_state", operation).entered();

        let mut guard = self.state.write();
        let mut working = guard.clone();

        let output = match mutator(&mut working) {
            Ok(output) => output,
            Err(e) => {
                drop(guard);
                if matches!(e, EsviewError::Cancelled(_)) {
                    tracing::debug!(error = %e, "mutation dropped");
                } else {
                    tracing::error!(error = %e, "state update rejected by operation");
                }
                return Err(e);
            }
        };
        for validator in &self.validators {
            if let Err(e) = validator.validate(operation, &working) {
                drop(guard);
                tracing::error!(error = %e, "state update rejected by validator");
                return Err(e);
            }
        }

        let new = if self.hooks.is_empty() {
            None
        } else {
            Some(working.clone())
        };
        let old = std::mem::replace(&mut *guard, working);
        let synced = sync(output, &self.cache);
        drop(guard);
        tracing::debug!("state committed");

        if let Some(new) = new {
            self.run_hooks(operation, &old, &new);
        }
        Ok(synced)
    }

    fn run_hooks(&self, operation: &str, old: &ApplicationState, new: &ApplicationState) {
        for (index, hook) in self.hooks.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| hook.on_update(operation, old, new)));
            if let Err(panic) = outcome {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(operation, hook = index, reason = %reason, "update hook panicked");
            }
        }
    }

    /// Runs `reader` against the committed state under a shared lock.
    ///
    /// Keep readers short; writers wait for them.
    pub fn read_state<R>(&self, reader: impl FnOnce(&ApplicationState) -> R) -> R {
        reader(&self.state.read())
    }

    /// An independent deep copy of the committed state.
    #[must_use]
    pub fn get_snapshot(&self) -> ApplicationState {
        self.state.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn mutator_error_leaves_state_untouched() {
        let engine = StateEngine::new(Config::default());
        let before = engine.get_snapshot();
        let err = engine
            .update_state("broken", |s| {
                s.data.filters.push("x=1".into());
                Err(EsviewError::validation("broken", "nope"))
            })
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
        assert_eq!(engine.get_snapshot(), before);
    }

    #[test]
    fn core_invariants_reject_page_past_the_end() {
        let engine = StateEngine::new(Config::default());
        let err = engine
            .update_state("set_page", |s| {
                s.pagination.current_page = 2;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, EsviewError::Validation { .. }));
        assert_eq!(engine.read_state(|s| s.pagination.current_page), 1);
    }

    #[test]
    fn core_invariants_can_be_disabled() {
        let engine = StateEngine::builder(Config::default())
            .without_core_invariants()
            .build();
        engine
            .update_state("raw", |s| {
                s.search.current_index.clear();
                Ok(())
            })
            .unwrap();
        assert!(engine.read_state(|s| s.search.current_index.is_empty()));
    }

    #[test]
    fn validators_run_in_registration_order_and_stop_at_first_failure() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (o1, o2, o3) = (Arc::clone(&order), Arc::clone(&order), Arc::clone(&order));
        let engine = StateEngine::builder(Config::default())
            .validator(move |_: &str, _: &ApplicationState| {
                o1.lock().push(1);
                Ok(())
            })
            .validator(move |op: &str, _: &ApplicationState| {
                o2.lock().push(2);
                Err(EsviewError::validation(op, "second says no"))
            })
            .validator(move |_: &str, _: &ApplicationState| {
                o3.lock().push(3);
                Ok(())
            })
            .build();

        assert!(engine.update_state("op", |_| Ok(())).is_err());
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn hooks_see_old_and_new() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let engine = StateEngine::builder(Config::default())
            .hook(move |op: &str, old: &ApplicationState, new: &ApplicationState| {
                *sink.lock() = Some((op.to_string(), old.misc.num_results, new.misc.num_results));
            })
            .build();

        engine
            .update_state("bump", |s| {
                s.misc.num_results += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(*seen.lock(), Some(("bump".to_string(), 500, 501)));
    }

    #[test]
    fn panicking_hook_is_isolated() {
        let later = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&later);
        let engine = StateEngine::builder(Config::default())
            .hook(|_: &str, _: &ApplicationState, _: &ApplicationState| panic!("hook exploded"))
            .hook(move |_: &str, _: &ApplicationState, _: &ApplicationState| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        engine
            .update_state("bump", |s| {
                s.misc.num_results = 7;
                Ok(())
            })
            .unwrap();
        assert_eq!(engine.read_state(|s| s.misc.num_results), 7);
        assert_eq!(later.load(Ordering::SeqCst), 1);

        engine.update_state("again", |_| Ok(())).unwrap();
        assert_eq!(later.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sync_runs_only_after_commit() {
        let engine = StateEngine::new(Config::default());
        let stored = engine
            .update_state_and_sync(
                "load",
                |s| {
                    s.data.fields = vec!["a".into()];
                    Ok(s.data.fields.clone())
                },
                |fields, cache| {
                    let keyword = crate::domain::FieldMetadata::new("keyword", true, true);
                    fields
                        .into_iter()
                        .filter(|name| cache.insert(name.clone(), keyword.clone()))
                        .count()
                },
            )
            .unwrap();
        assert_eq!(stored, 1);
        assert_eq!(engine.field_cache().names(), vec!["a"]);

        let err = engine
            .update_state_and_sync(
                "reject",
                |s| {
                    s.pagination.current_page = 9;
                    Ok(())
                },
                |(), cache| cache.clear(),
            )
            .unwrap_err();
        assert!(matches!(err, EsviewError::Validation { .. }));
        assert_eq!(engine.field_cache().len(), 1, "rejected update leaves the cache alone");
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn rejected_operations_log_at_error_and_discards_do_not() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let engine = StateEngine::new(Config::default());
            engine.add_filter("a=1").unwrap();
            assert!(engine.add_filter("a=1").is_err());
            assert!(engine
                .update_state("discard", |_| Err(EsviewError::Cancelled("discard".into())))
                .is_err());
        });

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("ERROR"), "{output}");
        assert!(output.contains("filter already active: a=1"), "{output}");
        assert!(!output.contains("discard: operation cancelled"), "{output}");
    }

    #[test]
    fn snapshots_are_independent() {
        let engine = StateEngine::new(Config::default());
        let mut snapshot = engine.get_snapshot();
        assert_eq!(snapshot, engine.get_snapshot());
        snapshot.data.filters.push("a=b".into());
        assert!(engine.read_state(|s| s.data.filters.is_empty()));
    }
}
