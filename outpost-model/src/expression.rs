//! Sync expressions — per-model predicates scoping what a device syncs.
//!
//! The same predicate gates both directions: outbox events for out-of-scope
//! records are never sent, and remote changes for out-of-scope records are
//! never applied, so local storage tracks exactly the server-visible
//! partition.

use outpost_types::Record;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A pure predicate over a record's current field values.
///
/// Must be side-effect free: no I/O, no interior state.
pub type Predicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// A sync expression binds a model type to a predicate resolver.
///
/// The resolver is invoked once per sync session, when the expression is
/// folded into a [`SyncScope`]; this lets applications capture values that
/// are only known at session start (the signed-in user, a chosen workspace)
/// without rebuilding their configuration.
#[derive(Clone)]
pub struct SyncExpression {
    model_type: String,
    resolver: Arc<dyn Fn() -> Predicate + Send + Sync>,
}

impl SyncExpression {
    /// Binds `model_type` to a predicate resolver.
    pub fn new<R>(model_type: impl Into<String>, resolver: R) -> Self
    where
        R: Fn() -> Predicate + Send + Sync + 'static,
    {
        Self {
            model_type: model_type.into(),
            resolver: Arc::new(resolver),
        }
    }

    /// Convenience constructor for a fixed predicate.
    pub fn where_record<P>(model_type: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate = Arc::new(predicate);
        Self::new(model_type, move || predicate.clone())
    }

    /// The model type this expression scopes.
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Resolves the predicate for the coming session.
    pub fn resolve(&self) -> Predicate {
        (self.resolver)()
    }
}

impl fmt::Debug for SyncExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncExpression")
            .field("model_type", &self.model_type)
            .finish_non_exhaustive()
    }
}

/// The resolved, per-session set of sync predicates.
///
/// One binding per model type; a model without a binding syncs
/// unconditionally. Immutable once built.
#[derive(Clone, Default)]
pub struct SyncScope {
    predicates: HashMap<String, Predicate>,
}

impl SyncScope {
    /// A scope with no bindings — everything syncs.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Resolves a set of expressions into a session scope.
    ///
    /// A later expression for the same model type replaces an earlier one.
    #[must_use]
    pub fn from_expressions(expressions: &[SyncExpression]) -> Self {
        let mut predicates = HashMap::new();
        for expr in expressions {
            predicates.insert(expr.model_type().to_string(), expr.resolve());
        }
        Self { predicates }
    }

    /// Whether a model type has a binding.
    pub fn is_bound(&self, model_type: &str) -> bool {
        self.predicates.contains_key(model_type)
    }

    /// Evaluates the scope for a record.
    ///
    /// Absence of a binding means the record is in scope.
    pub fn in_scope(&self, record: &Record) -> bool {
        match self.predicates.get(&record.model_type) {
            Some(predicate) => predicate(record),
            None => true,
        }
    }
}

impl fmt::Debug for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut models: Vec<&String> = self.predicates.keys().collect();
        models.sort();
        f.debug_struct("SyncScope").field("bound", &models).finish()
    }
}
