//! Suppression gate for reactive cache invalidation during bulk writes.
//!
//! Every normal write path notifies [`ResponseCache::on_bulk_change`] so
//! cached per-table stats stay fresh. During a bulk import or mass delete
//! that would mean one invalidation per chunk for no benefit, so the
//! writer opens a [`SuppressionScope`] for the duration of the operation
//! and performs a single [`ResponseCache::invalidate`] afterward.
//!
//! The gate is a reference-counted depth, not a boolean: two overlapping
//! bulk operations can each hold a scope, and hooks only fire again once
//! the outermost scope has dropped. Dropping is unconditional, so an early
//! return or panic inside the scope still re-enables the hooks.
//!
//! This is a performance contract, not a correctness one: skipping the
//! scope would only make a 100k-row import invalidate the cache 100k
//! times.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// =============================================================================
// Signal Gate
// =============================================================================

/// Counted gate controlling whether reactive invalidation hooks fire.
#[derive(Debug, Default)]
pub struct SignalGate {
    depth: AtomicUsize,
}

impl SignalGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a suppression scope. Hooks stay disabled until every scope
    /// obtained from this gate has been dropped.
    pub fn suppress(self: &Arc<Self>) -> SuppressionScope {
        self.depth.fetch_add(1, Ordering::SeqCst);
        SuppressionScope {
            gate: Arc::clone(self),
        }
    }

    /// True while at least one scope is alive.
    pub fn is_suppressed(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }
}

/// RAII handle for one suppression. Not clonable; the drop is the exit.
#[must_use = "suppression ends as soon as the scope is dropped"]
pub struct SuppressionScope {
    gate: Arc<SignalGate>,
}

impl Drop for SuppressionScope {
    fn drop(&mut self) {
        self.gate.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Response Cache
// =============================================================================

/// Cached per-table statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStats {
    pub rows: usize,
    pub refreshed_at: DateTime<Utc>,
}

impl TableStats {
    pub fn now(rows: usize) -> Self {
        Self {
            rows,
            refreshed_at: Utc::now(),
        }
    }
}

/// In-memory stats cache with gate-aware invalidation hooks.
#[derive(Debug)]
pub struct ResponseCache {
    gate: Arc<SignalGate>,
    entries: RwLock<HashMap<String, TableStats>>,
}

impl ResponseCache {
    pub fn new(gate: Arc<SignalGate>) -> Self {
        Self {
            gate,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The gate this cache consults.
    pub fn gate(&self) -> &Arc<SignalGate> {
        &self.gate
    }

    /// Reactive hook: call after any write to a table. No-op while a
    /// suppression scope is open.
    pub fn on_bulk_change(&self, table: &str) {
        if self.gate.is_suppressed() {
            return;
        }
        self.invalidate(table);
    }

    /// Drop the cached stats for a table unconditionally. This is the one
    /// manual invalidation a bulk writer performs after its scope closes.
    pub fn invalidate(&self, table: &str) {
        self.write_entries().remove(table);
    }

    /// Cached stats, if present.
    pub fn stats(&self, table: &str) -> Option<TableStats> {
        self.read_entries().get(table).cloned()
    }

    /// Store freshly computed stats for a table.
    pub fn put(&self, table: &str, stats: TableStats) {
        self.write_entries().insert(table.to_string(), stats);
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, TableStats>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, TableStats>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
