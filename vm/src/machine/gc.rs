use memory::{SweepStats, Value};
use tracing::{debug, trace};

/// Trait for garbage collection operations
pub trait GarbageCollector {
    fn collect_garbage(&mut self) -> SweepStats;
    /// Collects with `extra` treated as additional roots.
    fn collect_garbage_with(&mut self, extra: &[Value]) -> SweepStats;
    fn mark_roots(&self) -> Vec<Value>;
}

impl GarbageCollector for super::vm::VM {
    fn collect_garbage(&mut self) -> SweepStats {
        self.collect_garbage_with(&[])
    }

    fn collect_garbage_with(&mut self, extra: &[Value]) -> SweepStats {
        // Thunks on the Rust stack hold raw pointers into userdata.
        if self.in_native() {
            trace!("collection deferred: native operation in progress");
            return SweepStats::default();
        }

        let before = self.heap.bytes_allocated;
        if self.stress_mode {
            trace!("GC triggered (stress mode)");
        }

        let mut roots = self.mark_roots();
        roots.extend_from_slice(extra);
        self.heap.trace(roots);
        let stats = self.heap.sweep();

        // Dynamic Threshold: Double it, never below the configured floor
        self.heap.next_gc_threshold =
            std::cmp::max(self.heap.bytes_allocated * 2, self.config.gc_threshold);

        debug!(
            before,
            after = self.heap.bytes_allocated,
            destroyed = stats.destroyed,
            "garbage collection finished"
        );
        stats
    }

    fn mark_roots(&self) -> Vec<Value> {
        let mut roots = Vec::new();

        // 1. Globals
        roots.extend(self.globals.values().map(|entry| entry.value));

        // 2. Interned names
        roots.extend(self.interner.values().map(|&h| Value::string(h)));

        // 3. Registered types: table contents and the script-visible type table
        for ty in &self.types {
            if let Some(table) = &ty.table {
                roots.extend(table.roots());
            }
            if let Some(global) = ty.global {
                roots.push(global);
            }
        }

        roots
    }
}
