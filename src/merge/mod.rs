//! Structural merge of a freshly loaded module into its live generation
//!
//! The old graph keeps its identity. A merge runs in two passes:
//!
//! 1. Pairing walks both graphs together and maps every new table to the
//!    old table found at the same field path (or shape link). Nothing is
//!    written yet.
//! 2. Applying walks the new graph once and writes each node's fields into
//!    its counterpart. New tables that pairing left unmapped get a fresh
//!    old-side table, created once, so nodes the new graph shares stay
//!    shared whatever order fields are visited in.
//!
//! Script functions copied over have their module environment re-pointed
//! from the new root to the old one so they read live state. Fields that
//! exist only in the old graph are kept.

use crate::runtime::{Function, Table, TableRef, Value};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::cell::RefCell;
use std::rc::Rc;

/// Counters describing one merge
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    /// Old-side tables that received new fields
    pub tables_merged: usize,
    /// Fresh tables created for new structure with no old counterpart
    pub tables_adopted: usize,
    /// Scalar and function fields written
    pub fields_written: usize,
    /// Script functions re-pointed at an old environment
    pub functions_rebound: usize,
}

/// One merge pass; the visited set lives exactly as long as the pass
#[derive(Default)]
pub struct StateMerger {
    /// New nodes whose fields were already applied
    visited: HashSet<usize>,
    /// New node identity to the old node standing in for it
    remap: HashMap<usize, TableRef>,
    stats: MergeStats,
}

fn identity(table: &TableRef) -> usize {
    Rc::as_ptr(table) as *const () as usize
}

/// Own fields of `table`, sorted by name
fn sorted_fields(table: &TableRef) -> Vec<(String, Value)> {
    let mut fields: Vec<(String, Value)> = table
        .borrow()
        .fields()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
}

impl StateMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `new` into `old` in place
    pub fn merge(mut self, old: &TableRef, new: &TableRef) -> MergeStats {
        if Rc::ptr_eq(old, new) {
            return self.stats;
        }
        self.pair(old, new);
        self.apply(new);
        self.stats
    }

    /// Map `new` and everything below it to the old nodes at the same place
    fn pair(&mut self, old: &TableRef, new: &TableRef) {
        if self.remap.contains_key(&identity(new)) {
            return;
        }
        self.remap.insert(identity(new), old.clone());
        if Rc::ptr_eq(old, new) {
            return;
        }

        let old_shape = old.borrow().shape();
        let new_shape = new.borrow().shape();
        if let (Some(old_shape), Some(new_shape)) = (old_shape, new_shape) {
            self.pair(&old_shape, &new_shape);
        }

        for (key, value) in sorted_fields(new) {
            let Value::Table(new_child) = value else {
                continue;
            };
            let existing = old.borrow().get_own(&key);
            if let Some(Value::Table(old_child)) = existing {
                self.pair(&old_child, &new_child);
            }
        }
    }

    /// Write the fields of `new` into its counterpart, then recurse
    fn apply(&mut self, new: &TableRef) {
        if !self.visited.insert(identity(new)) {
            return;
        }
        let old = self.counterpart(new);
        if Rc::ptr_eq(&old, new) {
            return;
        }
        self.stats.tables_merged += 1;

        let new_shape = new.borrow().shape();
        if let Some(new_shape) = new_shape {
            let shape = self.counterpart(&new_shape);
            old.borrow_mut().set_shape(Some(shape));
            self.apply(&new_shape);
        }

        for (key, value) in sorted_fields(new) {
            match value {
                Value::Table(new_child) => {
                    let target = self.counterpart(&new_child);
                    old.borrow_mut().set(key, Value::Table(target));
                    self.apply(&new_child);
                }
                Value::Function(function) => {
                    self.rebind(&function);
                    old.borrow_mut().set(key, Value::Function(function));
                    self.stats.fields_written += 1;
                }
                scalar => {
                    old.borrow_mut().set(key, scalar);
                    self.stats.fields_written += 1;
                }
            }
        }
    }

    /// The old-graph node standing in for `new`, adopting a fresh one if
    /// pairing found none
    fn counterpart(&mut self, new: &TableRef) -> TableRef {
        if let Some(existing) = self.remap.get(&identity(new)) {
            return existing.clone();
        }
        let fresh: TableRef = Rc::new(RefCell::new(Table::new()));
        self.stats.tables_adopted += 1;
        self.remap.insert(identity(new), fresh.clone());
        fresh
    }

    fn rebind(&mut self, function: &Function) {
        if let Function::Script(script) = function {
            if let Some(env) = self.remap.get(&script.env_identity()) {
                script.rebind(env);
                self.stats.functions_rebound += 1;
            }
        }
    }
}

/// Merge `new` into `old` when both are tables
///
/// Returns `None` when either side is not a table; the caller then
/// replaces the module value outright.
pub fn merge_values(old: &Value, new: &Value) -> Option<MergeStats> {
    match (old, new) {
        (Value::Table(old), Value::Table(new)) => Some(StateMerger::new().merge(old, new)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Interpreter;
    use pretty_assertions::assert_eq;

    fn load(interp: &Interpreter, source: &str) -> Value {
        interp.load_module(source, "m.mod").unwrap()
    }

    fn table(value: &Value) -> &TableRef {
        value.as_table().unwrap()
    }

    #[test]
    fn test_scalars_overwritten_and_old_only_fields_kept() {
        let interp = Interpreter::new();
        let old = load(&interp, "a = 1\nb = 'x'\nonly_old = true");
        let new = load(&interp, "a = 2\nb = 'y'\nonly_new = 3");

        merge_values(&old, &new).unwrap();
        assert_eq!(old.get("a"), Value::Number(2.0));
        assert_eq!(old.get("b"), Value::from("y"));
        assert_eq!(old.get("only_old"), Value::Boolean(true));
        assert_eq!(old.get("only_new"), Value::Number(3.0));
    }

    #[test]
    fn test_nested_identity_preserved() {
        let interp = Interpreter::new();
        let old = load(&interp, "player = { hp = 10, stats = { speed = 1 } }");
        let captured = old.get("player");
        let captured_stats = old.get_path("player.stats");

        let new = load(&interp, "player = { hp = 20, stats = { speed = 5 } }");
        merge_values(&old, &new).unwrap();

        assert_eq!(old.get("player"), captured);
        assert_eq!(old.get_path("player.stats"), captured_stats);
        assert_eq!(captured.get("hp"), Value::Number(20.0));
        assert_eq!(captured_stats.get("speed"), Value::Number(5.0));
    }

    #[test]
    fn test_merged_function_reads_old_state() {
        let interp = Interpreter::new();
        let old = load(&interp, "count = 1\nreport = fn() => 'count ' + str(count)");
        old.set("count", Value::Number(41.0)).unwrap();

        let new = load(&interp, "report = fn() => 'now ' + str(count + 1)");
        let stats = merge_values(&old, &new).unwrap();
        assert_eq!(stats.functions_rebound, 1);

        let out = interp.call(&old.get("report"), &[]).unwrap();
        assert_eq!(out, Value::from("now 42"));
    }

    #[test]
    fn test_cycle_terminates_and_fields_applied_once() {
        let interp = Interpreter::new();
        let old = load(&interp, "a = { n = 1 }\nb = { n = 2, peer = a }\na.peer = b");
        let new = load(&interp, "a = { n = 10 }\nb = { n = 20, peer = a }\na.peer = b");
        let (old_a, old_b) = (old.get("a"), old.get("b"));

        let stats = merge_values(&old, &new).unwrap();
        assert_eq!(stats.tables_merged, 3);
        assert_eq!(stats.tables_adopted, 0);
        assert_eq!(old_a.get("n"), Value::Number(10.0));
        assert_eq!(old_b.get("n"), Value::Number(20.0));
        assert_eq!(old_a.get("peer"), old_b);
        assert_eq!(old_b.get("peer"), old_a);
    }

    #[test]
    fn test_new_structure_is_adopted_without_leaking_new_nodes() {
        let interp = Interpreter::new();
        let old = load(&interp, "keep = 1");
        let new = load(&interp, "a = { n = 1 }\nb = { peer = a }\na.peer = b");

        let stats = merge_values(&old, &new).unwrap();
        assert_eq!(stats.tables_adopted, 2);

        let a = old.get("a");
        let b = old.get("b");
        assert_ne!(a, new.get("a"));
        assert_ne!(b, new.get("b"));
        assert_eq!(b.get("peer"), a);
        assert_eq!(a.get("peer"), b);
    }

    #[test]
    fn test_shapes_merged_before_instances() {
        let interp = Interpreter::new();
        let source_v1 = "Entity = { speed = fn(self) => 1 }\nplayer = Entity { name = 'p' }";
        let source_v2 = "Entity = { speed = fn(self) => 2 }\nplayer = Entity { name = 'p' }";
        let old = load(&interp, source_v1);
        let player = old.get("player");

        merge_values(&old, &load(&interp, source_v2)).unwrap();

        let speed = player.get("speed");
        assert_eq!(interp.call(&speed, &[player.clone()]).unwrap(), Value::Number(2.0));
        let shape = table(&player).borrow().shape().unwrap();
        assert_eq!(Value::Table(shape), old.get("Entity"));
    }

    #[test]
    fn test_shape_attached_when_only_new_has_one() {
        let interp = Interpreter::new();
        let old = load(&interp, "Base = { kind = 'old' }\nthing = { id = 1 }");
        let new = load(&interp, "Base = { kind = 'new' }\nthing = Base { id = 1 }");
        let thing = old.get("thing");

        merge_values(&old, &new).unwrap();
        assert_eq!(thing.get("kind"), Value::from("new"));
        let shape = table(&thing).borrow().shape().unwrap();
        assert_eq!(Value::Table(shape), old.get("Base"));
    }

    #[test]
    fn test_shape_paired_regardless_of_field_order() {
        let interp = Interpreter::new();
        let old = load(&interp, "base = { kind = 'old' }\nalpha = { id = 1 }");
        let new = load(&interp, "base = { kind = 'new' }\nalpha = base { id = 1 }");
        let alpha = old.get("alpha");

        let stats = merge_values(&old, &new).unwrap();
        assert_eq!(stats.tables_adopted, 0);
        let shape = table(&alpha).borrow().shape().unwrap();
        assert_eq!(Value::Table(shape), old.get("base"));

        old.get("base").set("kind", Value::from("live")).unwrap();
        assert_eq!(alpha.get("kind"), Value::from("live"));
    }

    #[test]
    fn test_alias_seen_before_its_pair_stays_shared() {
        let interp = Interpreter::new();
        let old = load(&interp, "b = { n = 1 }");
        let b = old.get("b");
        let new = load(&interp, "b = { n = 2 }\na = b");

        let stats = merge_values(&old, &new).unwrap();
        assert_eq!(stats.tables_adopted, 0);
        assert_eq!(old.get("a"), b);
        assert_eq!(old.get("b"), b);
        assert_eq!(b.get("n"), Value::Number(2.0));
    }

    #[test]
    fn test_adopted_node_shared_by_two_parents_is_created_once() {
        let interp = Interpreter::new();
        let old = load(&interp, "left = { k = 1 }");
        let new = load(&interp, "shared = { v = 1 }\nleft = { s = shared }\nright = { s = shared }");

        let stats = merge_values(&old, &new).unwrap();
        assert_eq!(stats.tables_adopted, 2);
        let shared = old.get("shared");
        assert_eq!(old.get_path("left.s"), shared);
        assert_eq!(old.get_path("right.s"), shared);
        assert_ne!(shared, new.get("shared"));
    }

    #[test]
    fn test_merge_identical_copy_is_idempotent() {
        let interp = Interpreter::new();
        let source = "a = 1\nt = { s = 'x', inner = { n = 2 } }";
        let old = load(&interp, source);
        let before = old.to_display_string();

        merge_values(&old, &load(&interp, source)).unwrap();
        assert_eq!(old.to_display_string(), before);

        let inner = old.get_path("t.inner");
        merge_values(&old, &old.clone()).unwrap();
        assert_eq!(old.get_path("t.inner"), inner);
    }

    #[test]
    fn test_scalar_replaced_by_table() {
        let interp = Interpreter::new();
        let old = load(&interp, "cfg = 3");
        let new = load(&interp, "cfg = { level = 4 }");
        merge_values(&old, &new).unwrap();
        assert_eq!(old.get_path("cfg.level"), Value::Number(4.0));
        assert_ne!(old.get("cfg"), new.get("cfg"));
    }

    #[test]
    fn test_non_table_roots_are_not_merged() {
        assert!(merge_values(&Value::Number(1.0), &Value::new_table()).is_none());
    }
}
