//! Structural merge behaviour on loaded module graphs

mod common;
use common::{at, run_module};
use lazarus::fs::MemoryFileSystem;
use lazarus::host::ManualClock;
use lazarus::merge::{merge_values, MergeStats};
use lazarus::{Interpreter, Supervisor, SupervisorConfig, Value};
use std::path::Path;
use std::time::Duration;

fn merge(old: &Value, new_source: &str) -> MergeStats {
    let new = run_module(new_source).unwrap();
    merge_values(old, &new).unwrap()
}

mod identity {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_nested_tables_keep_identity() {
        let old = run_module("player = { hp = 1, inv = { gold = 5 } }").unwrap();
        let player = old.get("player");
        let inv = player.get("inv");

        merge(&old, "player = { hp = 2, inv = { gold = 9, gems = 1 } }");

        assert_eq!(old.get("player"), player);
        assert_eq!(player.get("inv"), inv);
        assert_eq!(inv.get("gold"), Value::Number(9.0));
        assert_eq!(inv.get("gems"), Value::Number(1.0));
        assert_eq!(player.get("hp"), Value::Number(2.0));
    }

    #[test]
    fn test_host_fields_survive() {
        let old = run_module("player = { hp = 1 }").unwrap();
        old.get("player").set("kills", Value::Number(4.0)).unwrap();

        merge(&old, "player = { hp = 5 }");
        assert_eq!(old.get_path("player.kills"), Value::Number(4.0));
    }

    #[test]
    fn test_functions_read_the_live_root() {
        let interp = Interpreter::new();
        let old = interp.load_module("f = fn() => 0", "m.mod").unwrap();
        old.set("saved", Value::Number(7.0)).unwrap();

        let new = interp.load_module("f = fn() => saved + 1", "m.mod").unwrap();
        let stats = merge_values(&old, &new).unwrap();
        assert_eq!(stats.functions_rebound, 1);

        // the new generation does not have `saved`; only the old root does
        assert_eq!(interp.call(&old.get("f"), &[]).unwrap(), Value::Number(8.0));
    }
}

mod graphs {
    use super::*;
    use pretty_assertions::assert_eq;

    const CYCLIC: &str = "a = { n = 1 }\nb = { peer = a }\na.peer = b";

    #[test]
    fn test_cycle_merged_onto_matching_cycle() {
        let old = run_module(CYCLIC).unwrap();
        let (a, b) = (old.get("a"), old.get("b"));

        let stats = merge(&old, "a = { n = 2 }\nb = { peer = a }\na.peer = b");
        assert_eq!(stats.tables_adopted, 0);
        assert_eq!(old.get("a"), a);
        assert_eq!(a.get("peer"), b);
        assert_eq!(b.get("peer"), a);
        assert_eq!(a.get("n"), Value::Number(2.0));
    }

    #[test]
    fn test_cycle_adopted_without_leaking_new_nodes() {
        let old = run_module("x = 1").unwrap();
        let new = run_module(CYCLIC).unwrap();

        let stats = merge_values(&old, &new).unwrap();
        assert_eq!(stats.tables_adopted, 2);

        let (a, b) = (old.get("a"), old.get("b"));
        assert_ne!(a, new.get("a"));
        assert_ne!(b, new.get("b"));
        assert_eq!(a.get("peer"), b);
        assert_eq!(b.get("peer"), a);
        assert_eq!(old.get("x"), Value::Number(1.0));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let old = run_module("a = 1").unwrap();
        let source = "a = 2\nb = { c = { d = 'deep' } }";

        let first = merge(&old, source);
        let snapshot = old.to_string();
        let b = old.get("b");

        let second = merge(&old, source);
        assert_eq!(first.tables_adopted, 2);
        assert_eq!(second.tables_adopted, 0);
        assert_eq!(old.to_string(), snapshot);
        assert_eq!(old.get("b"), b);
    }

    #[test]
    fn test_shared_subtable_stays_shared() {
        let old = run_module("x = 1").unwrap();
        merge(&old, "stats = { hp = 1 }\nleft = { s = stats }\nright = { s = stats }");

        assert_eq!(old.get_path("left.s"), old.get("stats"));
        assert_eq!(old.get_path("right.s"), old.get("stats"));
    }

    #[test]
    fn test_non_table_roots_are_not_merged() {
        assert!(merge_values(&Value::Number(1.0), &Value::new_table()).is_none());
        assert!(merge_values(&Value::new_table(), &Value::from("x")).is_none());
    }
}

mod failed_reload {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_error_leaves_module_untouched() {
        let fs = MemoryFileSystem::new();
        let path = Path::new("/game/world.mod");
        fs.write(path, "size = 3\nzone = { name = 'start' }\nf = fn() => size", at(1));

        let clock = ManualClock::new();
        let config = SupervisorConfig {
            watch_path: "/game".into(),
            scan_interval_seconds: 1.0,
            entry_module: None,
            ..SupervisorConfig::default()
        };
        let mut sup = Supervisor::builder(config)
            .file_system(fs.clone())
            .clock(clock.clone())
            .build()
            .unwrap();

        let world = sup.require("world").unwrap();
        let zone = world.get("zone");
        let f = world.get("f");
        let before = world.to_string();
        sup.tick();

        fs.write(path, "size = 4\nzone = { name = 'next' }\nf = fn() => error(", at(2));
        clock.advance(Duration::from_secs(1));
        let reports = sup.tick();

        assert!(reports[0].error().is_some());
        assert_eq!(sup.module("world"), Some(world.clone()));
        assert_eq!(world.to_string(), before);
        assert_eq!(world.get("zone"), zone);
        assert_eq!(world.get("f"), f);
    }
}
