use std::{cell::Cell, rc::Rc};

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tickcore::{CapabilityError, Member, Members, Protocol, ProtocolConfig, ProtocolTable};

#[derive(Default)]
struct Counter {
    count: Cell<i64>,
}

impl Protocol for Counter {
    fn members(self: Rc<Self>) -> Vec<(String, Member)> {
        Members::of(self)
            .method("increment", |counter, _| {
                counter.count.set(counter.count.get() + 1);
                Ok(Value::Null)
            })
            .method("get_count", |counter, _| Ok(json!(counter.count.get())))
            .property("label", "counter")
            .build()
    }
}

#[derive(Default)]
struct Greeter;

impl Protocol for Greeter {
    fn members(self: Rc<Self>) -> Vec<(String, Member)> {
        Members::of(self)
            .method("greet", |_, args| {
                let name = args.first().and_then(Value::as_str).unwrap_or("world");
                Ok(json!(format!("hello, {}", name)))
            })
            .property("label", "greeter")
            .build()
    }
}

/// Shadows `get_count` with a constant and tries to claim `label`.
#[derive(Default)]
struct Override;

impl Protocol for Override {
    fn members(self: Rc<Self>) -> Vec<(String, Member)> {
        Members::of(self)
            .method("get_count", |_, _| Ok(json!(-1)))
            .property("label", "override")
            .build()
    }
}

fn table_with<P: Protocol + Default>(names: &[&str]) -> ProtocolTable {
    let mut table = ProtocolTable::new();
    for name in names {
        table.register_default::<P>(ProtocolConfig::new(name)).unwrap();
    }
    table
}

#[test]
fn test_compose_empty_table() {
    let mut table = ProtocolTable::new();
    let surface = table.compose_all();
    assert!(surface.is_empty());
    assert_eq!(surface.len(), 0);
}

#[test]
fn test_compose_two_protocols_shared_counter() {
    let mut table = table_with::<Counter>(&["counter"]);
    table
        .register_default::<Greeter>(ProtocolConfig::new("greeter"))
        .unwrap();

    let surface = table.compose_all();
    assert_eq!(
        surface.names(),
        vec!["get_count", "greet", "increment", "label"]
    );

    for _ in 0..3 {
        surface.call("increment", &[]).unwrap();
    }
    assert_eq!(surface.call("get_count", &[]).unwrap(), json!(3));
    assert_eq!(
        surface.call("greet", &[json!("tick")]).unwrap(),
        json!("hello, tick")
    );
}

#[test]
fn test_recompose_reuses_instances() {
    let mut table = table_with::<Counter>(&["counter"]);

    let first = table.compose_all();
    first.call("increment", &[]).unwrap();
    first.call("increment", &[]).unwrap();

    let second = table.compose_all();
    second.call("increment", &[]).unwrap();

    assert_eq!(first.call("get_count", &[]).unwrap(), json!(3));
    assert_eq!(second.call("get_count", &[]).unwrap(), json!(3));
}

#[test]
fn test_merge_methods_last_wins_properties_first_wins() {
    let mut table = table_with::<Counter>(&["counter"]);
    table
        .register_default::<Override>(ProtocolConfig::new("override"))
        .unwrap();

    let surface = table.compose_all();

    // メソッドは後勝ち、プロパティは先勝ち
    assert_eq!(surface.call("get_count", &[]).unwrap(), json!(-1));
    assert_eq!(surface.property("label"), Some(&json!("counter")));
}

#[test]
fn test_surface_call_errors() {
    let mut table = table_with::<Counter>(&["counter"]);
    let surface = table.compose_all();

    assert_eq!(
        surface.call("missing", &[]),
        Err(CapabilityError::NotFound("missing".to_string()))
    );
    assert_eq!(
        surface.call("label", &[]),
        Err(CapabilityError::NotCallable("label".to_string()))
    );
}

#[test]
fn test_unregister_drops_instance() {
    let mut table = table_with::<Counter>(&["counter"]);
    table.compose_all();
    assert!(table.instance("counter").is_some());

    assert!(table.unregister("counter"));
    assert!(table.instance("counter").is_none());
    assert!(table.compose_all().is_empty());
}
