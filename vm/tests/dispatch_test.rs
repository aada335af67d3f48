//! Operator dispatch through hand-built capability tables.

use memory::{UserData, Value};
use smallvec::smallvec;
use std::collections::HashMap;
use vm::{
    native_fn, ret, CapabilityTable, GarbageCollector, MetaOp, NativeFn, NativeRegistry,
    RuntimeError, Strategy, TypeState, VM,
};

// ======================================================================
// Helpers
// ======================================================================

#[derive(Default)]
struct MapTable {
    ops: HashMap<MetaOp, NativeFn>,
    members: HashMap<String, Value>,
}

impl CapabilityTable for MapTable {
    fn strategy(&self) -> Strategy {
        Strategy::Regular
    }

    fn metamethod(&self, op: MetaOp) -> Option<NativeFn> {
        self.ops.get(&op).cloned()
    }

    fn member(&self, name: &str) -> Option<Value> {
        self.members.get(name).copied()
    }

    fn set_metamethod(&mut self, op: MetaOp, thunk: NativeFn) -> Result<(), RuntimeError> {
        self.ops.insert(op, thunk);
        Ok(())
    }

    fn set_member(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.members.insert(name.to_string(), value);
        Ok(())
    }

    fn roots(&self) -> Vec<Value> {
        self.members.values().copied().collect()
    }
}

struct Counter {
    hits: i64,
}

/// Registers `Counter` with a `__call` that bumps and returns `hits`.
fn counter_vm() -> (VM, u32) {
    let mut vm = VM::new();
    let idx = vm.ensure_type::<Counter>("Counter");
    let mut table = MapTable::default();
    let call: NativeFn = native_fn(|vm: &mut VM, args: &[Value]| {
        let c = vm.borrow_userdata_mut::<Counter>(args[0])?;
        c.hits += 1;
        Ok(ret(Value::int(c.hits)))
    });
    table.set_metamethod(MetaOp::Call, call).unwrap();
    let ty = vm.registered_type_mut(idx).unwrap();
    ty.table = Some(Box::new(table));
    ty.state = TypeState::Open;
    (vm, idx)
}

// ======================================================================
// call
// ======================================================================

#[test]
fn call_dispatches_to_userdata_thunk() {
    let (mut vm, idx) = counter_vm();
    let obj = vm.alloc_userdata(UserData::owned(idx, Counter { hits: 0 }));

    assert_eq!(vm.call_first(obj, &[]).unwrap(), Value::int(1));
    assert_eq!(vm.call_first(obj, &[]).unwrap(), Value::int(2));
    assert_eq!(vm.borrow_userdata::<Counter>(obj).unwrap().hits, 2);
}

#[test]
fn read_only_binding_cannot_be_called_mutably() {
    let (mut vm, idx) = counter_vm();
    let host = Counter { hits: 7 };
    let slot = unsafe { UserData::borrowed(idx, (&host).into(), false) };
    let obj = vm.alloc_userdata(slot);

    let err = vm.call(obj, &[]).unwrap_err();
    assert_eq!(err, RuntimeError::BorrowMutability("Counter".into()));
    assert_eq!(host.hits, 7);
}

#[test]
fn calling_a_table_is_an_attempt_error() {
    let mut vm = VM::new();
    let t = vm.alloc_map(Default::default());
    let err = vm.call(t, &[]).unwrap_err();
    assert_eq!(err.to_string(), "attempt to call a table value");
}

#[test]
fn native_arity_is_checked_before_invocation() {
    let mut vm = VM::new();
    let len = vm.global("len").unwrap();
    let err = vm.call(len, &[]).unwrap_err();
    assert!(matches!(err, RuntimeError::ArityMismatch(_)));
}

#[test]
fn panicking_native_becomes_native_exception() {
    let mut vm = VM::new();
    let boom = vm.alloc_native(
        "boom",
        native_fn(|_: &mut VM, _: &[Value]| panic!("kaboom")),
        0,
    );
    let err = vm.call(boom, &[]).unwrap_err();
    assert_eq!(err, RuntimeError::NativeException("kaboom".into()));
    assert!(!vm.in_native());
}

// ======================================================================
// equality / tostring / index
// ======================================================================

#[test]
fn userdata_without_eq_compares_by_identity() {
    let (mut vm, idx) = counter_vm();
    let mut host = Counter { hits: 0 };
    let ptr = std::ptr::NonNull::from(&mut host);
    let a = vm.alloc_userdata(unsafe { UserData::borrowed(idx, ptr, true) });
    let b = vm.alloc_userdata(unsafe { UserData::borrowed(idx, ptr, true) });
    let other = vm.alloc_userdata(UserData::owned(idx, Counter { hits: 0 }));

    assert!(vm.equals(a, b).unwrap());
    assert!(!vm.equals(a, other).unwrap());
}

#[test]
fn strings_compare_by_content() {
    let mut vm = VM::new();
    let a = vm.alloc_str("woof");
    let b = vm.alloc_str("woof");
    assert_ne!(a, b);
    assert!(vm.equals(a, b).unwrap());
}

#[test]
fn default_tostring_names_type_and_address() {
    let (mut vm, idx) = counter_vm();
    let obj = vm.alloc_userdata(UserData::owned(idx, Counter { hits: 0 }));
    let address = vm.userdata(obj).unwrap().address();
    assert_eq!(
        vm.tostring(obj).unwrap(),
        format!("Counter: {:#x}", address)
    );
}

#[test]
fn index_falls_back_to_parent_table_then_hook() {
    let (mut vm, idx) = counter_vm();
    let mut parent = memory::heap::Map::new();
    parent.insert("species".into(), Value::int(3));
    let parent = vm.alloc_map(parent);

    struct WithParent(MapTable, Value);
    impl CapabilityTable for WithParent {
        fn strategy(&self) -> Strategy {
            Strategy::Regular
        }
        fn metamethod(&self, op: MetaOp) -> Option<NativeFn> {
            self.0.metamethod(op)
        }
        fn member(&self, name: &str) -> Option<Value> {
            self.0.member(name)
        }
        fn set_metamethod(&mut self, op: MetaOp, thunk: NativeFn) -> Result<(), RuntimeError> {
            self.0.set_metamethod(op, thunk)
        }
        fn set_member(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
            self.0.set_member(name, value)
        }
        fn parent(&self) -> Option<Value> {
            Some(self.1)
        }
        fn roots(&self) -> Vec<Value> {
            vec![self.1]
        }
    }

    let mut table = MapTable::default();
    table.set_member("legs", Value::int(4)).unwrap();
    table
        .set_metamethod(
            MetaOp::Index,
            native_fn(|vm: &mut VM, args: &[Value]| {
                let key = vm.str_of(args[1]).unwrap_or_default().to_uppercase();
                Ok(ret(vm.alloc_str(&key)))
            }),
        )
        .unwrap();
    vm.registered_type_mut(idx).unwrap().table = Some(Box::new(WithParent(table, parent)));

    let obj = vm.alloc_userdata(UserData::owned(idx, Counter { hits: 0 }));
    assert_eq!(vm.index(obj, "legs").unwrap(), Value::int(4));
    assert_eq!(vm.index(obj, "species").unwrap(), Value::int(3));
    let hooked = vm.index(obj, "tail").unwrap();
    assert_eq!(vm.str_of(hooked), Some("TAIL"));
}

// ======================================================================
// iteration
// ======================================================================

#[test]
fn pairs_over_table_visits_keys_in_order() {
    let mut vm = VM::new();
    let mut m = memory::heap::Map::new();
    m.insert("b".into(), Value::int(2));
    m.insert("a".into(), Value::int(1));
    let t = vm.alloc_map(m);

    let mut seen = Vec::new();
    let n = vm
        .for_each_pair(t, |vm, k, v| {
            seen.push((vm.str_of(k).unwrap().to_string(), v.as_int().unwrap()));
            Ok(())
        })
        .unwrap();
    assert_eq!(n, 2);
    assert_eq!(seen, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
}

#[test]
fn pairs_on_userdata_uses_thunk_triple() {
    let (mut vm, idx) = counter_vm();
    // step(state, control): counts control up to 3
    let step = vm.alloc_native(
        "step",
        native_fn(|_: &mut VM, args: &[Value]| {
            let k = args[1].as_int().unwrap_or(0) + 1;
            if k > 3 {
                return Ok(ret(Value::nil()));
            }
            Ok(smallvec![Value::int(k), Value::int(k * 10)])
        }),
        2,
    );
    vm.registered_type_mut(idx)
        .unwrap()
        .table
        .as_mut()
        .unwrap()
        .set_metamethod(
            MetaOp::Pairs,
            native_fn(move |_: &mut VM, args: &[Value]| {
                Ok(smallvec![step, args[0], Value::nil()])
            }),
        )
        .unwrap();

    let obj = vm.alloc_userdata(UserData::owned(idx, Counter { hits: 0 }));
    let mut total = 0;
    vm.for_each_pair(obj, |_, _, v| {
        total += v.as_int().unwrap();
        Ok(())
    })
    .unwrap();
    assert_eq!(total, 60);
}

#[test]
fn iterating_a_number_fails() {
    let mut vm = VM::new();
    let err = vm.pairs(Value::int(1)).unwrap_err();
    assert_eq!(err.to_string(), "attempt to iterate a number value");
    let err = vm.length(Value::bool(true)).unwrap_err();
    assert_eq!(err.to_string(), "attempt to get length of a boolean value");
}

// ======================================================================
// GC
// ======================================================================

#[test]
fn unreachable_owned_userdata_is_destroyed_on_collect() {
    let (mut vm, idx) = counter_vm();
    let kept = vm.alloc_userdata(UserData::owned(idx, Counter { hits: 1 }));
    vm.set_global("kept", kept).unwrap();
    vm.alloc_userdata(UserData::owned(idx, Counter { hits: 2 }));

    let stats = vm.collect_garbage();
    assert_eq!(stats.destroyed, 1);
    assert_eq!(vm.borrow_userdata::<Counter>(kept).unwrap().hits, 1);
}

#[test]
fn collection_is_deferred_inside_natives() {
    let mut vm = VM::new();
    let gc = vm.alloc_native(
        "gc",
        native_fn(|vm: &mut VM, _: &[Value]| {
            let stats = vm.collect_garbage();
            Ok(ret(Value::int(stats.userdata as i64)))
        }),
        0,
    );
    vm.alloc_userdata(UserData::owned(0, 5u64));
    assert_eq!(vm.call_first(gc, &[]).unwrap(), Value::int(0));
    assert_eq!(vm.heap.live_userdata(), 1);
}
