//! Type registration: detection, synthesis and table building in one pass.

use crate::detect::CapabilitySet;
use crate::synth;
use crate::table::{RegularTable, SimpleTable};
use memory::heap::Map;
use std::any::type_name;
use std::rc::Rc;
use tracing::debug;
use vm::{
    CapabilityTable, FromArgs, IntoValue, MetaOp, NativeFn, NativeRegistry, RuntimeError,
    Strategy, TypeState, Value, VM,
};

/// Collects everything a registration installs for `T`.
///
/// Usually created through [`usertype!`](crate::usertype), which runs
/// capability detection where `T` is concrete.
pub struct UsertypeBuilder<T: 'static> {
    name: String,
    caps: CapabilitySet<T>,
    strategy: Option<Strategy>,
    methods: Vec<(String, NativeFn)>,
    values: Vec<(String, Value)>,
    functions: Vec<(String, NativeFn)>,
    constructor: Option<NativeFn>,
    parent: Option<Value>,
    fallback: Option<NativeFn>,
}

impl<T: 'static> UsertypeBuilder<T> {
    pub fn new(name: &str, caps: CapabilitySet<T>) -> Self {
        Self {
            name: name.to_string(),
            caps,
            strategy: None,
            methods: Vec::new(),
            values: Vec::new(),
            functions: Vec::new(),
            constructor: None,
            parent: None,
            fallback: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &CapabilitySet<T> {
        &self.caps
    }

    /// Overrides `VmConfig::default_strategy`.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn method<A, R, F>(mut self, name: &str, f: F) -> Self
    where
        A: FromArgs,
        R: IntoValue,
        F: Fn(&T, A) -> R + 'static,
    {
        let thunk = synth::method::<T, A, R, F>(self.qualified(name), f);
        self.methods.push((name.to_string(), thunk));
        self
    }

    pub fn method_mut<A, R, F>(mut self, name: &str, f: F) -> Self
    where
        A: FromArgs,
        R: IntoValue,
        F: Fn(&mut T, A) -> R + 'static,
    {
        let thunk = synth::method_mut::<T, A, R, F>(self.qualified(name), f);
        self.methods.push((name.to_string(), thunk));
        self
    }

    /// A raw member value, visible on every instance.
    pub fn value(mut self, name: &str, value: Value) -> Self {
        self.values.push((name.to_string(), value));
        self
    }

    /// A static function on the type's global table.
    pub fn function<A, R, F>(mut self, name: &str, f: F) -> Self
    where
        A: FromArgs,
        R: IntoValue,
        F: Fn(A) -> R + 'static,
    {
        self.functions.push((name.to_string(), synth::function(f)));
        self
    }

    /// Replaces the `Default`-backed `new` factory.
    pub fn constructor<A, F>(mut self, f: F) -> Self
    where
        A: FromArgs,
        F: Fn(A) -> T + 'static,
    {
        self.constructor = Some(synth::ctor::<T, A, F>(f));
        self
    }

    /// Script table consulted when member lookup misses. Regular strategy only.
    pub fn parent(mut self, table: Value) -> Self {
        self.parent = Some(table);
        self
    }

    /// `__index` hook for keys nothing else resolves. Regular strategy only.
    pub fn fallback<R, F>(mut self, f: F) -> Self
    where
        R: IntoValue,
        F: Fn(&T, &str) -> R + 'static,
    {
        let name: Rc<str> = Rc::from(self.name.as_str());
        self.fallback = Some(synth::index_hook::<T, R, F>(name, f));
        self
    }

    fn qualified(&self, member: &str) -> Rc<str> {
        Rc::from(format!("{}.{}", self.name, member))
    }

    /// Installs the type. Returns the type's global table (holding `new`
    /// and static functions).
    ///
    /// A regular type that is already registered is extended in place. A
    /// simple type cannot be registered twice.
    pub fn register(self, vm: &mut VM) -> Result<Value, RuntimeError> {
        let strategy = self.strategy.unwrap_or(vm.config.default_strategy);
        let state = vm
            .type_index_of::<T>()
            .and_then(|index| vm.registered_type(index))
            .map_or(TypeState::Unregistered, |ty| ty.state);

        match (state, strategy) {
            (TypeState::Finalized, _) => {
                return Err(RuntimeError::TableFinalized(self.name));
            }
            (TypeState::Registering, _) => {
                return Err(RuntimeError::RegistrationFailed(format!(
                    "'{}' is already being registered",
                    self.name
                )));
            }
            (TypeState::Open, Strategy::Simple) => {
                return Err(RuntimeError::RegistrationFailed(format!(
                    "'{}' is registered with the regular strategy",
                    self.name
                )));
            }
            (_, Strategy::Simple) if self.parent.is_some() || self.fallback.is_some() => {
                return Err(RuntimeError::RegistrationFailed(format!(
                    "'{}': simple tables have no fallback chain",
                    self.name
                )));
            }
            _ => {}
        }
        if let Some(parent) = self.parent {
            if !parent.is_map() {
                return Err(RuntimeError::RegistrationFailed(format!(
                    "parent of '{}' must be a table, got {}",
                    self.name,
                    parent.type_name()
                )));
            }
        }

        if state == TypeState::Open {
            let index = vm.ensure_type::<T>(&self.name);
            return self.extend(vm, index);
        }
        // The type table becomes an immutable global; never shadow another.
        if vm.has_global(&self.name) {
            return Err(RuntimeError::RegistrationFailed(format!(
                "global '{}' is already defined",
                self.name
            )));
        }
        let index = vm.ensure_type::<T>(&self.name);
        self.install(vm, index, strategy)
    }

    fn members(&self, vm: &mut VM) -> Vec<(String, Value)> {
        let mut members = Vec::with_capacity(self.methods.len() + self.values.len());
        for (name, thunk) in &self.methods {
            let qualified = format!("{}.{}", self.name, name);
            members.push((name.clone(), vm.alloc_native(&qualified, thunk.clone(), -1)));
        }
        members.extend(self.values.iter().cloned());
        members
    }

    /// Entries for the type's global table. The `Default` factory is only
    /// produced on first installation.
    fn statics(&self, vm: &mut VM, with_default: bool) -> Vec<(String, Value)> {
        let ctor = self.constructor.clone().or_else(|| {
            self.caps
                .construct
                .filter(|_| with_default)
                .map(synth::default_ctor)
        });
        let mut statics = Vec::new();
        if let Some(ctor) = ctor {
            let arity = if self.constructor.is_some() { -1 } else { 0 };
            let qualified = format!("{}.new", self.name);
            statics.push(("new".to_string(), vm.alloc_native(&qualified, ctor, arity)));
        }
        for (name, thunk) in &self.functions {
            let qualified = format!("{}.{}", self.name, name);
            statics.push((name.clone(), vm.alloc_native(&qualified, thunk.clone(), -1)));
        }
        statics
    }

    fn install(self, vm: &mut VM, index: u32, strategy: Strategy) -> Result<Value, RuntimeError> {
        set_state(vm, index, TypeState::Registering);

        let mut ops = synth::synthesize(vm, &self.name, &self.caps);
        if let Some(hook) = self.fallback.clone() {
            ops.push((MetaOp::Index, hook));
        }
        let members = self.members(vm);

        let table: Box<dyn CapabilityTable> = match strategy {
            Strategy::Simple => Box::new(SimpleTable::build(&self.name, ops, members)),
            Strategy::Regular => {
                let mut table = RegularTable::new(&self.name);
                for (op, thunk) in ops {
                    table.set_metamethod(op, thunk)?;
                }
                for (name, value) in members {
                    table.set_member(&name, value)?;
                }
                if let Some(parent) = self.parent {
                    table.set_parent(parent)?;
                }
                Box::new(table)
            }
        };

        let statics: Map = self.statics(vm, true).into_iter().collect();
        let global = vm.alloc_map(statics);
        vm.define_global(&self.name, global);

        if let Some(ty) = vm.registered_type_mut(index) {
            ty.name = self.name.clone();
            ty.flags = self.caps.flags();
            ty.table = Some(table);
            ty.global = Some(global);
            ty.state = match strategy {
                Strategy::Simple => TypeState::Finalized,
                Strategy::Regular => TypeState::Open,
            };
        }
        debug!(
            name = %self.name,
            ?strategy,
            rust_type = type_name::<T>(),
            flags = ?self.caps.flags(),
            "usertype registered"
        );
        Ok(global)
    }

    /// Adds this builder's members, statics and hook to an open table.
    /// Capability thunks were installed with the table and are not rebuilt.
    fn extend(self, vm: &mut VM, index: u32) -> Result<Value, RuntimeError> {
        let global = vm
            .registered_type(index)
            .and_then(|ty| ty.global)
            .ok_or_else(|| {
                RuntimeError::RegistrationFailed(format!("'{}' has no type table", self.name))
            })?;
        let ops: Vec<(MetaOp, NativeFn)> = self
            .fallback
            .clone()
            .map(|hook| (MetaOp::Index, hook))
            .into_iter()
            .collect();
        let members = self.members(vm);
        let statics = self.statics(vm, false);

        for (name, value) in statics {
            vm.set_field(global, &name, value)?;
        }

        let ty = vm
            .registered_type_mut(index)
            .ok_or_else(|| RuntimeError::RegistrationFailed(self.name.clone()))?;
        let table = ty
            .table
            .as_mut()
            .ok_or_else(|| RuntimeError::RegistrationFailed(self.name.clone()))?;
        for (op, thunk) in ops {
            table.set_metamethod(op, thunk)?;
        }
        for (name, value) in &members {
            table.set_member(name, *value)?;
        }
        if let Some(parent) = self.parent {
            table.set_parent(parent)?;
        }
        debug!(name = %self.name, added = members.len(), "usertype extended");
        Ok(global)
    }
}

fn set_state(vm: &mut VM, index: u32, state: TypeState) {
    if let Some(ty) = vm.registered_type_mut(index) {
        ty.state = state;
    }
}

/// Adds a member to a registered type after the fact. Fails with
/// `TableFinalized` for simple types.
pub fn add_member<T: 'static>(vm: &mut VM, name: &str, value: Value) -> Result<(), RuntimeError> {
    let index = vm.type_index_of::<T>().ok_or_else(|| {
        RuntimeError::RegistrationFailed(format!("{} is not registered", type_name::<T>()))
    })?;
    let ty = vm
        .registered_type_mut(index)
        .ok_or_else(|| RuntimeError::RegistrationFailed(type_name::<T>().to_string()))?;
    let ty_name = ty.name.clone();
    let table = ty.table.as_mut().ok_or_else(|| {
        RuntimeError::RegistrationFailed(format!("'{}' has no capability table yet", ty_name))
    })?;
    table.set_member(name, value)?;
    debug!(ty = %ty_name, member = name, "member added");
    Ok(())
}

/// Starts a registration for `$ty`, detecting its capabilities.
#[macro_export]
macro_rules! usertype {
    ($ty:ty, $name:expr) => {
        $crate::UsertypeBuilder::<$ty>::new($name, $crate::capabilities!($ty))
    };
}

/// Registers `$ty` with an open, extensible table.
#[macro_export]
macro_rules! new_usertype {
    ($vm:expr, $ty:ty, $name:expr) => {
        $crate::usertype!($ty, $name)
            .strategy($crate::Strategy::Regular)
            .register($vm)
    };
}

/// Registers `$ty` with a flat table, finalized immediately.
#[macro_export]
macro_rules! new_simple_usertype {
    ($vm:expr, $ty:ty, $name:expr) => {
        $crate::usertype!($ty, $name)
            .strategy($crate::Strategy::Simple)
            .register($vm)
    };
}
