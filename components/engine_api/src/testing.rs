//! Deterministic in-memory engine for tests.
//!
//! [`StubEngine`] implements [`ScriptEngine`] over a table of JSON values,
//! host functions, objects, and promises with a real microtask queue. It is
//! deliberately not a script interpreter: `evaluate` accepts JSON-literal
//! sources (and a `throw:` prefix to exercise the exception path) and
//! records every source string so tests can assert what reached the engine.
//!
//! Script behavior is simulated by looking up installed globals and calling
//! them through [`ScriptEngine::call_function`], which exercises exactly the
//! surface the polyfills install.

use crate::engine::{HostFunction, PromiseParts, ScriptEngine, ScriptException, ValueId};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

const GLOBAL_ID: u64 = 0;
const UNDEFINED_ID: u64 = 1;

struct Microjob {
    function: ValueId,
    args: Vec<ValueId>,
}

enum CellState {
    Pending,
    Fulfilled(ValueId),
    Rejected(ValueId),
}

struct Reaction {
    on_fulfilled: Option<ValueId>,
    on_rejected: Option<ValueId>,
}

struct PromiseCell {
    state: CellState,
    reactions: Vec<Reaction>,
}

impl PromiseCell {
    fn settle(&mut self, reject: bool, value: ValueId) -> Vec<Microjob> {
        if !matches!(self.state, CellState::Pending) {
            return Vec::new();
        }
        self.state = if reject {
            CellState::Rejected(value)
        } else {
            CellState::Fulfilled(value)
        };
        self.reactions
            .drain(..)
            .filter_map(|reaction| {
                let handler = if reject {
                    reaction.on_rejected
                } else {
                    reaction.on_fulfilled
                };
                handler.map(|function| Microjob {
                    function,
                    args: vec![value],
                })
            })
            .collect()
    }

    fn register(
        &mut self,
        on_fulfilled: Option<ValueId>,
        on_rejected: Option<ValueId>,
    ) -> Option<Microjob> {
        match self.state {
            CellState::Pending => {
                self.reactions.push(Reaction {
                    on_fulfilled,
                    on_rejected,
                });
                None
            }
            CellState::Fulfilled(value) => on_fulfilled.map(|function| Microjob {
                function,
                args: vec![value],
            }),
            CellState::Rejected(value) => on_rejected.map(|function| Microjob {
                function,
                args: vec![value],
            }),
        }
    }
}

enum Slot {
    Undefined,
    Json(JsonValue),
    Object(HashMap<String, ValueId>),
    Function(Arc<Mutex<HostFunction>>),
    Promise(Arc<Mutex<PromiseCell>>),
    Settler {
        cell: Arc<Mutex<PromiseCell>>,
        reject: bool,
    },
    ThenHook(Arc<Mutex<PromiseCell>>),
}

struct Inner {
    values: HashMap<u64, Slot>,
    next_id: u64,
    evaluated: Vec<String>,
    microtasks: VecDeque<Microjob>,
}

impl Inner {
    fn jsonify(&self, id: ValueId, depth: u32) -> JsonValue {
        if depth > 32 {
            return JsonValue::Null;
        }
        match self.values.get(&id.0) {
            Some(Slot::Json(value)) => value.clone(),
            Some(Slot::Object(map)) => JsonValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), self.jsonify(*value, depth + 1)))
                    .collect(),
            ),
            _ => JsonValue::Null,
        }
    }
}

/// A deterministic value-table engine for exercising the embedding layer.
pub struct StubEngine {
    inner: Arc<Mutex<Inner>>,
}

/// Introspection handle into a [`StubEngine`], usable from any thread.
///
/// The handle outlives the engine move onto the lane thread, so tests can
/// assert against recorded sources and the live value table while the
/// engine is running.
#[derive(Clone)]
pub struct StubHandle {
    inner: Arc<Mutex<Inner>>,
}

impl StubEngine {
    /// Creates a stub engine.
    pub fn new() -> Self {
        Self::with_handle().0
    }

    /// Creates a stub engine together with its introspection handle.
    pub fn with_handle() -> (Self, StubHandle) {
        let mut values = HashMap::new();
        values.insert(GLOBAL_ID, Slot::Object(HashMap::new()));
        values.insert(UNDEFINED_ID, Slot::Undefined);
        let inner = Arc::new(Mutex::new(Inner {
            values,
            next_id: 2,
            evaluated: Vec::new(),
            microtasks: VecDeque::new(),
        }));
        (
            Self {
                inner: inner.clone(),
            },
            StubHandle { inner },
        )
    }

    fn alloc(&self, slot: Slot) -> ValueId {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.values.insert(id, slot);
        ValueId(id)
    }

    fn alloc_from_json(&self, value: JsonValue) -> ValueId {
        match value {
            JsonValue::Object(map) => {
                let fields: HashMap<String, ValueId> = map
                    .into_iter()
                    .map(|(key, value)| (key, self.alloc_from_json(value)))
                    .collect();
                self.alloc(Slot::Object(fields))
            }
            other => self.alloc(Slot::Json(other)),
        }
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

enum CallAction {
    Host(Arc<Mutex<HostFunction>>),
    Settle(Arc<Mutex<PromiseCell>>, bool),
    Then(Arc<Mutex<PromiseCell>>),
}

impl ScriptEngine for StubEngine {
    fn evaluate(&self, source: &str) -> Result<ValueId, ScriptException> {
        self.inner.lock().evaluated.push(source.to_string());
        let trimmed = source.trim();
        if let Some(message) = trimmed.strip_prefix("throw:") {
            return Err(ScriptException::new(message.trim()));
        }
        match serde_json::from_str::<JsonValue>(trimmed) {
            Ok(value) => Ok(self.alloc_from_json(value)),
            Err(_) => Ok(self.undefined()),
        }
    }

    fn global(&self) -> ValueId {
        ValueId(GLOBAL_ID)
    }

    fn undefined(&self) -> ValueId {
        ValueId(UNDEFINED_ID)
    }

    fn get_property(&self, target: ValueId, name: &str) -> Result<ValueId, ScriptException> {
        enum Found {
            Id(Option<ValueId>),
            Json(Option<JsonValue>),
            Then(Arc<Mutex<PromiseCell>>),
        }

        let found = {
            let inner = self.inner.lock();
            match inner.values.get(&target.0) {
                Some(Slot::Object(map)) => Found::Id(map.get(name).copied()),
                Some(Slot::Json(JsonValue::Object(map))) => Found::Json(map.get(name).cloned()),
                Some(Slot::Promise(cell)) if name == "then" => Found::Then(cell.clone()),
                _ => Found::Id(None),
            }
        };
        Ok(match found {
            Found::Id(Some(id)) => id,
            Found::Id(None) | Found::Json(None) => self.undefined(),
            Found::Json(Some(value)) => self.alloc_from_json(value),
            Found::Then(cell) => self.alloc(Slot::ThenHook(cell)),
        })
    }

    fn set_property(
        &self,
        target: ValueId,
        name: &str,
        value: ValueId,
    ) -> Result<(), ScriptException> {
        let mut inner = self.inner.lock();
        match inner.values.get_mut(&target.0) {
            Some(Slot::Object(map)) => {
                map.insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(ScriptException::new(format!(
                "cannot set property `{}` on a non-object value",
                name
            ))),
        }
    }

    fn call_function(
        &self,
        function: ValueId,
        _this: Option<ValueId>,
        args: &[ValueId],
    ) -> Result<ValueId, ScriptException> {
        let action = {
            let inner = self.inner.lock();
            match inner.values.get(&function.0) {
                Some(Slot::Function(body)) => CallAction::Host(body.clone()),
                Some(Slot::Settler { cell, reject }) => CallAction::Settle(cell.clone(), *reject),
                Some(Slot::ThenHook(cell)) => CallAction::Then(cell.clone()),
                _ => return Err(ScriptException::new("value is not a function")),
            }
        };
        match action {
            CallAction::Host(body) => {
                let mut function = body.lock();
                (*function)(self, args)
            }
            CallAction::Settle(cell, reject) => {
                let value = args.first().copied().unwrap_or_else(|| self.undefined());
                let jobs = cell.lock().settle(reject, value);
                let mut inner = self.inner.lock();
                inner.microtasks.extend(jobs);
                Ok(self.undefined())
            }
            CallAction::Then(cell) => {
                let on_fulfilled = args.first().copied().filter(|id| self.is_callable(*id));
                let on_rejected = args.get(1).copied().filter(|id| self.is_callable(*id));
                let job = cell.lock().register(on_fulfilled, on_rejected);
                if let Some(job) = job {
                    self.inner.lock().microtasks.push_back(job);
                }
                Ok(self.undefined())
            }
        }
    }

    fn is_callable(&self, value: ValueId) -> bool {
        matches!(
            self.inner.lock().values.get(&value.0),
            Some(Slot::Function(_)) | Some(Slot::Settler { .. }) | Some(Slot::ThenHook(_))
        )
    }

    fn is_undefined(&self, value: ValueId) -> bool {
        matches!(
            self.inner.lock().values.get(&value.0),
            None | Some(Slot::Undefined)
        )
    }

    fn same_value(&self, a: ValueId, b: ValueId) -> bool {
        if a == b {
            return true;
        }
        let inner = self.inner.lock();
        match (inner.values.get(&a.0), inner.values.get(&b.0)) {
            (Some(Slot::Function(x)), Some(Slot::Function(y))) => Arc::ptr_eq(x, y),
            (Some(Slot::Promise(x)), Some(Slot::Promise(y))) => Arc::ptr_eq(x, y),
            (Some(Slot::Json(x)), Some(Slot::Json(y))) => x == y,
            (Some(Slot::Undefined), Some(Slot::Undefined)) => true,
            _ => false,
        }
    }

    fn wrap_function(&self, name: &str, function: HostFunction) -> ValueId {
        log::trace!("wrapped host function `{}`", name);
        self.alloc(Slot::Function(Arc::new(Mutex::new(function))))
    }

    fn new_promise(&self) -> Result<PromiseParts, ScriptException> {
        let cell = Arc::new(Mutex::new(PromiseCell {
            state: CellState::Pending,
            reactions: Vec::new(),
        }));
        Ok(PromiseParts {
            promise: self.alloc(Slot::Promise(cell.clone())),
            resolve: self.alloc(Slot::Settler {
                cell: cell.clone(),
                reject: false,
            }),
            reject: self.alloc(Slot::Settler { cell, reject: true }),
        })
    }

    fn value_from_json(&self, json: &str) -> Result<ValueId, ScriptException> {
        let value = serde_json::from_str::<JsonValue>(json)
            .map_err(|e| ScriptException::new(format!("invalid JSON: {}", e)))?;
        Ok(self.alloc_from_json(value))
    }

    fn value_to_json(&self, value: ValueId) -> Result<String, ScriptException> {
        let json = self.inner.lock().jsonify(value, 0);
        serde_json::to_string(&json).map_err(|e| ScriptException::new(e.to_string()))
    }

    fn drain_microtasks(&self) {
        loop {
            let job = self.inner.lock().microtasks.pop_front();
            let Some(job) = job else { break };
            if let Err(exception) = self.call_function(job.function, None, &job.args) {
                log::warn!("microtask raised: {}", exception);
            }
        }
    }

    fn release(&self, value: ValueId) {
        if value.0 > UNDEFINED_ID {
            self.inner.lock().values.remove(&value.0);
        }
    }
}

impl StubHandle {
    /// Every source string that reached `evaluate`, in order.
    pub fn evaluated_sources(&self) -> Vec<String> {
        self.inner.lock().evaluated.clone()
    }

    /// Whether the value table still holds the given handle.
    pub fn contains(&self, value: ValueId) -> bool {
        self.inner.lock().values.contains_key(&value.0)
    }

    /// Number of live entries in the value table (including the global and
    /// `undefined` singletons).
    pub fn live_values(&self) -> usize {
        self.inner.lock().values.len()
    }

    /// JSON rendering of a live value, if the handle resolves.
    pub fn json_of(&self, value: ValueId) -> Option<JsonValue> {
        let inner = self.inner.lock();
        inner
            .values
            .contains_key(&value.0)
            .then(|| inner.jsonify(value, 0))
    }

    /// Number of queued, not-yet-drained microtasks.
    pub fn pending_microtasks(&self) -> usize {
        self.inner.lock().microtasks.len()
    }
}
