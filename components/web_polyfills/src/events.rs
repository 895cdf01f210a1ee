//! Event delivery for the request polyfill.
//!
//! Each event kind has at most one "property" slot (`onload` and friends,
//! last writer wins — read off the script object at emission time) and an
//! independent set of listeners (first registration per kind wins,
//! duplicates ignored). Emission invokes the property handler first, then
//! every listener, each receiving an event object whose propagation
//! control methods are intentionally inert.

use engine_api::{ScriptEngine, ScriptException, ValueId};

/// The event kinds a request can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Ready-state transition.
    ReadyStateChange,
    /// `send()` accepted the request.
    LoadStart,
    /// The request body was handed to the transport.
    Send,
    /// Response bytes arrived.
    Progress,
    /// The response completed successfully.
    Load,
    /// Terminal event, fired on success, error, and abort alike.
    LoadEnd,
    /// The request was aborted.
    Abort,
    /// The request failed.
    Error,
}

impl EventKind {
    /// The DOM-style event name.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ReadyStateChange => "readystatechange",
            EventKind::LoadStart => "loadstart",
            EventKind::Send => "send",
            EventKind::Progress => "progress",
            EventKind::Load => "load",
            EventKind::LoadEnd => "loadend",
            EventKind::Abort => "abort",
            EventKind::Error => "error",
        }
    }

    /// The single-slot property name, for kinds that expose one.
    pub fn property_slot(&self) -> Option<&'static str> {
        match self {
            EventKind::ReadyStateChange => Some("onreadystatechange"),
            EventKind::Load => Some("onload"),
            EventKind::Send => Some("onsend"),
            EventKind::Abort => Some("onabort"),
            EventKind::Error => Some("onerror"),
            EventKind::LoadStart | EventKind::Progress | EventKind::LoadEnd => None,
        }
    }

    /// Parses a DOM-style event name.
    pub fn from_name(name: &str) -> Option<EventKind> {
        match name {
            "readystatechange" => Some(EventKind::ReadyStateChange),
            "loadstart" => Some(EventKind::LoadStart),
            "send" => Some(EventKind::Send),
            "progress" => Some(EventKind::Progress),
            "load" => Some(EventKind::Load),
            "loadend" => Some(EventKind::LoadEnd),
            "abort" => Some(EventKind::Abort),
            "error" => Some(EventKind::Error),
            _ => None,
        }
    }
}

/// Ordered listener registrations, keyed by kind with set semantics.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Vec<(EventKind, ValueId)>,
}

impl ListenerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. Registering a callback already present for
    /// the same kind is ignored; returns whether the listener was added.
    pub fn add(&mut self, engine: &dyn ScriptEngine, kind: EventKind, callback: ValueId) -> bool {
        let duplicate = self
            .listeners
            .iter()
            .any(|(k, existing)| *k == kind && engine.same_value(*existing, callback));
        if duplicate {
            log::debug!("duplicate {} listener ignored", kind.name());
            return false;
        }
        self.listeners.push((kind, callback));
        true
    }

    /// Removes a listener by identity, returning the removed handles so
    /// the caller can release them.
    pub fn remove(
        &mut self,
        engine: &dyn ScriptEngine,
        kind: EventKind,
        callback: ValueId,
    ) -> Vec<ValueId> {
        let mut removed = Vec::new();
        self.listeners.retain(|(k, existing)| {
            if *k == kind && engine.same_value(*existing, callback) {
                removed.push(*existing);
                false
            } else {
                true
            }
        });
        removed
    }

    /// The listeners registered for a kind, in registration order.
    pub fn for_kind(&self, kind: EventKind) -> Vec<ValueId> {
        self.listeners
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, callback)| *callback)
            .collect()
    }

    /// Removes every registration, returning the handles for release.
    pub fn drain(&mut self) -> Vec<ValueId> {
        self.listeners.drain(..).map(|(_, cb)| cb).collect()
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Emits one event at `target`: property handler first, then listeners.
///
/// Handler exceptions are logged and do not interrupt delivery.
pub fn emit(engine: &dyn ScriptEngine, target: ValueId, listeners: &[ValueId], kind: EventKind) {
    let event = match build_event(engine, target, kind) {
        Ok(event) => event,
        Err(exception) => {
            log::warn!("could not build {} event: {}", kind.name(), exception);
            return;
        }
    };

    if let Some(slot) = kind.property_slot() {
        if let Ok(handler) = engine.get_property(target, slot) {
            if engine.is_callable(handler) {
                if let Err(exception) = engine.call_function(handler, Some(target), &[event]) {
                    log::warn!("{} property handler raised: {}", kind.name(), exception);
                }
            }
        }
    }
    for listener in listeners {
        if let Err(exception) = engine.call_function(*listener, Some(target), &[event]) {
            log::warn!("{} listener raised: {}", kind.name(), exception);
        }
    }
    engine.release(event);
}

fn build_event(
    engine: &dyn ScriptEngine,
    target: ValueId,
    kind: EventKind,
) -> Result<ValueId, ScriptException> {
    let payload = serde_json::json!({ "type": kind.name() });
    let event = engine.value_from_json(&payload.to_string())?;
    for alias in ["target", "currentTarget", "srcElement"] {
        engine.set_property(event, alias, target)?;
    }
    for stub in ["stopPropagation", "preventDefault", "stopImmediatePropagation"] {
        let noop = engine.wrap_function(stub, Box::new(|engine, _| Ok(engine.undefined())));
        engine.set_property(event, stub, noop)?;
    }
    Ok(event)
}
