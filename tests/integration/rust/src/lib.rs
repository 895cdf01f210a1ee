//! Cross-component integration tests for the embedding layer.
//!
//! The scenario tests live under `tests/`; this crate body only hosts the
//! shared helpers they import.

use engine_api::testing::{StubEngine, StubHandle};
use interpreter::Interpreter;
use std::sync::Arc;
use web_polyfills::testing::MockTransport;

/// A realm over the stub engine with a scripted transport.
pub struct TestRealm {
    /// The facade under test.
    pub realm: Interpreter,
    /// Introspection into the stub engine's value table.
    pub handle: StubHandle,
    /// The scripted transport behind the request polyfill.
    pub transport: MockTransport,
}

impl TestRealm {
    /// Builds the standard fixture.
    pub fn new() -> TestRealm {
        let (engine, handle) = StubEngine::with_handle();
        let transport = MockTransport::new();
        let realm = Interpreter::builder()
            .transport(Arc::new(transport.clone()))
            .build(move || Box::new(engine))
            .unwrap();
        TestRealm {
            realm,
            handle,
            transport,
        }
    }
}

impl Default for TestRealm {
    fn default() -> Self {
        Self::new()
    }
}
