//! Unit test aggregate for the facade
