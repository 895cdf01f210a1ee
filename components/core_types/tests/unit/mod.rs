//! Unit test aggregate for core_types

mod convert_tests;
