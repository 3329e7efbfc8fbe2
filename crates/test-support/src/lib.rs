//! Shared fixtures for the PROV-IO test suites.

pub mod support;

pub use support::fake_library::{FakeHandle, FakeLibrary};
