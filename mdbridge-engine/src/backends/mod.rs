// ABOUTME: Protocol engine backend implementations.
// ABOUTME: Contains the scriptable mock used by tests and the replay harness.

pub mod mock;
