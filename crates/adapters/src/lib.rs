// SPDX-License-Identifier: MIT

//! substrate-adapters: the `WorkerAdapter` trait the engine dispatches through, a
//! registry with concurrent health-check discovery, and two reference adapters
//! (`FakeAdapter`, `ShellAdapter`) that exercise the contract without wrapping any
//! particular vendor CLI.

pub mod adapter;
pub mod error;
pub mod registry;
pub mod shell;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use adapter::WorkerAdapter;
pub use error::AdapterError;
pub use registry::{AdapterRegistry, DiscoveryEntry, DiscoveryReport};
pub use shell::{ShellAdapter, ShellAdapterConfig};

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeAdapter;
