// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Common Test Utilities
//!
//! Shared test utilities, fixtures, and helpers for integration tests.
//!
//! ## Module Structure
//!
//! - `fixtures`: Endpoints, namespace tables, point identities, config snippets
//! - `builders`: Builders for engine settings and notifications
//! - `assertions`: Custom assertion helpers
//! - `mocks`: In-memory OPC UA server
//! - `harness`: Registry, loop and mock server wired together

pub mod assertions;
pub mod builders;
pub mod fixtures;
pub mod harness;
pub mod mocks;

// Re-exports for convenience
pub use assertions::*;
pub use builders::*;
pub use fixtures::*;
pub use harness::*;
pub use mocks::*;

use std::sync::Once;

use opcpub_config::{try_init_logging, LogFormat, LogLevel, LoggingConfig};

static INIT: Once = Once::new();

/// Initialize test logging once per test binary. `RUST_LOG` overrides the
/// default level.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let config = LoggingConfig {
            level: LogLevel::Debug,
            format: LogFormat::Compact,
            ..LoggingConfig::default()
        };
        // Another subscriber may already be installed by the test runner.
        let _ = try_init_logging(&config);
    });
}
