// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Publisher Integration Tests
//!
//! Test utilities and integration suites for the OPC UA publisher engine.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities, fixtures, and helpers
//!   - `fixtures`: Pre-built test data for consistent testing
//!   - `builders`: Builder patterns for constructing test objects
//!   - `assertions`: Custom assertion helpers
//!   - `mocks`: Scriptable in-memory OPC UA server
//!   - `harness`: Test harness for integration tests
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p opcpub-tests
//!
//! # Run specific test suite
//! cargo test -p opcpub-tests --test integration_registry
//! cargo test -p opcpub-tests --test integration_reconcile
//! cargo test -p opcpub-tests --test integration_keepalive
//! cargo test -p opcpub-tests --test integration_telemetry
//! cargo test -p opcpub-tests --test integration_config
//!
//! # Run with log output
//! RUST_LOG=opcpub_opcua=debug cargo test -p opcpub-tests -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! ### Registry Tests (`integration_registry.rs`)
//! - Idempotent adds across addressing forms
//! - Symmetric identity matching for removals
//! - Session creation, lookup and pruning
//!
//! ### Reconciliation Tests (`integration_reconcile.rs`)
//! - Group-per-interval invariant and pruning
//! - Removal before first activation
//! - Item failure triage and stale sessions
//! - Connect backoff and namespace renumbering
//!
//! ### Keep-alive Tests (`integration_keepalive.rs`)
//! - Threshold disconnect and point revocation
//! - Reconnect without duplication
//!
//! ### Telemetry Tests (`integration_telemetry.rs`)
//! - Record assembly from live notifications
//!
//! ### Config Tests (`integration_config.rs`)
//! - Loading YAML, TOML and JSON, placeholders and validation
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use opcpub_tests::prelude::*;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let harness = TestHarness::with_name("something");
//!     harness.add(Endpoints::plc(), Points::numeric(1001), None, None).await;
//!     harness.settle().await;
//!     assert_eq!(harness.transport.active_item_count(), 1);
//!     harness.shutdown().await;
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::assertions::*;
    pub use crate::common::builders::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
}
