// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is flagged
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are flagged
#![warn(unused_variables)]            // Unused variables are flagged
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Tests may unwrap and panic freely
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Cairn
//!
//! A declarative resource orchestration engine: declare resources and the
//! outputs they consume from each other, and Cairn creates, updates and
//! deletes them in dependency order.
//!
//! ## Overview
//!
//! - Declarations live in a YAML file (`cairn.yaml`)
//! - References like `${bucket1.id}` become dependency edges
//! - Every run diffs the declarations against the recorded state
//! - Independent resources are applied concurrently; a failure only stops
//!   the resources that depend on it
//! - State is saved after every successful operation
//!
//! ## Architecture
//!
//! 1. **Graph**: declarations and their references form a DAG
//! 2. **Diff**: the DAG is compared to the recorded state, producing a plan
//!    of creates, updates, deletes and no-ops
//! 3. **Execution**: the plan is applied with bounded concurrency, retries
//!    and cancellation
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation and hashing
//! - [`resource`]: Resource declarations and output references
//! - [`planner`]: Graph construction, diffing and plan execution
//! - [`provider`]: Provider trait, registry and built-in providers
//! - [`state`]: State storage backends (local, memory) and locking
//! - [`deployment`]: End-to-end preview, apply and destroy runs
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: storage-stack
//!   environment: prod
//!
//! resources:
//!   - name: logs
//!     type: storage:bucket
//!     properties:
//!       acl: private
//!   - name: assets
//!     type: storage:bucket
//!     properties:
//!       acl: public-read
//!       tags:
//!         log_target: "${logs.id}"
//!
//! outputs:
//!   assets_bucket: "${assets.bucket}"
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod deployment;
pub mod error;
pub mod planner;
pub mod provider;
pub mod resource;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, DeployConfig};
pub use deployment::{Deployment, DeploymentContext};
pub use error::{CairnError, Result};
pub use planner::{ChangePlan, DiffEngine, PlanExecutor, ResourceGraph, RunSummary};
pub use provider::{Provider, ProviderRegistry};
pub use state::{DeploymentState, LocalStateStore, MemoryStateStore, StateStore};
