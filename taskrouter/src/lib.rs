//! Task routing and workflow orchestration.
//!
//! Two coordination modes share one crate:
//!
//! - **Open loop** ([`route`]): a routing line names a worker; the router
//!   guards the instruction, invokes the worker, and optionally keeps asking a
//!   continuation oracle for the next line until it answers `DONE` or a step
//!   cap is reached.
//! - **Closed loop** ([`plan`]): a full plan is declared up front and workers
//!   report completions against it; the tracker hands back the next step.
//!
//! As elsewhere, logic is split by side effects:
//!
//! - **[`core`]**: Pure, deterministic logic (task grammar, roster, guard
//!   protocol, plan tracking). No I/O.
//! - **[`io`]**: Config files, the audit journal, and collaborator processes.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plan;
pub mod route;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
