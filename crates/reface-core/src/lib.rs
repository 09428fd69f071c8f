//! reface-core — Staging and invocation plumbing for the face-swap service.
//!
//! Resolves file-sharing links to direct downloads, stages inputs into
//! per-request workspaces, provisions the external tool's environment at
//! startup, and exposes the narrow [`FaceSwapTool`] seam the daemon drives.

pub mod links;
pub mod provision;
pub mod runner;
pub mod staging;
pub mod types;

pub use runner::{CommandSwapTool, FaceSwapTool};
#[cfg(feature = "mock")]
pub use runner::MockSwapTool;
pub use types::{RequestWorkspace, SwapJob, SwapOutcome};
