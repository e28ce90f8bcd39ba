//! The execution-engine side of the runner: kernel launch specs, the stdio
//! wire protocol, and the client that drives a kernel process.

pub mod client;
pub mod messages;
pub mod registry;

pub use client::{ExecuteOutcome, KernelClient, KernelError};
pub use messages::{KernelMessage, KernelRequest, ReplyStatus, parse_message};
pub use registry::{KernelSpec, KernelSpecConfig, KernelsJsonConfig, resolve_kernel, resolve_registry_path};
