//! gs-inspector - Kernel-side variable inspection for GraphScope notebooks.
//!
//! This crate keeps a notebook UI in sync with the GraphScope sessions
//! and graphs living inside a Jupyter kernel. Each notebook gets an
//! inspection handler that seeds the kernel with introspection helpers,
//! re-queries after every user execution, and survives kernel restarts;
//! a process-wide manager routes the active handler's updates to the
//! registered panels.
//!
//! The kernel transport is pluggable: the `gs-inspect` binary connects
//! over ZeroMQ via `runtimelib`, tests drive the same machinery with a
//! scripted in-process session.

pub mod connector;
pub mod handler;
pub mod manager;
pub mod panels;
pub mod scripts;
pub mod session;
pub mod shell;
pub mod state;
pub mod variable;

// Re-export commonly used items
pub use connector::{KernelConnector, KernelSession};
pub use handler::{HandlerOptions, VariableInspectionHandler};
pub use manager::VariableManager;
pub use panels::{GraphOpPanel, SidebarPanel};
pub use session::ZmqKernelSession;
