//! Application services for the VM lifecycle.
//!
//! Each module imports only from `crate::domain` and
//! `crate::application::ports`.

pub mod batch;
pub mod machine;


pub use batch::with_virtual_machines;
pub use machine::VirtualMachine;
