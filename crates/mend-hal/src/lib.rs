//! mend hardware abstraction layer.
//!
//! Runs external commands and scopes mounts. Nothing above this crate spawns processes
//! directly.

pub mod device;
pub mod error;
pub mod hal;
pub mod path;
pub mod procfs;

pub use device::DeviceId;
pub use error::{HalError, HalResult};
pub use hal::*;
