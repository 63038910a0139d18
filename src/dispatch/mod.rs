//! Command dispatch module.
//!
//! The bridge core only gates messages; the commands they carry belong to
//! an external collaborator. This module defines the seam: a handler trait,
//! a registry the server routes authenticated commands through, and a
//! built-in liveness command so the authenticated path works out of the box.

mod handler;
mod registry;

pub use handler::{CommandHandler, DispatchContext};
pub use registry::DispatchRegistry;
