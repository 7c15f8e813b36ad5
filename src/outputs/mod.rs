//! Output generation.
//!
//! # Submodules
//!
//! - [`atom`]: Writes refined feeds as Atom documents and reads them back on
//!   the next run

pub mod atom;
