pub mod config;
pub mod error;
pub mod io;
pub mod memory;
pub mod pod;
pub mod state;
