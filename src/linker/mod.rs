pub mod load;
pub mod check;
pub mod merge;
pub mod resolve;
pub mod emit;
pub mod linker;

pub use linker::{resolve_output_mode, Linker, OutputMode};
