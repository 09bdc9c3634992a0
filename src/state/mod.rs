pub mod report;
pub mod sample;

pub use report::*;
pub use sample::*;
