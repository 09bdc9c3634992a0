pub mod engine;
pub mod link;
pub mod pending;
pub mod timer;

pub use engine::*;
pub use link::*;
pub use pending::*;
pub use timer::*;
