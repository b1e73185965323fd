pub mod enums;
pub mod extraction;
pub mod provider;

pub use enums::*;
pub use extraction::*;
pub use provider::*;
