pub mod distribution;
pub mod sequence;
pub use sequence::*;
