mod base;
mod deletion;

pub use base::*;
pub use deletion::*;
