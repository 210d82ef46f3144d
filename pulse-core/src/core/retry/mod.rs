pub use classifier::*;
pub use policy::*;
pub use strategy::*;

mod classifier;
mod policy;
mod strategy;
