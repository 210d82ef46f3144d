pub use cycle::*;
pub use error::*;
pub use facade::*;
pub use source::*;

mod cycle;
mod error;
mod facade;
mod source;
