pub use error::*;
pub use properties::*;

mod error;
mod properties;
