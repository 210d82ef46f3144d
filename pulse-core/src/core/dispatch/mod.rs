pub use batch::*;
pub use error::*;
pub use http::*;
pub use pool::*;
pub use queue::*;
pub use sender::*;

mod batch;
mod error;
mod http;
mod pool;
mod queue;
mod sender;
