pub use backend::*;
pub use database::*;
pub use error::*;
pub use file::*;
pub use service::*;
pub use store::*;

mod backend;
mod database;
mod error;
mod file;
mod service;
mod store;
