pub mod error;

pub use error::WatchError;
