pub mod error;
mod store;

pub use error::{Result, StoreError};
pub use store::StateStore;
