pub mod alert;
pub mod arbiter;
pub mod extract;
pub mod fetch;
pub mod oracle;
pub mod pipeline;
pub mod traits;

pub use pipeline::Pipeline;
