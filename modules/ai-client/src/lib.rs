mod client;
pub(crate) mod types;
pub mod util;

pub use client::OpenAi;
pub use util::{extract_json_array, strip_code_blocks, strip_trailing_commas, truncate_to_char_boundary};
