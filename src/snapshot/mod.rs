pub mod backend;
pub mod types;
pub mod utils;

pub use backend::MockFramebuffer;
pub use types::Snapshot;
pub use utils::{generate_filename, generate_timestamp, write_manifest};
