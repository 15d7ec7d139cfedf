mod load;
mod types;

pub use load::{apply_env_overrides, load, load_default};
pub use types::*;
