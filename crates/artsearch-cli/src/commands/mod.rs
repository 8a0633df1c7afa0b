pub mod config;
pub mod generate;
pub mod index;
pub mod pipeline;
pub mod query;

pub use generate::run_generate;
pub use index::{run_deploy_index, run_update_index};
pub use pipeline::run_pipeline;
pub use query::run_query;
