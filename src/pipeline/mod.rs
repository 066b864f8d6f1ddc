pub mod images;
pub mod script;

pub use images::{run_image_pipeline, PipelineObserver, PipelineOutcome};
pub use script::{acquire_script, parse_script_payload};
