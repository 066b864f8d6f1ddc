pub mod coordinator;
pub mod generator;

pub use coordinator::{ensure_renderable, render_failure_message, RenderCoordinator};
pub use generator::VideoGenerator;
