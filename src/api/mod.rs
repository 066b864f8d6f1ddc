pub mod qwen;

pub use qwen::QwenClient;
