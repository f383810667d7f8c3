pub mod llm;
pub mod narration;
pub mod script;
pub mod setup;
pub mod tts;
pub mod video;
pub mod visual;
pub mod workflow;
