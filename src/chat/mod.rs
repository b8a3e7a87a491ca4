pub mod composer;
pub mod orchestrator;

pub use composer::AnswerComposer;
pub use orchestrator::{ChatAnswer, ChatOrchestrator};
