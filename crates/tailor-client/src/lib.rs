pub mod browser;
pub mod llm;
pub mod store;

pub use browser::{ChromeDriver, ChromeLauncher};
pub use llm::OpenAiGenerator;
pub use store::FsArtifactStore;
