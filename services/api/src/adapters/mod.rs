pub mod content_llm;
pub mod db;
pub mod session_store;

pub use content_llm::OpenAiContentAdapter;
pub use db::DbAdapter;
pub use session_store::InMemorySessionStore;
