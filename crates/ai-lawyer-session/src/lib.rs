//! Chat session orchestration for the AI lawyer.
//!
//! Provides:
//! - `SessionController` - Turn submission, streaming, new chat, export/import
//! - `StreamReducer` - Folds streamed chunks into text plus deduplicated sources
//! - Prompt construction for URL-grounded turns
//! - Storage implementations (memory, directory)

pub mod controller;
pub mod prompt;
pub mod reducer;
pub mod storage;

pub use controller::{ControllerError, ImportOutcome, SessionController, SubmitOutcome, TurnRequest};
pub use prompt::{GroundingUrls, UrlError};
pub use reducer::StreamReducer;
