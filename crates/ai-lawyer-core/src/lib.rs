//! Core abstractions for the AI lawyer chat session.
//!
//! This crate provides the fundamental building blocks:
//! - `Message` / `Source` - Conversation data model
//! - `Session` - Message log plus transient status
//! - `SessionStore` - Observable session state (snapshot + broadcast)
//! - `snapshot` - JSON snapshot codec and import validation
//! - Persistence traits and `ChatConfig`

pub mod config;
pub mod message;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod traits;

pub use config::ChatConfig;
pub use message::{AttachmentInfo, GREETING_ID, Message, MessageIdGen, Role, Source};
pub use session::{Session, SessionStatus};
pub use store::{SessionEvent, SessionStore};
pub use traits::{FileExchange, KeyValueStore, StorageError};
