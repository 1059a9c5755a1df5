pub mod core;
pub mod models;
pub mod prompt;
pub mod stream;

pub use self::core::{Chat, ChatBuilder, ChatError};
pub use self::models::{Message, Role, Transcript};
pub use self::prompt::{ContextStyle, build_prompt};
pub use self::stream::{StreamAggregator, StreamError, StreamState};
