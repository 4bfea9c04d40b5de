//! Message channel client: the transcript state machine, the rendering
//! sanitizer, the channel lifecycle manager, and the session controller
//! that ties them together.

pub mod channel;
pub mod controller;
pub mod render;
pub mod transcript;

pub use channel::{ChannelEvent, ChannelState, ReconnectPolicy};
pub use controller::{SessionController, SessionError};
pub use transcript::{ChatState, Role, TranscriptEntry};
