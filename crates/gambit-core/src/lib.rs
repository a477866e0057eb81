pub mod context;
pub mod errors;
pub mod ids;
pub mod model;
pub mod protocol;

pub use context::{ChannelScope, SessionContext};
pub use errors::SyncError;
pub use protocol::PushMessage;
