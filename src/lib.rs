pub mod cli;
pub mod config;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod media;
pub mod message;
pub mod registry;
pub mod retry;
pub mod router;
pub mod rules;
pub mod secret;
pub mod sensitive;
pub mod store;
pub mod supervisor;

pub use driver::{Driver, SendFn};
pub use message::{Attachment, AttachmentType, ChannelAddress, ChannelValue, NormalizedMessage};
pub use router::Router;
