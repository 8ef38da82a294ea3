//! Bridge: caches, command correlation, outbound shaping, orchestration.

pub mod cache;
pub mod channels;
pub mod correlator;
pub mod orchestrator;
pub mod outbound;

pub use cache::BoundedCache;
pub use channels::{BridgeSideChannels, ChannelBundle, ControlChannels, SessionChannels};
pub use correlator::{CommandCorrelator, CommandHandle, CommandSpec, RegisteredCommand};
pub use orchestrator::{Bridge, BridgeCommander};
pub use outbound::{split_chat_text, AntiSpamShaper, OutboundPump, OutboundQueue, OutboundSettings};
