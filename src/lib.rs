//! MPXY, the SBI message proxy.
//!
//! Supervisor software binds a per-hart shared memory window and exchanges messages with
//! firmware resident protocol backends through it. Backends register [`Channel`]s at boot,
//! the trap layer forwards MPXY ecalls to [`ecall::handle_ecall`].
#![cfg_attr(not(test), no_std)]

mod attrs;
pub mod channel;
pub mod debug;
pub mod domain;
pub mod ecall;
pub mod error;
mod message;
pub mod platform;
pub mod pmp;
pub mod proxy;
pub mod registry;
pub mod shmem;
pub mod state;

pub use channel::{
    AttrWords, AttributeReader, AttributeWriter, Capability, Channel, ChannelAttrs, EventSource, EventsStateSwitch,
    Exchange, MessageProtocol, MessageSender, StdAttr,
};
pub use common::sbi::{SbiError, SbiRet};
pub use domain::{DomainConfig, DomainId, MemoryRegion, RegionFlags};
pub use platform::{Access, Platform, PrivMode};
pub use proxy::Mpxy;
pub use state::{Caller, HartIndex};
