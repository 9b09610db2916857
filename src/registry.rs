use common::mpxy::SBI_MPXY_MSI_ADDR_INVALID;
use common::sbi::SbiError;
use heapless::Vec;

use crate::{
    channel::{Capability, Channel},
    ensure_not,
    platform::Platform,
    proxy::Mpxy,
    state::Caller,
};

pub const MAX_CHANNELS: usize = 32;

/// Channels in registration order. Filled during boot, read-only afterwards.
pub struct ChannelRegistry<'a> {
    channels: Vec<Channel<'a>, MAX_CHANNELS>,
}

impl<'a> ChannelRegistry<'a> {
    pub const fn new() -> Self {
        Self { channels: Vec::new() }
    }

    pub fn find(&self, channel_id: u32) -> Option<&Channel<'a>> {
        self.channels.iter().find(|c| c.id() == channel_id)
    }

    pub fn any_registered(&self) -> bool {
        !self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.channels.iter().map(|c| c.id())
    }

    fn insert(&mut self, channel: Channel<'a>) -> Result<(), SbiError> {
        ensure_not!(self.find(channel.id()).is_some(), SbiError::AlreadyAvailable)?;
        self.channels.push(channel).map_err(|_| SbiError::Failed)
    }
}

impl<'a> Default for ChannelRegistry<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, P: Platform> Mpxy<'a, P> {
    /// Register a channel on behalf of `boot`, whose hart decides the notification method.
    pub fn register_channel(&mut self, boot: Caller, mut channel: Channel<'a>) -> Result<(), SbiError> {
        let (msi, sse) = {
            let state = self
                .harts
                .proxy_state_for(boot.hart, boot.domain)
                .ok_or(SbiError::Failed)?
                .lock();
            (state.msi_available, state.sse_available)
        };

        let has_switch = channel.protocol().events_state_switch().is_some();
        let attrs = channel.attrs_mut();
        attrs.msi_control = 0;
        attrs.msi_data = 0;
        attrs.msi_addr_lo = SBI_MPXY_MSI_ADDR_INVALID;
        attrs.msi_addr_hi = SBI_MPXY_MSI_ADDR_INVALID;
        attrs.events_state_ctrl = 0;
        attrs.capability = Capability::empty();
        // MSI wins when both are available
        if msi {
            attrs.capability |= Capability::MSI;
        } else if sse {
            attrs.capability |= Capability::SSE;
        }
        if has_switch {
            attrs.capability |= Capability::EVENTS_STATE;
        }

        let capability = attrs.capability;
        let id = channel.id();
        self.registry.insert(channel)?;
        log::info!("channel {:#x} registered, capability {:?}", id, capability);
        Ok(())
    }

    pub fn channel_available(&self) -> bool {
        self.registry.any_registered()
    }
}
