use common::sbi::SbiError;

use crate::{
    channel::{AttrWords, Channel, ATTR_SIZE},
    domain::DomainConfig,
    ensure,
    platform::Platform,
    registry::ChannelRegistry,
    shmem::{ShmemBinding, ShmemMapping},
    state::{Caller, HartTable},
};

/// The message proxy: channels, per-hart state and the platform services they rely on.
pub struct Mpxy<'a, P: Platform> {
    pub(crate) platform: P,
    pub(crate) harts: HartTable,
    pub(crate) registry: ChannelRegistry<'a>,
}

/// What an entry point needs to know about a hart with shared memory.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BoundHart {
    pub binding: ShmemBinding,
    pub msi_available: bool,
}

impl<'a, P: Platform> Mpxy<'a, P> {
    /// Allocate proxy state for every possible hart of every domain.
    pub fn new(platform: P, domains: &[DomainConfig]) -> anyhow::Result<Self> {
        let harts = HartTable::new(domains)?;
        log::info!("proxy state allocated for {} domains", domains.len());
        Ok(Self {
            platform,
            harts,
            registry: ChannelRegistry::new(),
        })
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn harts(&self) -> &HartTable {
        &self.harts
    }

    pub fn registry(&self) -> &ChannelRegistry<'a> {
        &self.registry
    }

    pub(crate) fn bound_hart(&self, caller: Caller) -> Result<BoundHart, SbiError> {
        let state = self
            .harts
            .proxy_state_for(caller.hart, caller.domain)
            .ok_or(SbiError::Failed)?
            .lock();
        let binding = state.binding().ok_or(SbiError::NoShmem)?;
        Ok(BoundHart {
            binding,
            msi_available: state.msi_available,
        })
    }

    pub(crate) fn channel(&self, channel_id: u32) -> Result<&Channel<'a>, SbiError> {
        self.registry.find(channel_id).ok_or(SbiError::NotSupported)
    }

    /// Write a page of channel ids, starting at `start_index`, to the caller's shared memory.
    ///
    /// Layout: remaining ids after this page, ids returned, then the ids themselves.
    pub fn get_channel_ids(&self, caller: Caller, start_index: u32) -> Result<(), SbiError> {
        let hart = self.bound_hart(caller)?;
        let total = self.registry.len();
        let start = start_index as usize;
        ensure!(start <= total, SbiError::InvalidParam)?;

        let capacity = (hart.binding.size() / ATTR_SIZE).saturating_sub(2);
        let returned = (total - start).min(capacity);
        let remaining = total - start - returned;

        let mut mapping = ShmemMapping::new(&self.platform, &hart.binding);
        let mut words = AttrWords::new(mapping.bytes());
        words.set(0, remaining as u32)?;
        words.set(1, returned as u32)?;
        for (slot, id) in self.registry.channel_ids().skip(start).take(returned).enumerate() {
            words.set(2 + slot, id)?;
        }
        Ok(())
    }
}
