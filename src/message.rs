use common::sbi::SbiError;

use crate::{
    channel::Exchange,
    ensure,
    platform::Platform,
    proxy::Mpxy,
    shmem::ShmemMapping,
    state::Caller,
};

impl<P: Platform> Mpxy<'_, P> {
    /// Send the `msg_data_len` bytes at the start of the caller's shared memory.
    ///
    /// With `resp_data_len` the backend answers in place and the response length is
    /// stored there, without it the message is posted.
    pub fn send_message(
        &self,
        caller: Caller,
        channel_id: u32,
        msg_id: u32,
        msg_data_len: usize,
        resp_data_len: Option<&mut usize>,
    ) -> Result<(), SbiError> {
        let hart = self.bound_hart(caller)?;
        let channel = self.channel(channel_id)?;
        let sender = channel.protocol().message_sender().ok_or(SbiError::NotImplemented)?;

        let size = hart.binding.size();
        let max_len = channel.attrs().msg_data_maxlen as usize;
        ensure!(msg_data_len <= size && msg_data_len <= max_len, SbiError::InvalidParam)?;

        let result = {
            let mut mapping = ShmemMapping::new(&self.platform, &hart.binding);
            let window = mapping.bytes();
            let exchange = if resp_data_len.is_some() {
                Exchange::Request {
                    buffer: window,
                    message_len: msg_data_len,
                }
            } else {
                Exchange::Posted {
                    message: &window[..msg_data_len],
                }
            };
            sender.send_message(msg_id, exchange)
        };
        let resp_len = result?;

        if let Some(slot) = resp_data_len {
            if resp_len > size || resp_len > max_len {
                log::warn!("channel {:#x}: response of {} bytes rejected", channel_id, resp_len);
                return Err(SbiError::Failed);
            }
            *slot = resp_len;
        }
        Ok(())
    }

    /// Fetch the pending notification events of a channel into the caller's shared memory.
    pub fn get_notification_events(&self, caller: Caller, channel_id: u32, events_len: &mut usize) -> Result<(), SbiError> {
        let hart = self.bound_hart(caller)?;
        let channel = self.channel(channel_id)?;
        let source = channel.protocol().event_source().ok_or(SbiError::NotImplemented)?;

        let len = {
            let mut mapping = ShmemMapping::new(&self.platform, &hart.binding);
            source.get_notification_events(mapping.bytes())?
        };

        if len > hart.binding.size() {
            log::warn!("channel {:#x}: {} event bytes rejected", channel_id, len);
            return Err(SbiError::Failed);
        }
        *events_len = len;
        Ok(())
    }
}
