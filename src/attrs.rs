//! Bulk access to channel attributes through the shared memory.

use common::mpxy::{SBI_MPXY_ATTR_MSGPROTO_ATTR_END, SBI_MPXY_ATTR_MSGPROTO_ATTR_START};
use common::sbi::SbiError;

use crate::{
    channel::{AttrWords, Capability, Channel, ChannelAttrs, StdAttr, ATTR_SIZE, STD_ATTR_COUNT},
    ensure,
    platform::Platform,
    proxy::{BoundHart, Mpxy},
    shmem::ShmemMapping,
    state::Caller,
};

fn is_std_attr(attr_id: u32) -> bool {
    attr_id < SBI_MPXY_ATTR_MSGPROTO_ATTR_START
}

/// A validated run of attribute ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct AttrRange {
    base: u32,
    count: u32,
    /// Inclusive last id, `None` when it does not fit in 32 bits.
    end: Option<u32>,
}

impl AttrRange {
    fn new(base: u32, count: u32, shmem_size: usize) -> Result<Self, SbiError> {
        ensure!(
            count != 0 && count as usize <= shmem_size / ATTR_SIZE,
            SbiError::InvalidParam
        )?;
        // ids between the standard and the protocol spaces are reserved
        ensure!(
            !is_std_attr(base) || (base as usize) < STD_ATTR_COUNT,
            SbiError::InvalidParam
        )?;
        Ok(Self {
            base,
            count,
            end: base.checked_add(count - 1),
        })
    }

    fn byte_len(&self) -> usize {
        self.count as usize * ATTR_SIZE
    }

    /// The standard attributes covered by the range.
    fn std_attrs(&self) -> Result<&'static [StdAttr], SbiError> {
        let all: &'static [StdAttr; STD_ATTR_COUNT] = &StdAttr::ALL;
        match self.end {
            Some(end) if (end as usize) < STD_ATTR_COUNT => Ok(&all[self.base as usize..=end as usize]),
            _ => Err(SbiError::BadRange),
        }
    }

    fn check_protocol_end(&self) -> Result<(), SbiError> {
        ensure!(
            self.end.is_some_and(|end| end < SBI_MPXY_ATTR_MSGPROTO_ATTR_END),
            SbiError::BadRange
        )
    }
}

fn check_std_write(attrs: &ChannelAttrs, attr: StdAttr, value: u32) -> Result<(), SbiError> {
    match attr {
        StdAttr::MsiControl => match value {
            0 => Ok(()),
            1 => ensure!(attrs.msi_address_valid(), SbiError::Denied),
            _ => Err(SbiError::InvalidParam),
        },
        StdAttr::MsiAddrLo | StdAttr::MsiAddrHi | StdAttr::MsiData => Ok(()),
        StdAttr::EventsStateControl => ensure!(value <= 1, SbiError::InvalidParam),
        _ => Err(SbiError::BadRange),
    }
}

fn apply_std_write(channel: &Channel, attrs: &mut ChannelAttrs, hart: &BoundHart, attr: StdAttr, value: u32) {
    match attr {
        StdAttr::MsiControl | StdAttr::MsiAddrLo | StdAttr::MsiAddrHi | StdAttr::MsiData => {
            if hart.msi_available {
                attrs.set(attr, value);
            }
        }
        StdAttr::EventsStateControl => {
            if attrs.capability.contains(Capability::EVENTS_STATE) {
                attrs.set(attr, value);
                if let Some(switch) = channel.protocol().events_state_switch() {
                    switch.switch_events_state(value == 1);
                }
            }
        }
        // rejected by check_std_write
        _ => {}
    }
}

impl<P: Platform> Mpxy<'_, P> {
    /// Copy `attr_count` attributes starting at `base_attr_id` into the caller's shared memory.
    pub fn read_attrs(&self, caller: Caller, channel_id: u32, base_attr_id: u32, attr_count: u32) -> Result<(), SbiError> {
        let hart = self.bound_hart(caller)?;
        let channel = self.channel(channel_id)?;
        let range = AttrRange::new(base_attr_id, attr_count, hart.binding.size())?;

        let mut mapping = ShmemMapping::new(&self.platform, &hart.binding);
        let mut words = AttrWords::new(&mut mapping.bytes()[..range.byte_len()]);

        if is_std_attr(range.base) {
            let ids = range.std_attrs()?;
            let attrs = channel.lock_attrs();
            for (slot, attr) in ids.iter().enumerate() {
                words.set(slot, attrs.get(*attr))?;
            }
            Ok(())
        } else {
            let reader = channel.protocol().attribute_reader().ok_or(SbiError::BadRange)?;
            range.check_protocol_end()?;
            reader.read_attributes(words, range.base, range.count)
        }
    }

    /// Update `attr_count` attributes starting at `base_attr_id` from the caller's shared memory.
    ///
    /// Standard attributes are all validated before any of them is written, a rejected range
    /// leaves the channel untouched.
    pub fn write_attrs(&self, caller: Caller, channel_id: u32, base_attr_id: u32, attr_count: u32) -> Result<(), SbiError> {
        let hart = self.bound_hart(caller)?;
        let channel = self.channel(channel_id)?;
        let range = AttrRange::new(base_attr_id, attr_count, hart.binding.size())?;

        let mut mapping = ShmemMapping::new(&self.platform, &hart.binding);

        if is_std_attr(range.base) {
            let ids = range.std_attrs()?;
            // validate and apply the same values, whatever the window holds meanwhile
            let mut snapshot = [0u32; STD_ATTR_COUNT];
            let values = &mut snapshot[..ids.len()];
            mapping.read_words(values);
            drop(mapping);

            let mut attrs = channel.lock_attrs();
            for (attr, value) in ids.iter().zip(values.iter()) {
                check_std_write(&attrs, *attr, *value)?;
            }
            for (attr, value) in ids.iter().zip(values.iter()) {
                apply_std_write(channel, &mut attrs, &hart, *attr, *value);
            }
            Ok(())
        } else {
            let writer = channel.protocol().attribute_writer().ok_or(SbiError::BadRange)?;
            range.check_protocol_end()?;
            let words = AttrWords::new(&mut mapping.bytes()[..range.byte_len()]);
            writer.write_attributes(words, range.base, range.count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_must_fit_the_window() {
        assert_eq!(AttrRange::new(0, 0, 4096), Err(SbiError::InvalidParam));
        assert_eq!(AttrRange::new(0, 1025, 4096), Err(SbiError::InvalidParam));
        assert!(AttrRange::new(0, 1024, 4096).is_ok());
    }

    #[test]
    fn reserved_ids_are_invalid() {
        assert_eq!(AttrRange::new(0xb, 1, 4096), Err(SbiError::InvalidParam));
        assert_eq!(AttrRange::new(0x7fff_ffff, 1, 4096), Err(SbiError::InvalidParam));
        assert!(AttrRange::new(0xa, 1, 4096).is_ok());
        assert!(AttrRange::new(0x8000_0000, 1, 4096).is_ok());
    }

    #[test]
    fn standard_range_must_end_inside_the_standard_space() {
        assert_eq!(AttrRange::new(0, 11, 4096).unwrap().std_attrs().unwrap().len(), 11);
        assert_eq!(AttrRange::new(4, 8, 4096).unwrap().std_attrs(), Err(SbiError::BadRange));
        let ids = AttrRange::new(5, 4, 4096).unwrap().std_attrs().unwrap();
        assert_eq!(ids, [StdAttr::MsiControl, StdAttr::MsiAddrLo, StdAttr::MsiAddrHi, StdAttr::MsiData]);
    }

    #[test]
    fn protocol_range_must_stop_before_the_last_id() {
        let overflowing = AttrRange::new(0xffff_fff0, 0x20, 4096).unwrap();
        assert_eq!(overflowing.end, None);
        assert_eq!(overflowing.check_protocol_end(), Err(SbiError::BadRange));
        let last = AttrRange::new(0xffff_fffe, 2, 4096).unwrap();
        assert_eq!(last.check_protocol_end(), Err(SbiError::BadRange));
        assert!(AttrRange::new(0xffff_fffd, 2, 4096).unwrap().check_protocol_end().is_ok());
    }

    #[test]
    fn write_rules() {
        let mut attrs = ChannelAttrs::new(1, 1, 64, 0);
        assert_eq!(check_std_write(&attrs, StdAttr::MsgProtoId, 1), Err(SbiError::BadRange));
        assert_eq!(check_std_write(&attrs, StdAttr::Capability, 0), Err(SbiError::BadRange));
        assert_eq!(check_std_write(&attrs, StdAttr::SseEventId, 0), Err(SbiError::BadRange));
        assert_eq!(check_std_write(&attrs, StdAttr::MsiControl, 2), Err(SbiError::InvalidParam));
        assert_eq!(check_std_write(&attrs, StdAttr::MsiControl, 1), Err(SbiError::Denied));
        assert_eq!(check_std_write(&attrs, StdAttr::EventsStateControl, 2), Err(SbiError::InvalidParam));
        assert!(check_std_write(&attrs, StdAttr::MsiData, u32::MAX).is_ok());
        attrs.msi_addr_hi = 0;
        assert!(check_std_write(&attrs, StdAttr::MsiControl, 1).is_ok());
    }
}
