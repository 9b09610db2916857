use bitflags::bitflags;
use common::mpxy::*;
use common::sbi::SbiError;
use spin::{Mutex, MutexGuard};
use static_assertions::{const_assert, const_assert_eq};

/// Number of standard attributes, ids `0..STD_ATTR_COUNT`.
pub const STD_ATTR_COUNT: usize = 11;

/// Size in bytes of one attribute in the shared memory.
pub const ATTR_SIZE: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum StdAttr {
    MsgProtoId = SBI_MPXY_ATTR_MSG_PROT_ID,
    MsgProtoVersion = SBI_MPXY_ATTR_MSG_PROT_VER,
    MsgDataMaxLen = SBI_MPXY_ATTR_MSG_MAX_LEN,
    MsgSendTimeout = SBI_MPXY_ATTR_MSG_SEND_TIMEOUT,
    Capability = SBI_MPXY_ATTR_CHANNEL_CAPABILITY,
    MsiControl = SBI_MPXY_ATTR_MSI_CONTROL,
    MsiAddrLo = SBI_MPXY_ATTR_MSI_ADDR_LO,
    MsiAddrHi = SBI_MPXY_ATTR_MSI_ADDR_HI,
    MsiData = SBI_MPXY_ATTR_MSI_DATA,
    SseEventId = SBI_MPXY_ATTR_SSE_EVENT_ID,
    EventsStateControl = SBI_MPXY_ATTR_EVENTS_STATE_CONTROL,
}

impl StdAttr {
    /// Every standard attribute, indexed by its id.
    pub const ALL: [StdAttr; STD_ATTR_COUNT] = [
        StdAttr::MsgProtoId,
        StdAttr::MsgProtoVersion,
        StdAttr::MsgDataMaxLen,
        StdAttr::MsgSendTimeout,
        StdAttr::Capability,
        StdAttr::MsiControl,
        StdAttr::MsiAddrLo,
        StdAttr::MsiAddrHi,
        StdAttr::MsiData,
        StdAttr::SseEventId,
        StdAttr::EventsStateControl,
    ];

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }
}

const fn ids_are_dense() -> bool {
    let mut i = 0;
    while i < STD_ATTR_COUNT {
        if StdAttr::ALL[i] as u32 != i as u32 {
            return false;
        }
        i += 1;
    }
    true
}

const_assert_eq!(STD_ATTR_COUNT, SBI_MPXY_ATTR_STD_ATTR_MAX_IDX as usize);
const_assert!(ids_are_dense());

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Capability: u32 {
        const MSI = SBI_MPXY_CAP_MSI;
        const SSE = SBI_MPXY_CAP_SSE;
        const EVENTS_STATE = SBI_MPXY_CAP_EVENTS_STATE;
    }
}

/// Standard attributes of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelAttrs {
    pub msg_proto_id: u32,
    pub msg_proto_version: u32,
    pub msg_data_maxlen: u32,
    pub msg_send_timeout: u32,
    pub capability: Capability,
    pub msi_control: u32,
    pub msi_addr_lo: u32,
    pub msi_addr_hi: u32,
    pub msi_data: u32,
    pub sse_event_id: u32,
    pub events_state_ctrl: u32,
}

impl ChannelAttrs {
    /// Attributes a backend chooses. Notification related ones are set at registration.
    pub const fn new(msg_proto_id: u32, msg_proto_version: u32, msg_data_maxlen: u32, msg_send_timeout: u32) -> Self {
        Self {
            msg_proto_id,
            msg_proto_version,
            msg_data_maxlen,
            msg_send_timeout,
            capability: Capability::empty(),
            msi_control: 0,
            msi_addr_lo: SBI_MPXY_MSI_ADDR_INVALID,
            msi_addr_hi: SBI_MPXY_MSI_ADDR_INVALID,
            msi_data: 0,
            sse_event_id: 0,
            events_state_ctrl: 0,
        }
    }

    pub fn get(&self, attr: StdAttr) -> u32 {
        match attr {
            StdAttr::MsgProtoId => self.msg_proto_id,
            StdAttr::MsgProtoVersion => self.msg_proto_version,
            StdAttr::MsgDataMaxLen => self.msg_data_maxlen,
            StdAttr::MsgSendTimeout => self.msg_send_timeout,
            StdAttr::Capability => self.capability.bits(),
            StdAttr::MsiControl => self.msi_control,
            StdAttr::MsiAddrLo => self.msi_addr_lo,
            StdAttr::MsiAddrHi => self.msi_addr_hi,
            StdAttr::MsiData => self.msi_data,
            StdAttr::SseEventId => self.sse_event_id,
            StdAttr::EventsStateControl => self.events_state_ctrl,
        }
    }

    pub(crate) fn set(&mut self, attr: StdAttr, value: u32) {
        let field = match attr {
            StdAttr::MsgProtoId => &mut self.msg_proto_id,
            StdAttr::MsgProtoVersion => &mut self.msg_proto_version,
            StdAttr::MsgDataMaxLen => &mut self.msg_data_maxlen,
            StdAttr::MsgSendTimeout => &mut self.msg_send_timeout,
            StdAttr::Capability => {
                self.capability = Capability::from_bits_retain(value);
                return;
            }
            StdAttr::MsiControl => &mut self.msi_control,
            StdAttr::MsiAddrLo => &mut self.msi_addr_lo,
            StdAttr::MsiAddrHi => &mut self.msi_addr_hi,
            StdAttr::MsiData => &mut self.msi_data,
            StdAttr::SseEventId => &mut self.sse_event_id,
            StdAttr::EventsStateControl => &mut self.events_state_ctrl,
        };
        *field = value;
    }

    pub fn msi_address_valid(&self) -> bool {
        self.msi_addr_lo != SBI_MPXY_MSI_ADDR_INVALID || self.msi_addr_hi != SBI_MPXY_MSI_ADDR_INVALID
    }
}

/// A run of little-endian 32-bit attribute words in the shared memory.
pub struct AttrWords<'w> {
    bytes: &'w mut [u8],
}

impl<'w> AttrWords<'w> {
    pub fn new(bytes: &'w mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / ATTR_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        let word = self.bytes.get(index * ATTR_SIZE..(index + 1) * ATTR_SIZE)?;
        Some(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    pub fn set(&mut self, index: usize, value: u32) -> Result<(), SbiError> {
        let word = self
            .bytes
            .get_mut(index * ATTR_SIZE..(index + 1) * ATTR_SIZE)
            .ok_or(SbiError::BadRange)?;
        word.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bytes
            .chunks_exact(ATTR_SIZE)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
    }
}

/// A message handed to a backend.
pub enum Exchange<'w> {
    /// No response is expected.
    Posted { message: &'w [u8] },
    /// The message occupies the first `message_len` bytes of `buffer`, the response
    /// is written back into `buffer`.
    Request { buffer: &'w mut [u8], message_len: usize },
}

impl Exchange<'_> {
    pub fn message(&self) -> &[u8] {
        match self {
            Exchange::Posted { message } => *message,
            Exchange::Request { buffer, message_len } => &buffer[..*message_len],
        }
    }

    pub fn response_buffer(&mut self) -> Option<&mut [u8]> {
        match self {
            Exchange::Posted { .. } => None,
            Exchange::Request { buffer, .. } => Some(&mut **buffer),
        }
    }
}

pub trait AttributeReader {
    /// Fill `out` with attributes `base_attr_id..base_attr_id + attr_count`.
    fn read_attributes(&self, out: AttrWords<'_>, base_attr_id: u32, attr_count: u32) -> Result<(), SbiError>;
}

pub trait AttributeWriter {
    fn write_attributes(&self, input: AttrWords<'_>, base_attr_id: u32, attr_count: u32) -> Result<(), SbiError>;
}

pub trait MessageSender {
    /// Returns the response length, which is ignored for posted messages.
    fn send_message(&self, msg_id: u32, exchange: Exchange<'_>) -> Result<usize, SbiError>;
}

pub trait EventSource {
    /// Write pending events into `events` and return their length in bytes.
    fn get_notification_events(&self, events: &mut [u8]) -> Result<usize, SbiError>;
}

pub trait EventsStateSwitch {
    fn switch_events_state(&self, enable: bool);
}

/// A message protocol backend. Every capability is optional.
pub trait MessageProtocol: Sync {
    fn attribute_reader(&self) -> Option<&dyn AttributeReader> {
        None
    }

    fn attribute_writer(&self) -> Option<&dyn AttributeWriter> {
        None
    }

    fn message_sender(&self) -> Option<&dyn MessageSender> {
        None
    }

    fn event_source(&self) -> Option<&dyn EventSource> {
        None
    }

    fn events_state_switch(&self) -> Option<&dyn EventsStateSwitch> {
        None
    }
}

pub struct Channel<'a> {
    id: u32,
    attrs: Mutex<ChannelAttrs>,
    protocol: &'a dyn MessageProtocol,
}

impl<'a> Channel<'a> {
    pub fn new(id: u32, attrs: ChannelAttrs, protocol: &'a dyn MessageProtocol) -> Self {
        Self {
            id,
            attrs: Mutex::new(attrs),
            protocol,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Snapshot of the standard attributes.
    pub fn attrs(&self) -> ChannelAttrs {
        *self.attrs.lock()
    }

    pub(crate) fn lock_attrs(&self) -> MutexGuard<'_, ChannelAttrs> {
        self.attrs.lock()
    }

    pub(crate) fn attrs_mut(&mut self) -> &mut ChannelAttrs {
        self.attrs.get_mut()
    }

    pub fn protocol(&self) -> &'a dyn MessageProtocol {
        self.protocol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_attribute_maps_to_its_own_field() {
        let mut attrs = ChannelAttrs::new(0, 0, 0, 0);
        for attr in StdAttr::ALL {
            attrs.set(attr, 0x100 + attr as u32);
        }
        for attr in StdAttr::ALL {
            assert_eq!(attrs.get(attr), 0x100 + attr as u32);
        }
        assert_eq!(attrs.msg_data_maxlen, 0x102);
        assert_eq!(attrs.events_state_ctrl, 0x10a);
    }

    #[test]
    fn ids_resolve_only_in_the_standard_space() {
        assert_eq!(StdAttr::from_id(0), Some(StdAttr::MsgProtoId));
        assert_eq!(StdAttr::from_id(0xa), Some(StdAttr::EventsStateControl));
        assert_eq!(StdAttr::from_id(0xb), None);
        assert_eq!(StdAttr::from_id(SBI_MPXY_ATTR_MSGPROTO_ATTR_START), None);
    }

    #[test]
    fn new_channels_have_no_msi_address() {
        let mut attrs = ChannelAttrs::new(1, msgproto_version(1, 0), 64, 10);
        assert!(!attrs.msi_address_valid());
        attrs.msi_addr_lo = 0x2800_0000;
        assert!(attrs.msi_address_valid());
    }

    #[test]
    fn words_are_little_endian() {
        let mut bytes = [0u8; 8];
        let mut words = AttrWords::new(&mut bytes);
        assert_eq!(words.len(), 2);
        words.set(1, 0x0403_0201).unwrap();
        assert_eq!(words.set(2, 0), Err(SbiError::BadRange));
        assert_eq!(words.get(1), Some(0x0403_0201));
        assert_eq!(words.get(2), None);
        assert_eq!(words.iter().collect::<Vec<_>>(), [0, 0x0403_0201]);
        assert_eq!(bytes[4..], [1, 2, 3, 4]);
    }

    #[test]
    fn exchange_exposes_the_message() {
        let mut buffer = *b"hello world";
        let mut request = Exchange::Request {
            buffer: &mut buffer,
            message_len: 5,
        };
        assert_eq!(request.message(), b"hello");
        assert_eq!(request.response_buffer().map(|b| b.len()), Some(11));

        let mut posted = Exchange::Posted { message: b"ping" };
        assert_eq!(posted.message(), b"ping");
        assert!(posted.response_buffer().is_none());
    }
}
