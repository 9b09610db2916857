#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;

use mpxy::*;

pub const MEM_BASE: u64 = 0x8000_0000;
pub const MEM_SIZE: usize = 0x10000;
pub const PAGE: usize = 4096;

/// Host stand-in for supervisor physical memory and the firmware services around it.
pub struct TestPlatform {
    memory: Box<[AtomicU8]>,
    pub maps: AtomicUsize,
    pub unmaps: AtomicUsize,
    pub deny_all: AtomicBool,
    /// Domains allowed to touch the memory, one bit each.
    pub domains: u64,
}

impl TestPlatform {
    pub fn new() -> Self {
        Self {
            memory: (0..MEM_SIZE).map(|_| AtomicU8::new(0)).collect(),
            maps: AtomicUsize::new(0),
            unmaps: AtomicUsize::new(0),
            deny_all: AtomicBool::new(false),
            domains: 0b11,
        }
    }

    fn offset(addr: u64) -> usize {
        (addr - MEM_BASE) as usize
    }

    pub fn read(&self, addr: u64, len: usize) -> Vec<u8> {
        let offset = Self::offset(addr);
        self.memory[offset..offset + len]
            .iter()
            .map(|b| b.load(Ordering::SeqCst))
            .collect()
    }

    pub fn write(&self, addr: u64, bytes: &[u8]) {
        let offset = Self::offset(addr);
        for (cell, b) in self.memory[offset..].iter().zip(bytes) {
            cell.store(*b, Ordering::SeqCst);
        }
    }

    pub fn read_u32(&self, addr: u64, index: usize) -> u32 {
        let bytes = self.read(addr + 4 * index as u64, 4);
        u32::from_le_bytes(bytes.try_into().unwrap())
    }

    pub fn write_u32s(&self, addr: u64, words: &[u32]) {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.write(addr, &bytes);
    }

    pub fn read_usize(&self, addr: u64, index: usize) -> usize {
        let size = std::mem::size_of::<usize>();
        let bytes = self.read(addr + (size * index) as u64, size);
        usize::from_le_bytes(bytes.try_into().unwrap())
    }

    pub fn balanced(&self) -> bool {
        self.maps.load(Ordering::SeqCst) == self.unmaps.load(Ordering::SeqCst)
    }

    pub fn map_count(&self) -> usize {
        self.maps.load(Ordering::SeqCst)
    }
}

unsafe impl Platform for TestPlatform {
    fn check_addr_range(&self, domain: DomainId, addr: u64, size: u64, mode: PrivMode, access: Access) -> bool {
        assert_eq!(mode, PrivMode::Supervisor);
        assert_eq!(access, Access::READ | Access::WRITE);
        !self.deny_all.load(Ordering::SeqCst)
            && self.domains & (1 << domain) != 0
            && addr >= MEM_BASE
            && addr + size <= MEM_BASE + MEM_SIZE as u64
    }

    fn map_supervisor_address(&self, addr: u64, size: usize) -> *mut u8 {
        assert!(addr >= MEM_BASE && Self::offset(addr) + size <= MEM_SIZE);
        self.maps.fetch_add(1, Ordering::SeqCst);
        self.memory[Self::offset(addr)..].as_ptr() as *mut u8
    }

    fn unmap_supervisor_address(&self) {
        self.unmaps.fetch_add(1, Ordering::SeqCst);
    }
}

/// Domain 0 runs harts 0 and 1 with MSI, domain 1 runs hart 2 with SSE only.
pub fn domains() -> Vec<DomainConfig> {
    let mut d0 = DomainConfig::new(0);
    d0.add_hart(0).unwrap();
    d0.add_hart(1).unwrap();
    d0.msi_available = true;
    let mut d1 = DomainConfig::new(1);
    d1.add_hart(2).unwrap();
    d1.sse_available = true;
    vec![d0, d1]
}

pub const HART0: Caller = Caller::new(0, 0);
pub const HART1: Caller = Caller::new(0, 1);
pub const SSE_HART: Caller = Caller::new(1, 2);

/// Window used by `hart` in the tests, one per hart.
pub fn window_of(caller: Caller) -> u64 {
    MEM_BASE + (caller.hart as u64) * 0x4000
}

pub fn bind(mpxy: &Mpxy<'_, TestPlatform>, caller: Caller, size: usize) {
    mpxy.set_shmem(caller, size, window_of(caller) as usize, 0, 0).unwrap();
}

/// Backend with call counters. Capabilities are chosen at construction.
#[derive(Default)]
pub struct MockProtocol {
    pub attrs: bool,
    pub sender: bool,
    pub events: bool,
    pub switch: bool,

    pub sends: AtomicUsize,
    pub last_msg_id: AtomicU32,
    pub last_message: Mutex<Vec<u8>>,
    pub last_posted: AtomicBool,
    pub response: Mutex<Vec<u8>>,
    /// Overrides the reported response length.
    pub response_len: Mutex<Option<usize>>,
    pub send_error: Mutex<Option<SbiError>>,

    pub pending_events: Mutex<Vec<u8>>,
    pub events_len: Mutex<Option<usize>>,

    pub switched: Mutex<Vec<bool>>,

    /// Protocol attribute store, indexed from 0x8000_0000.
    pub proto_attrs: Mutex<Vec<u32>>,
    pub attr_calls: Mutex<Vec<(u32, u32)>>,
}

impl MockProtocol {
    pub fn sender() -> Self {
        Self {
            sender: true,
            ..Default::default()
        }
    }

    pub fn full() -> Self {
        Self {
            attrs: true,
            sender: true,
            events: true,
            switch: true,
            proto_attrs: Mutex::new((0..16).map(|i| 0xa000 + i).collect()),
            ..Default::default()
        }
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

impl MessageProtocol for MockProtocol {
    fn attribute_reader(&self) -> Option<&dyn AttributeReader> {
        if self.attrs {
            Some(self as &dyn AttributeReader)
        } else {
            None
        }
    }

    fn attribute_writer(&self) -> Option<&dyn AttributeWriter> {
        if self.attrs {
            Some(self as &dyn AttributeWriter)
        } else {
            None
        }
    }

    fn message_sender(&self) -> Option<&dyn MessageSender> {
        if self.sender {
            Some(self as &dyn MessageSender)
        } else {
            None
        }
    }

    fn event_source(&self) -> Option<&dyn EventSource> {
        if self.events {
            Some(self as &dyn EventSource)
        } else {
            None
        }
    }

    fn events_state_switch(&self) -> Option<&dyn EventsStateSwitch> {
        if self.switch {
            Some(self as &dyn EventsStateSwitch)
        } else {
            None
        }
    }
}

impl AttributeReader for MockProtocol {
    fn read_attributes(&self, mut out: AttrWords<'_>, base_attr_id: u32, attr_count: u32) -> Result<(), SbiError> {
        self.attr_calls.lock().unwrap().push((base_attr_id, attr_count));
        assert_eq!(out.len(), attr_count as usize);
        let store = self.proto_attrs.lock().unwrap();
        for slot in 0..attr_count {
            let index = (base_attr_id - 0x8000_0000 + slot) as usize;
            out.set(slot as usize, *store.get(index).ok_or(SbiError::BadRange)?)?;
        }
        Ok(())
    }
}

impl AttributeWriter for MockProtocol {
    fn write_attributes(&self, input: AttrWords<'_>, base_attr_id: u32, attr_count: u32) -> Result<(), SbiError> {
        self.attr_calls.lock().unwrap().push((base_attr_id, attr_count));
        let mut store = self.proto_attrs.lock().unwrap();
        for (slot, value) in input.iter().enumerate() {
            let index = (base_attr_id - 0x8000_0000) as usize + slot;
            *store.get_mut(index).ok_or(SbiError::BadRange)? = value;
        }
        Ok(())
    }
}

impl MessageSender for MockProtocol {
    fn send_message(&self, msg_id: u32, mut exchange: Exchange<'_>) -> Result<usize, SbiError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.last_msg_id.store(msg_id, Ordering::SeqCst);
        *self.last_message.lock().unwrap() = exchange.message().to_vec();
        if let Some(err) = *self.send_error.lock().unwrap() {
            return Err(err);
        }
        match exchange.response_buffer() {
            None => {
                self.last_posted.store(true, Ordering::SeqCst);
                Ok(0)
            }
            Some(buffer) => {
                self.last_posted.store(false, Ordering::SeqCst);
                let response = self.response.lock().unwrap();
                buffer[..response.len()].copy_from_slice(&response);
                Ok(self.response_len.lock().unwrap().unwrap_or(response.len()))
            }
        }
    }
}

impl EventSource for MockProtocol {
    fn get_notification_events(&self, events: &mut [u8]) -> Result<usize, SbiError> {
        let pending = self.pending_events.lock().unwrap();
        events[..pending.len()].copy_from_slice(&pending);
        Ok(self.events_len.lock().unwrap().unwrap_or(pending.len()))
    }
}

impl EventsStateSwitch for MockProtocol {
    fn switch_events_state(&self, enable: bool) {
        self.switched.lock().unwrap().push(enable);
    }
}
