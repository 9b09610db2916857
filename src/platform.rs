//! Services the proxy needs from the surrounding firmware.

use bitflags::bitflags;

use crate::domain::DomainId;

/// Privilege mode an access is checked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum PrivMode {
    User = 0,
    Supervisor = 1,
    Machine = 3,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Access: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
        /// The access targets device memory.
        const MMIO = 1 << 3;
    }
}

/// # Safety
///
/// `map_supervisor_address` must return a pointer valid for reads and writes of `size` bytes
/// until the matching `unmap_supervisor_address`, and `check_addr_range` must only accept
/// ranges that can be mapped that way.
pub unsafe trait Platform: Sync {
    /// Whether every byte of `addr..addr + size` is accessible by `domain` in `mode`.
    fn check_addr_range(&self, domain: DomainId, addr: u64, size: u64, mode: PrivMode, access: Access) -> bool;

    /// Make supervisor memory at `addr` accessible to M-mode.
    fn map_supervisor_address(&self, addr: u64, size: usize) -> *mut u8;

    /// Revoke the window opened by the last `map_supervisor_address`.
    fn unmap_supervisor_address(&self);
}
