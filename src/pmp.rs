//! M-mode platform services: domain access control and a PMP window over supervisor memory.

use heapless::Vec;

use crate::{
    domain::{DomainConfig, DomainId, MAX_DOMAINS},
    ensure,
    error::ConfigError,
    platform::{Access, Platform, PrivMode},
};

/// Number of PMP entries the firmware may use for the supervisor window.
pub const PMP_SLOTS: usize = 8;

/// Smallest NAPOT region, 8 bytes.
const NAPOT_MIN_ORDER: u32 = 3;
const NAPOT_MAX_ORDER: u32 = 63;

/// A naturally aligned power-of-two window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NapotWindow {
    pub base: u64,
    pub order: u32,
}

impl NapotWindow {
    /// The smallest window containing `addr..addr + size`.
    pub fn covering(addr: u64, size: u64) -> Self {
        let end = addr as u128 + size.max(1) as u128;
        let mut order = size.max(1).next_power_of_two().trailing_zeros().max(NAPOT_MIN_ORDER);
        loop {
            let base = addr & !((1u64 << order) - 1);
            if order >= NAPOT_MAX_ORDER || base as u128 + (1u128 << order) >= end {
                return Self { base, order };
            }
            order += 1;
        }
    }

    /// Value of the pmpaddr register selecting this window.
    pub fn pmpaddr(&self) -> usize {
        // Source: https://www.five-embeddev.com/riscv-priv-isa-manual/latest-adoc/machine.html#pmp
        let ones = (1u64 << (self.order - NAPOT_MIN_ORDER)) - 1;
        ((self.base >> 2) | ones) as usize
    }
}

/// The pmpcfg byte for a NAPOT entry.
pub fn pmpcfg_byte(permission: riscv::register::Permission, locked: bool) -> usize {
    let range = riscv::register::Range::NAPOT;
    (locked as usize) << 7 | (range as usize) << 3 | (permission as usize)
}

pub struct FirmwarePlatform {
    domains: Vec<DomainConfig, MAX_DOMAINS>,
    slot: usize,
}

impl FirmwarePlatform {
    /// `slot` is the PMP entry reserved for the supervisor window.
    pub fn new(domains: &[DomainConfig], slot: usize) -> anyhow::Result<Self> {
        ensure!(slot < PMP_SLOTS, anyhow::anyhow!("pmp slot {} out of range", slot))?;
        let domains = Vec::from_slice(domains).map_err(|_| ConfigError::TooManyDomains)?;
        Ok(Self { domains, slot })
    }

    pub fn domain(&self, id: DomainId) -> Option<&DomainConfig> {
        self.domains.iter().find(|d| d.id == id)
    }
}

/// PMP entries described by one pmpcfg register.
#[cfg(target_pointer_width = "32")]
const CFG_ENTRIES: usize = 4;
#[cfg(not(target_pointer_width = "32"))]
const CFG_ENTRIES: usize = 8;

/// The pmpcfg register number and bit shift holding the cfg byte of `slot`.
pub fn cfg_position(slot: usize) -> (usize, usize) {
    cfg_position_for(slot, CFG_ENTRIES)
}

fn cfg_position_for(slot: usize, entries: usize) -> (usize, usize) {
    // RV64 only has the even numbered pmpcfg registers
    let index = slot / entries * (entries / 4);
    (index, 8 * (slot % entries))
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
mod csr {
    use riscv::register::*;

    fn read_cfg(index: usize) -> usize {
        let value: usize;
        unsafe {
            match index {
                #[cfg(target_pointer_width = "32")]
                1 => core::arch::asm!("csrr {}, pmpcfg1", out(reg) value),
                _ => core::arch::asm!("csrr {}, pmpcfg0", out(reg) value),
            }
        }
        value
    }

    fn write_cfg(index: usize, value: usize) {
        unsafe {
            match index {
                #[cfg(target_pointer_width = "32")]
                1 => core::arch::asm!("csrw pmpcfg1, {}", in(reg) value),
                _ => core::arch::asm!("csrw pmpcfg0, {}", in(reg) value),
            }
            core::arch::asm!("sfence.vma");
        }
    }

    pub fn open_window(slot: usize, pmpaddr: usize, cfg: usize) {
        unsafe {
            match slot {
                0 => pmpaddr0::write(pmpaddr),
                1 => pmpaddr1::write(pmpaddr),
                2 => pmpaddr2::write(pmpaddr),
                3 => pmpaddr3::write(pmpaddr),
                4 => pmpaddr4::write(pmpaddr),
                5 => pmpaddr5::write(pmpaddr),
                6 => pmpaddr6::write(pmpaddr),
                _ => pmpaddr7::write(pmpaddr),
            }
        }
        let (index, shift) = super::cfg_position(slot);
        let pmpcfg = (read_cfg(index) & !(0xff << shift)) | (cfg << shift);
        write_cfg(index, pmpcfg);
    }

    pub fn close_window(slot: usize) {
        let (index, shift) = super::cfg_position(slot);
        write_cfg(index, read_cfg(index) & !(0xff << shift));
    }
}

unsafe impl Platform for FirmwarePlatform {
    fn check_addr_range(&self, domain: DomainId, addr: u64, size: u64, mode: PrivMode, access: Access) -> bool {
        self.domain(domain)
            .is_some_and(|d| d.check_addr_range(addr, size, mode, access))
    }

    fn map_supervisor_address(&self, addr: u64, size: usize) -> *mut u8 {
        let window = NapotWindow::covering(addr, size as u64);
        let cfg = pmpcfg_byte(riscv::register::Permission::RW, false);
        #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
        csr::open_window(self.slot, window.pmpaddr(), cfg);
        log::trace!("pmp{}: {:#x} order {} cfg {:#x}", self.slot, window.base, window.order, cfg);
        addr as usize as *mut u8
    }

    fn unmap_supervisor_address(&self) {
        #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
        csr::close_window(self.slot);
    }
}
