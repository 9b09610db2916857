use bitflags::bitflags;
use fdt_rs::{
    base::{DevTree, DevTreeNode},
    prelude::{FallibleIterator, PropReader},
};
use heapless::Vec;

use crate::{
    ensure, ensure_not,
    error::ConfigError,
    platform::{Access, PrivMode},
};

pub type DomainId = usize;

pub const MAX_DOMAINS: usize = 8;
pub const MAX_HARTS: usize = 64;
pub const MAX_REGIONS: usize = 16;

pub const DOMAIN_COMPATIBLE: &str = "shadowfax,mpxy,domain";

bitflags! {
    /// Region flags, laid out as OpenSBI domain memory region flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RegionFlags: u32 {
        const M_READ = 1 << 0;
        const M_WRITE = 1 << 1;
        const M_EXECUTE = 1 << 2;
        const SU_READ = 1 << 3;
        const SU_WRITE = 1 << 4;
        const SU_EXECUTE = 1 << 5;
        const MMIO = 1 << 31;
    }
}

impl RegionFlags {
    fn permits(self, mode: PrivMode, access: Access) -> bool {
        if self.contains(RegionFlags::MMIO) != access.contains(Access::MMIO) {
            return false;
        }
        let (read, write, execute) = match mode {
            PrivMode::Machine => (Self::M_READ, Self::M_WRITE, Self::M_EXECUTE),
            PrivMode::Supervisor | PrivMode::User => (Self::SU_READ, Self::SU_WRITE, Self::SU_EXECUTE),
        };
        (!access.contains(Access::READ) || self.contains(read))
            && (!access.contains(Access::WRITE) || self.contains(write))
            && (!access.contains(Access::EXECUTE) || self.contains(execute))
    }
}

/// A naturally aligned power-of-two memory region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base_addr: u64,
    pub order: u32,
    pub flags: RegionFlags,
}

impl MemoryRegion {
    /// Build the region covering `start..end`, which must be a naturally aligned power of two.
    pub fn from_range(start: u64, end: u64, flags: RegionFlags) -> Result<Self, ConfigError> {
        let size = end.wrapping_sub(start);
        ensure!(
            end > start && size.is_power_of_two() && start & (size - 1) == 0,
            ConfigError::InvalidRegion { start, end }
        )?;
        Ok(Self {
            base_addr: start,
            order: size.trailing_zeros(),
            flags,
        })
    }

    /// Region covering the whole physical address space.
    pub const fn everything(flags: RegionFlags) -> Self {
        Self {
            base_addr: 0,
            order: 64,
            flags,
        }
    }

    pub fn end(&self) -> u128 {
        self.base_addr as u128 + (1u128 << self.order)
    }

    pub fn contains(&self, addr: u128) -> bool {
        addr >= self.base_addr as u128 && addr < self.end()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainConfig {
    pub id: DomainId,
    /// Bit `i` set when hart index `i` may run in this domain.
    pub possible_harts: u64,
    /// Checked in declaration order, the first region containing an address decides.
    pub regions: Vec<MemoryRegion, MAX_REGIONS>,
    pub msi_available: bool,
    pub sse_available: bool,
}

impl DomainConfig {
    pub fn new(id: DomainId) -> Self {
        Self {
            id,
            possible_harts: 0,
            regions: Vec::new(),
            msi_available: false,
            sse_available: false,
        }
    }

    pub fn add_hart(&mut self, hart: u32) -> Result<(), ConfigError> {
        ensure!((hart as usize) < MAX_HARTS, ConfigError::InvalidHart(hart))?;
        self.possible_harts |= 1 << hart;
        Ok(())
    }

    pub fn add_region(&mut self, region: MemoryRegion) -> Result<(), ConfigError> {
        self.regions
            .push(region)
            .map_err(|_| ConfigError::TooManyRegions(self.id))
    }

    pub fn harts(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_HARTS).filter(|hart| self.possible_harts & (1 << hart) != 0)
    }

    fn region_at(&self, addr: u128) -> Option<(usize, &MemoryRegion)> {
        self.regions.iter().enumerate().find(|(_, r)| r.contains(addr))
    }

    /// Whether every byte of `addr..addr + size` grants `access` to `mode`.
    pub fn check_addr_range(&self, addr: u64, size: u64, mode: PrivMode, access: Access) -> bool {
        let Some(end) = addr.checked_add(size) else {
            return false;
        };
        let (mut cur, end) = (addr as u128, end as u128);
        while cur < end {
            let Some((index, region)) = self.region_at(cur) else {
                return false;
            };
            if !region.flags.permits(mode, access) {
                return false;
            }
            // an earlier region starting inside this one takes over from its base
            cur = self.regions[..index]
                .iter()
                .map(|r| r.base_addr as u128)
                .filter(|&base| base > cur)
                .fold(region.end(), u128::min);
        }
        true
    }

    pub fn from_fdt_node(node: &DevTreeNode) -> Result<Self, ConfigError> {
        let mut domain = DomainConfig::new(0);
        let mut has_id = false;
        let mut ranges: Vec<(u64, u64), MAX_REGIONS> = Vec::new();
        let mut permissions: Vec<u32, MAX_REGIONS> = Vec::new();

        let mut props = node.props();
        while let Some(prop) = props.next()? {
            match prop.name()? {
                "id" => {
                    domain.id = prop.u32(0)? as DomainId;
                    has_id = true;
                }
                "possible-harts" => {
                    let mut i = 0;
                    while let Ok(hart) = prop.u32(i) {
                        domain.add_hart(hart)?;
                        i += 1;
                    }
                }
                "memory" => {
                    let mut i = 0;
                    while let (Ok(start), Ok(end)) = (prop.u64(i), prop.u64(i + 1)) {
                        ranges
                            .push((start, end))
                            .map_err(|_| ConfigError::TooManyRegions(domain.id))?;
                        i += 2;
                    }
                }
                "permissions" => {
                    let mut i = 0;
                    while let Ok(bits) = prop.u32(i) {
                        permissions
                            .push(bits)
                            .map_err(|_| ConfigError::TooManyRegions(domain.id))?;
                        i += 1;
                    }
                }
                "msi-available" => domain.msi_available = true,
                "sse-available" => domain.sse_available = true,
                _ => {}
            }
        }
        ensure!(has_id, ConfigError::MissingProperty("id"))?;

        for (i, (start, end)) in ranges.into_iter().enumerate() {
            // regions without an explicit permission word are plain RW memory for everyone
            let flags = permissions
                .get(i)
                .map(|&bits| RegionFlags::from_bits_truncate(bits))
                .unwrap_or(RegionFlags::M_READ | RegionFlags::M_WRITE | RegionFlags::SU_READ | RegionFlags::SU_WRITE);
            domain.add_region(MemoryRegion::from_range(start, end, flags)?)?;
        }
        Ok(domain)
    }
}

/// Collect every MPXY domain described in the device tree.
pub fn from_fdt(fdt: &DevTree) -> anyhow::Result<Vec<DomainConfig, MAX_DOMAINS>> {
    let mut domains: Vec<DomainConfig, MAX_DOMAINS> = Vec::new();
    let mut nodes = fdt.compatible_nodes(DOMAIN_COMPATIBLE);
    while let Some(node) = nodes.next().map_err(ConfigError::from)? {
        let domain = DomainConfig::from_fdt_node(&node)?;
        ensure_not!(
            domains.iter().any(|d| d.id == domain.id),
            ConfigError::DuplicateDomain(domain.id)
        )?;
        log::debug!("domain {}: harts {:#x}, {} regions", domain.id, domain.possible_harts, domain.regions.len());
        domains.push(domain).map_err(|_| ConfigError::TooManyDomains)?;
    }
    Ok(domains)
}

/// # Safety
///
/// `fdt_addr` must point to a valid flattened device tree that outlives the call.
pub unsafe fn from_fdt_address(fdt_addr: usize) -> anyhow::Result<Vec<DomainConfig, MAX_DOMAINS>> {
    let fdt = DevTree::from_raw_pointer(fdt_addr as *const u8).map_err(ConfigError::from)?;
    from_fdt(&fdt)
}
