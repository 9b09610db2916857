//! Per-hart shared memory binding.

use common::mpxy::{SBI_MPXY_SHMEM_FLAG_OVERWRITE, SBI_MPXY_SHMEM_FLAG_OVERWRITE_RETURN};
use common::sbi::SbiError;

use crate::{
    ensure,
    platform::{Access, Platform, PrivMode},
    proxy::Mpxy,
    state::Caller,
};

pub use common::sbi::PAGE_SIZE;

/// Address half meaning "no shared memory".
pub const INVALID_ADDR: usize = usize::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShmemBinding {
    size: usize,
    addr_lo: usize,
    addr_hi: usize,
}

impl ShmemBinding {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn addr_lo(&self) -> usize {
        self.addr_lo
    }

    pub fn addr_hi(&self) -> usize {
        self.addr_hi
    }

    pub fn base_address(&self) -> u64 {
        phys_addr(self.addr_hi, self.addr_lo)
    }

    /// The (size, addr_lo, addr_hi) triple reported to OVERWRITE_RETURN callers.
    fn report(binding: Option<Self>) -> [usize; 3] {
        match binding {
            Some(b) => [b.size, b.addr_lo, b.addr_hi],
            None => [0, INVALID_ADDR, INVALID_ADDR],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ShmemFlags {
    Overwrite,
    OverwriteReturn,
}

impl TryFrom<usize> for ShmemFlags {
    type Error = SbiError;

    fn try_from(flags: usize) -> Result<Self, Self::Error> {
        match flags {
            SBI_MPXY_SHMEM_FLAG_OVERWRITE => Ok(Self::Overwrite),
            SBI_MPXY_SHMEM_FLAG_OVERWRITE_RETURN => Ok(Self::OverwriteReturn),
            _ => Err(SbiError::InvalidParam),
        }
    }
}

/// Physical address of a window given as two machine words.
#[cfg(target_pointer_width = "32")]
pub fn phys_addr(hi: usize, lo: usize) -> u64 {
    ((hi as u64) << 32) | lo as u64
}

/// Physical address of a window given as two machine words.
#[cfg(not(target_pointer_width = "32"))]
pub fn phys_addr(_hi: usize, lo: usize) -> u64 {
    lo as u64
}

/// The bound window, mapped for M-mode until dropped.
pub struct ShmemMapping<'p, P: Platform + ?Sized> {
    platform: &'p P,
    ptr: *mut u8,
    len: usize,
}

impl<'p, P: Platform + ?Sized> ShmemMapping<'p, P> {
    pub fn new(platform: &'p P, binding: &ShmemBinding) -> Self {
        let ptr = platform.map_supervisor_address(binding.base_address(), binding.size());
        Self {
            platform,
            ptr,
            len: binding.size(),
        }
    }

    pub fn bytes(&mut self) -> &mut [u8] {
        // SAFETY: the Platform contract keeps the window valid until unmap, which only
        // happens when the mapping is dropped.
        unsafe { core::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Copy little-endian words from the start of the window into `out`.
    ///
    /// The supervisor may rewrite the window at any time, each word is loaded exactly once.
    /// Words past the end of the window are left untouched.
    pub fn read_words(&self, out: &mut [u32]) {
        let words = self.ptr.cast::<[u8; 4]>();
        for (index, word) in out.iter_mut().take(self.len / 4).enumerate() {
            // SAFETY: index stays below len / 4 and the window is mapped until drop.
            let raw = unsafe { core::ptr::read_volatile(words.add(index)) };
            *word = u32::from_le_bytes(raw);
        }
    }
}

impl<P: Platform + ?Sized> Drop for ShmemMapping<'_, P> {
    fn drop(&mut self) {
        self.platform.unmap_supervisor_address();
    }
}

impl<P: Platform> Mpxy<'_, P> {
    /// Bind, replace or release the shared memory of the calling hart.
    pub fn set_shmem(
        &self,
        caller: Caller,
        size: usize,
        addr_lo: usize,
        addr_hi: usize,
        flags: usize,
    ) -> Result<(), SbiError> {
        let state = self
            .harts
            .proxy_state_for(caller.hart, caller.domain)
            .ok_or(SbiError::Failed)?;

        if addr_lo == INVALID_ADDR && addr_hi == INVALID_ADDR {
            state.lock().shmem = None;
            log::debug!("hart {}: shared memory released", caller.hart);
            return Ok(());
        }

        let flags = ShmemFlags::try_from(flags)?;
        ensure!(
            size != 0 && size % PAGE_SIZE == 0 && addr_lo % PAGE_SIZE == 0,
            SbiError::InvalidParam
        )?;

        let binding = ShmemBinding {
            size,
            addr_lo,
            addr_hi,
        };
        ensure!(
            self.platform.check_addr_range(
                caller.domain,
                binding.base_address(),
                size as u64,
                PrivMode::Supervisor,
                Access::READ | Access::WRITE,
            ),
            SbiError::InvalidAddress
        )?;

        let mut hart = state.lock();
        if flags == ShmemFlags::OverwriteReturn {
            let previous = ShmemBinding::report(hart.shmem);
            let mut mapping = ShmemMapping::new(&self.platform, &binding);
            let words = mapping.bytes().chunks_exact_mut(core::mem::size_of::<usize>());
            for (word, value) in words.zip(previous) {
                word.copy_from_slice(&value.to_le_bytes());
            }
        }
        hart.shmem = Some(binding);
        log::debug!("hart {}: shared memory {:#x}+{:#x}", caller.hart, binding.base_address(), size);
        Ok(())
    }
}
