use heapless::Vec;
use spin::Mutex;

use crate::{
    domain::{DomainConfig, DomainId, MAX_DOMAINS, MAX_HARTS},
    ensure_not,
    error::ConfigError,
    shmem::ShmemBinding,
};

pub type HartIndex = usize;

/// Identity of the hart issuing a call and the domain it runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller {
    pub domain: DomainId,
    pub hart: HartIndex,
}

impl Caller {
    pub const fn new(domain: DomainId, hart: HartIndex) -> Self {
        Self { domain, hart }
    }
}

#[derive(Debug)]
pub struct HartState {
    pub(crate) shmem: Option<ShmemBinding>,
    pub msi_available: bool,
    pub sse_available: bool,
}

impl HartState {
    fn new(msi_available: bool, sse_available: bool) -> Self {
        Self {
            shmem: None,
            msi_available,
            sse_available,
        }
    }

    pub fn binding(&self) -> Option<ShmemBinding> {
        self.shmem
    }

    pub fn is_bound(&self) -> bool {
        self.shmem.is_some()
    }

    pub fn base_address(&self) -> Option<u64> {
        self.shmem.map(|b| b.base_address())
    }
}

struct DomainHarts {
    domain: DomainId,
    harts: Vec<(HartIndex, Mutex<HartState>), MAX_HARTS>,
}

/// Proxy state of every (domain, hart) pair, allocated once at boot.
///
/// Each entry is only ever locked by its own hart, the lock is never contended.
pub struct HartTable {
    domains: Vec<DomainHarts, MAX_DOMAINS>,
}

impl HartTable {
    pub fn new(configs: &[DomainConfig]) -> Result<Self, ConfigError> {
        let mut domains: Vec<DomainHarts, MAX_DOMAINS> = Vec::new();
        for config in configs {
            ensure_not!(
                domains.iter().any(|d| d.domain == config.id),
                ConfigError::DuplicateDomain(config.id)
            )?;
            let mut harts = Vec::new();
            for hart in config.harts() {
                let state = HartState::new(config.msi_available, config.sse_available);
                // harts() never yields more than MAX_HARTS entries
                let _ = harts.push((hart, Mutex::new(state)));
            }
            domains
                .push(DomainHarts {
                    domain: config.id,
                    harts,
                })
                .map_err(|_| ConfigError::TooManyDomains)?;
        }
        Ok(Self { domains })
    }

    pub fn proxy_state_for(&self, hart: HartIndex, domain: DomainId) -> Option<&Mutex<HartState>> {
        self.domains
            .iter()
            .find(|d| d.domain == domain)?
            .harts
            .iter()
            .find(|(index, _)| *index == hart)
            .map(|(_, state)| state)
    }
}
