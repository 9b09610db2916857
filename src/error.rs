use core::{error::Error, fmt::Display};

use fdt_rs::error::DevTreeError;

use crate::domain::DomainId;

/// Errors raised while building the proxy configuration at boot.
#[derive(Debug)]
pub enum ConfigError {
    DevTree(DevTreeError),
    MissingProperty(&'static str),
    InvalidRegion { start: u64, end: u64 },
    TooManyDomains,
    TooManyRegions(DomainId),
    DuplicateDomain(DomainId),
    InvalidHart(u32),
}

impl From<DevTreeError> for ConfigError {
    fn from(err: DevTreeError) -> Self {
        Self::DevTree(err)
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DevTree(err) => write!(f, "device tree error: {:?}", err),
            Self::MissingProperty(name) => write!(f, "missing property: {}", name),
            Self::InvalidRegion { start, end } => {
                write!(f, "region {:#x}..{:#x} is not a naturally aligned power of two", start, end)
            }
            Self::TooManyDomains => write!(f, "too many domains"),
            Self::TooManyRegions(id) => write!(f, "too many memory regions in domain {}", id),
            Self::DuplicateDomain(id) => write!(f, "domain {} declared twice", id),
            Self::InvalidHart(hart) => write!(f, "hart index {} out of range", hart),
        }
    }
}

impl Error for ConfigError {}
