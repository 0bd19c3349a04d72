use serde::{Serialize, Deserialize};
use std::fmt;

/// Arena slot of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

/// Local index into a token's ordered list of base datasets.
///
/// Refs are only meaningful next to the registry that issued them; two tokens
/// may use the same ref for different datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct DatasetRef(pub u16);

impl DatasetRef {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// An independent source of data, identified by an opaque fingerprint.
///
/// `hash_type` selects the fingerprinting procedure; this crate never
/// interprets it. Equality is content equality of both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BaseDataset {
    pub hash_type: u16,
    pub hash_bytes: Vec<u8>,
}

impl BaseDataset {
    pub fn new(hash_type: u16, hash_bytes: impl Into<Vec<u8>>) -> Self {
        Self { hash_type, hash_bytes: hash_bytes.into() }
    }
}

impl fmt::Display for BaseDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash_type, hex::encode(&self.hash_bytes))
    }
}

/// Statistical facet of a dataset referenced by a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Component(pub u8);

impl Component {
    pub const DOMAIN: Self = Self(0);
    /// First moment.
    pub const VALUE: Self = Self(1);
    /// Second moment, stored as a standard deviation.
    pub const ERROR: Self = Self(2);
    pub const THIRD_MOMENT: Self = Self(3);
    pub const FOURTH_MOMENT: Self = Self(4);
    /// Reserved for domain uncertainty.
    pub const DOMAIN_ERROR: Self = Self(255);

    pub fn name(&self) -> &'static str {
        match *self {
            Self::DOMAIN => "domain",
            Self::VALUE => "value",
            Self::ERROR => "error",
            Self::DOMAIN_ERROR => "domain_error",
            _ => "moment",
        }
    }

    /// Inverse of the `Display` form: `value`, `error`, `m3` and so on.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "domain" => Some(Self::DOMAIN),
            "value" => Some(Self::VALUE),
            "error" => Some(Self::ERROR),
            "domain_error" => Some(Self::DOMAIN_ERROR),
            _ => name.strip_prefix('m')?.parse().ok().map(Self),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DOMAIN | Self::VALUE | Self::ERROR | Self::DOMAIN_ERROR => f.write_str(self.name()),
            Self(n) => write!(f, "m{}", n),
        }
    }
}
