use serde::{Deserialize, Serialize};

use crate::error::FlowError;

// ---------------------------------------------------------------------------
// ResourceType
// ---------------------------------------------------------------------------

/// The closed set of resource kinds the engine tracks.
///
/// Every quantity in the ledger and the flow graph is tagged by exactly one
/// variant; there is no implicit conversion between types. External input
/// arriving as a string must pass [`ResourceType::from_name`] so unknown
/// names are rejected at the boundary instead of leaking inward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Minerals,
    Gas,
    Energy,
}

impl ResourceType {
    /// All variants, in canonical (ledger table) order.
    pub const ALL: [ResourceType; 3] = [
        ResourceType::Minerals,
        ResourceType::Gas,
        ResourceType::Energy,
    ];

    /// Number of variants. Sizes the per-resource tables.
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this variant in the canonical order.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The lowercase name used in config files and event payloads.
    pub const fn name(self) -> &'static str {
        match self {
            ResourceType::Minerals => "minerals",
            ResourceType::Gas => "gas",
            ResourceType::Energy => "energy",
        }
    }

    /// Parse a resource name. Unknown names are a configuration error.
    pub fn from_name(name: &str) -> Result<Self, FlowError> {
        match name {
            "minerals" => Ok(ResourceType::Minerals),
            "gas" => Ok(ResourceType::Gas),
            "energy" => Ok(ResourceType::Energy),
            other => Err(FlowError::Configuration(format!(
                "unknown resource type: {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// PerResource table
// ---------------------------------------------------------------------------

/// A dense table with one slot per [`ResourceType`], indexed by variant.
///
/// Used for ledger state, utilization vectors, and per-type accumulators.
/// Iteration order is the canonical [`ResourceType::ALL`] order, which keeps
/// every per-resource walk deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerResource<T>([T; ResourceType::COUNT]);

impl<T: Default + Copy> Default for PerResource<T> {
    fn default() -> Self {
        Self([T::default(); ResourceType::COUNT])
    }
}

impl<T> PerResource<T> {
    /// Build a table by evaluating `f` for each resource type in order.
    pub fn from_fn(mut f: impl FnMut(ResourceType) -> T) -> Self {
        Self(ResourceType::ALL.map(&mut f))
    }

    /// Iterate `(type, value)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceType, &T)> {
        ResourceType::ALL.iter().map(|&r| (r, &self.0[r.index()]))
    }
}

impl<T: Copy> PerResource<T> {
    /// Build a table with every slot set to `value`.
    pub fn splat(value: T) -> Self {
        Self([value; ResourceType::COUNT])
    }
}

impl<T> std::ops::Index<ResourceType> for PerResource<T> {
    type Output = T;

    #[inline]
    fn index(&self, r: ResourceType) -> &T {
        &self.0[r.index()]
    }
}

impl<T> std::ops::IndexMut<ResourceType> for PerResource<T> {
    #[inline]
    fn index_mut(&mut self, r: ResourceType) -> &mut T {
        &mut self.0[r.index()]
    }
}
