//! Root signatures with parsed binding metadata.
//!
//! Beyond the validated raw object, a [`RootSignature`] precomputes the
//! layout the shader-visible staging rings rely on: descriptor totals for
//! the resource and sampler rings, and per-space base offsets so a write
//! keyed on `(space, register)` lands at a deterministic slot inside a
//! reserved window.

use crate::backend::{DescriptorRangeKind, RawRootSignature, RootParameter, RootSignatureDesc};
use crate::device::Device;
use crate::error::GpuResult;

/// Highest register space the parsed tables cover.
pub const MAX_REGISTER_SPACE: usize = 16;

/// Classification of one root parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotInfo {
    /// Inline 32-bit constants.
    Constants {
        /// Number of 32-bit values.
        num_values: u32,
    },
    /// A root constant buffer view.
    RootCbv,
    /// A descriptor table of CBV/SRV/UAV ranges.
    ResourceTable {
        /// Descriptors in the table.
        size: u32,
    },
    /// A descriptor table of sampler ranges.
    SamplerTable {
        /// Descriptors in the table.
        size: u32,
    },
}

/// A compiled root signature plus the metadata parsed from its description.
pub struct RootSignature {
    raw: RawRootSignature,
    total_resource: u32,
    total_sampler: u32,
    static_sampler_count: u32,
    cbv_base: [u32; MAX_REGISTER_SPACE],
    srv_base: [u32; MAX_REGISTER_SPACE],
    uav_base: [u32; MAX_REGISTER_SPACE],
    sampler_base: [u32; MAX_REGISTER_SPACE],
    slots: Vec<SlotInfo>,
}

impl RootSignature {
    /// Validate, create and parse a root signature.
    ///
    /// # Errors
    ///
    /// Propagates the backend error when validation rejects the description
    /// (parameter cost over 64 DWORDs, register space over 15, mixed
    /// sampler/resource tables).
    pub fn new(device: &Device, desc: RootSignatureDesc) -> GpuResult<Self> {
        let static_sampler_count = desc.static_samplers.len() as u32;
        let raw = device.raw().create_root_signature(desc)?;

        let mut parsed = Self {
            raw,
            total_resource: 0,
            total_sampler: 0,
            static_sampler_count,
            cbv_base: [0; MAX_REGISTER_SPACE],
            srv_base: [0; MAX_REGISTER_SPACE],
            uav_base: [0; MAX_REGISTER_SPACE],
            sampler_base: [0; MAX_REGISTER_SPACE],
            slots: Vec::new(),
        };
        parsed.walk_parameters();
        Ok(parsed)
    }

    fn walk_parameters(&mut self) {
        let parameters = self.raw.desc().parameters.clone();
        for parameter in &parameters {
            let slot = match parameter {
                RootParameter::Constants { num_values, .. } => SlotInfo::Constants {
                    num_values: *num_values,
                },
                RootParameter::Cbv { .. } => SlotInfo::RootCbv,
                RootParameter::DescriptorTable { ranges } => {
                    // Validation rejects mixed tables, so the first range
                    // classifies the whole table.
                    let is_sampler = ranges
                        .first()
                        .is_some_and(|r| r.kind == DescriptorRangeKind::Sampler);
                    let mut table_size = 0;
                    for range in ranges {
                        let space = range.register_space as usize;
                        let running = if is_sampler {
                            &mut self.total_sampler
                        } else {
                            &mut self.total_resource
                        };
                        match range.kind {
                            DescriptorRangeKind::Cbv => self.cbv_base[space] = *running,
                            DescriptorRangeKind::Srv => self.srv_base[space] = *running,
                            DescriptorRangeKind::Uav => self.uav_base[space] = *running,
                            DescriptorRangeKind::Sampler => self.sampler_base[space] = *running,
                        }
                        *running += range.count;
                        table_size += range.count;
                    }
                    if is_sampler {
                        SlotInfo::SamplerTable { size: table_size }
                    } else {
                        SlotInfo::ResourceTable { size: table_size }
                    }
                }
            };
            self.slots.push(slot);
        }
    }

    /// The raw signature bound on command lists.
    pub fn raw(&self) -> &RawRootSignature {
        &self.raw
    }

    /// Total CBV/SRV/UAV descriptors across all resource tables.
    pub fn total_resource_descriptors(&self) -> u32 {
        self.total_resource
    }

    /// Total sampler descriptors across all sampler tables.
    pub fn total_sampler_descriptors(&self) -> u32 {
        self.total_sampler
    }

    /// Number of static samplers baked into the signature.
    pub fn static_sampler_count(&self) -> u32 {
        self.static_sampler_count
    }

    /// Number of root parameter slots.
    pub fn parameter_count(&self) -> usize {
        self.slots.len()
    }

    /// Ring-relative base offset for a range kind in a register space.
    pub fn table_base(&self, kind: DescriptorRangeKind, space: u32) -> u32 {
        let space = space as usize;
        debug_assert!(space < MAX_REGISTER_SPACE);
        match kind {
            DescriptorRangeKind::Cbv => self.cbv_base[space],
            DescriptorRangeKind::Srv => self.srv_base[space],
            DescriptorRangeKind::Uav => self.uav_base[space],
            DescriptorRangeKind::Sampler => self.sampler_base[space],
        }
    }

    /// Classification of root parameter `index`.
    pub fn slot(&self, index: usize) -> Option<SlotInfo> {
        self.slots.get(index).copied()
    }

    /// Whether parameter `index` is a descriptor table.
    pub fn is_descriptor_table(&self, index: usize) -> bool {
        matches!(
            self.slot(index),
            Some(SlotInfo::ResourceTable { .. } | SlotInfo::SamplerTable { .. })
        )
    }

    /// Whether parameter `index` is a sampler table.
    pub fn is_sampler_table(&self, index: usize) -> bool {
        matches!(self.slot(index), Some(SlotInfo::SamplerTable { .. }))
    }

    /// Descriptor count of the resource table at `index`, 0 otherwise.
    pub fn resource_table_size(&self, index: usize) -> u32 {
        match self.slot(index) {
            Some(SlotInfo::ResourceTable { size }) => size,
            _ => 0,
        }
    }

    /// Descriptor count of the sampler table at `index`, 0 otherwise.
    pub fn sampler_table_size(&self, index: usize) -> u32 {
        match self.slot(index) {
            Some(SlotInfo::SamplerTable { size }) => size,
            _ => 0,
        }
    }
}

impl std::fmt::Debug for RootSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootSignature")
            .field("parameters", &self.slots.len())
            .field("resource_descriptors", &self.total_resource)
            .field("sampler_descriptors", &self.total_sampler)
            .finish()
    }
}
