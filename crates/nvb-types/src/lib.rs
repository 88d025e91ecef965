//! Foundation types for the NV image builder.
//!
//! This crate provides the identifier and descriptor-tree types shared by
//! every stage of the build. Every other `nvb` crate depends on `nvb-types`.
//!
//! # Key Types
//!
//! - [`ItemId`]: Canonical item identifier, parsed from decimal or hex text
//! - [`GroupId`]: Numeric group sort key
//! - [`DeviceSet`]: Case-insensitive product applicability set
//! - [`Descriptor`]: The group → item tree produced at each pipeline stage

pub mod descriptor;
pub mod device;
pub mod error;
pub mod id;

pub use descriptor::{Descriptor, Group, Item, DEFAULT_ROOT, FACTORY_GROUP, KEEP_GROUP};
pub use device::DeviceSet;
pub use error::TypeError;
pub use id::{GroupId, ItemId};
