//! Descriptor stages for the NV image builder.
//!
//! Takes human-authored configuration descriptors from source text to the
//! deployment-scoped descriptor handed to the item compiler:
//!
//! 1. [`loader`] parses each source and normalizes item identifiers
//! 2. [`merge`] combines sources, rejecting duplicate identifiers
//! 3. [`filter`] scopes the result to one product
//! 4. [`overrides`] applies a deployment variant's value replacements
//!
//! Each stage borrows its input and returns a new [`Descriptor`], so any
//! earlier stage's output can be reused for further products or variants.
//! [`writer`] renders any stage's output back to text.

pub mod error;
pub mod filter;
pub mod loader;
pub mod merge;
pub mod overrides;
pub mod writer;

pub use error::{DescriptorError, DescriptorResult};
pub use filter::filter_for_product;
pub use loader::{load_file, parse_str};
pub use merge::{merge, merge_labelled};
pub use overrides::{Override, OverrideSet};
pub use writer::{to_xml_string, write_file};

pub use nvb_types::Descriptor;
