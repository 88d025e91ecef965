//! Product filter: scopes a merged descriptor to one target product.

use tracing::info;

use nvb_types::Descriptor;

/// Drop every item whose device set is non-empty and lacks `product`.
///
/// Groups emptied by the filter are kept, and no identifier is renumbered.
pub fn filter_for_product(descriptor: &Descriptor, product: &str) -> Descriptor {
    let mut scoped = descriptor.clone();
    for group in &mut scoped.groups {
        group.items.retain(|item| item.devices.applies_to(product));
    }

    info!(
        product,
        kept = scoped.item_count(),
        dropped = descriptor.item_count() - scoped.item_count(),
        "filtered descriptor for product"
    );
    scoped
}
