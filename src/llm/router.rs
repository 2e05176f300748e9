use super::registry::BackendDescriptor;

/// Compute the trial order for one request.
///
/// `available` must already be in priority order. The preferred backend goes
/// first when it is available; everything else follows once, in order.
pub fn route(preferred: Option<&str>, available: &[BackendDescriptor]) -> Vec<String> {
    let mut order: Vec<String> = Vec::with_capacity(available.len());

    if let Some(preferred) = preferred.map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(hit) = available
            .iter()
            .find(|d| d.available && d.id.eq_ignore_ascii_case(preferred))
        {
            order.push(hit.id.clone());
        } else {
            tracing::debug!(
                preferred,
                "Preferred backend unavailable, using priority order"
            );
        }
    }

    for descriptor in available.iter().filter(|d| d.available) {
        if !order.iter().any(|id| id == &descriptor.id) {
            order.push(descriptor.id.clone());
        }
    }
    order
}
