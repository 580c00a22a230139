use std::sync::Arc;

use crate::{Args, MethodDescriptor, Params, ServiceLocator, binder::bind};

/// An overload whose signature accepted the params, with its bound arguments.
#[derive(Debug)]
pub struct Resolved {
    pub method: Arc<MethodDescriptor>,
    pub args: Args,
}

/// Resolves `reference` to the first overload that binds `params`.
///
/// `None` means "method not found", whether the service, the name or every
/// signature failed to match.
pub fn resolve(locator: &dyn ServiceLocator, reference: &str, params: &Params) -> Option<Resolved> {
    let Some(service) = locator.service(reference) else {
        tracing::debug!(reference, "service not found");
        return None;
    };
    let name = locator.method_name(reference)?;
    let resolved = service.methods(&name).find_map(|method| {
        let args = bind(params, method.params()).ok()?;
        Some(Resolved {
            method: method.clone(),
            args,
        })
    });
    if resolved.is_none() {
        tracing::debug!(reference, "no overload accepts the params");
    }
    resolved
}
