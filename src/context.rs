use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde_json::{Map, Value};

use crate::RequestId;

/// Management parameter holding the serialization depth of the result.
pub const DEPTH_PARAM: &str = "#deep";

type Release = Box<dyn FnOnce() + Send>;

/// State shared by every request of one inbound payload.
///
/// Release callbacks run exactly once, when handling of the payload ends.
#[derive(Default)]
pub struct RequestScope(Mutex<ScopeState>);

#[derive(Default)]
struct ScopeState {
    releases: Vec<Release>,
    released: bool,
    extensions: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl RequestScope {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<ScopeState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `f` to run when the scope is released.
    ///
    /// If the scope was already released, `f` runs immediately.
    pub fn on_release(&self, f: impl FnOnce() + Send + 'static) {
        let mut s = self.lock();
        if s.released {
            drop(s);
            f();
        } else {
            s.releases.push(Box::new(f));
        }
    }

    pub fn insert<T: Any + Send + Sync>(&self, value: T) {
        self.lock()
            .extensions
            .insert(TypeId::of::<T>(), Arc::new(value));
    }
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let value = self.lock().extensions.get(&TypeId::of::<T>())?.clone();
        value.downcast().ok()
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    pub(crate) fn release(&self) {
        let releases = {
            let mut s = self.lock();
            if s.released {
                return;
            }
            s.released = true;
            s.extensions.clear();
            std::mem::take(&mut s.releases)
        };
        for f in releases {
            f();
        }
    }
}

/// Releases the scope when dropped, whichever way handling ends.
pub(crate) struct ScopeGuard(pub(crate) Arc<RequestScope>);

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Per-call context handed to a service method.
#[derive(Clone)]
pub struct RequestContext {
    id: Option<RequestId>,
    method: Arc<str>,
    management: Arc<Map<String, Value>>,
    scope: Arc<RequestScope>,
}

impl RequestContext {
    pub(crate) fn new(
        id: Option<RequestId>,
        method: &str,
        management: Map<String, Value>,
        scope: &Arc<RequestScope>,
    ) -> Self {
        Self {
            id,
            method: method.into(),
            management: Arc::new(management),
            scope: scope.clone(),
        }
    }

    pub fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Parameter whose name starts with `#` or `.`, stripped before binding.
    pub fn management_param(&self, name: &str) -> Option<&Value> {
        self.management.get(name)
    }
    pub fn depth(&self) -> Option<usize> {
        let depth = self.management_param(DEPTH_PARAM)?.as_u64()?;
        usize::try_from(depth).ok()
    }

    pub fn scope(&self) -> &Arc<RequestScope> {
        &self.scope
    }
    pub fn on_release(&self, f: impl FnOnce() + Send + 'static) {
        self.scope.on_release(f)
    }
}

pub(crate) fn is_management_key(key: &str) -> bool {
    key.starts_with('#') || key.starts_with('.')
}

/// Moves management keys out of `params`.
pub(crate) fn split_management(params: &mut Map<String, Value>) -> Map<String, Value> {
    let keys: Vec<String> = params
        .keys()
        .filter(|k| is_management_key(k))
        .cloned()
        .collect();
    let mut management = Map::new();
    for key in keys {
        if let Some(value) = params.remove(&key) {
            management.insert(key, value);
        }
    }
    management
}
