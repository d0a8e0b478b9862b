//! Invocation record and its privileged setter view

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::method::MethodTriple;

/// What the call is invoking. Read-only outside the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    package_name: String,
    service_name: String,
    method_name: String,
    seq_id: u32,
}

impl Invocation {
    /// Resolved package name, empty until the method is resolved
    #[must_use]
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Resolved service name, empty until the method is resolved
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Resolved method name, empty until the method is resolved
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Transport stream id of the call
    #[must_use]
    pub fn seq_id(&self) -> u32 {
        self.seq_id
    }

    /// The resolved triple
    #[must_use]
    pub fn triple(&self) -> MethodTriple {
        MethodTriple {
            package: self.package_name.clone(),
            service: self.service_name.clone(),
            method: self.method_name.clone(),
        }
    }
}

/// Shared cell holding an [`Invocation`].
#[derive(Debug, Default)]
pub(crate) struct InvocationCell(RwLock<Invocation>);

impl InvocationCell {
    pub(crate) fn snapshot(&self) -> Invocation {
        self.0.read().clone()
    }

    pub(crate) fn setter(&self) -> InvocationSetter<'_> {
        InvocationSetter(self.0.write())
    }

    pub(crate) fn reset(&mut self) {
        *self.0.get_mut() = Invocation::default();
    }
}

/// Write access to an invocation record.
///
/// Only obtainable inside this crate; business code sees [`Invocation`].
pub(crate) struct InvocationSetter<'a>(RwLockWriteGuard<'a, Invocation>);

impl InvocationSetter<'_> {
    pub(crate) fn set_seq_id(&mut self, seq_id: u32) -> &mut Self {
        self.0.seq_id = seq_id;
        self
    }

    pub(crate) fn set_triple(&mut self, triple: &MethodTriple) -> &mut Self {
        self.0.package_name.clone_from(&triple.package);
        self.0.service_name.clone_from(&triple.service);
        self.0.method_name.clone_from(&triple.method);
        self
    }
}
