//! Caller and callee descriptors

use std::collections::BTreeMap;
use std::net::SocketAddr;

/// One side of a call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointInfo {
    service_name: String,
    method: String,
    address: Option<SocketAddr>,
    tags: BTreeMap<String, String>,
}

impl EndpointInfo {
    /// Create a descriptor for `service_name`
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Service name of this side
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Method name of this side, if known
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Network address of this side
    #[must_use]
    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    /// Tag value
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Set the service name
    pub fn set_service_name(&mut self, service_name: impl Into<String>) {
        self.service_name = service_name.into();
    }

    /// Set the method name
    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = method.into();
    }

    /// Set the network address
    pub fn set_address(&mut self, address: Option<SocketAddr>) {
        self.address = address;
    }

    /// Set a tag
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub(crate) fn reset(&mut self) {
        self.service_name.clear();
        self.method.clear();
        self.address = None;
        self.tags.clear();
    }
}
