use dealflow_core::domain::CallerIdentity;

/// What the admission pipeline needs to know about an incoming request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionRequest {
    pub method: String,
    pub path: String,
    /// Peer or forwarded address, if the transport knows it.
    pub address: Option<String>,
    pub caller: CallerIdentity,
    /// Caller-supplied key that takes precedence over every other identity.
    pub key_override: Option<String>,
}

impl AdmissionRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_caller(mut self, caller: CallerIdentity) -> Self {
        self.caller = caller;
        self
    }

    pub fn with_key_override(mut self, key: impl Into<String>) -> Self {
        self.key_override = Some(key.into());
        self
    }
}
