use agroflow_core::TenantId;

/// Tenant context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Acting user for a request, when the caller identified one.
///
/// The host session layer is out of scope here; the actor arrives as a
/// plain email header and is used for portal-style checks (party users)
/// and as the default signee.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActorContext {
    email: Option<String>,
}

impl ActorContext {
    pub fn new(email: Option<String>) -> Self {
        Self { email }
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}
