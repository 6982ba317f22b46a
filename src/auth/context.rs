use uuid::Uuid;

/// Actor role in the marketplace.
///
/// Businesses own projects, vendors bid on them, admins monitor. The role is
/// asserted by the session layer; this core only interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Business,
    Vendor,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "business" | "client" => Some(Self::Business),
            "vendor" | "creator" => Some(Self::Vendor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Vendor => "vendor",
            Self::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Authenticated actor context extracted from the session headers.
///
/// Session issuance lives outside this core; the session gateway terminates
/// the user's credentials and forwards identity out-of-band on every request.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}
