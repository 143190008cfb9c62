use bank_core::HolderId;

/// What the caller is allowed to do beyond its own account.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    Customer,
    /// May change any account's status and list accounts.
    Admin,
}

/// Authenticated caller of a request.
///
/// A caller may only debit the account it holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CallerContext {
    holder_id: HolderId,
    role: Role,
}

impl CallerContext {
    pub fn customer(holder_id: HolderId) -> Self {
        Self {
            holder_id,
            role: Role::Customer,
        }
    }

    pub fn admin(holder_id: HolderId) -> Self {
        Self {
            holder_id,
            role: Role::Admin,
        }
    }

    pub fn holder_id(&self) -> HolderId {
        self.holder_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
