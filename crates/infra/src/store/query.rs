//! Read-side filters and pagination for accounts and movement records.

use serde::{Deserialize, Serialize};

use bank_core::AccountId;
use bank_ledger::{AccountStatus, Movement, MovementKind};

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of rows to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    /// Slice an already ordered collection.
    pub(crate) fn window<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .cloned()
            .collect()
    }
}

/// Which accounts to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFilter {
    /// Only accounts in this status (e.g. `Active` for eligible receivers).
    pub status: Option<AccountStatus>,
}

impl AccountFilter {
    pub fn active() -> Self {
        Self {
            status: Some(AccountStatus::Active),
        }
    }
}

/// Which movement records to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    /// Records referencing this account in any role.
    pub account: Option<AccountId>,
    pub kind: Option<MovementKind>,
}

impl MovementFilter {
    pub fn for_account(account: AccountId) -> Self {
        Self {
            account: Some(account),
            kind: None,
        }
    }

    pub fn matches(&self, movement: &Movement) -> bool {
        self.account.is_none_or(|id| movement.involves(id))
            && self.kind.is_none_or(|kind| movement.kind() == kind)
    }
}

/// One page of movement records, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPage {
    pub movements: Vec<Movement>,
    /// Number of records matching the filter across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl MovementPage {
    pub fn new(movements: Vec<Movement>, total: u64, pagination: Pagination) -> Self {
        let has_more = u64::from(pagination.offset) + (movements.len() as u64) < total;
        Self {
            movements,
            total,
            pagination,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_caps_the_limit() {
        assert_eq!(Pagination::new(Some(5_000), None).limit, Pagination::MAX_LIMIT);
        assert_eq!(Pagination::new(None, Some(3)), Pagination { limit: 50, offset: 3 });
    }

    #[test]
    fn window_skips_and_takes() {
        let items = vec![1, 2, 3, 4, 5];
        let page = Pagination { limit: 2, offset: 1 };
        assert_eq!(page.window(&items), vec![2, 3]);
        assert!(Pagination { limit: 2, offset: 9 }.window(&items).is_empty());
    }

    #[test]
    fn has_more_reflects_remaining_rows() {
        let page = MovementPage::new(Vec::new(), 0, Pagination::default());
        assert!(!page.has_more);

        let page = MovementPage::new(Vec::new(), 10, Pagination { limit: 5, offset: 0 });
        assert!(page.has_more);
    }
}
