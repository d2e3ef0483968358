use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::models::Account;

#[derive(Debug, Error)]
pub enum AccountStoreError {
    #[error("Account already exists for this phone")]
    AlreadyExists,

    #[error("Account store error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Persistence for verified accounts, keyed by normalized phone.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Account>, AccountStoreError>;

    /// Insert `account`; fails with `AlreadyExists` if the phone is taken.
    async fn create(&self, account: Account) -> Result<Account, AccountStoreError>;
}

#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: DashMap<String, Account>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Account>, AccountStoreError> {
        Ok(self.accounts.get(phone).map(|entry| entry.value().clone()))
    }

    async fn create(&self, account: Account) -> Result<Account, AccountStoreError> {
        match self.accounts.entry(account.phone.clone()) {
            Entry::Occupied(_) => Err(AccountStoreError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }
}
