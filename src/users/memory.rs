use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::users::repo::{StoreError, UserStore};
use crate::users::repo_types::{NewUser, User};

/// Process-local user store. Every operation runs under one short critical
/// section, so find-and-delete and find-and-update are atomic.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().map(|users| users.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, User>>, StoreError> {
        self.users
            .lock()
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("user store lock poisoned")))
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.lock()?;
        if users.contains_key(&user.username) {
            return Err(StoreError::DuplicateUsername);
        }
        let record = User {
            id: Uuid::new_v4(),
            username: user.username,
            password: user.password,
            date_joined: user.date_joined,
        };
        users.insert(record.username.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.get(username).cloned())
    }

    async fn delete_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.remove(username))
    }

    async fn update_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.lock()?;
        Ok(users.get_mut(username).map(|user| {
            user.password = password.to_string();
            user.clone()
        }))
    }
}
