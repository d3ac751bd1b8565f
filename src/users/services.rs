use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::users::dto::Credentials;
use crate::users::repo::{StoreError, UserStore};
use crate::users::repo_types::{NewUser, SafeUser};

/// Which account operation produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Login,
    Fetch,
    Delete,
    Reset,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("User not found")]
    NotFound,
    #[error("{}", persistence_message(.0))]
    Persistence(Operation),
}

fn persistence_message(op: &Operation) -> &'static str {
    match op {
        Operation::Create => "Could not save user",
        Operation::Login => "Login failed",
        Operation::Fetch => "Failed to retrieve user",
        Operation::Delete => "Failed to delete user",
        Operation::Reset => "Failed to update user",
    }
}

fn persistence(op: Operation, e: StoreError) -> AccountError {
    error!(error = %e, operation = ?op, "user store failure");
    AccountError::Persistence(op)
}

/// Account operations over an injected [`UserStore`].
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn UserStore>,
}

impl AccountService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, creds: Credentials) -> Result<SafeUser, AccountError> {
        let new_user = NewUser {
            username: creds.username,
            password: creds.password,
            date_joined: OffsetDateTime::now_utc(),
        };
        match self.store.insert(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, username = %user.username, "user created");
                Ok(user.into())
            }
            Err(StoreError::DuplicateUsername) => {
                warn!("username already exists");
                Err(AccountError::DuplicateUsername)
            }
            Err(e) => Err(persistence(Operation::Create, e)),
        }
    }

    /// Plaintext comparison; unknown user and wrong password are reported alike.
    pub async fn login(&self, creds: Credentials) -> Result<SafeUser, AccountError> {
        let user = self
            .store
            .find_by_username(&creds.username)
            .await
            .map_err(|e| persistence(Operation::Login, e))?;

        match user {
            Some(user) if user.password == creds.password => {
                info!(user_id = %user.id, "user logged in");
                Ok(user.into())
            }
            Some(user) => {
                warn!(user_id = %user.id, "login invalid password");
                Err(AccountError::InvalidCredentials)
            }
            None => {
                warn!("login unknown username");
                Err(AccountError::InvalidCredentials)
            }
        }
    }

    pub async fn get(&self, username: &str) -> Result<SafeUser, AccountError> {
        if username.is_empty() {
            return Err(AccountError::NotFound);
        }
        let user = self
            .store
            .find_by_username(username)
            .await
            .map_err(|e| persistence(Operation::Fetch, e))?
            .ok_or(AccountError::NotFound)?;
        debug!(user_id = %user.id, "user fetched");
        Ok(user.into())
    }

    pub async fn delete(&self, username: &str) -> Result<SafeUser, AccountError> {
        if username.is_empty() {
            return Err(AccountError::NotFound);
        }
        let user = self
            .store
            .delete_by_username(username)
            .await
            .map_err(|e| persistence(Operation::Delete, e))?
            .ok_or(AccountError::NotFound)?;
        info!(user_id = %user.id, "user deleted");
        Ok(user.into())
    }

    /// Replaces the password and returns the record as it is after the update.
    pub async fn reset_password(&self, creds: Credentials) -> Result<SafeUser, AccountError> {
        let user = self
            .store
            .update_password(&creds.username, &creds.password)
            .await
            .map_err(|e| persistence(Operation::Reset, e))?
            .ok_or(AccountError::NotFound)?;
        info!(user_id = %user.id, "password reset");
        Ok(user.into())
    }
}
