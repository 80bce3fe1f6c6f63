use std::sync::Arc;

use rand::RngCore;
use sqlx::{Pool, Postgres};

use crate::crypto::Crypto;
use crate::error::{Result, ServerError};
use crate::user::{Status, User, UserRepository};

/// User manager.
#[derive(Clone)]
pub struct UserService {
    pub repo: UserRepository,
    pub crypto: Arc<Crypto>,
    pub data: User,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(user: User, pool: Pool<Postgres>, crypto: Arc<Crypto>) -> Self {
        Self {
            data: user,
            repo: UserRepository::new(pool),
            crypto,
        }
    }

    /// Create builded user.
    ///
    /// Hash password and digest email before insertion.
    pub async fn create(mut self) -> Result<Self> {
        self.data.email_hash = self.crypto.digest(&self.data.email);
        self.data.password = self.crypto.hash_password(&self.data.password)?;

        let ip = self.data.ip.take();
        self.data = self.repo.insert(&self.data).await?;
        self.data.ip = ip;
        Ok(self)
    }

    /// Check credentials against the stored account.
    ///
    /// The same error covers unknown email and wrong password.
    pub async fn authenticate(mut self, password: &str) -> Result<Self> {
        let email_hash = self.crypto.digest(&self.data.email);
        let user = self
            .repo
            .find_by_email_hash(&email_hash)
            .await?
            .ok_or(ServerError::InvalidCredentials)?;

        if !self.crypto.verify_password(password, &user.password) {
            return Err(ServerError::InvalidCredentials);
        }

        if user.status == Status::Suspended {
            return Err(ServerError::Forbidden);
        }

        let ip = self.data.ip.take();
        self.data = user;
        self.data.ip = ip;
        Ok(self)
    }

    /// Generate a new opaque refresh token for the user.
    pub async fn generate_token(&self) -> Result<String> {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        self.repo
            .insert_token(&token, self.data.id, self.data.ip.clone())
            .await?;
        Ok(token)
    }

    /// Delete current user with retention.
    pub async fn delete(&self) -> Result<()> {
        self.repo.delete(self.data.id).await
    }
}
