//! Typed builder for User.

use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::crypto::Crypto;
use crate::user::{Role, User, UserService};

const DEFAULT_LOCALE: &str = "en";

/// [`User`] builder.
///
/// `Email` and `Password` are typestate parameters: `build` is only
/// available once both have been provided.
#[derive(Debug, Clone)]
pub struct UserBuilder<Email, Password> {
    email: Email,
    password: Password,
    username: String,
    role: Role,
    locale: String,
    company: Option<String>,
    phone: Option<String>,
    ip: Option<String>,
}

/// Value is missing on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Missing;

/// Value is present on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Present<T>(pub T);

impl UserBuilder<Missing, Missing> {
    /// Create a new [`UserBuilder`].
    pub fn new() -> Self {
        Self {
            email: Missing,
            password: Missing,
            username: String::default(),
            role: Role::Customer,
            locale: DEFAULT_LOCALE.to_string(),
            company: None,
            phone: None,
            ip: None,
        }
    }
}

impl Default for UserBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Password> UserBuilder<Missing, Password> {
    /// Update `email` field on [`UserBuilder`].
    pub fn email(
        self,
        email: impl Into<String>,
    ) -> UserBuilder<Present<String>, Password> {
        UserBuilder {
            email: Present(email.into()),
            password: self.password,
            username: self.username,
            role: self.role,
            locale: self.locale,
            company: self.company,
            phone: self.phone,
            ip: self.ip,
        }
    }
}

impl<Email> UserBuilder<Email, Missing> {
    /// Update `password` field on [`UserBuilder`].
    pub fn password(
        self,
        password: impl Into<String>,
    ) -> UserBuilder<Email, Present<String>> {
        UserBuilder {
            email: self.email,
            password: Present(password.into()),
            username: self.username,
            role: self.role,
            locale: self.locale,
            company: self.company,
            phone: self.phone,
            ip: self.ip,
        }
    }
}

impl<Email, Password> UserBuilder<Email, Password> {
    /// Update `username` field on [`UserBuilder`].
    pub fn username(mut self, username: impl ToString) -> Self {
        self.username = username.to_string();
        self
    }

    /// Update `role` field on [`UserBuilder`].
    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Update `locale` field on [`UserBuilder`].
    pub fn locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale.unwrap_or(DEFAULT_LOCALE.to_string());
        self
    }

    /// Update `company` field on [`UserBuilder`].
    pub fn company(mut self, company: Option<String>) -> Self {
        self.company = company;
        self
    }

    /// Update `phone` field on [`UserBuilder`].
    pub fn phone(mut self, phone: Option<String>) -> Self {
        self.phone = phone;
        self
    }

    /// Update `ip` field on [`UserBuilder`].
    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }
}

impl UserBuilder<Present<String>, Present<String>> {
    /// Build a [`User`] with `email` and `password`.
    pub fn build(
        self,
        pool: Pool<Postgres>,
        crypto: Arc<Crypto>,
    ) -> UserService {
        let user = User {
            username: self.username,
            email: self.email.0,
            password: self.password.0,
            role: self.role,
            locale: self.locale,
            company: self.company,
            phone: self.phone,
            ip: self.ip,
            ..Default::default()
        };

        UserService::new(user, pool, crypto)
    }
}
