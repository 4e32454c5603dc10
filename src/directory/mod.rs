//! User directory lookup.
//!
//! The mailer's collaborator for resolving a user identifier to an email
//! address. Host frameworks implement [`UserDirectory`] against their own
//! user model; [`StaticDirectory`] is a map-backed implementation for tests
//! and embedded use.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::MailResult;

/// A resolved user.
#[derive(Debug, Clone)]
pub struct User {
    /// Stable identifier.
    pub id: String,
    /// Login name.
    pub name: String,
    /// Email address, absent for accounts without one.
    pub email: Option<String>,
}

impl User {
    /// Creates a user with an email address.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: Some(email.into()),
        }
    }

    /// Creates a user without an email address.
    pub fn without_email(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
        }
    }
}

/// Resolves user identifiers to users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Looks a user up by id or name. Returns `None` when no user matches.
    async fn lookup(&self, user: &str) -> MailResult<Option<User>>;
}

/// Map-backed directory, keyed by both id and name.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user, indexed by id and by name.
    pub fn insert(&self, user: User) {
        let mut users = self.users.write().unwrap();
        users.insert(user.id.clone(), user.clone());
        users.insert(user.name.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn lookup(&self, user: &str) -> MailResult<Option<User>> {
        Ok(self.users.read().unwrap().get(user).cloned())
    }
}
