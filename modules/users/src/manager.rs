//! User domain operations
//!
//! Every mutation commits to the repository first and only then publishes
//! its lifecycle event, so a failed precondition never emits anything.

use chrono::Utc;
use platform_contracts::UserEvent;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AdminSeed;
use crate::error::UserError;
use crate::events::EventPublisher;
use crate::models::{User, UserChanges, UserCreate, UserRole, UserUpdate};
use crate::password::{hash_password, verify_password, PasswordPolicy};
use crate::repos::{RepoError, UserRepository};

pub struct UserManager {
    repo: Arc<dyn UserRepository>,
    events: EventPublisher,
    passwords: PasswordPolicy,
}

impl UserManager {
    pub fn new(repo: Arc<dyn UserRepository>, events: EventPublisher, passwords: PasswordPolicy) -> Self {
        Self {
            repo,
            events,
            passwords,
        }
    }

    /// Register a user and announce it with `user.created`.
    ///
    /// `data.password` may be absent only for users replayed from an event;
    /// such users cannot log in until an admin resets their password.
    pub async fn register_user(&self, data: UserCreate) -> Result<User, UserError> {
        let username = validate_username(&data.username)?;
        let email = validate_email(&data.email)?;

        if self.repo.get_by_username(&username).await?.is_some() {
            return Err(UserError::DuplicateUsername);
        }
        if let Some(id) = &data.id {
            if self.repo.get(id).await?.is_some() {
                return Err(UserError::AlreadyExists(id.clone()));
            }
        }

        let password_hash = match &data.password {
            Some(password) => Some(self.hash(password)?),
            None => None,
        };

        let now = Utc::now();
        let user = User {
            id: data.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            username,
            email,
            password_hash,
            role: data.role.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let user = match self.repo.create(user).await {
            Ok(user) => user,
            // Lost a race with a concurrent registration
            Err(RepoError::Conflict(_)) => return Err(UserError::DuplicateUsername),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        self.events
            .publish_user_event(UserEvent::UserCreated {
                user_id: user.id.clone(),
                username: user.username.clone(),
                email: user.email.clone(),
            })
            .await;

        Ok(user)
    }

    pub async fn authenticate_user(&self, username: &str, password: &str) -> Result<User, UserError> {
        let user = self
            .repo
            .get_by_username(username)
            .await?
            .ok_or(UserError::InvalidCredentials)?;

        let Some(hash) = user.password_hash.as_deref() else {
            return Err(UserError::InvalidCredentials);
        };

        if verify_password(&self.passwords, password, hash).map_err(UserError::PasswordHash)? {
            Ok(user)
        } else {
            Err(UserError::InvalidCredentials)
        }
    }

    pub async fn get_user(&self, id: &str) -> Result<User, UserError> {
        self.repo.get(id).await?.ok_or(UserError::NotFound)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, UserError> {
        Ok(self.repo.get_by_username(username).await?)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, UserError> {
        Ok(self.repo.list().await?)
    }

    /// Apply a sparse update; a new password is re-hashed.
    pub async fn update_user(&self, id: &str, data: UserUpdate) -> Result<User, UserError> {
        let mut changes = UserChanges {
            role: data.role,
            ..Default::default()
        };

        if let Some(username) = data.username {
            let username = validate_username(&username)?;
            if let Some(existing) = self.repo.get_by_username(&username).await? {
                if existing.id != id {
                    return Err(UserError::DuplicateUsername);
                }
            }
            changes.username = Some(username);
        }
        if let Some(email) = data.email {
            changes.email = Some(validate_email(&email)?);
        }
        if let Some(password) = data.password {
            changes.password_hash = Some(self.hash(&password)?);
        }

        match self.repo.update(id, changes).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(UserError::NotFound),
            Err(RepoError::Conflict(_)) => Err(UserError::DuplicateUsername),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a user and announce it with `user.deleted`.
    pub async fn delete_user(&self, id: &str) -> Result<(), UserError> {
        if !self.repo.delete(id).await? {
            return Err(UserError::NotFound);
        }

        tracing::info!(user_id = %id, "User deleted");
        self.events
            .publish_user_event(UserEvent::UserDeleted {
                user_id: id.to_string(),
            })
            .await;

        Ok(())
    }

    /// Create the configured administrator unless the username is taken.
    ///
    /// An existing account is left as it is, admin or not.
    pub async fn ensure_admin(&self, seed: &AdminSeed) -> Result<User, UserError> {
        if let Some(existing) = self.repo.get_by_username(seed.username.trim()).await? {
            if !existing.is_admin() {
                tracing::warn!(username = %existing.username, "ADMIN_USERNAME belongs to a non-admin user, not promoting");
            }
            return Ok(existing);
        }

        let data = UserCreate {
            username: seed.username.clone(),
            email: seed.email.clone(),
            password: Some(seed.password.clone()),
            role: Some(UserRole::Admin),
            ..Default::default()
        };
        match self.register_user(data).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, username = %user.username, "Seeded admin user");
                Ok(user)
            }
            // Another instance seeded it first
            Err(UserError::DuplicateUsername) => self
                .repo
                .get_by_username(seed.username.trim())
                .await?
                .ok_or(UserError::NotFound),
            Err(e) => Err(e),
        }
    }

    fn hash(&self, password: &str) -> Result<String, UserError> {
        if password.is_empty() {
            return Err(UserError::Validation("password must not be empty".to_string()));
        }
        hash_password(&self.passwords, password).map_err(UserError::PasswordHash)
    }
}

fn validate_username(username: &str) -> Result<String, UserError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(UserError::Validation("username must not be empty".to_string()));
    }
    Ok(username.to_string())
}

fn validate_email(email: &str) -> Result<String, UserError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email.to_string()),
        _ => Err(UserError::Validation(format!("invalid email address: {}", email))),
    }
}
