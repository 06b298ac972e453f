use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{RepoError, UserRepository};
use crate::models::{User, UserChanges};

/// Process-local user store for dev and tests
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, User>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn username_taken(users: &HashMap<String, User>, username: &str, except_id: &str) -> bool {
    users
        .values()
        .any(|u| u.username == username && u.id != except_id)
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, RepoError> {
        let mut users = self.lock();
        if users.contains_key(&user.id) {
            return Err(RepoError::Conflict(format!("id {}", user.id)));
        }
        if username_taken(&users, &user.username, &user.id) {
            return Err(RepoError::Conflict(format!("username {}", user.username)));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get(&self, id: &str) -> Result<Option<User>, RepoError> {
        Ok(self.lock().get(id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        Ok(self
            .lock()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>, RepoError> {
        let mut users: Vec<User> = self.lock().values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn update(&self, id: &str, changes: UserChanges) -> Result<Option<User>, RepoError> {
        let mut users = self.lock();
        if let Some(username) = &changes.username {
            if username_taken(&users, username, id) {
                return Err(RepoError::Conflict(format!("username {}", username)));
            }
        }

        let Some(user) = users.get_mut(id) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = Some(hash);
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, RepoError> {
        Ok(self.lock().remove(id).is_some())
    }

    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }

    async fn close(&self) {}
}
