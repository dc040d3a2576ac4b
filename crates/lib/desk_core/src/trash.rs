//! Trash: listing, restoring and purging soft-deleted records.
//!
//! Each [`TrashKind`] maps to one [`TrashBin`] in a [`TrashRegistry`] built at
//! startup. Requests name a kind; the registry resolves it once, so no
//! per-call dispatch on type strings happens past parsing.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::store::UserTrash;
use crate::uuid::is_uuid;

/// Trash errors.
#[derive(Debug, Error)]
pub enum TrashError {
    #[error("Invalid trash type: {0}")]
    UnknownKind(String),

    #[error("Item not found")]
    NotFound,

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// Kinds of soft-deletable records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrashKind {
    User,
}

impl TrashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrashKind::User => "user",
        }
    }
}

impl fmt::Display for TrashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrashKind {
    type Err = TrashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" | "users" => Ok(TrashKind::User),
            other => Err(TrashError::UnknownKind(other.to_string())),
        }
    }
}

/// One soft-deleted record as shown in the trash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashItem {
    pub id: String,
    pub kind: TrashKind,
    pub label: String,
    pub description: Option<String>,
    pub deleted_at: DateTime<Utc>,
}

/// Store accessor for one kind of soft-deleted record.
#[async_trait]
pub trait TrashBin: Send + Sync {
    /// Soft-deleted items, most recently deleted first.
    async fn list(&self) -> Result<Vec<TrashItem>, TrashError>;
    async fn restore(&self, id: &str) -> Result<bool, TrashError>;
    async fn purge(&self, id: &str) -> Result<bool, TrashError>;
}

/// Trash bin over soft-deleted users.
pub struct UserBin(pub Arc<dyn UserTrash>);

#[async_trait]
impl TrashBin for UserBin {
    async fn list(&self) -> Result<Vec<TrashItem>, TrashError> {
        Ok(self
            .0
            .list_deleted_users()
            .await?
            .into_iter()
            .map(|u| TrashItem {
                id: u.id,
                kind: TrashKind::User,
                label: u.email,
                description: u.full_name,
                deleted_at: u.deleted_at,
            })
            .collect())
    }

    async fn restore(&self, id: &str) -> Result<bool, TrashError> {
        self.0.restore_user(id).await
    }

    async fn purge(&self, id: &str) -> Result<bool, TrashError> {
        self.0.purge_user(id).await
    }
}

/// Kind → bin mapping.
#[derive(Clone, Default)]
pub struct TrashRegistry {
    bins: BTreeMap<TrashKind, Arc<dyn TrashBin>>,
}

impl TrashRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the user bin.
    pub fn with_users(users: Arc<dyn UserTrash>) -> Self {
        Self::new().register(TrashKind::User, Arc::new(UserBin(users)))
    }

    pub fn register(mut self, kind: TrashKind, bin: Arc<dyn TrashBin>) -> Self {
        self.bins.insert(kind, bin);
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = TrashKind> + '_ {
        self.bins.keys().copied()
    }

    fn bin(&self, kind: TrashKind) -> Result<&Arc<dyn TrashBin>, TrashError> {
        self.bins
            .get(&kind)
            .ok_or_else(|| TrashError::UnknownKind(kind.to_string()))
    }

    pub async fn list(&self, kind: TrashKind) -> Result<Vec<TrashItem>, TrashError> {
        self.bin(kind)?.list().await
    }

    pub async fn restore(&self, kind: TrashKind, id: &str) -> Result<(), TrashError> {
        let bin = self.bin(kind)?;
        if !is_uuid(id) || !bin.restore(id).await? {
            return Err(TrashError::NotFound);
        }
        info!(kind = %kind, id, "restored from trash");
        Ok(())
    }

    /// Permanently delete a soft-deleted item.
    pub async fn purge(&self, kind: TrashKind, id: &str) -> Result<(), TrashError> {
        let bin = self.bin(kind)?;
        if !is_uuid(id) || !bin.purge(id).await? {
            return Err(TrashError::NotFound);
        }
        info!(kind = %kind, id, "purged from trash");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::NewUser;
    use crate::models::rbac::NewRole;
    use crate::store::memory::MemoryStore;
    use crate::store::{RbacStore, UserStore};

    async fn deleted_user(store: &MemoryStore) -> String {
        store
            .create_role(NewRole {
                name: "customer".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let user = store
            .create_user(NewUser {
                email: "gone@x.com".into(),
                password_hash: "h".into(),
                full_name: Some("Gone".into()),
                role: "customer".into(),
            })
            .await
            .unwrap();
        store.soft_delete_user(&user.id, Utc::now()).await.unwrap();
        user.id
    }

    #[test]
    fn parses_kinds() {
        assert_eq!("user".parse::<TrashKind>().unwrap(), TrashKind::User);
        assert!(matches!(
            "ticket".parse::<TrashKind>(),
            Err(TrashError::UnknownKind(_))
        ));
        assert_eq!(TrashKind::User.to_string(), "user");
    }

    #[tokio::test]
    async fn unregistered_kind_is_rejected() {
        let registry = TrashRegistry::new();
        assert!(matches!(
            registry.list(TrashKind::User).await,
            Err(TrashError::UnknownKind(_))
        ));
    }

    #[tokio::test]
    async fn restore_brings_user_back() {
        let store = Arc::new(MemoryStore::new());
        let id = deleted_user(&store).await;
        let registry = TrashRegistry::with_users(store.clone());

        let items = registry.list(TrashKind::User).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "gone@x.com");

        registry.restore(TrashKind::User, &id).await.unwrap();
        assert!(registry.list(TrashKind::User).await.unwrap().is_empty());
        assert!(!store.find_user_by_id(&id).await.unwrap().unwrap().is_deleted());

        assert!(matches!(
            registry.restore(TrashKind::User, &id).await,
            Err(TrashError::NotFound)
        ));
    }

    #[tokio::test]
    async fn purge_removes_only_deleted_users() {
        let store = Arc::new(MemoryStore::new());
        let id = deleted_user(&store).await;
        let registry = TrashRegistry::with_users(store.clone());

        registry.purge(TrashKind::User, &id).await.unwrap();
        assert!(store.find_user_by_id(&id).await.unwrap().is_none());
        assert!(matches!(
            registry.purge(TrashKind::User, "not-a-uuid").await,
            Err(TrashError::NotFound)
        ));
    }
}
