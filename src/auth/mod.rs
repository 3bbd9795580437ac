//! Microsoft authentication.
//!
//! [`AuthState`] is the single owner of the current token. It is created at
//! startup from the [`TokenStore`], shared via `Arc` with the HTTP routes,
//! the socket adapter and the Graph client, and updated only through
//! [`AuthState::set`] and [`AuthState::clear`].

mod microsoft;
mod token_store;

pub use microsoft::{MicrosoftAuth, AUTHORITY, SCOPE};
pub use token_store::{TokenData, TokenStore};

use tokio::sync::RwLock;
use tracing::info;

use crate::error::Result;

/// Current token plus its backing store.
#[derive(Debug)]
pub struct AuthState {
    slot: RwLock<Option<TokenData>>,
    store: TokenStore,
}

impl AuthState {
    /// Load whatever token the store holds.
    pub fn load(store: TokenStore) -> Self {
        let token = store.load();
        if token.is_some() {
            info!(path = %store.path().display(), "Loaded stored Microsoft token");
        }
        Self {
            slot: RwLock::new(token),
            store,
        }
    }

    /// An empty state that never touched disk.
    pub fn empty(store: TokenStore) -> Self {
        Self {
            slot: RwLock::new(None),
            store,
        }
    }

    pub async fn access_token(&self) -> Option<String> {
        self.slot
            .read()
            .await
            .as_ref()
            .map(|token| token.access_token.clone())
    }

    pub async fn token(&self) -> Option<TokenData> {
        self.slot.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// Persist `token`, then make it current.
    pub async fn set(&self, token: TokenData) -> Result<()> {
        self.store.save(&token)?;
        *self.slot.write().await = Some(token);
        Ok(())
    }

    /// Forget the token and delete the store file.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear()?;
        *self.slot.write().await = None;
        Ok(())
    }
}
