use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::RngCore;
use tokio::sync::Mutex;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{SaleDraft, Session, User};

/// Login sessions, keyed by bearer token.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

impl SessionStore {
    pub async fn create(&self, user: User, lifetime: Duration) -> Session {
        let session = Session {
            token: generate_token(),
            user,
            valid_until: Utc::now() + lifetime,
            draft: SaleDraft::default(),
        };

        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, s| s.valid_until > Utc::now());
        sessions.insert(session.token.clone(), session.clone());

        session
    }

    /// Look up a session. Expired sessions are removed and reported as missing.
    pub async fn get(&self, token: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;

        match sessions.get(token) {
            Some(session) if session.valid_until > Utc::now() => Some(session.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    /// Change the sale draft of a session in place and return the result.
    ///
    /// The store stays locked while `update` runs. If it fails the draft is left unchanged.
    pub async fn update_draft<F>(&self, token: &str, update: F) -> ServiceResult<SaleDraft>
    where
        F: FnOnce(&mut SaleDraft) -> ServiceResult<()>,
    {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(token)
            .ok_or(ServiceError::Unauthorized("Missing login"))?;

        let mut draft = session.draft.clone();
        update(&mut draft)?;
        session.draft = draft.clone();

        Ok(draft)
    }

    /// Take the sale draft out of a session, leaving an empty one behind.
    pub async fn take_draft(&self, token: &str) -> ServiceResult<SaleDraft> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(token)
            .ok_or(ServiceError::Unauthorized("Missing login"))?;

        Ok(std::mem::take(&mut session.draft))
    }

    /// Put a taken draft back in front of anything added since. Does nothing if the session ended.
    pub async fn restore_draft(&self, token: &str, draft: SaleDraft) {
        if let Some(session) = self.sessions.lock().await.get_mut(token) {
            let added = std::mem::replace(&mut session.draft, draft);
            session.draft.merge(added);
        }
    }

    pub async fn remove(&self, token: &str) {
        self.sessions.lock().await.remove(token);
    }

    /// End all sessions of a user.
    pub async fn remove_user(&self, user_id: u64) {
        self.sessions
            .lock()
            .await
            .retain(|_, s| s.user.id != user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Product, Role};
    use rust_decimal_macros::dec;

    fn user(id: u64) -> User {
        User {
            id,
            username: format!("user{id}"),
            password_hash: String::new(),
            role: Role::Cashier,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = SessionStore::default();
        let session = store.create(user(1), Duration::minutes(5)).await;

        assert_eq!(store.get(&session.token).await, Some(session.clone()));
        assert_eq!(store.get("unknown").await, None);

        let other = store.create(user(1), Duration::minutes(5)).await;
        assert_ne!(session.token, other.token);
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped() {
        let store = SessionStore::default();
        let session = store.create(user(1), Duration::seconds(-1)).await;

        assert_eq!(store.get(&session.token).await, None);
    }

    #[tokio::test]
    async fn test_remove_user_sessions() {
        let store = SessionStore::default();
        let a = store.create(user(1), Duration::minutes(5)).await;
        let b = store.create(user(1), Duration::minutes(5)).await;
        let c = store.create(user(2), Duration::minutes(5)).await;

        store.remove_user(1).await;
        assert_eq!(store.get(&a.token).await, None);
        assert_eq!(store.get(&b.token).await, None);
        assert!(store.get(&c.token).await.is_some());

        store.remove(&c.token).await;
        assert_eq!(store.get(&c.token).await, None);
    }

    fn product(id: u64, name: &str, quantity: i32) -> Product {
        Product {
            id,
            barcode: None,
            name: name.to_owned(),
            price: dec!(1.50),
            quantity,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_update_draft() {
        let store = SessionStore::default();
        let session = store.create(user(1), Duration::minutes(5)).await;
        let coffee = product(7, "Coffee", 3);

        let draft = store
            .update_draft(&session.token, |d| d.add_product(&coffee, 2))
            .await
            .unwrap();
        assert_eq!(draft.items[0].quantity, 2);

        let result = store
            .update_draft(&session.token, |d| d.add_product(&coffee, 2))
            .await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));

        let session = store.get(&session.token).await.unwrap();
        assert_eq!(session.draft, draft);

        let result = store
            .update_draft("unknown", |d| d.add_product(&coffee, 1))
            .await;
        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_concurrent_draft_updates_are_kept() {
        let store = SessionStore::default();
        let session = store.create(user(1), Duration::minutes(5)).await;
        let coffee = product(7, "Coffee", 3);
        let mate = product(8, "Mate", 3);

        let (a, b) = tokio::join!(
            store.update_draft(&session.token, |d| d.add_product(&coffee, 1)),
            store.update_draft(&session.token, |d| d.add_product(&mate, 1)),
        );
        a.unwrap();
        b.unwrap();

        let draft = store.get(&session.token).await.unwrap().draft;
        assert_eq!(draft.items.len(), 2);
    }

    #[tokio::test]
    async fn test_take_and_restore_draft() {
        let store = SessionStore::default();
        let session = store.create(user(1), Duration::minutes(5)).await;
        let coffee = product(7, "Coffee", 5);
        let mate = product(8, "Mate", 5);

        store
            .update_draft(&session.token, |d| d.add_product(&coffee, 2))
            .await
            .unwrap();

        let taken = store.take_draft(&session.token).await.unwrap();
        assert_eq!(taken.items.len(), 1);
        assert!(store.get(&session.token).await.unwrap().draft.is_empty());

        // added while the taken draft was being checked out
        store
            .update_draft(&session.token, |d| d.add_product(&mate, 1))
            .await
            .unwrap();

        store.restore_draft(&session.token, taken).await;
        let draft = store.get(&session.token).await.unwrap().draft;
        assert_eq!(
            draft
                .items
                .iter()
                .map(|i| (i.product_id, i.quantity))
                .collect::<Vec<_>>(),
            vec![(7, 2), (8, 1)]
        );
    }
}
