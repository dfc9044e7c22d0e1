use std::sync::Arc;

use crate::{store::BattleStore, vote::VoteService};

/// Contains the application state, used by request handlers.
pub struct AppState<S> {
    /// Vote service wrapping the battle store.
    pub votes: Arc<VoteService<S>>,

    /// Token expected on admin routes. Admin routes are closed when unset.
    pub admin_token: Option<Arc<str>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            votes: Arc::clone(&self.votes),
            admin_token: self.admin_token.clone(),
        }
    }
}

impl<S: BattleStore> AppState<S> {
    pub fn new(votes: VoteService<S>, admin_token: Option<String>) -> Self {
        Self {
            votes: Arc::new(votes),
            admin_token: admin_token
                .filter(|token| !token.is_empty())
                .map(Arc::from),
        }
    }

    pub fn store(&self) -> &S {
        self.votes.store()
    }
}
