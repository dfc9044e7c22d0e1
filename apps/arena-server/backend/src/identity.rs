//! Request extractors for who is calling.
//!
//! Voters are authenticated upstream; the identity provider forwards the
//! voter id in the [`VOTER_ID_HEADER`] header and this service trusts it.
//! Admins present the configured token as a bearer token.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use subtle::ConstantTimeEq;
use types_rs::arena::{api::VOTER_ID_HEADER, VoterId};

use crate::{error::Error, state::AppState, store::BattleStore};

/// The voter making the request, allowing handlers to require one by
/// including `Voter` in their signature.
#[derive(Debug, Clone)]
pub(crate) struct Voter(pub VoterId);

#[async_trait]
impl<St: Send + Sync> FromRequestParts<St> for Voter {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let voter_id = parts
            .headers
            .get(VOTER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| VoterId::try_from(value.trim()).ok())
            .ok_or(Error::Unauthorized("missing voter id"))?;

        Ok(Self(voter_id))
    }
}

/// Marker for a request carrying the admin token.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Admin;

#[async_trait]
impl<S: BattleStore> FromRequestParts<AppState<S>> for Admin {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        AppState { admin_token, .. }: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let Some(admin_token) = admin_token else {
            tracing::warn!("Rejecting admin request: no admin token configured");
            return Err(Error::Unauthorized("admin access is disabled"));
        };

        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| Error::Unauthorized("missing admin token"))?;

        if token_matches(bearer.token(), admin_token) {
            Ok(Self)
        } else {
            tracing::warn!("Rejecting admin request: wrong token");
            Err(Error::Unauthorized("invalid admin token"))
        }
    }
}

/// Compares in time independent of where the tokens first differ. Only the
/// length can leak.
fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::Request;

    use super::*;
    use crate::{memory::MemoryStore, rewards::RewardNotifier, vote::VoteService};

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut request = Request::builder().uri("/");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request.body(()).unwrap().into_parts().0
    }

    fn state(admin_token: Option<&str>) -> AppState<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let rewards: Arc<dyn RewardNotifier + Send + Sync> = store.clone();
        AppState::new(
            VoteService::new(store, rewards, 10),
            admin_token.map(str::to_owned),
        )
    }

    #[tokio::test]
    async fn test_voter_header() {
        let Voter(voter_id) =
            Voter::from_request_parts(&mut parts(&[(VOTER_ID_HEADER, "v1")]), &())
                .await
                .unwrap();
        assert_eq!(voter_id.as_str(), "v1");

        assert!(matches!(
            Voter::from_request_parts(&mut parts(&[]), &()).await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            Voter::from_request_parts(&mut parts(&[(VOTER_ID_HEADER, "  ")]), &()).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_token() {
        let state = state(Some("s3cret"));
        let auth = |token: &str| parts(&[("authorization", format!("Bearer {token}").as_str())]);

        assert!(Admin::from_request_parts(&mut auth("s3cret"), &state)
            .await
            .is_ok());
        assert!(matches!(
            Admin::from_request_parts(&mut auth("guess"), &state).await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            Admin::from_request_parts(&mut parts(&[]), &state).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_token_matches() {
        assert!(token_matches("s3cret", "s3cret"));
        assert!(!token_matches("s3cres", "s3cret"));
        assert!(!token_matches("s3cret-and-more", "s3cret"));
        assert!(!token_matches("", "s3cret"));
    }

    #[tokio::test]
    async fn test_admin_disabled_without_token() {
        for token in [None, Some("")] {
            let state = state(token);
            assert!(matches!(
                Admin::from_request_parts(&mut parts(&[("authorization", "Bearer ")]), &state)
                    .await,
                Err(Error::Unauthorized(_))
            ));
        }
    }
}
