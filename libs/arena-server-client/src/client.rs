use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use types_rs::arena::{
    api::{BattleSummary, CastVoteRequest, VoteReceipt, VoterStats, VoterVotes, VOTER_ID_HEADER},
    BattleId, NewBattle, Tally, VoterId,
};

use crate::result::{Error, Result};

/// A client for the arena server.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,

    /// Bearer token sent on admin routes.
    admin_token: Option<String>,

    http: reqwest::Client,
}

impl Client {
    /// Create a new client with the given base URL.
    ///
    /// # Example
    ///
    /// ```
    /// # use arena_server_client::Client;
    /// let base_url = "http://localhost:8000".parse().unwrap();
    /// let client = Client::new(base_url);
    /// ```
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            admin_token: None,
            http: reqwest::Client::new(),
        }
    }

    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Use `admin_token` for the admin routes.
    #[must_use]
    pub fn with_admin_token(mut self, admin_token: impl Into<String>) -> Self {
        self.admin_token = Some(admin_token.into());
        self
    }

    /// Check that the server is responding.
    pub async fn check_status(&self) -> Result<()> {
        let response = self.request(Method::GET, &["api", "status"])?.send().await?;
        response.error_for_status()?;
        Ok(())
    }

    /// List active battles, newest first.
    pub async fn list_battles(&self) -> Result<Vec<BattleSummary>> {
        let response = self.request(Method::GET, &["api", "battles"])?.send().await?;
        parse(response, || "failed to list battles".to_owned()).await
    }

    /// Get a battle by its ID, or `None` if there is no such battle.
    ///
    /// # Example
    ///
    /// ```
    /// # use arena_server_client::Client;
    /// # async {
    /// # let client = Client::new("http://localhost:8000".parse().unwrap());
    /// let battle = client
    ///     .get_battle("00000000-0000-0000-0000-000000000000".parse().unwrap())
    ///     .await
    ///     .unwrap();
    /// # };
    /// ```
    pub async fn get_battle(&self, battle_id: BattleId) -> Result<Option<BattleSummary>> {
        let battle_id = battle_id.to_string();
        let response = self
            .request(Method::GET, &["api", "battles", &battle_id])?
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        parse(response, || format!("failed to get battle {battle_id}"))
            .await
            .map(Some)
    }

    /// Get the current counts of a battle.
    pub async fn get_tally(&self, battle_id: BattleId) -> Result<Tally> {
        let battle_id = battle_id.to_string();
        let response = self
            .request(Method::GET, &["api", "battles", &battle_id, "tally"])?
            .send()
            .await?;
        parse(response, || format!("failed to get tally of battle {battle_id}")).await
    }

    /// Cast `voter_id`'s vote. `choice` is sent as given so the server can
    /// reject anything but `"a"` or `"b"`.
    pub async fn cast_vote(
        &self,
        battle_id: BattleId,
        voter_id: &VoterId,
        choice: &str,
    ) -> Result<VoteReceipt> {
        let battle_id = battle_id.to_string();
        let response = self
            .request(Method::POST, &["api", "battles", &battle_id, "votes"])?
            .header(VOTER_ID_HEADER, voter_id.as_str())
            .json(&CastVoteRequest {
                choice: choice.to_owned(),
            })
            .send()
            .await?;
        parse(response, || {
            format!("failed to cast vote in battle {battle_id} for voter {voter_id}")
        })
        .await
    }

    /// Get the choices `voter_id` has made, keyed by battle.
    pub async fn get_voter_votes(&self, voter_id: &VoterId) -> Result<VoterVotes> {
        let response = self
            .request(Method::GET, &["api", "voters", voter_id.as_str(), "votes"])?
            .send()
            .await?;
        parse(response, || format!("failed to get votes of voter {voter_id}")).await
    }

    pub async fn get_voter_stats(&self, voter_id: &VoterId) -> Result<VoterStats> {
        let response = self
            .request(Method::GET, &["api", "voters", voter_id.as_str(), "stats"])?
            .send()
            .await?;
        parse(response, || format!("failed to get stats of voter {voter_id}")).await
    }

    /// Create a battle. Requires an admin token.
    pub async fn create_battle(&self, new_battle: &NewBattle) -> Result<BattleSummary> {
        let response = self
            .admin_request(Method::POST, &["api", "admin", "battles"])?
            .json(new_battle)
            .send()
            .await?;
        parse(response, || {
            format!("failed to create battle {:?}", new_battle.title)
        })
        .await
    }

    /// Close a battle for good. Requires an admin token.
    pub async fn deactivate_battle(&self, battle_id: BattleId) -> Result<BattleSummary> {
        let battle_id = battle_id.to_string();
        let response = self
            .admin_request(
                Method::POST,
                &["api", "admin", "battles", &battle_id, "deactivate"],
            )?
            .send()
            .await?;
        parse(response, || format!("failed to deactivate battle {battle_id}")).await
    }

    /// Rewrite a battle's counts from its vote ledger. Requires an admin
    /// token.
    pub async fn reconcile_battle(&self, battle_id: BattleId) -> Result<Tally> {
        let battle_id = battle_id.to_string();
        let response = self
            .admin_request(
                Method::POST,
                &["api", "admin", "battles", &battle_id, "reconcile"],
            )?
            .send()
            .await?;
        parse(response, || format!("failed to reconcile battle {battle_id}")).await
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidBaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        Ok(self.http.request(method, self.url(segments)?))
    }

    fn admin_request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let mut request = self.request(method, segments)?;

        if let Some(ref admin_token) = self.admin_token {
            request = request.bearer_auth(admin_token);
        }

        Ok(request)
    }
}

async fn parse<T: DeserializeOwned>(
    response: Response,
    context: impl FnOnce() -> String,
) -> Result<T> {
    let status_code = response.status();

    if status_code.is_success() {
        return Ok(response.json().await?);
    }

    let text = response.text().await?;
    Err(Error::from_response(status_code, text, context()))
}
