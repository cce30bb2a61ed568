use chrono::Utc;
use const_format::formatcp;
use poise::serenity_prelude::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::Config;
use crate::model::{Challenge, NewSubmission, Status, Submission, SubmissionActivity};
use crate::{Error, Res};

/// PostgREST surface of the hosted store.
const REST_PREFIX: &str = "/rest/v1";
const SUBMISSIONS: &str = formatcp!("{REST_PREFIX}/submissions");
const CHALLENGES: &str = formatcp!("{REST_PREFIX}/challenges");
const ACTIVITY: &str = formatcp!("{REST_PREFIX}/submission_activity");
const RPC: &str = formatcp!("{REST_PREFIX}/rpc");

/// Result of inserting a submission row. The submissions table carries a
/// uniqueness constraint on (challenge_id, user_id); a conflict from the
/// store is the authoritative "already submitted" signal, closing the race
/// the pre-insert existence check alone would leave open.
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(Submission),
    Duplicate,
}

/// Row operations on the submissions table.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn find_submission(
        &self,
        challenge_id: i64,
        user_id: &str,
    ) -> Result<Option<Submission>, Error>;

    async fn insert_submission(&self, row: &NewSubmission) -> Result<InsertOutcome, Error>;

    /// All submissions for a challenge, oldest first.
    async fn list_submissions(&self, challenge_id: i64) -> Result<Vec<Submission>, Error>;

    /// Set the status of the row matching (challenge, user). Returns the
    /// updated row, or `None` when the user has no submission there.
    async fn update_status(
        &self,
        challenge_id: i64,
        user_id: &str,
        status: Status,
    ) -> Result<Option<Submission>, Error>;
}

/// Challenge reference data plus the auxiliary application state the bot
/// keeps next to it (bookkeeping, aggregate views).
#[async_trait]
pub trait ChallengeDirectory: Send + Sync {
    /// Best-effort lookups; `None` aborts the calling flow with a
    /// user-visible "no challenge" message.
    async fn get_active_challenge(&self) -> Result<Option<Challenge>, Error>;
    async fn get_latest_challenge(&self) -> Result<Option<Challenge>, Error>;

    /// Bookkeeping write after a successful submission. Independent of the
    /// submissions insert; not transactional with it.
    async fn record_submission(&self, activity: &SubmissionActivity) -> Res;

    /// Aggregate views served by the query service. `None` means the store
    /// does not expose the aggregation at all.
    async fn leaderboard(&self) -> Result<Option<Value>, Error>;
    async fn hall_of_fame(&self) -> Result<Option<Value>, Error>;
}

/// Handle to the hosted store. Constructed once at startup from the two
/// connection secrets and shared by the bot and the query service; all
/// consistency is the store's problem, we hold no client-side locks.
pub struct Supabase {
    base: String,
    http: reqwest::Client,
}

impl Supabase {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let key = HeaderValue::from_str(&config.supabase_key)
            .map_err(|_| "SUPABASE_KEY contains invalid header characters")?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.supabase_key))
            .map_err(|_| "SUPABASE_KEY contains invalid header characters")?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        Ok(Self {
            base: config.supabase_url.clone(),
            http: reqwest::Client::builder().default_headers(headers).build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Call a store-side function. PostgREST answers 404 for a function
    /// that does not exist, which we surface as `None` rather than an error.
    async fn call_rpc(&self, function: &str) -> Result<Option<Value>, Error> {
        let response = self
            .http
            .post(format!("{}/{}", self.url(RPC), function))
            .json(&json!({}))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(format!("{} rpc failed ({}): {}", function, status, body).into());
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| format!("malformed {} response: {}", function, e).into())
    }
}

/// Read rows out of a 2xx response; anything else becomes an error carrying
/// the response body text.
async fn read_rows<T: DeserializeOwned>(response: reqwest::Response) -> Result<Vec<T>, Error> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(format!("store request failed ({}): {}", status, body).into());
    }
    parse_rows(&body)
}

/// PostgREST answers every row request with a JSON array.
fn parse_rows<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, Error> {
    serde_json::from_str(body).map_err(|e| format!("malformed store response: {}", e).into())
}

#[async_trait]
impl SubmissionStore for Supabase {
    async fn find_submission(
        &self,
        challenge_id: i64,
        user_id: &str,
    ) -> Result<Option<Submission>, Error> {
        let response = self
            .http
            .get(self.url(SUBMISSIONS))
            .query(&[
                ("challenge_id", format!("eq.{}", challenge_id)),
                ("user_id", format!("eq.{}", user_id)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        Ok(read_rows::<Submission>(response).await?.into_iter().next())
    }

    async fn insert_submission(&self, row: &NewSubmission) -> Result<InsertOutcome, Error> {
        let response = self
            .http
            .post(self.url(SUBMISSIONS))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Ok(InsertOutcome::Duplicate);
        }

        read_rows::<Submission>(response)
            .await?
            .into_iter()
            .next()
            .map(InsertOutcome::Inserted)
            .ok_or_else(|| "store returned no row for the inserted submission".into())
    }

    async fn list_submissions(&self, challenge_id: i64) -> Result<Vec<Submission>, Error> {
        let response = self
            .http
            .get(self.url(SUBMISSIONS))
            .query(&[
                ("challenge_id", format!("eq.{}", challenge_id)),
                ("order", "created_at.asc".to_string()),
            ])
            .send()
            .await?;

        read_rows(response).await
    }

    async fn update_status(
        &self,
        challenge_id: i64,
        user_id: &str,
        status: Status,
    ) -> Result<Option<Submission>, Error> {
        let response = self
            .http
            .patch(self.url(SUBMISSIONS))
            .header("Prefer", "return=representation")
            .query(&[
                ("challenge_id", format!("eq.{}", challenge_id)),
                ("user_id", format!("eq.{}", user_id)),
            ])
            .json(&json!({
                "status": status,
                "updated_at": Utc::now(),
            }))
            .send()
            .await?;

        // An empty array means no row matched.
        Ok(read_rows::<Submission>(response).await?.into_iter().next())
    }
}

#[async_trait]
impl ChallengeDirectory for Supabase {
    async fn get_active_challenge(&self) -> Result<Option<Challenge>, Error> {
        let response = self
            .http
            .get(self.url(CHALLENGES))
            .query(&[("is_active", "eq.true"), ("limit", "1")])
            .send()
            .await?;

        Ok(read_rows::<Challenge>(response).await?.into_iter().next())
    }

    async fn get_latest_challenge(&self) -> Result<Option<Challenge>, Error> {
        let response = self
            .http
            .get(self.url(CHALLENGES))
            .query(&[("order", "week.desc"), ("limit", "1")])
            .send()
            .await?;

        Ok(read_rows::<Challenge>(response).await?.into_iter().next())
    }

    async fn record_submission(&self, activity: &SubmissionActivity) -> Res {
        let response = self.http.post(self.url(ACTIVITY)).json(activity).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(format!("bookkeeping write failed ({}): {}", status, body).into());
        }
        Ok(())
    }

    async fn leaderboard(&self) -> Result<Option<Value>, Error> {
        self.call_rpc("leaderboard").await
    }

    async fn hall_of_fame(&self) -> Result<Option<Value>, Error> {
        self.call_rpc("hall_of_fame").await
    }
}
