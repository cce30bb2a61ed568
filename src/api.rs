use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::store::ChallengeDirectory;
use crate::{err_sync, info_sync, Error};

/// Read-only HTTP surface next to the bot. Every response is JSON with
/// status 200; logical errors are payload-encoded, not status-encoded.
#[derive(Clone)]
pub struct ApiState {
    pub directory: Arc<dyn ChallengeDirectory>,
}

pub fn router(directory: Arc<dyn ChallengeDirectory>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ping", get(ping))
        .route("/leaderboard", get(leaderboard))
        .route("/hall_of_fame", get(hall_of_fame))
        .with_state(ApiState { directory })
}

/// Bind and serve until the process exits.
pub async fn serve(addr: &str, directory: Arc<dyn ChallengeDirectory>) -> Result<(), Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info_sync!("Query service listening on {}", addr);
    axum::serve(listener, router(directory)).await?;
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "TalAIt bot API is running" }))
}

async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn leaderboard(State(state): State<ApiState>) -> Json<Value> {
    match state.directory.leaderboard().await {
        Ok(Some(rows)) => Json(json!({ "leaderboard": rows })),
        Ok(None) => Json(json!({ "error": "Leaderboard method not found" })),
        Err(e) => {
            err_sync!("Error fetching leaderboard: {}", e);
            Json(json!({ "error": e.to_string() }))
        }
    }
}

async fn hall_of_fame(State(state): State<ApiState>) -> Json<Value> {
    match state.directory.hall_of_fame().await {
        Ok(Some(rows)) => Json(json!({ "hall_of_fame": rows })),
        Ok(None) => Json(json!({ "error": "Hall of Fame method not found" })),
        Err(e) => {
            err_sync!("Error fetching hall of fame: {}", e);
            Json(json!({ "error": e.to_string() }))
        }
    }
}

#[cfg(test)]
mod tests {
    use poise::serenity_prelude::async_trait;

    use super::*;
    use crate::model::{Challenge, SubmissionActivity};
    use crate::Res;

    struct MockDirectory {
        leaderboard: Result<Option<Value>, &'static str>,
        hall_of_fame: Result<Option<Value>, &'static str>,
    }

    #[async_trait]
    impl ChallengeDirectory for MockDirectory {
        async fn get_active_challenge(&self) -> Result<Option<Challenge>, Error> {
            Ok(None)
        }

        async fn get_latest_challenge(&self) -> Result<Option<Challenge>, Error> {
            Ok(None)
        }

        async fn record_submission(&self, _activity: &SubmissionActivity) -> Res {
            Ok(())
        }

        async fn leaderboard(&self) -> Result<Option<Value>, Error> {
            self.leaderboard.clone().map_err(Into::into)
        }

        async fn hall_of_fame(&self) -> Result<Option<Value>, Error> {
            self.hall_of_fame.clone().map_err(Into::into)
        }
    }

    fn state(
        leaderboard: Result<Option<Value>, &'static str>,
        hall_of_fame: Result<Option<Value>, &'static str>,
    ) -> ApiState {
        ApiState {
            directory: Arc::new(MockDirectory {
                leaderboard,
                hall_of_fame,
            }),
        }
    }

    #[tokio::test]
    async fn root_and_ping_are_static() {
        assert_eq!(root().await.0["message"], "TalAIt bot API is running");
        assert_eq!(ping().await.0["status"], "ok");
    }

    #[tokio::test]
    async fn leaderboard_rows_are_wrapped_in_the_payload() {
        let rows = json!([{ "username": "alice", "wins": 2 }]);
        let Json(v) = leaderboard(State(state(Ok(Some(rows)), Ok(None)))).await;
        assert_eq!(v["leaderboard"][0]["username"], "alice");
    }

    #[tokio::test]
    async fn missing_capability_is_a_payload_error() {
        let Json(v) = leaderboard(State(state(Ok(None), Ok(None)))).await;
        assert_eq!(v["error"], "Leaderboard method not found");

        let Json(v) = hall_of_fame(State(state(Ok(None), Ok(None)))).await;
        assert_eq!(v["error"], "Hall of Fame method not found");
    }

    #[tokio::test]
    async fn store_errors_are_payload_encoded() {
        let Json(v) = hall_of_fame(State(state(Ok(None), Err("store is down")))).await;
        assert_eq!(v["error"], "store is down");
    }
}
