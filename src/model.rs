use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One weekly coding challenge. Reference data: the bot only ever reads
/// these rows; creating and retiring challenges is the web app's job.
#[derive(Clone, Debug, Deserialize)]
pub struct Challenge {
    pub id: i64,
    pub week: i64,
    pub title: String,
    pub difficulty: String,
    #[serde(default)]
    pub is_active: bool,
}

/// Review status of a submission.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, poise::ChoiceParameter)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[name = "Pending"]
    Pending,
    #[name = "Reviewed"]
    Reviewed,
    #[name = "Winner"]
    Winner,
}

impl Status {
    /// Capitalised form for user-facing messages.
    pub fn label(self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Reviewed => "Reviewed",
            Status::Winner => "Winner",
        }
    }
}

/// A stored submission row. `id` and the timestamps are assigned by the
/// store; `user_id` and `thread_id` are Discord snowflakes kept as text.
#[derive(Clone, Debug, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub challenge_id: i64,
    pub user_id: String,
    pub username: String,
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub notes: String,
    pub thread_id: String,
    pub status: Status,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new submission.
#[derive(Clone, Debug, Serialize)]
pub struct NewSubmission {
    pub challenge_id: i64,
    pub user_id: String,
    pub username: String,
    pub code: String,
    pub language: String,
    pub notes: String,
    pub thread_id: String,
    pub status: Status,
}

/// Bookkeeping record written after a successful submission. Lives in its
/// own table and is not transactional with the submissions insert; the two
/// may diverge on partial failure.
#[derive(Clone, Debug, Serialize)]
pub struct SubmissionActivity {
    pub challenge_id: i64,
    pub user_id: String,
    pub channel_id: String,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serialises_lowercase() {
        assert_eq!(serde_json::to_value(Status::Winner).unwrap(), "winner");
        let parsed: Status = serde_json::from_str("\"reviewed\"").unwrap();
        assert_eq!(parsed, Status::Reviewed);
    }

    #[test]
    fn status_labels_are_capitalised() {
        assert_eq!(Status::Pending.label(), "Pending");
        assert_eq!(Status::Winner.label(), "Winner");
    }
}
