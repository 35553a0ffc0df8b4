use chrono::{DateTime, Utc};
use common::history::{ChangeRecord, HistoricLevel};
use common::{ChangeKind, ListTag, Role};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(String);

/// Status enums stored as upper-case TEXT columns.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownStatus;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                match value.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownStatus(value)),
                }
            }
        }
    };
}

text_enum!(SubmissionStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

text_enum!(RecordStatus {
    Completed => "COMPLETED",
    InProgress => "IN_PROGRESS",
});

text_enum!(FriendshipStatus {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
});

text_enum!(LayoutStatus {
    Open => "OPEN",
    Finished => "FINISHED",
});

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub id: Uuid,
    pub name: String,
    pub creator: String,
    pub verifier: String,
    pub video_id: String,
    /// The level's id in the game itself
    pub level_id: Option<i32>,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub list: ListTag,
    pub placement: i32,
    pub created_at: DateTime<Utc>,
}

impl From<Level> for HistoricLevel {
    fn from(level: Level) -> Self {
        HistoricLevel {
            id: level.id,
            name: level.name,
            creator: level.creator,
            verifier: level.verifier,
            video_id: level.video_id,
            placement: level.placement,
            reconstructed: false,
        }
    }
}

/// A completion shown on a level's page.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LevelRecord {
    pub id: Uuid,
    pub username: String,
    pub percent: i32,
    pub video_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelDetail {
    #[serde(flatten)]
    pub level: Level,
    pub records: Vec<LevelRecord>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ListChange {
    pub id: i64,
    #[sqlx(try_from = "String")]
    pub kind: ChangeKind,
    pub description: String,
    pub level_id: Uuid,
    pub level_name: String,
    pub old_placement: Option<i32>,
    pub new_placement: Option<i32>,
    #[sqlx(try_from = "String")]
    pub list: ListTag,
    pub created_at: DateTime<Utc>,
}

impl From<ListChange> for ChangeRecord {
    fn from(change: ListChange) -> Self {
        ChangeRecord {
            kind: change.kind,
            level_id: change.level_id,
            level_name: change.level_name,
            old_placement: change.old_placement,
            new_placement: change.new_placement,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStat {
    pub user_id: Uuid,
    pub username: String,
    pub score: f64,
    pub rank: Option<i32>,
    pub hardest_level_id: Option<Uuid>,
    pub hardest_name: Option<String>,
    pub hardest_placement: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub level_id: Uuid,
    pub percent: i32,
    pub video_id: String,
    pub comment: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: SubmissionStatus,
    pub reviewer_id: Option<Uuid>,
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PersonalRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub level_name: String,
    pub level_id: Option<Uuid>,
    pub placement: i32,
    pub percent: i32,
    #[sqlx(try_from = "String")]
    pub status: RecordStatus,
    pub video_id: Option<String>,
    pub attempts: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub addressee_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: FriendshipStatus,
    pub created_at: DateTime<Utc>,
}

/// The other side of a friendship, from the caller's point of view.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub friendship_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub video_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: LayoutStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: Uuid,
    pub username: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDetail {
    #[serde(flatten)]
    pub layout: Layout,
    pub collaborators: Vec<Collaborator>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_round_trip() {
        assert_eq!(RecordStatus::InProgress.as_str(), "IN_PROGRESS");
        assert_eq!(
            RecordStatus::try_from("IN_PROGRESS".to_string()).unwrap(),
            RecordStatus::InProgress
        );
        assert!(SubmissionStatus::try_from("pending".to_string()).is_err());
    }

    #[test]
    fn test_status_serde_matches_column_text() {
        assert_eq!(
            serde_json::to_string(&RecordStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert_eq!(
            serde_json::from_str::<LayoutStatus>("\"FINISHED\"").unwrap(),
            LayoutStatus::Finished
        );
    }
}
