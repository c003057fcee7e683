use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Public profile of a user, as embedded in message history rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Unique identifier of the user.
    pub user_id: Uuid,
    /// Login handle.
    pub username: String,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    pub profile_picture: String,
}

/// One row of the user search response.
///
/// The search endpoint spells the id field `userID` while history rows use
/// `userId`; both spellings are load-bearing for existing consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SearchUser {
    /// Unique identifier of the user.
    #[serde(rename = "userID")]
    pub user_id: Uuid,
    /// Login handle.
    pub username: String,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    #[serde(rename = "profilePicture")]
    pub profile_picture: String,
}

/// Response body of `GET /api/search-user`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SearchResponse {
    /// Users whose username, email, or name matched the query.
    #[serde(rename = "queryResult")]
    pub query_result: Vec<SearchUser>,
}
