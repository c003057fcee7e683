use relaychat_shared::models::{
    ErrorBody, HistoryMessage, MessagesResponse, SearchResponse, SearchUser, UserProfile,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Relaychat API",
        version = "1.0.0",
        description = "API documentation for the Relaychat server"
    ),
    paths(
        crate::handlers::messages::get_messages,
        crate::handlers::search::search_users,
    ),
    components(
        schemas(
            ErrorBody,
            HistoryMessage,
            MessagesResponse,
            SearchResponse,
            SearchUser,
            UserProfile,
        )
    ),
    tags(
        (name = "Messages", description = "Conversation history endpoints"),
        (name = "Users", description = "User search endpoints")
    )
)]
pub struct ApiDoc;
