use crate::hub::RoomHub;
use crate::services::store::ChatStore;

// Application state shared across all routes and websocket connections.
#[derive(Clone, Default)]
pub struct AppState {
    pub(crate) store: ChatStore,
    pub(crate) hub: RoomHub,
}
