pub mod rooms;
pub mod system;
pub mod users;

use axum::Router;

use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/rooms", rooms::router())
        .nest("/users", users::router())
        .merge(system::router())
}
