pub mod handlers;
pub mod routes;
pub mod server;

pub use routes::{match_route, Action, ROUTES};
pub use server::{serve, Api, AppState};
