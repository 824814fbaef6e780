// HTTP control surface for the library dashboard

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
