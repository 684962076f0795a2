//! API Module
//!
//! Admin HTTP surface over the cache, the XP queue and the scheduler.
//!
//! # Endpoints
//! - `PUT /cache`, `GET /cache/:key`, `DELETE /cache/:key`, `DELETE /cache`
//! - `POST /xp`, `POST /xp/flush`
//! - `POST /tasks/run`, `POST /tasks/:id/run`
//! - `GET /stats`, `GET /health`

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
