//! Switcher Admin Control Plane
//!
//! API key handling and the `/switcher-balance` routes used to inspect and
//! edit the node pool at runtime. Routes are served over plain method, path,
//! key and body inputs so the front end decides how they reach the network.

pub mod auth;
pub mod model;
pub mod routes;

pub use auth::{ApiKey, API_KEY_HEADER};
pub use routes::{AdminApi, AdminResponse, ADMIN_PREFIX, DEFAULT_CHECK_PATH};
