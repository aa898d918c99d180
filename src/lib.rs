//! Mockpoint - a mock HTTP endpoint server for tests
//!
//! Mockpoint imitates a third-party REST API during automated testing:
//! - Binds a pseudo-random localhost port so parallel test runs rarely collide
//! - Registers routes that answer with preconfigured JSON payloads
//! - Optionally hands each incoming request to a test-supplied inspector
//! - Releases the port on shutdown or drop
//!
//! ```no_run
//! use mockpoint::{Method, MockServer};
//! use serde_json::json;
//!
//! # async fn demo() -> mockpoint::Result<()> {
//! let server = MockServer::start("api/v1").await?;
//! server.route(Method::Get, "/users", json!({"id": 1})).await?;
//!
//! // GET http://localhost:<port>/api/v1/users now answers {"id":1}
//! let url = server.url("/users");
//! # drop(url);
//!
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod method;
pub mod route;
pub mod server;

pub use error::{Error, Result};
pub use method::Method;
pub use route::ReceivedRequest;
pub use server::{MockServer, PORT_MAX, PORT_MIN};
