//! # bubble-api - a retry-aware client for the Bubble data API
//!
//! Reads, writes and bulk-imports "things" (records of an application's data
//! types), runs backend workflows, and walks large result sets through lazy
//! cursor pagination. Built on `reqwest`, logged with `tracing`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bubble_api::{Client, Environment, Field, Query};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     #[serde(rename = "_id")]
//!     id: String,
//!     email: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bubble_api::Error> {
//!     let client = Client::builder()
//!         .base_url("https://myapp.bubbleapps.io")?
//!         .api_token("secret")
//!         .environment(Environment::Live)
//!         .build()?;
//!
//!     let id = client
//!         .create("User", &serde_json::json!({"email": "ada@example.com"}))
//!         .await?;
//!     let user: User = client.get_by_id("User", &id).await?;
//!     println!("{} <{}>", user.id, user.email);
//!
//!     let adults: Vec<User> = client
//!         .get_objects("User", Query::new().constraint(Field::new("Age").greater_than(17)))
//!         .await?;
//!     println!("{} adults", adults.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Retries
//!
//! Only transport-level failures are retried: network errors, timeouts and
//! 5xx responses. A 4xx fails on the first attempt. A request makes at most
//! `max_retries + 1` attempts, after which [`Error::MaxRetriesExceeded`]
//! carries the last failure.
//!
//! ```no_run
//! use bubble_api::{Client, RetryStrategy};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), bubble_api::Error> {
//! let client = Client::builder()
//!     .base_url("https://myapp.bubbleapps.io")?
//!     .retry_strategy(RetryStrategy::Power {
//!         base: Duration::from_secs(2),
//!         max_retries: 5,
//!     })
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pagination
//!
//! [`Client::cursor`] returns a [`ThingCursor`] that requests a page only when
//! the previous one is used up. [`Client::fetch_all`] can fetch pages with
//! several concurrent workers while keeping cursor order, and
//! [`Client::fetch_all_into`] streams pages into a [`RecordSink`] such as
//! [`CsvSink`].
//!
//! A synchronous API lives in [`blocking`].

pub mod blocking;
mod bulk;
mod client;
pub mod constraint;
mod error;
mod fanout;
mod field;
pub mod metadata;
mod query;
mod response;
pub mod retry;
mod sink;
mod things;
mod workflow;

pub use bulk::BulkItem;
pub use client::{Client, ClientBuilder, Environment, DEFAULT_API_VERSION};
pub use constraint::{Constraint, ConstraintType, ConstraintValue, ToConstraintValue};
pub use error::{Error, Result};
pub use field::{normalize_name, Field};
pub use metadata::{RequestBody, RequestMetadata};
pub use query::{Page, Query, ThingCursor, MAX_PAGE_SIZE};
pub use response::Response;
pub use retry::RetryStrategy;
pub use sink::{CsvSink, RecordSink};
pub use things::DeleteTarget;
