//! A blocking data API client.
//!
//! [`Client`] wraps the async [`crate::Client`] and drives every call to
//! completion on its own current-thread runtime. Ordering and retry behavior
//! are the same as the async client; retry sleeps block the calling thread.
//!
//! Do not use it from inside an async runtime: blocking on a runtime from
//! within another one panics.
//!
//! # Examples
//!
//! ```no_run
//! use bubble_api::{blocking, Field, Query};
//!
//! # fn example() -> Result<(), bubble_api::Error> {
//! let client = blocking::Client::from_env()?;
//! let query = Query::new().constraint(Field::new("Status").equals("active"));
//! for order in client.iter::<serde_json::Value>("Order", query)? {
//!     println!("{}", order?["_id"]);
//! }
//! # Ok(())
//! # }
//! ```

use crate::{
    constraint::{Constraint, ToConstraintValue},
    query::{Page, Query, ThingCursor},
    things::DeleteTarget,
    BulkItem, Error, RecordSink, RequestMetadata, Response, Result,
};
use http::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use tokio::runtime::Runtime;

/// Synchronous counterpart of [`crate::Client`].
#[derive(Debug)]
pub struct Client {
    inner: crate::Client,
    runtime: Runtime,
}

impl Client {
    /// Wraps an async client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the runtime cannot be started.
    pub fn new(inner: crate::Client) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::ConfigurationError(format!("Failed to start blocking runtime: {}", e))
            })?;
        Ok(Self { inner, runtime })
    }

    /// See [`crate::Client::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(crate::Client::from_env()?)
    }

    /// The wrapped async client.
    pub fn inner(&self) -> &crate::Client {
        &self.inner
    }

    fn block_on<F, T>(&self, future: F) -> T
    where
        F: Future<Output = T>,
    {
        self.runtime.block_on(future)
    }

    pub fn execute(&self, metadata: RequestMetadata) -> Result<Response<String>> {
        self.block_on(self.inner.execute(metadata))
    }

    pub fn get_by_id<T: DeserializeOwned>(&self, thing_type: &str, id: &str) -> Result<T> {
        self.block_on(self.inner.get_by_id(thing_type, id))
    }

    pub fn try_get_by_id<T: DeserializeOwned>(
        &self,
        thing_type: &str,
        id: &str,
    ) -> Result<Option<T>> {
        self.block_on(self.inner.try_get_by_id(thing_type, id))
    }

    pub fn get_by_column<T: DeserializeOwned>(
        &self,
        thing_type: &str,
        column: &str,
        value: impl ToConstraintValue,
    ) -> Result<T> {
        self.block_on(self.inner.get_by_column(thing_type, column, value))
    }

    pub fn get_by_column_unique<T: DeserializeOwned>(
        &self,
        thing_type: &str,
        column: &str,
        value: impl ToConstraintValue,
    ) -> Result<T> {
        self.block_on(self.inner.get_by_column_unique(thing_type, column, value))
    }

    pub fn get_by_key<T: DeserializeOwned>(
        &self,
        thing_type: &str,
        column: &str,
        value: &str,
    ) -> Result<T> {
        self.block_on(self.inner.get_by_key(thing_type, column, value))
    }

    pub fn create<B: Serialize + ?Sized>(&self, thing_type: &str, fields: &B) -> Result<String> {
        self.block_on(self.inner.create(thing_type, fields))
    }

    pub fn create_bulk<B: Serialize>(
        &self,
        thing_type: &str,
        records: &[B],
    ) -> Result<Vec<BulkItem>> {
        self.block_on(self.inner.create_bulk(thing_type, records))
    }

    pub fn update<B: Serialize + ?Sized>(&self, thing_type: &str, id: &str, fields: &B) -> Result<()> {
        self.block_on(self.inner.update(thing_type, id, fields))
    }

    pub fn replace<B: Serialize + ?Sized>(
        &self,
        thing_type: &str,
        id: &str,
        fields: &B,
    ) -> Result<()> {
        self.block_on(self.inner.replace(thing_type, id, fields))
    }

    pub fn delete_by_id(&self, thing_type: &str, id: &str) -> Result<()> {
        self.block_on(self.inner.delete_by_id(thing_type, id))
    }

    pub fn delete_by_ids<I, S>(&self, thing_type: &str, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.block_on(self.inner.delete_by_ids(thing_type, ids))
    }

    pub fn delete_by_constraints(
        &self,
        thing_type: &str,
        constraints: &[Constraint],
    ) -> Result<usize> {
        self.block_on(self.inner.delete_by_constraints(thing_type, constraints))
    }

    /// Deletes every thing of a type, without confirmation.
    pub fn delete_all(&self, thing_type: &str) -> Result<usize> {
        self.block_on(self.inner.delete_all(thing_type))
    }

    pub fn delete(&self, thing_type: &str, target: DeleteTarget) -> Result<usize> {
        self.block_on(self.inner.delete(thing_type, target))
    }

    pub fn count_objects(&self, thing_type: &str, constraints: &[Constraint]) -> Result<u64> {
        self.block_on(self.inner.count_objects(thing_type, constraints))
    }

    pub fn fetch_page<T: DeserializeOwned>(
        &self,
        thing_type: &str,
        query: &Query,
        cursor: u64,
        limit: u32,
    ) -> Result<Page<T>> {
        self.block_on(self.inner.fetch_page(thing_type, query, cursor, limit))
    }

    pub fn get_objects<T: DeserializeOwned>(&self, thing_type: &str, query: Query) -> Result<Vec<T>> {
        self.block_on(self.inner.get_objects(thing_type, query))
    }

    pub fn fetch_all<T: DeserializeOwned>(
        &self,
        thing_type: &str,
        query: Query,
        workers: usize,
    ) -> Result<Vec<T>> {
        self.block_on(self.inner.fetch_all(thing_type, query, workers))
    }

    pub fn fetch_all_into<S: RecordSink + ?Sized>(
        &self,
        thing_type: &str,
        query: Query,
        workers: usize,
        sink: &mut S,
    ) -> Result<usize> {
        self.block_on(self.inner.fetch_all_into(thing_type, query, workers, sink))
    }

    pub fn run_workflow<B: Serialize + ?Sized>(
        &self,
        name: &str,
        params: Option<&B>,
        method: Method,
    ) -> Result<Value> {
        self.block_on(self.inner.run_workflow(name, params, method))
    }

    /// Lazily iterates over a query's results, one page request at a time.
    pub fn iter<T: DeserializeOwned>(&self, thing_type: &str, query: Query) -> Result<ThingIter<'_, T>> {
        Ok(ThingIter {
            runtime: &self.runtime,
            cursor: self.inner.cursor(thing_type, query)?,
        })
    }
}

/// Blocking iterator over a query's results.
///
/// Yields `Err` at most once; iteration ends after an error.
pub struct ThingIter<'a, T = Value> {
    runtime: &'a Runtime,
    cursor: ThingCursor<T>,
}

impl<T: DeserializeOwned> ThingIter<'_, T> {
    /// Number of page requests made so far.
    pub fn pages_fetched(&self) -> usize {
        self.cursor.pages_fetched()
    }
}

impl<T: DeserializeOwned> Iterator for ThingIter<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.cursor.next())
    }
}
