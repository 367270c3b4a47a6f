//! Whole-table fetches, optionally with concurrent page workers.
//!
//! With `workers > 0` the result set is sized first with a `limit=1` probe,
//! then fetched in batches of `workers` pages. Every page of a batch runs as
//! its own task and the batch is joined before the next one starts. Results
//! are merged by page slot, never by arrival order, so the output matches a
//! sequential scan.
//!
//! Concurrent fetching assumes the result set does not change during the scan:
//! inserts or deletes in between shift cursor offsets.

use crate::{
    query::{Page, Query},
    sink::RecordSink,
    Client, Error, Result,
};
use futures::future::join_all;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Cursor and limit of every page needed to cover `total` things.
fn plan_pages(total: u64, page_size: u32) -> Vec<(u64, u32)> {
    let page_size = u64::from(page_size.max(1));
    (0..total.div_ceil(page_size))
        .map(|slot| {
            let cursor = slot * page_size;
            let limit = page_size.min(total - cursor) as u32;
            (cursor, limit)
        })
        .collect()
}

impl Client {
    /// Fetches every thing matching `query`, honoring `max_objects`.
    ///
    /// `workers == 0` scans sequentially; otherwise up to `workers` pages are
    /// requested at once. Output order is the same either way.
    pub async fn fetch_all<T>(&self, thing_type: &str, query: Query, workers: usize) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut records: Vec<Value> = Vec::new();
        self.fetch_all_into(thing_type, query, workers, &mut records)
            .await?;

        records
            .into_iter()
            .map(|record| {
                let raw = record.to_string();
                serde_json::from_value(record)
                    .map_err(|e| Error::malformed(raw, StatusCode::OK, e.to_string()))
            })
            .collect()
    }

    /// Streams every thing matching `query` into `sink`, page by page in
    /// cursor order, and returns how many were written.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bubble_api::{Client, CsvSink, Query};
    ///
    /// # async fn example(client: Client) -> Result<(), bubble_api::Error> {
    /// let mut sink = CsvSink::from_path("users.csv")?.with_columns(["_id", "email"]);
    /// let written = client
    ///     .fetch_all_into("User", Query::new().select(["_id", "email"]), 4, &mut sink)
    ///     .await?;
    /// println!("exported {} users", written);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn fetch_all_into<S>(
        &self,
        thing_type: &str,
        query: Query,
        workers: usize,
        sink: &mut S,
    ) -> Result<usize>
    where
        S: RecordSink + ?Sized,
    {
        let written = if workers == 0 {
            self.scan_sequential(thing_type, query, &mut *sink).await?
        } else {
            self.scan_concurrent(thing_type, query, workers, &mut *sink)
                .await?
        };
        sink.finish()?;
        Ok(written)
    }

    async fn scan_sequential<S>(&self, thing_type: &str, query: Query, sink: &mut S) -> Result<usize>
    where
        S: RecordSink + ?Sized,
    {
        let mut cursor = self.cursor::<Value>(thing_type, query)?;
        let mut written = 0;
        while let Some(page) = cursor.next_page().await? {
            sink.write_page(&page)?;
            written += page.len();
        }
        Ok(written)
    }

    async fn scan_concurrent<S>(
        &self,
        thing_type: &str,
        query: Query,
        workers: usize,
        sink: &mut S,
    ) -> Result<usize>
    where
        S: RecordSink + ?Sized,
    {
        query.validate_scan()?;

        let mut total = self.count_query(thing_type, &query).await?;
        if let Some(max) = query.get_max_objects() {
            total = total.min(max as u64);
        }
        let pages = plan_pages(total, query.page_size());

        tracing::info!(
            thing_type = thing_type,
            total = total,
            pages = pages.len(),
            workers = workers,
            "Starting concurrent fetch"
        );

        let mut written = 0;
        for (batch_index, batch) in pages.chunks(workers).enumerate() {
            let handles: Vec<_> = batch
                .iter()
                .map(|&(cursor, limit)| {
                    let client = self.clone();
                    let thing_type = thing_type.to_string();
                    let query = query.clone();
                    tokio::spawn(async move {
                        client
                            .fetch_page::<Value>(&thing_type, &query, cursor, limit)
                            .await
                    })
                })
                .collect();

            // join_all keeps slot order regardless of completion order.
            let results = join_all(handles).await;
            tracing::debug!(batch = batch_index, pages = results.len(), "Batch joined");

            for joined in results {
                let page: Page<Value> = joined.map_err(|e| Error::Worker(e.to_string()))??;
                sink.write_page(&page.results)?;
                written += page.results.len();
            }
        }

        Ok(written)
    }
}
