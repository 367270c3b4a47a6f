//! Constrained, sorted list queries and cursor pagination.
//!
//! [`ThingCursor`] is a lazy, forward-only sequence over a query's results.
//! A page is only requested when the consumer asks for an item past the end of
//! the current page, so truncating early never fetches further pages.
//!
//! Page arithmetic: `next_cursor = cursor + count`, and the scan ends on the
//! first page reporting `remaining == 0`.

use crate::{
    constraint::{encode_constraints, Constraint},
    field::normalize_name,
    retry::RetryStrategy,
    Client, Error, Result,
};
use futures::Stream;
use http::Method;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::collections::VecDeque;

/// Largest page the data API serves.
pub const MAX_PAGE_SIZE: u32 = 100;

/// `{"response": ...}` wrapper used by every read endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub(crate) response: T,
}

/// One page of a list query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Page<T> {
    /// Things on this page, in server order.
    pub results: Vec<T>,
    /// Cursor this page starts at.
    pub cursor: u64,
    /// Number of things on this page.
    pub count: u64,
    /// Things left after this page.
    #[serde(default)]
    pub remaining: u64,
}

impl<T> Page<T> {
    /// `count + remaining`: total size of the result set as of this page.
    pub fn total(&self) -> u64 {
        self.count + self.remaining
    }

    pub fn next_cursor(&self) -> u64 {
        self.cursor + self.count
    }

    pub fn is_last(&self) -> bool {
        self.remaining == 0
    }
}

/// A list query: constraints, ordering and paging options.
///
/// # Examples
///
/// ```
/// use bubble_api::{Field, Query};
///
/// let query = Query::new()
///     .constraint(Field::new("Age").greater_than(17))
///     .constraint(Field::new("Email").is_not_empty())
///     .sort_by("Created Date")
///     .descending(true)
///     .max_objects(250);
/// assert!(query.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    constraints: Vec<Constraint>,
    sort_field: Option<String>,
    descending: bool,
    limit: u32,
    exclude_remaining: bool,
    columns: Option<Vec<String>>,
    max_objects: Option<usize>,
    retry_strategy: Option<RetryStrategy>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            constraints: Vec::new(),
            sort_field: None,
            descending: false,
            limit: MAX_PAGE_SIZE,
            exclude_remaining: false,
            columns: None,
            max_objects: None,
            retry_strategy: None,
        }
    }
}

impl Query {
    /// A query matching every thing, 100 per page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constraint. Constraints are combined with AND.
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    #[must_use]
    pub fn constraints(mut self, constraints: impl IntoIterator<Item = Constraint>) -> Self {
        self.constraints.extend(constraints);
        self
    }

    /// Sorts on `field`, sent verbatim.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    /// Page size, 1 to 100.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Asks the server not to compute an exact `remaining`.
    ///
    /// Only accepted by [`Client::fetch_page`]. A cursor scan or a fetch-all
    /// relies on `remaining` to terminate and rejects such a query with
    /// [`Error::Usage`].
    #[must_use]
    pub fn exclude_remaining(mut self, exclude: bool) -> Self {
        self.exclude_remaining = exclude;
        self
    }

    /// Keeps only these columns of each returned thing; missing ones become `null`.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Stops after this many things.
    #[must_use]
    pub fn max_objects(mut self, max: usize) -> Self {
        self.max_objects = Some(max);
        self
    }

    /// Overrides the client's retry strategy for every page request.
    #[must_use]
    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    pub fn get_constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn page_size(&self) -> u32 {
        self.limit
    }

    pub fn get_max_objects(&self) -> Option<usize> {
        self.max_objects
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Checks the page size before any request is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if the page size is outside `1..=100`.
    pub fn validate(&self) -> Result<()> {
        check_page_limit(self.limit)
    }

    /// Like [`validate`](Self::validate), for scans that follow `remaining`
    /// across pages.
    pub(crate) fn validate_scan(&self) -> Result<()> {
        self.validate()?;
        if self.exclude_remaining {
            return Err(Error::Usage(
                "exclude_remaining cannot be used for a multi-page scan".to_string(),
            ));
        }
        Ok(())
    }

    /// Query parameters for the page starting at `cursor`.
    pub(crate) fn params(&self, cursor: u64, limit: u32) -> Result<Vec<(String, String)>> {
        let mut params = vec![
            (
                "constraints".to_string(),
                encode_constraints(&self.constraints)?,
            ),
            ("cursor".to_string(), cursor.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(sort_field) = &self.sort_field {
            params.push(("sort_field".to_string(), sort_field.clone()));
        }
        params.push(("descending".to_string(), self.descending.to_string()));
        if self.exclude_remaining {
            params.push(("exclude_remaining".to_string(), "true".to_string()));
        }
        Ok(params)
    }

    fn project(&self, record: Value) -> Value {
        let Some(columns) = &self.columns else {
            return record;
        };
        let mut record = match record {
            Value::Object(map) => map,
            other => return other,
        };
        let projected = columns
            .iter()
            .map(|column| {
                let value = record.remove(column).unwrap_or(Value::Null);
                (column.clone(), value)
            })
            .collect();
        Value::Object(projected)
    }
}

fn check_page_limit(limit: u32) -> Result<()> {
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(Error::Usage(format!(
            "page limit must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, limit
        )));
    }
    Ok(())
}

pub(crate) fn thing_path(thing_type: &str) -> String {
    format!("obj/{}", normalize_name(thing_type))
}

impl Client {
    /// Fetches one page of `query` starting at `cursor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] without sending anything if the query or
    /// `limit` is outside `1..=100`.
    ///
    /// Besides transport errors, returns [`Error::MalformedResponse`] when the
    /// envelope has the wrong shape, a thing does not decode as `T`, or the
    /// page is empty while reporting remaining things (the scan could never end).
    pub async fn fetch_page<T>(
        &self,
        thing_type: &str,
        query: &Query,
        cursor: u64,
        limit: u32,
    ) -> Result<Page<T>>
    where
        T: DeserializeOwned,
    {
        query.validate()?;
        check_page_limit(limit)?;

        let mut metadata = Client::request(Method::GET, thing_path(thing_type))
            .with_query_params(query.params(cursor, limit)?);
        metadata.retry_strategy = query.retry_strategy.clone();

        let response = self.execute(metadata).await?;
        let envelope: Envelope<Page<Value>> = response.json()?;
        let page = envelope.response;

        tracing::debug!(
            thing_type = thing_type,
            cursor = page.cursor,
            count = page.count,
            remaining = page.remaining,
            "Fetched page"
        );

        if page.count == 0 && page.remaining > 0 {
            return Err(Error::malformed(
                response.raw_body,
                response.status,
                format!(
                    "empty page at cursor {} reports {} remaining",
                    page.cursor, page.remaining
                ),
            ));
        }

        let results = page
            .results
            .into_iter()
            .map(|record| {
                serde_json::from_value(query.project(record)).map_err(|e| {
                    Error::malformed(response.raw_body.clone(), response.status, e.to_string())
                })
            })
            .collect::<Result<Vec<T>>>()?;

        Ok(Page {
            results,
            cursor: page.cursor,
            count: page.count,
            remaining: page.remaining,
        })
    }

    /// Opens a lazy cursor over `query`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for an invalid query or one that sets
    /// `exclude_remaining`; nothing is requested yet.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bubble_api::{Client, Field, Query};
    ///
    /// # async fn example(client: Client) -> Result<(), bubble_api::Error> {
    /// let query = Query::new().constraint(Field::new("Status").equals("active"));
    /// let mut cursor = client.cursor::<serde_json::Value>("Order", query)?;
    /// while let Some(order) = cursor.next().await {
    ///     println!("{}", order?["_id"]);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn cursor<T>(&self, thing_type: &str, query: Query) -> Result<ThingCursor<T>>
    where
        T: DeserializeOwned,
    {
        query.validate_scan()?;
        Ok(ThingCursor {
            client: self.clone(),
            thing_type: normalize_name(thing_type),
            query,
            cursor: 0,
            buffer: VecDeque::new(),
            yielded: 0,
            exhausted: false,
            pages_fetched: 0,
        })
    }

    /// Collects every thing matching `query`, stopping at `max_objects` if set.
    pub async fn get_objects<T>(&self, thing_type: &str, query: Query) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut cursor = self.cursor(thing_type, query)?;
        let mut things = Vec::new();
        while let Some(thing) = cursor.next().await {
            things.push(thing?);
        }
        Ok(things)
    }

    /// Counts the things matching `constraints` with a single `limit=1` request.
    pub async fn count_objects(&self, thing_type: &str, constraints: &[Constraint]) -> Result<u64> {
        let query = Query::new().constraints(constraints.iter().cloned());
        self.count_query(thing_type, &query).await
    }

    pub(crate) async fn count_query(&self, thing_type: &str, query: &Query) -> Result<u64> {
        let page = self.fetch_page::<Value>(thing_type, query, 0, 1).await?;
        Ok(page.total())
    }
}

/// Lazy, forward-only cursor over a query's results.
///
/// Not restartable: once it returns `None`, or an error, it stays finished.
pub struct ThingCursor<T = Value> {
    client: Client,
    thing_type: String,
    query: Query,
    cursor: u64,
    buffer: VecDeque<T>,
    yielded: usize,
    exhausted: bool,
    pages_fetched: usize,
}

impl<T> ThingCursor<T>
where
    T: DeserializeOwned,
{
    /// Returns the next thing, fetching a page only when the current one is used up.
    pub async fn next(&mut self) -> Option<Result<T>> {
        loop {
            if self.quota_left() == Some(0) {
                self.exhausted = true;
                self.buffer.clear();
                return None;
            }
            if let Some(thing) = self.buffer.pop_front() {
                self.yielded += 1;
                return Some(Ok(thing));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_next_page().await {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }

    /// Returns the rest of the current page, or the next page, as one batch.
    ///
    /// Honors `max_objects` like [`next`](Self::next). `Ok(None)` once finished.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if self.buffer.is_empty() && !self.exhausted && self.quota_left() != Some(0) {
            if let Err(e) = self.fetch_next_page().await {
                self.exhausted = true;
                return Err(e);
            }
        }

        let take = match self.quota_left() {
            Some(left) => left.min(self.buffer.len()),
            None => self.buffer.len(),
        };
        if take == 0 {
            self.exhausted = true;
            self.buffer.clear();
            return Ok(None);
        }

        let batch: Vec<T> = self.buffer.drain(..take).collect();
        self.yielded += batch.len();
        Ok(Some(batch))
    }

    /// Cursor of the next page to request.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Number of page requests made so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Adapts the cursor into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        futures::stream::unfold(self, |mut cursor| async move {
            cursor.next().await.map(|item| (item, cursor))
        })
    }

    fn quota_left(&self) -> Option<usize> {
        self.query
            .max_objects
            .map(|max| max.saturating_sub(self.yielded))
    }

    async fn fetch_next_page(&mut self) -> Result<()> {
        // Never ask for more than the caller will consume.
        let limit = match self.quota_left() {
            Some(left) => (left.saturating_sub(self.buffer.len()))
                .clamp(1, self.query.limit as usize) as u32,
            None => self.query.limit,
        };

        let page: Page<T> = self
            .client
            .fetch_page(&self.thing_type, &self.query, self.cursor, limit)
            .await?;
        self.pages_fetched += 1;

        self.cursor = page.next_cursor();
        if page.is_last() {
            self.exhausted = true;
        }
        self.buffer.extend(page.results);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Field;
    use serde_json::json;

    #[test]
    fn test_default_params() {
        let params = Query::new().params(0, 100).unwrap();
        assert_eq!(
            params,
            vec![
                ("constraints".to_string(), "[]".to_string()),
                ("cursor".to_string(), "0".to_string()),
                ("limit".to_string(), "100".to_string()),
                ("descending".to_string(), "false".to_string()),
            ]
        );
    }

    #[test]
    fn test_params_with_sort_and_exclude_remaining() {
        let params = Query::new()
            .constraint(Field::new("Name").equals("Bob"))
            .sort_by("Created Date")
            .descending(true)
            .exclude_remaining(true)
            .params(200, 50)
            .unwrap();
        assert_eq!(
            params,
            vec![
                (
                    "constraints".to_string(),
                    r#"[{"key":"name","constraint_type":"equals","value":"Bob"}]"#.to_string()
                ),
                ("cursor".to_string(), "200".to_string()),
                ("limit".to_string(), "50".to_string()),
                ("sort_field".to_string(), "Created Date".to_string()),
                ("descending".to_string(), "true".to_string()),
                ("exclude_remaining".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_limit_bounds() {
        assert!(matches!(
            Query::new().limit(0).validate(),
            Err(Error::Usage(_))
        ));
        assert!(matches!(
            Query::new().limit(101).validate(),
            Err(Error::Usage(_))
        ));
        assert!(Query::new().limit(1).validate().is_ok());
    }

    #[test]
    fn test_scan_rejects_exclude_remaining() {
        let query = Query::new().exclude_remaining(true);
        assert!(query.validate().is_ok());
        assert!(matches!(query.validate_scan(), Err(Error::Usage(_))));
        assert!(Query::new().validate_scan().is_ok());
    }

    #[test]
    fn test_projection() {
        let query = Query::new().select(["_id", "name"]);
        assert_eq!(
            query.project(json!({"_id": "1x1", "name": "Ada", "age": 36})),
            json!({"_id": "1x1", "name": "Ada"})
        );
        assert_eq!(
            query.project(json!({"_id": "1x2"})),
            json!({"_id": "1x2", "name": null})
        );
    }

    #[test]
    fn test_page_arithmetic() {
        let page: Page<Value> = serde_json::from_value(json!({
            "results": [{}, {}],
            "cursor": 100,
            "count": 2,
            "remaining": 5
        }))
        .unwrap();
        assert_eq!(page.next_cursor(), 102);
        assert_eq!(page.total(), 7);
        assert!(!page.is_last());
    }

    #[test]
    fn test_missing_remaining_defaults_to_last_page() {
        let page: Page<Value> =
            serde_json::from_value(json!({"results": [], "cursor": 0, "count": 0})).unwrap();
        assert!(page.is_last());
    }

    #[test]
    fn test_thing_path_is_normalized() {
        assert_eq!(thing_path("Rental Unit"), "obj/rentalunit");
    }
}
