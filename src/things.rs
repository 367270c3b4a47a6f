//! Single-thing operations: read, create, update, replace and delete.
//!
//! Thing type names are normalized (lower-cased, spaces removed) before they
//! reach a URL, so `"Rental Unit"` and `"rentalunit"` address the same type.
//!
//! Not-found policy: [`Client::get_by_id`] is strict and surfaces a 404 as
//! [`Error::HttpError`]; [`Client::try_get_by_id`] is the lenient entry point
//! and returns `Ok(None)` instead. Secondary-column lookups always fail with
//! [`Error::NotFound`] when nothing matches.

use crate::{
    constraint::{Constraint, ToConstraintValue},
    field::{normalize_name, Field},
    query::{thing_path, Envelope, Query},
    Client, Error, Result,
};
use http::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Columns that hold a thing's primary identifier.
const PRIMARY_ID_COLUMNS: [&str; 2] = ["_id", "unique_id"];

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

pub(crate) fn to_json_body<B: Serialize + ?Sized>(body: &B) -> Result<Value> {
    serde_json::to_value(body).map_err(|e| Error::SerializationFailed(e.to_string()))
}

fn id_path(thing_type: &str, id: &str) -> String {
    format!("{}/{}", thing_path(thing_type), id)
}

/// What a [`Client::delete`] call should remove.
///
/// Exactly one of "ids" and "constraints" must be given, and a constraint
/// list must not be empty. Deleting a whole table takes the explicit
/// [`Client::delete_all`].
#[derive(Debug, Clone, Default)]
pub struct DeleteTarget {
    ids: Option<Vec<String>>,
    constraints: Option<Vec<Constraint>>,
}

enum DeleteSelection {
    Ids(Vec<String>),
    Constraints(Vec<Constraint>),
}

impl DeleteTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one id.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ids.get_or_insert_with(Vec::new).push(id.into());
        self
    }

    #[must_use]
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids
            .get_or_insert_with(Vec::new)
            .extend(ids.into_iter().map(Into::into));
        self
    }

    /// Selects every thing matching `constraints`.
    #[must_use]
    pub fn constraints(mut self, constraints: impl IntoIterator<Item = Constraint>) -> Self {
        self.constraints
            .get_or_insert_with(Vec::new)
            .extend(constraints);
        self
    }

    fn resolve(self) -> Result<DeleteSelection> {
        match (self.ids, self.constraints) {
            (Some(_), Some(_)) => Err(Error::Usage(
                "specify either ids or constraints to delete, not both".to_string(),
            )),
            (Some(ids), None) => Ok(DeleteSelection::Ids(ids)),
            (None, Some(constraints)) if constraints.is_empty() => Err(Error::Usage(
                "an empty constraint list matches every thing; use delete_all to empty a table"
                    .to_string(),
            )),
            (None, Some(constraints)) => Ok(DeleteSelection::Constraints(constraints)),
            (None, None) => Err(Error::Usage(
                "specify ids or constraints to delete; use delete_all to empty a table"
                    .to_string(),
            )),
        }
    }
}

impl Client {
    /// Fetches a thing by its unique id.
    ///
    /// # Errors
    ///
    /// A missing thing surfaces as [`Error::HttpError`] with status 404.
    pub async fn get_by_id<T>(&self, thing_type: &str, id: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let metadata = Client::request(Method::GET, id_path(thing_type, id));
        let response = self.call::<Envelope<T>>(metadata).await?;
        Ok(response.data.response)
    }

    /// Like [`get_by_id`](Self::get_by_id), but a 404 yields `Ok(None)`.
    pub async fn try_get_by_id<T>(&self, thing_type: &str, id: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.get_by_id(thing_type, id).await {
            Ok(thing) => Ok(Some(thing)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetches the first thing whose `column` equals `value`.
    ///
    /// Only one record is requested. Use a column with unique values: when
    /// several things match, an arbitrary one is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing matches.
    pub async fn get_by_column<T>(
        &self,
        thing_type: &str,
        column: &str,
        value: impl ToConstraintValue,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.lookup_by_column(thing_type, column, value, false).await
    }

    /// Like [`get_by_column`](Self::get_by_column), but fails with
    /// [`Error::MultipleResults`] when more than one thing matches.
    pub async fn get_by_column_unique<T>(
        &self,
        thing_type: &str,
        column: &str,
        value: impl ToConstraintValue,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.lookup_by_column(thing_type, column, value, true).await
    }

    /// Looks a thing up by primary id (`_id` / `unique_id`) or by any other column.
    ///
    /// The two paths differ: a primary id hits the thing's own URL, any other
    /// column runs a one-record constrained query.
    pub async fn get_by_key<T>(&self, thing_type: &str, column: &str, value: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        if PRIMARY_ID_COLUMNS.contains(&column) {
            self.get_by_id(thing_type, value).await
        } else {
            self.get_by_column(thing_type, column, value).await
        }
    }

    async fn lookup_by_column<T>(
        &self,
        thing_type: &str,
        column: &str,
        value: impl ToConstraintValue,
        unique: bool,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let constraint = Field::new(column).equals(value);
        let shown_value = constraint
            .value()
            .map(ToString::to_string)
            .unwrap_or_default();
        let query = Query::new()
            .constraint(constraint)
            .exclude_remaining(!unique);

        let page = self.fetch_page::<T>(thing_type, &query, 0, 1).await?;

        if unique && page.remaining > 0 {
            return Err(Error::MultipleResults {
                thing_type: normalize_name(thing_type),
                column: column.to_string(),
                value: shown_value,
                count: page.total(),
            });
        }

        page.results.into_iter().next().ok_or_else(|| Error::NotFound {
            thing_type: normalize_name(thing_type),
            column: column.to_string(),
            value: shown_value,
        })
    }

    /// Creates a thing and returns its new id.
    pub async fn create<B>(&self, thing_type: &str, fields: &B) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let metadata =
            Client::request(Method::POST, thing_path(thing_type)).with_json(to_json_body(fields)?);
        let response = self.call::<Created>(metadata).await?;
        tracing::debug!(thing_type = thing_type, id = %response.data.id, "Created thing");
        Ok(response.data.id)
    }

    /// Partially updates a thing: fields absent from `fields` are left untouched.
    pub async fn update<B>(&self, thing_type: &str, id: &str, fields: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let metadata =
            Client::request(Method::PATCH, id_path(thing_type, id)).with_json(to_json_body(fields)?);
        self.execute(metadata).await?;
        Ok(())
    }

    /// Replaces a thing: fields absent from `fields` are cleared.
    pub async fn replace<B>(&self, thing_type: &str, id: &str, fields: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let metadata =
            Client::request(Method::PUT, id_path(thing_type, id)).with_json(to_json_body(fields)?);
        self.execute(metadata).await?;
        Ok(())
    }

    /// Deletes a thing.
    ///
    /// Deleting an id that no longer exists fails with a 404
    /// [`Error::HttpError`] (see [`Error::is_not_found`]) every time.
    pub async fn delete_by_id(&self, thing_type: &str, id: &str) -> Result<()> {
        let metadata = Client::request(Method::DELETE, id_path(thing_type, id));
        self.execute(metadata).await?;
        Ok(())
    }

    /// Deletes things one after another and returns how many were deleted.
    ///
    /// The first failure aborts the rest of the sequence.
    pub async fn delete_by_ids<I, S>(&self, thing_type: &str, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut deleted = 0;
        for id in ids {
            self.delete_by_id(thing_type, id.as_ref()).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Deletes every thing matching `constraints` and returns how many were deleted.
    ///
    /// Works one page at a time: a page of ids is fetched from the start of the
    /// result set and deleted before the next page is requested, so memory stays
    /// bounded and deletions never shift unseen things past the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if a page lists only things that
    /// were already deleted, since the listing would then never drain.
    pub async fn delete_by_constraints(
        &self,
        thing_type: &str,
        constraints: &[Constraint],
    ) -> Result<usize> {
        let query = Query::new()
            .constraints(constraints.iter().cloned())
            .select(["_id"]);
        let mut deleted_ids: HashSet<String> = HashSet::new();

        loop {
            let page = self
                .fetch_page::<Value>(thing_type, &query, 0, query.page_size())
                .await?;

            let mut progressed = false;
            for record in &page.results {
                let id = record.get("_id").and_then(Value::as_str).ok_or_else(|| {
                    Error::malformed(
                        record.to_string(),
                        http::StatusCode::OK,
                        "listed thing has no _id",
                    )
                })?;
                if deleted_ids.contains(id) {
                    continue;
                }
                self.delete_by_id(thing_type, id).await?;
                deleted_ids.insert(id.to_string());
                progressed = true;
            }

            if page.is_last() {
                break;
            }
            if !progressed {
                tracing::error!(
                    thing_type = thing_type,
                    remaining = page.remaining,
                    "Listing still returns deleted things"
                );
                return Err(Error::malformed(
                    String::new(),
                    http::StatusCode::OK,
                    format!(
                        "listing of {} returned only deleted things with {} remaining",
                        normalize_name(thing_type),
                        page.remaining
                    ),
                ));
            }
        }

        let deleted = deleted_ids.len();
        tracing::info!(thing_type = thing_type, deleted = deleted, "Deleted matching things");
        Ok(deleted)
    }

    /// Deletes every thing of a type.
    ///
    /// There is no confirmation step: this empties the table.
    pub async fn delete_all(&self, thing_type: &str) -> Result<usize> {
        self.delete_by_constraints(thing_type, &[]).await
    }

    /// Deletes the things selected by `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`], without any request, if `target` names both
    /// ids and constraints or neither.
    pub async fn delete(&self, thing_type: &str, target: DeleteTarget) -> Result<usize> {
        match target.resolve()? {
            DeleteSelection::Ids(ids) => self.delete_by_ids(thing_type, ids).await,
            DeleteSelection::Constraints(constraints) => {
                self.delete_by_constraints(thing_type, &constraints).await
            }
        }
    }
}
