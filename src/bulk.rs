//! Bulk import through the newline-delimited `obj/{type}/bulk` endpoint.

use crate::{query::thing_path, Client, Error, Result};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content type of a bulk import body.
const BULK_CONTENT_TYPE: &str = "text/plain";

/// Outcome of one record of a bulk import, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkItem {
    /// The record was created with this id.
    Created { id: String },
    /// The server rejected the record.
    Failed { message: String },
    /// The server's line for this record could not be understood.
    Unparsed { line: String, error: String },
}

impl BulkItem {
    pub fn is_created(&self) -> bool {
        matches!(self, BulkItem::Created { .. })
    }

    /// The new id, for created records.
    pub fn id(&self) -> Option<&str> {
        match self {
            BulkItem::Created { id } => Some(id),
            _ => None,
        }
    }

    fn parse(line: &str) -> Self {
        #[derive(Deserialize)]
        struct Status {
            status: String,
            id: Option<String>,
            message: Option<String>,
        }

        let unparsed = |error: String| BulkItem::Unparsed {
            line: line.to_string(),
            error,
        };

        match serde_json::from_str::<Status>(line) {
            Ok(Status {
                status,
                id: Some(id),
                ..
            }) if status == "success" => BulkItem::Created { id },
            Ok(Status {
                status, message, ..
            }) if status != "success" => BulkItem::Failed {
                message: message.unwrap_or(status),
            },
            Ok(_) => unparsed("success line without an id".to_string()),
            Err(e) => unparsed(e.to_string()),
        }
    }
}

/// Joins records into the newline-delimited body, one JSON object per line.
fn encode_lines<B: Serialize>(records: &[B]) -> Result<String> {
    let lines = records
        .iter()
        .map(|record| {
            serde_json::to_string(record).map_err(|e| Error::SerializationFailed(e.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

/// Splits a bulk reply into exactly `expected` items.
///
/// Every line is parsed on its own. Missing lines become [`BulkItem::Unparsed`]
/// and surplus lines are dropped, so the output always lines up with the input.
fn decode_lines(body: &str, expected: usize) -> Vec<BulkItem> {
    let mut items: Vec<BulkItem> = body
        .trim_end_matches(['\r', '\n'])
        .split('\n')
        .map(|line| BulkItem::parse(line.trim_end_matches('\r')))
        .collect();

    if items.len() != expected {
        tracing::warn!(
            expected = expected,
            received = items.len(),
            "Bulk reply line count does not match the number of records"
        );
    }
    items.truncate(expected);
    while items.len() < expected {
        items.push(BulkItem::Unparsed {
            line: String::new(),
            error: "no reply line for this record".to_string(),
        });
    }
    items
}

impl Client {
    /// Creates many things with a single request.
    ///
    /// Returns one [`BulkItem`] per record, in input order. A rejected or
    /// garbled line only affects its own record. An empty `records` slice
    /// sends nothing.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bubble_api::Client;
    /// use serde_json::json;
    ///
    /// # async fn example(client: Client) -> Result<(), bubble_api::Error> {
    /// let results = client
    ///     .create_bulk("User", &[json!({"name": "Ada"}), json!({"name": "Grace"})])
    ///     .await?;
    /// let ids: Vec<&str> = results.iter().filter_map(|r| r.id()).collect();
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_bulk<B>(&self, thing_type: &str, records: &[B]) -> Result<Vec<BulkItem>>
    where
        B: Serialize,
    {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let path = format!("{}/bulk", thing_path(thing_type));
        let metadata =
            Client::request(Method::POST, path).with_text(BULK_CONTENT_TYPE, encode_lines(records)?);
        let response = self.execute(metadata).await?;

        let items = decode_lines(&response.raw_body, records.len());
        let failed = items.iter().filter(|item| !item.is_created()).count();
        tracing::info!(
            thing_type = thing_type,
            records = records.len(),
            failed = failed,
            "Bulk import finished"
        );
        Ok(items)
    }

    /// Creates one thing or many: a JSON array goes through [`create_bulk`](Self::create_bulk).
    pub async fn create_any(&self, thing_type: &str, fields: Value) -> Result<Vec<BulkItem>> {
        match fields {
            Value::Array(records) => self.create_bulk(thing_type, &records).await,
            single => {
                let id = self.create(thing_type, &single).await?;
                Ok(vec![BulkItem::Created { id }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_lines() {
        let body = encode_lines(&[json!({"a": 1}), json!({"b": "x"})]).unwrap();
        assert_eq!(body, "{\"a\":1}\n{\"b\":\"x\"}");
    }

    #[test]
    fn test_each_line_is_parsed_independently() {
        let body = "{\"status\":\"success\",\"id\":\"1x1\"}\nnot json\n{\"status\":\"error\",\"message\":\"bad field\"}\n";
        let items = decode_lines(body, 3);
        assert_eq!(
            items[0],
            BulkItem::Created {
                id: "1x1".to_string()
            }
        );
        assert!(matches!(&items[1], BulkItem::Unparsed { line, .. } if line == "not json"));
        assert_eq!(
            items[2],
            BulkItem::Failed {
                message: "bad field".to_string()
            }
        );
    }

    #[test]
    fn test_short_reply_is_padded() {
        let items = decode_lines("{\"status\":\"success\",\"id\":\"1x1\"}", 2);
        assert_eq!(items.len(), 2);
        assert!(items[0].is_created());
        assert!(matches!(items[1], BulkItem::Unparsed { .. }));
    }

    #[test]
    fn test_long_reply_is_truncated() {
        let body = "{\"status\":\"success\",\"id\":\"1\"}\n{\"status\":\"success\",\"id\":\"2\"}";
        let items = decode_lines(body, 1);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id(), Some("1"));
    }

    #[test]
    fn test_failed_without_message_keeps_status() {
        assert_eq!(
            BulkItem::parse("{\"status\":\"error\"}"),
            BulkItem::Failed {
                message: "error".to_string()
            }
        );
    }
}
