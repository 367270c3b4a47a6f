//! Backend workflow invocation (`wf/{name}`).

use crate::{things::to_json_body, Client, Error, Result};
use http::Method;
use serde::Serialize;
use serde_json::Value;

impl Client {
    /// Runs a backend workflow and returns the `response` member of its reply.
    ///
    /// `params` are sent as the JSON body. A reply with an empty body or
    /// without a `response` member yields `Value::Null`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bubble_api::Client;
    /// use http::Method;
    /// use serde_json::json;
    ///
    /// # async fn example(client: Client) -> Result<(), bubble_api::Error> {
    /// let reply = client
    ///     .run_workflow("send-invite", Some(&json!({"email": "ada@example.com"})), Method::POST)
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_workflow<B>(
        &self,
        name: &str,
        params: Option<&B>,
        method: Method,
    ) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        let mut metadata = Client::request(method, format!("wf/{}", name));
        if let Some(params) = params {
            metadata = metadata.with_json(to_json_body(params)?);
        }

        let response = self.execute(metadata).await?;
        if response.raw_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        let mut reply: Value = response.json()?;
        let is_object = reply.is_object();
        match reply.get_mut("response") {
            Some(inner) => Ok(inner.take()),
            None if is_object => Ok(Value::Null),
            None => Err(Error::malformed(
                response.raw_body.clone(),
                response.status,
                "workflow reply is not a JSON object",
            )),
        }
    }
}
