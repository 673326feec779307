//! Best-effort completion notification.
//!
//! A step definition may carry an `on_completion` request spec. After a
//! successful run the controller hands it to the attached
//! [`CompletionNotifier`]; failures are logged and never fail the run.

use crate::context::StepData;
use crate::errors::NotificationError;
use async_trait::async_trait;
use serde_json::Value;

/// Performs the outbound call announcing a finished run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    /// Sends the request described by `spec`.
    ///
    /// Patterns in `spec` are resolved against the run data, then against
    /// the step definition `values`.
    async fn notify(&self, spec: &Value, values: &Value, data: &StepData) -> Result<(), NotificationError>;
}

#[cfg(feature = "http-notifier")]
pub use http::HttpNotifier;

#[cfg(feature = "http-notifier")]
mod http {
    use super::CompletionNotifier;
    use crate::context::StepData;
    use crate::errors::{NotificationError, StepKeyError};
    use crate::pattern::display_value;
    use async_trait::async_trait;
    use reqwest::{Client, Method};
    use serde_json::Value;
    use std::time::Duration;
    use tracing::info;

    /// Sends the completion request over HTTP.
    ///
    /// Spec entries: `url` (required), `method` (default `GET`), `headers`
    /// and `params` (mappings), `body` (sent as JSON) and
    /// `timeout_seconds`.
    #[derive(Debug, Clone, Default)]
    pub struct HttpNotifier {
        client: Client,
    }

    impl HttpNotifier {
        /// Creates a notifier with a default client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a notifier using `client`.
        #[must_use]
        pub fn with_client(client: Client) -> Self {
            Self { client }
        }
    }

    fn string_pairs(value: Option<&Value>) -> Vec<(String, String)> {
        value
            .and_then(Value::as_object)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), display_value(v))).collect())
            .unwrap_or_default()
    }

    #[async_trait]
    impl CompletionNotifier for HttpNotifier {
        async fn notify(&self, spec: &Value, values: &Value, data: &StepData) -> Result<(), NotificationError> {
            let request = data.format_deep(spec, values)?;

            let url = request
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| StepKeyError::invalid("on_completion", "url", "Entry 'url' is missing"))?
                .to_string();
            let method_name = request.get("method").and_then(Value::as_str).unwrap_or("GET");
            let method = Method::from_bytes(method_name.to_uppercase().as_bytes())
                .map_err(|_| NotificationError::Method(method_name.to_string()))?;

            let mut builder = self.client.request(method, &url);
            for (name, value) in string_pairs(request.get("headers")) {
                builder = builder.header(name, value);
            }
            let params = string_pairs(request.get("params"));
            if !params.is_empty() {
                builder = builder.query(&params);
            }
            if let Some(body) = request.get("body").filter(|body| !body.is_null()) {
                builder = builder.json(body);
            }
            if let Some(seconds) = request.get("timeout_seconds").and_then(Value::as_f64) {
                let timeout = Duration::try_from_secs_f64(seconds).map_err(|_| NotificationError::Timeout(seconds))?;
                builder = builder.timeout(timeout);
            }

            let response = builder.send().await.map_err(|source| NotificationError::Request {
                url: url.clone(),
                source: Box::new(source),
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(NotificationError::Status {
                    url,
                    status: status.as_u16(),
                });
            }
            info!(url = %url, status = status.as_u16(), "Sent completion notification");
            Ok(())
        }
    }

}
