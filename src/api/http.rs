use super::ControllerServiceApi;
use crate::config::ClientConfig;
use crate::core::{
    ApiError, ApiResult, ConfigParams, ControllerError, ControllerServiceEntity, Result,
    UpdatePayload, VerificationJob, VerificationOptions,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use tracing::{Level, event};

/// REST backend for controller services.
#[derive(Debug, Clone)]
pub struct HttpControllerServiceApi {
    client: Client,
    base_url: String,
}

impl HttpControllerServiceApi {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ControllerError::Config(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self::with_client(client, &config.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn service_url(&self, id: &str) -> String {
        format!("{}/controller-services/{}", self.base_url, id)
    }

    fn verification_url(&self, id: &str) -> String {
        format!("{}/config/verification-requests", self.service_url(id))
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        event!(Level::TRACE, %method, %url, "controller service request");
        self.client.request(method, url)
    }

    async fn send(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|err| ApiError::transport(format!("Request failed: {err}")))?;

        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = self.send(builder).await?;
        let status = response.status().as_u16();
        response.json::<T>().await.map_err(|err| {
            // the server accepted the request; only the body is unreadable
            ApiError::transport(format!(
                "Failed to decode HTTP {status} response body: {err}"
            ))
        })
    }

    /// Sends and reads the body without requiring it to be JSON.
    ///
    /// An empty body is `Null`; non-JSON text is returned as a string.
    async fn send_lenient(&self, builder: RequestBuilder) -> ApiResult<JsonValue> {
        let response = self.send(builder).await?;
        let text = response.text().await.unwrap_or_default();
        Ok(lenient_body(&text))
    }
}

/// Turns a non-success response into an [`ApiError`], keeping the body.
async fn error_from_response(response: Response) -> ApiError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<JsonValue>(&text).ok();

    let message = body
        .as_ref()
        .and_then(|body| body.get("message"))
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                trimmed.to_string()
            }
        });

    let mut err = ApiError::with_status(status.as_u16(), message);
    if let Some(body) = body {
        if let Some(details) = body.get("details").and_then(JsonValue::as_str) {
            err = err.details(details);
        }
        if let Some(field) = body.get("error").and_then(JsonValue::as_str) {
            err = err.error_field(field);
        }
        err = err.body(body);
    }
    err
}

fn lenient_body(text: &str) -> JsonValue {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return JsonValue::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| JsonValue::String(trimmed.to_string()))
}

/// Verification endpoints answer either with the job or with `{"request": job}`.
fn unwrap_request(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(mut object) if object.get("request").is_some_and(JsonValue::is_object) => {
            object.remove("request").unwrap_or(JsonValue::Null)
        }
        other => other,
    }
}

#[async_trait]
impl ControllerServiceApi for HttpControllerServiceApi {
    async fn fetch_resource(&self, id: &str) -> ApiResult<ControllerServiceEntity> {
        self.send_json(self.request(Method::GET, self.service_url(id)))
            .await
    }

    async fn mutate_resource(
        &self,
        id: &str,
        payload: &UpdatePayload,
    ) -> ApiResult<ControllerServiceEntity> {
        self.send_json(self.request(Method::PUT, self.service_url(id)).json(payload))
            .await
    }

    async fn analyze_config(&self, id: &str, params: &ConfigParams) -> ApiResult<JsonValue> {
        let body = json!({
            "configurationAnalysis": {
                "componentId": id,
                "properties": params.properties,
            }
        });
        let url = format!("{}/config/analysis", self.service_url(id));
        self.send_lenient(self.request(Method::POST, url).json(&body))
            .await
    }

    async fn create_verification_job(
        &self,
        id: &str,
        params: &ConfigParams,
        options: &VerificationOptions,
    ) -> ApiResult<JsonValue> {
        let body = json!({
            "request": {
                "componentId": id,
                "properties": params.properties,
                "attributes": options.attributes,
            }
        });
        self.send_json(
            self.request(Method::POST, self.verification_url(id))
                .json(&body),
        )
        .await
    }

    async fn fetch_verification_job(&self, id: &str, job_id: &str) -> ApiResult<VerificationJob> {
        let url = format!("{}/{}", self.verification_url(id), job_id);
        let raw: JsonValue = self.send_json(self.request(Method::GET, url)).await?;
        serde_json::from_value(unwrap_request(raw)).map_err(|err| {
            ApiError::transport(format!("Failed to decode verification request: {err}"))
        })
    }

    async fn delete_verification_job(&self, id: &str, job_id: &str) -> ApiResult<()> {
        let url = format!("{}/{}", self.verification_url(id), job_id);
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_under_base() {
        let api = HttpControllerServiceApi::with_client(Client::new(), "http://h:8080/nifi-api/");
        assert_eq!(
            api.service_url("cs-1"),
            "http://h:8080/nifi-api/controller-services/cs-1"
        );
        assert_eq!(
            api.verification_url("cs-1"),
            "http://h:8080/nifi-api/controller-services/cs-1/config/verification-requests"
        );
    }

    #[test]
    fn lenient_body_accepts_empty_and_plain_text() {
        assert_eq!(lenient_body(""), JsonValue::Null);
        assert_eq!(lenient_body("  \n"), JsonValue::Null);
        assert_eq!(lenient_body("OK"), json!("OK"));
        assert_eq!(lenient_body(r#"{"a": 1}"#), json!({"a": 1}));
    }

    #[test]
    fn wrapped_job_is_unwrapped() {
        let wrapped = json!({"request": {"requestId": "r1", "complete": true}});
        assert_eq!(unwrap_request(wrapped)["requestId"], "r1");

        let bare = json!({"id": "r1", "request": "not-an-object"});
        assert_eq!(unwrap_request(bare.clone()), bare);
    }
}
