//! Resource Manager HTTP plumbing
//!
//! Request signing, error-body classification, long-running operation
//! polling and `nextLink` paging. The typed operations live in `api.rs`.

use crate::error::{AzureError, Result};
use async_trait::async_trait;
use hcpinfra_cloud::{
    CloudConfiguration, CloudError, Lro, PageSource, PollOperation, PollStatus, TokenCredential,
    lro::DEFAULT_POLL_INTERVAL,
};
use reqwest::{Method, Response, StatusCode, header::HeaderMap};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";
const LOCATION: &str = "location";
const RETRY_AFTER: &str = "retry-after";

/// Azure Resource Manager client bound to one subscription
#[derive(Clone)]
pub struct AzureClient {
    pub(crate) http: reqwest::Client,
    pub(crate) credential: Arc<dyn TokenCredential>,
    pub(crate) subscription_id: String,
    pub(crate) cloud: CloudConfiguration,
    pub(crate) resource_manager_endpoint: String,
    pub(crate) graph_endpoint: String,
    pub(crate) poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListResult<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}

impl AzureClient {
    pub fn new(
        subscription_id: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
        cloud: CloudConfiguration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            credential,
            subscription_id: subscription_id.into(),
            resource_manager_endpoint: cloud.resource_manager_endpoint.to_string(),
            graph_endpoint: cloud.graph_endpoint.to_string(),
            cloud,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the resource-manager and directory endpoints (local test
    /// servers). Token scopes still come from the cloud configuration.
    pub fn with_endpoints(
        mut self,
        resource_manager: impl Into<String>,
        graph: impl Into<String>,
    ) -> Self {
        self.resource_manager_endpoint = resource_manager.into().trim_end_matches('/').to_string();
        self.graph_endpoint = graph.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn cloud(&self) -> &CloudConfiguration {
        &self.cloud
    }

    /// Resource-manager URL for `path` with the `api-version` query set.
    pub(crate) fn arm_url(&self, path: &str, api_version: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.resource_manager_endpoint, path))?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    pub(crate) fn graph_url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.graph_endpoint, path))?)
    }

    async fn arm_token(&self) -> Result<String> {
        let token = self
            .credential
            .get_token(&self.cloud.resource_manager_scope())
            .await?;
        Ok(token.token)
    }

    /// Send a signed request. Non-success statuses are *not* turned into
    /// errors here.
    pub(crate) async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Response> {
        let token = self.arm_token().await?;
        debug!(method = %method, url = %url, "ARM request");

        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        debug!(status = response.status().as_u16(), "ARM response");
        Ok(response)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.send::<()>(Method::GET, url, None).await?;
        let response = error_for_status(response).await?;
        Ok(response.json().await?)
    }

    /// Synchronous PUT: the response body is the resource.
    pub(crate) async fn put_json<B, T>(&self, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::PUT, url, Some(body)).await?;
        let response = error_for_status(response).await?;
        Ok(response.json().await?)
    }

    /// Synchronous DELETE. 200 and 204 both mean done.
    pub(crate) async fn delete(&self, url: Url) -> Result<()> {
        let response = self.send::<()>(Method::DELETE, url, None).await?;
        error_for_status(response).await?;
        Ok(())
    }

    /// PUT that may continue asynchronously. The final value is fetched from
    /// the resource URL once the operation has succeeded.
    pub(crate) async fn begin_put<B, T>(&self, url: Url, body: &B) -> Result<Lro<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
    {
        let response = self.send(Method::PUT, url.clone(), Some(body)).await?;
        let response = error_for_status(response).await?;
        let status = response.status();

        if let Some(monitor) = Monitor::from_headers(response.headers(), status)? {
            debug!(resource = %url.path(), "PUT accepted, polling for completion");
            return Ok(Lro::pending(
                ArmPoller::<T>::new(self.clone(), monitor, Some(url)),
                self.poll_interval,
            ));
        }

        Ok(Lro::ready(response.json().await?))
    }

    /// DELETE that may continue asynchronously.
    pub(crate) async fn begin_delete(&self, url: Url) -> Result<Lro<()>> {
        let response = self.send::<()>(Method::DELETE, url.clone(), None).await?;
        let response = error_for_status(response).await?;
        let status = response.status();

        if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
            return Ok(Lro::ready(()));
        }

        match Monitor::from_headers(response.headers(), status)? {
            Some(monitor) => {
                debug!(resource = %url.path(), "DELETE accepted, polling for completion");
                Ok(Lro::pending(
                    ArmPoller::<()>::new(self.clone(), monitor, None),
                    self.poll_interval,
                ))
            }
            None => Ok(Lro::ready(())),
        }
    }

    /// Lazily fetched `value`/`nextLink` listing starting at `url`.
    pub(crate) fn pages<T>(&self, url: Result<Url>) -> hcpinfra_cloud::Pager<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        match url {
            Ok(url) => hcpinfra_cloud::Pager::new(ArmPages {
                client: self.clone(),
                next: Some(url),
                _marker: PhantomData,
            }),
            Err(err) => hcpinfra_cloud::Pager::from_error(err.into()),
        }
    }
}

impl std::fmt::Debug for AzureClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureClient")
            .field("subscription_id", &self.subscription_id)
            .field("cloud", &self.cloud.name)
            .field("resource_manager_endpoint", &self.resource_manager_endpoint)
            .finish_non_exhaustive()
    }
}

/// Turn a non-success response into a classified [`CloudError::Api`].
pub(crate) async fn error_for_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(AzureError::CloudError(parse_error_body(status, &text)))
}

pub(crate) fn parse_error_body(status: StatusCode, text: &str) -> CloudError {
    let (code, message) = match serde_json::from_str::<ErrorResponse>(text) {
        Ok(ErrorResponse { error: Some(body) }) => (body.code, body.message),
        _ => (None, None),
    };
    let message = message
        .filter(|m| !m.is_empty())
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    CloudError::api(status.as_u16(), code, message)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// How an accepted operation reports progress.
#[derive(Debug, Clone)]
enum Monitor {
    /// `Azure-AsyncOperation` status resource
    AsyncOperation(Url),
    /// `Location` header, 202 until done
    Location(Url),
}

impl Monitor {
    fn from_headers(headers: &HeaderMap, status: StatusCode) -> Result<Option<Self>> {
        let header_url = |name: &str| -> Result<Option<Url>> {
            match headers.get(name).and_then(|v| v.to_str().ok()) {
                Some(value) if !value.is_empty() => Ok(Some(Url::parse(value)?)),
                _ => Ok(None),
            }
        };

        if let Some(url) = header_url(AZURE_ASYNC_OPERATION)? {
            return Ok(Some(Monitor::AsyncOperation(url)));
        }
        if status == StatusCode::ACCEPTED
            && let Some(url) = header_url(LOCATION)?
        {
            return Ok(Some(Monitor::Location(url)));
        }
        Ok(None)
    }
}

struct ArmPoller<T> {
    client: AzureClient,
    monitor: Monitor,
    /// Resource to GET once the operation succeeded (PUT only)
    final_get: Option<Url>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> ArmPoller<T> {
    fn new(client: AzureClient, monitor: Monitor, final_get: Option<Url>) -> Self {
        Self {
            client,
            monitor,
            final_get,
            _marker: PhantomData,
        }
    }

    async fn finish(&self) -> Result<T> {
        match &self.final_get {
            Some(url) => self.client.get_json(url.clone()).await,
            // deletes complete with no body; `()` deserializes from null
            None => Ok(serde_json::from_value(serde_json::Value::Null)?),
        }
    }

    async fn poll_once(&mut self) -> Result<PollStatus<T>> {
        match self.monitor.clone() {
            Monitor::AsyncOperation(url) => {
                let response = self.client.send::<()>(Method::GET, url, None).await?;
                let response = error_for_status(response).await?;
                let delay = retry_after(response.headers());
                let op: OperationStatus = response.json().await?;

                match op.status.to_ascii_lowercase().as_str() {
                    "succeeded" => Ok(PollStatus::Done(self.finish().await?)),
                    "failed" | "canceled" | "cancelled" => {
                        let message = op
                            .error
                            .and_then(|e| match (e.code, e.message) {
                                (Some(code), Some(msg)) => Some(format!("{}: {}", code, msg)),
                                (None, Some(msg)) => Some(msg),
                                (Some(code), None) => Some(code),
                                (None, None) => None,
                            })
                            .unwrap_or_else(|| "no error details".to_string());
                        Err(AzureError::CloudError(CloudError::OperationFailed {
                            status: op.status,
                            message,
                        }))
                    }
                    _ => Ok(PollStatus::InProgress { retry_after: delay }),
                }
            }
            Monitor::Location(url) => {
                let response = self.client.send::<()>(Method::GET, url, None).await?;
                let response = error_for_status(response).await?;
                if response.status() == StatusCode::ACCEPTED {
                    return Ok(PollStatus::InProgress {
                        retry_after: retry_after(response.headers()),
                    });
                }
                Ok(PollStatus::Done(self.finish().await?))
            }
        }
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send> PollOperation<T> for ArmPoller<T> {
    async fn poll(&mut self) -> hcpinfra_cloud::Result<PollStatus<T>> {
        Ok(self.poll_once().await?)
    }

    fn describe(&self) -> String {
        match (&self.final_get, &self.monitor) {
            (Some(url), _) => url.path().to_string(),
            (None, Monitor::AsyncOperation(url) | Monitor::Location(url)) => {
                url.path().to_string()
            }
        }
    }
}

struct ArmPages<T> {
    client: AzureClient,
    next: Option<Url>,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: DeserializeOwned + Send> PageSource<T> for ArmPages<T> {
    async fn next_page(&mut self) -> hcpinfra_cloud::Result<Option<Vec<T>>> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };

        let page: ListResult<T> = self.client.get_json(url).await?;
        self.next = match page.next_link.filter(|link| !link.is_empty()) {
            Some(link) => Some(Url::parse(&link).map_err(AzureError::from)?),
            None => None,
        };
        Ok(Some(page.value))
    }
}
