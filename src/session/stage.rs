//! Fetch-then-stage helpers on [`AuthSession`].
//!
//! Only successful responses reach the staging backend: a non-2xx status or
//! an empty body fails before anything is written.

use tracing::{debug, info};

use super::AuthSession;
use crate::error::{Error, Result};
use crate::executor::{resolve_url, EndpointRequest, ExecutedResponse};
use crate::http_client::{HttpMethod, HttpResponse};
use crate::staging::{StagedResponse, StoreOutcome};
use crate::unwrap::Payload;

impl AuthSession {
    /// Stage an HTTP response as-is.
    pub async fn store(
        &self,
        url: &str,
        service: &str,
        method: &str,
        response: &HttpResponse,
    ) -> Result<StoreOutcome> {
        if !response.is_success() {
            return Err(Error::Status {
                status: response.status.as_u16(),
                url: url.to_string(),
            });
        }
        if response.body.trim().is_empty() {
            return Err(Error::EmptyResponse(url.to_string()));
        }

        let staged = StagedResponse::new(url, service, method, response.body.clone())
            .with_request_headers(response.request_headers.clone())
            .with_response_headers(response.headers.clone());
        self.store_staged(&staged).await
    }

    /// Stage an already assembled record.
    pub async fn store_staged(&self, staged: &StagedResponse) -> Result<StoreOutcome> {
        let store = self
            .store
            .as_deref()
            .ok_or(Error::StorageUnavailable("no staging backend configured"))?;
        if staged.response_body.trim().is_empty() {
            return Err(Error::EmptyResponse(staged.url.clone()));
        }

        let outcome = store.store(staged).await?;
        match outcome {
            StoreOutcome::Inserted => info!(
                "Staged {} {} as {} ({})",
                staged.method,
                staged.url,
                staged.service,
                store.backend_name()
            ),
            StoreOutcome::Duplicate => debug!(
                "{} {} already staged for {}",
                staged.method, staged.url, staged.service
            ),
        }
        Ok(outcome)
    }

    /// [`AuthSession::fetch`] a page and stage its unwrapped body together
    /// with the HTTP exchange's headers.
    pub async fn fetch_and_store(
        &self,
        url: &str,
        service: &str,
    ) -> Result<(Payload, StoreOutcome)> {
        if self.store.is_none() {
            return Err(Error::StorageUnavailable("no staging backend configured"));
        }
        let url = resolve_url(&self.settings.base_url, url);
        let (payload, response) = self.fetch_page(&url).await?;
        let staged = StagedResponse::new(url, service, "GET", payload.to_body())
            .with_request_headers(response.request_headers)
            .with_response_headers(response.headers);
        let outcome = self.store_staged(&staged).await?;
        Ok((payload, outcome))
    }

    /// Run `request` through the executor and stage the JSON payload.
    pub async fn execute_and_store(
        &self,
        request: &EndpointRequest,
        service: &str,
    ) -> Result<(ExecutedResponse, StoreOutcome)> {
        if self.store.is_none() {
            return Err(Error::StorageUnavailable("no staging backend configured"));
        }
        let executed = self.execute(request).await?;
        if !(200..300).contains(&executed.status) {
            return Err(Error::Status {
                status: executed.status,
                url: executed.url.clone(),
            });
        }

        let url = staging_url(&resolve_url(&self.settings.base_url, &request.path), request);
        let staged = StagedResponse::new(
            url,
            service,
            request.method.as_str(),
            executed.payload.to_string(),
        )
        .with_request_headers(executed.request_headers.clone())
        .with_response_headers(executed.response_headers.clone());
        let outcome = self.store_staged(&staged).await?;
        Ok((executed, outcome))
    }
}

/// Key URL for an endpoint call: GET parameters are part of the identity,
/// POST form fields are not.
fn staging_url(url: &str, request: &EndpointRequest) -> String {
    if request.method != HttpMethod::Get || request.params.is_empty() {
        return url.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&request.params)
        .finish();
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, sep, query)
}
