use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{header::HeaderMap, Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::IntegrationError;

/// A JSON-over-HTTP client bound to one base URL, with a fixed set of default headers and a request timeout.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    client: Arc<Client>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RestClient({})", self.base_url)
    }
}

impl RestClient {
    pub fn new(base_url: &str, headers: HeaderMap, timeout: Duration) -> Result<Self, IntegrationError> {
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| IntegrationError::Initialization(e.to_string()))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Starts a request to `path`, relative to the base URL. Finish it with [`Self::send`].
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// A GET request with query parameters.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T, IntegrationError> {
        let mut req = self.request(Method::GET, path);
        if !params.is_empty() {
            req = req.query(params);
        }
        self.send(req).await
    }

    /// A POST request with a form-encoded body.
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, IntegrationError> {
        self.send(self.request(Method::POST, path).form(form)).await
    }

    pub async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, IntegrationError> {
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                IntegrationError::Timeout
            } else if e.is_builder() {
                IntegrationError::RestRequestError(e.to_string())
            } else {
                IntegrationError::RestResponseError(e.to_string())
            }
        })?;
        let status = response.status();
        trace!("REST query to {} returned {status}", response.url().path());
        if status.is_success() {
            response.json::<T>().await.map_err(|e| IntegrationError::JsonError(e.to_string()))
        } else {
            let message = response.text().await.map_err(|e| IntegrationError::RestResponseError(e.to_string()))?;
            Err(IntegrationError::QueryError { status: status.as_u16(), message })
        }
    }
}
