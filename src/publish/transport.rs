/// HTTP delivery of encoded payloads
use async_trait::async_trait;
use log::debug;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// One request to a sink: endpoint, headers and optional body
#[derive(Debug, Clone)]
pub struct Delivery {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

impl Delivery {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: Url, body: String) -> Self {
        Self {
            method: Method::Post,
            url,
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
}

/// Delivers a request and reports the outcome; never retries
#[async_trait]
pub trait Transport: Send + Sync {
    /// Non-2xx answers come back as `PublishError::Status`
    async fn deliver(&self, delivery: Delivery) -> Result<Response, PublishError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `timeout` bounds each request from connect to the last body byte
    pub fn new(timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Request(format!("HTTP client setup: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, delivery: Delivery) -> Result<Response, PublishError> {
        let mut request = match delivery.method {
            Method::Get => self.client.get(delivery.url.clone()),
            Method::Post => self.client.post(delivery.url.clone()),
        };
        for (name, value) in &delivery.headers {
            request = request.header(*name, value.as_str());
        }
        if let Some(body) = delivery.body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PublishError::Timeout
            } else {
                PublishError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!("{} {} -> {} {}", delivery.method, delivery.url, status, body);

        if !status.is_success() {
            return Err(PublishError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Response {
            status: status.as_u16(),
        })
    }
}
