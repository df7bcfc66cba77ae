pub mod client;

pub use client::HttpClient;

use reqwest::Method;
use url::Url;

/// Encoding of an outgoing request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    Json,
    FormUrlEncoded,
    None,
}

impl BodyType {
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            BodyType::Json => Some("application/json"),
            BodyType::FormUrlEncoded => Some("application/x-www-form-urlencoded"),
            BodyType::None => None,
        }
    }
}

/// A fully resolved request, ready for the client.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub body: String,
    pub body_type: BodyType,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: String::new(),
            body_type: BodyType::None,
        }
    }

    pub fn post(url: Url, body: String, body_type: BodyType) -> Self {
        Self {
            method: Method::POST,
            url,
            body,
            body_type,
        }
    }
}
