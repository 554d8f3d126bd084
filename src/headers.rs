//! Protocol and authentication headers shared by every request of a client.

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT,
};

use crate::error::{AgentError, Result};

/// Room for the formatted `Authorization` value, terminator included.
pub const AUTHORIZATION_CAPACITY: usize = 128;

pub const RATELIMIT_PRECISION: HeaderName = HeaderName::from_static("x-ratelimit-precision");

/// Immutable header set built once per client
#[derive(Debug, Clone)]
pub struct ClientHeaders {
    pairs: Vec<(HeaderName, HeaderValue)>,
}

impl ClientHeaders {
    /// Build the five request headers for a bot token.
    ///
    /// Fails before anything is allocated if `Bot <token>` would not fit in
    /// [`AUTHORIZATION_CAPACITY`], or if either value is not a legal header
    /// value.
    pub fn build(token: &str, user_agent: &str) -> Result<Self> {
        let authorization = format!("Bot {}", token);
        if authorization.len() >= AUTHORIZATION_CAPACITY {
            return Err(AgentError::Configuration(format!(
                "authorization value is {} bytes, limit is {}",
                authorization.len(),
                AUTHORIZATION_CAPACITY - 1
            )));
        }

        let mut authorization = HeaderValue::from_str(&authorization).map_err(|_| {
            AgentError::Configuration("token contains characters not allowed in a header".to_string())
        })?;
        authorization.set_sensitive(true);

        let user_agent = HeaderValue::from_str(user_agent).map_err(|_| {
            AgentError::Configuration(
                "user agent contains characters not allowed in a header".to_string(),
            )
        })?;

        Ok(Self {
            pairs: vec![
                (CONTENT_TYPE, HeaderValue::from_static("application/json")),
                (RATELIMIT_PRECISION, HeaderValue::from_static("millisecond")),
                (ACCEPT, HeaderValue::from_static("application/json")),
                (AUTHORIZATION, authorization),
                (USER_AGENT, user_agent),
            ],
        })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.pairs.iter().map(|(name, value)| (name, value))
    }

    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn to_header_map(&self) -> HeaderMap {
        self.pairs.iter().cloned().collect()
    }
}
