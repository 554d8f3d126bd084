//! Rate-limit route keys.

use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Path segments whose id scopes a bucket of its own
const MAJOR_PARAMETERS: [&str; 3] = ["channels", "guilds", "webhooks"];

static SNOWFLAKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{1,20}$").expect("snowflake pattern is valid"));

/// Identifies an endpoint class for rate-limit purposes.
///
/// Coarser than a URL: two requests with the same route share one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Route(String);

impl Route {
    /// Use an explicit, opaque route key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the route for a concrete request path.
    ///
    /// Ids following a major parameter keep their value; every other
    /// numeric segment collapses to `{id}`. Query strings are ignored.
    pub fn from_path(method: &Method, path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();

        let mut previous: Option<&str> = None;
        let segments: Vec<&str> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                let keep = previous.is_some_and(|p| MAJOR_PARAMETERS.contains(&p));
                previous = Some(segment);
                if SNOWFLAKE.is_match(segment) && !keep {
                    "{id}"
                } else {
                    segment
                }
            })
            .collect();

        Self(format!("{} /{}", method, segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Route {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for Route {
    fn from(key: String) -> Self {
        Self(key)
    }
}
