//! Shared test helpers: mock token endpoint wiring and form body matching.

use wiremock::{Match, MockServer, Request};

use crate::secret::Secret;
use crate::token::ExchangeClient;

pub const TOKEN_PATH: &str = "/o/oauth2/token";

/// Exchange client for client ID `cid` / secret `secret` aimed at a mock server.
pub fn exchange_client(server: &MockServer) -> ExchangeClient {
    ExchangeClient::new("cid", Secret::new("secret"))
        .with_endpoint(format!("{}{TOKEN_PATH}", server.uri()))
}

/// Matches a urlencoded form body containing exactly the given pairs, in any order.
pub struct FormBody(Vec<(String, String)>);

impl FormBody {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        pairs.sort();
        Self(pairs)
    }
}

impl Match for FormBody {
    fn matches(&self, request: &Request) -> bool {
        let mut pairs: Vec<(String, String)> =
            url::form_urlencoded::parse(&request.body).into_owned().collect();
        pairs.sort();
        pairs == self.0
    }
}
