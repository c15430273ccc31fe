//! Transport seam between the connection task and the wire.

use async_trait::async_trait;
use url::Url;

use crate::error::Result;
use crate::protocol::HubMessage;

/// Query parameter carrying the bearer token.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Opens links to a hub.
#[async_trait]
pub trait HubTransport: Send + Sync + 'static {
    /// Transport name, for logs.
    fn name(&self) -> &str;

    /// Open a link and complete the protocol handshake.
    async fn connect(&self, url: &Url) -> Result<Box<dyn HubLink>>;
}

/// One established, handshaken link.
#[async_trait]
pub trait HubLink: Send {
    /// Send a message to the hub.
    async fn send(&mut self, message: HubMessage) -> Result<()>;

    /// Receive the next message. Returns `None` once the link is closed.
    async fn recv(&mut self) -> Option<Result<HubMessage>>;

    /// Close the link. Safe to call more than once.
    async fn close(&mut self);
}

/// Supplies the bearer token for each connection attempt.
///
/// Invoked fresh on every connect and reconnect, never cached, so that token
/// rotation in the surrounding auth system is respected.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current bearer token, if any.
    async fn access_token(&self) -> Option<String>;
}

#[async_trait]
impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    async fn access_token(&self) -> Option<String> {
        (self)()
    }
}

/// Attach the access token to the hub URL.
///
/// Any existing `access_token` parameter is replaced; an empty token removes it.
pub fn with_access_token(url: &Url, token: Option<&str>) -> Url {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != ACCESS_TOKEN_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = url.clone();
    url.set_query(None);
    let token = token.map(str::trim).filter(|t| !t.is_empty());
    if retained.is_empty() && token.is_none() {
        return url;
    }

    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &retained {
            pairs.append_pair(k, v);
        }
        if let Some(token) = token {
            pairs.append_pair(ACCESS_TOKEN_PARAM, token);
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_access_token_appends() {
        let url = Url::parse("https://api.example.com/hubs/notifications").unwrap();
        let with_token = with_access_token(&url, Some("abc"));
        assert_eq!(
            with_token.as_str(),
            "https://api.example.com/hubs/notifications?access_token=abc"
        );
    }

    #[test]
    fn test_with_access_token_replaces_and_keeps_other_params() {
        let url = Url::parse("https://h/hub?tenant=1&access_token=old").unwrap();
        let with_token = with_access_token(&url, Some("new"));
        assert_eq!(with_token.as_str(), "https://h/hub?tenant=1&access_token=new");
    }

    #[test]
    fn test_empty_token_is_omitted() {
        let url = Url::parse("https://h/hub?access_token=old").unwrap();
        assert_eq!(with_access_token(&url, Some("  ")).as_str(), "https://h/hub");
        assert_eq!(with_access_token(&url, None).as_str(), "https://h/hub");
    }

    #[tokio::test]
    async fn test_closure_token_provider() {
        let provider = || Some("t".to_string());
        assert_eq!(provider.access_token().await.as_deref(), Some("t"));
    }
}
