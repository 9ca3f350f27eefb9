//! Bearer token supply from the host's auth provider.

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

/// Supplies the bearer token attached to remote calls.
///
/// The token is passed through untouched; the sync layer only reacts to the
/// remote answering `Unauthorized`.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<Option<String>>;
}

/// A fixed token, or none at all.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self(crate::util::normalize_text_option(token))
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.0.is_some() { "[REDACTED]" } else { "None" };
        formatter.debug_tuple("StaticToken").field(&shown).finish()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn fetch_token(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_drops_blank_values() {
        assert_eq!(StaticToken::new(Some("  ".into())).fetch_token().await.unwrap(), None);
        assert_eq!(
            StaticToken::new(Some("abc".into())).fetch_token().await.unwrap(),
            Some("abc".to_string())
        );
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", StaticToken::new(Some("secret".into())));
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
