//! Client-side session state.

use crate::auth::Identity;
use crate::session::TokenPair;

/// Tokens and profile of the logged-in user.
///
/// Created at login (or when a stored pair is restored), replaced on every
/// refresh, and cleared at logout or when a refresh fails.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    tokens: Option<TokenPair>,
    identity: Option<Identity>,
}

impl SessionContext {
    pub fn is_active(&self) -> bool {
        self.tokens.is_some()
    }

    pub fn tokens(&self) -> Option<&TokenPair> {
        self.tokens.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.refresh_token.as_str())
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Start a session, or replace the tokens of the current one.
    /// The cached identity survives a token replacement.
    pub fn set_tokens(&mut self, tokens: TokenPair) {
        self.tokens = Some(tokens);
    }

    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    pub fn clear(&mut self) {
        self.tokens = None;
        self.identity = None;
    }
}
