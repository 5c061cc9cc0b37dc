//! Google OAuth constants for Chrome Web Store publishing
//!
//! The token endpoint is the same for the initial code exchange and for
//! refreshes. The redirect URI is the out-of-band value used when the
//! authorization code was obtained by pasting it from the consent page.

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/token";

/// Out-of-band redirect URI sent with the authorization code grant
pub const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Grant type for the initial authorization code exchange
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

/// Grant type for minting a new access token from a refresh token
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
