//! Storage key constants.

/// Keys the coordinator reads and writes in steady state.
///
/// These names are shared with older clients and must not change.
pub struct StorageKeys;

impl StorageKeys {
    /// Access token (primary name)
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Access token (redundant name read at bootstrap)
    pub const AUTH_TOKEN: &'static str = "auth_token";

    /// Access token (redundant camel-case name)
    pub const USER_TOKEN: &'static str = "userToken";

    /// Owning user identifier
    pub const USER_ID: &'static str = "userId";

    /// Refresh token
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// Preferred UI language of the signed-in user
    pub const USER_LANGUAGE: &'static str = "user_language";

    /// Every key tied to a session, in the order they are cleared.
    pub const SESSION_KEYS: [&'static str; 6] = [
        Self::ACCESS_TOKEN,
        Self::AUTH_TOKEN,
        Self::USER_TOKEN,
        Self::USER_ID,
        Self::REFRESH_TOKEN,
        Self::USER_LANGUAGE,
    ];

    /// Keys that all carry the access token.
    pub const ACCESS_TOKEN_KEYS: [&'static str; 3] =
        [Self::ACCESS_TOKEN, Self::AUTH_TOKEN, Self::USER_TOKEN];
}
