pub struct StorageKeys;

impl StorageKeys {
    pub const ACCESS_TOKEN: &'static str = "access_token";

    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// JSON-encoded [`crate::SessionMeta`].
    pub const SESSION_META: &'static str = "session_meta";

    pub const ALL: [&'static str; 3] = [Self::ACCESS_TOKEN, Self::REFRESH_TOKEN, Self::SESSION_META];
}
