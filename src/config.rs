/// Server address used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:7880";

/// How to join a room. The token is fetched by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub url: String,
    pub token: String,
    /// Publish the camera on join.
    pub camera_enabled: bool,
    /// Publish the microphone on join.
    pub microphone_enabled: bool,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            token: String::new(),
            camera_enabled: true,
            microphone_enabled: false,
        }
    }
}
