use std::env;

/// Environment variable holding the backend base URL, e.g. `http://localhost:8080`.
pub const API_URL_VAR: &str = "CHAT_API_URL";
/// Environment variable holding the chat endpoint path, e.g. `/api/chat`.
pub const API_PATH_VAR: &str = "CHAT_API_PATH";

/// Resolved chat endpoint. Built fresh for every request so configuration
/// changes take effect without a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_url: String,
    path: String,
}

impl Endpoint {
    /// Resolve the endpoint from the environment. Returns `None` when either
    /// value is unset or blank; callers treat that as a pre-flight
    /// configuration failure and must not send a request.
    pub fn from_env() -> Option<Self> {
        Self::resolve(env::var(API_URL_VAR).ok(), env::var(API_PATH_VAR).ok())
    }

    pub fn resolve(base_url: Option<String>, path: Option<String>) -> Option<Self> {
        match (base_url, path) {
            (Some(base_url), Some(path))
                if !base_url.trim().is_empty() && !path.trim().is_empty() =>
            {
                Some(Self { base_url, path })
            }
            _ => None,
        }
    }

    /// Full request URL: base URL and path concatenated verbatim.
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolves_when_both_values_present() {
        let endpoint = Endpoint::resolve(
            Some("http://localhost:8080".to_string()),
            Some("/api/chat".to_string()),
        )
        .unwrap();
        assert_eq!(endpoint.url(), "http://localhost:8080/api/chat");
    }

    #[test]
    fn missing_either_value_fails() {
        assert_eq!(Endpoint::resolve(None, Some("/api/chat".to_string())), None);
        assert_eq!(
            Endpoint::resolve(Some("http://localhost".to_string()), None),
            None
        );
        assert_eq!(Endpoint::resolve(None, None), None);
    }

    #[test]
    fn blank_values_fail() {
        assert_eq!(
            Endpoint::resolve(Some("  ".to_string()), Some("/api/chat".to_string())),
            None
        );
        assert_eq!(
            Endpoint::resolve(Some("http://localhost".to_string()), Some("".to_string())),
            None
        );
    }
}
