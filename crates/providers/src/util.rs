use mr_domain::error::Error;

/// Translate a reqwest transport failure into the domain taxonomy.
///
/// Timeouts and connection failures surface as `timeout_error` to the
/// caller; anything else is a generic HTTP error.
pub(crate) fn from_reqwest(provider: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::Timeout(format!("provider {provider}: {e}"))
    } else {
        Error::Http(format!("provider {provider}: {e}"))
    }
}

/// Clip an upstream error body to a short diagnostic.
pub(crate) fn short_diagnostic(body: &str) -> String {
    const MAX: usize = 240;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        trimmed.to_string()
    } else {
        let mut end = MAX;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}
