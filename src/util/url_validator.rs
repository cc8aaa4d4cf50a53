use thiserror::Error;
use url::Url;

/// Errors from validating the configured feed endpoint.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain HTTP to a non-local host would leak the API token.
    #[error("Insecure feed URL: HTTPS required (except localhost for testing)")]
    Insecure,
    /// The URL has no host component.
    #[error("Feed URL has no host")]
    MissingHost,
}

/// Validates the base URL of the air-quality feed.
///
/// The token travels as a query parameter, so HTTPS is required. Plain HTTP
/// is allowed only for `localhost` and loopback addresses, which is what
/// local mock servers use.
///
/// # Examples
///
/// ```
/// use aqiwatch::util::validate_feed_base;
///
/// assert!(validate_feed_base("https://api.waqi.info").is_ok());
/// assert!(validate_feed_base("http://127.0.0.1:8080").is_ok());
/// assert!(validate_feed_base("http://api.waqi.info").is_err());
/// assert!(validate_feed_base("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_base(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;

    match url.scheme() {
        "https" => {}
        "http" => {
            let is_local = host == "localhost" || host == "127.0.0.1" || host == "[::1]";
            if !is_local {
                tracing::error!(url = %url_str, "Rejecting non-HTTPS feed URL");
                return Err(UrlValidationError::Insecure);
            }
            tracing::warn!(url = %url_str, "Using non-HTTPS feed URL (localhost only)");
        }
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    Ok(url)
}
