pub mod rate_limit;
pub mod robots;

/// Authority (host[:port]) of a URL, the key for rate limiting and robots
/// caching. Unparseable URLs map to an empty authority bucket.
pub fn authority_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default();
            match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            }
        }
        Err(_) => String::new(),
    }
}
