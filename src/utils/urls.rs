use url::{ParseError, Url};

pub fn to_url(host: String) -> Result<Url, ParseError> {
    Url::parse(&host)
}

// scheme://host[:port] with no trailing slash, the form browsers send in `Origin`
pub fn to_origin(raw: &str) -> Option<String> {
    let url = to_url(raw.trim().to_string()).ok()?;
    let origin = url.origin();
    if origin.is_tuple() {
        Some(origin.ascii_serialization())
    } else {
        None
    }
}

pub fn join_path(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
