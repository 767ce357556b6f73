use hyper::HeaderMap;

/// Derive the client identifier used for IP filtering and rate limiting.
///
/// Precedence: `CF-Connecting-IP`, then the first entry of
/// `X-Forwarded-For`, then `X-Real-IP`, then the literal `"unknown"`.
pub fn client_identifier(headers: &HeaderMap) -> String {
    if let Some(ip) = header_str(headers, "cf-connecting-ip") {
        return ip.to_string();
    }

    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        // x-forwarded-for can contain multiple IPs, take the first one
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(ip) = header_str(headers, "x-real-ip") {
        return ip.to_string();
    }

    "unknown".to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
