//! Query-string and path-segment encoding for backend endpoints.

use std::collections::BTreeMap;
use url::form_urlencoded;

/// Query parameters, emitted in key order.
pub type Params = BTreeMap<String, String>;

/// Serialize params as `application/x-www-form-urlencoded`.
pub fn encode_query(params: &Params) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

/// Append params to an endpoint, respecting any query it already carries.
pub fn append_query(endpoint: &str, params: &Params) -> String {
    if params.is_empty() {
        return endpoint.to_string();
    }
    let sep = if endpoint.contains('?') { '&' } else { '?' };
    format!("{}{}{}", endpoint, sep, encode_query(params))
}

/// Parse a query string (leading `?` optional). Later duplicates win.
pub fn parse_query(query: &str) -> Params {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

/// Percent-encode a single path segment (spaces become `%20`, `/` is escaped).
pub fn encode_path_segment(segment: &str) -> String {
    // byte_serialize escapes a literal '+' as %2B, so any '+' left is a space.
    form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn encode_then_parse_recovers_params() {
        let p = params(&[("a", "1"), ("b", "x y")]);
        let encoded = encode_query(&p);
        assert_eq!(encoded, "a=1&b=x+y");
        assert_eq!(parse_query(&encoded), p);
    }

    #[test]
    fn reserved_characters_survive() {
        let p = params(&[("q", "de_dust2&mode=5v5"), ("tag", "100%")]);
        assert_eq!(parse_query(&format!("?{}", encode_query(&p))), p);
    }

    #[test]
    fn append_respects_existing_query() {
        let p = params(&[("page", "2")]);
        assert_eq!(append_query("/players", &p), "/players?page=2");
        assert_eq!(
            append_query("/players?sort=kills", &p),
            "/players?sort=kills&page=2"
        );
        assert_eq!(append_query("/players", &Params::new()), "/players");
    }

    #[test]
    fn path_segments_escape_spaces_and_slashes() {
        assert_eq!(encode_path_segment("de_dust2"), "de_dust2");
        assert_eq!(encode_path_segment("zm big/map"), "zm%20big%2Fmap");
        assert_eq!(encode_path_segment("a+b"), "a%2Bb");
    }
}
