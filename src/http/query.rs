//! Query string merging for upstream paths.
//!
//! A service may carry a default query. The client's own query is merged on
//! top of it: keys the client sends replace the default values for that key,
//! everything else is kept. Default keys keep their position; new client keys
//! are appended in the order the client sent them.

use std::collections::HashSet;

use url::form_urlencoded;

/// Decode a query string into ordered pairs.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

/// Merge client pairs over default pairs.
pub fn merge_pairs(defaults: &[(String, String)], client: &[(String, String)]) -> Vec<(String, String)> {
    let client_keys: HashSet<&str> = client.iter().map(|(k, _)| k.as_str()).collect();
    let mut emitted: HashSet<&str> = HashSet::new();
    let mut merged = Vec::with_capacity(defaults.len() + client.len());

    for (key, value) in defaults {
        if !client_keys.contains(key.as_str()) {
            merged.push((key.clone(), value.clone()));
        } else if emitted.insert(key.as_str()) {
            merged.extend(client.iter().filter(|(k, _)| k == key).cloned());
        }
    }
    merged.extend(
        client
            .iter()
            .filter(|(k, _)| !emitted.contains(k.as_str()))
            .cloned(),
    );
    merged
}

/// Append the merged query to `path`.
pub fn merge_query(path: &str, defaults: &[(String, String)], client_query: Option<&str>) -> String {
    let client = client_query.map(parse_query).unwrap_or_default();
    let merged = merge_pairs(defaults, &client);
    if merged.is_empty() {
        return path.to_string();
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(merged)
        .finish();
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}", path, separator, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_wins_on_collision() {
        let defaults = parse_query("a=1&b=2&c=3");
        assert_eq!(merge_query("/ws1", &defaults, Some("b=9")), "/ws1?a=1&b=9&c=3");
    }

    #[test]
    fn union_appends_new_client_keys() {
        let defaults = parse_query("a=1");
        assert_eq!(merge_query("/ws", &defaults, Some("z=26&a=0")), "/ws?a=0&z=26");
    }

    #[test]
    fn repeated_client_keys_replace_default_as_a_group() {
        let defaults = parse_query("tag=x&page=1");
        assert_eq!(
            merge_query("/ws", &defaults, Some("tag=a&tag=b")),
            "/ws?tag=a&tag=b&page=1"
        );
    }

    #[test]
    fn no_query_leaves_path_untouched() {
        assert_eq!(merge_query("/ws", &[], None), "/ws");
        assert_eq!(merge_query("/ws", &[], Some("")), "/ws");
    }

    #[test]
    fn defaults_only() {
        let defaults = parse_query("?token=abc");
        assert_eq!(merge_query("/ws", &defaults, None), "/ws?token=abc");
    }

    #[test]
    fn values_are_reencoded() {
        let defaults = parse_query("q=hello%20world");
        assert_eq!(merge_query("/ws", &defaults, None), "/ws?q=hello+world");
    }
}
