use url::Url;

use crate::errors::{CoreError, CoreResult};

/// Canonical string form of a stream URL used for cache naming.
///
/// Equivalent URLs map to the same string:
/// - fragment dropped
/// - scheme and host lower-cased
/// - default ports removed
/// - query parameters sorted (by key, then value), so reordered parameters share a cache
pub fn canonicalize_identifier(url: &Url) -> CoreResult<String> {
    let mut canonical = url.clone();

    canonical.set_fragment(None);

    let scheme = canonical.scheme();
    let scheme_lower = scheme.to_lowercase();
    if scheme != scheme_lower {
        let _ = canonical.set_scheme(&scheme_lower);
    }

    if let Some(host) = canonical.host_str() {
        let host_lower = host.to_lowercase();
        if host != host_lower {
            canonical
                .set_host(Some(&host_lower))
                .map_err(|e| CoreError::Canonicalization(e.to_string()))?;
        }
    }

    match (canonical.scheme(), canonical.port()) {
        ("https", Some(443)) | ("http", Some(80)) => {
            let _ = canonical.set_port(None);
        }
        _ => {}
    }

    let mut pairs: Vec<(String, String)> = canonical
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        canonical.set_query(None);
    } else {
        pairs.sort();
        canonical.query_pairs_mut().clear().extend_pairs(pairs);
    }

    Ok(canonical.to_string())
}
