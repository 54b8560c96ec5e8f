//! The helper API: pure formatting, parsing, and matching functions exposed
//! to builder scripts as `connectionHelper.*`.
//!
//! Every function here is total over string inputs and free of side effects;
//! the executor wires them into the capability bundle.

use wireline_types::{attrs, AttrMap, ParameterList};

/// Characters in a value that force brace wrapping.
fn needs_wrapping(value: &str) -> bool {
    value.is_empty() || value.chars().any(|c| c == ';' || c == '=' || c.is_whitespace())
}

/// Render a single `key=value` driver parameter.
///
/// Total over any input: a missing value renders as empty. Values containing
/// a delimiter (`;`, `=`, whitespace) or empty values are wrapped in braces
/// so the driver reads them verbatim. Values are never truncated, reordered,
/// or masked — masking happens in the log sink only.
pub fn format_key_value_pair(key: &str, value: Option<&str>) -> String {
    let value = value.unwrap_or("");
    if needs_wrapping(value) {
        format!("{key}={{{value}}}")
    } else {
        format!("{key}={value}")
    }
}

/// Parse a user-supplied `key=value;key=value` extras string.
///
/// Fragments without `=` or with an empty key are dropped, not errors. A
/// later duplicate key overwrites the earlier value while keeping the
/// first-occurrence position. Escaping of `;` or `=` inside values is not
/// defined by the grammar; such values are out of scope here.
pub fn parse_odbc_connect_string(extras: &str) -> ParameterList {
    let mut params = ParameterList::new();
    for fragment in extras.split(';') {
        let Some((key, value)) = fragment.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        params.set(key, value);
    }
    params
}

/// Attribute-set equality as seen by a pooling/reuse layer.
///
/// Two maps match iff every well-known attribute present in either map has
/// the same value under normalization: unset and empty are the same "unset"
/// value. Vendor-custom keys do not participate. Reflexive and symmetric by
/// construction; neither input is ever mutated.
pub fn matches_connection_attributes(a: &AttrMap, b: &AttrMap) -> bool {
    attrs::SYMBOLS.iter().all(|(_, key)| {
        let left = a.get(key).unwrap_or("");
        let right = b.get(key).unwrap_or("");
        left == right
    })
}

/// Extend a required-attribute list with the server impersonation
/// attributes: the auth-mode attribute always, plus the impersonated user
/// when impersonation is selected.
pub fn impersonation_attributes(attr: &AttrMap, mut required: Vec<String>) -> Vec<String> {
    if !required.iter().any(|r| r == attrs::SERVER_AUTH_MODE) {
        required.push(attrs::SERVER_AUTH_MODE.to_string());
    }
    if attr.get(attrs::SERVER_AUTH_MODE) == Some(attrs::AUTH_MODE_DB_IMPERSONATE)
        && !required.iter().any(|r| r == attrs::SERVER_AUTH_USER)
    {
        required.push(attrs::SERVER_AUTH_USER.to_string());
    }
    required
}

/// Attribute keys whose values are secrets and must never reach a log sink
/// in the clear.
const SECRET_KEYS: &[&str] = &[attrs::PASSWORD, "ACCESSTOKEN", "oauth-refresh-token"];

/// Replace any occurrence of a secret attribute value in `message` with a
/// fixed mask. Applied to captured `logging.log` output only; returned
/// parameters always carry the real value.
pub fn mask_secrets(attr: &AttrMap, message: &str) -> String {
    let mut masked = message.to_string();
    for key in SECRET_KEYS {
        if let Some(value) = attr.get(key) {
            if !value.is_empty() {
                masked = masked.replace(value, "********");
            }
        }
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- format_key_value_pair ---

    #[test]
    fn plain_value_is_not_wrapped() {
        assert_eq!(format_key_value_pair("UID", Some("alice")), "UID=alice");
    }

    #[test]
    fn delimiter_value_is_wrapped() {
        assert_eq!(
            format_key_value_pair("PWD", Some("p@ss;w")),
            "PWD={p@ss;w}"
        );
        assert_eq!(format_key_value_pair("K", Some("a=b")), "K={a=b}");
        assert_eq!(format_key_value_pair("K", Some("a b")), "K={a b}");
    }

    #[test]
    fn empty_and_missing_values_are_wrapped() {
        assert_eq!(format_key_value_pair("K", Some("")), "K={}");
        assert_eq!(format_key_value_pair("K", None), "K={}");
    }

    #[test]
    fn value_is_never_truncated() {
        let long = "x".repeat(4096);
        let formatted = format_key_value_pair("K", Some(&long));
        assert_eq!(formatted, format!("K={long}"));
    }

    // --- parse_odbc_connect_string ---

    #[test]
    fn extras_basic() {
        let params = parse_odbc_connect_string("a=1;b=2");
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "2")]);
    }

    #[test]
    fn extras_malformed_fragment_dropped() {
        let params = parse_odbc_connect_string("bad;b=2");
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("b", "2")]);
    }

    #[test]
    fn extras_empty_key_dropped() {
        let params = parse_odbc_connect_string("=1;b=2;;");
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("b", "2")]);
    }

    #[test]
    fn extras_duplicate_key_last_wins_first_position() {
        let params = parse_odbc_connect_string("a=1;b=2;a=3");
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn extras_splits_value_on_first_equals() {
        let params = parse_odbc_connect_string("k=a=b");
        assert_eq!(params.get("k"), Some("a=b"));
    }

    #[test]
    fn extras_empty_string_yields_empty_list() {
        assert!(parse_odbc_connect_string("").is_empty());
    }

    // --- matches_connection_attributes ---

    fn map(entries: &[(&str, &str)]) -> AttrMap {
        entries.iter().copied().collect()
    }

    #[test]
    fn matcher_is_reflexive() {
        let samples = [
            map(&[]),
            map(&[("server", "db1"), ("port", "5432")]),
            map(&[("server", ""), ("username", "alice"), ("v-custom", "x")]),
        ];
        for a in &samples {
            assert!(matches_connection_attributes(a, a));
        }
    }

    #[test]
    fn matcher_is_symmetric() {
        let a = map(&[("server", "db1"), ("sslmode", "")]);
        let b = map(&[("server", "db1")]);
        let c = map(&[("server", "db2")]);
        assert_eq!(
            matches_connection_attributes(&a, &b),
            matches_connection_attributes(&b, &a)
        );
        assert_eq!(
            matches_connection_attributes(&a, &c),
            matches_connection_attributes(&c, &a)
        );
    }

    #[test]
    fn matcher_treats_unset_and_empty_alike() {
        let a = map(&[("server", "db1"), ("sslmode", "")]);
        let b = map(&[("server", "db1")]);
        assert!(matches_connection_attributes(&a, &b));
    }

    #[test]
    fn matcher_detects_well_known_difference() {
        let a = map(&[("server", "db1")]);
        let b = map(&[("server", "db2")]);
        assert!(!matches_connection_attributes(&a, &b));
    }

    #[test]
    fn matcher_ignores_vendor_custom_keys() {
        let a = map(&[("server", "db1"), ("v-dremio-product", "software")]);
        let b = map(&[("server", "db1"), ("v-dremio-product", "cloud")]);
        assert!(matches_connection_attributes(&a, &b));
    }

    // --- impersonation_attributes ---

    #[test]
    fn impersonation_appends_auth_mode() {
        let attr = map(&[("server", "db1")]);
        let required = impersonation_attributes(&attr, vec!["server".into()]);
        assert_eq!(required, vec!["server", "server-auth-mode"]);
    }

    #[test]
    fn impersonation_appends_user_when_selected() {
        let attr = map(&[("server-auth-mode", "auth-mode-db-impersonate")]);
        let required = impersonation_attributes(&attr, Vec::new());
        assert_eq!(required, vec!["server-auth-mode", "server-auth-user"]);
    }

    #[test]
    fn impersonation_is_idempotent() {
        let attr = map(&[("server-auth-mode", "auth-mode-db-impersonate")]);
        let once = impersonation_attributes(&attr, Vec::new());
        let twice = impersonation_attributes(&attr, once.clone());
        assert_eq!(once, twice);
    }

    // --- mask_secrets ---

    #[test]
    fn masks_password_value_in_log_line() {
        let attr = map(&[("username", "alice"), ("password", "s3cret")]);
        assert_eq!(
            mask_secrets(&attr, "password|s3cret"),
            "password|********"
        );
    }

    #[test]
    fn empty_secret_is_not_masked() {
        let attr = map(&[("password", "")]);
        assert_eq!(mask_secrets(&attr, "nothing to hide"), "nothing to hide");
    }
}
