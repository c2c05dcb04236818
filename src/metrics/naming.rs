//! Metric naming
//!
//! Names are dot-segmented. Tag-bearing metrics append a canonical tag string
//! (`key=value` pairs, sorted, comma-joined) after a dot, so the same tag set
//! always yields the same name regardless of insertion order.

use std::collections::HashMap;

/// Canonical, sorted `key=value,key=value` form of `tags`.
pub fn stringify_tags<K, V, S>(tags: &HashMap<K, V, S>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<String> = tags
        .iter()
        .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
        .collect();
    pairs.sort();
    pairs.join(",")
}

/// `name` followed by the canonical tag string, or `name` alone without tags.
pub fn make_metric<K, V, S>(name: &str, tags: &HashMap<K, V, S>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if tags.is_empty() {
        return name.to_string();
    }
    format!("{}.{}", name, stringify_tags(tags))
}

/// Join a prefix and a name with a single dot.
///
/// Trailing dots on the prefix are ignored so `"host."` and `"host"` behave
/// the same; an empty prefix leaves the name untouched.
pub fn join(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('.');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_tags_sorted() {
        let mut a = HashMap::new();
        a.insert("path", "/");
        a.insert("fstype", "ext4");

        let mut b = HashMap::new();
        b.insert("fstype", "ext4");
        b.insert("path", "/");

        assert_eq!(stringify_tags(&a), "fstype=ext4,path=/");
        assert_eq!(stringify_tags(&a), stringify_tags(&b));
    }

    #[test]
    fn test_stringify_empty() {
        let tags: HashMap<String, String> = HashMap::new();
        assert_eq!(stringify_tags(&tags), "");
    }

    #[test]
    fn test_make_metric() {
        let mut tags = HashMap::new();
        tags.insert("interface".to_string(), "all".to_string());
        assert_eq!(
            make_metric("net.tcp_activeopens", &tags),
            "net.tcp_activeopens.interface=all"
        );

        let none: HashMap<String, String> = HashMap::new();
        assert_eq!(make_metric("system.uptime", &none), "system.uptime");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("system", "load1"), "system.load1");
        assert_eq!(join("group.sign.", "system"), "group.sign.system");
        assert_eq!(join("", "uptime"), "uptime");
    }
}
