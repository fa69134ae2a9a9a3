use super::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

// -------------------- Advice --------------------

#[test]
fn advice_names_roundtrip() {
    for a in Advice::ALL {
        assert_eq!(a.as_str().parse::<Advice>().unwrap(), a);
        assert_eq!(a.to_string(), a.as_str());
    }
}

#[test]
fn advice_parse_is_case_insensitive() {
    assert_eq!("RANDOM".parse::<Advice>().unwrap(), Advice::Random);
    assert_eq!("Sequential".parse::<Advice>().unwrap(), Advice::Sequential);
}

#[test]
fn advice_parse_rejects_unknown() {
    let err = "sideways".parse::<Advice>().unwrap_err();
    assert_eq!(err, UnknownAdvice("sideways".to_string()));
}

#[test]
fn advice_default_is_normal() {
    assert_eq!(Advice::default(), Advice::Normal);
}

// -------------------- BuildConfig --------------------

#[test]
fn build_config_defaults() {
    let c = BuildConfig::default();
    assert_eq!(c.mode, None);
    assert!(c.sync);
}

#[test]
fn build_config_reads_values() {
    let c = BuildConfig::from_lookup(lookup_from(&[("MCDB_MODE", "0644"), ("MCDB_SYNC", "false")]));
    assert_eq!(c.mode, Some(0o644));
    assert!(!c.sync);
}

#[test]
fn build_config_ignores_garbage() {
    let c = BuildConfig::from_lookup(lookup_from(&[("MCDB_MODE", "rw-r--r--"), ("MCDB_SYNC", "maybe")]));
    assert_eq!(c, BuildConfig::default());
}

#[test]
fn build_config_missing_vars_use_defaults() {
    let c = BuildConfig::from_lookup(lookup_from(&[]));
    assert_eq!(c, BuildConfig::default());
}

// -------------------- parse_mode --------------------

#[test]
fn parse_mode_forms() {
    assert_eq!(parse_mode("400"), Some(0o400));
    assert_eq!(parse_mode("0o600"), Some(0o600));
    assert_eq!(parse_mode(" 0644 "), Some(0o644));
    assert_eq!(parse_mode("999"), None);
    assert_eq!(parse_mode("17777"), None);
    assert_eq!(parse_mode(""), None);
}
