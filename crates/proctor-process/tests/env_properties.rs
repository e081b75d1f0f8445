//! Property-based tests for child environment resolution
//!
//! For any inherited environment, blacklist and override set, the resolved
//! environment keeps every override, drops every blacklisted inherited name
//! and never repeats a name.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;

use proctor_process::{resolve_environ, ENV_WILDCARD};
use proptest::prelude::*;

fn name_strategy() -> impl Strategy<Value = String> {
    "[A-Z][A-Z0-9_]{0,5}"
}

fn inherited_strategy() -> impl Strategy<Value = Vec<(OsString, OsString)>> {
    prop::collection::hash_map(name_strategy(), "[a-z0-9/]{0,8}", 0..12)
        .prop_map(|vars| vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
}

fn os(text: &str) -> OsString {
    OsString::from(text)
}

fn overrides_strategy() -> impl Strategy<Value = HashMap<String, String>> {
    prop::collection::hash_map(name_strategy(), "[a-z0-9]{0,8}", 0..6)
}

proptest! {
    #[test]
    fn prop_overrides_always_win(
        inherited in inherited_strategy(),
        blacklist in prop::collection::vec(name_strategy(), 0..6),
        overrides in overrides_strategy(),
    ) {
        let environ = resolve_environ(inherited, &blacklist, &overrides);

        for (name, value) in &overrides {
            let found: Vec<_> = environ.iter().filter(|(n, _)| *n == os(name)).collect();
            prop_assert_eq!(found.len(), 1, "Override {} must appear exactly once", name);
            prop_assert_eq!(&found[0].1, &os(value));
        }
    }

    #[test]
    fn prop_blacklisted_names_are_dropped(
        inherited in inherited_strategy(),
        blacklist in prop::collection::vec(name_strategy(), 0..6),
        overrides in overrides_strategy(),
    ) {
        let environ = resolve_environ(inherited.clone(), &blacklist, &overrides);

        for (name, _) in &environ {
            let name = name.to_str().unwrap();
            prop_assert!(
                !blacklist.iter().any(|b| b == name) || overrides.contains_key(name),
                "Blacklisted {} survived without an override", name
            );
        }
        for (name, value) in &inherited {
            let text = name.to_str().unwrap();
            if !blacklist.iter().any(|b| b == text) && !overrides.contains_key(text) {
                prop_assert!(environ.contains(&(name.clone(), value.clone())));
            }
        }
    }

    #[test]
    fn prop_wildcard_keeps_only_overrides(
        inherited in inherited_strategy(),
        overrides in overrides_strategy(),
    ) {
        let environ = resolve_environ(inherited, &[ENV_WILDCARD.to_string()], &overrides);

        prop_assert_eq!(environ.len(), overrides.len());
        let names: Vec<_> = environ.iter().map(|(n, _)| n.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        prop_assert_eq!(names, sorted, "Overrides are applied in name order");
    }

    #[test]
    fn prop_names_are_unique(
        inherited in inherited_strategy(),
        blacklist in prop::collection::vec(name_strategy(), 0..6),
        overrides in overrides_strategy(),
    ) {
        let environ = resolve_environ(inherited, &blacklist, &overrides);
        let unique: HashSet<_> = environ.iter().map(|(n, _)| n).collect();
        prop_assert_eq!(unique.len(), environ.len());
    }
}
