//! Child process environment construction.

use std::collections::BTreeMap;
use std::ffi::OsString;

/// A per-server environment override. `None` removes the variable.
pub type EnvOverride = (String, Option<String>);

/// Build the exact environment a server process receives: `base` overlaid
/// with the server's overrides.
pub fn build_child_env<I>(base: I, overrides: &[EnvOverride]) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut env: BTreeMap<OsString, OsString> = base.into_iter().collect();

    for (name, value) in overrides {
        match value {
            Some(value) => {
                env.insert(OsString::from(name), OsString::from(value));
            }
            None => {
                env.remove(std::ffi::OsStr::new(name));
            }
        }
    }

    env.into_iter().collect()
}

/// [`build_child_env`] over the current process environment.
pub fn child_env(overrides: &[EnvOverride]) -> Vec<(OsString, OsString)> {
    build_child_env(std::env::vars_os(), overrides)
}

/// Look up an override's value by name.
pub fn override_value<'a>(overrides: &'a [EnvOverride], name: &str) -> Option<&'a str> {
    overrides
        .iter()
        .rev()
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| value.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Vec<(OsString, OsString)> {
        vec![
            ("PATH".into(), "/usr/bin".into()),
            ("HOME".into(), "/home/test".into()),
            ("SECRET".into(), "hunter2".into()),
        ]
    }

    fn lookup<'a>(env: &'a [(OsString, OsString)], name: &str) -> Option<&'a OsString> {
        env.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    #[test]
    fn test_overrides_replace_and_add() {
        let env = build_child_env(
            base(),
            &[
                ("HOME".to_string(), Some("/srv".to_string())),
                ("API_KEY".to_string(), Some("abc".to_string())),
            ],
        );
        assert_eq!(lookup(&env, "HOME").unwrap(), "/srv");
        assert_eq!(lookup(&env, "API_KEY").unwrap(), "abc");
        assert_eq!(lookup(&env, "PATH").unwrap(), "/usr/bin");
    }

    #[test]
    fn test_undefined_override_drops_key() {
        let env = build_child_env(base(), &[("SECRET".to_string(), None)]);
        assert!(lookup(&env, "SECRET").is_none());
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_override_value_lookup() {
        let overrides = vec![
            ("A".to_string(), Some("1".to_string())),
            ("B".to_string(), None),
        ];
        assert_eq!(override_value(&overrides, "A"), Some("1"));
        assert_eq!(override_value(&overrides, "B"), None);
        assert_eq!(override_value(&overrides, "C"), None);
    }
}
