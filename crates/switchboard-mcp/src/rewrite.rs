//! Per-server argument rewrite rules.
//!
//! Some servers take values that only exist in their environment as
//! positional arguments. A rule names a server key, a placeholder argument
//! and an environment variable; the placeholder is replaced by the entries of
//! that variable's path list.

use crate::environment::{EnvOverride, override_value};

/// Placeholder used by the filesystem server's preset.
pub const ALLOWED_DIRECTORIES_PLACEHOLDER: &str = "{ALLOWED_DIRECTORIES}";

/// One argument substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    /// Server key this rule applies to.
    pub server: String,
    /// Argument replaced when it matches exactly.
    pub placeholder: String,
    /// Environment variable (from the server's own env) holding a path list.
    pub env: String,
}

impl RewriteRule {
    /// Create a rule.
    pub fn new(
        server: impl Into<String>,
        placeholder: impl Into<String>,
        env: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            placeholder: placeholder.into(),
            env: env.into(),
        }
    }
}

/// Table of rewrite rules keyed by server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRules {
    rules: Vec<RewriteRule>,
}

impl Default for RewriteRules {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RewriteRules {
    /// An empty table.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The built-in table: the filesystem server's allowed directories.
    pub fn builtin() -> Self {
        Self {
            rules: vec![RewriteRule::new(
                "filesystem",
                ALLOWED_DIRECTORIES_PLACEHOLDER,
                "ALLOWED_DIRECTORIES",
            )],
        }
    }

    /// Add a rule.
    pub fn with_rule(mut self, rule: RewriteRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rules in the table.
    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Rewrite `args` for the server `key`.
    pub fn apply(&self, key: &str, args: &[String], env: &[EnvOverride]) -> Vec<String> {
        let mut args = args.to_vec();

        for rule in self.rules.iter().filter(|r| r.server == key) {
            if !args.iter().any(|a| *a == rule.placeholder) {
                continue;
            }

            let value = override_value(env, &rule.env);
            if value.is_none() {
                tracing::warn!(
                    server = %key,
                    placeholder = %rule.placeholder,
                    env = %rule.env,
                    "placeholder argument has no value in the server environment; removing it"
                );
            }

            args = args
                .into_iter()
                .flat_map(|arg| {
                    if arg != rule.placeholder {
                        return vec![arg];
                    }
                    match value {
                        Some(list) => std::env::split_paths(list)
                            .map(|p| p.to_string_lossy().into_owned())
                            .filter(|p| !p.is_empty())
                            .collect(),
                        None => Vec::new(),
                    }
                })
                .collect();
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_filesystem_placeholder_expands() {
        let joined = std::env::join_paths(["/data/a", "/data/b"]).unwrap();
        let env = vec![(
            "ALLOWED_DIRECTORIES".to_string(),
            Some(joined.to_string_lossy().into_owned()),
        )];
        let rewritten = RewriteRules::builtin().apply(
            "filesystem",
            &args(&["-y", "@modelcontextprotocol/server-filesystem", "{ALLOWED_DIRECTORIES}"]),
            &env,
        );
        assert_eq!(
            rewritten,
            args(&["-y", "@modelcontextprotocol/server-filesystem", "/data/a", "/data/b"])
        );
    }

    #[test]
    fn test_missing_value_removes_placeholder() {
        let rewritten = RewriteRules::builtin().apply(
            "filesystem",
            &args(&["-y", "pkg", "{ALLOWED_DIRECTORIES}"]),
            &[],
        );
        assert_eq!(rewritten, args(&["-y", "pkg"]));
    }

    #[test]
    fn test_other_servers_untouched() {
        let env = vec![("ALLOWED_DIRECTORIES".to_string(), Some("/x".to_string()))];
        let original = args(&["{ALLOWED_DIRECTORIES}"]);
        let rewritten = RewriteRules::builtin().apply("github", &original, &env);
        assert_eq!(rewritten, original);
    }

    #[test]
    fn test_custom_rule() {
        let rules = RewriteRules::empty().with_rule(RewriteRule::new("notes", "{ROOT}", "NOTES_ROOT"));
        let env = vec![("NOTES_ROOT".to_string(), Some("/notes".to_string()))];
        let rewritten = rules.apply("notes", &args(&["--root", "{ROOT}"]), &env);
        assert_eq!(rewritten, args(&["--root", "/notes"]));
        assert!(rules.apply("filesystem", &args(&["{ALLOWED_DIRECTORIES}"]), &[]).len() == 1);
    }
}
