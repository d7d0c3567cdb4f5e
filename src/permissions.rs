//! Permission matcher (C2): rule syntax, evaluation order, and the
//! interactive confirm rendezvous.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};

/// The effect a matching rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

/// A single `Tool(pattern)[:effect]` rule. `pattern` of `None` matches any
/// argument for that tool. Default effect when omitted is `Allow`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub tool: String,
    pub pattern: Option<String>,
    pub effect: Effect,
}

impl Rule {
    pub fn new(tool: impl Into<String>, pattern: Option<String>, effect: Effect) -> Self {
        Rule { tool: tool.into(), pattern, effect }
    }

    /// Parse `Tool(pattern):effect` or `Tool(pattern)` (defaults to allow) or
    /// bare `Tool` (matches any argument).
    pub fn parse(spec: &str) -> Result<Rule, String> {
        let (head, effect) = match spec.rsplit_once(':') {
            Some((h, e)) if e == "allow" || e == "deny" => {
                (h, if e == "deny" { Effect::Deny } else { Effect::Allow })
            }
            _ => (spec, Effect::Allow),
        };
        let head = head.trim();
        if let Some(open) = head.find('(') {
            let close = head
                .rfind(')')
                .ok_or_else(|| format!("unterminated pattern in rule: {spec}"))?;
            let tool = head[..open].trim().to_string();
            let pattern = head[open + 1..close].trim().to_string();
            if tool.is_empty() {
                return Err(format!("missing tool name in rule: {spec}"));
            }
            Ok(Rule::new(tool, Some(pattern), effect))
        } else {
            let tool = head.trim().to_string();
            if tool.is_empty() {
                return Err(format!("empty rule: {spec}"));
            }
            Ok(Rule::new(tool, None, effect))
        }
    }

    fn matches(&self, tool: &str, canonical_arg: &str) -> bool {
        if self.tool != tool {
            return false;
        }
        match &self.pattern {
            None => true,
            Some(p) => Pattern::new(p)
                .map(|pat| pat.matches(canonical_arg))
                .unwrap_or(false),
        }
    }
}

/// `(tool, pattern)` pairs always denied, evaluated before any configured
/// rule, matched against the canonical argument the same way a configured
/// rule's pattern is. Kept intentionally small and explicit rather than
/// heuristic.
pub const BUILTIN_DENY: &[(&str, &str)] = &[
    ("bash", "*rm -rf /*"),
    ("bash", "*rm -rf /"),
    ("bash", "sudo *"),
    ("write", "/etc/**"),
    ("write", "/boot/**"),
    ("write", "/usr/**"),
    ("edit", "/etc/**"),
    ("edit", "/boot/**"),
    ("edit", "/usr/**"),
];

fn builtin_denies(tool: &str, canonical_arg: &str) -> bool {
    BUILTIN_DENY
        .iter()
        .any(|(t, pattern)| *t == tool && Pattern::new(pattern).map(|p| p.matches(canonical_arg)).unwrap_or(false))
}

/// Tool names considered read-only and auto-allowed when no rule matches.
pub const AUTO_ALLOW_TOOLS: &[&str] = &["read", "list_dir", "glob", "grep", "web_fetch", "web_search"];

/// Outcome of evaluating a tool invocation against the rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    Confirm,
}

/// The user's response to a confirm rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmResponse {
    Granted,
    Denied,
    GrantedAlways,
}

/// Persisted rule store plus the in-memory decision matcher.
#[derive(Debug)]
pub struct PermissionMatcher {
    rules: Vec<Rule>,
    path: PathBuf,
}

impl PermissionMatcher {
    /// Load rules from `<workdir>/.milo/permissions.json`, tolerating a
    /// missing file (starts empty).
    pub fn load(workdir: &Path) -> io::Result<Self> {
        let path = workdir.join(".milo").join("permissions.json");
        let rules = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(PermissionMatcher { rules, path })
    }

    /// Evaluate a tool call's canonical argument string against the rules.
    ///
    /// Order: built-in deny list, then configured rules in first-match-wins
    /// order, then auto-allow for read-only tools, else `Confirm`.
    pub fn decide(&self, tool: &str, canonical_arg: &str) -> Decision {
        if builtin_denies(tool, canonical_arg) {
            return Decision::Deny;
        }
        for rule in &self.rules {
            if rule.matches(tool, canonical_arg) {
                return match rule.effect {
                    Effect::Allow => Decision::Allow,
                    Effect::Deny => Decision::Deny,
                };
            }
        }
        if AUTO_ALLOW_TOOLS.contains(&tool) {
            return Decision::Allow;
        }
        Decision::Confirm
    }

    /// Persist a new always-allow rule after a `GrantedAlways` response and
    /// write the rule file atomically.
    pub fn grant_always(&mut self, tool: &str, canonical_arg: &str) -> io::Result<()> {
        self.rules.push(Rule::new(tool, Some(canonical_arg.to_string()), Effect::Allow));
        self.persist()
    }

    pub fn add_rule(&mut self, rule: Rule) -> io::Result<()> {
        self.rules.push(rule);
        self.persist()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    fn persist(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(&self.rules)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_bare_tool_as_allow_any_arg() {
        let r = Rule::parse("bash").unwrap();
        assert_eq!(r.tool, "bash");
        assert!(r.pattern.is_none());
        assert_eq!(r.effect, Effect::Allow);
    }

    #[test]
    fn parses_pattern_and_explicit_effect() {
        let r = Rule::parse("bash(git *):allow").unwrap();
        assert_eq!(r.tool, "bash");
        assert_eq!(r.pattern.as_deref(), Some("git *"));
        assert_eq!(r.effect, Effect::Allow);

        let r = Rule::parse("bash(rm *):deny").unwrap();
        assert_eq!(r.effect, Effect::Deny);
    }

    #[test]
    fn glob_star_does_not_cross_path_separator() {
        let dir = tempdir().unwrap();
        let mut m = PermissionMatcher::load(dir.path()).unwrap();
        m.add_rule(Rule::parse("write(src/*.rs):allow").unwrap()).unwrap();
        assert_eq!(m.decide("write", "src/main.rs"), Decision::Allow);
        assert_eq!(m.decide("write", "src/tools/bash.rs"), Decision::Confirm);
    }

    #[test]
    fn double_star_crosses_path_separator() {
        let dir = tempdir().unwrap();
        let mut m = PermissionMatcher::load(dir.path()).unwrap();
        m.add_rule(Rule::parse("write(src/**):allow").unwrap()).unwrap();
        assert_eq!(m.decide("write", "src/tools/bash.rs"), Decision::Allow);
    }

    #[test]
    fn builtin_deny_wins_over_configured_allow() {
        let dir = tempdir().unwrap();
        let mut m = PermissionMatcher::load(dir.path()).unwrap();
        m.add_rule(Rule::new("bash", None, Effect::Allow)).unwrap();
        assert_eq!(m.decide("bash", "rm -rf /"), Decision::Deny);
        assert_eq!(m.decide("bash", "sudo apt install x"), Decision::Deny);
        assert_eq!(m.decide("bash", "ls -la"), Decision::Allow);
    }

    #[test]
    fn builtin_deny_covers_system_path_writes() {
        let dir = tempdir().unwrap();
        let m = PermissionMatcher::load(dir.path()).unwrap();
        assert_eq!(m.decide("write", "/etc/passwd"), Decision::Deny);
        assert_eq!(m.decide("write", "src/main.rs"), Decision::Confirm);
    }

    #[test]
    fn read_only_tools_auto_allow_with_no_rules() {
        let dir = tempdir().unwrap();
        let m = PermissionMatcher::load(dir.path()).unwrap();
        assert_eq!(m.decide("read", "anything"), Decision::Allow);
        assert_eq!(m.decide("bash", "ls"), Decision::Confirm);
    }

    #[test]
    fn grant_always_persists_across_reload() {
        let dir = tempdir().unwrap();
        let mut m = PermissionMatcher::load(dir.path()).unwrap();
        m.grant_always("bash", "ls -la").unwrap();
        let reloaded = PermissionMatcher::load(dir.path()).unwrap();
        assert_eq!(reloaded.decide("bash", "ls -la"), Decision::Allow);
    }

    #[test]
    fn first_match_wins() {
        let dir = tempdir().unwrap();
        let mut m = PermissionMatcher::load(dir.path()).unwrap();
        m.add_rule(Rule::new("bash", None, Effect::Deny)).unwrap();
        m.add_rule(Rule::new("bash", None, Effect::Allow)).unwrap();
        assert_eq!(m.decide("bash", "anything"), Decision::Deny);
    }
}
