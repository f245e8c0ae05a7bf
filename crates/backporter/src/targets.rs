use anyhow::{Context, Result};
use regex::Regex;

/// Characters whose presence marks a configured target as a pattern.
const PATTERN_CHARS: &[char] = &[
    '*', '+', '?', '.', '[', ']', '(', ')', '{', '}', '|', '^', '$', '\\',
];

/// A configured target branch: a literal name or a regular expression.
#[derive(Debug, Clone)]
pub enum TargetBranchSpec {
    Literal(String),
    Pattern { source: String, regex: Regex },
}

impl TargetBranchSpec {
    pub fn parse(entry: &str) -> Result<Self> {
        let entry = entry.trim();
        if !entry.contains(PATTERN_CHARS) {
            return Ok(Self::Literal(entry.to_string()));
        }
        let regex = Regex::new(&format!("^(?:{entry})$"))
            .with_context(|| format!("invalid target branch pattern: {entry}"))?;
        Ok(Self::Pattern {
            source: entry.to_string(),
            regex,
        })
    }

    pub fn parse_all(entries: &[String]) -> Result<Vec<Self>> {
        entries.iter().map(|e| Self::parse(e)).collect()
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(name) => name,
            Self::Pattern { source, .. } => source,
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Self::Pattern { .. })
    }
}

/// One entry of [`ResolvedTargets::in_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    Existing(String),
    Missing(String),
}

/// Target specs expanded against a branch list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolvedTargets {
    /// Existing branches, in configuration order, without duplicates.
    pub branches: Vec<String>,
    /// Literal names with no matching branch.
    pub missing: Vec<String>,
    /// Both of the above interleaved as they were configured.
    pub in_order: Vec<ResolvedTarget>,
}

/// Expand `specs` against `available` branch names.
///
/// An entry that names an existing branch exactly is taken as that branch even
/// when it contains pattern characters (`release-1.0`). Patterns must match a
/// whole branch name.
pub fn resolve_targets(specs: &[TargetBranchSpec], available: &[String]) -> ResolvedTargets {
    fn push(resolved: &mut ResolvedTargets, name: &str) {
        if !resolved.branches.iter().any(|b| b == name) {
            resolved.branches.push(name.to_string());
            resolved
                .in_order
                .push(ResolvedTarget::Existing(name.to_string()));
        }
    }

    let mut resolved = ResolvedTargets::default();

    for spec in specs {
        if available.iter().any(|b| b == spec.as_str()) {
            push(&mut resolved, spec.as_str());
            continue;
        }
        match spec {
            TargetBranchSpec::Literal(name) => {
                if !resolved.missing.contains(name) {
                    resolved.missing.push(name.clone());
                    resolved.in_order.push(ResolvedTarget::Missing(name.clone()));
                }
            }
            TargetBranchSpec::Pattern { regex, .. } => {
                for branch in available.iter().filter(|b| regex.is_match(b)) {
                    push(&mut resolved, branch);
                }
            }
        }
    }
    resolved
}
