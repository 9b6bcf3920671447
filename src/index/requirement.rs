//! PEP 508-lite parsing of `requires_dist` entries.

use std::fmt;

use super::normalize_name;

/// A direct dependency extracted from release metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Normalized distribution name.
    pub name: String,
    /// Exact version pin when the requirement uses `==`.
    pub pin: Option<String>,
}

impl Requirement {
    /// Parse one `requires_dist` entry, e.g. `six (>=1.5)`,
    /// `cffi==1.12.3; python_version < "3.8"` or `requests[security]`.
    ///
    /// Returns `None` for entries that do not apply to a plain install:
    /// requirements gated on an extra, or lines that do not start with a
    /// distribution name. Constraints other than `==` are treated as
    /// unconstrained; those dependencies resolve to the index's latest
    /// release.
    pub fn parse(entry: &str) -> Option<Requirement> {
        let entry = entry.trim();
        let (spec, marker) = match entry.split_once(';') {
            Some((spec, marker)) => (spec.trim(), Some(marker.trim())),
            None => (entry, None),
        };

        if let Some(marker) = marker {
            if marker.contains("extra ==") || marker.contains("extra==") {
                return None;
            }
        }

        let name_end = spec
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
            .unwrap_or(spec.len());
        let name = &spec[..name_end];
        if name.is_empty() {
            return None;
        }

        // Drop any extras bracket before looking at version constraints.
        let rest = spec[name_end..].trim();
        let rest = match rest.strip_prefix('[') {
            Some(after) => after
                .split_once(']')
                .map(|(_, tail)| tail.trim())
                .unwrap_or(""),
            None => rest,
        };

        Some(Requirement {
            name: normalize_name(name),
            pin: parse_pin(rest),
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pin {
            Some(pin) => write!(f, "{}=={}", self.name, pin),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Extract an exact pin from a constraint list like `(==2.0.1)` or
/// `>=1.5,==2.0`.
fn parse_pin(constraints: &str) -> Option<String> {
    let constraints = constraints
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')');
    for clause in constraints.split(',') {
        let clause = clause.trim();
        if let Some(version) = clause.strip_prefix("==") {
            // `===` (arbitrary equality) collapses to the same pin
            let version = version.trim_start_matches('=').trim().trim_end_matches(".*");
            if !version.is_empty() {
                return Some(version.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_name() {
        let req = Requirement::parse("funcsigs").unwrap();
        assert_eq!(req.name, "funcsigs");
        assert_eq!(req.pin, None);
    }

    #[test]
    fn test_parse_normalizes_name() {
        let req = Requirement::parse("Multiprocessing_on_Dill").unwrap();
        assert_eq!(req.name, "multiprocessing-on-dill");
    }

    #[test]
    fn test_parse_parenthesized_range() {
        let req = Requirement::parse("six (>=1.5)").unwrap();
        assert_eq!(req.name, "six");
        assert_eq!(req.pin, None);
    }

    #[test]
    fn test_parse_exact_pin() {
        let req = Requirement::parse("cffi (==1.12.3)").unwrap();
        assert_eq!(req.name, "cffi");
        assert_eq!(req.pin, Some("1.12.3".to_string()));

        let req = Requirement::parse("cffi==1.12.3").unwrap();
        assert_eq!(req.pin, Some("1.12.3".to_string()));
    }

    #[test]
    fn test_parse_pin_among_clauses() {
        let req = Requirement::parse("pkg (>=1.0,==2.0)").unwrap();
        assert_eq!(req.pin, Some("2.0".to_string()));
    }

    #[test]
    fn test_parse_wildcard_pin_trimmed() {
        let req = Requirement::parse("pkg==2.0.*").unwrap();
        assert_eq!(req.pin, Some("2.0".to_string()));
    }

    #[test]
    fn test_parse_arbitrary_equality() {
        let req = Requirement::parse("pkg===1.0").unwrap();
        assert_eq!(req.pin, Some("1.0".to_string()));
    }

    #[test]
    fn test_parse_skips_extra_requirements() {
        assert_eq!(Requirement::parse("pytest; extra == 'test'"), None);
        assert_eq!(Requirement::parse("pytest ; extra == \"dev\""), None);
    }

    #[test]
    fn test_parse_keeps_environment_markers() {
        let req = Requirement::parse("funcsigs; python_version < \"3.0\"").unwrap();
        assert_eq!(req.name, "funcsigs");
    }

    #[test]
    fn test_parse_drops_extras_bracket() {
        let req = Requirement::parse("requests[security] (>=2.0)").unwrap();
        assert_eq!(req.name, "requests");
        assert_eq!(req.pin, None);

        let req = Requirement::parse("requests[security]==2.1").unwrap();
        assert_eq!(req.pin, Some("2.1".to_string()));
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Requirement::parse(""), None);
        assert_eq!(Requirement::parse("   "), None);
        assert_eq!(Requirement::parse("(>=1.0)"), None);
    }

    #[test]
    fn test_display() {
        let req = Requirement {
            name: "six".into(),
            pin: None,
        };
        assert_eq!(req.to_string(), "six");

        let req = Requirement {
            name: "cffi".into(),
            pin: Some("1.12.3".into()),
        };
        assert_eq!(req.to_string(), "cffi==1.12.3");
    }
}
