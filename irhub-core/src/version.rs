//! Software-version compatibility check shared by both sides of pairing.
//!
//! Grounded on `pairing_manager_hub.py::_is_compatible`/`_major_version`
//! and `pairing_manager_agent.py::_is_compatible`/`_major_version`, which
//! independently reimplement the same rule: split on the first `.`, and
//! treat either side being unparseable/empty as compatible (laxity kept on
//! purpose per the Open Question resolution in SPEC_FULL.md §D).

/// Returns true if `a` and `b` share the same major version, or if either
/// is empty/unparseable.
pub fn major_compatible(a: &str, b: &str) -> bool {
  let major_a = major_version(a);
  let major_b = major_version(b);
  if major_a.is_empty() || major_b.is_empty() {
    return true;
  }
  major_a == major_b
}

fn major_version(value: &str) -> &str {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return "";
  }
  trimmed.split('.').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_major_is_compatible() {
    assert!(major_compatible("2.4.1", "2.0.0"));
  }

  #[test]
  fn different_major_is_incompatible() {
    assert!(!major_compatible("2.4.1", "3.0.0"));
  }

  #[test]
  fn missing_version_is_compatible() {
    assert!(major_compatible("", "3.0.0"));
    assert!(major_compatible("2.0.0", ""));
    assert!(major_compatible("", ""));
  }

  #[test]
  fn whitespace_only_is_treated_as_missing() {
    assert!(major_compatible("   ", "5.1.0"));
  }
}
