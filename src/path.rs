//! Path pattern matching
//!
//! Patterns are `/`-separated segments where a segment starting with `:`
//! captures exactly one path segment under that name.
//!
//! # Design Decisions
//! - Patterns are compiled once at registration; matching options are
//!   supplied per call so settings changes apply without recompiling
//! - Captured values are returned verbatim (no `%`-decoding)
//! - No regex: matching is a single linear walk over segments

/// One compiled segment of a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Options controlling a single match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Require the whole path to be consumed (routes) rather than a prefix (middleware)
    pub end: bool,
    /// Treat a trailing `/` as significant (only applies when `end` is set)
    pub strict: bool,
    /// Compare literal segments case-sensitively
    pub case_sensitive: bool,
}

impl MatchOptions {
    /// Options for exact route matching
    pub fn exact(strict: bool, case_sensitive: bool) -> Self {
        Self {
            end: true,
            strict,
            case_sensitive,
        }
    }

    /// Options for prefix matching (never strict)
    pub fn prefix(case_sensitive: bool) -> Self {
        Self {
            end: false,
            strict: false,
            case_sensitive,
        }
    }
}

/// Result of a successful match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// Captured parameters in declaration order
    pub params: Vec<(String, String)>,
    /// Byte length of the matched portion of the path
    pub matched_len: usize,
}

/// A compiled path pattern
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

impl PathPattern {
    /// Compile a pattern such as `/:folder/:user`
    pub fn parse(raw: &str) -> Self {
        let body = raw.strip_prefix('/').unwrap_or(raw);
        let (body, trailing_slash) = match body.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (body, false),
        };

        let segments = if body.is_empty() {
            Vec::new()
        } else {
            body.split('/')
                .map(|segment| match segment.strip_prefix(':') {
                    Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
                    _ => Segment::Literal(segment.to_string()),
                })
                .collect()
        };

        Self {
            raw: raw.to_string(),
            segments,
            trailing_slash,
        }
    }

    /// The pattern as registered
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the parameters declared by this pattern, in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a concrete path against this pattern
    pub fn matches(&self, path: &str, options: MatchOptions) -> Option<PathMatch> {
        let rest = path.strip_prefix('/')?;
        let (rest, path_trailing) = match rest.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (rest, false),
        };

        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };

        if parts.len() < self.segments.len() {
            return None;
        }
        if options.end {
            if parts.len() != self.segments.len() {
                return None;
            }
            if options.strict && path_trailing != self.trailing_slash {
                return None;
            }
        }

        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(literal) => {
                    let equal = if options.case_sensitive {
                        literal == part
                    } else {
                        literal.to_lowercase() == part.to_lowercase()
                    };
                    if !equal {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    params.push((name.clone(), (*part).to_string()));
                }
            }
        }

        let matched_len = if options.end {
            path.len()
        } else if self.segments.is_empty() {
            0
        } else {
            let consumed = &parts[..self.segments.len()];
            consumed.iter().map(|part| part.len() + 1).sum()
        };

        Some(PathMatch {
            params,
            matched_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(strict: bool) -> MatchOptions {
        MatchOptions::exact(strict, true)
    }

    fn prefix() -> MatchOptions {
        MatchOptions::prefix(true)
    }

    #[test]
    fn test_param_capture() {
        let pattern = PathPattern::parse("/:folder/:user");
        let m = pattern.matches("/users/alice", exact(true)).unwrap();
        assert_eq!(
            m.params,
            vec![
                ("folder".to_string(), "users".to_string()),
                ("user".to_string(), "alice".to_string()),
            ]
        );
        assert_eq!(pattern.keys().collect::<Vec<_>>(), vec!["folder", "user"]);
    }

    #[test]
    fn test_strict_trailing_slash() {
        let pattern = PathPattern::parse("/:folder/:user");
        assert!(pattern.matches("/users/alice/", exact(true)).is_none());
        assert!(pattern.matches("/users/alice/", exact(false)).is_some());

        let slashed = PathPattern::parse("/:folder/:user/");
        assert!(slashed.matches("/users/alice", exact(true)).is_none());
        assert!(slashed.matches("/users/alice/", exact(true)).is_some());
        assert!(slashed.matches("/users/alice", exact(false)).is_some());
    }

    #[test]
    fn test_prefix_segment_boundary() {
        let pattern = PathPattern::parse("/users/");
        let m = pattern.matches("/users/alice", prefix()).unwrap();
        assert_eq!(m.matched_len, "/users".len());
        assert!(pattern.matches("/users", prefix()).is_some());
        assert!(pattern.matches("/usersx/alice", prefix()).is_none());
        assert!(PathPattern::parse("/NO").matches("/users/alice", prefix()).is_none());
    }

    #[test]
    fn test_root_matches_everything_as_prefix() {
        let root = PathPattern::parse("/");
        let m = root.matches("/users/alice", prefix()).unwrap();
        assert_eq!(m.matched_len, 0);
        assert!(root.matches("/", exact(true)).is_some());
        assert!(root.matches("/users", exact(true)).is_none());
    }

    #[test]
    fn test_case_sensitivity() {
        let pattern = PathPattern::parse("/USERS/:user");
        assert!(pattern.matches("/users/alice", exact(false)).is_none());

        let insensitive = MatchOptions::exact(false, false);
        let m = pattern.matches("/users/alice", insensitive).unwrap();
        assert_eq!(m.params, vec![("user".to_string(), "alice".to_string())]);
    }

    #[test]
    fn test_params_are_not_decoded_and_not_empty() {
        let pattern = PathPattern::parse("/users/:user");
        let m = pattern.matches("/users/al%20ice", exact(false)).unwrap();
        assert_eq!(m.params[0].1, "al%20ice");
        assert!(pattern.matches("/users//", exact(false)).is_none());
        assert!(pattern.matches("users/alice", exact(false)).is_none());
    }
}
