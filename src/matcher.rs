//! Merge predicates for multi-line log reassembly.

/// Decides whether a new line extends the current multi-line record.
///
/// Implementations may keep per-stream state (brace depth, for example), so
/// every followed container gets its own instance from a [`MatcherFactory`].
pub trait MultilineMatcher: Send {
    /// True when `next` belongs to the same record as `previous`.
    fn should_merge(&mut self, previous: &str, next: &str) -> bool;
}

/// Creates one [`MultilineMatcher`] per followed container.
///
/// Any `Fn() -> M` closure or constructor works, e.g.
/// `JavaStackMatcher::new` or `|| JsonObjectMatcher::new()`.
pub trait MatcherFactory: Send + Sync {
    fn make(&self) -> Box<dyn MultilineMatcher>;
}

impl<F, M> MatcherFactory for F
where
    F: Fn() -> M + Send + Sync,
    M: MultilineMatcher + 'static,
{
    fn make(&self) -> Box<dyn MultilineMatcher> {
        Box::new(self())
    }
}

/// Merges JVM-style stack trace continuations into one record.
///
/// A line extends the current record when it starts with a tab, with
/// whitespace followed by `at `, or with `Caused by:`; a trailing backslash
/// on the previous line also continues the record. Blank lines never merge.
#[derive(Debug, Default, Clone, Copy)]
pub struct JavaStackMatcher;

impl JavaStackMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl MultilineMatcher for JavaStackMatcher {
    fn should_merge(&mut self, previous: &str, next: &str) -> bool {
        if next.trim().is_empty() {
            return false;
        }
        if next.starts_with('\t') {
            return true;
        }
        let stripped = next.trim_start();
        if stripped.len() < next.len() && stripped.starts_with("at ") {
            return true;
        }
        if next.starts_with("Caused by:") {
            return true;
        }
        previous.trim().ends_with('\\')
    }
}

/// Merges pretty-printed JSON objects by tracking brace depth.
///
/// Depth is adjusted by the braces seen on the previous line and clamped at
/// zero; lines merge while the depth stays positive. Braces are counted
/// without interpreting string literals, so a `}` inside a quoted value
/// closes the object early.
#[derive(Debug, Default, Clone)]
pub struct JsonObjectMatcher {
    depth: i32,
}

impl JsonObjectMatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MultilineMatcher for JsonObjectMatcher {
    fn should_merge(&mut self, previous: &str, _next: &str) -> bool {
        if previous.trim().ends_with('\\') {
            return true;
        }
        for c in previous.chars() {
            match c {
                '{' => self.depth += 1,
                '}' => self.depth -= 1,
                _ => {}
            }
        }
        if self.depth <= 0 {
            self.depth = 0;
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merges(matcher: &mut dyn MultilineMatcher, lines: &[&str]) -> Vec<bool> {
        lines
            .windows(2)
            .map(|pair| matcher.should_merge(pair[0], pair[1]))
            .collect()
    }

    #[test]
    fn java_matcher_merges_stack_frames() {
        let mut matcher = JavaStackMatcher::new();
        let lines = [
            "Exception in thread \"main\" java.lang.NullPointerException",
            "\tat com.example.A.m(A.java:1)",
            "Caused by: java.io.IOException",
            "    at com.example.A.n(A.java:2)",
            "INFO started",
        ];
        assert_eq!(
            merges(&mut matcher, &lines),
            vec![true, true, true, false]
        );
    }

    #[test]
    fn java_matcher_never_merges_blank_lines() {
        let mut matcher = JavaStackMatcher::new();
        assert!(!matcher.should_merge("\tat com.example.A.m(A.java:1)", "   "));
        assert!(!matcher.should_merge("anything", ""));
    }

    #[test]
    fn java_matcher_honors_backslash_continuation() {
        let mut matcher = JavaStackMatcher::new();
        assert!(matcher.should_merge("a long command \\", "continues here"));
        assert!(!matcher.should_merge("a finished line", "another line"));
    }

    #[test]
    fn java_matcher_requires_whitespace_before_at() {
        let mut matcher = JavaStackMatcher::new();
        assert!(!matcher.should_merge("prev", "attempting reconnect"));
        assert!(!matcher.should_merge("prev", "at the start without indent"));
        assert!(matcher.should_merge("prev", "  at com.example.B.run(B.java:7)"));
    }

    #[test]
    fn json_matcher_merges_simple_object() {
        let mut matcher = JsonObjectMatcher::new();
        let lines = ["{", "  \"key\": \"value\"", "}", "Next log"];
        assert_eq!(merges(&mut matcher, &lines), vec![true, true, false]);
    }

    #[test]
    fn json_matcher_merges_nested_object() {
        let mut matcher = JsonObjectMatcher::new();
        let lines = [
            "{",
            "  \"outer\": {",
            "    \"inner\": \"value\"",
            "  }",
            "}",
            "Next log",
        ];
        assert_eq!(
            merges(&mut matcher, &lines),
            vec![true, true, true, true, false]
        );
    }

    #[test]
    fn json_matcher_ignores_single_line_object() {
        let mut matcher = JsonObjectMatcher::new();
        assert!(!matcher.should_merge("{ \"key\": \"value\" }", "Next log"));
    }

    #[test]
    fn json_matcher_clamps_unbalanced_closes() {
        let mut matcher = JsonObjectMatcher::new();
        assert!(!matcher.should_merge("}}}", "next"));
        // The clamp means a later object still opens cleanly.
        assert!(matcher.should_merge("{", "  \"k\": 1"));
    }

    #[test]
    fn json_matcher_honors_backslash_continuation() {
        let mut matcher = JsonObjectMatcher::new();
        assert!(matcher.should_merge("line ends with \\", "continuation"));
    }
}
