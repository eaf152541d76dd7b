//! Case-insensitive wildcard patterns (`*`, `?`)
//!
//! Every other character matches itself, so names carrying braces, brackets
//! or backslashes (`{GUID}` keys, `C:\Temp\*`) can be written as-is.
//! Backslashes and forward slashes are interchangeable on both sides.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Compiled set of wildcard patterns
#[derive(Debug, Clone)]
pub struct PatternSet {
    set: GlobSet,
    len: usize,
}

impl PatternSet {
    /// Compile patterns; invalid ones are logged and left out
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut len = 0;

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = wildcard_glob(&normalize_slashes(pattern));
            match GlobBuilder::new(&glob)
                .case_insensitive(true)
                .literal_separator(false)
                .backslash_escape(false)
                .build()
            {
                Ok(glob) => {
                    builder.add(glob);
                    len += 1;
                }
                Err(e) => log::warn!("Ignoring invalid pattern '{pattern}': {e}"),
            }
        }

        let set = builder.build().unwrap_or_else(|e| {
            log::warn!("Failed to compile pattern set: {e}");
            GlobSet::empty()
        });

        Self { set, len }
    }

    /// Whether any pattern matches `name`
    pub fn is_match(&self, name: &str) -> bool {
        self.len > 0 && self.set.is_match(normalize_slashes(name))
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn normalize_slashes(text: &str) -> String {
    text.replace('\\', "/")
}

/// Translate a wildcard pattern into glob syntax
///
/// Literal runs are escaped and runs of `*` collapse into one, so globset's
/// classes, alternations and `**` never come into play.
fn wildcard_glob(pattern: &str) -> String {
    let mut glob = String::with_capacity(pattern.len());
    let mut literal = String::new();

    for c in pattern.chars() {
        match c {
            '*' | '?' => {
                glob.push_str(&globset::escape(&literal));
                literal.clear();
                if !(c == '*' && glob.ends_with('*')) {
                    glob.push(c);
                }
            }
            _ => literal.push(c),
        }
    }
    glob.push_str(&globset::escape(&literal));
    glob
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcards() {
        let set = PatternSet::new(&["Microsoft.Xbox*", "?ortana"]);
        assert!(set.is_match("Microsoft.XboxApp"));
        assert!(set.is_match("Cortana"));
        assert!(!set.is_match("Microsoft.Edge"));
        assert!(!set.is_match("MyCortana"));
    }

    #[test]
    fn test_case_insensitive() {
        let set = PatternSet::new(&["*defender*"]);
        assert!(set.is_match("Windows Defender Service"));
        assert!(set.is_match("WINDEFENDER"));
    }

    #[test]
    fn test_star_crosses_separators() {
        let set = PatternSet::new(&["c:*temp*"]);
        assert!(set.is_match("C:/Users/me/AppData/Local/Temp/x.tmp"));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = PatternSet::new::<&str>(&[]);
        assert!(set.is_empty());
        assert!(!set.is_match("anything"));
    }

    #[test]
    fn test_brackets_are_literal() {
        let set = PatternSet::new(&["[unclosed", "log[1]*"]);
        assert!(set.is_match("[UNCLOSED"));
        assert!(set.is_match("log[1].txt"));
        assert!(!set.is_match("log1.txt"));
    }

    #[test]
    fn test_braces_are_literal() {
        let set = PatternSet::new(&["Microsoft.{Xbox}*", "*{1234-ABCD}*"]);
        assert!(set.is_match("Microsoft.{Xbox}App"));
        assert!(!set.is_match("Microsoft.XboxApp"));
        assert!(set.is_match("HKLM\\Run\\{1234-abcd}\\Updater"));
    }

    #[test]
    fn test_backslash_paths() {
        let set = PatternSet::new(&["C:\\Temp\\*"]);
        assert!(set.is_match("C:\\Temp\\x.tmp"));
        assert!(set.is_match("c:\\temp\\nested\\y.log"));
        assert!(set.is_match("C:/Temp/z.dat"));
        assert!(!set.is_match("C:\\Windows\\x.tmp"));
    }

    #[test]
    fn test_wildcard_glob_translation() {
        assert_eq!(wildcard_glob("a**b"), "a*b");
        assert_eq!(wildcard_glob("x?{y}"), "x?[{]y[}]");
        assert_eq!(wildcard_glob("**/*"), "*/*");
    }
}
