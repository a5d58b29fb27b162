//! 通配符模式匹配
//!
//! 策略中的每个模式在加载时编译一次：不含 `*` 的模式按字面相等比较，
//! 含 `*` 的模式转义全部正则元字符后将 `*` 替换为 `.*` 并以 `^...$` 锚定。

use regex::Regex;

/// 预编译的模式
#[derive(Debug, Clone)]
pub enum Matcher {
    /// 精确匹配
    Exact(String),
    /// 通配符匹配
    Wildcard { pattern: String, regex: Regex },
}

impl Matcher {
    /// 编译模式；正则构建失败时返回错误，由调用方决定是否退化为精确匹配
    pub fn try_compile(pattern: &str) -> Result<Self, regex::Error> {
        if !pattern.contains('*') {
            return Ok(Matcher::Exact(pattern.to_string()));
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$"))?;

        Ok(Matcher::Wildcard {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// 编译模式，失败时退化为精确匹配并记录警告
    pub fn compile(pattern: &str) -> Self {
        match Self::try_compile(pattern) {
            Ok(matcher) => matcher,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "wildcard pattern falls back to exact match");
                Matcher::Exact(pattern.to_string())
            }
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            Matcher::Exact(pattern) => pattern,
            Matcher::Wildcard { pattern, .. } => pattern,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Matcher::Wildcard { .. })
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(pattern) => pattern == value,
            Matcher::Wildcard { regex, .. } => regex.is_match(value),
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.is_wildcard() == other.is_wildcard() && self.pattern() == other.pattern()
    }
}

impl Eq for Matcher {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_subdomains() {
        let m = Matcher::compile("*.example.com");
        assert!(m.is_wildcard());
        assert!(m.matches("a.example.com"));
        assert!(m.matches("a.b.example.com"));
        assert!(!m.matches("example.com"));
        assert!(!m.matches("a.example.com.evil.io"));
    }

    #[test]
    fn test_literal_requires_equality() {
        let m = Matcher::compile("api.corp.io");
        assert_eq!(m, Matcher::Exact("api.corp.io".to_string()));
        assert!(m.matches("api.corp.io"));
        // 字面模式中的 `.` 不是正则通配
        assert!(!m.matches("apixcorp.io"));
    }

    #[test]
    fn test_metacharacters_are_escaped() {
        let m = Matcher::compile("svc+(*).corp.io");
        assert!(m.matches("svc+(blue).corp.io"));
        assert!(!m.matches("svcc(blue).corp.io"));
        assert!(!m.matches("svc+(blue)xcorp.io"));
    }

    #[test]
    fn test_multiple_wildcards() {
        let m = Matcher::compile("*-*.internal");
        assert!(m.matches("db-01.internal"));
        assert!(!m.matches("db01.internal"));
    }

    #[test]
    fn test_bare_star_matches_anything() {
        let m = Matcher::compile("*");
        assert!(m.matches(""));
        assert!(m.matches("anything at all"));
    }
}
