//! robots.txt parsing and matching for the `*` user agent.

use regex::Regex;

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    pattern_len: usize,
    matcher: Regex,
}

/// Rules of the `User-agent: *` group of one robots.txt file.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    rules: Vec<Rule>,
}

impl RobotsRules {
    /// Rules that allow every path (no robots.txt, or it could not be read).
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let mut rules = Vec::new();
        let mut reading_agents = false;
        let mut applies = false;

        for raw_line in text.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group.
                    if !reading_agents {
                        applies = false;
                        reading_agents = true;
                    }
                    if value == "*" {
                        applies = true;
                    }
                }
                directive @ ("allow" | "disallow") => {
                    reading_agents = false;
                    // An empty Disallow allows everything; it adds no rule.
                    if applies
                        && !value.is_empty()
                        && let Some(rule) = Rule::new(directive == "allow", value)
                    {
                        rules.push(rule);
                    }
                }
                _ => {}
            }
        }

        Self { rules }
    }

    /// Longest matching pattern wins; on a tie, Allow wins. No match allows.
    pub fn is_allowed(&self, path: &str) -> bool {
        let mut best: Option<&Rule> = None;
        for rule in self.rules.iter().filter(|rule| rule.matcher.is_match(path)) {
            best = match best {
                Some(current)
                    if current.pattern_len > rule.pattern_len
                        || (current.pattern_len == rule.pattern_len && current.allow) =>
                {
                    Some(current)
                }
                _ => Some(rule),
            };
        }
        best.is_none_or(|rule| rule.allow)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Rule {
    fn new(allow: bool, pattern: &str) -> Option<Self> {
        let (body, anchored) = match pattern.strip_suffix('$') {
            Some(body) => (body, true),
            None => (pattern, false),
        };
        let mut expr = String::from("^");
        expr.push_str(
            &body
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*"),
        );
        if anchored {
            expr.push('$');
        }
        let matcher = Regex::new(&expr).ok()?;
        Some(Self {
            allow,
            pattern_len: pattern.len(),
            matcher,
        })
    }
}

/// Split an http(s) URL into its lowercased origin and its path plus query.
///
/// Returns `None` for anything that is not an absolute http(s) URL.
pub fn split_url(url: &str) -> Option<(String, String)> {
    let (scheme, rest) = url.trim().split_once("://")?;
    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let rest = rest.split('#').next().unwrap_or("");
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    if authority.is_empty() {
        return None;
    }
    let path = match &rest[authority_end..] {
        "" => "/".to_string(),
        tail if tail.starts_with('?') => format!("/{tail}"),
        tail => tail.to_string(),
    };
    Some((format!("{scheme}://{}", authority.to_ascii_lowercase()), path))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "\
User-agent: Googlebot
Disallow: /

User-agent: *
Disallow: /private/
Allow: /private/public-notes
Disallow: /*.pdf$ # documents
Disallow:

Sitemap: https://example.com/sitemap.xml
";

    #[test]
    fn only_star_group_applies() {
        let rules = RobotsRules::parse(ROBOTS);
        assert!(rules.is_allowed("/"));
        assert!(rules.is_allowed("/articles/rust"));
        assert!(!rules.is_allowed("/private/keys"));
    }

    #[test]
    fn longest_match_wins() {
        let rules = RobotsRules::parse(ROBOTS);
        assert!(rules.is_allowed("/private/public-notes/1"));
    }

    #[test]
    fn wildcards_and_end_anchor() {
        let rules = RobotsRules::parse(ROBOTS);
        assert!(!rules.is_allowed("/files/report.pdf"));
        assert!(rules.is_allowed("/files/report.pdf?download=1"));
    }

    #[test]
    fn shared_group_with_multiple_agents() {
        let rules = RobotsRules::parse("User-agent: a\nUser-agent: *\nDisallow: /tmp\n");
        assert!(!rules.is_allowed("/tmp/x"));
        assert!(RobotsRules::allow_all().is_allowed("/tmp/x"));
        assert!(RobotsRules::parse("garbage\n\n").is_empty());
    }

    #[test]
    fn splits_urls() {
        assert_eq!(
            split_url("HTTPS://Example.COM/a/b?q=1#frag"),
            Some(("https://example.com".to_string(), "/a/b?q=1".to_string()))
        );
        assert_eq!(
            split_url("http://example.com:8080"),
            Some(("http://example.com:8080".to_string(), "/".to_string()))
        );
        assert_eq!(
            split_url("http://example.com?x=1"),
            Some(("http://example.com".to_string(), "/?x=1".to_string()))
        );
        assert_eq!(split_url("ftp://example.com/"), None);
        assert_eq!(split_url("not a url"), None);
        assert_eq!(split_url("https:///path"), None);
    }
}
