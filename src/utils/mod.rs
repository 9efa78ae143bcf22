use anyhow::Result;
use url::Url;

pub mod retry;

pub use retry::{with_backoff, AttemptError, RetryPolicy};

/// Validate a URL and return normalized version
pub fn validate_and_normalize_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed.to_string())
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Collapse all whitespace runs into single spaces
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Greedy word wrap to at most `width` characters per line.
///
/// Whitespace is collapsed first; words longer than `width` are split.
pub fn wrap_text(text: &str, width: usize) -> String {
    let width = width.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut line_len = 0;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        let mut rest: &[char] = &chars;

        while !rest.is_empty() {
            let needed = if line_len == 0 { rest.len() } else { line_len + 1 + rest.len() };
            if needed <= width {
                if line_len > 0 {
                    line.push(' ');
                    line_len += 1;
                }
                line.extend(rest.iter());
                line_len += rest.len();
                break;
            }

            if rest.len() <= width {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
                continue;
            }

            // long word: fill what is left of the line
            let room = if line_len == 0 { width } else { width.saturating_sub(line_len + 1) };
            if room == 0 {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
                continue;
            }
            if line_len > 0 {
                line.push(' ');
            }
            line.extend(rest[..room].iter());
            lines.push(std::mem::take(&mut line));
            line_len = 0;
            rest = &rest[room..];
        }
    }

    if line_len > 0 {
        lines.push(line);
    }
    lines.join("\n")
}

/// Extract domain from URL for display purposes
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|host| {
            // Remove 'www.' prefix if present
            if host.starts_with("www.") {
                host[4..].to_string()
            } else {
                host.to_string()
            }
        })
}

/// Check if the current environment has required tools
pub async fn check_dependencies(yt_dlp_path: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp_path).await {
        missing.push(format!("{} - required for playlist enumeration and captions", yt_dlp_path));
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("one two three four", 9), "one two\nthree\nfour");
        assert_eq!(wrap_text("  spaced \n\n out  ", 160), "spaced out");
        assert_eq!(wrap_text("", 10), "");
    }

    #[test]
    fn test_wrap_text_splits_long_words() {
        assert_eq!(wrap_text("abcdefghij", 4), "abcd\nefgh\nij");
        assert_eq!(wrap_text("ab cdefghij", 5), "ab cd\nefghi\nj");
    }

    #[test]
    fn test_wrap_text_respects_width() {
        let text = "lorem ipsum dolor sit amet ".repeat(40);
        for line in wrap_text(&text, 160).lines() {
            assert!(line.chars().count() <= 160);
        }
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://www.youtube.com/watch?v=123"),
            Some("youtube.com".to_string())
        );
        assert_eq!(
            extract_domain("https://example.com/blog/page/2/"),
            Some("example.com".to_string())
        );
        assert_eq!(extract_domain("invalid-url"), None);
    }

    #[test]
    fn test_validate_and_normalize_url() {
        assert!(validate_and_normalize_url("https://example.com").is_ok());
        assert!(validate_and_normalize_url("http://example.com").is_ok());
        assert!(validate_and_normalize_url("ftp://example.com").is_err());
        assert!(validate_and_normalize_url("not-a-url").is_err());
    }
}
