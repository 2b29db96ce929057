//! UTF-8 safe string previews for log lines.
//!
//! Tool arguments and results can be large; log events carry a bounded
//! preview cut on char boundaries so multibyte text never panics.

/// Return a preview of `s` up to `n` characters, with a trailing `...` when cut.
pub fn preview(s: &str, n: usize) -> String {
    let mut chars = s.chars();
    let mut prefix: String = chars.by_ref().take(n).collect();
    if chars.next().is_some() {
        prefix.push_str("...");
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_ascii() {
        assert_eq!(preview("hello world", 5), "hello...");
        assert_eq!(preview("hello world", 20), "hello world");
        assert_eq!(preview("exact", 5), "exact");
    }

    #[test]
    fn preview_multibyte() {
        let s = "héllo wörld ✓✓✓";
        let p = preview(s, 7);
        assert_eq!(p, "héllo w...");
    }
}
