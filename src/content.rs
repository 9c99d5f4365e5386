//! Plain-text extraction for reviewer excerpts.

use regex::{Captures, Regex};

/// Longest excerpt stored next to a reviewer, in characters.
pub const EXCERPT_CHARS: usize = 200;

/// Turns rich-text HTML into a short plain-text preview.
#[derive(Debug, Clone)]
pub struct ExcerptBuilder {
    hidden_blocks: Regex,
    block_tags: Regex,
    tags: Regex,
    entities: Regex,
}

impl ExcerptBuilder {
    /// Compiles the extraction patterns.
    ///
    /// # Errors
    ///
    /// Returns [`regex::Error`] if a pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            hidden_blocks: Regex::new(
                r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<!--.*?-->",
            )?,
            block_tags: Regex::new(
                r"(?i)</?(div|p|br|h[1-6]|li|tr|td|blockquote|pre|section|article)[^>]*>",
            )?,
            tags: Regex::new(r"<[^>]*>")?,
            entities: Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);")?,
        })
    }

    /// Full plain text of `html` with whitespace collapsed.
    pub fn plain_text(&self, html: &str) -> String {
        let text = self.hidden_blocks.replace_all(html, " ");
        let text = self.block_tags.replace_all(&text, " ");
        let text = self.tags.replace_all(&text, "");
        let text = self
            .entities
            .replace_all(&text, |caps: &Captures| decode_entity(&caps[1], &caps[0]));
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Plain text truncated to [`EXCERPT_CHARS`] characters.
    pub fn excerpt(&self, html: &str) -> String {
        let text = self.plain_text(html);
        if text.chars().count() <= EXCERPT_CHARS {
            return text;
        }
        let cut: String = text.chars().take(EXCERPT_CHARS - 1).collect();
        format!("{}…", cut.trim_end())
    }
}

fn decode_entity(name: &str, raw: &str) -> String {
    let numeric = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        Some(u32::from_str_radix(hex, 16).ok())
    } else {
        name.strip_prefix('#').map(|dec| dec.parse::<u32>().ok())
    };
    if let Some(code) = numeric {
        return code
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default();
    }
    match name {
        "nbsp" => " ",
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        _ => return raw.to_string(),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ExcerptBuilder {
        ExcerptBuilder::new().expect("patterns compile")
    }

    #[test]
    fn strips_tags_scripts_and_entities() {
        let html = "<h1>Cell&nbsp;Biology</h1><script>alert(1)</script>\
                    <p>Mitochondria &amp; ribosomes &#8211; <b>organelles</b></p>";
        assert_eq!(
            builder().plain_text(html),
            "Cell Biology Mitochondria & ribosomes \u{2013} organelles"
        );
    }

    #[test]
    fn unknown_entities_are_kept() {
        assert_eq!(builder().plain_text("a &bogus; b"), "a &bogus; b");
    }

    #[test]
    fn excerpt_is_truncated() {
        let html = format!("<p>{}</p>", "word ".repeat(100));
        let excerpt = builder().excerpt(&html);
        assert!(excerpt.chars().count() <= EXCERPT_CHARS);
        assert!(excerpt.ends_with('…'));
    }

    #[test]
    fn short_content_is_unchanged() {
        assert_eq!(builder().excerpt("<em>Short</em> note"), "Short note");
    }
}
