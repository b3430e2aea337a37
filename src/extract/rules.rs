//! Declarative field rules evaluated against a parsed page.
//!
//! Each field has an ordered list of rules; the first rule that yields a
//! non-empty value wins.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// One way of reading a field from the page.
#[derive(Debug, Clone, Copy)]
pub enum Rule {
    /// Trimmed text of the first element matching the selector.
    Text(&'static str),
    /// Attribute of the first matching element that carries it.
    Attr(&'static str, &'static str),
    /// The `<title>` with a trailing " - Site" / " | Site" suffix removed.
    Title,
    /// A "(...)" group at the end of the element text, as in "Download (12 MB)".
    ParenSuffix(&'static str),
}

/// Parse a selector, logging (not failing) on a bad one.
pub fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            debug!("Invalid selector {:?}: {:?}", css, e);
            None
        }
    }
}

/// Collapsed, trimmed text content of an element.
pub fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether any element on the page matches `css`.
pub fn has_match(document: &Html, css: &str) -> bool {
    selector(css).is_some_and(|sel| document.select(&sel).next().is_some())
}

impl Rule {
    pub fn apply(&self, document: &Html) -> Option<String> {
        let value = match *self {
            Rule::Text(css) => {
                let sel = selector(css)?;
                document
                    .select(&sel)
                    .map(|el| element_text(&el))
                    .find(|t| !t.is_empty())
            }
            Rule::Attr(css, attr) => {
                let sel = selector(css)?;
                document
                    .select(&sel)
                    .filter_map(|el| el.value().attr(attr))
                    .map(|v| v.trim().to_string())
                    .find(|v| !v.is_empty())
            }
            Rule::Title => {
                let sel = selector("title")?;
                let title = document.select(&sel).next().map(|el| element_text(&el))?;
                Some(strip_site_suffix(&title).to_string())
            }
            Rule::ParenSuffix(css) => {
                let sel = selector(css)?;
                document
                    .select(&sel)
                    .filter_map(|el| paren_suffix(&element_text(&el)))
                    .next()
            }
        };
        value.filter(|v| !v.is_empty())
    }
}

/// First non-empty value produced by `rules`, in order.
pub fn first_match(document: &Html, rules: &[Rule]) -> Option<String> {
    rules.iter().find_map(|rule| rule.apply(document))
}

/// "report.pdf - FileHost" -> "report.pdf"
pub fn strip_site_suffix(title: &str) -> &str {
    let title = title.trim();
    [" - ", " | "]
        .iter()
        .filter_map(|sep| title.rfind(sep).map(|i| &title[..i]))
        .map(str::trim)
        .filter(|head| !head.is_empty())
        .min_by_key(|head| head.len())
        .unwrap_or(title)
}

/// "Download (12.5MB)" -> "12.5MB"
pub fn paren_suffix(text: &str) -> Option<String> {
    let text = text.trim_end();
    let inner = text.strip_suffix(')')?;
    let open = inner.rfind('(')?;
    let value = inner[open + 1..].trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head><title>somefile.zip - FileHost</title></head>
        <body>
          <div class="filename">  somefile.zip </div>
          <div class="empty"></div>
          <a id="downloadButton" data-x="" title="hover">Download (12 MB)</a>
          <span data-name="other.bin"></span>
        </body></html>
    "#;

    #[test]
    fn test_text_rule_trims() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(
            Rule::Text(".filename").apply(&doc),
            Some("somefile.zip".to_string())
        );
        assert_eq!(Rule::Text(".empty").apply(&doc), None);
    }

    #[test]
    fn test_attr_rule_skips_empty_values() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(Rule::Attr("#downloadButton", "data-x").apply(&doc), None);
        assert_eq!(
            Rule::Attr("[data-name]", "data-name").apply(&doc),
            Some("other.bin".to_string())
        );
    }

    #[test]
    fn test_first_match_respects_order() {
        let doc = Html::parse_document(PAGE);
        let rules = [
            Rule::Text(".missing"),
            Rule::Title,
            Rule::Text(".filename"),
        ];
        assert_eq!(first_match(&doc, &rules), Some("somefile.zip".to_string()));
    }

    #[test]
    fn test_paren_suffix_rule() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(
            Rule::ParenSuffix("#downloadButton").apply(&doc),
            Some("12 MB".to_string())
        );
        assert_eq!(paren_suffix("Download"), None);
        assert_eq!(paren_suffix("Download ()"), None);
    }

    #[test]
    fn test_strip_site_suffix() {
        assert_eq!(strip_site_suffix("a.zip - Host"), "a.zip");
        assert_eq!(strip_site_suffix("a.zip | Host"), "a.zip");
        assert_eq!(strip_site_suffix("plain"), "plain");
        assert_eq!(strip_site_suffix(" - Host"), "- Host");
    }

    #[test]
    fn test_invalid_selector_is_no_match() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(Rule::Text("div[[").apply(&doc), None);
        assert!(!has_match(&doc, ":::"));
    }
}
