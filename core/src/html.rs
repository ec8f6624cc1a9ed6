use lazy_static::lazy_static;
use scraper::{Html, Node, Selector};

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("valid selector");
}

const HIDDEN: &[&str] = &["script", "style", "noscript", "template"];

/// Visible text of an HTML document with whitespace collapsed to single spaces.
pub fn page_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut raw = String::new();
    for node in doc.root_element().descendants() {
        let Node::Text(text) = node.value() else { continue };
        let hidden = node.ancestors().any(|a| match a.value() {
            Node::Element(el) => HIDDEN.contains(&el.name()),
            _ => false,
        });
        if !hidden {
            raw.push_str(text);
            raw.push(' ');
        }
    }
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn page_title(html: &str) -> String {
    let doc = Html::parse_document(html);
    doc.select(&TITLE)
        .next()
        .map(|n| n.text().collect::<String>())
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_skips_scripts_and_collapses_whitespace() {
        let html = "<html><head><title> Ferris \n Home</title><script>var x = 1;</script></head>\
                    <body><h1>Hello</h1>\n\n<p>crab   world</p><style>p{}</style></body></html>";
        assert_eq!(page_text(html), "Ferris Home Hello crab world");
        assert_eq!(page_title(html), "Ferris Home");
    }

    #[test]
    fn missing_title_is_empty() {
        assert_eq!(page_title("<p>no title</p>"), "");
    }
}
