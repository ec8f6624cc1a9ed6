const CONTEXT_BEFORE: usize = 60;
const SNIPPET_CHARS: usize = 200;
const TITLE_LABEL: &str = "<b>Title:</b> ";

/// Splits raw query text into the lowercase words used for literal highlighting.
pub fn query_words(query: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for raw in query.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        if !word.is_empty() && !words.contains(&word) {
            words.push(word);
        }
    }
    words
}

/// Builds the snippet shown for one hit.
///
/// When the title mentions a query word it is prepended with its matches in
/// bold. The body part is a window of the text around the first occurrence of
/// the first query word (in query order) found in it, again with every
/// occurrence of every query word in bold. Empty when neither matches.
pub fn build_snippet(text: &str, title: &str, words: &[String]) -> String {
    let mut snippet = String::new();
    let title_chars: Vec<char> = title.chars().collect();
    if words.iter().any(|w| find_folded(&title_chars, w, 0).is_some()) {
        snippet.push_str(TITLE_LABEL);
        snippet.push_str(&highlight(&title_chars, words));
    }

    let chars: Vec<char> = text.chars().collect();
    let first = words.iter().find_map(|w| find_folded(&chars, w, 0));
    if let Some(idx) = first {
        let start = idx.saturating_sub(CONTEXT_BEFORE);
        let end = (start + SNIPPET_CHARS).min(chars.len());
        if !snippet.is_empty() {
            snippet.push_str("<br><br>");
        }
        snippet.push_str(&highlight(&chars[start..end], words));
    }

    if snippet.is_empty() {
        snippet
    } else {
        snippet + "..."
    }
}

/// Wraps every case-insensitive occurrence of every word in `<b>..</b>`.
/// Overlapping or adjacent matches share one bold run.
pub fn highlight(chars: &[char], words: &[String]) -> String {
    let mut marked = vec![false; chars.len()];
    for word in words {
        let len = word.chars().count();
        if len == 0 {
            continue;
        }
        let mut from = 0;
        while let Some(pos) = find_folded(chars, word, from) {
            marked[pos..pos + len].iter_mut().for_each(|m| *m = true);
            from = pos + 1;
        }
    }

    let mut out = String::with_capacity(chars.len() + 16);
    let mut bold = false;
    for (c, &m) in chars.iter().zip(&marked) {
        if m && !bold {
            out.push_str("<b>");
        } else if !m && bold {
            out.push_str("</b>");
        }
        bold = m;
        out.push(*c);
    }
    if bold {
        out.push_str("</b>");
    }
    out
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Char index of the first case-insensitive occurrence of `needle` at or after `from`.
fn find_folded(haystack: &[char], needle: &str, from: usize) -> Option<usize> {
    let needle: Vec<char> = needle.chars().map(fold).collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| {
        haystack[i..i + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(&h, &n)| fold(h) == n)
    })
}
