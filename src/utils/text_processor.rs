use regex::{Captures, Regex};
use std::sync::LazyLock;

static RE_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());
static RE_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").unwrap());
static RE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*/?\s*([A-Za-z][A-Za-z0-9]*)?[^>]*>").unwrap());
static RE_NBSP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&(?:nbsp|#160|#xA0);").unwrap());
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Phrasing elements that sit inside a word run
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "dfn", "em", "font", "i", "kbd", "mark", "q", "rb",
    "rp", "rt", "ruby", "s", "samp", "small", "span", "strike", "strong", "sub", "sup", "time", "tt", "u",
    "var", "wbr",
];

/// Strip markup, collapse whitespace runs to one space, trim.
///
/// Idempotent: a second pass finds no tags (any surviving `<` has no `>`
/// after it) and no whitespace runs.
pub fn normalize(raw: &str) -> String {
    let text = strip_markup(raw);
    collapse_whitespace(&text)
}

/// Collapse whitespace only, leaving any markup in place
pub fn collapse_whitespace(text: &str) -> String {
    RE_SPACES.replace_all(text, " ").trim().to_string()
}

/// Remove tags, comments and the bodies of `script`/`style` elements.
/// Inline tags vanish; any other tag leaves a space so adjacent blocks
/// do not fuse words.
fn strip_markup(html: &str) -> String {
    let text = RE_SCRIPT.replace_all(html, " ");
    let text = RE_STYLE.replace_all(&text, " ");
    let text = RE_COMMENT.replace_all(&text, " ");
    let text = RE_TAG.replace_all(&text, |caps: &Captures| tag_separator(caps.get(1).map(|m| m.as_str())));
    RE_NBSP.replace_all(&text, " ").into_owned()
}

fn tag_separator(name: Option<&str>) -> &'static str {
    match name {
        Some(name) if INLINE_TAGS.iter().any(|tag| tag.eq_ignore_ascii_case(name)) => "",
        _ => " ",
    }
}
