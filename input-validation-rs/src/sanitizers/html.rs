//! HTML sanitization utilities
//!
//! [`sanitize_html`] tokenizes markup, builds a node tree and re-serializes
//! only what the allow-lists permit. Script and style content, comments and
//! declarations never survive; disallowed elements are unwrapped so their
//! text children are kept.

use super::SanitizeResult;
use crate::errors::InputError;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

/// Default cap on element nesting before the input is treated as malformed
pub const DEFAULT_MAX_HTML_DEPTH: usize = 128;

lazy_static! {
    /// Set of allowed HTML tags for basic HTML sanitization
    static ref SAFE_TAGS: HashSet<&'static str> = [
        "p", "br", "b", "i", "u", "em", "strong", "a", "ul", "ol", "li", "span", "div",
        "blockquote", "code", "pre", "h1", "h2", "h3", "h4", "h5", "h6", "img", "table",
        "thead", "tbody", "tr", "th", "td", "hr", "sub", "sup",
    ]
    .into_iter()
    .collect();

    /// Set of allowed HTML attributes for basic HTML sanitization
    static ref SAFE_ATTRS: HashSet<&'static str> =
        ["href", "src", "alt", "title", "class", "id", "colspan", "rowspan"]
            .into_iter()
            .collect();

    static ref VOID_TAGS: HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta",
        "source", "track", "wbr",
    ]
    .into_iter()
    .collect();

    static ref URL_ATTRS: HashSet<&'static str> = [
        "href", "src", "action", "formaction", "poster", "background", "cite", "longdesc",
        "xlink:href",
    ]
    .into_iter()
    .collect();

    static ref TAG_NAME_REGEX: Regex = Regex::new(r"^/?([A-Za-z][A-Za-z0-9:-]*)").unwrap();

    // Match attributes within a tag
    static ref ATTR_REGEX: Regex = Regex::new(
        r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#
    )
    .unwrap();

    static ref SCRIPT_SCHEME_REGEX: Regex = Regex::new(r"(?i)((?:java|vb)script)(\s*):").unwrap();
    static ref NUMERIC_ENTITY_REGEX: Regex = Regex::new(r"&#(?:[xX]([0-9a-fA-F]+)|([0-9]+));?").unwrap();
    static ref NAMED_ENTITY_REGEX: Regex = Regex::new(r"(?i)&([a-z][a-z0-9]*);?").unwrap();
    static ref TAG_REGEX: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref COMMENT_REGEX: Regex = Regex::new(r"(?s)<!--.*?(?:-->|\z)").unwrap();
    static ref SCRIPT_BLOCK_REGEX: Regex =
        Regex::new(r"(?is)<script\b.*?(?:</script\s*>|\z)").unwrap();
    static ref STYLE_BLOCK_REGEX: Regex =
        Regex::new(r"(?is)<style\b.*?(?:</style\s*>|\z)").unwrap();
}

/// Elements dropped together with their content regardless of allow-lists
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// What [`sanitize_html`] returns when the input cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseFailurePolicy {
    /// Remove every tag and keep only escaped text
    #[default]
    StripAll,
    /// Hand the input back untouched
    ReturnOriginal,
}

impl From<&str> for ParseFailurePolicy {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "return_original" | "original" => ParseFailurePolicy::ReturnOriginal,
            _ => ParseFailurePolicy::StripAll,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlSanitizeOptions {
    pub allowed_tags: HashSet<String>,
    pub allowed_attributes: HashSet<String>,
    pub allow_data_attributes: bool,
    pub on_parse_failure: ParseFailurePolicy,
    pub max_depth: usize,
}

impl Default for HtmlSanitizeOptions {
    fn default() -> Self {
        Self {
            allowed_tags: SAFE_TAGS.iter().map(|t| t.to_string()).collect(),
            allowed_attributes: SAFE_ATTRS.iter().map(|a| a.to_string()).collect(),
            allow_data_attributes: false,
            on_parse_failure: ParseFailurePolicy::default(),
            max_depth: DEFAULT_MAX_HTML_DEPTH,
        }
    }
}

impl HtmlSanitizeOptions {
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_tags = tags
            .into_iter()
            .map(|t| t.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_attributes = attributes
            .into_iter()
            .map(|a| a.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    fn attribute_allowed(&self, name: &str) -> bool {
        if name.starts_with("on") {
            return false;
        }
        self.allowed_attributes.contains(name)
            || (self.allow_data_attributes && name.len() > 5 && name.starts_with("data-"))
    }
}

#[derive(Debug)]
enum Token {
    Text(String),
    StartTag {
        name: String,
        attributes: Vec<(String, String)>,
        self_closing: bool,
    },
    EndTag(String),
    /// Comment, doctype, processing instruction or raw-text element
    Dropped,
}

#[derive(Debug)]
enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct SanitizeStats {
    dropped_nodes: usize,
    unwrapped_elements: usize,
    removed_attributes: usize,
    neutralized_schemes: usize,
}

/// Sanitize HTML against the tag and attribute allow-lists
pub fn sanitize_html(input: &str, options: &HtmlSanitizeOptions) -> SanitizeResult<String> {
    let mut stats = SanitizeStats::default();

    let tree = tokenize(input, &mut stats).and_then(|tokens| build_tree(tokens, options.max_depth));
    let root = match tree {
        Ok(root) => root,
        Err(e) => {
            log::warn!("HTML parse failure ({}), applying {:?}", e, options.on_parse_failure);
            return match options.on_parse_failure {
                ParseFailurePolicy::ReturnOriginal => SanitizeResult::new(
                    input.to_string(),
                    false,
                    Some(format!("Parse failure, returned original: {}", e)),
                ),
                ParseFailurePolicy::StripAll => {
                    let stripped = strip_all_markup(input);
                    let was_modified = stripped != input;
                    SanitizeResult::new(
                        stripped,
                        was_modified,
                        Some(format!("Parse failure, stripped all markup: {}", e)),
                    )
                }
            };
        }
    };

    let mut output = String::with_capacity(input.len());
    for child in &root.children {
        render(child, options, &mut output, &mut stats);
    }

    if output == input {
        return SanitizeResult::unmodified(output);
    }

    let mut details = Vec::new();
    if stats.dropped_nodes > 0 {
        details.push(format!("dropped {} script/style/comment nodes", stats.dropped_nodes));
    }
    if stats.unwrapped_elements > 0 {
        details.push(format!("removed {} disallowed elements", stats.unwrapped_elements));
    }
    if stats.removed_attributes > 0 {
        details.push(format!("removed {} attributes", stats.removed_attributes));
    }
    if stats.neutralized_schemes > 0 {
        details.push(format!("neutralized {} script schemes", stats.neutralized_schemes));
    }
    if details.is_empty() {
        details.push("normalized markup".to_string());
    }
    SanitizeResult::modified(output, Some(details.join(", ")))
}

fn tokenize(input: &str, stats: &mut SanitizeStats) -> Result<Vec<Token>, InputError> {
    let lower = input.to_ascii_lowercase();
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while let Some(offset) = input[pos..].find('<') {
        let lt = pos + offset;
        let rest = &input[lt..];
        let next = bytes.get(lt + 1).copied();

        let is_comment = rest.starts_with("<!--");
        let is_declaration = matches!(next, Some(b'!') | Some(b'?'));
        let is_end_tag =
            next == Some(b'/') && bytes.get(lt + 2).map_or(false, |b| b.is_ascii_alphabetic());
        let is_start_tag = next.map_or(false, |b| b.is_ascii_alphabetic());

        if !(is_comment || is_declaration || is_end_tag || is_start_tag) {
            // literal '<' stays in the text run
            pos = lt + 1;
            continue;
        }

        if lt > text_start {
            tokens.push(Token::Text(input[text_start..lt].to_string()));
        }

        if is_comment {
            let close = input[lt + 2..]
                .find("-->")
                .ok_or_else(|| InputError::MalformedHtml("unterminated comment".to_string()))?;
            pos = lt + 2 + close + 3;
            stats.dropped_nodes += 1;
            tokens.push(Token::Dropped);
        } else if is_declaration {
            let close = input[lt..]
                .find('>')
                .ok_or_else(|| InputError::MalformedHtml("unterminated declaration".to_string()))?;
            pos = lt + close + 1;
            stats.dropped_nodes += 1;
            tokens.push(Token::Dropped);
        } else {
            let gt = find_tag_end(input, lt + 1)
                .ok_or_else(|| InputError::MalformedHtml("unterminated tag".to_string()))?;
            let inner = &input[lt + 1..gt];
            pos = gt + 1;

            let name = TAG_NAME_REGEX
                .captures(inner)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_ascii_lowercase())
                .unwrap_or_default();

            if is_end_tag {
                tokens.push(Token::EndTag(name));
            } else if RAW_TEXT_TAGS.contains(&name.as_str()) {
                // skip everything up to and including the matching close tag
                let closing = format!("</{}", name);
                pos = match lower[pos..].find(&closing) {
                    Some(idx) => {
                        let close_start = pos + idx;
                        match find_tag_end(input, close_start + 1) {
                            Some(close_gt) => close_gt + 1,
                            None => input.len(),
                        }
                    }
                    None => input.len(),
                };
                stats.dropped_nodes += 1;
                tokens.push(Token::Dropped);
            } else {
                let attr_source = &inner[name.len()..];
                let self_closing = attr_source.trim_end().ends_with('/');
                let attributes = parse_attributes(attr_source.trim_end().trim_end_matches('/'));
                tokens.push(Token::StartTag {
                    name,
                    attributes,
                    self_closing,
                });
            }
        }
        text_start = pos;
    }

    if text_start < input.len() {
        tokens.push(Token::Text(input[text_start..].to_string()));
    }
    Ok(tokens)
}

/// Index of the `>` closing the tag opened before `from`, skipping quoted
/// attribute values
fn find_tag_end(input: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (idx, ch) in input[from..].char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '>') => return Some(from + idx),
            (None, _) => {}
        }
    }
    None
}

fn parse_attributes(source: &str) -> Vec<(String, String)> {
    ATTR_REGEX
        .captures_iter(source)
        .map(|caps| {
            let name = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

fn build_tree(tokens: Vec<Token>, max_depth: usize) -> Result<Element, InputError> {
    let mut stack: Vec<Element> = vec![Element::new("#root".to_string(), Vec::new())];

    for token in tokens {
        match token {
            Token::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.children.push(Node::Text(text));
                }
            }
            Token::StartTag {
                name,
                attributes,
                self_closing,
            } => {
                let element = Element::new(name, attributes);
                if self_closing || VOID_TAGS.contains(element.name.as_str()) {
                    if let Some(top) = stack.last_mut() {
                        top.children.push(Node::Element(element));
                    }
                } else {
                    if stack.len() > max_depth {
                        return Err(InputError::MalformedHtml(format!(
                            "nesting deeper than {} elements",
                            max_depth
                        )));
                    }
                    stack.push(element);
                }
            }
            Token::EndTag(name) => {
                // stray close tags are ignored; otherwise close up to the match
                if let Some(open_idx) = stack.iter().skip(1).rposition(|e| e.name == name) {
                    let target = open_idx + 1;
                    while stack.len() > target {
                        close_top(&mut stack);
                    }
                }
            }
            Token::Dropped => {}
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack);
    }
    stack
        .pop()
        .ok_or_else(|| InputError::MalformedHtml("empty document".to_string()))
}

fn close_top(stack: &mut Vec<Element>) {
    if let Some(element) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(Node::Element(element));
        }
    }
}

fn render(node: &Node, options: &HtmlSanitizeOptions, out: &mut String, stats: &mut SanitizeStats) {
    match node {
        Node::Text(text) => out.push_str(&escape_text(text, stats)),
        Node::Element(element) => {
            let allowed = options.allowed_tags.contains(&element.name)
                && !RAW_TEXT_TAGS.contains(&element.name.as_str());
            if !allowed {
                stats.unwrapped_elements += 1;
                for child in &element.children {
                    render(child, options, out, stats);
                }
                return;
            }

            out.push('<');
            out.push_str(&element.name);
            for (name, value) in &element.attributes {
                if !options.attribute_allowed(name) {
                    stats.removed_attributes += 1;
                    continue;
                }
                if URL_ATTRS.contains(name.as_str()) && has_dangerous_scheme(value) {
                    stats.removed_attributes += 1;
                    continue;
                }
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attribute(value, stats));
                out.push('"');
            }
            out.push('>');

            if VOID_TAGS.contains(element.name.as_str()) {
                return;
            }
            for child in &element.children {
                render(child, options, out, stats);
            }
            out.push_str("</");
            out.push_str(&element.name);
            out.push('>');
        }
    }
}

/// Named entities a browser decodes inside URL attributes that can hide a
/// scheme. Names are compared case-insensitively.
fn named_entity(name: &str) -> Option<&'static str> {
    let decoded = match name.to_ascii_lowercase().as_str() {
        "tab" => "\t",
        "newline" => "\n",
        "nbsp" => "\u{a0}",
        "colon" => ":",
        "sol" => "/",
        "period" => ".",
        "semi" => ";",
        "lpar" => "(",
        "rpar" => ")",
        "amp" => "&",
        "quot" => "\"",
        "apos" => "'",
        _ => return None,
    };
    Some(decoded)
}

/// True when a URL attribute value resolves to a script or data scheme once
/// entities, whitespace and control characters are removed. A scheme that
/// still holds an undecoded `&` is treated as dangerous.
fn has_dangerous_scheme(value: &str) -> bool {
    let decoded = NUMERIC_ENTITY_REGEX.replace_all(value, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });
    let decoded = NAMED_ENTITY_REGEX.replace_all(&decoded, |caps: &regex::Captures| {
        named_entity(&caps[1])
            .map(str::to_string)
            .unwrap_or_else(|| caps[0].to_string())
    });
    let compact: String = decoded
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    if ["javascript:", "vbscript:", "data:"]
        .iter()
        .any(|scheme| compact.starts_with(scheme))
    {
        return true;
    }

    // only text before the first ':' that precedes any path, query or
    // fragment delimiter is a scheme
    match compact.find(|c: char| matches!(c, ':' | '/' | '?' | '#')) {
        Some(idx) if compact[idx..].starts_with(':') => compact[..idx].contains('&'),
        _ => false,
    }
}

fn neutralize_schemes(text: &str, stats: &mut SanitizeStats) -> String {
    let count = SCRIPT_SCHEME_REGEX.find_iter(text).count();
    if count == 0 {
        return text.to_string();
    }
    stats.neutralized_schemes += count;
    SCRIPT_SCHEME_REGEX
        .replace_all(text, "${1}${2}&#58;")
        .into_owned()
}

fn escape_text(text: &str, stats: &mut SanitizeStats) -> String {
    neutralize_schemes(&text.replace('<', "&lt;").replace('>', "&gt;"), stats)
}

fn escape_attribute(value: &str, stats: &mut SanitizeStats) -> String {
    let escaped = value
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    neutralize_schemes(&escaped, stats)
}

/// Fail-closed fallback: remove every tag, keep escaped text
fn strip_all_markup(input: &str) -> String {
    let without_blocks = SCRIPT_BLOCK_REGEX.replace_all(input, "");
    let without_blocks = STYLE_BLOCK_REGEX.replace_all(&without_blocks, "");
    let without_comments = COMMENT_REGEX.replace_all(&without_blocks, "");

    let mut text = without_comments.into_owned();
    loop {
        let next = TAG_REGEX.replace_all(&text, "").into_owned();
        if next == text {
            break;
        }
        text = next;
    }
    let mut stats = SanitizeStats::default();
    escape_text(&text, &mut stats)
}

/// Encode HTML special characters to prevent XSS
pub fn encode_html_entities(input: &str) -> SanitizeResult<String> {
    let mut result = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            other => result.push(other),
        }
    }

    if result == input {
        SanitizeResult::unmodified(result)
    } else {
        SanitizeResult::modified(result, Some("Encoded HTML entities".to_string()))
    }
}

/// Remove all HTML tags from the input string
pub fn strip_html_tags(input: &str) -> SanitizeResult<String> {
    let result = TAG_REGEX.replace_all(input, "");

    if result == input {
        SanitizeResult::unmodified(input.to_string())
    } else {
        SanitizeResult::modified(result.into_owned(), Some("Removed HTML tags".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn clean(input: &str) -> String {
        sanitize_html(input, &HtmlSanitizeOptions::default()).sanitized
    }

    #[test]
    fn test_safe_markup_is_untouched() {
        let input = r#"<p>Hello <b>world</b>, see <a href="https://example.com/">docs</a></p>"#;
        let result = sanitize_html(input, &HtmlSanitizeOptions::default());
        assert!(!result.was_modified);
        assert_eq!(result.sanitized, input);
    }

    #[test]
    fn test_script_and_style_dropped_with_content() {
        assert_eq!(
            clean("<p>a</p><script>alert('x')</script><style>p{}</style><p>b</p>"),
            "<p>a</p><p>b</p>"
        );
        assert_eq!(clean("<SCRIPT type=\"text/javascript\">evil()</ScRiPt>ok"), "ok");
    }

    #[test]
    fn test_disallowed_elements_promote_children() {
        assert_eq!(
            clean("<section><p>kept</p><custom>text</custom></section>"),
            "<p>kept</p>text"
        );
    }

    #[test]
    fn test_attribute_filtering() {
        assert_eq!(
            clean(r#"<p onclick="steal()" class="note" style="x" data-id="7">t</p>"#),
            r#"<p class="note">t</p>"#
        );

        let options = HtmlSanitizeOptions {
            allow_data_attributes: true,
            ..HtmlSanitizeOptions::default()
        };
        let result = sanitize_html(r#"<p data-id="7" data-="x">t</p>"#, &options);
        assert_eq!(result.sanitized, r#"<p data-id="7">t</p>"#);
    }

    #[test_case(r#"<a href="javascript:alert(1)">x</a>"# ; "plain")]
    #[test_case(r#"<a href=" JaVaScRiPt:alert(1)">x</a>"# ; "mixed case")]
    #[test_case(r#"<a href="java&#115;cript&#58;alert(1)">x</a>"# ; "entity encoded")]
    #[test_case(r#"<a href="jav&#x09;ascript:alert(1)">x</a>"# ; "embedded tab")]
    #[test_case(r#"<img src="data:image/svg+xml;base64,PHN2Zz4=">x"# ; "data uri")]
    #[test_case(r#"<a href="java&Tab;script:alert(1)">x</a>"# ; "named tab mixed case")]
    #[test_case(r#"<a href="java&NewLine;script:alert(1)">x</a>"# ; "named newline mixed case")]
    #[test_case(r#"<a href="javascript&Colon;alert(1)">x</a>"# ; "named colon mixed case")]
    #[test_case(r#"<a href="JAVA&TAB;SCRIPT&COLON;alert(1)">x</a>"# ; "named entities upper case")]
    #[test_case(r#"<a href="java&zwj;script:alert(1)">x</a>"# ; "unknown entity in scheme")]
    fn test_dangerous_urls_removed(input: &str) {
        let output = clean(input);
        assert!(!output.contains("href"));
        assert!(!output.contains("src="));
        assert!(!output.to_lowercase().contains("javascript:"));
    }

    #[test]
    fn test_ampersand_after_scheme_is_kept() {
        let input = r#"<a href="https://example.com/search?q=a&amp;page=2">next</a>"#;
        assert_eq!(clean(input), input);
        let relative = r#"<a href="/search?q=a&amp;t=10:30">later</a>"#;
        assert_eq!(clean(relative), relative);
    }

    #[test_case("<scr<script>ipt>alert(1)</script>" ; "split tag")]
    #[test_case("<p>javascript:alert(1)</p>" ; "scheme in text")]
    #[test_case("<iframe src=x></iframe><object>o</object>" ; "embedding tags")]
    #[test_case("<!-- <script>x</script> -->visible" ; "comment")]
    #[test_case("<div><script>unterminated" ; "unterminated script")]
    #[test_case("<b onmouseover='x' title=\"javascript:y\">t</b>" ; "scheme in attribute")]
    #[test_case("a < b > c <3" ; "bare angle brackets")]
    fn test_output_has_no_active_content(input: &str) {
        let output = clean(input);
        let lower = output.to_lowercase();
        assert!(!lower.contains("<script"), "{}", output);
        assert!(!lower.contains("javascript:"), "{}", output);
        assert!(!lower.contains("<iframe"), "{}", output);
        assert!(!lower.contains("<object"), "{}", output);
    }

    #[test]
    fn test_parse_failure_policies() {
        let malformed = "<p>hello <b class='unterminated";

        let strict = sanitize_html(malformed, &HtmlSanitizeOptions::default());
        assert!(strict.was_modified);
        assert!(!strict.sanitized.contains('<'));
        assert!(strict.sanitized.contains("hello"));

        let lenient = HtmlSanitizeOptions {
            on_parse_failure: ParseFailurePolicy::ReturnOriginal,
            ..HtmlSanitizeOptions::default()
        };
        let result = sanitize_html(malformed, &lenient);
        assert_eq!(result.sanitized, malformed);
        assert!(!result.was_modified);
    }

    #[test]
    fn test_excessive_nesting_is_malformed() {
        let options = HtmlSanitizeOptions {
            max_depth: 3,
            ..HtmlSanitizeOptions::default()
        };
        let result = sanitize_html("<div><div><div><div>deep</div></div></div></div>", &options);
        assert_eq!(result.sanitized, "deep");
    }

    #[test]
    fn test_unclosed_elements_are_closed() {
        assert_eq!(clean("<p><b>bold"), "<p><b>bold</b></p>");
        assert_eq!(clean("text</p>more"), "textmore");
    }

    #[test]
    fn test_encode_html_entities() {
        let result = encode_html_entities("<a href=\"x\">Tom & 'Jerry'</a>");
        assert!(result.was_modified);
        assert_eq!(
            result.sanitized,
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
        assert!(!encode_html_entities("plain").was_modified);
    }

    #[test]
    fn test_strip_html_tags() {
        let result = strip_html_tags("<p>Hello <b>World</b></p>");
        assert_eq!(result.sanitized, "Hello World");
        assert!(result.was_modified);
    }
}
