//! HTML to markdown-ish plain text.
//!
//! Picks the main content root of a documentation page, drops chrome
//! (scripts, styles, navigation), and renders block elements as text blocks
//! separated by blank lines: headings as `#` lines, list items as `- ` lines,
//! and `pre` blocks fenced with backticks.

use std::borrow::Cow;

use scraper::{ElementRef, Html, Node, Selector};

/// Text extracted from one HTML page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedPage {
    /// Contents of `<title>`, whitespace-collapsed.
    pub title: Option<String>,
    /// Rendered body text.
    pub text: String,
}

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "nav", "head", "iframe",
];

const CONTAINER_TAGS: &[&str] = &[
    "div", "section", "article", "main", "body", "header", "footer", "aside", "ul", "ol", "dl",
    "table", "thead", "tbody", "tfoot", "figure", "details", "form",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Heading(u8),
    Paragraph,
    ListItem,
    Quote,
    Preformatted,
    TableRow,
}

fn block_kind(tag: &str) -> Option<BlockKind> {
    match tag {
        "h1" => Some(BlockKind::Heading(1)),
        "h2" => Some(BlockKind::Heading(2)),
        "h3" => Some(BlockKind::Heading(3)),
        "h4" => Some(BlockKind::Heading(4)),
        "h5" => Some(BlockKind::Heading(5)),
        "h6" => Some(BlockKind::Heading(6)),
        "p" | "dt" | "dd" | "figcaption" | "caption" | "summary" => Some(BlockKind::Paragraph),
        "li" => Some(BlockKind::ListItem),
        "blockquote" => Some(BlockKind::Quote),
        "pre" => Some(BlockKind::Preformatted),
        "tr" => Some(BlockKind::TableRow),
        _ => None,
    }
}

struct RootSelectors {
    role_main: Selector,
    main: Selector,
    article: Selector,
    body: Selector,
    title: Selector,
}

impl RootSelectors {
    fn new() -> Self {
        Self {
            role_main: Selector::parse(r#"div[role="main"]"#).expect("role=main selector"),
            main: Selector::parse("main").expect("main selector"),
            article: Selector::parse("article").expect("article selector"),
            body: Selector::parse("body").expect("body selector"),
            title: Selector::parse("title").expect("title selector"),
        }
    }

    fn pick_root<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        document
            .select(&self.role_main)
            .next()
            .or_else(|| document.select(&self.main).next())
            .or_else(|| document.select(&self.article).next())
            .or_else(|| document.select(&self.body).next())
            .unwrap_or_else(|| document.root_element())
    }
}

/// Convert an HTML page to plain text plus its title.
///
/// Invalid UTF-8 is decoded lossily.
///
/// # Examples
///
/// ```
/// use mentor_ingest::clean::clean_html;
///
/// let html = b"<html><head><title>Guide</title></head><body>\
///     <nav>skip me</nav><div role=\"main\"><h1>Linear models</h1>\
///     <p>Use <code>LinearRegression</code>.</p></div></body></html>";
/// let page = clean_html(html);
/// assert_eq!(page.title.as_deref(), Some("Guide"));
/// assert_eq!(page.text, "# Linear models\n\nUse LinearRegression.");
/// ```
pub fn clean_html(bytes: &[u8]) -> CleanedPage {
    let html = decode_body(bytes);
    let document = Html::parse_document(&html);
    let selectors = RootSelectors::new();

    let title = document
        .select(&selectors.title)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let mut renderer = BlockRenderer::default();
    renderer.walk(selectors.pick_root(&document));
    CleanedPage {
        title,
        text: renderer.finish(),
    }
}

fn decode_body(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(String::from_utf8_lossy(bytes).into_owned()),
    }
}

#[derive(Default)]
struct BlockRenderer {
    blocks: Vec<String>,
    inline: String,
}

impl BlockRenderer {
    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.inline.push_str(text),
                Node::Element(_) => {
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let tag = child.value().name();
                    if SKIPPED_TAGS.contains(&tag) {
                        continue;
                    }
                    if tag == "br" {
                        self.inline.push(' ');
                    } else if let Some(kind) = block_kind(tag) {
                        self.flush_inline();
                        self.push_block(kind, child);
                    } else if CONTAINER_TAGS.contains(&tag) {
                        self.flush_inline();
                        self.walk(child);
                        self.flush_inline();
                    } else {
                        self.walk(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn flush_inline(&mut self) {
        let text = collapse_whitespace(&self.inline);
        self.inline.clear();
        if !text.is_empty() {
            self.blocks.push(text);
        }
    }

    fn push_block(&mut self, kind: BlockKind, element: ElementRef<'_>) {
        let rendered = match kind {
            BlockKind::Preformatted => {
                let raw: String = element.text().collect();
                let body = raw.trim_matches('\n').trim_end();
                if body.trim().is_empty() {
                    return;
                }
                format!("```\n{body}\n```")
            }
            BlockKind::TableRow => {
                let cells: Vec<String> = element
                    .children()
                    .filter_map(ElementRef::wrap)
                    .map(|cell| collapse_whitespace(&cell.text().collect::<String>()))
                    .filter(|cell| !cell.is_empty())
                    .collect();
                if cells.is_empty() {
                    return;
                }
                cells.join(" | ")
            }
            _ => {
                let text = collapse_whitespace(&element.text().collect::<String>());
                if text.is_empty() {
                    return;
                }
                match kind {
                    BlockKind::Heading(level) => {
                        format!("{} {text}", "#".repeat(usize::from(level)))
                    }
                    BlockKind::ListItem => format!("- {text}"),
                    BlockKind::Quote => format!("> {text}"),
                    _ => text,
                }
            }
        };
        self.blocks.push(rendered);
    }

    fn finish(mut self) -> String {
        self.flush_inline();
        self.blocks.join("\n\n")
    }
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}
