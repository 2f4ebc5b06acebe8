//! Document Index
//!
//! One parsed view of a markdown artifact: headings, list items (with their
//! checkbox state), links and template placeholders, each with a 1-indexed
//! line number. The validator, artifact synthesis and checklist marking all
//! read documents through this type instead of re-parsing text.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::sync::OnceLock;

/// Marker left in synthesized artifacts for the operator to fill in
pub const PLACEHOLDER_PREFIX: &str = "[[FILL";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[FILL(?::[^\]]*)?\]\]").expect("valid placeholder regex"))
}

/// Section of a proposal listing its concrete changes
pub const CHANGES_SECTION: &str = "What Changes";

/// Build a placeholder marker with a hint for the operator
pub fn placeholder(hint: &str) -> String {
    format!("[[FILL: {}]]", hint)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub title: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// Item text without the bullet or checkbox marker, whitespace collapsed
    pub text: String,
    /// `Some(done)` for task-list items, `None` for plain bullets
    pub checked: Option<bool>,
    pub line: usize,
    /// Nesting depth, 0 for top-level items
    pub depth: usize,
}

impl ListItem {
    pub fn is_checkbox(&self) -> bool {
        self.checked.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub text: String,
    pub target: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub text: String,
    pub line: usize,
}

/// Structural index of one markdown document
#[derive(Debug, Clone)]
pub struct DocumentIndex {
    pub headings: Vec<Heading>,
    pub items: Vec<ListItem>,
    pub links: Vec<Link>,
    pub placeholders: Vec<Placeholder>,
    lines: Vec<String>,
    lowercase: String,
}

struct ItemFrame {
    slot: usize,
    text: String,
}

struct LinkFrame {
    target: String,
    text: String,
    line: usize,
}

fn heading_level_num(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, drop punctuation, so "What changes?" matches "what changes"
fn normalize_heading(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl DocumentIndex {
    pub fn parse(content: &str) -> Self {
        let line_starts: Vec<usize> = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        let line_of = |offset: usize| match line_starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        };

        let mut options = Options::empty();
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);

        let mut headings = Vec::new();
        let mut items: Vec<ListItem> = Vec::new();
        let mut links = Vec::new();

        let mut heading: Option<Heading> = None;
        let mut item_stack: Vec<ItemFrame> = Vec::new();
        let mut link_stack: Vec<LinkFrame> = Vec::new();

        for (event, range) in Parser::new_ext(content, options).into_offset_iter() {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    heading = Some(Heading {
                        level: heading_level_num(level),
                        title: String::new(),
                        line: line_of(range.start),
                    });
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(mut h) = heading.take() {
                        h.title = collapse_whitespace(&h.title);
                        headings.push(h);
                    }
                }
                Event::Start(Tag::Item) => {
                    // Reserve the slot now so parents precede their children
                    items.push(ListItem {
                        text: String::new(),
                        checked: None,
                        line: line_of(range.start),
                        depth: item_stack.len(),
                    });
                    item_stack.push(ItemFrame {
                        slot: items.len() - 1,
                        text: String::new(),
                    });
                }
                Event::End(TagEnd::Item) => {
                    if let Some(frame) = item_stack.pop() {
                        items[frame.slot].text = collapse_whitespace(&frame.text);
                    }
                }
                Event::TaskListMarker(done) => {
                    if let Some(frame) = item_stack.last() {
                        items[frame.slot].checked = Some(done);
                    }
                }
                Event::Start(Tag::Link { dest_url, .. }) | Event::Start(Tag::Image { dest_url, .. }) => {
                    link_stack.push(LinkFrame {
                        target: dest_url.to_string(),
                        text: String::new(),
                        line: line_of(range.start),
                    });
                }
                Event::End(TagEnd::Link) | Event::End(TagEnd::Image) => {
                    if let Some(frame) = link_stack.pop() {
                        links.push(Link {
                            text: collapse_whitespace(&frame.text),
                            target: frame.target,
                            line: frame.line,
                        });
                    }
                }
                Event::Text(text) | Event::Code(text) => {
                    if let Some(h) = heading.as_mut() {
                        h.title.push_str(&text);
                    }
                    if let Some(frame) = item_stack.last_mut() {
                        frame.text.push_str(&text);
                    }
                    if let Some(frame) = link_stack.last_mut() {
                        frame.text.push_str(&text);
                    }
                }
                Event::SoftBreak | Event::HardBreak => {
                    if let Some(frame) = item_stack.last_mut() {
                        frame.text.push(' ');
                    }
                }
                _ => {}
            }
        }

        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let placeholders = lines
            .iter()
            .enumerate()
            .flat_map(|(i, line)| {
                placeholder_re().find_iter(line).map(move |m| Placeholder {
                    text: m.as_str().to_string(),
                    line: i + 1,
                })
            })
            .collect();

        Self {
            headings,
            items,
            links,
            placeholders,
            lines,
            lowercase: content.to_lowercase(),
        }
    }

    /// Text of the first level-1 heading
    pub fn title(&self) -> Option<&str> {
        self.headings
            .iter()
            .find(|h| h.level == 1)
            .map(|h| h.title.as_str())
    }

    /// Index of the first section heading titled `name`, or starting with it
    /// as whole words ("What Changes (v2)"). The level-1 document title never
    /// counts as a section.
    fn find_section(&self, name: &str) -> Option<usize> {
        let wanted = normalize_heading(name);
        self.headings.iter().position(|h| {
            if h.level == 1 {
                return false;
            }
            let title = normalize_heading(&h.title);
            title == wanted
                || title
                    .strip_prefix(&wanted)
                    .map_or(false, |rest| rest.starts_with(' '))
        })
    }

    /// Line range (exclusive on both ends) covered by a section, including
    /// its subsections
    fn section_bounds(&self, idx: usize) -> (usize, usize) {
        let heading = &self.headings[idx];
        let end = self.headings[idx + 1..]
            .iter()
            .find(|h| h.level <= heading.level)
            .map(|h| h.line)
            .unwrap_or(self.lines.len() + 1);
        (heading.line, end)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.find_section(name).is_some()
    }

    /// All list items inside a section
    pub fn items_under(&self, name: &str) -> Vec<&ListItem> {
        let Some(idx) = self.find_section(name) else {
            return Vec::new();
        };
        let (start, end) = self.section_bounds(idx);
        self.items
            .iter()
            .filter(|item| item.line > start && item.line < end)
            .collect()
    }

    /// Plain (non-checkbox) bullets inside a section
    pub fn bullets_under(&self, name: &str) -> Vec<&ListItem> {
        self.items_under(name)
            .into_iter()
            .filter(|i| !i.is_checkbox())
            .collect()
    }

    /// Items of the "What Changes" section, nested ones included
    pub fn change_items(&self) -> Vec<&ListItem> {
        self.items_under(CHANGES_SECTION)
    }

    /// Checkbox items inside a section
    pub fn checkboxes_under(&self, name: &str) -> Vec<&ListItem> {
        self.items_under(name)
            .into_iter()
            .filter(|i| i.is_checkbox())
            .collect()
    }

    /// Every checkbox item in the document
    pub fn checkboxes(&self) -> Vec<&ListItem> {
        self.items.iter().filter(|i| i.is_checkbox()).collect()
    }

    /// Raw lines of a section body (without its heading)
    pub fn section_lines(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.find_section(name)?;
        let (start, end) = self.section_bounds(idx);
        Some(
            self.lines
                .iter()
                .enumerate()
                .filter(|(i, _)| i + 1 > start && i + 1 < end)
                .map(|(_, l)| l.as_str())
                .collect(),
        )
    }

    /// Whether a section exists and has a non-blank, non-comment line
    pub fn section_has_content(&self, name: &str) -> bool {
        self.section_lines(name).map_or(false, |lines| {
            lines.iter().any(|l| {
                let t = l.trim();
                !t.is_empty() && !t.starts_with('#') && !(t.starts_with("<!--") && t.ends_with("-->"))
            })
        })
    }

    /// First paragraph of a section, joined into one line and truncated to
    /// `max_chars` characters with an ellipsis
    pub fn first_paragraph(&self, name: &str, max_chars: usize) -> Option<String> {
        let lines = self.section_lines(name)?;
        let paragraph = lines
            .iter()
            .map(|l| l.trim())
            .skip_while(|l| l.is_empty())
            .take_while(|l| !l.is_empty() && !l.starts_with('#'))
            .collect::<Vec<_>>()
            .join(" ");
        if paragraph.is_empty() {
            return None;
        }
        if paragraph.chars().count() <= max_chars {
            return Some(paragraph);
        }
        let cut = paragraph
            .char_indices()
            .nth(max_chars.saturating_sub(3))
            .map(|(i, _)| i)
            .unwrap_or(paragraph.len());
        Some(format!("{}...", &paragraph[..cut]))
    }

    /// Value of an inline `Name: value` field (optionally bulleted or bold)
    pub fn field(&self, name: &str) -> Option<String> {
        let pattern = format!(
            r"(?i)^\s*(?:[-*+]\s+)?\**{}\**\s*:\s*\**\s*(.+?)\s*$",
            regex::escape(name)
        );
        let re = Regex::new(&pattern).ok()?;
        self.lines.iter().find_map(|line| {
            re.captures(line)
                .map(|c| c[1].to_string())
                .filter(|v| !v.is_empty())
        })
    }

    /// Lowercased document text for substring matching
    pub fn lowercase(&self) -> &str {
        &self.lowercase
    }

    /// First line whose lowercase text contains `needle` (already lowercase)
    pub fn line_containing(&self, needle: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| l.to_lowercase().contains(needle))
            .map(|i| i + 1)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}
