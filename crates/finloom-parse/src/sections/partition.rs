//! HTML partitioning into a typed element sequence.
//!
//! Filing HTML varies wildly between reporters (nested div soups, inline
//! XBRL wrappers, table-heavy layouts). Partitioning walks the DOM once and
//! flattens it into a linear sequence of typed elements; all downstream
//! section logic works on that sequence, never on the DOM.

use scraper::{ElementRef, Html};

/// Category of one partitioned element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementCategory {
    /// Heading-like element (h1-h6, fully-bold block)
    Title,
    /// Long body text
    NarrativeText,
    /// Short text block that could not be classified
    UncategorizedText,
    /// Table
    Table,
    /// List item
    ListItem,
}

/// One element in the partitioned sequence.
#[derive(Debug, Clone)]
pub struct PartitionedElement {
    /// Category
    pub category: ElementCategory,
    /// Normalized text content
    pub text: String,
    /// Original HTML, kept for tables only
    pub html: Option<String>,
}

/// Text blocks at or above this length count as narrative rather than
/// uncategorized.
const NARRATIVE_MIN_CHARS: usize = 200;

const CONTAINER_TAGS: &[&str] = &[
    "html", "body", "div", "section", "article", "center", "font", "span", "main", "ix:header",
];
const BLOCK_TAGS: &[&str] = &["p", "table", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "div"];

/// Partition an HTML document into a typed element sequence.
pub fn partition_html(html: &str) -> Vec<PartitionedElement> {
    let document = Html::parse_document(html);
    let mut elements = Vec::new();

    let root = document.root_element();
    walk(root, &mut elements);
    elements
}

fn walk(el: ElementRef<'_>, out: &mut Vec<PartitionedElement>) {
    let tag = el.value().name();

    match tag {
        "table" => {
            let text = table_text(el);
            if !text.is_empty() {
                out.push(PartitionedElement {
                    category: ElementCategory::Table,
                    text,
                    html: Some(el.html()),
                });
            }
        }
        "li" => {
            let text = normalized_text(el);
            if !text.is_empty() {
                out.push(PartitionedElement {
                    category: ElementCategory::ListItem,
                    text,
                    html: None,
                });
            }
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let text = normalized_text(el);
            if !text.is_empty() {
                out.push(PartitionedElement {
                    category: ElementCategory::Title,
                    text,
                    html: None,
                });
            }
        }
        "ul" | "ol" => {
            for child in el.child_elements() {
                walk(child, out);
            }
        }
        "p" => {
            push_text_block(el, out);
        }
        "script" | "style" | "head" => {}
        _ if CONTAINER_TAGS.contains(&tag) || tag.contains(':') => {
            if has_block_child(el) {
                for child in el.child_elements() {
                    walk(child, out);
                }
            } else {
                push_text_block(el, out);
            }
        }
        _ => {
            // Unknown tags: recurse if structured, otherwise flatten to text
            if has_block_child(el) {
                for child in el.child_elements() {
                    walk(child, out);
                }
            } else {
                push_text_block(el, out);
            }
        }
    }
}

fn push_text_block(el: ElementRef<'_>, out: &mut Vec<PartitionedElement>) {
    let text = normalized_text(el);
    if text.is_empty() {
        return;
    }
    let category = if is_fully_bold(el, &text) {
        ElementCategory::Title
    } else if text.len() >= NARRATIVE_MIN_CHARS {
        ElementCategory::NarrativeText
    } else {
        ElementCategory::UncategorizedText
    };
    out.push(PartitionedElement { category, text, html: None });
}

fn has_block_child(el: ElementRef<'_>) -> bool {
    el.descendent_elements()
        .skip(1)
        .any(|d| BLOCK_TAGS.contains(&d.value().name()))
}

/// Whole-block bold content reads as a heading in filing HTML.
fn is_fully_bold(el: ElementRef<'_>, text: &str) -> bool {
    el.descendent_elements()
        .filter(|d| matches!(d.value().name(), "b" | "strong"))
        .any(|b| {
            let bold_text = normalized_text(b);
            !bold_text.is_empty() && bold_text == text
        })
}

fn normalized_text(el: ElementRef<'_>) -> String {
    let raw: String = el.text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&raw)
}

fn table_text(el: ElementRef<'_>) -> String {
    // Row per line, cells joined with two spaces
    let mut lines = Vec::new();
    for row in el.descendent_elements().filter(|d| d.value().name() == "tr") {
        let cells: Vec<String> = row
            .descendent_elements()
            .filter(|d| matches!(d.value().name(), "td" | "th"))
            .map(normalized_text)
            .filter(|t| !t.is_empty())
            .collect();
        if !cells.is_empty() {
            lines.push(cells.join("  "));
        }
    }
    lines.join("\n")
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for c in s.chars() {
        // Non-breaking spaces are everywhere in filing HTML
        let c = if c == '\u{a0}' { ' ' } else { c };
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out.trim().to_string()
}

/// Render a partitioned element sequence to markdown.
pub fn elements_to_markdown(elements: &[PartitionedElement]) -> String {
    let mut out = String::new();
    for element in elements {
        match element.category {
            ElementCategory::Title => {
                out.push_str("## ");
                out.push_str(&element.text);
            }
            ElementCategory::ListItem => {
                out.push_str("- ");
                out.push_str(&element.text);
            }
            ElementCategory::Table | ElementCategory::NarrativeText | ElementCategory::UncategorizedText => {
                out.push_str(&element.text);
            }
        }
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"<html><body>
      <div><b>Item 1A. Risk Factors</b></div>
      <p>Our business is subject to numerous risks described below that could
         materially affect our operations, financial condition and results in
         ways that are difficult to predict with any certainty at this time.</p>
      <table><tr><th>Year</th><th>Revenue</th></tr><tr><td>2023</td><td>383,285</td></tr></table>
      <ul><li>Supply chain concentration</li><li>Regulatory change</li></ul>
      <h2>Competition</h2>
    </body></html>"#;

    #[test]
    fn test_partition_categories() {
        let elements = partition_html(SAMPLE_HTML);
        let categories: Vec<ElementCategory> = elements.iter().map(|e| e.category).collect();
        assert_eq!(
            categories,
            vec![
                ElementCategory::Title,
                ElementCategory::NarrativeText,
                ElementCategory::Table,
                ElementCategory::ListItem,
                ElementCategory::ListItem,
                ElementCategory::Title,
            ]
        );
    }

    #[test]
    fn test_bold_block_is_title() {
        let elements = partition_html(SAMPLE_HTML);
        assert_eq!(elements[0].text, "Item 1A. Risk Factors");
        assert_eq!(elements[0].category, ElementCategory::Title);
    }

    #[test]
    fn test_table_keeps_html() {
        let elements = partition_html(SAMPLE_HTML);
        let table = elements.iter().find(|e| e.category == ElementCategory::Table).unwrap();
        assert!(table.html.as_ref().unwrap().starts_with("<table"));
        assert!(table.text.contains("2023"));
        assert!(table.text.contains("383,285"));
    }

    #[test]
    fn test_nbsp_collapsed() {
        let elements = partition_html("<html><body><p>Item&nbsp;7.&nbsp;&nbsp;MD&amp;A</p></body></html>");
        assert_eq!(elements[0].text, "Item 7. MD&A");
    }

    #[test]
    fn test_markdown_rendering() {
        let elements = partition_html(SAMPLE_HTML);
        let markdown = elements_to_markdown(&elements);
        assert!(markdown.contains("## Item 1A. Risk Factors"));
        assert!(markdown.contains("- Supply chain concentration"));
    }
}
