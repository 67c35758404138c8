//! Projections of the structured document tree.
//!
//! Page content is an opaque editor document (`{"type":"doc","content":[...]}`
//! with nested nodes carrying optional `text`, `content`, `marks` and `attrs`
//! fields). The storage layer never interprets it beyond the two cached
//! projections computed here on every save: a plain-text flattening used for
//! search, and an HTML snapshot used for export and preview.

use serde_json::{json, Value};

/// The default content assigned to pages saved without any.
pub fn empty_document() -> Value {
    json!({ "type": "doc", "content": [] })
}

/// Flattens every text node of the document, space-joined and trimmed.
pub fn extract_text(content: &Value) -> String {
    let mut text = String::new();
    collect_text(content, &mut text);
    text.trim().to_string()
}

fn collect_text(node: &Value, out: &mut String) {
    if let Some(text) = node.get("text").and_then(Value::as_str) {
        out.push_str(text);
        out.push(' ');
    }
    if let Some(children) = node.get("content").and_then(Value::as_array) {
        for child in children {
            collect_text(child, out);
        }
    }
}

/// Renders the document tree into a self-contained HTML snapshot.
///
/// This is a cache field for export and preview, not a faithful renderer:
/// unknown node types fall through to their children so newer editor
/// extensions degrade to their text instead of disappearing.
pub fn render_html(content: &Value) -> String {
    let mut out = String::new();
    render_node(content, &mut out);
    out
}

fn render_node(node: &Value, out: &mut String) {
    if let Some(text) = node.get("text").and_then(Value::as_str) {
        out.push_str(&render_marks(text, node.get("marks")));
        return;
    }

    let node_type = node.get("type").and_then(Value::as_str).unwrap_or("");
    if node_type == "hardBreak" {
        out.push_str("<br>");
        return;
    }
    if node_type == "horizontalRule" {
        out.push_str("<hr>");
        return;
    }

    let mut inner = String::new();
    if let Some(children) = node.get("content").and_then(Value::as_array) {
        for child in children {
            render_node(child, &mut inner);
        }
    }

    match node_type {
        "paragraph" => {
            out.push_str("<p>");
            out.push_str(&inner);
            out.push_str("</p>");
        }
        "heading" => {
            let level = node
                .get("attrs")
                .and_then(|a| a.get("level"))
                .and_then(Value::as_u64)
                .unwrap_or(1)
                .clamp(1, 6);
            out.push_str(&format!("<h{level}>{inner}</h{level}>"));
        }
        "bulletList" => {
            out.push_str("<ul>");
            out.push_str(&inner);
            out.push_str("</ul>");
        }
        "orderedList" => {
            out.push_str("<ol>");
            out.push_str(&inner);
            out.push_str("</ol>");
        }
        "listItem" => {
            out.push_str("<li>");
            out.push_str(&inner);
            out.push_str("</li>");
        }
        "codeBlock" => {
            out.push_str("<pre><code>");
            out.push_str(&inner);
            out.push_str("</code></pre>");
        }
        "blockquote" => {
            out.push_str("<blockquote>");
            out.push_str(&inner);
            out.push_str("</blockquote>");
        }
        // doc and unknown containers contribute their children as-is
        _ => out.push_str(&inner),
    }
}

fn render_marks(text: &str, marks: Option<&Value>) -> String {
    let mut html = escape_html(text);

    let Some(marks) = marks.and_then(Value::as_array) else {
        return html;
    };

    for mark in marks {
        let mark_type = mark.get("type").and_then(Value::as_str).unwrap_or("");
        html = match mark_type {
            "bold" => format!("<strong>{html}</strong>"),
            "italic" => format!("<em>{html}</em>"),
            "code" => format!("<code>{html}</code>"),
            "link" => {
                let href = mark
                    .get("attrs")
                    .and_then(|a| a.get("href"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                format!("<a href=\"{}\">{html}</a>", escape_html(href))
            }
            _ => html,
        };
    }

    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> Value {
        json!({
            "type": "doc",
            "content": [
                {
                    "type": "heading",
                    "attrs": { "level": 2 },
                    "content": [{ "type": "text", "text": "Roadmap" }]
                },
                {
                    "type": "paragraph",
                    "content": [
                        { "type": "text", "text": "Ship the " },
                        {
                            "type": "text",
                            "marks": [{ "type": "bold" }],
                            "text": "storage core"
                        }
                    ]
                }
            ]
        })
    }

    #[test]
    fn extracts_text_space_joined_and_trimmed() {
        assert_eq!(extract_text(&sample_doc()), "Roadmap Ship the  storage core");
    }

    #[test]
    fn empty_document_has_no_text() {
        assert_eq!(extract_text(&empty_document()), "");
        assert_eq!(render_html(&empty_document()), "");
    }

    #[test]
    fn renders_structure_and_marks() {
        let html = render_html(&sample_doc());
        assert_eq!(
            html,
            "<h2>Roadmap</h2><p>Ship the <strong>storage core</strong></p>"
        );
    }

    #[test]
    fn escapes_text_and_link_targets() {
        let doc = json!({
            "type": "doc",
            "content": [{
                "type": "paragraph",
                "content": [{
                    "type": "text",
                    "marks": [{ "type": "link", "attrs": { "href": "https://e.co/?a=1&b=2" } }],
                    "text": "a < b"
                }]
            }]
        });
        assert_eq!(
            render_html(&doc),
            "<p><a href=\"https://e.co/?a=1&amp;b=2\">a &lt; b</a></p>"
        );
    }

    #[test]
    fn unknown_nodes_fall_through_to_children() {
        let doc = json!({
            "type": "doc",
            "content": [{
                "type": "calloutWidget",
                "content": [{ "type": "text", "text": "still here" }]
            }]
        });
        assert_eq!(render_html(&doc), "still here");
        assert_eq!(extract_text(&doc), "still here");
    }
}
