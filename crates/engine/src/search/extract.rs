//! Plain-text and highlight extraction from content trees.
//!
//! The projection walks nodes in document order, strips markup from textual
//! slots, and picks out a page's representative pieces: its first heading,
//! a summary, and a media highlight.

use std::collections::HashMap;

use crate::content::{ContentNode, NodeKind, NodeState, Uid};
use crate::search::document::MediaRef;

/// Representative pieces pulled from a page's committed tree.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct PageExtract {
    pub first_heading: Option<String>,
    pub summary: Option<String>,
    pub plain_text: String,
    pub media: Option<MediaRef>,
}

/// Projects the searchable pieces from nodes in document order.
///
/// The summary prefers the first abstract anywhere on the page; only when
/// no abstract carries text does the first paragraph stand in.
pub(crate) fn extract_page(nodes: &[ContentNode]) -> PageExtract {
    let by_uid: HashMap<&Uid, &ContentNode> =
        nodes.iter().map(|node| (&node.uid, node)).collect();

    let mut first_heading = None;
    let mut summary = None;
    let mut fallback_summary = None;
    let mut chunks: Vec<String> = Vec::new();
    let mut media = None;

    for node in nodes {
        if node.kind.is_textual() {
            if let Some(raw) = node.text("value") {
                let text = strip_markup(raw);
                if !text.is_empty() {
                    if first_heading.is_none() && node.kind.is_heading_like() {
                        first_heading = Some(text.clone());
                    }
                    if summary.is_none() && node.kind == NodeKind::Abstract {
                        summary = Some(text.clone());
                    }
                    if fallback_summary.is_none() && node.kind == NodeKind::Paragraph {
                        fallback_summary = Some(text.clone());
                    }
                    chunks.push(text);
                }
            }
        }
        if media.is_none() && node.kind.is_media() {
            media = media_ref(node, &by_uid);
        }
    }

    PageExtract {
        first_heading,
        summary: summary.or(fallback_summary),
        plain_text: chunks.join(" "),
        media,
    }
}

/// Media highlight for one node. Images use their own source; videos fall
/// back to their thumbnail, which must resolve to a published image with a
/// non-empty source. Unsuitable candidates yield nothing so a later media
/// node can still win.
fn media_ref(node: &ContentNode, by_uid: &HashMap<&Uid, &ContentNode>) -> Option<MediaRef> {
    match node.kind {
        NodeKind::Image => {
            let src = node.text("src")?.trim();
            (!src.is_empty()).then(|| MediaRef {
                kind: "image".to_owned(),
                source: src.to_owned(),
            })
        }
        NodeKind::Video => {
            let thumbnail = node.element("thumbnail")?.as_node_ref()?;
            let image = by_uid.get(thumbnail)?;
            if image.kind != NodeKind::Image || image.state != NodeState::Normal {
                return None;
            }
            let src = image.text("src")?.trim();
            (!src.is_empty()).then(|| MediaRef {
                kind: "video".to_owned(),
                source: src.to_owned(),
            })
        }
        _ => None,
    }
}

/// Strips markup tags, decodes common entities, and collapses whitespace.
pub(crate) fn strip_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '<' => {
                // Tags become separators so adjacent words do not fuse.
                for c in chars.by_ref() {
                    if c == '>' {
                        break;
                    }
                }
                out.push(' ');
            }
            '&' => {
                let mut entity = String::new();
                let mut terminated = false;
                while let Some(&next) = chars.peek() {
                    if next == ';' {
                        chars.next();
                        terminated = true;
                        break;
                    }
                    if entity.len() >= 8 || next == '&' || next == '<' || next.is_whitespace() {
                        break;
                    }
                    entity.push(next);
                    chars.next();
                }
                match decode_entity(&entity) {
                    Some(decoded) if terminated => out.push(decoded),
                    _ => {
                        out.push('&');
                        out.push_str(&entity);
                        if terminated {
                            out.push(';');
                        }
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .map(|hex| u32::from_str_radix(hex, 16))
                .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))?;
            code.ok().and_then(char::from_u32)
        }
    }
}
