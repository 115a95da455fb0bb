//! Mind-map rendering of markdown summaries.
//!
//! [`transform`] turns a markdown document into a tree of headings and list
//! items. [`MindMap::render`] lays that tree out left to right and fits it to
//! a viewport. The result can be drawn in the terminal or exported as SVG.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use thiserror::Error;

const CHAR_WIDTH: f64 = 8.0;
const WIDE_CHAR_WIDTH: f64 = 14.0;
const LINE_HEIGHT: f64 = 20.0;
const MAX_SCALE: f64 = 2.0;
const MARGIN: f64 = 20.0;

#[derive(Debug, Error)]
pub enum MindMapError {
    #[error("the summary has no headings or list items to map")]
    Empty,
    #[error("no mind map has been rendered yet")]
    NotRendered,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub content: String,
    pub depth: usize,
    pub children: Vec<Node>,
}

impl Node {
    fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            depth: 0,
            children: Vec::new(),
        }
    }

    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    fn assign_depth(&mut self, depth: usize) {
        self.depth = depth;
        for child in &mut self.children {
            child.assign_depth(depth + 1);
        }
    }
}

struct Frame {
    key: u32,
    node: Node,
}

/// Builds the tree with a stack of open nodes keyed by nesting rank. Headings
/// use their level (1..=6); list items rank below every heading.
struct TreeBuilder {
    stack: Vec<Frame>,
}

const LIST_ITEM_KEY: u32 = 10;

impl TreeBuilder {
    fn new() -> Self {
        Self {
            stack: vec![Frame {
                key: 0,
                node: Node::new(""),
            }],
        }
    }

    fn close_until(&mut self, key: u32) {
        while self.stack.len() > 1 && self.stack.last().is_some_and(|f| f.key >= key) {
            if let Some(mut frame) = self.stack.pop() {
                frame.node.content = frame.node.content.trim().to_string();
                if let Some(parent) = self.stack.last_mut() {
                    parent.node.children.push(frame.node);
                }
            }
        }
    }

    fn open(&mut self, key: u32) {
        self.close_until(key);
        self.stack.push(Frame {
            key,
            node: Node::new(""),
        });
    }

    fn append_text(&mut self, text: &str) {
        if let Some(frame) = self.stack.last_mut() {
            frame.node.content.push_str(text);
        }
    }

    fn finish(mut self) -> Node {
        self.close_until(1);
        self.stack
            .pop()
            .map(|frame| frame.node)
            .unwrap_or_else(|| Node::new(""))
    }
}

/// Parses `markdown` into a node tree.
///
/// A single top-level heading becomes the root; otherwise an unnamed root
/// holds the top-level nodes. Paragraphs outside list items are skipped.
pub fn transform(markdown: &str) -> Result<Node, MindMapError> {
    let mut builder = TreeBuilder::new();
    let mut list_depth: u32 = 0;
    let mut collecting = false;

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                builder.open(level as u32);
                collecting = true;
            }
            Event::End(TagEnd::Heading(_)) => collecting = false,
            Event::Start(Tag::List(_)) => {
                list_depth += 1;
                collecting = false;
            }
            Event::End(TagEnd::List(_)) => list_depth = list_depth.saturating_sub(1),
            Event::Start(Tag::Item) => {
                builder.open(LIST_ITEM_KEY + list_depth);
                collecting = true;
            }
            Event::End(TagEnd::Item) => {
                builder.close_until(LIST_ITEM_KEY + list_depth);
                collecting = false;
            }
            Event::Text(text) | Event::Code(text) if collecting => builder.append_text(&text),
            Event::SoftBreak | Event::HardBreak if collecting => builder.append_text(" "),
            _ => {}
        }
    }

    let mut root = builder.finish();
    if root.children.is_empty() {
        return Err(MindMapError::Empty);
    }
    if root.children.len() == 1 {
        root = root.children.remove(0);
    }
    root.assign_depth(0);
    Ok(root)
}

#[derive(Debug, Clone)]
pub struct MindMapOptions {
    pub auto_fit: bool,
    pub color: String,
    pub max_width: f64,
    pub node_min_height: f64,
    pub spacing_horizontal: f64,
    pub spacing_vertical: f64,
    pub padding_x: f64,
    /// Nodes at this depth start folded; deeper nodes are hidden.
    pub initial_expand_level: usize,
    /// Transition length for viewers that animate folding. Not used by the layout.
    pub duration_ms: u64,
    pub zoom: bool,
    pub pan: bool,
}

impl Default for MindMapOptions {
    fn default() -> Self {
        Self {
            auto_fit: true,
            color: "#007AFF".to_string(),
            max_width: 300.0,
            node_min_height: 16.0,
            spacing_horizontal: 80.0,
            spacing_vertical: 10.0,
            padding_x: 20.0,
            initial_expand_level: 2,
            duration_ms: 500,
            zoom: true,
            pan: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translate_x: f64,
    pub translate_y: f64,
    pub scale: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translate_x: 0.0,
            translate_y: 0.0,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedNode {
    pub parent: Option<usize>,
    pub depth: usize,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    /// Number of hidden descendants when the node is folded.
    pub folded: usize,
}

#[derive(Debug, Clone)]
pub struct MindMap {
    root: Node,
    options: MindMapOptions,
    nodes: Vec<PlacedNode>,
    viewport: Size,
    transform: Transform,
}

impl MindMap {
    pub fn render(root: Node, options: MindMapOptions, viewport: Size) -> Self {
        let mut map = Self {
            root,
            options,
            nodes: Vec::new(),
            viewport,
            transform: Transform::default(),
        };
        map.layout();
        if map.options.auto_fit {
            map.fit(viewport);
        }
        map
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn nodes(&self) -> &[PlacedNode] {
        &self.nodes
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    fn layout(&mut self) {
        let mut nodes = Vec::new();
        let mut next_y = self.options.node_min_height.max(LINE_HEIGHT);
        place(&self.root, None, 0.0, &self.options, &mut next_y, &mut nodes);
        self.nodes = nodes;
    }

    /// Recomputes scale and offset so the whole layout fits `viewport`.
    pub fn fit(&mut self, viewport: Size) {
        self.viewport = viewport;
        let (min_x, min_y, max_x, max_y) = self.bounds();
        let width = (max_x - min_x).max(1.0);
        let height = (max_y - min_y).max(1.0);

        let scale = ((viewport.width - 2.0 * MARGIN) / width)
            .min((viewport.height - 2.0 * MARGIN) / height)
            .clamp(f64::EPSILON, MAX_SCALE);

        self.transform = Transform {
            translate_x: (viewport.width - width * scale) / 2.0 - min_x * scale,
            translate_y: (viewport.height - height * scale) / 2.0 - min_y * scale,
            scale,
        };
    }

    fn bounds(&self) -> (f64, f64, f64, f64) {
        let text_height = self.options.node_min_height.max(LINE_HEIGHT);
        self.nodes.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(min_x, min_y, max_x, max_y), node| {
                (
                    min_x.min(node.x),
                    min_y.min(node.y - text_height),
                    max_x.max(node.x + node.width),
                    max_y.max(node.y),
                )
            },
        )
    }

    pub fn to_svg(&self) -> String {
        Svg(self).to_string()
    }

    /// Writes the SVG into `dir` as `mindmap_<unix millis>.svg`.
    pub fn export(&self, dir: &Path) -> Result<PathBuf, MindMapError> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("mindmap_{millis}.svg"));
        fs::write(&path, self.to_svg())?;
        Ok(path)
    }
}

/// SVG serialization of a rendered [`MindMap`].
struct Svg<'a>(&'a MindMap);

impl fmt::Display for Svg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.0;
        let options = &map.options;
        let color = escape_xml(&options.color);
        writeln!(
            f,
            r#"<svg xmlns="http://www.w3.org/2000/svg" class="markmap" width="{w:.0}" height="{h:.0}" viewBox="0 0 {w:.0} {h:.0}" data-duration="{duration}" data-zoom="{zoom}" data-pan="{pan}">"#,
            w = map.viewport.width,
            h = map.viewport.height,
            duration = options.duration_ms,
            zoom = options.zoom,
            pan = options.pan,
        )?;
        writeln!(
            f,
            "<style>\n.markmap-node-text {{ font-family: Arial, sans-serif; font-size: 14px; }}\n.markmap-link {{ stroke: {color}; fill: none; }}\n.markmap-node-circle {{ fill: {color}; }}\n.markmap-node-line {{ stroke: {color}; }}\n</style>"
        )?;
        let t = map.transform;
        writeln!(
            f,
            r#"<g transform="translate({:.2},{:.2}) scale({:.4})">"#,
            t.translate_x, t.translate_y, t.scale
        )?;

        for node in &map.nodes {
            if let Some(parent) = node.parent.map(|idx| &map.nodes[idx]) {
                let start_x = parent.x + parent.width;
                let mid_x = (start_x + node.x) / 2.0;
                writeln!(
                    f,
                    r#"<path class="markmap-link" d="M{:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1}"/>"#,
                    start_x, parent.y, mid_x, parent.y, mid_x, node.y, node.x, node.y
                )?;
            }
        }

        for node in &map.nodes {
            let label = if node.folded > 0 {
                format!("{} (+{})", node.label, node.folded)
            } else {
                node.label.clone()
            };
            let radius = if node.folded > 0 { 4.0 } else { 2.5 };
            writeln!(
                f,
                r#"<g class="markmap-node"><line class="markmap-node-line" x1="{x:.1}" y1="{y:.1}" x2="{x2:.1}" y2="{y:.1}"/><circle class="markmap-node-circle" cx="{x2:.1}" cy="{y:.1}" r="{radius}"/><text class="markmap-node-text" x="{x:.1}" y="{ty:.1}">{label}</text></g>"#,
                x = node.x,
                x2 = node.x + node.width,
                y = node.y,
                ty = node.y - 5.0,
                label = escape_xml(&label),
            )?;
        }

        writeln!(f, "</g>\n</svg>")
    }
}

/// Lays out `node` and its visible descendants, returning the index of `node`.
fn place(
    node: &Node,
    parent: Option<usize>,
    x: f64,
    options: &MindMapOptions,
    next_y: &mut f64,
    nodes: &mut Vec<PlacedNode>,
) -> usize {
    let (label, width) = fit_label(&node.content, options);
    let expanded = node.depth < options.initial_expand_level;
    let index = nodes.len();
    nodes.push(PlacedNode {
        parent,
        depth: node.depth,
        label,
        x,
        y: 0.0,
        width,
        folded: if expanded { 0 } else { node.descendant_count() },
    });

    let visible_children: &[Node] = if expanded { &node.children } else { &[] };
    if visible_children.is_empty() {
        nodes[index].y = *next_y;
        *next_y += options.node_min_height.max(LINE_HEIGHT) + options.spacing_vertical;
        return index;
    }

    let child_x = x + width + options.spacing_horizontal;
    let child_indices: Vec<usize> = visible_children
        .iter()
        .map(|child| place(child, Some(index), child_x, options, next_y, nodes))
        .collect();

    let first = nodes[child_indices[0]].y;
    let last = nodes[child_indices[child_indices.len() - 1]].y;
    nodes[index].y = (first + last) / 2.0;
    index
}

fn char_width(c: char) -> f64 {
    if c.len_utf8() > 1 {
        WIDE_CHAR_WIDTH
    } else {
        CHAR_WIDTH
    }
}

/// Truncates `content` to `max_width` and returns it with its drawn width.
fn fit_label(content: &str, options: &MindMapOptions) -> (String, f64) {
    let limit = options.max_width - options.padding_x;
    let full: f64 = content.chars().map(char_width).sum();
    if full <= limit {
        return (content.to_string(), full + options.padding_x);
    }

    let mut label = String::new();
    let mut width = char_width('…');
    for c in content.chars() {
        if width + char_width(c) > limit {
            break;
        }
        width += char_width(c);
        label.push(c);
    }
    label.push('…');
    (label, width + options.padding_x)
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = "# Rust\n\nIntro paragraph.\n\n## Ownership\n- Borrowing\n  - Shared refs\n  - Mutable refs\n- Moves\n## Traits\n- Generics\n";

    fn labels(node: &Node) -> Vec<(usize, String)> {
        let mut out = vec![(node.depth, node.content.clone())];
        for child in &node.children {
            out.extend(labels(child));
        }
        out
    }

    #[test]
    fn test_transform_nests_headings_and_items() {
        let root = transform(SUMMARY).unwrap();
        assert_eq!(
            labels(&root),
            vec![
                (0, "Rust".to_string()),
                (1, "Ownership".to_string()),
                (2, "Borrowing".to_string()),
                (3, "Shared refs".to_string()),
                (3, "Mutable refs".to_string()),
                (2, "Moves".to_string()),
                (1, "Traits".to_string()),
                (2, "Generics".to_string()),
            ]
        );
    }

    #[test]
    fn test_transform_multiple_top_level_nodes_get_unnamed_root() {
        let root = transform("# One\n# Two\n- `code` item\n").unwrap();
        assert_eq!(root.content, "");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[1].children[0].content, "code item");
    }

    #[test]
    fn test_transform_rejects_plain_text() {
        assert!(matches!(
            transform("just a paragraph"),
            Err(MindMapError::Empty)
        ));
        assert!(matches!(transform(""), Err(MindMapError::Empty)));
    }

    #[test]
    fn test_layout_folds_below_expand_level() {
        let root = transform(SUMMARY).unwrap();
        let map = MindMap::render(
            root,
            MindMapOptions::default(),
            Size {
                width: 800.0,
                height: 600.0,
            },
        );

        let borrowing = map
            .nodes()
            .iter()
            .find(|n| n.label == "Borrowing")
            .unwrap();
        assert_eq!(borrowing.folded, 2);
        assert!(map.nodes().iter().all(|n| n.depth <= 2));
        assert_eq!(map.nodes().len(), 6);

        let root = &map.nodes()[0];
        let ownership = &map.nodes()[1];
        assert!(ownership.x > root.x + root.width);
    }

    #[test]
    fn test_fit_scales_into_viewport() {
        let root = transform(SUMMARY).unwrap();
        let mut map = MindMap::render(
            root,
            MindMapOptions::default(),
            Size {
                width: 2000.0,
                height: 2000.0,
            },
        );
        assert_eq!(map.transform().scale, MAX_SCALE);

        map.fit(Size {
            width: 200.0,
            height: 100.0,
        });
        assert!(map.transform().scale < 1.0);
    }

    #[test]
    fn test_svg_escapes_labels_and_carries_style() {
        let root = transform("# Q&A \"x\" < y\n- a\n").unwrap();
        let map = MindMap::render(
            root,
            MindMapOptions::default(),
            Size {
                width: 400.0,
                height: 300.0,
            },
        );
        let svg = map.to_svg();
        assert!(svg.contains("Q&amp;A &quot;x&quot; &lt; y"));
        assert!(svg.contains(".markmap-link { stroke: #007AFF; fill: none; }"));
        assert_eq!(svg.matches("class=\"markmap-link\"").count(), 1);
    }

    #[test]
    fn test_svg_carries_viewer_options() {
        let options = MindMapOptions {
            duration_ms: 250,
            zoom: false,
            ..MindMapOptions::default()
        };
        let map = MindMap::render(
            transform("# Root\n- leaf\n").unwrap(),
            options,
            Size {
                width: 400.0,
                height: 300.0,
            },
        );
        let svg = map.to_svg();
        assert!(svg.contains(r#"data-duration="250" data-zoom="false" data-pan="true""#));
        assert!(svg.ends_with("</g>\n</svg>\n"));
    }

    #[test]
    fn test_long_labels_are_truncated() {
        let options = MindMapOptions::default();
        let (label, width) = fit_label(&"x".repeat(100), &options);
        assert!(label.ends_with('…'));
        assert!(width <= options.max_width);
    }

    #[test]
    fn test_export_writes_svg_file() {
        let dir = tempfile::tempdir().unwrap();
        let map = MindMap::render(
            transform("# Root\n- leaf\n").unwrap(),
            MindMapOptions::default(),
            Size {
                width: 400.0,
                height: 300.0,
            },
        );
        let path = map.export(dir.path()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("mindmap_") && name.ends_with(".svg"));
        assert!(fs::read_to_string(path).unwrap().starts_with("<svg"));
    }
}
