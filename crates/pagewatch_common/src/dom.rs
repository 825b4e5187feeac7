//! In-process document model.
//!
//! An arena of element and text nodes under a body root, loaded from HTML
//! markup and mutated through structural operations. Every structural change
//! is published as a [`MutationRecord`] to the observers whose root contains
//! the changed node, which is what the mutation feed subscribes to.
//!
//! Node ids stay valid after removal: a removed subtree is only detached, so
//! a scan that snapshotted ids earlier can still ask about them and will find
//! them disconnected.

use crate::error::{OverlayError, Result};
use scraper::{ElementRef, Html};
use std::cell::RefCell;
use std::rc::Rc;
use tokio::sync::mpsc;

/// Elements whose content is never rendered as text
const NON_RENDERED_TAGS: &[&str] = &["script", "style", "template", "noscript", "head", "title"];

pub type SharedDocument = Rc<RefCell<Document>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    attrs: Vec<(String, String)>,
    hidden: bool,
}

impl Element {
    fn new(tag: &str, attrs: Vec<(String, String)>) -> Self {
        let hidden = attrs.iter().any(|(name, value)| {
            name == "hidden"
                || (name == "style" && value.replace(' ', "").contains("display:none"))
        });
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs,
            hidden,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// One structural change, as delivered to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Node whose child list changed
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

pub type ObserverId = u64;

#[derive(Debug)]
struct Observer {
    id: ObserverId,
    root: NodeId,
    tx: mpsc::UnboundedSender<MutationRecord>,
}

#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    observers: Vec<Observer>,
    next_observer: ObserverId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty document with a `body` element
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            root: NodeId(0),
            body: NodeId(0),
            observers: Vec::new(),
            next_observer: 1,
        };
        let body = doc.alloc(Some(doc.root), NodeKind::Element(Element::new("body", Vec::new())));
        doc.body = body;
        doc
    }

    /// Load a full HTML document; only the body content is kept
    pub fn parse_html(markup: &str) -> Self {
        let html = Html::parse_document(markup);
        let mut doc = Self::new();

        let root = html.root_element();
        let body = root
            .children()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "body");

        let source = body.unwrap_or(root);
        if let NodeKind::Element(element) = &mut doc.nodes[doc.body.0].kind {
            *element = Element::new("body", collect_attrs(source));
        }
        let body_id = doc.body;
        doc.import_children(source, body_id);
        doc
    }

    pub fn into_shared(self) -> SharedDocument {
        Rc::new(RefCell::new(self))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    // ------------------------------------------------------------------
    // Node construction
    // ------------------------------------------------------------------

    fn alloc(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let attrs = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.alloc(None, NodeKind::Element(Element::new(tag, attrs)))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(None, NodeKind::Text(text.to_string()))
    }

    /// Copy the subtree below `source` under `parent`, depth-first without recursion
    fn import_children(&mut self, source: ElementRef<'_>, parent: NodeId) {
        let mut stack = vec![(source, parent)];
        while let Some((source, parent)) = stack.pop() {
            let mut nested = Vec::new();
            for child in source.children() {
                match child.value() {
                    scraper::Node::Text(text) => {
                        let content: &str = text;
                        self.alloc(Some(parent), NodeKind::Text(content.to_string()));
                    }
                    scraper::Node::Element(_) => {
                        if let Some(child_el) = ElementRef::wrap(child) {
                            let element =
                                Element::new(child_el.value().name(), collect_attrs(child_el));
                            let id = self.alloc(Some(parent), NodeKind::Element(element));
                            nested.push((child_el, id));
                        }
                    }
                    _ => {}
                }
            }
            stack.extend(nested.into_iter().rev());
        }
    }

    fn import_element(&mut self, source: ElementRef<'_>, parent: Option<NodeId>) -> NodeId {
        let element = Element::new(source.value().name(), collect_attrs(source));
        let id = self.alloc(parent, NodeKind::Element(element));
        self.import_children(source, id);
        id
    }

    /// Parse a markup fragment into detached nodes
    fn parse_fragment(&mut self, markup: &str) -> Vec<NodeId> {
        let fragment = Html::parse_fragment(markup);
        let mut created = Vec::new();
        for child in fragment.root_element().children() {
            match child.value() {
                scraper::Node::Text(text) => {
                    let content: &str = text;
                    created.push(self.alloc(None, NodeKind::Text(content.to_string())));
                }
                scraper::Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        created.push(self.import_element(child_el, None));
                    }
                }
                _ => {}
            }
        }
        created
    }

    // ------------------------------------------------------------------
    // Structural mutation
    // ------------------------------------------------------------------

    /// Append `child` to `parent`, detaching it from any previous parent
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_container(parent)?;
        self.check(child)?;
        if self.is_inclusive_ancestor(child, parent) {
            return Err(OverlayError::InvalidHierarchy(child.0));
        }
        if self.nodes[child.0].parent.is_some() {
            self.remove(child)?;
        }

        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        self.publish(MutationRecord {
            target: parent,
            added: vec![child],
            removed: Vec::new(),
        });
        Ok(())
    }

    /// Build an element with one text child and append it in a single change
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> Result<NodeId> {
        self.check_container(parent)?;
        let element = self.create_element(tag, attrs);
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.nodes[text_node.0].parent = Some(element);
            self.nodes[element.0].children.push(text_node);
        }
        self.append_child(parent, element)?;
        Ok(element)
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId> {
        self.check_container(parent)?;
        let node = self.create_text(text);
        self.append_child(parent, node)?;
        Ok(node)
    }

    /// Parse `markup` and append the resulting nodes as one change
    pub fn append_html(&mut self, parent: NodeId, markup: &str) -> Result<Vec<NodeId>> {
        self.check_container(parent)?;
        let added = self.parse_fragment(markup);
        for &node in &added {
            self.nodes[node.0].parent = Some(parent);
            self.nodes[parent.0].children.push(node);
        }
        if !added.is_empty() {
            self.publish(MutationRecord {
                target: parent,
                added: added.clone(),
                removed: Vec::new(),
            });
        }
        Ok(added)
    }

    /// Replace all children of `node` with parsed `markup`
    pub fn set_inner_html(&mut self, node: NodeId, markup: &str) -> Result<Vec<NodeId>> {
        self.check_container(node)?;
        let removed = std::mem::take(&mut self.nodes[node.0].children);
        for &child in &removed {
            self.nodes[child.0].parent = None;
        }

        let added = self.parse_fragment(markup);
        for &child in &added {
            self.nodes[child.0].parent = Some(node);
            self.nodes[node.0].children.push(child);
        }

        if !added.is_empty() || !removed.is_empty() {
            self.publish(MutationRecord {
                target: node,
                added: added.clone(),
                removed,
            });
        }
        Ok(added)
    }

    /// Detach `node` (and its subtree) from its parent
    pub fn remove(&mut self, node: NodeId) -> Result<()> {
        self.check(node)?;
        let Some(parent) = self.nodes[node.0].parent.take() else {
            return Ok(());
        };
        self.nodes[parent.0].children.retain(|&c| c != node);
        self.publish(MutationRecord {
            target: parent,
            added: Vec::new(),
            removed: vec![node],
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Attributes and visibility (not structural, never published)
    // ------------------------------------------------------------------

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
        let element = self.element_mut(node)?;
        match element.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => element.attrs.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    pub fn set_hidden(&mut self, node: NodeId, hidden: bool) -> Result<()> {
        self.element_mut(node)?.hidden = hidden;
        Ok(())
    }

    pub fn is_hidden(&self, node: NodeId) -> bool {
        self.element(node).map(Element::is_hidden).unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn check(&self, node: NodeId) -> Result<()> {
        if node.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(OverlayError::NodeNotFound(node.0))
        }
    }

    fn check_container(&self, node: NodeId) -> Result<()> {
        self.check(node)?;
        match self.nodes[node.0].kind {
            NodeKind::Text(_) => Err(OverlayError::NotAnElement(node.0)),
            _ => Ok(()),
        }
    }

    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.nodes.get(node.0).map(|n| &n.kind)
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match self.kind(node) {
            Some(NodeKind::Element(element)) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Result<&mut Element> {
        self.check(node)?;
        match &mut self.nodes[node.0].kind {
            NodeKind::Element(element) => Ok(element),
            _ => Err(OverlayError::NotAnElement(node.0)),
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|e| e.attr(name))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// True when `ancestor` is `node` or one of its ancestors
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        is_inclusive_ancestor(&self.nodes, ancestor, node)
    }

    /// True when `node` is still attached to the document root
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.is_inclusive_ancestor(self.root, node)
    }

    /// Nearest inclusive ancestor carrying attribute `name`
    pub fn closest_attr(&self, node: NodeId, name: &str) -> Option<&str> {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if let Some(value) = self.attr(current, name) {
                return Some(value);
            }
            cursor = self.parent(current);
        }
        None
    }

    /// First connected element with the given `id` attribute
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendant_elements(self.root)
            .into_iter()
            .find(|&node| self.attr(node, "id") == Some(id))
    }

    /// Element descendants of `root` in document order, `root` excluded
    pub fn descendant_elements(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.is_element(node) {
                out.push(node);
                stack.extend(self.children(node).iter().rev().copied());
            }
        }
        out
    }

    /// Concatenated raw text of a subtree
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, false, &mut out);
        out
    }

    /// Visible text of an element, whitespace-collapsed.
    ///
    /// `None` when the node is missing, not an element, or no longer
    /// attached to the document.
    pub fn rendered_text(&self, node: NodeId) -> Option<String> {
        self.element(node)?;

        // One walk answers both "still attached?" and "inside a hidden subtree?"
        let mut hidden = false;
        let mut cursor = Some(node);
        let mut connected = false;
        while let Some(current) = cursor {
            if current == self.root {
                connected = true;
                break;
            }
            hidden |= self.is_hidden(current);
            cursor = self.parent(current);
        }
        if !connected {
            return None;
        }
        if hidden {
            return Some(String::new());
        }

        let mut raw = String::new();
        self.collect_text(node, true, &mut raw);
        Some(raw.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    fn collect_text(&self, node: NodeId, rendered_only: bool, out: &mut String) {
        let mut stack = vec![Walk::Enter(node)];
        while let Some(step) = stack.pop() {
            let current = match step {
                Walk::Enter(current) => current,
                Walk::Space => {
                    out.push(' ');
                    continue;
                }
                Walk::Close(_) => continue,
            };
            let Some(n) = self.nodes.get(current.0) else {
                continue;
            };
            match &n.kind {
                NodeKind::Text(text) => {
                    out.push_str(text);
                    continue;
                }
                NodeKind::Element(element) if rendered_only => {
                    if element.hidden || NON_RENDERED_TAGS.contains(&element.tag.as_str()) {
                        continue;
                    }
                }
                _ => {}
            }
            // Reversed so children pop in document order, each followed by its separator
            for &child in n.children.iter().rev() {
                if rendered_only && self.is_element(child) {
                    stack.push(Walk::Space);
                }
                stack.push(Walk::Enter(child));
            }
        }
    }

    /// Serialized markup of the children of `node`
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        let mut stack: Vec<Walk<'_>> = self
            .children(node)
            .iter()
            .rev()
            .map(|&child| Walk::Enter(child))
            .collect();
        while let Some(step) = stack.pop() {
            let current = match step {
                Walk::Enter(current) => current,
                Walk::Close(tag) => {
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                    continue;
                }
                Walk::Space => continue,
            };
            match self.kind(current) {
                Some(NodeKind::Text(text)) => out.push_str(&escape_text(text)),
                Some(NodeKind::Element(element)) => {
                    out.push('<');
                    out.push_str(&element.tag);
                    for (name, value) in &element.attrs {
                        out.push_str(&format!(" {}=\"{}\"", name, escape_attr(value)));
                    }
                    if element.hidden && element.attr("hidden").is_none() {
                        out.push_str(" hidden");
                    }
                    out.push('>');
                    if !is_void(&element.tag) {
                        stack.push(Walk::Close(&element.tag));
                        stack.extend(self.children(current).iter().rev().map(|&c| Walk::Enter(c)));
                    }
                }
                Some(NodeKind::Document) => {
                    stack.extend(self.children(current).iter().rev().map(|&c| Walk::Enter(c)));
                }
                None => {}
            }
        }
        out
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Subscribe to structural changes inside `root`
    pub fn observe(
        &mut self,
        root: NodeId,
    ) -> Result<(ObserverId, mpsc::UnboundedReceiver<MutationRecord>)> {
        self.check_container(root)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.push(Observer { id, root, tx });
        Ok((id, rx))
    }

    /// Stop delivering records to an observer. Returns false if unknown.
    pub fn disconnect_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|obs| obs.id != id);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn publish(&mut self, record: MutationRecord) {
        let nodes = &self.nodes;
        self.observers.retain(|obs| {
            if !is_inclusive_ancestor(nodes, obs.root, record.target) {
                return true;
            }
            // A dropped receiver unsubscribes the observer
            obs.tx.send(record.clone()).is_ok()
        });
    }
}

/// Explicit-stack tree walk step; deep pages must not exhaust the call stack
enum Walk<'a> {
    Enter(NodeId),
    /// Separator between rendered sibling elements
    Space,
    /// Closing tag to emit once the children are written
    Close(&'a str),
}

fn is_inclusive_ancestor(nodes: &[Node], ancestor: NodeId, node: NodeId) -> bool {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if current == ancestor {
            return true;
        }
        cursor = nodes.get(current.0).and_then(|n| n.parent);
    }
    false
}

fn collect_attrs(source: ElementRef<'_>) -> Vec<(String, String)> {
    source
        .value()
        .attrs()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}

/// Escape text for inclusion in markup
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape text for a double-quoted attribute value
pub fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}
