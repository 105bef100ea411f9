use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::dom::error::{DomError, DomResult};
use crate::dom::observer::{MutationObserver, MutationRecord, ObserverInner};
use crate::platform::runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct ElementData {
    tag_name: String,
    attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
}

impl Tree {
    fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
        };
        let root = tree.create(NodeKind::Document);
        let html = tree.create_element("html");
        let head = tree.create_element("head");
        let body = tree.create_element("body");
        tree.attach(root, html);
        tree.attach(html, head);
        tree.attach(html, body);
        tree.root = root;
        tree.head = head;
        tree.body = body;
        tree
    }

    fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    fn create_element(&mut self, tag_name: &str) -> NodeId {
        self.create(NodeKind::Element(ElementData {
            tag_name: tag_name.to_ascii_lowercase(),
            attributes: Vec::new(),
        }))
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes[child.0].parent.take()?;
        self.nodes[parent.0].children.retain(|id| *id != child);
        Some(parent)
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// The node followed by its ancestors up to the tree root.
    fn inclusive_ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.parent(current);
        }
        chain
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.inclusive_ancestors(id).contains(&ancestor)
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    /// Element descendants of `id` in document order, excluding `id` itself.
    fn element_descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id.0].children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if self.element(current).is_some() {
                out.push(current);
            }
            stack.extend(self.nodes[current.0].children.iter().rev().copied());
        }
        out
    }
}

pub(crate) struct DocumentInner {
    tree: Mutex<Tree>,
    pub(crate) observers: Mutex<Vec<Arc<ObserverInner>>>,
    delivery_scheduled: AtomicBool,
}

impl DocumentInner {
    fn queue_record(self: &Arc<Self>, record: MutationRecord, ancestors: &[NodeId]) {
        let observers = self.observers.lock().unwrap().clone();
        let mut queued = false;
        for observer in observers {
            queued |= observer.enqueue_if_interested(&record, ancestors);
        }
        if queued && runtime::has_executor() && !self.delivery_scheduled.swap(true, Ordering::SeqCst) {
            let document = Document {
                inner: Arc::clone(self),
            };
            runtime::spawn_detached(async move {
                document.flush_mutations();
            });
        }
    }
}

/// An in-memory page: a document tree with `<html>`, `<head>` and `<body>`, plus the
/// mutation observers registered against it.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.inner.tree.lock().unwrap();
        f.debug_struct("Document")
            .field("nodes", &tree.nodes.len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                tree: Mutex::new(Tree::new()),
                observers: Mutex::new(Vec::new()),
                delivery_scheduled: AtomicBool::new(false),
            }),
        }
    }

    pub fn head(&self) -> Element {
        let id = self.inner.tree.lock().unwrap().head;
        self.element_handle(id)
    }

    pub fn body(&self) -> Element {
        let id = self.inner.tree.lock().unwrap().body;
        self.element_handle(id)
    }

    pub fn create_element(&self, tag_name: &str) -> Element {
        let id = self.inner.tree.lock().unwrap().create_element(tag_name);
        self.element_handle(id)
    }

    pub fn create_text_node(&self, text: impl Into<String>) -> Node {
        let id = self
            .inner
            .tree
            .lock()
            .unwrap()
            .create(NodeKind::Text(text.into()));
        Node {
            doc: Arc::clone(&self.inner),
            id,
        }
    }

    /// Every element connected to the document, in document order.
    pub fn elements(&self) -> Vec<Element> {
        let ids = {
            let tree = self.inner.tree.lock().unwrap();
            tree.element_descendants(tree.root)
        };
        ids.into_iter().map(|id| self.element_handle(id)).collect()
    }

    /// Connected elements matching `predicate`, in document order.
    pub fn query_all<F>(&self, predicate: F) -> Vec<Element>
    where
        F: Fn(&Element) -> bool,
    {
        self.elements().into_iter().filter(|el| predicate(el)).collect()
    }

    /// Delivers every queued mutation record to its observer, repeating until callbacks stop
    /// producing new records. Returns the number of records delivered.
    ///
    /// This is the microtask checkpoint of the in-memory page. When a runtime is available a
    /// checkpoint is also scheduled automatically after the first queued record.
    pub fn flush_mutations(&self) -> usize {
        self.inner.delivery_scheduled.store(false, Ordering::SeqCst);
        let mut delivered = 0;
        loop {
            let observers = self.inner.observers.lock().unwrap().clone();
            let mut round = 0;
            for observer in observers {
                let records = observer.take_records();
                if records.is_empty() {
                    continue;
                }
                round += records.len();
                let handle = MutationObserver::from_inner(Arc::clone(&observer));
                (observer.callback)(records, &handle);
            }
            if round == 0 {
                return delivered;
            }
            delivered += round;
        }
    }

    pub fn has_pending_mutations(&self) -> bool {
        self.inner
            .observers
            .lock()
            .unwrap()
            .iter()
            .any(|observer| observer.has_records())
    }

    fn element_handle(&self, id: NodeId) -> Element {
        Element {
            node: Node {
                doc: Arc::clone(&self.inner),
                id,
            },
        }
    }
}

/// Handle to any node of a [`Document`]. Handles compare equal when they point at the same
/// node of the same document.
#[derive(Clone)]
pub struct Node {
    pub(crate) doc: Arc<DocumentInner>,
    pub(crate) id: NodeId,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.doc, &other.doc)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.doc).hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_element() {
            Some(element) => fmt::Debug::fmt(&element, f),
            None => f.debug_tuple("Node").field(&self.id.0).finish(),
        }
    }
}

impl Node {
    pub fn as_element(&self) -> Option<Element> {
        let is_element = self.doc.tree.lock().unwrap().element(self.id).is_some();
        is_element.then(|| Element { node: self.clone() })
    }

    pub fn is_element(&self) -> bool {
        self.doc.tree.lock().unwrap().element(self.id).is_some()
    }

    pub fn owner_document(&self) -> Document {
        Document {
            inner: Arc::clone(&self.doc),
        }
    }

    pub fn text(&self) -> Option<String> {
        match &self.doc.tree.lock().unwrap().nodes[self.id.0].kind {
            NodeKind::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn parent_element(&self) -> Option<Element> {
        let parent = self.doc.tree.lock().unwrap().parent(self.id)?;
        Node {
            doc: Arc::clone(&self.doc),
            id: parent,
        }
        .as_element()
    }

    pub fn is_connected(&self) -> bool {
        let tree = self.doc.tree.lock().unwrap();
        tree.is_inclusive_ancestor(tree.root, self.id)
    }

    /// Detaches the node from its parent, if any.
    pub fn remove(&self) {
        let detached = {
            let mut tree = self.doc.tree.lock().unwrap();
            tree.detach(self.id)
                .map(|parent| (parent, tree.inclusive_ancestors(parent)))
        };
        if let Some((parent, ancestors)) = detached {
            let record = MutationRecord::child_list(
                self.handle_for(parent),
                Vec::new(),
                vec![self.clone()],
            );
            self.doc.queue_record(record, &ancestors);
        }
    }

    fn handle_for(&self, id: NodeId) -> Node {
        Node {
            doc: Arc::clone(&self.doc),
            id,
        }
    }
}

impl AsRef<Node> for Node {
    fn as_ref(&self) -> &Node {
        self
    }
}

/// Handle to an element node.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Element {
    node: Node,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.node.doc.tree.lock().unwrap();
        match tree.element(self.node.id) {
            Some(data) => f
                .debug_struct("Element")
                .field("tag", &data.tag_name)
                .field("attributes", &data.attributes)
                .finish(),
            None => f.debug_tuple("Element").field(&self.node.id.0).finish(),
        }
    }
}

impl AsRef<Node> for Element {
    fn as_ref(&self) -> &Node {
        &self.node
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        element.node
    }
}

impl Element {
    pub fn as_node(&self) -> &Node {
        &self.node
    }

    pub fn owner_document(&self) -> Document {
        self.node.owner_document()
    }

    pub fn tag_name(&self) -> String {
        self.with_data(|data| data.tag_name.clone())
    }

    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.with_data(|data| {
            data.attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        })
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }

    /// Sets an attribute. Like the DOM, this queues an attribute mutation even when the value
    /// does not change.
    pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let (old_value, ancestors) = {
            let mut tree = self.node.doc.tree.lock().unwrap();
            let Some(data) = tree.element_mut(self.node.id) else {
                return;
            };
            let old_value = match data.attributes.iter_mut().find(|(key, _)| key == name) {
                Some(slot) => Some(std::mem::replace(&mut slot.1, value)),
                None => {
                    data.attributes.push((name.to_string(), value));
                    None
                }
            };
            (old_value, tree.inclusive_ancestors(self.node.id))
        };
        let record = MutationRecord::attributes(self.node.clone(), name, old_value);
        self.node.doc.queue_record(record, &ancestors);
    }

    /// Adds `name` with `value` only when the element does not carry it yet. The check and
    /// the write happen under one lock, so among concurrent callers exactly one sees `true`.
    pub fn set_attribute_if_absent(&self, name: &str, value: impl Into<String>) -> bool {
        let ancestors = {
            let mut tree = self.node.doc.tree.lock().unwrap();
            let Some(data) = tree.element_mut(self.node.id) else {
                return false;
            };
            if data.attributes.iter().any(|(key, _)| key == name) {
                return false;
            }
            data.attributes.push((name.to_string(), value.into()));
            tree.inclusive_ancestors(self.node.id)
        };
        let record = MutationRecord::attributes(self.node.clone(), name, None);
        self.node.doc.queue_record(record, &ancestors);
        true
    }

    pub fn remove_attribute(&self, name: &str) {
        let removed = {
            let mut tree = self.node.doc.tree.lock().unwrap();
            let Some(data) = tree.element_mut(self.node.id) else {
                return;
            };
            match data.attributes.iter().position(|(key, _)| key == name) {
                Some(index) => {
                    let (_, old) = data.attributes.remove(index);
                    Some((old, tree.inclusive_ancestors(self.node.id)))
                }
                None => None,
            }
        };
        if let Some((old_value, ancestors)) = removed {
            let record = MutationRecord::attributes(self.node.clone(), name, Some(old_value));
            self.node.doc.queue_record(record, &ancestors);
        }
    }

    pub fn has_class(&self, class_name: &str) -> bool {
        self.get_attribute("class")
            .map(|classes| classes.split_ascii_whitespace().any(|c| c == class_name))
            .unwrap_or(false)
    }

    /// Appends `child`, moving it out of its current parent first.
    pub fn append_child(&self, child: impl AsRef<Node>) -> DomResult<()> {
        let child = child.as_ref();
        if !Arc::ptr_eq(&self.node.doc, &child.doc) {
            return Err(DomError::WrongDocument);
        }
        let (previous_parent, ancestors) = {
            let mut tree = self.node.doc.tree.lock().unwrap();
            if tree.is_inclusive_ancestor(child.id, self.node.id) {
                return Err(DomError::HierarchyRequest);
            }
            let previous = tree
                .detach(child.id)
                .map(|parent| (parent, tree.inclusive_ancestors(parent)));
            tree.attach(self.node.id, child.id);
            (previous, tree.inclusive_ancestors(self.node.id))
        };
        if let Some((parent, parent_ancestors)) = previous_parent {
            let removal = MutationRecord::child_list(
                self.node.handle_for(parent),
                Vec::new(),
                vec![child.clone()],
            );
            self.node.doc.queue_record(removal, &parent_ancestors);
        }
        let addition = MutationRecord::child_list(self.node.clone(), vec![child.clone()], Vec::new());
        self.node.doc.queue_record(addition, &ancestors);
        Ok(())
    }

    pub fn children(&self) -> Vec<Element> {
        let ids = {
            let tree = self.node.doc.tree.lock().unwrap();
            tree.nodes[self.node.id.0]
                .children
                .iter()
                .copied()
                .filter(|id| tree.element(*id).is_some())
                .collect::<Vec<_>>()
        };
        ids.into_iter().map(|id| self.handle(id)).collect()
    }

    /// Element descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<Element> {
        let ids = self
            .node
            .doc
            .tree
            .lock()
            .unwrap()
            .element_descendants(self.node.id);
        ids.into_iter().map(|id| self.handle(id)).collect()
    }

    pub fn parent_element(&self) -> Option<Element> {
        self.node.parent_element()
    }

    pub fn is_connected(&self) -> bool {
        self.node.is_connected()
    }

    pub fn remove(&self) {
        self.node.remove();
    }

    fn handle(&self, id: NodeId) -> Element {
        Element {
            node: self.node.handle_for(id),
        }
    }

    fn with_data<T>(&self, f: impl FnOnce(&ElementData) -> T) -> T {
        let tree = self.node.doc.tree.lock().unwrap();
        match tree.element(self.node.id) {
            Some(data) => f(data),
            None => unreachable!("element handle points at a non-element node"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_head_and_body() {
        let document = Document::new();
        assert_eq!(document.head().tag_name(), "head");
        assert_eq!(document.body().tag_name(), "body");
        let tags: Vec<_> = document.elements().iter().map(Element::tag_name).collect();
        assert_eq!(tags, ["html", "head", "body"]);
    }

    #[test]
    fn append_child_moves_node_between_parents() {
        let document = Document::new();
        let section = document.create_element("SECTION");
        let main = document.create_element("main");
        document.body().append_child(&main).unwrap();
        document.body().append_child(&section).unwrap();
        main.append_child(&section).unwrap();

        assert_eq!(section.tag_name(), "section");
        assert_eq!(section.parent_element(), Some(main.clone()));
        assert_eq!(document.body().children(), vec![main]);
    }

    #[test]
    fn append_child_rejects_cycles_and_foreign_nodes() {
        let document = Document::new();
        let outer = document.create_element("div");
        let inner = document.create_element("div");
        outer.append_child(&inner).unwrap();

        assert_eq!(inner.append_child(&outer), Err(DomError::HierarchyRequest));
        assert_eq!(outer.append_child(&outer), Err(DomError::HierarchyRequest));

        let other = Document::new();
        assert_eq!(
            outer.append_child(other.create_element("p")),
            Err(DomError::WrongDocument)
        );
    }

    #[test]
    fn attributes_and_classes() {
        let document = Document::new();
        let div = document.create_element("div");
        div.set_attribute("class", "block fragment-wrapper");
        div.set_attribute("data-block-status", "loading");
        div.set_attribute("data-block-status", "loaded");

        assert_eq!(div.get_attribute("data-block-status").as_deref(), Some("loaded"));
        assert!(div.has_class("fragment-wrapper"));
        assert!(!div.has_class("fragment"));

        div.remove_attribute("class");
        assert!(!div.has_class("block"));
    }

    #[test]
    fn set_attribute_if_absent_claims_once() {
        let document = Document::new();
        let div = document.create_element("div");
        div.set_attribute("data-state", "pending");

        assert!(!div.set_attribute_if_absent("data-state", "done"));
        assert_eq!(div.get_attribute("data-state").as_deref(), Some("pending"));
        assert!(div.set_attribute_if_absent("data-other", "done"));
        assert!(!div.set_attribute_if_absent("data-other", "again"));
        assert_eq!(div.get_attribute("data-other").as_deref(), Some("done"));
    }

    #[test]
    fn concurrent_claims_have_a_single_winner() {
        let document = Document::new();
        let div = document.create_element("div");
        let winners = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| div.set_attribute_if_absent("data-claimed", "true")))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|won| *won)
                .count()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn detached_subtrees_are_not_connected() {
        let document = Document::new();
        let wrapper = document.create_element("div");
        let child = document.create_element("section");
        wrapper.append_child(&child).unwrap();
        assert!(!child.is_connected());
        assert!(document.query_all(|el| el.tag_name() == "section").is_empty());

        document.body().append_child(&wrapper).unwrap();
        assert!(child.is_connected());
        assert_eq!(wrapper.descendants(), vec![child.clone()]);

        wrapper.remove();
        assert!(!child.is_connected());
    }

    #[test]
    fn text_nodes_are_not_elements() {
        let document = Document::new();
        let text = document.create_text_node("hello");
        document.body().append_child(&text).unwrap();
        assert!(text.as_element().is_none());
        assert_eq!(text.text().as_deref(), Some("hello"));
        assert!(document.body().children().is_empty());
    }
}
