use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::dom::document::{DocumentInner, Element, Node, NodeId};

pub type MutationCallback = Arc<dyn Fn(Vec<MutationRecord>, &MutationObserver) + Send + Sync + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationKind {
    Attributes,
    ChildList,
}

/// One observed change, delivered to observers in batches.
#[derive(Clone, Debug)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: Node,
    pub attribute_name: Option<String>,
    pub old_value: Option<String>,
    pub added_nodes: Vec<Node>,
    pub removed_nodes: Vec<Node>,
}

impl MutationRecord {
    pub(crate) fn attributes(target: Node, name: &str, old_value: Option<String>) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            attribute_name: Some(name.to_string()),
            old_value,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
        }
    }

    pub(crate) fn child_list(target: Node, added_nodes: Vec<Node>, removed_nodes: Vec<Node>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            attribute_name: None,
            old_value: None,
            added_nodes,
            removed_nodes,
        }
    }
}

/// Which mutations of an observed node (and optionally its subtree) are reported.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    pub attributes: bool,
    /// Restricts attribute reporting to these names; empty means every attribute.
    pub attribute_filter: Vec<String>,
    pub child_list: bool,
    pub subtree: bool,
}

impl ObserveOptions {
    fn wants(&self, record: &MutationRecord) -> bool {
        match record.kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::Attributes => {
                self.attributes
                    && (self.attribute_filter.is_empty()
                        || record
                            .attribute_name
                            .as_ref()
                            .is_some_and(|name| self.attribute_filter.contains(name)))
            }
        }
    }
}

#[derive(Clone)]
struct Registration {
    document: Weak<DocumentInner>,
    node: NodeId,
    options: ObserveOptions,
}

pub(crate) struct ObserverInner {
    pub(crate) callback: MutationCallback,
    registrations: Mutex<Vec<Registration>>,
    records: Mutex<Vec<MutationRecord>>,
}

impl ObserverInner {
    /// Queues `record` when one of this observer's registrations covers it. `ancestors` is the
    /// inclusive ancestor chain of the record target at mutation time.
    pub(crate) fn enqueue_if_interested(&self, record: &MutationRecord, ancestors: &[NodeId]) -> bool {
        let interested = self.registrations.lock().unwrap().iter().any(|registration| {
            let same_document = registration
                .document
                .upgrade()
                .is_some_and(|doc| Arc::ptr_eq(&doc, &record.target.doc));
            let covers = registration.node == record.target.id
                || (registration.options.subtree && ancestors.contains(&registration.node));
            same_document && covers && registration.options.wants(record)
        });
        if interested {
            self.records.lock().unwrap().push(record.clone());
        }
        interested
    }

    pub(crate) fn take_records(&self) -> Vec<MutationRecord> {
        std::mem::take(&mut *self.records.lock().unwrap())
    }

    pub(crate) fn has_records(&self) -> bool {
        !self.records.lock().unwrap().is_empty()
    }
}

/// Watches nodes of a [`crate::dom::Document`] and receives batches of
/// [`MutationRecord`]s at the document's next mutation checkpoint.
#[derive(Clone)]
pub struct MutationObserver {
    inner: Arc<ObserverInner>,
}

impl fmt::Debug for MutationObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationObserver")
            .field("registrations", &self.inner.registrations.lock().unwrap().len())
            .finish()
    }
}

impl MutationObserver {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Vec<MutationRecord>, &MutationObserver) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ObserverInner {
                callback: Arc::new(callback),
                registrations: Mutex::new(Vec::new()),
                records: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ObserverInner>) -> Self {
        Self { inner }
    }

    /// Starts observing `target`. Observing a node twice replaces its options.
    pub fn observe(&self, target: &Element, options: ObserveOptions) {
        let node = target.as_node();
        {
            let mut registrations = self.inner.registrations.lock().unwrap();
            let existing = registrations.iter_mut().find(|registration| {
                registration.node == node.id
                    && registration
                        .document
                        .upgrade()
                        .is_some_and(|doc| Arc::ptr_eq(&doc, &node.doc))
            });
            match existing {
                Some(registration) => registration.options = options,
                None => registrations.push(Registration {
                    document: Arc::downgrade(&node.doc),
                    node: node.id,
                    options,
                }),
            }
        }

        let mut observers = node.doc.observers.lock().unwrap();
        if !observers.iter().any(|observer| Arc::ptr_eq(observer, &self.inner)) {
            observers.push(Arc::clone(&self.inner));
        }
    }

    /// Stops all observation and drops undelivered records.
    pub fn disconnect(&self) {
        let registrations = std::mem::take(&mut *self.inner.registrations.lock().unwrap());
        for registration in registrations {
            if let Some(doc) = registration.document.upgrade() {
                doc.observers
                    .lock()
                    .unwrap()
                    .retain(|observer| !Arc::ptr_eq(observer, &self.inner));
            }
        }
        self.inner.take_records();
    }

    /// Removes and returns records queued but not yet delivered.
    pub fn take_records(&self) -> Vec<MutationRecord> {
        self.inner.take_records()
    }

    pub fn is_observing(&self, target: &Element) -> bool {
        let node = target.as_node();
        self.inner
            .registrations
            .lock()
            .unwrap()
            .iter()
            .any(|registration| registration.node == node.id)
    }
}
