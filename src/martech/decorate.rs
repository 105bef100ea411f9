//! Once-per-element decoration of page content that reaches the loaded state.
//!
//! Sections and blocks advertise readiness through `data-section-status` and
//! `data-block-status`. The observer decorates what is already loaded, then watches the
//! page's top-level regions for status changes and inserted subtrees. The marker attribute
//! lives on the element, so overlapping roots and re-insertion never decorate twice.

use std::fmt;

use crate::dom::{Document, Element, MutationKind, MutationObserver, MutationRecord, ObserveOptions};
use crate::martech::config::DecorateCallback;
use crate::martech::constants::{
    BLOCK_STATUS_ATTRIBUTE, DECORATED_ATTRIBUTE, FRAGMENT_WRAPPER_CLASS, LOADED_STATUS,
    SECTION_STATUS_ATTRIBUTE,
};

const LANDMARK_TAGS: [&str; 3] = ["header", "footer", "main"];

/// `true` for a loaded `<section>`, or a loaded block that is not a section.
///
/// `data-section-status` is only read on `<section>` elements; any other element carrying it
/// is classified by `data-block-status` alone and is otherwise ignored.
pub fn is_decoration_candidate(element: &Element) -> bool {
    let status = if element.tag_name() == "section" {
        element.get_attribute(SECTION_STATUS_ATTRIBUTE)
    } else {
        element.get_attribute(BLOCK_STATUS_ATTRIBUTE)
    };
    status.as_deref() == Some(LOADED_STATUS)
}

pub fn is_decorated(element: &Element) -> bool {
    element.get_attribute(DECORATED_ATTRIBUTE).as_deref() == Some("true")
}

/// Claims `element` by writing the marker, then invokes `callback`. Only the caller that
/// wrote the marker runs the callback, even when deliveries overlap on several threads.
/// Returns whether the callback ran.
fn decorate_once(element: &Element, callback: &DecorateCallback) -> bool {
    if !element.set_attribute_if_absent(DECORATED_ATTRIBUTE, "true") {
        return false;
    }
    callback(element);
    true
}

/// Decorates `root` and every element below it that qualifies.
fn decorate_subtree(root: &Element, callback: &DecorateCallback) -> usize {
    std::iter::once(root.clone())
        .chain(root.descendants())
        .filter(is_decoration_candidate)
        .filter(|element| decorate_once(element, callback))
        .count()
}

fn observe_options() -> ObserveOptions {
    ObserveOptions {
        attributes: true,
        attribute_filter: vec![
            SECTION_STATUS_ATTRIBUTE.to_string(),
            BLOCK_STATUS_ATTRIBUTE.to_string(),
        ],
        child_list: true,
        subtree: true,
    }
}

fn observation_roots(document: &Document) -> Vec<Element> {
    let mut roots = vec![document.body()];
    roots.extend(document.query_all(|element| {
        LANDMARK_TAGS.contains(&element.tag_name().as_str())
            || element.has_class(FRAGMENT_WRAPPER_CLASS)
    }));
    roots
}

fn handle_records(records: Vec<MutationRecord>, observer: &MutationObserver, callback: &DecorateCallback) {
    for record in records {
        match record.kind {
            MutationKind::Attributes => {
                if let Some(element) = record.target.as_element() {
                    if is_decoration_candidate(&element) {
                        decorate_once(&element, callback);
                    }
                }
            }
            MutationKind::ChildList => {
                for element in record.added_nodes.iter().filter_map(|node| node.as_element()) {
                    std::iter::once(element.clone())
                        .chain(element.descendants())
                        .filter(|candidate| candidate.has_class(FRAGMENT_WRAPPER_CLASS))
                        .for_each(|wrapper| observer.observe(&wrapper, observe_options()));
                    decorate_subtree(&element, callback);
                }
            }
        }
    }
}

/// Watches a page for elements entering the loaded state. Lives as long as the page.
pub struct ElementDecorationObserver {
    observer: MutationObserver,
    roots: Vec<Element>,
}

impl fmt::Debug for ElementDecorationObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementDecorationObserver")
            .field("roots", &self.roots.len())
            .finish()
    }
}

impl ElementDecorationObserver {
    /// Decorates every element already loaded, then starts observing the page regions.
    pub fn start(document: &Document, callback: DecorateCallback) -> Self {
        for element in document.query_all(is_decoration_candidate) {
            decorate_once(&element, &callback);
        }

        let observer = MutationObserver::new(move |records, observer| {
            handle_records(records, observer, &callback);
        });
        let roots = observation_roots(document);
        for root in &roots {
            observer.observe(root, observe_options());
        }
        log::debug!("decoration observer watching {} roots", roots.len());

        Self { observer, roots }
    }

    /// Roots registered when observation started. Fragment wrappers added later are watched
    /// too but are not listed here.
    pub fn roots(&self) -> &[Element] {
        &self.roots
    }

    pub fn is_observing(&self, element: &Element) -> bool {
        self.observer.is_observing(element)
    }
}
