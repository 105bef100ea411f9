use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomError {
    /// The insertion would make a node its own ancestor.
    HierarchyRequest,
    /// The node belongs to a different document.
    WrongDocument,
}

impl Display for DomError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DomError::HierarchyRequest => {
                f.write_str("the new child element contains the parent")
            }
            DomError::WrongDocument => f.write_str("the node belongs to a different document"),
        }
    }
}

impl std::error::Error for DomError {}

pub type DomResult<T> = Result<T, DomError>;
