//! The sequence wrapper.

use crate::forms::ElementId;

/// An ordered list of one or more elements: "do these in order, the value is
/// the last one".
///
/// Forms are how the tree avoids deep nesting of explicit `begin` constructs:
/// a loop body or a cond arm is a single form holding all its statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub(crate) parent: Option<ElementId>,
    pub(crate) elements: Vec<ElementId>,
}

impl Form {
    /// Returns the elements in evaluation order.
    #[must_use]
    pub fn elements(&self) -> &[ElementId] {
        &self.elements
    }

    /// Returns the element owning this form, if any.
    #[must_use]
    pub fn parent_element(&self) -> Option<ElementId> {
        self.parent
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the form holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns the last element, which provides the form's value.
    #[must_use]
    pub fn last(&self) -> Option<ElementId> {
        self.elements.last().copied()
    }
}
