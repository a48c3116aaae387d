//! Node arena for one function's reconstruction.
//!
//! All elements and forms of a reconstruction live in one [`FormPool`] and are
//! referenced by [`ElementId`] / [`FormId`] handles. Nothing is freed
//! individually; the pool is dropped as a unit when the function is done.
//! Parent links (element → enclosing form, form → owning element) are plain
//! handles too, so cycles between parents and children are harmless.

use std::fmt;

use crate::forms::{Form, FormElement};

/// Handle of an element in a [`FormPool`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(pub(crate) usize);

impl ElementId {
    /// Creates a new `ElementId` from a raw index value.
    ///
    /// Only handles returned by the pool are meaningful; this constructor
    /// exists for tests and serialization.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        ElementId(index)
    }

    /// Returns the raw index value of this handle.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({})", self.0)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Handle of a form (sequence wrapper) in a [`FormPool`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormId(pub(crate) usize);

impl FormId {
    /// Creates a new `FormId` from a raw index value.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        FormId(index)
    }

    /// Returns the raw index value of this handle.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormId({})", self.0)
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct ElementSlot {
    parent: Option<FormId>,
    element: FormElement,
}

/// Arena owning every element and form of one reconstruction.
///
/// # Thread Safety
///
/// A pool is owned by exactly one reconstruction and is never shared; it is
/// [`Send`] so finished reconstructions can move between threads.
#[derive(Debug, Clone, Default)]
pub struct FormPool {
    elements: Vec<ElementSlot>,
    forms: Vec<Form>,
}

impl FormPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        FormPool::default()
    }

    /// Allocates `element` and links its child forms back to it.
    pub fn alloc_element(&mut self, element: FormElement) -> ElementId {
        let id = ElementId(self.elements.len());
        let children = element.child_forms();
        self.elements.push(ElementSlot {
            parent: None,
            element,
        });
        for child in children {
            self.forms[child.0].parent = Some(id);
        }
        id
    }

    /// Allocates a form holding `elements`, in order.
    pub fn alloc_sequence_form(&mut self, elements: Vec<ElementId>) -> FormId {
        let id = FormId(self.forms.len());
        for elt in &elements {
            self.elements[elt.0].parent = Some(id);
        }
        self.forms.push(Form {
            parent: None,
            elements,
        });
        id
    }

    /// Allocates a form holding the single element `elt`.
    pub fn alloc_single_form(&mut self, elt: ElementId) -> FormId {
        self.alloc_sequence_form(vec![elt])
    }

    /// Allocates `element` and wraps it in a new form.
    pub fn alloc_single_element_form(&mut self, element: FormElement) -> FormId {
        let elt = self.alloc_element(element);
        self.alloc_single_form(elt)
    }

    /// Allocates a form holding a single [`FormElement::Empty`].
    pub fn alloc_empty_form(&mut self) -> FormId {
        self.alloc_single_element_form(FormElement::Empty)
    }

    /// Returns the element behind `id`.
    #[must_use]
    pub fn element(&self, id: ElementId) -> &FormElement {
        &self.elements[id.0].element
    }

    /// Returns the element behind `id` for mutation.
    ///
    /// Callers that change child forms must keep parent links consistent, see
    /// [`FormPool::replace_element`].
    pub fn element_mut(&mut self, id: ElementId) -> &mut FormElement {
        &mut self.elements[id.0].element
    }

    /// Replaces the payload of `id`, relinking the new child forms.
    pub fn replace_element(&mut self, id: ElementId, element: FormElement) {
        for child in element.child_forms() {
            self.forms[child.0].parent = Some(id);
        }
        self.elements[id.0].element = element;
    }

    /// Returns the form behind `id`.
    #[must_use]
    pub fn form(&self, id: FormId) -> &Form {
        &self.forms[id.0]
    }

    /// Returns the elements of form `id`.
    #[must_use]
    pub fn elements_of(&self, id: FormId) -> &[ElementId] {
        &self.forms[id.0].elements
    }

    /// Replaces the elements of form `id`, relinking their parent form.
    pub fn set_elements(&mut self, id: FormId, elements: Vec<ElementId>) {
        for elt in &elements {
            self.elements[elt.0].parent = Some(id);
        }
        self.forms[id.0].elements = elements;
    }

    /// Returns the form enclosing element `id`.
    #[must_use]
    pub fn parent_form(&self, id: ElementId) -> Option<FormId> {
        self.elements[id.0].parent
    }

    /// Returns the element owning form `id`.
    #[must_use]
    pub fn parent_element(&self, id: FormId) -> Option<ElementId> {
        self.forms[id.0].parent
    }

    /// Returns the single element of form `id`, if it holds exactly one.
    #[must_use]
    pub fn try_as_single_element(&self, id: FormId) -> Option<ElementId> {
        match self.forms[id.0].elements.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Returns the number of allocated elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Returns the number of allocated forms.
    #[must_use]
    pub fn form_count(&self) -> usize {
        self.forms.len()
    }
}
