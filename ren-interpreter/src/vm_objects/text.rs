use ren_core::{Series, SeriesError, SeriesFlags};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A mutable string series, shared by every cell that refers to it.
///
/// Strings never point back at anything, so they are not registered with the heap: refcounting
/// alone frees them.
#[derive(Clone)]
pub struct Text(Rc<RefCell<Series<char>>>);

impl Text {
    pub fn new(content: &str) -> Text {
        Self::from_chars(content.chars().collect())
    }

    pub fn from_chars(chars: Vec<char>) -> Text {
        Text(Rc::new(RefCell::new(Series::from_vec(chars, SeriesFlags::empty()))))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<char> {
        self.0.borrow().get(index).copied()
    }

    /// The content from `index` on.
    pub fn to_string_from(&self, index: usize) -> String {
        self.0.borrow().as_slice().iter().skip(index).collect()
    }

    pub fn chars_from(&self, index: usize) -> Vec<char> {
        self.0.borrow().as_slice().iter().skip(index).copied().collect()
    }

    pub fn push_str(&self, content: &str) -> Result<(), SeriesError> {
        self.0.borrow_mut().extend(content.chars())
    }

    pub fn insert_str(&self, index: usize, content: &str) -> Result<(), SeriesError> {
        let mut series = self.0.borrow_mut();
        for (offset, ch) in content.chars().enumerate() {
            series.insert(index + offset, ch)?;
        }
        Ok(())
    }

    pub fn set(&self, index: usize, ch: char) -> Result<(), SeriesError> {
        self.0.borrow_mut().set(index, ch)
    }

    pub fn freeze(&self) {
        self.0.borrow_mut().freeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.0.borrow().is_frozen()
    }

    /// A fresh, unfrozen copy of the content from `index` on.
    pub fn copy_from(&self, index: usize) -> Text {
        Self::from_chars(self.chars_from(index))
    }

    pub fn ptr_eq(&self, other: &Text) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_from(0))
    }
}
