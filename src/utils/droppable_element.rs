use crate::Local;

/// `DroppableElement` writes `value` into `drop_in` on [`Drop`].
///
/// # Usage
///
/// It is used to test [`Drop`] implementations.
pub(crate) struct DroppableElement {
    pub(crate) value: usize,
    pub(crate) drop_in: Local<Vec<usize>>,
}

impl DroppableElement {
    /// Creates a new `DroppableElement`.
    pub(crate) fn new(value: usize, drop_in: Local<Vec<usize>>) -> Self {
        Self { value, drop_in }
    }
}

impl Drop for DroppableElement {
    fn drop(&mut self) {
        self.drop_in.borrow_mut().push(self.value);
    }
}
