use web_sys::Element;

/// A side mapping from element identity to values.
///
/// DOM nodes can't be hashed from Rust without help, and attaching expando properties to
/// them is exactly the kind of duck typing this crate avoids, so lookups are linear scans
/// over reference-equality comparisons. The populations involved (action bindings, pending
/// lazy targets) are small and shrink as elements resolve or leave the document.
pub struct ElementMap<V> {
	entries: Vec<(Element, V)>,
}
impl<V> Default for ElementMap<V> {
	fn default() -> Self {
		Self::new()
	}
}
impl<V> ElementMap<V> {
	#[must_use]
	pub fn new() -> Self {
		Self { entries: Vec::new() }
	}

	#[must_use]
	pub fn get(&self, element: &Element) -> Option<&V> {
		self.entries.iter().find(|(key, _)| key == element).map(|(_, value)| value)
	}

	pub fn get_mut(&mut self, element: &Element) -> Option<&mut V> {
		self.entries.iter_mut().find(|(key, _)| key == element).map(|(_, value)| value)
	}

	/// Inserts `value` for `element`, returning the replaced value if there was one.
	pub fn insert(&mut self, element: Element, value: V) -> Option<V> {
		match self.get_mut(&element) {
			Some(slot) => Some(core::mem::replace(slot, value)),
			None => {
				self.entries.push((element, value));
				None
			}
		}
	}

	pub fn remove(&mut self, element: &Element) -> Option<V> {
		let index = self.entries.iter().position(|(key, _)| key == element)?;
		Some(self.entries.swap_remove(index).1)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Drops entries whose element has left the document, returning how many were dropped.
	pub fn sweep_disconnected(&mut self) -> usize {
		let before = self.entries.len();
		self.entries.retain(|(element, _)| element.is_connected());
		before - self.entries.len()
	}
}
