use hashbrown::HashSet;
use tracing::{error, trace, trace_span};
use wasm_bindgen::JsCast;
use web_sys::{CharacterData, Document, DocumentFragment, Element, HtmlTemplateElement, Node};

/// Class and attribute names that survive any patch, regardless of the target markup.
///
/// Process-wide, configured once at startup, read on every patch.
#[derive(Debug, Default)]
pub struct PersistenceRules {
	classes: HashSet<String>,
	attributes: HashSet<String>,
}
impl PersistenceRules {
	pub fn new(classes: impl IntoIterator<Item = String>, attributes: impl IntoIterator<Item = String>) -> Self {
		Self {
			classes: classes.into_iter().collect(),
			attributes: attributes.into_iter().collect(),
		}
	}

	fn keeps_class(&self, class: &str) -> bool {
		self.classes.contains(class)
	}

	fn keeps_attribute(&self, name: &str) -> bool {
		self.attributes.contains(name)
	}
}

/// Reconciles a live content subtree against a target markup string, node by node.
///
/// Matching nodes are updated in place, unmatched live nodes are removed, unmatched target
/// nodes are adopted, and [`PersistenceRules`] are honored throughout. Structurally
/// unexpected input never blocks a patch; the browser parser's own recovery applies, and
/// markup that can't be parsed at all degrades to text insertion.
#[derive(Debug)]
pub struct TreePatcher {
	document: Document,
	rules: PersistenceRules,
}

impl TreePatcher {
	#[must_use]
	pub fn new(document: Document, rules: PersistenceRules) -> Self {
		Self { document, rules }
	}

	pub fn patch(&self, container: &Element, markup: &str) {
		let span = trace_span!("Patching subtree", markup_len = markup.len());
		let _enter = span.enter();

		match self.parse_fragment(markup) {
			Some(target) => self.reconcile_children(container.as_ref(), target.as_ref()),
			None => {
				error!("Failed to parse the target markup; inserting it as text.");
				container.set_text_content(Some(markup));
			}
		}
	}

	fn parse_fragment(&self, markup: &str) -> Option<DocumentFragment> {
		let template = self
			.document
			.create_element("template")
			.ok()?
			.dyn_into::<HtmlTemplateElement>()
			.ok()?;
		template.set_inner_html(markup);
		Some(template.content())
	}

	fn reconcile_children(&self, live: &Node, target: &Node) {
		// Target children are collected up front: adopting one into the live tree would
		// otherwise shift the list mid-iteration.
		let target_children: Vec<Node> = {
			let list = target.child_nodes();
			(0..list.length()).filter_map(|i| list.get(i)).collect()
		};

		let live_children = live.child_nodes();
		let mut i = 0;
		for wanted in target_children {
			match live_children.get(i) {
				None => {
					if let Err(error) = live.append_child(&wanted) {
						error!("Failed to append a node: {:?}", error);
						continue;
					}
					i += 1;
				}
				Some(current) => {
					if !self.update_in_place(&current, &wanted) {
						if let Err(error) = live.replace_child(&wanted, &current) {
							error!("Failed to replace a node: {:?}", error);
							continue;
						}
					}
					i += 1;
				}
			}
		}

		while let Some(extra) = live_children.get(i) {
			if let Err(error) = live.remove_child(&extra) {
				error!("Failed to remove a node: {:?}", error);
				// Step past it rather than spinning on the same node.
				i += 1;
			}
		}
	}

	/// Updates `live` into the shape of `target` if the two are compatible, returning
	/// whether that worked. Incompatible pairs are left for the caller to replace.
	fn update_in_place(&self, live: &Node, target: &Node) -> bool {
		if let (Some(live_element), Some(target_element)) = (live.dyn_ref::<Element>(), target.dyn_ref::<Element>()) {
			if live_element.tag_name() != target_element.tag_name() {
				return false;
			}
			let span = trace_span!("Updating element in place", tag = &*live_element.tag_name());
			let _enter = span.enter();
			self.update_attributes(live_element, target_element);
			self.update_classes(live_element, target_element);
			self.reconcile_children(live_element.as_ref(), target_element.as_ref());
			return true;
		}

		if live.node_type() == target.node_type() {
			if let (Some(live_data), Some(target_data)) = (live.dyn_ref::<CharacterData>(), target.dyn_ref::<CharacterData>()) {
				if live_data.data() != target_data.data() {
					live_data.set_data(&target_data.data());
				}
				return true;
			}
		}

		false
	}

	fn update_attributes(&self, live: &Element, target: &Element) {
		// The class attribute is merged separately so persistent classes can be retained.
		let live_attributes = live.attributes();
		let mut stale = Vec::new();
		for i in 0..live_attributes.length() {
			if let Some(attribute) = live_attributes.item(i) {
				let name = attribute.name();
				if name == "class" || self.rules.keeps_attribute(&name) {
					continue;
				}
				if target.get_attribute(&name).is_none() {
					stale.push(name);
				}
			}
		}
		for name in stale {
			if let Err(error) = live.remove_attribute(&name) {
				error!("Failed to remove the {:?} attribute: {:?}", name, error);
			}
		}

		let target_attributes = target.attributes();
		for i in 0..target_attributes.length() {
			if let Some(attribute) = target_attributes.item(i) {
				let name = attribute.name();
				if name == "class" {
					continue;
				}
				let value = attribute.value();
				// A persistent attribute is never overwritten to empty.
				if value.is_empty() && self.rules.keeps_attribute(&name) && live.get_attribute(&name).map_or(false, |live_value| !live_value.is_empty()) {
					trace!("Keeping the persistent {:?} attribute over an empty target value.", name);
					continue;
				}
				if live.get_attribute(&name).as_deref() != Some(value.as_str()) {
					if let Err(error) = live.set_attribute(&name, &value) {
						error!("Failed to set the {:?} attribute: {:?}", name, error);
					}
				}
			}
		}
	}

	fn update_classes(&self, live: &Element, target: &Element) {
		let live_list = live.class_list();
		let target_list = target.class_list();

		let mut classes: Vec<String> = (0..target_list.length()).filter_map(|i| target_list.item(i)).collect();
		for i in 0..live_list.length() {
			if let Some(class) = live_list.item(i) {
				if self.rules.keeps_class(&class) && !target_list.contains(&class) {
					classes.push(class);
				}
			}
		}

		if classes.is_empty() {
			if live.has_attribute("class") {
				if let Err(error) = live.remove_attribute("class") {
					error!("Failed to clear the class attribute: {:?}", error);
				}
			}
		} else {
			let joined = classes.join(" ");
			if live.get_attribute("class").as_deref() != Some(joined.as_str()) {
				if let Err(error) = live.set_attribute("class", &joined) {
					error!("Failed to set the class attribute: {:?}", error);
				}
			}
		}
	}
}
