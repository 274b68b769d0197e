use crate::{element_map::ElementMap, status};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{error, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{Document, Element, Event};

/// A named behavior invocable from markup.
pub type ActionHandler = Rc<dyn Fn(&Element, &Event)>;

struct ActionBinding {
	trigger: String,
	action: String,
	listener: Closure<dyn FnMut(Event)>,
}

/// Binds declarative `data-trigger`/`data-action` pairs to a registry of named behaviors.
///
/// Binding is idempotent across repeated diffs: an element whose declared pair is unchanged
/// keeps its existing listener, and at most one listener is attached per element at any
/// time. Unknown action names are surfaced as a transient status message and skipped.
pub struct ActionDispatcher {
	document: Document,
	registry: HashMap<String, ActionHandler>,
	bindings: ElementMap<ActionBinding>,
}

impl ActionDispatcher {
	#[must_use]
	pub fn new(document: Document) -> Self {
		Self {
			document,
			registry: HashMap::new(),
			bindings: ElementMap::new(),
		}
	}

	pub fn register(&mut self, name: impl Into<String>, handler: impl Fn(&Element, &Event) + 'static) {
		self.registry.insert(name.into(), Rc::new(handler));
	}

	pub fn bind(&mut self, scope: &Element) {
		let span = trace_span!("Binding actions");
		let _enter = span.enter();

		let swept = self.bindings.sweep_disconnected();
		if swept != 0 {
			trace!("Dropped {} binding(s) for removed elements.", swept);
		}

		let list = match scope.query_selector_all("[data-trigger][data-action]") {
			Ok(list) => list,
			Err(error) => return error!("Failed to query action declarations: {:?}", error),
		};
		for i in 0..list.length() {
			if let Some(element) = list.get(i).and_then(|node| node.dyn_into::<Element>().ok()) {
				self.bind_element(&element);
			}
		}
	}

	fn bind_element(&mut self, element: &Element) {
		let (trigger, action) = match (element.get_attribute("data-trigger"), element.get_attribute("data-action")) {
			(Some(trigger), Some(action)) => (trigger, action),
			_ => return,
		};

		match self.bindings.get(element) {
			Some(binding) if binding.trigger == trigger && binding.action == action => {
				return trace!("Binding for {:?} on {:?} is unchanged.", action, trigger);
			}
			Some(_) => {
				// The declared pair changed: detach the old listener before rebinding.
				if let Some(old) = self.bindings.remove(element) {
					if let Err(error) = element.remove_event_listener_with_callback(&old.trigger, old.listener.as_ref().unchecked_ref()) {
						error!("Failed to detach the old {:?} listener: {:?}", old.trigger, error);
					}
				}
			}
			None => {}
		}

		let handler = match self.registry.get(&action) {
			Some(handler) => Rc::clone(handler),
			None => {
				warn!("Unknown action {:?}; skipping.", action);
				status::flash(&self.document, &format!("Unknown action: {}", action));
				return;
			}
		};

		let target = element.clone();
		let listener = Closure::wrap(Box::new(move |event: Event| {
			event.prevent_default();
			event.stop_propagation();
			handler(&target, &event);
		}) as Box<dyn FnMut(Event)>);
		if let Err(error) = element.add_event_listener_with_callback(&trigger, listener.as_ref().unchecked_ref()) {
			return error!("Failed to attach a {:?} listener: {:?}", trigger, error);
		}
		self.bindings.insert(element.clone(), ActionBinding { trigger, action, listener });
	}

	/// The API endpoint governing `element`: the nearest ancestor's `data-api` declaration.
	///
	/// Missing declarations are fatal to the single interaction that needed them; callers
	/// surface the error through their own display path.
	pub fn api_endpoint(element: &Element) -> Result<String, JsValue> {
		element
			.closest("[data-api]")?
			.and_then(|ancestor| ancestor.get_attribute("data-api"))
			.ok_or_else(|| JsValue::from_str("No ancestor declares an API endpoint."))
	}
}
