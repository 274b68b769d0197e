use crate::element_map::ElementMap;
use core::cell::{Cell, RefCell};
use js_sys::{Array, Reflect};
use std::rc::Rc;
use tracing::{error, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{Document, Element, HtmlCanvasElement, HtmlIFrameElement, HtmlImageElement, IntersectionObserver, IntersectionObserverEntry};

/// Class marking a lazy target whose resource loaded.
pub const FOUND_CLASS: &str = "found";
/// Class marking a lazy target whose resource failed to load.
pub const NOT_FOUND_CLASS: &str = "notfound";

/// A 1×1 transparent GIF shown while an image's real source is still deferred.
const BLANK_PIXEL: &str = "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

type Resolver = Box<dyn FnOnce(&Element)>;

/// Observes elements entering the viewport and resolves each exactly once.
///
/// Hosts without `IntersectionObserver` degrade to resolving eagerly on
/// [`observe`](Self::observe), preserving the one-shot contract.
pub struct LazyLoader {
	document: Document,
	pending: Rc<RefCell<ElementMap<Resolver>>>,
	done: Rc<RefCell<ElementMap<()>>>,
	observer: Option<IntersectionObserver>,
	// Kept alive for the observer's lifetime.
	_on_intersect: Option<Closure<dyn FnMut(Array, IntersectionObserver)>>,
	webp_supported: Cell<Option<bool>>,
}

impl LazyLoader {
	#[must_use]
	pub fn new(document: Document) -> Self {
		let pending = Rc::new(RefCell::new(ElementMap::new()));
		let done = Rc::new(RefCell::new(ElementMap::new()));
		let (observer, on_intersect) = match create_observer(&pending, &done) {
			Some((observer, on_intersect)) => (Some(observer), Some(on_intersect)),
			None => (None, None),
		};
		Self {
			document,
			pending,
			done,
			observer,
			_on_intersect: on_intersect,
			webp_supported: Cell::new(None),
		}
	}

	/// Attaches a one-shot "became visible" resolver to `element`.
	///
	/// Re-observing a pending or already-resolved element is a no-op; each element is
	/// resolved at most once.
	pub fn observe(&self, element: &Element, resolve: impl FnOnce(&Element) + 'static) {
		if self.done.borrow().get(element).is_some() || self.pending.borrow().get(element).is_some() {
			return trace!("Element is already pending or resolved; keeping the original resolver.");
		}
		match &self.observer {
			Some(observer) => {
				self.pending.borrow_mut().insert(element.clone(), Box::new(resolve));
				observer.observe(element);
			}
			None => {
				// Eager fallback: the contract holds, resolution just isn't deferred.
				self.done.borrow_mut().insert(element.clone(), ());
				resolve(element);
			}
		}
	}

	/// Scans `scope` for `data-lazy` markers and wires up the media resolvers.
	pub fn hydrate(&self, scope: &Element) {
		let span = trace_span!("Hydrating lazy targets");
		let _enter = span.enter();

		let swept = self.pending.borrow_mut().sweep_disconnected() + self.done.borrow_mut().sweep_disconnected();
		if swept != 0 {
			trace!("Dropped {} lazy record(s) for removed elements.", swept);
		}

		let list = match scope.query_selector_all("[data-lazy]") {
			Ok(list) => list,
			Err(error) => return error!("Failed to query lazy targets: {:?}", error),
		};
		let webp_supported = self.supports_webp();
		let pixel_ratio = web_sys::window().map_or(1.0, |window| window.device_pixel_ratio());
		for i in 0..list.length() {
			let element = match list.get(i).and_then(|node| node.dyn_into::<Element>().ok()) {
				Some(element) => element,
				None => continue,
			};
			prepare_placeholder(&element);
			self.observe(&element, move |element| resolve_media(element, webp_supported, pixel_ratio));
		}
	}

	fn supports_webp(&self) -> bool {
		if let Some(supported) = self.webp_supported.get() {
			return supported;
		}
		let supported = probe_webp(&self.document);
		trace!("WebP support: {}", supported);
		self.webp_supported.set(Some(supported));
		supported
	}
}

#[allow(clippy::type_complexity)]
fn create_observer(
	pending: &Rc<RefCell<ElementMap<Resolver>>>,
	done: &Rc<RefCell<ElementMap<()>>>,
) -> Option<(IntersectionObserver, Closure<dyn FnMut(Array, IntersectionObserver)>)> {
	let window = web_sys::window()?;
	if !Reflect::has(window.as_ref(), &JsValue::from_str("IntersectionObserver")).unwrap_or(false) {
		warn!("IntersectionObserver is unavailable; lazy targets will resolve eagerly.");
		return None;
	}

	let pending = Rc::clone(pending);
	let done = Rc::clone(done);
	let on_intersect = Closure::wrap(Box::new(move |entries: Array, observer: IntersectionObserver| {
		for entry in entries.iter() {
			let entry: IntersectionObserverEntry = entry.unchecked_into();
			if !entry.is_intersecting() {
				continue;
			}
			let target = entry.target();
			observer.unobserve(&target);
			let resolver = pending.borrow_mut().remove(&target);
			match resolver {
				Some(resolve) => {
					done.borrow_mut().insert(target.clone(), ());
					resolve(&target);
				}
				None => warn!("Intersection for an element with no pending resolver."),
			}
		}
	}) as Box<dyn FnMut(Array, IntersectionObserver)>);

	match IntersectionObserver::new(on_intersect.as_ref().unchecked_ref()) {
		Ok(observer) => Some((observer, on_intersect)),
		Err(error) => {
			error!("Failed to create an IntersectionObserver: {:?}", error);
			None
		}
	}
}

/// Shows the declared background color and an empty pixel until the real source resolves.
fn prepare_placeholder(element: &Element) {
	let image = match element.dyn_ref::<HtmlImageElement>() {
		Some(image) => image,
		None => return,
	};
	if let Some(color) = image.dataset().get("color") {
		if let Err(error) = image.style().set_property("background-color", &color) {
			error!("Failed to set the placeholder color: {:?}", error);
		}
	}
	if image.get_attribute("src").map_or(true, |src| src.is_empty()) {
		image.set_src(BLANK_PIXEL);
	}
}

fn resolve_media(element: &Element, webp_supported: bool, pixel_ratio: f64) {
	if let Some(image) = element.dyn_ref::<HtmlImageElement>() {
		resolve_image(image, webp_supported, pixel_ratio);
	} else if let Some(frame) = element.dyn_ref::<HtmlIFrameElement>() {
		resolve_frame(frame);
	} else {
		warn!("A lazy marker on <{}> has no resolver; ignoring.", element.tag_name());
	}
}

fn resolve_image(image: &HtmlImageElement, webp_supported: bool, pixel_ratio: f64) {
	let span = trace_span!("Resolving lazy image");
	let _enter = span.enter();

	let base = match image.dataset().get("src") {
		Some(base) => base,
		None => return warn!("A lazy image declares no deferred source."),
	};
	let url = variant_url(
		&base,
		webp_supported && image.dataset().get("webp").is_some(),
		pixel_ratio > 1.0 && image.dataset().get("hidpi").is_some(),
	);

	// Swapping to an identical source would reload and flicker.
	if image.current_src() == url || image.src() == url {
		return trace!("Lazy image already shows {:?}.", url);
	}

	let classes = image.class_list();
	{
		let classes = classes.clone();
		let on_load = Closure::once_into_js(move || {
			drop(classes.remove_1(NOT_FOUND_CLASS));
			if let Err(error) = classes.add_1(FOUND_CLASS) {
				error!("Failed to mark an image as found: {:?}", error);
			}
		});
		if let Err(error) = image.add_event_listener_with_callback("load", on_load.unchecked_ref()) {
			error!("Failed to attach a load listener: {:?}", error);
		}
	}
	{
		let on_error = Closure::once_into_js(move || {
			// A previous success is not overridden by a failed variant swap.
			if !classes.contains(FOUND_CLASS) {
				if let Err(error) = classes.add_1(NOT_FOUND_CLASS) {
					error!("Failed to mark an image as not found: {:?}", error);
				}
			}
		});
		if let Err(error) = image.add_event_listener_with_callback("error", on_error.unchecked_ref()) {
			error!("Failed to attach an error listener: {:?}", error);
		}
	}
	image.set_src(&url);
}

fn resolve_frame(frame: &HtmlIFrameElement) {
	let src = match frame.dataset().get("src") {
		Some(src) => src,
		None => return warn!("A lazy frame declares no deferred source."),
	};
	if frame.src() == src {
		trace!("Lazy frame already shows {:?}.", src);
	} else {
		frame.set_src(&src);
	}
	if let Err(error) = frame.class_list().add_1(FOUND_CLASS) {
		error!("Failed to mark a frame as found: {:?}", error);
	}
}

/// Source variant for the supported format and display density.
///
/// `poster.png` becomes `poster@2x.webp` when both apply. Extension-less sources are
/// returned unchanged.
#[must_use]
pub fn variant_url(base: &str, webp: bool, hidpi: bool) -> String {
	match base.rfind('.') {
		Some(dot) if !base[dot..].contains('/') => {
			let (stem, extension) = base.split_at(dot);
			let extension = if webp { ".webp" } else { extension };
			let density = if hidpi { "@2x" } else { "" };
			format!("{}{}{}", stem, density, extension)
		}
		_ => base.to_owned(),
	}
}

fn probe_webp(document: &Document) -> bool {
	let canvas = match document.create_element("canvas").ok().and_then(|element| element.dyn_into::<HtmlCanvasElement>().ok()) {
		Some(canvas) => canvas,
		None => return false,
	};
	canvas.set_width(1);
	canvas.set_height(1);
	canvas.to_data_url_with_type("image/webp").map_or(false, |url| url.starts_with("data:image/webp"))
}
