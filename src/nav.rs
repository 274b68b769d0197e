use crate::{
	actions::ActionDispatcher,
	frame,
	lazy::LazyLoader,
	mount::MountScheduler,
	mutation::MutationScheduler,
	patch::{PersistenceRules, TreePatcher},
};
use core::{cell::RefCell, future::Future, pin::Pin};
use js_sys::JSON;
use std::rc::Rc;
use tracing::{error, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{Document, Element, Headers, Request, RequestCredentials, RequestInit, Response, Window};

/// Minimum time the UI stays in the loading state, purely for perceived-latency smoothing.
pub const MIN_FEEDBACK_MS: i32 = 150;
/// Class mirrored onto `<body>` while a load is in flight (cursor style, indicator).
pub const LOADING_CLASS: &str = "loading";

/// Cache behavior of a content-fragment fetch, carried as a request header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CachePolicy {
	Default,
	/// `X-Reload: true` — force revalidation.
	Revalidate,
	/// `X-CacheOnly: true` — serve from cache.
	CacheOnly,
}
impl CachePolicy {
	fn header(self) -> Option<(&'static str, &'static str)> {
		match self {
			CachePolicy::Default => None,
			CachePolicy::Revalidate => Some(("X-Reload", "true")),
			CachePolicy::CacheOnly => Some(("X-CacheOnly", "true")),
		}
	}
}

/// Navigation state owned exclusively by the [`NavigationController`].
#[derive(Clone, Debug)]
pub struct NavigationState {
	pub current_path: String,
	/// The path at initial load, the fallback for history entries without state.
	pub original_path: String,
	pub is_loading: bool,
	pub diff_completed_for_current_path: bool,
}

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<String, JsValue>>>>;

/// Content transport. The default implementation goes through `window.fetch`; tests
/// substitute a scripted one to control response ordering.
pub trait FetchBackend {
	/// Fetches the content fragment for `path` (`GET /_<path>`).
	fn fetch_fragment(&self, path: &str, policy: CachePolicy) -> FetchFuture;
	/// Fetches the full document for `path` (`GET <path>`).
	fn fetch_document(&self, path: &str) -> FetchFuture;
}

pub struct WebFetch {
	window: Window,
}
impl WebFetch {
	#[must_use]
	pub fn new(window: Window) -> Self {
		Self { window }
	}
}
impl FetchBackend for WebFetch {
	fn fetch_fragment(&self, path: &str, policy: CachePolicy) -> FetchFuture {
		let window = self.window.clone();
		let url = format!("/_{}", path);
		Box::pin(async move { fetch_text(&window, &url, policy).await })
	}

	fn fetch_document(&self, path: &str) -> FetchFuture {
		let window = self.window.clone();
		let url = path.to_owned();
		Box::pin(async move { fetch_text(&window, &url, CachePolicy::Default).await })
	}
}

async fn fetch_text(window: &Window, url: &str, policy: CachePolicy) -> Result<String, JsValue> {
	let mut init = RequestInit::new();
	init.method("GET").credentials(RequestCredentials::SameOrigin);
	if let Some((name, value)) = policy.header() {
		let headers = Headers::new()?;
		headers.set(name, value)?;
		init.headers(headers.as_ref());
	}
	let request = Request::new_with_str_and_init(url, &init)?;
	let response: Response = JsFuture::from(window.fetch_with_request(&request)).await?.dyn_into()?;
	let text = response_text(&response).await?;
	if response.ok() {
		Ok(text)
	} else {
		Err(JsValue::from_str(&text))
	}
}

async fn response_text(response: &Response) -> Result<String, JsValue> {
	let text = JsFuture::from(response.text()?).await?;
	Ok(text.as_string().unwrap_or_default())
}

/// Startup configuration, applied once at [`NavigationController::attach`].
#[derive(Clone, Debug, Default)]
pub struct EngineOptions {
	/// Id of the content region the engine swaps.
	pub container_id: String,
	/// Classes never removed by a patch.
	pub persistent_classes: Vec<String>,
	/// Attributes never cleared by a patch.
	pub persistent_attributes: Vec<String>,
}

/// Turns full-page navigation into partial, animated, resumable content swaps.
///
/// Owns browser history integration and the [`NavigationState`], issues content-fetch
/// requests, races them against the currently active navigation, and drives the
/// patch → bind → hydrate → mount pipeline on completion. For any two navigations A then
/// B issued while A is in flight, B's completion wins; A's response is detected as stale
/// and discarded, never applied out of order.
#[derive(Clone)]
pub struct NavigationController {
	state: Rc<RefCell<NavigationState>>,
	document: Document,
	container_id: String,
	backend: Rc<dyn FetchBackend>,
	patcher: Rc<TreePatcher>,
	lazy: Rc<LazyLoader>,
	mounts: MountScheduler,
	actions: Rc<RefCell<ActionDispatcher>>,
	mutations: MutationScheduler,
}

impl NavigationController {
	/// Attaches the engine to the current document, using `window.fetch` for content.
	pub fn attach(options: EngineOptions) -> Result<Self, JsValue> {
		let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window available."))?;
		let backend = Rc::new(WebFetch::new(window));
		Self::attach_with_backend(options, backend)
	}

	/// [`attach`](Self::attach) with a caller-provided content transport.
	pub fn attach_with_backend(options: EngineOptions, backend: Rc<dyn FetchBackend>) -> Result<Self, JsValue> {
		let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window available."))?;
		let document = window.document().ok_or_else(|| JsValue::from_str("No document available."))?;
		if document.get_element_by_id(&options.container_id).is_none() {
			return Err(JsValue::from_str("Content container not found."));
		}

		let original_path = window.location().pathname()?;
		let state = NavigationState {
			current_path: original_path.clone(),
			original_path,
			is_loading: false,
			diff_completed_for_current_path: true,
		};
		let mutations = MutationScheduler::new();
		let rules = PersistenceRules::new(options.persistent_classes, options.persistent_attributes);
		let controller = Self {
			state: Rc::new(RefCell::new(state)),
			document: document.clone(),
			container_id: options.container_id,
			backend,
			patcher: Rc::new(TreePatcher::new(document.clone(), rules)),
			lazy: Rc::new(LazyLoader::new(document.clone())),
			mounts: MountScheduler::new(mutations.clone()),
			actions: Rc::new(RefCell::new(ActionDispatcher::new(document))),
			mutations,
		};
		controller.listen_for_popstate(&window)?;
		// The server-rendered initial content gets the same pipeline as a patched one.
		controller.content_ready();
		Ok(controller)
	}

	#[must_use]
	pub fn state(&self) -> NavigationState {
		self.state.borrow().clone()
	}

	#[must_use]
	pub fn is_loading(&self) -> bool {
		self.state.borrow().is_loading
	}

	#[must_use]
	pub fn mutations(&self) -> &MutationScheduler {
		&self.mutations
	}

	pub fn register_action(&self, name: impl Into<String>, handler: impl Fn(&Element, &web_sys::Event) + 'static) {
		self.actions.borrow_mut().register(name, handler);
	}

	/// Navigates to `path`, pushing a history entry. A navigation to the current path is
	/// a no-op.
	pub fn navigate(&self, path: &str) {
		self.navigate_inner(path, true);
	}

	fn navigate_without_history(&self, path: &str) {
		self.navigate_inner(path, false);
	}

	fn navigate_inner(&self, path: &str, push_history: bool) {
		if self.state.borrow().current_path == path {
			return trace!("Already at {:?}.", path);
		}
		let span = trace_span!("Navigating", path);
		let _enter = span.enter();

		if push_history {
			match web_sys::window().and_then(|window| window.history().ok()) {
				Some(history) => {
					if let Err(error) = history.push_state_with_url(&JsValue::from_str(path), "", Some(path)) {
						error!("Failed to push a history entry: {:?}", error);
					}
				}
				None => warn!("No history available; navigating without an entry."),
			}
		}
		{
			let mut state = self.state.borrow_mut();
			state.current_path = path.to_owned();
			state.diff_completed_for_current_path = false;
		}
		self.set_loading(true);
		if let Some(container) = self.container() {
			self.mounts.unmount(&container);
		}

		let controller = self.clone();
		let path = path.to_owned();
		spawn_local(async move {
			// The fetch overlaps a fixed perceived-latency delay; both must resolve before
			// the swap. The timer starts at creation, so awaiting it second keeps the
			// overlap and the total at max(fetch, delay).
			let delay = frame::sleep(MIN_FEEDBACK_MS);
			let result = controller.backend.fetch_fragment(&path, CachePolicy::Default).await;
			delay.await;
			match result {
				Ok(markup) => controller.apply_if_current(&path, &markup),
				Err(error) => error!("Failed to fetch the fragment for {:?}: {:?}", path, error),
			}
			controller.set_loading(false);
		});
	}

	/// Applies a navigation response unless a newer navigation superseded it.
	fn apply_if_current(&self, path: &str, markup: &str) {
		{
			let mut state = self.state.borrow_mut();
			if state.current_path != path || state.diff_completed_for_current_path {
				return trace!("Discarding a stale navigation response for {:?}.", path);
			}
			state.diff_completed_for_current_path = true;
		}
		if let Some(container) = self.container() {
			self.patcher.patch(&container, markup);
			self.content_ready();
		}
	}

	/// Re-fetches the current path's fragment and replaces the content region's markup.
	///
	/// `use_cache` selects the `X-CacheOnly` header over `X-Reload`. A response whose
	/// originating path is no longer current at completion time is discarded.
	pub fn reload_content(&self, use_cache: bool) {
		let policy = if use_cache { CachePolicy::CacheOnly } else { CachePolicy::Revalidate };
		let path = self.state.borrow().current_path.clone();
		self.set_loading(true);

		let controller = self.clone();
		spawn_local(async move {
			match controller.backend.fetch_fragment(&path, policy).await {
				Ok(markup) => {
					if controller.state.borrow().current_path == path {
						if let Some(container) = controller.container() {
							container.set_inner_html(&markup);
							controller.content_ready();
						}
					} else {
						trace!("Discarding a stale reload response for {:?}.", path);
					}
				}
				Err(error) => error!("Failed to reload content for {:?}: {:?}", path, error),
			}
			controller.set_loading(false);
		});
	}

	/// Full-document variant of [`reload_content`](Self::reload_content), replacing the
	/// document root instead of only the content region. Same stale-response guard.
	pub fn reload_page(&self) {
		let path = self.state.borrow().current_path.clone();
		self.set_loading(true);

		let controller = self.clone();
		spawn_local(async move {
			match controller.backend.fetch_document(&path).await {
				Ok(markup) => {
					if controller.state.borrow().current_path == path {
						match controller.document.document_element() {
							Some(root) => {
								root.set_inner_html(&markup);
								controller.content_ready();
							}
							None => error!("No document element to replace."),
						}
					} else {
						trace!("Discarding a stale page reload for {:?}.", path);
					}
				}
				Err(error) => error!("Failed to reload the page for {:?}: {:?}", path, error),
			}
			controller.set_loading(false);
		});
	}

	/// Issues a mutating request. Non-string bodies are JSON-serialized. Resolves to the
	/// response body on HTTP 200 and fails with the body text otherwise.
	///
	/// A post issued while a load is already in flight is a silent no-op resolving to
	/// `None`, so one client can't overlap mutating requests.
	pub fn post(&self, url: &str, body: &JsValue) -> impl Future<Output = Result<Option<String>, JsValue>> {
		// The admission check is synchronous so two unawaited calls can't both pass it.
		let admitted = !self.state.borrow().is_loading;
		if admitted {
			self.set_loading(true);
		}

		let controller = self.clone();
		let url = url.to_owned();
		let body = body.clone();
		async move {
			if !admitted {
				trace!("Ignoring a post issued while a load is in flight.");
				return Ok(None);
			}
			let result = send_post(&url, &body).await;
			controller.set_loading(false);
			result.map(Some)
		}
	}

	fn container(&self) -> Option<Element> {
		let container = self.document.get_element_by_id(&self.container_id);
		if container.is_none() {
			error!("Content container #{} is missing.", self.container_id);
		}
		container
	}

	/// Content-ready pipeline: rebind actions, hydrate lazy media, stagger new mountables.
	fn content_ready(&self) {
		let span = trace_span!("Content ready");
		let _enter = span.enter();

		let container = match self.container() {
			Some(container) => container,
			None => return,
		};
		self.actions.borrow_mut().bind(&container);
		self.lazy.hydrate(&container);

		let list = match container.query_selector_all("[data-mount]") {
			Ok(list) => list,
			Err(error) => return error!("Failed to query mountables: {:?}", error),
		};
		let mountables: Vec<Element> = (0..list.length())
			.filter_map(|i| list.get(i))
			.filter_map(|node| node.dyn_into::<Element>().ok())
			.collect();
		self.mounts.mount(&mountables);
	}

	fn set_loading(&self, loading: bool) {
		self.state.borrow_mut().is_loading = loading;
		if let Some(body) = self.document.body() {
			let result = if loading {
				body.class_list().add_1(LOADING_CLASS)
			} else {
				body.class_list().remove_1(LOADING_CLASS)
			};
			if let Err(error) = result {
				error!("Failed to toggle the loading class: {:?}", error);
			}
		}
	}

	/// Back/forward replay: history state carries the navigated path; entries without
	/// state fall back to the original load path. No new history entry is pushed.
	fn listen_for_popstate(&self, window: &Window) -> Result<(), JsValue> {
		let controller = self.clone();
		let listener = Closure::wrap(Box::new(move |event: web_sys::PopStateEvent| {
			let path = event
				.state()
				.as_string()
				.unwrap_or_else(|| controller.state.borrow().original_path.clone());
			controller.navigate_without_history(&path);
		}) as Box<dyn FnMut(web_sys::PopStateEvent)>);
		window.add_event_listener_with_callback("popstate", listener.as_ref().unchecked_ref())?;
		// The listener lives for the page's lifetime.
		listener.forget();
		Ok(())
	}
}

async fn send_post(url: &str, body: &JsValue) -> Result<String, JsValue> {
	let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window available."))?;
	let body = if body.is_string() { body.clone() } else { JsValue::from(JSON::stringify(body)?) };

	let mut init = RequestInit::new();
	init.method("POST").credentials(RequestCredentials::SameOrigin).body(Some(&body));
	let request = Request::new_with_str_and_init(url, &init)?;
	let response: Response = JsFuture::from(window.fetch_with_request(&request)).await?.dyn_into()?;
	let text = response_text(&response).await?;
	if response.status() == 200 {
		Ok(text)
	} else {
		Err(JsValue::from_str(&text))
	}
}
