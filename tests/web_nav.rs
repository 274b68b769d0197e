use pagelet::{
	frame,
	nav::{CachePolicy, EngineOptions, FetchBackend, FetchFuture, NavigationController},
};
use std::{cell::RefCell, rc::Rc};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};

wasm_bindgen_test_configure!(run_in_browser);


struct PendingRequest {
	path: String,
	policy: CachePolicy,
	resolve: js_sys::Function,
	reject: js_sys::Function,
}

/// A transport whose responses the test resolves explicitly, in any order.
#[derive(Default)]
struct ScriptedFetch {
	requests: RefCell<Vec<PendingRequest>>,
}

impl ScriptedFetch {
	fn len(&self) -> usize {
		self.requests.borrow().len()
	}

	fn policy(&self, index: usize) -> CachePolicy {
		self.requests.borrow()[index].policy
	}

	fn path(&self, index: usize) -> String {
		self.requests.borrow()[index].path.clone()
	}

	fn resolve(&self, index: usize, markup: &str) {
		let requests = self.requests.borrow();
		requests[index].resolve.call1(&JsValue::UNDEFINED, &JsValue::from_str(markup)).unwrap();
	}

	fn reject(&self, index: usize, message: &str) {
		let requests = self.requests.borrow();
		requests[index].reject.call1(&JsValue::UNDEFINED, &JsValue::from_str(message)).unwrap();
	}

	fn record(&self, path: &str, policy: CachePolicy) -> FetchFuture {
		let (promise, resolve, reject) = promise_with_resolver();
		self.requests.borrow_mut().push(PendingRequest {
			path: path.to_owned(),
			policy,
			resolve,
			reject,
		});
		Box::pin(async move {
			let markup = JsFuture::from(promise).await?;
			Ok(markup.as_string().unwrap_or_default())
		})
	}
}

impl FetchBackend for ScriptedFetch {
	fn fetch_fragment(&self, path: &str, policy: CachePolicy) -> FetchFuture {
		self.record(path, policy)
	}

	fn fetch_document(&self, path: &str) -> FetchFuture {
		self.record(path, CachePolicy::Default)
	}
}

fn promise_with_resolver() -> (js_sys::Promise, js_sys::Function, js_sys::Function) {
	let slot = Rc::new(RefCell::new(None));
	let clone = Rc::clone(&slot);
	let mut executor = move |resolve: js_sys::Function, reject: js_sys::Function| {
		*clone.borrow_mut() = Some((resolve, reject));
	};
	let promise = js_sys::Promise::new(&mut executor);
	let (resolve, reject) = slot.borrow_mut().take().unwrap();
	(promise, resolve, reject)
}

fn attach(container_id: &str) -> (NavigationController, Rc<ScriptedFetch>) {
	web_support_::init_log();
	web_support_::fixture(container_id);
	let backend = Rc::new(ScriptedFetch::default());
	let controller = NavigationController::attach_with_backend(
		EngineOptions {
			container_id: container_id.to_owned(),
			..EngineOptions::default()
		},
		Rc::<ScriptedFetch>::clone(&backend),
	)
	.unwrap();
	(controller, backend)
}

#[wasm_bindgen_test]
async fn later_navigation_wins_out_of_order_responses() {
	let (controller, backend) = attach("nav-race");

	controller.navigate("/anime/1");
	controller.navigate("/anime/2");
	frame::sleep(20).await;
	assert_eq!(backend.len(), 2);
	assert!(controller.is_loading());

	// B's response arrives first; A's arrives late and must be discarded.
	backend.resolve(1, "<p>two</p>");
	frame::sleep(250).await;
	backend.resolve(0, "<p>one</p>");
	frame::sleep(250).await;

	let container = web_support_::document().get_element_by_id("nav-race").unwrap();
	assert_eq!(container.inner_html(), "<p>two</p>");
	assert!(!controller.is_loading());
	assert_eq!(controller.state().current_path, "/anime/2");
}

#[wasm_bindgen_test]
async fn navigating_to_the_current_path_is_a_no_op() {
	let (controller, backend) = attach("nav-noop");

	let current = controller.state().current_path;
	controller.navigate(&current);
	frame::sleep(20).await;

	assert_eq!(backend.len(), 0);
	assert!(!controller.is_loading());
}

#[wasm_bindgen_test]
async fn fetch_failures_clear_the_loading_flag() {
	let (controller, backend) = attach("nav-failure");

	controller.navigate("/broken");
	frame::sleep(20).await;
	assert!(controller.is_loading());

	backend.reject(0, "connection reset");
	frame::sleep(250).await;

	// Logged and dropped; the loading state must not stick, and nothing was patched.
	assert!(!controller.is_loading());
	let container = web_support_::document().get_element_by_id("nav-failure").unwrap();
	assert_eq!(container.inner_html(), "");
}

#[wasm_bindgen_test]
async fn reload_content_selects_the_cache_headers() {
	let (controller, backend) = attach("nav-reload");

	controller.reload_content(false);
	frame::sleep(20).await;
	assert_eq!(backend.len(), 1);
	assert_eq!(backend.policy(0), CachePolicy::Revalidate);
	backend.resolve(0, "<p>fresh</p>");
	frame::sleep(50).await;

	let container = web_support_::document().get_element_by_id("nav-reload").unwrap();
	assert_eq!(container.inner_html(), "<p>fresh</p>");
	assert!(!controller.is_loading());

	controller.reload_content(true);
	frame::sleep(20).await;
	assert_eq!(backend.policy(1), CachePolicy::CacheOnly);
	backend.resolve(1, "<p>cached</p>");
	frame::sleep(50).await;
	assert_eq!(container.inner_html(), "<p>cached</p>");
}

#[wasm_bindgen_test]
async fn stale_reloads_are_discarded() {
	let (controller, backend) = attach("nav-stale-reload");

	let origin = controller.state().current_path;
	controller.reload_content(false);
	frame::sleep(20).await;
	assert_eq!(backend.path(0), origin);

	// The user navigates away before the reload lands.
	controller.navigate("/elsewhere");
	frame::sleep(20).await;

	backend.resolve(0, "<p>stale</p>");
	frame::sleep(50).await;
	let container = web_support_::document().get_element_by_id("nav-stale-reload").unwrap();
	assert_ne!(container.inner_html(), "<p>stale</p>");

	backend.resolve(1, "<p>elsewhere</p>");
	frame::sleep(250).await;
	assert_eq!(container.inner_html(), "<p>elsewhere</p>");
	assert!(!controller.is_loading());
}

#[wasm_bindgen_test]
async fn posts_while_loading_resolve_to_none() {
	let (controller, backend) = attach("nav-post-gate");

	controller.navigate("/somewhere/busy");
	frame::sleep(20).await;
	assert!(controller.is_loading());

	let result = controller.post("/api/thing/do", &JsValue::from_str("{}")).await;
	assert!(result.unwrap().is_none());

	backend.resolve(0, "<p>done</p>");
	frame::sleep(250).await;
	assert!(!controller.is_loading());
}

#[wasm_bindgen_test]
async fn the_content_pipeline_runs_after_a_patch() {
	let (controller, backend) = attach("nav-pipeline");

	controller.navigate("/anime/list");
	frame::sleep(20).await;
	backend.resolve(0, r#"<section data-mount="card">hi</section>"#);
	frame::sleep(600).await;

	let container = web_support_::document().get_element_by_id("nav-pipeline").unwrap();
	let section = container.first_element_child().unwrap();
	// The staggered mount wave revealed the new content.
	assert!(section.class_list().contains("mounted"));
}
