use pagelet::actions::ActionDispatcher;
use std::{cell::Cell, rc::Rc};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{HtmlElement, HtmlInputElement};

wasm_bindgen_test_configure!(run_in_browser);


fn dispatcher() -> ActionDispatcher {
	ActionDispatcher::new(web_support_::document())
}

#[wasm_bindgen_test]
fn binding_is_idempotent() {
	web_support_::init_log();
	let container = web_support_::fixture("actions-idempotent");
	container.set_inner_html(r#"<button data-trigger="click" data-action="tally">go</button>"#);

	let mut dispatcher = dispatcher();
	let count = Rc::new(Cell::new(0));
	{
		let count = Rc::clone(&count);
		dispatcher.register("tally", move |_, _| count.set(count.get() + 1));
	}
	dispatcher.bind(&container);
	dispatcher.bind(&container);

	let button: HtmlElement = container.first_element_child().unwrap().dyn_into().unwrap();
	button.click();
	// Exactly one active listener despite the repeated bind.
	assert_eq!(count.get(), 1);
}

#[wasm_bindgen_test]
fn changed_pairs_replace_the_old_listener() {
	web_support_::init_log();
	let container = web_support_::fixture("actions-rebind");
	container.set_inner_html(r#"<button data-trigger="click" data-action="first">go</button>"#);

	let mut dispatcher = dispatcher();
	let first = Rc::new(Cell::new(0));
	let second = Rc::new(Cell::new(0));
	{
		let first = Rc::clone(&first);
		dispatcher.register("first", move |_, _| first.set(first.get() + 1));
	}
	{
		let second = Rc::clone(&second);
		dispatcher.register("second", move |_, _| second.set(second.get() + 1));
	}
	dispatcher.bind(&container);

	let button: HtmlElement = container.first_element_child().unwrap().dyn_into().unwrap();
	button.click();
	assert_eq!((first.get(), second.get()), (1, 0));

	button.set_attribute("data-action", "second").unwrap();
	dispatcher.bind(&container);
	button.click();
	assert_eq!((first.get(), second.get()), (1, 1));
}

#[wasm_bindgen_test]
fn unknown_actions_are_skipped_with_a_status_message() {
	web_support_::init_log();
	let container = web_support_::fixture("actions-unknown");
	container.set_inner_html(r#"<button data-trigger="click" data-action="nope">go</button>"#);

	let mut dispatcher = dispatcher();
	dispatcher.bind(&container);

	let button: HtmlElement = container.first_element_child().unwrap().dyn_into().unwrap();
	// No listener was attached; clicking must be inert.
	button.click();

	let status = web_support_::document().get_element_by_id("pagelet-status").unwrap();
	assert!(status.text_content().unwrap().contains("nope"));
}

#[wasm_bindgen_test]
fn handlers_suppress_the_default_behavior() {
	web_support_::init_log();
	let container = web_support_::fixture("actions-default");
	container.set_inner_html(r#"<input type="checkbox" data-trigger="click" data-action="noop">"#);

	let mut dispatcher = dispatcher();
	dispatcher.register("noop", |_, _| ());
	dispatcher.bind(&container);

	let checkbox: HtmlInputElement = container.first_element_child().unwrap().dyn_into().unwrap();
	checkbox.click();
	// The default toggle was prevented by the wrapped handler.
	assert!(!checkbox.checked());
}

#[wasm_bindgen_test]
fn api_endpoints_resolve_to_the_nearest_ancestor() {
	web_support_::init_log();
	let container = web_support_::fixture("actions-endpoint");
	container.set_inner_html(r#"<div data-api="/api/list"><button>go</button></div>"#);

	let button = container.query_selector("button").unwrap().unwrap();
	assert_eq!(ActionDispatcher::api_endpoint(&button).unwrap(), "/api/list");

	// Outside any data-api scope, resolution is an error for that interaction.
	assert!(ActionDispatcher::api_endpoint(&container).is_err());
}
