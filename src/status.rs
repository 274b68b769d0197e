use crate::frame;
use std::cell::Cell;
use tracing::error;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Document, Element};

const STATUS_ID: &str = "pagelet-status";
const DISMISS_MS: i32 = 4000;

thread_local! {
	static FLASH_TOKEN: Cell<u32> = Cell::new(0);
}

/// Shows a transient status message that dismisses itself after a few seconds.
///
/// Repeated calls reuse one overlay element and restart the dismissal timer.
pub fn flash(document: &Document, text: &str) {
	let element = match status_element(document) {
		Some(element) => element,
		None => return,
	};
	element.set_text_content(Some(text));

	let token = FLASH_TOKEN.with(|current| {
		let next = current.get().wrapping_add(1);
		current.set(next);
		next
	});
	if let Err(error) = element.set_attribute("data-token", &token.to_string()) {
		return error!("Failed to stamp the status element: {:?}", error);
	}

	spawn_local(async move {
		frame::sleep(DISMISS_MS).await;
		// A newer message restarted the timer.
		if element.get_attribute("data-token").as_deref() == Some(token.to_string().as_str()) {
			element.remove();
		}
	});
}

fn status_element(document: &Document) -> Option<Element> {
	if let Some(existing) = document.get_element_by_id(STATUS_ID) {
		return Some(existing);
	}
	let element = match document.create_element("div") {
		Ok(element) => element,
		Err(error) => {
			error!("Failed to create the status element: {:?}", error);
			return None;
		}
	};
	element.set_id(STATUS_ID);
	if let Err(error) = element.set_attribute("role", "status") {
		error!("Failed to mark the status element: {:?}", error);
	}
	match document.body() {
		Some(body) => {
			if let Err(error) = body.append_child(&element) {
				error!("Failed to insert the status element: {:?}", error);
				return None;
			}
		}
		None => return None,
	}
	Some(element)
}
