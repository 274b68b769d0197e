use core::future::Future;
use js_sys::Promise;
use tracing::error;
use wasm_bindgen::{closure::Closure, JsCast};
use wasm_bindgen_futures::JsFuture;

/// Whether a per-frame step wants to run again on the next animation frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
	Again,
	Done,
}

/// Milliseconds since the Unix epoch, the time base for all scheduling in this crate.
#[must_use]
pub fn now() -> f64 {
	js_sys::Date::now()
}

/// Runs `f` on the next animation frame.
///
/// Without a window (headless), `f` runs synchronously instead, so queue-draining callers
/// still make progress.
pub fn next_frame(f: impl FnOnce() + 'static) {
	match web_sys::window() {
		Some(window) => {
			let callback = Closure::once_into_js(f);
			if let Err(error) = window.request_animation_frame(callback.unchecked_ref()) {
				error!("Failed to request an animation frame: {:?}", error);
			}
		}
		None => f(),
	}
}

/// Runs `step` once per animation frame until it returns [`Step::Done`].
///
/// This is the cooperative primitive behind both the mutation flush and the staggered
/// mount waves. Without a window the loop drains synchronously.
pub fn run_per_frame(step: impl FnMut() -> Step + 'static) {
	schedule_step(step);
}

fn schedule_step(mut step: impl FnMut() -> Step + 'static) {
	match web_sys::window() {
		Some(window) => {
			let callback = Closure::once_into_js(move || {
				if let Step::Again = step() {
					schedule_step(step);
				}
			});
			if let Err(error) = window.request_animation_frame(callback.unchecked_ref()) {
				error!("Failed to request an animation frame: {:?}", error);
			}
		}
		None => while let Step::Again = step() {},
	}
}

/// Resolves after `ms` milliseconds.
///
/// The timer starts when `sleep` is *called*, not when the future is first polled, so it
/// can be raced against other work that is awaited first.
pub fn sleep(ms: i32) -> impl Future<Output = ()> {
	let mut executor = |resolve: js_sys::Function, _reject: js_sys::Function| match web_sys::window() {
		Some(window) => {
			if let Err(error) = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms) {
				error!("Failed to set a timeout: {:?}", error);
				drop(resolve.call0(&wasm_bindgen::JsValue::UNDEFINED));
			}
		}
		None => drop(resolve.call0(&wasm_bindgen::JsValue::UNDEFINED)),
	};
	let timer = JsFuture::from(Promise::new(&mut executor));
	async move {
		drop(timer.await);
	}
}
