use crate::{
	frame::{self, Step},
	mutation::MutationScheduler,
};
use core::cell::RefCell;
use hashbrown::HashMap;
use std::{collections::VecDeque, rc::Rc};
use tracing::{error, trace, trace_span};
use wasm_bindgen::JsCast;
use web_sys::Element;

/// Delay between consecutive reveals within one category.
pub const STAGGER_MS: f64 = 18.0;
/// Upper bound on how far behind "now" a wave may stretch, for very large batches.
pub const MAX_WAVE_MS: f64 = 1000.0;
/// Class marking an element as revealed.
pub const MOUNTED_CLASS: &str = "mounted";

struct MountJob {
	element: Element,
	due: f64,
}

#[derive(Default)]
struct CategoryQueue {
	jobs: VecDeque<MountJob>,
	running: bool,
}

/// Reveals newly inserted elements in small delayed waves, grouped by category.
///
/// Within a category, reveal times are non-decreasing in insertion order and never more
/// than [`MAX_WAVE_MS`] past the time the batch was queued. Each category runs its own
/// per-animation-frame loop that reveals all due elements and reschedules itself until the
/// queue is exhausted.
#[derive(Clone, Default)]
pub struct MountScheduler {
	queues: Rc<RefCell<HashMap<String, CategoryQueue>>>,
	mutations: MutationScheduler,
}

impl MountScheduler {
	#[must_use]
	pub fn new(mutations: MutationScheduler) -> Self {
		Self {
			queues: Rc::default(),
			mutations,
		}
	}

	/// Queues staggered reveals for `elements`. Already-mounted elements are skipped.
	pub fn mount(&self, elements: &[Element]) {
		let span = trace_span!("Mounting", count = elements.len());
		let _enter = span.enter();

		let now = frame::now();
		let mut started = Vec::new();
		{
			let mut queues = self.queues.borrow_mut();
			for element in elements {
				if element.class_list().contains(MOUNTED_CLASS) {
					continue;
				}
				let category = element.get_attribute("data-mount").unwrap_or_default();
				let queue = queues.entry(category.clone()).or_insert_with(CategoryQueue::default);
				let due = next_due(queue.jobs.back().map(|job| job.due), now);
				queue.jobs.push_back(MountJob { element: element.clone(), due });
				if !queue.running {
					queue.running = true;
					started.push(category);
				}
			}
		}
		for category in started {
			self.run_category(category);
		}
	}

	fn run_category(&self, category: String) {
		let queues = Rc::clone(&self.queues);
		frame::run_per_frame(move || {
			let mut queues = queues.borrow_mut();
			let queue = match queues.get_mut(&category) {
				Some(queue) => queue,
				None => return Step::Done,
			};
			let now = frame::now();
			while queue.jobs.front().map_or(false, |job| job.due <= now) {
				if let Some(job) = queue.jobs.pop_front() {
					reveal(&job.element);
				}
			}
			if queue.jobs.is_empty() {
				queue.running = false;
				trace!("Category {:?} queue exhausted.", category);
				Step::Done
			} else {
				Step::Again
			}
		});
	}

	/// Queues the inverse of [`mount`](Self::mount) for everything below `scope`: mounted
	/// elements not declaring `data-keep-mounted` are marked unmounted, without staggering.
	pub fn unmount(&self, scope: &Element) {
		let list = match scope.query_selector_all(".mounted:not([data-keep-mounted])") {
			Ok(list) => list,
			Err(error) => return error!("Failed to query mounted elements: {:?}", error),
		};
		trace!("Unmounting {} element(s).", list.length());
		for i in 0..list.length() {
			if let Some(element) = list.get(i).and_then(|node| node.dyn_into::<Element>().ok()) {
				self.mutations.queue(move || {
					if let Err(error) = element.class_list().remove_1(MOUNTED_CLASS) {
						error!("Failed to unmount an element: {:?}", error);
					}
				});
			}
		}
	}
}

fn next_due(previous: Option<f64>, now: f64) -> f64 {
	match previous {
		None => now,
		Some(previous) => (previous + STAGGER_MS).min(now + MAX_WAVE_MS),
	}
}

fn reveal(element: &Element) {
	if let Err(error) = element.class_list().add_1(MOUNTED_CLASS) {
		error!("Failed to mount an element: {:?}", error);
	}
}
