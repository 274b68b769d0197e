use crate::frame;
use core::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// Batches DOM mutations and flushes them once per animation frame.
///
/// Mutations are never applied synchronously inside the caller's stack frame (interleaved
/// reads and writes would thrash layout), and application order is FIFO across all callers.
#[derive(Clone, Default)]
pub struct MutationScheduler {
	inner: Rc<RefCell<Inner>>,
}

#[derive(Default)]
struct Inner {
	pending: Vec<Box<dyn FnOnce()>>,
	flush_scheduled: bool,
}

impl MutationScheduler {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn queue(&self, mutation: impl FnOnce() + 'static) {
		let needs_flush = {
			let mut inner = self.inner.borrow_mut();
			inner.pending.push(Box::new(mutation));
			if inner.flush_scheduled {
				false
			} else {
				inner.flush_scheduled = true;
				true
			}
		};
		if needs_flush {
			let inner = Rc::clone(&self.inner);
			frame::next_frame(move || flush(&inner));
		}
	}
}

fn flush(inner: &Rc<RefCell<Inner>>) {
	// Mutations queued by a running mutation land in the next frame's batch.
	let pending = {
		let mut inner = inner.borrow_mut();
		inner.flush_scheduled = false;
		core::mem::take(&mut inner.pending)
	};
	trace!("Flushing {} queued mutation(s).", pending.len());
	for mutation in pending {
		mutation();
	}
}
