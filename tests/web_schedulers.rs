use pagelet::{frame, mount::MountScheduler, mutation::MutationScheduler};
use std::{cell::RefCell, rc::Rc};
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::Element;

wasm_bindgen_test_configure!(run_in_browser);


#[wasm_bindgen_test]
async fn mutations_flush_next_frame_in_enqueue_order() {
	web_support_::init_log();
	let scheduler = MutationScheduler::new();
	let applied = Rc::new(RefCell::new(Vec::new()));
	for i in 0..3 {
		let applied = Rc::clone(&applied);
		scheduler.queue(move || applied.borrow_mut().push(i));
	}

	// Never synchronously inside the caller's stack frame.
	assert!(applied.borrow().is_empty());

	frame::sleep(100).await;
	assert_eq!(*applied.borrow(), vec![0, 1, 2]);
}

fn mountables(container: &Element, count: usize, category: &str) -> Vec<Element> {
	(0..count)
		.map(|_| {
			let element = web_support_::document().create_element("div").unwrap();
			element.set_attribute("data-mount", category).unwrap();
			container.append_child(&element).unwrap();
			element
		})
		.collect()
}

#[wasm_bindgen_test]
async fn reveals_in_insertion_order() {
	web_support_::init_log();
	let container = web_support_::fixture("mount-order");
	let elements = mountables(&container, 8, "card");
	let mounts = MountScheduler::new(MutationScheduler::new());

	mounts.mount(&elements);

	// At any sample point, the mounted set is a prefix of insertion order.
	frame::sleep(60).await;
	let mut seen_unmounted = false;
	for element in &elements {
		let mounted = element.class_list().contains("mounted");
		assert!(!(mounted && seen_unmounted), "reveals happened out of order");
		if !mounted {
			seen_unmounted = true;
		}
	}

	frame::sleep(400).await;
	for element in &elements {
		assert!(element.class_list().contains("mounted"));
	}
}

#[wasm_bindgen_test]
async fn large_batches_finish_within_the_wave_bound() {
	web_support_::init_log();
	let container = web_support_::fixture("mount-clamp");
	// Unclamped, 120 elements would stagger over ~2.1s; the wave bound caps it at 1s.
	let elements = mountables(&container, 120, "card");
	let mounts = MountScheduler::new(MutationScheduler::new());

	mounts.mount(&elements);
	frame::sleep(1300).await;

	for element in &elements {
		assert!(element.class_list().contains("mounted"));
	}
}

#[wasm_bindgen_test]
async fn skips_already_mounted_elements_and_unmounts_the_rest() {
	web_support_::init_log();
	let container = web_support_::fixture("mount-skip");
	let elements = mountables(&container, 2, "card");
	elements[0].class_list().add_1("mounted").unwrap();
	elements[1].class_list().add_1("mounted").unwrap();
	elements[1].set_attribute("data-keep-mounted", "").unwrap();

	let mounts = MountScheduler::new(MutationScheduler::new());
	// Nothing to do; both are already mounted.
	mounts.mount(&elements);

	mounts.unmount(&container);
	frame::sleep(100).await;

	assert!(!elements[0].class_list().contains("mounted"));
	// Exempt elements stay mounted.
	assert!(elements[1].class_list().contains("mounted"));
}
