//! Integration tests for the reactive core
//!
//! These tests verify the observable behaviour of the runtime:
//! 1. Subscribers re-run only for the keys they read
//! 2. Batching, pausing and the flush modes coalesce runs
//! 3. Computed properties are cached until a source changes
//! 4. Runaway updates are stopped and reported
//! 5. Disposal and cleanup are terminal

use proptest::prelude::*;
use reinhardt_state_core::prelude::*;
use reinhardt_state_core::{
	FlushMode, RuntimeConfig, SchedulerError, StateError, SubscriberKind,
};
use rstest::rstest;
use serde_json::json;
use serial_test::serial;
use std::cell::RefCell;
use std::rc::Rc;

fn recorder<T>() -> (Rc<RefCell<Vec<T>>>, Rc<RefCell<Vec<T>>>) {
	let log = Rc::new(RefCell::new(Vec::new()));
	(log.clone(), log)
}

#[rstest]
fn test_wrapping_an_object_returns_the_same_object() {
	let rt = Runtime::new();
	let todo = rt.state(json!({"title": "write tests"}));

	let again = rt.state(Value::from(&todo));
	assert!(again.ptr_eq(&todo));

	let value = Value::from(&todo);
	assert!(value.is_reactive());
	assert!(value.as_state().is_some_and(|state| state.ptr_eq(&todo)));
}

#[rstest]
fn test_effect_reruns_only_for_keys_it_read() {
	let rt = Runtime::new();
	let data = rt.state(json!({"a": 1, "b": 2, "c": 3}));
	let (log, log_clone) = recorder();

	let data_clone = data.clone();
	let _effect = rt.effect(move || {
		let sum = data_clone.get("a").as_i64().unwrap_or(0) + data_clone.get("b").as_i64().unwrap_or(0);
		log_clone.borrow_mut().push(sum);
	});
	assert_eq!(*log.borrow(), vec![3]);

	data.set("c", 30);
	assert_eq!(*log.borrow(), vec![3]);

	data.set("a", 10);
	data.set("b", 20);
	assert_eq!(*log.borrow(), vec![3, 12, 30]);
}

#[rstest]
fn test_dependencies_follow_the_latest_run() {
	let rt = Runtime::new();
	let toggle = rt.state(json!({"use_left": true, "left": "L", "right": "R"}));
	let (log, log_clone) = recorder();

	let toggle_clone = toggle.clone();
	let effect = rt.effect(move || {
		let side = if toggle_clone.get("use_left").as_bool() == Some(true) {
			"left"
		} else {
			"right"
		};
		log_clone.borrow_mut().push(toggle_clone.get(side));
	});
	assert_eq!(rt.dependency_count(effect.id()), 2);

	toggle.set("use_left", false);
	assert_eq!(log.borrow().len(), 2);

	// `left` is no longer read
	toggle.set("left", "L2");
	assert_eq!(log.borrow().len(), 2);

	toggle.set("right", "R2");
	assert_eq!(
		*log.borrow(),
		vec![Value::from("L"), Value::from("R"), Value::from("R2")]
	);
}

#[rstest]
#[case(json!(1), Value::from(1))]
#[case(json!("same"), Value::from("same"))]
#[case(json!([1, 2]), Value::from(json!([1, 2])))]
#[case(json!(null), Value::Null)]
fn test_assigning_an_equal_value_is_a_no_op(#[case] initial: serde_json::Value, #[case] next: Value) {
	let rt = Runtime::new();
	let data = rt.state(json!({ "key": initial }));
	let runs = Rc::new(RefCell::new(0));

	let runs_clone = runs.clone();
	let data_clone = data.clone();
	let _effect = rt.effect(move || {
		let _ = data_clone.get("key");
		*runs_clone.borrow_mut() += 1;
	});

	assert!(!data.set("key", next));
	assert_eq!(*runs.borrow(), 1);
}

#[rstest]
fn test_nan_assignment_is_a_no_op() {
	let rt = Runtime::new();
	let data = rt.state(json!({}));
	data.set("ratio", f64::NAN);

	assert!(!data.set("ratio", f64::NAN));
}

#[rstest]
fn test_batch_runs_each_subscriber_once() {
	let rt = Runtime::new();
	let form = rt.state(json!({"first": "", "last": ""}));
	let (log, log_clone) = recorder();

	let form_clone = form.clone();
	let _effect = rt.effect(move || {
		let first = form_clone.get("first");
		let last = form_clone.get("last");
		log_clone.borrow_mut().push(format!(
			"{} {}",
			first.as_str().unwrap_or_default(),
			last.as_str().unwrap_or_default()
		));
	});

	rt.batch(|| {
		form.set("first", "Ada");
		form.set("last", "Lovelace");
		assert_eq!(rt.pending_count(), 1);
	});

	assert_eq!(*log.borrow(), vec![" ", "Ada Lovelace"]);
}

#[rstest]
fn test_nested_batches_flush_at_the_outermost_end() {
	let rt = Runtime::new();
	let data = rt.state(json!({"n": 0}));
	let runs = Rc::new(RefCell::new(0));

	let runs_clone = runs.clone();
	let data_clone = data.clone();
	let _effect = rt.effect(move || {
		let _ = data_clone.get("n");
		*runs_clone.borrow_mut() += 1;
	});

	rt.batch(|| {
		rt.batch(|| data.set("n", 1));
		assert_eq!(*runs.borrow(), 1);
		data.set("n", 2);
	});

	assert_eq!(*runs.borrow(), 2);
	assert!(!rt.is_batching());
}

#[rstest]
fn test_pause_and_resume_without_flush() {
	let rt = Runtime::new();
	let data = rt.state(json!({"n": 0}));
	let (log, log_clone) = recorder();

	let data_clone = data.clone();
	let _effect = rt.effect(move || log_clone.borrow_mut().push(data_clone.get("n")));

	rt.pause();
	data.set("n", 1);
	rt.resume(false);
	assert_eq!(log.borrow().len(), 1);
	assert_eq!(rt.pending_count(), 1);

	rt.flush().unwrap();
	assert_eq!(*log.borrow(), vec![Value::from(0), Value::from(1)]);
}

#[rstest]
fn test_deferred_mode_runs_in_the_microtask() {
	let rt = Runtime::with_config(RuntimeConfig::deferred());
	let tasks: Rc<RefCell<Vec<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(Vec::new()));
	let tasks_clone = tasks.clone();
	rt.set_microtask_scheduler(move |task| tasks_clone.borrow_mut().push(task));
	assert_eq!(rt.config().flush_mode, FlushMode::Deferred);

	let data = rt.state(json!({"n": 0}));
	let (log, log_clone) = recorder();
	let data_clone = data.clone();
	let _effect = rt.effect(move || log_clone.borrow_mut().push(data_clone.get("n")));

	data.set("n", 1);
	data.set("n", 2);
	assert_eq!(log.borrow().len(), 1);
	assert_eq!(tasks.borrow().len(), 1);

	let pending: Vec<_> = tasks.borrow_mut().drain(..).collect();
	for task in pending {
		task();
	}
	assert_eq!(*log.borrow(), vec![Value::from(0), Value::from(2)]);
}

proptest! {
	#[test]
	fn prop_batch_coalesces_writes(values in prop::collection::vec(-1000i64..1000, 1..40)) {
		let rt = Runtime::new();
		let data = rt.state(json!({"n": 5000}));
		let runs = Rc::new(RefCell::new(0usize));

		let runs_clone = runs.clone();
		let data_clone = data.clone();
		let _effect = rt.effect(move || {
			let _ = data_clone.get("n");
			*runs_clone.borrow_mut() += 1;
		});

		rt.batch(|| {
			for value in &values {
				data.set("n", *value);
			}
		});

		prop_assert_eq!(*runs.borrow(), 2);
		prop_assert_eq!(data.get("n"), Value::from(*values.last().unwrap()));
	}
}

#[rstest]
fn test_computed_is_cached_between_changes() {
	let rt = Runtime::new();
	let counter = rt.state(json!({"count": 1}));
	let calls = Rc::new(RefCell::new(0));

	let calls_clone = calls.clone();
	rt.computed(&counter, "double", move |c| {
		*calls_clone.borrow_mut() += 1;
		c.get("count").as_i64().unwrap_or(0) * 2
	});
	assert_eq!(*calls.borrow(), 0);

	assert_eq!(counter.get("double"), Value::from(2));
	assert_eq!(counter.get("double"), Value::from(2));
	assert_eq!(*calls.borrow(), 1);

	counter.set("count", 5);
	counter.set("count", 6);
	assert_eq!(*calls.borrow(), 1);

	assert_eq!(counter.get("double"), Value::from(12));
	assert_eq!(counter.get("double"), Value::from(12));
	assert_eq!(*calls.borrow(), 2);
}

#[rstest]
fn test_effects_see_settled_computed_values() {
	let rt = Runtime::new();
	let cart = rt.state(json!({"price": 10, "quantity": 2}));
	rt.computed(&cart, "total", |c| {
		c.get("price").as_i64().unwrap_or(0) * c.get("quantity").as_i64().unwrap_or(0)
	});
	let (log, log_clone) = recorder();

	let cart_clone = cart.clone();
	let _effect = rt.effect(move || log_clone.borrow_mut().push(cart_clone.get("total")));

	rt.batch(|| {
		cart.set("price", 12);
		cart.set("quantity", 3);
	});

	assert_eq!(*log.borrow(), vec![Value::from(20), Value::from(36)]);
}

#[rstest]
fn test_computed_keys_reject_writes_and_skip_snapshots() {
	let rt = Runtime::new();
	let counter = rt.state(json!({"count": 2}));
	rt.computed(&counter, "double", |c| c.get("count").as_i64().unwrap_or(0) * 2);

	assert!(!counter.set("double", 100));
	assert_eq!(counter.get("double"), Value::from(4));
	assert!(counter.contains_key("double"));
	assert_eq!(counter.keys(), vec!["count"]);
	assert_eq!(counter.to_raw(), Value::from(json!({"count": 2})));
}

#[rstest]
fn test_watch_receives_new_and_old_values() {
	let rt = Runtime::new();
	let counter = rt.state(json!({"count": 0}));
	let (log, log_clone) = recorder();

	let _watcher = rt.watch(&counter, "count", move |new, old| {
		log_clone.borrow_mut().push((new.clone(), old.clone()));
	});
	assert!(log.borrow().is_empty());

	counter.set("count", 1);
	counter.set("count", 2);

	assert_eq!(
		*log.borrow(),
		vec![
			(Value::from(1), Value::from(0)),
			(Value::from(2), Value::from(1)),
		]
	);
}

#[rstest]
fn test_watchers_run_before_effects() {
	let rt = Runtime::new();
	let data = rt.state(json!({"n": 0}));
	let (log, log_clone) = recorder();

	let effect_log = log_clone.clone();
	let data_clone = data.clone();
	let _effect = rt.effect(move || {
		let _ = data_clone.get("n");
		effect_log.borrow_mut().push("effect");
	});
	let _watcher = rt.watch(&data, "n", move |_, _| log_clone.borrow_mut().push("watch"));
	log.borrow_mut().clear();

	data.set("n", 1);

	assert_eq!(*log.borrow(), vec!["watch", "effect"]);
}

#[rstest]
fn test_runaway_effect_is_stopped_and_reported() {
	let rt = Runtime::with_config(RuntimeConfig::default().with_max_flush_iterations(10));
	let errors = Rc::new(RefCell::new(Vec::new()));
	let errors_clone = errors.clone();
	rt.on_error(move |error| errors_clone.borrow_mut().push(error.to_string()));

	let data = rt.state(json!({"n": 0}));
	let data_clone = data.clone();
	let _effect = rt.effect(move || {
		let n = data_clone.get("n").as_i64().unwrap_or(0);
		data_clone.set("n", n + 1);
	});

	assert_eq!(data.get("n"), Value::from(11));
	assert_eq!(
		*errors.borrow(),
		vec![SchedulerError::CycleLimit { iterations: 10, dropped: 1 }.to_string()]
	);
	assert_eq!(rt.pending_count(), 0);
}

#[rstest]
fn test_failing_effect_does_not_reach_the_writer() {
	let rt = Runtime::new();
	let errors = Rc::new(RefCell::new(Vec::new()));
	let errors_clone = errors.clone();
	rt.on_error(move |error| {
		if let StateError::Subscriber(failure) = error {
			errors_clone.borrow_mut().push(failure.kind);
		}
	});

	let data = rt.state(json!({"n": 0}));
	let data_clone = data.clone();
	let _effect = rt.try_effect(move || {
		if data_clone.get("n").as_i64() == Some(1) {
			return Err("n must not be 1".into());
		}
		Ok(())
	});

	assert!(data.set("n", 1));
	assert_eq!(*errors.borrow(), vec![SubscriberKind::Effect]);

	// still subscribed
	data.set("n", 1.5);
	data.set("n", 1);
	assert_eq!(errors.borrow().len(), 2);
}

#[rstest]
fn test_nested_objects_are_tracked() {
	let rt = Runtime::new();
	let user = rt.state(json!({"profile": {"name": "Ada"}}));
	let (log, log_clone) = recorder();

	let first = user.get("profile");
	let second = user.get("profile");
	let profile = first.as_state().unwrap().clone();
	assert!(second.as_state().is_some_and(|state| state.ptr_eq(&profile)));

	let user_clone = user.clone();
	let _effect = rt.effect(move || {
		if let Some(profile) = user_clone.get("profile").as_state() {
			log_clone.borrow_mut().push(profile.get("name"));
		}
	});

	profile.set("name", "Grace");

	assert_eq!(*log.borrow(), vec![Value::from("Ada"), Value::from("Grace")]);
	assert_eq!(
		user.to_raw(),
		Value::from(json!({"profile": {"name": "Grace"}}))
	);
}

#[rstest]
fn test_key_additions_wake_key_readers() {
	let rt = Runtime::new();
	let tags = rt.state(json!({}));
	let (log, log_clone) = recorder();

	let tags_clone = tags.clone();
	let _effect = rt.effect(move || log_clone.borrow_mut().push(tags_clone.keys()));

	tags.set("rust", true);
	tags.set("rust", false);
	tags.remove("rust");

	assert_eq!(
		*log.borrow(),
		vec![Vec::<String>::new(), vec!["rust".to_string()], Vec::new()]
	);
}

#[rstest]
fn test_notify_forces_a_run() {
	let rt = Runtime::new();
	let data = rt.state(json!({"n": 0}));
	let runs = Rc::new(RefCell::new(0));

	let runs_clone = runs.clone();
	let data_clone = data.clone();
	let _effect = rt.effect(move || {
		let _ = data_clone.get("n");
		*runs_clone.borrow_mut() += 1;
	});

	data.notify(Some("n"));
	data.notify(None);

	assert_eq!(*runs.borrow(), 3);
}

#[rstest]
fn test_untracked_reads_do_not_subscribe() {
	let rt = Runtime::new();
	let data = rt.state(json!({"tracked": 0, "ignored": 0}));
	let runs = Rc::new(RefCell::new(0));

	let runs_clone = runs.clone();
	let data_clone = data.clone();
	let rt_clone = rt.clone();
	let _effect = rt.effect(move || {
		let _ = data_clone.get("tracked");
		let _ = rt_clone.untrack(|| data_clone.get("ignored"));
		*runs_clone.borrow_mut() += 1;
	});

	data.set("ignored", 1);
	assert_eq!(*runs.borrow(), 1);
	data.set("tracked", 1);
	assert_eq!(*runs.borrow(), 2);
}

#[rstest]
fn test_disposed_effect_never_runs_again() {
	let rt = Runtime::new();
	let data = rt.state(json!({"n": 0}));
	let runs = Rc::new(RefCell::new(0));

	let runs_clone = runs.clone();
	let data_clone = data.clone();
	let effect = rt.effect(move || {
		let _ = data_clone.get("n");
		*runs_clone.borrow_mut() += 1;
	});

	rt.batch(|| {
		data.set("n", 1);
		effect.dispose();
	});
	data.set("n", 2);

	assert_eq!(*runs.borrow(), 1);
	assert!(effect.is_disposed());
	assert!(data.subscribers_of("n").is_empty());
}

#[rstest]
fn test_cleanup_is_terminal() {
	let rt = Runtime::new();
	let data = rt.state(json!({"n": 0}));
	let runs = Rc::new(RefCell::new(0));
	let collector = CleanupCollector::new();

	let runs_clone = runs.clone();
	let data_clone = data.clone();
	collector.add_effect(rt.effect(move || {
		let _ = data_clone.get("n");
		*runs_clone.borrow_mut() += 1;
	}));
	assert_eq!(collector.size(), 1);

	collector.cleanup();
	data.set("n", 1);

	assert_eq!(*runs.borrow(), 1);
	assert!(collector.disposed());
	assert!(!collector.add(|| {}));
	assert_eq!(collector.size(), 0);
}

#[test]
#[serial]
fn test_counter_scenario_on_default_runtime() {
	let counter = state(json!({"count": 0}));
	let (log, log_clone) = recorder();

	let counter_clone = counter.clone();
	let handle = effect(move || log_clone.borrow_mut().push(counter_clone.get("count")));

	counter.set("count", 1);
	flush().unwrap();

	assert_eq!(*log.borrow(), vec![Value::from(0), Value::from(1)]);
	handle.dispose();
}

#[test]
#[serial]
fn test_double_scenario_on_default_runtime() {
	let counter = state(json!({"count": 0}));
	let calls = Rc::new(RefCell::new(0));

	let calls_clone = calls.clone();
	let handle = computed(&counter, "double", move |c| {
		*calls_clone.borrow_mut() += 1;
		c.get("count").as_i64().unwrap_or(0) * 2
	});

	counter.set("count", 1);
	assert_eq!(counter.get("double"), Value::from(2));
	assert_eq!(counter.get("double"), Value::from(2));
	assert_eq!(*calls.borrow(), 1);
	handle.dispose();
}

#[test]
#[serial]
fn test_free_helpers_share_the_default_runtime() {
	let raw = Value::from(json!({"items": [1, 2]}));
	let wrapped = reactive(raw.clone());
	assert!(is_reactive(&wrapped));
	assert!(!is_reactive(&raw));
	assert_eq!(to_raw(&wrapped), raw);

	let list = wrapped.as_state().unwrap().clone();
	let runs = Rc::new(RefCell::new(0));
	let runs_clone = runs.clone();
	let list_clone = list.clone();
	let handle = effect(move || {
		let _ = list_clone.get("items");
		*runs_clone.borrow_mut() += 1;
	});

	batch(|| {
		list.set("items", json!([1, 2, 3]));
		list.set("items", json!([1, 2, 3, 4]));
	});
	pause();
	notify(&list, Some("items"));
	resume(true);
	let untracked = untrack(|| list.get("items"));

	assert_eq!(*runs.borrow(), 3);
	assert_eq!(untracked, Value::from(json!([1, 2, 3, 4])));
	handle.dispose();
}
