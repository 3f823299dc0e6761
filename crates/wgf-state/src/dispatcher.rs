// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Synchronous fan-out of lifecycle events.
//!
//! Subscribers of a kind run in the order they subscribed. A failing
//! subscriber does not stop the ones after it; failures are collected into a
//! single [`HandlerError`] returned once every subscriber has run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::event::{Event, EventKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
	pub fn new(message: impl Into<String>) -> Self {
		Self(message.into())
	}
}

pub trait EventSubscriber: Send + Sync {
	fn name(&self) -> &str;

	fn handle(&self, event: &Event) -> Result<(), SubscriberError>;
}

/// Adapter for closures.
pub struct FnSubscriber<F> {
	name: String,
	f: F,
}

impl<F> FnSubscriber<F>
where
	F: Fn(&Event) -> Result<(), SubscriberError> + Send + Sync,
{
	pub fn new(name: impl Into<String>, f: F) -> Self {
		Self { name: name.into(), f }
	}
}

impl<F> EventSubscriber for FnSubscriber<F>
where
	F: Fn(&Event) -> Result<(), SubscriberError> + Send + Sync,
{
	fn name(&self) -> &str {
		&self.name
	}

	fn handle(&self, event: &Event) -> Result<(), SubscriberError> {
		(self.f)(event)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
	pub subscriber: String,
	pub error: SubscriberError,
}

impl fmt::Display for HandlerFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.subscriber, self.error)
	}
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} for {interface}: {} subscriber(s) failed: {}", .failures.len(), join_failures(.failures))]
pub struct HandlerError {
	pub kind: EventKind,
	pub interface: String,
	pub failures: Vec<HandlerFailure>,
}

fn join_failures(failures: &[HandlerFailure]) -> String {
	failures
		.iter()
		.map(ToString::to_string)
		.collect::<Vec<_>>()
		.join("; ")
}

#[derive(Default, Clone)]
pub struct EventDispatcher {
	subscribers: BTreeMap<EventKind, Vec<Arc<dyn EventSubscriber>>>,
}

impl EventDispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn subscribe(&mut self, kind: EventKind, subscriber: Arc<dyn EventSubscriber>) {
		debug!(kind = %kind, subscriber = subscriber.name(), "subscribed");
		self.subscribers.entry(kind).or_default().push(subscriber);
	}

	/// Subscribe one subscriber to several kinds.
	pub fn subscribe_all(&mut self, kinds: &[EventKind], subscriber: Arc<dyn EventSubscriber>) {
		for kind in kinds {
			self.subscribe(*kind, Arc::clone(&subscriber));
		}
	}

	pub fn subscribe_fn<F>(&mut self, kind: EventKind, name: impl Into<String>, f: F)
	where
		F: Fn(&Event) -> Result<(), SubscriberError> + Send + Sync + 'static,
	{
		self.subscribe(kind, Arc::new(FnSubscriber::new(name, f)));
	}

	pub fn subscriber_count(&self, kind: EventKind) -> usize {
		self.subscribers.get(&kind).map_or(0, Vec::len)
	}

	pub fn dispatch(&self, event: &Event) -> Result<(), HandlerError> {
		let Some(subscribers) = self.subscribers.get(&event.kind()) else {
			return Ok(());
		};

		let mut failures = Vec::new();
		for subscriber in subscribers {
			if let Err(error) = subscriber.handle(event) {
				warn!(
					kind = %event.kind(),
					interface = event.interface(),
					subscriber = subscriber.name(),
					error = %error,
					"event subscriber failed"
				);
				failures.push(HandlerFailure {
					subscriber: subscriber.name().to_string(),
					error,
				});
			}
		}

		if failures.is_empty() {
			Ok(())
		} else {
			Err(HandlerError {
				kind: event.kind(),
				interface: event.interface().to_string(),
				failures,
			})
		}
	}
}

impl fmt::Debug for EventDispatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let counts: BTreeMap<&str, usize> = self
			.subscribers
			.iter()
			.map(|(kind, subs)| (kind.as_str(), subs.len()))
			.collect();
		f.debug_struct("EventDispatcher").field("subscribers", &counts).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::configuration::WireguardConfiguration;
	use crate::keys::WgKeyPair;
	use proptest::prelude::*;
	use std::sync::Mutex;

	fn event(kind: EventKind) -> Event {
		Event::new(
			kind,
			&WireguardConfiguration::new("wg0", WgKeyPair::generate().public, 51820),
		)
	}

	fn recorder(
		dispatcher: &mut EventDispatcher,
		log: &Arc<Mutex<Vec<String>>>,
		kind: EventKind,
		name: &str,
		fail: bool,
	) {
		let log = Arc::clone(log);
		let owned = name.to_string();
		dispatcher.subscribe_fn(kind, name, move |_| {
			log.lock().unwrap().push(owned.clone());
			if fail {
				Err(SubscriberError::new(format!("{owned} refused")))
			} else {
				Ok(())
			}
		});
	}

	#[test]
	fn no_subscribers_is_success() {
		let dispatcher = EventDispatcher::new();
		assert!(dispatcher.dispatch(&event(EventKind::Created)).is_ok());
	}

	#[test]
	fn failing_subscriber_does_not_stop_the_rest() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let mut dispatcher = EventDispatcher::new();
		recorder(&mut dispatcher, &log, EventKind::Created, "a", true);
		recorder(&mut dispatcher, &log, EventKind::Created, "b", false);
		recorder(&mut dispatcher, &log, EventKind::Created, "c", false);

		let err = dispatcher.dispatch(&event(EventKind::Created)).unwrap_err();

		assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
		assert_eq!(err.kind, EventKind::Created);
		assert_eq!(err.interface, "wg0");
		assert_eq!(err.failures.len(), 1);
		assert_eq!(err.failures[0].subscriber, "a");
		assert!(err.to_string().contains("a: a refused"));
	}

	#[test]
	fn only_matching_kind_runs() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let mut dispatcher = EventDispatcher::new();
		recorder(&mut dispatcher, &log, EventKind::Created, "created", false);
		recorder(&mut dispatcher, &log, EventKind::Deleted, "deleted", false);

		dispatcher.dispatch(&event(EventKind::Deleted)).unwrap();
		assert_eq!(*log.lock().unwrap(), vec!["deleted"]);
	}

	#[test]
	fn subscribe_all_registers_each_kind() {
		let mut dispatcher = EventDispatcher::new();
		let sub: Arc<dyn EventSubscriber> = Arc::new(FnSubscriber::new("all", |_: &Event| Ok(())));
		dispatcher.subscribe_all(&[EventKind::Created, EventKind::Updated], sub);

		assert_eq!(dispatcher.subscriber_count(EventKind::Created), 1);
		assert_eq!(dispatcher.subscriber_count(EventKind::Updated), 1);
		assert_eq!(dispatcher.subscriber_count(EventKind::Deleted), 0);
	}

	proptest! {
		#[test]
		fn dispatch_order_is_subscription_order(fails in proptest::collection::vec(any::<bool>(), 1..12)) {
			let log = Arc::new(Mutex::new(Vec::new()));
			let mut dispatcher = EventDispatcher::new();
			let names: Vec<String> = (0..fails.len()).map(|i| format!("s{i}")).collect();
			for (name, fail) in names.iter().zip(&fails) {
				recorder(&mut dispatcher, &log, EventKind::Updated, name, *fail);
			}

			let result = dispatcher.dispatch(&event(EventKind::Updated));

			prop_assert_eq!(&*log.lock().unwrap(), &names);
			let expected_failures = fails.iter().filter(|f| **f).count();
			match result {
				Ok(()) => prop_assert_eq!(expected_failures, 0),
				Err(err) => prop_assert_eq!(err.failures.len(), expected_failures),
			}
		}
	}
}
