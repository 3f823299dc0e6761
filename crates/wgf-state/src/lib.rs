// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Interface configuration entities and their lifecycle.
//!
//! [`WireguardConfiguration`] is built from a loaded mapping, tracked per run in
//! a [`ReconciliationTable`], and announced to subscribers through an
//! [`EventDispatcher`] as it is created, updated or deleted.

pub mod configuration;
pub mod dispatcher;
pub mod event;
pub mod keys;
pub mod peer;
pub mod secret_ref;
pub mod table;

pub use configuration::{ValidationError, WireguardConfiguration};
pub use dispatcher::{
	EventDispatcher, EventSubscriber, FnSubscriber, HandlerError, HandlerFailure, SubscriberError,
};
pub use event::{Event, EventKind};
pub use keys::{is_valid_key_encoding, KeyError, WgKeyPair, WgPrivateKey, WgPublicKey};
pub use peer::PeerRecord;
pub use secret_ref::{PrivateKeyRef, SecretRefError};
pub use table::{
	InterfaceState, ReconcileKind, ReconciliationTable, SourceConflict, TrackedInterface, Transition,
};
