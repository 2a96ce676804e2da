//! # Event Bus Module
//!
//! Publish/subscribe channel used to report run progress, status changes
//! and errors to whichever front end is attached.
//!
//! ## Usage
//!
//! ```rust
//! use amfibia_core::event_bus::{AppEvent, EventBus, EventCategory, EventFilter, MillingEvent};
//!
//! let bus = EventBus::new();
//! let subscription = bus.subscribe(
//!     EventFilter::Categories(vec![EventCategory::Milling]),
//!     |event| println!("{}", event.description()),
//! );
//!
//! bus.notify(AppEvent::Milling(MillingEvent::RunStarted { tasks: 4 }));
//! bus.unsubscribe(subscription);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
