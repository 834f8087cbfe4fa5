//! AFU donation logger.
//!
//! Volunteers record donations at an event from a phone browser. Every
//! donation is written to a local SQLite queue first and then pushed to the
//! remote ledger whenever the network allows, so a flaky connection delays
//! a donation but never loses it.
//!
//! | Module           | Role                                                  |
//! |------------------|-------------------------------------------------------|
//! | [`store`]        | durable queue of pending donations                    |
//! | [`udi`]          | Unique Donation Identifier policies                   |
//! | [`sync`]         | ordered, head-of-line-stopping delivery to the ledger |
//! | [`connectivity`] | online signal and sync-on-reconnect trigger           |
//! | [`submission`]   | session context and the per-donation flow             |
//! | [`ledger`]       | remote ledger HTTP client                             |
//! | [`api`]          | local REST API for the browser form                   |

pub mod api;
pub mod config;
pub mod connectivity;
pub mod errors;
pub mod ledger;
pub mod model;
pub mod store;
pub mod submission;
pub mod sync;
pub mod udi;
