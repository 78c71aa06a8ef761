//! Wifi gateway for an infrared remote
//!
//! Serves `GET /switch?id=<key>` and queues the configured timing code for
//! `<key>` on a [`TransmitWorker`](ir_tx::TransmitWorker), which plays it
//! through a pigpio daemon (or a simulated device).

pub mod buttons;
pub mod error;
pub mod server;
pub mod settings;

pub use buttons::ButtonTable;
pub use error::{RequestError, SettingsError};
pub use server::{dispatch, parse_switch, render_page, router, serve, AppState, PAGE_TITLE};
pub use settings::{roblin_buttons, DeviceKind, DeviceSettings, Settings};
