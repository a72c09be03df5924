//! Terminal price board.
//!
//! Feeds push [`TickEvent`](ticker_data::TickEvent)s into the shared [`Registry`]; a single
//! [`RefreshClock`] periodically decays pulses, snapshots the registry, updates the
//! [`Layout`](layout::Layout) and redraws the board via the [`Renderer`].

/// Terminal color depth detection.
pub mod capability;

/// Fixed interval redraw task.
pub mod clock;

/// Board configuration record.
pub mod config;

pub mod layout;

pub mod palette;

pub mod pulse;

/// Instrument Registry: per-instrument locked live state and consistent snapshots.
pub mod registry;

/// Full-screen board drawing with `crossterm`.
pub mod render;

pub use capability::ColorCapability;
pub use clock::RefreshClock;
pub use config::BoardConfig;
pub use registry::Registry;
pub use render::Renderer;
