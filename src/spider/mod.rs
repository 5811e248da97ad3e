//! Spidering of cluster pins: layout geometry, the overlay renderer, and the
//! state machine deciding when a cluster opens and closes.

pub mod coordinator;
pub mod layout;
pub mod renderer;
pub mod state;

pub use coordinator::EventCoordinator;
pub use layout::{compute_positions, LayoutKind};
pub use renderer::SpiderRenderer;
pub use state::{ClickCounter, ClusterRuntimeState, SpiderPhase, SpiderProxy};
