pub mod port_panel_sync;
mod snapshots;

pub use port_panel_sync::PortPanelSync;
