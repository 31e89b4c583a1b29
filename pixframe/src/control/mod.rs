pub mod control_surface;
pub mod osc_server;
