//! Kindred application layer: wiring plus the moment and agenda services
//! a front-end drives.

pub mod agenda;
pub mod app;
pub mod moments;

pub use agenda::{Agenda, AgendaUpdate};
pub use app::App;
pub use moments::MomentService;
