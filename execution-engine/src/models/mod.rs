pub mod config;
pub mod ingress;
pub mod journal;
pub mod view;

pub use config::*;
pub use ingress::*;
pub use journal::*;
pub use view::*;
