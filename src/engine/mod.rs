pub mod physics;
pub mod vehicle;
pub mod visual;
