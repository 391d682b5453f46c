pub mod geometry;
pub mod input;
pub mod view;
