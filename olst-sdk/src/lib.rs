pub mod keys;
pub mod lifecycle;
pub mod objects;
