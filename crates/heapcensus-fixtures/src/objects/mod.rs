//! Fixture object types.

pub mod animals;
pub mod containers;
pub mod entities;
pub mod globals;
pub mod hashed;
pub mod marker;
pub mod ordered;
pub mod smart;
pub mod strings;
pub mod tasks;
pub mod widget;
