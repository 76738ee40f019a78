pub mod action;
pub mod binding;
pub mod catalog;
pub mod patch;
pub mod prompt;
pub mod render;
pub mod tree;
