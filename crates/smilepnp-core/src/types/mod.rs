mod correspondence;

pub use correspondence::*;
