pub mod price;
pub mod vote;
pub mod wrap;
