pub mod portfolio;
pub mod recommendation;
