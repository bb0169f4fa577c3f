pub mod animations;
pub mod health;
