pub mod delivery;
pub mod renderer;
