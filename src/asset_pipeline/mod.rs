pub mod generate_tangents;
pub mod jewelry;
pub mod materials;
